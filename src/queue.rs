//! Global request admission queue.
//!
//! One fair semaphore bounds how many operations run concurrently across all
//! providers combined; it is the only admission-control point in the crate.
//! Waiters are granted permits in the order they asked (FIFO dispatch), and
//! every enqueued task runs exactly once. There is no cancellation and no
//! bound on the number of pending waiters; sustained overload grows the
//! waiter list without backpressure, which is the accepted behavior of this
//! design.

use crate::events::{EventListeners, FailoverEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

pub(crate) struct RequestQueue {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    name: String,
}

impl RequestQueue {
    pub(crate) fn new(max_concurrent: usize, name: String) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            name,
        }
    }

    /// Number of tasks currently executing.
    pub(crate) fn in_flight(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Waits for a slot, then drives the task to completion.
    ///
    /// The permit is held for the task's whole execution, including retry
    /// backoff sleeps, so a provider stuck in backoff still occupies one of
    /// the global slots.
    pub(crate) async fn enqueue<T, F>(&self, listeners: &EventListeners, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let enqueued_at = Instant::now();
        // The semaphore is never closed while the queue is alive.
        let permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("request queue semaphore closed"),
        };

        let queued_for = enqueued_at.elapsed();
        listeners.emit(&FailoverEvent::TaskDispatched {
            queued_for,
            timestamp: Instant::now(),
        });
        tracing::debug!(
            client = %self.name,
            queued_ms = queued_for.as_millis() as u64,
            in_flight = self.in_flight(),
            "task dispatched"
        );

        #[cfg(feature = "metrics")]
        {
            counter!("failover_tasks_dispatched_total", "client" => self.name.clone())
                .increment(1);
            gauge!("failover_tasks_in_flight", "client" => self.name.clone())
                .set(self.in_flight() as f64);
        }

        let result = task.await;
        drop(permit);

        #[cfg(feature = "metrics")]
        gauge!("failover_tasks_in_flight", "client" => self.name.clone())
            .set(self.in_flight() as f64);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn bound_is_never_exceeded() {
        let queue = Arc::new(RequestQueue::new(5, "test".to_string()));
        let listeners = EventListeners::new();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let queue = Arc::clone(&queue);
            let listeners = listeners.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(&listeners, async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(running.load(Ordering::SeqCst), 0);
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn dispatch_follows_enqueue_order() {
        // One slot forces strictly serial dispatch; the completion order must
        // then match the enqueue order.
        let queue = Arc::new(RequestQueue::new(1, "test".to_string()));
        let listeners = EventListeners::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..6u32 {
            let queue = Arc::clone(&queue);
            let listeners = listeners.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue(&listeners, async move {
                        order.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    })
                    .await;
            }));
            // Stagger the enqueues so arrival order is deterministic.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn dispatch_event_carries_queue_wait() {
        let queue = RequestQueue::new(1, "test".to_string());
        let mut listeners = EventListeners::new();
        let dispatched = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&dispatched);
        listeners.add(move |event| {
            if matches!(event, FailoverEvent::TaskDispatched { .. }) {
                d.fetch_add(1, Ordering::SeqCst);
            }
        });

        queue.enqueue(&listeners, async {}).await;
        queue.enqueue(&listeners, async {}).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 2);
    }
}
