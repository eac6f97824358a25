//! Error taxonomy for upstream calls.
//!
//! Failures surfaced by caller-supplied operations are classified into a
//! small set of kinds that drive the retry and circuit-breaker policy.

use std::time::Duration;
use thiserror::Error;

/// Classification of an upstream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Authorization / not-found class errors (401, 403, 404). Never retried
    /// against the same provider.
    NonRetryable,
    /// The upstream explicitly asked for a delay (429).
    RateLimited,
    /// Network or server-side errors. Retried with exponential backoff.
    Transient,
    /// Anything uncategorized. Conservatively treated as transient.
    Unknown,
}

/// A classified error from one upstream call.
///
/// Produced at the transport boundary, either by [`UpstreamError::from_status`]
/// or by one of the kind-specific constructors.
#[derive(Debug, Clone, Error)]
#[error("{message} (kind: {kind:?}, status: {status:?})")]
pub struct UpstreamError {
    pub kind: ErrorKind,
    /// HTTP-like status code, when the failure carried one.
    pub status: Option<u16>,
    /// Upstream-requested wait, only meaningful for [`ErrorKind::RateLimited`].
    pub retry_after: Option<Duration>,
    pub message: String,
}

impl UpstreamError {
    /// Classifies a failure from an HTTP-like status code.
    ///
    /// 401/403/404 are non-retryable, 429 is rate-limited, everything else
    /// (including all 5xx) is transient.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 | 404 => ErrorKind::NonRetryable,
            429 => ErrorKind::RateLimited,
            _ => ErrorKind::Transient,
        };
        Self {
            kind,
            status: Some(status),
            retry_after: None,
            message: message.into(),
        }
    }

    /// A transient failure with no status code (connection reset, DNS, ...).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// A rate-limit response carrying the upstream-requested wait.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            status: Some(429),
            retry_after,
            message: "rate limited by upstream".to_string(),
        }
    }

    /// An uncategorized failure.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// Attaches a retry-after hint, keeping the existing classification.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// True if the retry executor may attempt this provider again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, ErrorKind::NonRetryable)
    }
}

/// The terminal error carried by a failed [`CallResult`](crate::CallResult).
#[derive(Debug, Clone, Error)]
pub enum FailoverError {
    /// Every provider was skipped by an open circuit breaker.
    #[error("no eligible provider: all circuit breakers open")]
    NoEligibleProvider,
    /// The last error encountered after exhausting all providers.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl FailoverError {
    /// Returns the underlying upstream error, if any.
    pub fn as_upstream(&self) -> Option<&UpstreamError> {
        match self {
            FailoverError::Upstream(e) => Some(e),
            FailoverError::NoEligibleProvider => None,
        }
    }
}

/// Best-effort cache failure. Callers of the cache log these and degrade to
/// a miss; they never propagate past the orchestrator.
#[derive(Debug, Error)]
#[error("cache backend error: {0}")]
pub struct CacheError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            UpstreamError::from_status(401, "no auth").kind,
            ErrorKind::NonRetryable
        );
        assert_eq!(
            UpstreamError::from_status(403, "forbidden").kind,
            ErrorKind::NonRetryable
        );
        assert_eq!(
            UpstreamError::from_status(404, "missing").kind,
            ErrorKind::NonRetryable
        );
        assert_eq!(
            UpstreamError::from_status(429, "slow down").kind,
            ErrorKind::RateLimited
        );
        assert_eq!(
            UpstreamError::from_status(500, "boom").kind,
            ErrorKind::Transient
        );
        assert_eq!(
            UpstreamError::from_status(502, "bad gateway").kind,
            ErrorKind::Transient
        );
    }

    #[test]
    fn retryability() {
        assert!(!UpstreamError::from_status(404, "missing").is_retryable());
        assert!(UpstreamError::from_status(500, "boom").is_retryable());
        assert!(UpstreamError::rate_limited(None).is_retryable());
        assert!(UpstreamError::unknown("???").is_retryable());
    }

    #[test]
    fn retry_after_attachment() {
        let err = UpstreamError::from_status(429, "slow down")
            .with_retry_after(Duration::from_secs(7));
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }
}
