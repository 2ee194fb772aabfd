//! Errors raised by the watch service and its HTTP collaborators.

use std::future::Future;
use std::time::Duration;

use origin_core::OriginError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{what} returned HTTP {status}")]
    Status {
        what: String,
        status: reqwest::StatusCode,
    },
    #[error("{what} timed out after {seconds}s")]
    Timeout { what: String, seconds: u64 },
    #[error(transparent)]
    Origin(#[from] OriginError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatchError>;

/// Run `fut` under a deadline, mapping expiry to [`WatchError::Timeout`].
pub async fn with_timeout<T, F>(what: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(WatchError::Timeout {
            what: what.to_string(),
            seconds: limit.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let out = with_timeout("quick", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(out.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let out: Result<()> = with_timeout("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        match out {
            Err(WatchError::Timeout { what, .. }) => assert_eq!(what, "slow"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_origin_error_is_transparent() {
        let err: WatchError = OriginError::EmptyLeg.into();
        assert_eq!(err.to_string(), OriginError::EmptyLeg.to_string());
    }
}
