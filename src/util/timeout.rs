//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::MurmurError;

/// Wrap a future with a timeout; an elapsed deadline becomes [`MurmurError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, MurmurError>>,
) -> Result<T, MurmurError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(MurmurError::Timeout(duration.as_millis() as u64)),
    }
}
