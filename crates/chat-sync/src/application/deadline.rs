//! Per-request deadlines.

use std::future::Future;
use std::time::Duration;

use crate::domain::{SyncError, SyncResult};

/// Run `fut`, failing with [`SyncError::Timeout`] after `limit`.
pub(crate) async fn with_deadline<T, F>(limit: Duration, fut: F) -> SyncResult<T>
where
    F: Future<Output = SyncResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(limit.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let result: SyncResult<()> = with_deadline(Duration::from_millis(500), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(SyncError::Timeout(500)));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(7u32) }).await;
        assert_eq!(result, Ok(7));
    }
}
