pub mod cleanup;
pub mod fanout;
pub mod kafka_events;
pub mod timeline;

pub use cleanup::{CleanupJob, CleanupPool};
pub use fanout::{FanOutPublisher, FanOutReport};
pub use kafka_events::KafkaEventPublisher;
pub use timeline::{TimelineFillService, TimelineSettings};

use std::future::Future;
use tracing::{debug, warn};

use crate::error::TimelineResult;
use crate::metrics;

/// Re-runs a read-modify-write of day buckets while it fails with a version conflict.
///
/// `max_retries` counts the extra attempts after the first one.
pub(crate) async fn retry_on_conflict<T, F, Fut>(
    operation: &str,
    max_retries: u32,
    mut attempt: F,
) -> TimelineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TimelineResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_conflict() => {
                if retries >= max_retries {
                    metrics::record_write_conflict("exhausted");
                    warn!(operation = %operation, retries, "Day bucket conflict persisted, giving up");
                    return Err(e);
                }
                retries += 1;
                metrics::record_write_conflict("retried");
                debug!(operation = %operation, retry = retries, "Day bucket changed concurrently, retrying");
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimelineError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_converges_after_conflicts() {
        let calls = &AtomicU32::new(0);
        let result = retry_on_conflict("test", 5, || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TimelineError::Conflict("busy".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_and_ignores_other_errors() {
        let calls = &AtomicU32::new(0);
        let result: TimelineResult<()> = retry_on_conflict("test", 2, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TimelineError::Conflict("busy".into()))
        })
        .await;
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let calls = &AtomicU32::new(0);
        let result: TimelineResult<()> = retry_on_conflict("test", 2, || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TimelineError::Gateway("down".into()))
        })
        .await;
        assert!(matches!(result, Err(TimelineError::Gateway(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
