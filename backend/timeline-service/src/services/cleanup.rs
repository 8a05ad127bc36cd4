//! Background removal of post snapshots from day buckets.
//!
//! Jobs are detached from the request that produced them: the caller only
//! enqueues, a fixed set of workers drains the bounded queue.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::retry_on_conflict;
use crate::domain::DayKey;
use crate::error::{TimelineError, TimelineResult};
use crate::metrics;
use crate::repository::DayBucketStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupJob {
    pub user_id: String,
    pub post_id: String,
    pub day: DayKey,
}

/// Handle for submitting cleanup jobs. Cloning shares the same queue.
#[derive(Clone)]
pub struct CleanupPool {
    sender: mpsc::Sender<CleanupJob>,
}

impl CleanupPool {
    /// Spawns `workers` tasks draining a queue of `queue_capacity` jobs.
    ///
    /// Workers stop once every `CleanupPool` handle has been dropped and the queue is empty.
    pub fn start(
        store: Arc<dyn DayBucketStore>,
        workers: usize,
        queue_capacity: usize,
        max_conflict_retries: u32,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    loop {
                        let job = receiver.lock().await.recv().await;
                        let Some(job) = job else {
                            debug!(worker_id, "Cleanup queue closed, worker exiting");
                            break;
                        };
                        run_job(store.as_ref(), &job, max_conflict_retries).await;
                    }
                })
            })
            .collect();

        (Self { sender }, handles)
    }

    /// Enqueues without waiting. Returns false when the job was dropped.
    pub fn submit(&self, job: CleanupJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    user_id = %job.user_id,
                    post_id = %job.post_id,
                    "Cleanup queue full, dropping job"
                );
                metrics::record_cleanup_job("dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                warn!(
                    user_id = %job.user_id,
                    post_id = %job.post_id,
                    "Cleanup pool stopped, dropping job"
                );
                metrics::record_cleanup_job("dropped");
                false
            }
        }
    }
}

async fn run_job(store: &dyn DayBucketStore, job: &CleanupJob, max_conflict_retries: u32) {
    match remove_snapshot(store, job, max_conflict_retries).await {
        Ok(removed) => {
            metrics::record_cleanup_job("success");
            debug!(
                user_id = %job.user_id,
                post_id = %job.post_id,
                day = %job.day,
                removed,
                "Cache cleanup finished"
            );
        }
        Err(e) => {
            metrics::record_cleanup_job("error");
            error!(
                user_id = %job.user_id,
                post_id = %job.post_id,
                day = %job.day,
                error = %e,
                "Cache cleanup failed"
            );
        }
    }
}

/// Removes one snapshot from its bucket. The bucket record is kept even when it ends up empty.
///
/// Returns whether a snapshot was removed.
pub async fn remove_snapshot(
    store: &dyn DayBucketStore,
    job: &CleanupJob,
    max_conflict_retries: u32,
) -> TimelineResult<bool> {
    retry_on_conflict("cleanup", max_conflict_retries, || async move {
        let Some(mut bucket) = store.get(&job.user_id, job.day).await? else {
            return Ok(false);
        };
        if !bucket.remove(&job.post_id) {
            return Ok(false);
        }
        store.put(&bucket).await?;
        Ok::<bool, TimelineError>(true)
    })
    .await
}
