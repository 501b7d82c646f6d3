//! Shared engine state
//!
//! The set of currently-active run identifiers is the only state shared
//! across run tasks. It backs two things: refusing to delete a pipeline
//! that still has live runs, and cooperative cancellation flags observed
//! at stage and retry-attempt boundaries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

struct RunHandle {
    pipeline_id: Uuid,
    cancel: Arc<AtomicBool>,
}

/// Tracks live runs and their cancellation flags
#[derive(Default)]
pub struct ActiveRuns {
    inner: Mutex<HashMap<Uuid, RunHandle>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run as live; returns its cancellation flag
    pub async fn register(&self, run_id: Uuid, pipeline_id: Uuid) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.inner.lock().await.insert(
            run_id,
            RunHandle {
                pipeline_id,
                cancel: Arc::clone(&cancel),
            },
        );
        cancel
    }

    /// Removes a run that reached a terminal state
    pub async fn release(&self, run_id: Uuid) {
        self.inner.lock().await.remove(&run_id);
    }

    /// Raises the cancellation flag; false when the run is not live
    pub async fn request_cancel(&self, run_id: Uuid) -> bool {
        match self.inner.lock().await.get(&run_id) {
            Some(handle) => {
                handle.cancel.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// The cancellation flag for a live run
    pub async fn cancel_flag(&self, run_id: Uuid) -> Option<Arc<AtomicBool>> {
        self.inner
            .lock()
            .await
            .get(&run_id)
            .map(|h| Arc::clone(&h.cancel))
    }

    /// True while any live run belongs to the pipeline
    pub async fn has_active_for(&self, pipeline_id: Uuid) -> bool {
        self.inner
            .lock()
            .await
            .values()
            .any(|h| h.pipeline_id == pipeline_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_release() {
        let active = ActiveRuns::new();
        let run_id = Uuid::new_v4();
        let pipeline_id = Uuid::new_v4();

        active.register(run_id, pipeline_id).await;
        assert!(active.has_active_for(pipeline_id).await);

        active.release(run_id).await;
        assert!(!active.has_active_for(pipeline_id).await);
    }

    #[tokio::test]
    async fn test_cancel_sets_flag() {
        let active = ActiveRuns::new();
        let run_id = Uuid::new_v4();
        let flag = active.register(run_id, Uuid::new_v4()).await;

        assert!(active.request_cancel(run_id).await);
        assert!(flag.load(Ordering::SeqCst));
        assert!(!active.request_cancel(Uuid::new_v4()).await);
    }
}
