use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::data::{ApplicationId, FormData};

/// Remote store the local snapshot is reconciled with.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    async fn push(&self, application_id: &ApplicationId, snapshot: &FormData)
        -> Result<(), SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("remote rejected the save: {0}")]
    Rejected(String),
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

/// Stand-in remote that acknowledges after a fixed latency. Saves can be switched to
/// fail so callers can exercise the local-only path.
#[derive(Debug)]
pub struct SimulatedSyncTarget {
    latency: Duration,
    reject: AtomicBool,
    attempts: AtomicUsize,
    last_accepted: Mutex<Option<FormData>>,
}

impl SimulatedSyncTarget {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            reject: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
            last_accepted: Mutex::new(None),
        }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn set_rejecting(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_accepted(&self) -> Option<FormData> {
        self.last_accepted
            .lock()
            .expect("sync target mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl SyncTarget for SimulatedSyncTarget {
    async fn push(
        &self,
        application_id: &ApplicationId,
        snapshot: &FormData,
    ) -> Result<(), SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        if self.reject.load(Ordering::SeqCst) {
            return Err(SyncError::Rejected(format!(
                "save for {application_id} refused"
            )));
        }

        *self
            .last_accepted
            .lock()
            .expect("sync target mutex poisoned") = Some(snapshot.clone());
        Ok(())
    }
}
