use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Limits how many sessions may use the upstream account at once. Clones
/// share the same permits.
#[derive(Clone, Debug)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl SessionPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Waits for a free slot; the slot is released when the permit drops
    pub async fn acquire(&self) -> anyhow::Result<OwnedSemaphorePermit> {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .context("Session pool closed")
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new(1)
    }
}
