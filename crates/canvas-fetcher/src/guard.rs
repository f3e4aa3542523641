//! Bounds on remote calls: a per-call timeout and a session-wide shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use canvas_transport::RemoteError;
use canvas_types::ResourceId;
use tokio::sync::watch;

use crate::error::{SyncError, SyncResult};
use crate::memory::MemoryRegistry;

/// Session-wide shutdown switch. Once triggered it stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Wraps remote calls with the configured timeout and the shutdown signal.
#[derive(Debug, Clone)]
pub struct RemoteCallGuard {
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl RemoteCallGuard {
    pub fn new(timeout: Duration, shutdown: &ShutdownSignal) -> Self {
        Self {
            timeout,
            shutdown: shutdown.subscribe(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run `call` for `ids`, mapping its outcome to [`SyncError`].
    pub async fn call<T, F>(&self, ids: &[ResourceId], call: F) -> SyncResult<T>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        if self.is_shut_down() {
            return Err(SyncError::Cancelled { ids: ids.to_vec() });
        }

        let mut shutdown = self.shutdown.clone();
        let cancelled = async move {
            // A dropped sender means the session is gone without a shutdown;
            // leave the call to its timeout.
            if shutdown.wait_for(|stopped| *stopped).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => Err(SyncError::Cancelled { ids: ids.to_vec() }),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(SyncError::from_remote(ids, error)),
                Err(_) => Err(SyncError::Timeout { ids: ids.to_vec() }),
            },
        }
    }
}

/// Marks a record as loading for as long as the guard lives.
pub struct LoadingGuard {
    memory: Arc<MemoryRegistry>,
    id: ResourceId,
}

impl LoadingGuard {
    pub fn new(memory: Arc<MemoryRegistry>, id: ResourceId) -> Self {
        memory.set_loading(&id, true);
        Self { memory, id }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.memory.set_loading(&self.id, false);
    }
}
