//! One-way notices for conditions the caller should know about but that
//! must not fail the operation that discovered them.

use std::sync::Arc;

use parking_lot::Mutex;

/// A condition worth surfacing to the user once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The durable cache could not be opened; the session runs memory-only.
    PersistenceUnavailable { reason: String },
}

/// Receiver of [`Notice`]s, typically wired to a toast or status bar.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::PersistenceUnavailable { reason } => {
                tracing::warn!(%reason, "durable cache unavailable, continuing memory-only");
            }
        }
    }
}

/// Notifier that records every notice, for tests and diagnostics.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
