//! Errors surfaced by the cache coordinators.

use canvas_transport::RemoteError;
use canvas_types::ResourceId;

/// Failure of a cache-layer operation.
///
/// `Clone` so one batch failure can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The resources are definitively absent (remote 404, or a cache-only
    /// read that missed).
    #[error("not found: {}", .ids.join(", "))]
    NotFound { ids: Vec<ResourceId> },

    #[error("permission denied: cannot {action} {id}")]
    PermissionDenied { id: ResourceId, action: String },

    #[error("invalid state for {id}: {reason}")]
    InvalidState { id: ResourceId, reason: String },

    /// The remote call failed; `message` is the transport's own message.
    #[error("remote request for [{}] failed: {message}", .ids.join(", "))]
    Transport { ids: Vec<ResourceId>, message: String },

    #[error("durable cache unavailable: {reason}")]
    PersistenceUnavailable { reason: String },

    #[error("remote request for [{}] timed out", .ids.join(", "))]
    Timeout { ids: Vec<ResourceId> },

    #[error("remote request for [{}] was cancelled", .ids.join(", "))]
    Cancelled { ids: Vec<ResourceId> },
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    pub fn not_found(id: impl Into<ResourceId>) -> Self {
        SyncError::NotFound {
            ids: vec![id.into()],
        }
    }

    pub fn permission_denied(id: impl Into<ResourceId>, action: &str) -> Self {
        SyncError::PermissionDenied {
            id: id.into(),
            action: action.to_string(),
        }
    }

    pub fn invalid_state(id: impl Into<ResourceId>, reason: impl Into<String>) -> Self {
        SyncError::InvalidState {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Classify a remote failure of a call covering `ids`.
    pub fn from_remote(ids: &[ResourceId], error: RemoteError) -> Self {
        match error {
            RemoteError::NotFound { id } => SyncError::NotFound { ids: vec![id] },
            other => SyncError::Transport {
                ids: ids.to_vec(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }

    /// Ids the error is about, where it names any.
    pub fn ids(&self) -> Vec<ResourceId> {
        match self {
            SyncError::NotFound { ids }
            | SyncError::Transport { ids, .. }
            | SyncError::Timeout { ids }
            | SyncError::Cancelled { ids } => ids.clone(),
            SyncError::PermissionDenied { id, .. } | SyncError::InvalidState { id, .. } => {
                vec![id.clone()]
            }
            SyncError::PersistenceUnavailable { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_remote_keeps_not_found_distinct() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            SyncError::from_remote(&ids, RemoteError::NotFound { id: "b".to_string() }),
            SyncError::not_found("b")
        );

        let err = SyncError::from_remote(&ids, RemoteError::Transport("reset".to_string()));
        assert_eq!(err.ids(), ids);
        assert_eq!(
            err.to_string(),
            "remote request for [a, b] failed: transport failure: reset"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            SyncError::NotFound {
                ids: vec!["x".to_string(), "y".to_string()]
            }
            .to_string(),
            "not found: x, y"
        );
        assert_eq!(
            SyncError::permission_denied("x", "download").to_string(),
            "permission denied: cannot download x"
        );
    }
}
