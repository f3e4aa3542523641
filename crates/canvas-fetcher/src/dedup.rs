//! In-flight request registry.
//!
//! At most one operation per resource id is outstanding at a time. The first
//! caller for an id claims it and starts the operation; later callers join
//! the pending [`SharedOp`] and receive the same result. Entries are removed
//! when the operation finishes, successfully or not.
//!
//! Check-and-register happens under a single lock acquisition in
//! [`RequestDeduplicator::claim`], so two callers can never both decide an
//! id is free.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use canvas_types::{env_bool, ResourceId};
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::SyncError;

/// A pending operation every interested caller can await.
pub type SharedOp<T> = Shared<BoxFuture<'static, Result<T, SyncError>>>;

/// Identifies one registration, so a finished operation never removes the
/// entry of a newer one for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpToken(u64);

struct Pending<T> {
    token: OpToken,
    op: SharedOp<T>,
}

/// Result of [`RequestDeduplicator::claim`].
pub struct Claim<T> {
    /// Ids that already had an operation in flight, with that operation.
    pub joined: Vec<(ResourceId, SharedOp<T>)>,
    /// Ids this caller now owns.
    pub claimed: Vec<ResourceId>,
    /// The operation started for `claimed`, if any ids were claimed.
    pub op: Option<SharedOp<T>>,
}

impl<T> Claim<T> {
    /// Every id with the operation that will produce its result.
    pub fn all_ops(&self) -> Vec<(ResourceId, SharedOp<T>)>
    where
        T: Clone,
    {
        let mut ops = self.joined.clone();
        if let Some(op) = &self.op {
            ops.extend(self.claimed.iter().map(|id| (id.clone(), op.clone())));
        }
        ops
    }
}

/// Registry of in-flight operations keyed by resource id.
pub struct RequestDeduplicator<T: Clone> {
    name: &'static str,
    pending: Mutex<HashMap<ResourceId, Pending<T>>>,
    next_token: AtomicU64,
}

fn dedup_debug_enabled() -> bool {
    env_bool("CANVAS_DEBUG_DEDUP")
}

impl<T: Clone> RequestDeduplicator<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            pending: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    fn next_token(&self) -> OpToken {
        OpToken(self.next_token.fetch_add(1, Ordering::Relaxed))
    }

    /// The pending operation for `id`, if one is in flight.
    pub fn begin(&self, id: &str) -> Option<SharedOp<T>> {
        self.pending.lock().get(id).map(|p| p.op.clone())
    }

    /// Register `op` as the in-flight operation for `ids`.
    pub fn register(&self, ids: &[ResourceId], op: SharedOp<T>) -> OpToken {
        let token = self.next_token();
        let mut pending = self.pending.lock();
        for id in ids {
            pending.insert(
                id.clone(),
                Pending {
                    token,
                    op: op.clone(),
                },
            );
        }
        token
    }

    /// Remove the entry for `id` if it still belongs to `token`.
    pub fn complete(&self, id: &str, token: OpToken) {
        let mut pending = self.pending.lock();
        if pending.get(id).is_some_and(|p| p.token == token) {
            pending.remove(id);
        }
    }

    pub fn complete_all(&self, ids: &[ResourceId], token: OpToken) {
        let mut pending = self.pending.lock();
        for id in ids {
            if pending.get(id).is_some_and(|p| p.token == token) {
                pending.remove(id);
            }
        }
    }

    /// Atomically split `ids` into those already in flight (joined) and the
    /// rest, which are registered under a new operation built by `make`.
    ///
    /// `make` runs while the registry is locked; it must only construct the
    /// operation (e.g. spawn a task), never wait on it.
    pub fn claim<F>(&self, ids: &[ResourceId], make: F) -> Claim<T>
    where
        F: FnOnce(Vec<ResourceId>, OpToken) -> SharedOp<T>,
    {
        let mut pending = self.pending.lock();
        let mut joined = Vec::new();
        let mut claimed = Vec::new();
        for id in ids {
            match pending.get(id) {
                Some(existing) => joined.push((id.clone(), existing.op.clone())),
                None => claimed.push(id.clone()),
            }
        }

        let op = if claimed.is_empty() {
            None
        } else {
            let token = self.next_token();
            let op = make(claimed.clone(), token);
            for id in &claimed {
                pending.insert(
                    id.clone(),
                    Pending {
                        token,
                        op: op.clone(),
                    },
                );
            }
            Some(op)
        };
        drop(pending);

        if !joined.is_empty() {
            let joined_ids: Vec<&str> = joined.iter().map(|(id, _)| id.as_str()).collect();
            if dedup_debug_enabled() {
                info!(registry = self.name, ids = ?joined_ids, "duplicate request, awaiting pending operation");
            } else {
                debug!(registry = self.name, ids = ?joined_ids, "duplicate request, awaiting pending operation");
            }
        }

        Claim {
            joined,
            claimed,
            op,
        }
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Releases a claim when dropped, so the entry goes away on success, error,
/// timeout, panic or cancellation alike.
pub struct PendingRelease<T: Clone> {
    registry: Arc<RequestDeduplicator<T>>,
    ids: Vec<ResourceId>,
    token: OpToken,
}

impl<T: Clone> PendingRelease<T> {
    pub fn new(registry: Arc<RequestDeduplicator<T>>, ids: Vec<ResourceId>, token: OpToken) -> Self {
        Self {
            registry,
            ids,
            token,
        }
    }
}

impl<T: Clone> Drop for PendingRelease<T> {
    fn drop(&mut self) {
        self.registry.complete_all(&self.ids, self.token);
    }
}
