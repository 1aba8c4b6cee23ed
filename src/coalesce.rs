//! Deduplicates concurrent transforms of the same variant.
//!
//! The first request for a key (leader) registers a shared future that
//! fetches the origin, transforms it and writes the caches. Requests for the
//! same key that arrive while it runs await that future instead of repeating
//! the work, and receive the same result or error.

use crate::cache::{CacheEntry, CacheKey};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

type SharedTransform = Shared<BoxFuture<'static, crate::Result<CacheEntry>>>;

#[derive(Clone, Default)]
pub struct InFlight {
    pending: Arc<Mutex<HashMap<CacheKey, SharedTransform>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `produce` for `key` unless a run for the same key is already
    /// pending, in which case that run's outcome is awaited and returned.
    pub async fn run<F, Fut>(&self, key: &CacheKey, produce: F) -> crate::Result<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<CacheEntry>> + Send + 'static,
    {
        let (shared, _guard) = {
            let mut pending = self.pending.lock();
            match pending.get(key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "Joining in-flight transform");
                    crate::METRICS.coalesced.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    (existing.clone(), None)
                }
                None => {
                    let shared = produce().boxed().shared();
                    pending.insert(key.clone(), shared.clone());
                    let guard = PendingGuard {
                        key: key.clone(),
                        pending: self.pending.clone(),
                    };
                    (shared, Some(guard))
                }
            }
        };

        shared.await
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held by the leader; unregisters the key when the leader finishes or is dropped.
struct PendingGuard {
    key: CacheKey,
    pending: Arc<Mutex<HashMap<CacheKey, SharedTransform>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.key);
    }
}
