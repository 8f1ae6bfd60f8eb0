// Request de-duplication.
// Collapses concurrent identical requests into one shared operation and enforces a
// per-key cooldown between attempts.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;

use crate::error::{ExplorerError, Result};

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

/// One outstanding operation and the callers waiting on it.
struct PendingRequest<T> {
    id: u64,
    future: SharedResult<T>,
    started_at: Instant,
    subscribers: usize,
}

struct DedupState<T> {
    pending: HashMap<String, PendingRequest<T>>,
    last_attempt: HashMap<String, Instant>,
    next_id: u64,
}

impl<T> Default for DedupState<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            last_attempt: HashMap::new(),
            next_id: 0,
        }
    }
}

fn lock<T>(state: &Mutex<DedupState<T>>) -> MutexGuard<'_, DedupState<T>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Ensures at most one in-flight operation per key.
///
/// Cloning is cheap and yields a handle to the same shared state.
pub struct RequestDeduplicator<T> {
    state: Arc<Mutex<DedupState<T>>>,
    cooldown: Duration,
}

impl<T> Clone for RequestDeduplicator<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            cooldown: self.cooldown,
        }
    }
}

impl<T> std::fmt::Debug for RequestDeduplicator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("RequestDeduplicator")
            .field("cooldown", &self.cooldown)
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState::default())),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Run `operation` for `key`, sharing its outcome with concurrent callers.
    ///
    /// If an operation for `key` is already pending, the caller joins it and
    /// `operation` is never invoked. Otherwise the call is rejected with
    /// `CooldownActive` while the key's cooldown window is open. The pending
    /// record is removed as soon as the operation settles, whatever its outcome.
    ///
    /// The operation runs on its own task: dropping every caller does not
    /// cancel it. Must be called inside a Tokio runtime.
    pub async fn execute<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let future = {
            let mut state = lock(&self.state);

            if let Some(pending) = state.pending.get_mut(key) {
                pending.subscribers += 1;
                tracing::debug!(
                    key,
                    subscribers = pending.subscribers,
                    "joining in-flight request"
                );
                pending.future.clone()
            } else {
                let now = Instant::now();
                if let Some(last) = state.last_attempt.get(key) {
                    let elapsed = now.saturating_duration_since(*last);
                    if elapsed < self.cooldown {
                        tracing::debug!(key, "request rejected, key on cooldown");
                        return Err(ExplorerError::CooldownActive {
                            key: key.to_string(),
                            remaining: self.cooldown - elapsed,
                        });
                    }
                }

                let id = state.next_id;
                state.next_id += 1;

                let settle_state = Arc::downgrade(&self.state);
                let settle_key = key.to_string();
                // Spawned so the operation settles even if every caller goes away.
                let task = tokio::spawn(async move {
                    let result = operation().await;
                    if let Some(state) = settle_state.upgrade() {
                        let mut state = lock(&state);
                        // A manual clear may have let a newer request take the slot.
                        if state.pending.get(&settle_key).is_some_and(|p| p.id == id) {
                            state.pending.remove(&settle_key);
                        }
                    }
                    result
                });
                let future = async move {
                    match task.await {
                        Ok(result) => result,
                        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                        Err(_) => Err(ExplorerError::Aborted),
                    }
                }
                .boxed()
                .shared();

                state.pending.insert(
                    key.to_string(),
                    PendingRequest {
                        id,
                        future: future.clone(),
                        started_at: now,
                        subscribers: 1,
                    },
                );
                state.last_attempt.insert(key.to_string(), now);
                future
            }
        };

        future.await
    }

    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.state).pending.contains_key(key)
    }

    pub fn is_in_cooldown(&self, key: &str) -> bool {
        lock(&self.state)
            .last_attempt
            .get(key)
            .is_some_and(|last| Instant::now().saturating_duration_since(*last) < self.cooldown)
    }

    /// Number of callers sharing the pending request for `key`.
    pub fn subscriber_count(&self, key: &str) -> Option<usize> {
        lock(&self.state).pending.get(key).map(|p| p.subscribers)
    }

    /// How long the pending request for `key` has been running.
    pub fn pending_for(&self, key: &str) -> Option<Duration> {
        lock(&self.state)
            .pending
            .get(key)
            .map(|p| Instant::now().saturating_duration_since(p.started_at))
    }

    /// Stop tracking the pending request for `key`. The operation itself keeps running.
    pub fn clear(&self, key: &str) {
        lock(&self.state).pending.remove(key);
    }

    pub fn clear_all(&self) {
        lock(&self.state).pending.clear();
    }

    /// Forget the last attempt for `key`, lifting its cooldown.
    pub fn clear_cooldown(&self, key: &str) {
        lock(&self.state).last_attempt.remove(key);
    }
}
