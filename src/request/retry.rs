// Retry with exponential backoff.
// Bounded retry loop plus externally reported failures feeding one error/cooldown state.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::{ExplorerError, Result};

/// Exponent cap so the shift never overflows before the interval cap applies.
const MAX_EXPONENT: u32 = 10;

/// Fraction of the backoff added as random jitter, at most.
const JITTER_RATIO: f64 = 0.3;

/// Called before each scheduled retry with `(attempt, error, backoff)`.
pub type RetryObserver = Arc<dyn Fn(u32, &ExplorerError, Duration) + Send + Sync>;

/// Error bookkeeping for one logical operation stream.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Consecutive failures since the last success.
    pub error_count: u32,
    pub last_error_at: Option<Instant>,
    pub error: Option<ExplorerError>,
    pub in_cooldown: bool,
}

#[derive(Default)]
struct Inner {
    state: RetryState,
    /// Bumped on every reset and reported failure so stale timers do nothing.
    generation: u64,
    timers: Vec<JoinHandle<()>>,
}

/// Bounded retry loop plus shared error/cooldown state.
///
/// Failures arrive either from [`RetryController::execute_with_retry`] or, for
/// callers that drive their own fetches, from [`RetryController::handle_error`].
/// Backoff for attempt `n` is `base * 2^n` capped at `max_interval`, plus up to
/// 30% jitter. A rate-limit error's mandated wait is a floor under the delay.
pub struct RetryController {
    config: RetryConfig,
    inner: Arc<Mutex<Inner>>,
    on_retry: Option<RetryObserver>,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl RetryController {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            on_retry: None,
        }
    }

    /// Set a callback invoked before every scheduled retry.
    #[must_use]
    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.on_retry = Some(observer);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> RetryState {
        self.lock().state.clone()
    }

    /// Backoff for the given attempt without jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_EXPONENT);
        self.config
            .base_interval
            .saturating_mul(factor)
            .min(self.config.max_interval)
    }

    /// Backoff for the given attempt with jitter, never above `max_interval`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        let max_jitter = base.as_secs_f64() * JITTER_RATIO;
        let jitter = if max_jitter > 0.0 {
            rand::rng().random_range(0.0..=max_jitter)
        } else {
            0.0
        };
        (base + Duration::from_secs_f64(jitter)).min(self.config.max_interval)
    }

    /// Delay before retrying `err`, honouring a server-mandated wait.
    fn delay_for(&self, attempt: u32, err: &ExplorerError) -> Duration {
        let backoff = self.backoff(attempt);
        match err.retry_after() {
            Some(mandated) => backoff.max(mandated),
            None => backoff,
        }
    }

    /// Run `operation`, retrying retryable failures up to `max_attempts` times.
    ///
    /// Success resets the error state. Cancellation is surfaced at once and
    /// never retried.
    pub async fn execute_with_retry<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_retry_until(None, operation).await
    }

    /// [`execute_with_retry`] that gives up with `Aborted` once `signal` fires,
    /// checked before every attempt and during every backoff wait.
    ///
    /// [`execute_with_retry`]: RetryController::execute_with_retry
    pub async fn execute_with_retry_until<T, F, Fut>(
        &self,
        signal: Option<&CancellationToken>,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            if signal.is_some_and(|s| s.is_cancelled()) {
                return Err(ExplorerError::Aborted);
            }

            match operation().await {
                Ok(value) => {
                    self.reset();
                    return Ok(value);
                }
                Err(err) if err.is_aborted() => return Err(err),
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for(attempt, &err);
                    if let Some(observer) = &self.on_retry {
                        observer(attempt, &err, delay);
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after failure"
                    );
                    match signal {
                        Some(signal) => tokio::select! {
                            biased;
                            _ = signal.cancelled() => return Err(ExplorerError::Aborted),
                            _ = tokio::time::sleep(delay) => {}
                        },
                        None => tokio::time::sleep(delay).await,
                    }
                }
                Err(err) => {
                    self.mark_exhausted(&err);
                    return Err(err);
                }
            }
        }
    }

    /// Record a failure that happened outside [`execute_with_retry`].
    ///
    /// Bumps the consecutive error count, enters cooldown and, while retries
    /// remain, schedules the cooldown to clear after the backoff delay.
    ///
    /// [`execute_with_retry`]: RetryController::execute_with_retry
    pub fn handle_error(&self, err: ExplorerError) {
        let (error_count, generation) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state.error_count += 1;
            inner.state.last_error_at = Some(Instant::now());
            inner.state.error = Some(err.clone());
            inner.state.in_cooldown = true;
            (inner.state.error_count, inner.generation)
        };

        if error_count > self.config.max_attempts {
            tracing::warn!(error_count, error = %err, "retry budget exhausted");
            return;
        }

        let delay = self.delay_for(error_count, &err);
        if let Some(observer) = &self.on_retry {
            observer(error_count, &err, delay);
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, cooldown will not clear automatically");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.generation == generation {
                inner.state.in_cooldown = false;
            }
        });

        let mut inner = self.lock();
        inner.timers.retain(|t| !t.is_finished());
        inner.timers.push(timer);
    }

    /// Final failure of the wrapped path: recorded, nothing scheduled.
    fn mark_exhausted(&self, err: &ExplorerError) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.state.error_count += 1;
        inner.state.last_error_at = Some(Instant::now());
        inner.state.error = Some(err.clone());
        inner.state.in_cooldown = false;
    }

    /// Cancel every pending cooldown timer.
    pub fn cleanup(&self) {
        let mut inner = self.lock();
        for timer in inner.timers.drain(..) {
            timer.abort();
        }
    }

    /// Clear timers and return to a clean state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        for timer in inner.timers.drain(..) {
            timer.abort();
        }
        inner.generation += 1;
        inner.state = RetryState::default();
    }
}

impl Drop for RetryController {
    fn drop(&mut self) {
        self.cleanup();
    }
}
