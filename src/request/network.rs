// Session-wide network error state.
// A rate-limit or network failure anywhere opens a cooldown that every consumer observes.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Point-in-time view of the network error state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkSnapshot {
    pub last_error_at: Option<Instant>,
    pub cooldown_until: Option<Instant>,
    pub in_cooldown: bool,
}

#[derive(Debug, Default)]
struct NetworkState {
    last_error_at: Option<Instant>,
    cooldown_until: Option<Instant>,
}

/// Shared network-error cooldown.
///
/// Constructed once per session and handed to every transport so one
/// component's rate-limit hit suppresses redundant calls everywhere.
#[derive(Debug, Default)]
pub struct NetworkStatus {
    state: Mutex<NetworkState>,
}

impl NetworkStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a network error and open (or extend) the global cooldown.
    pub fn set_network_error(&self, cooldown: Duration) {
        let now = Instant::now();
        let until = now + cooldown;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_error_at = Some(now);
        state.cooldown_until = Some(state.cooldown_until.map_or(until, |t| t.max(until)));
        tracing::warn!(cooldown_ms = cooldown.as_millis() as u64, "network cooldown opened");
    }

    pub fn is_in_global_cooldown(&self) -> bool {
        self.remaining_cooldown().is_some()
    }

    /// Time left in the current cooldown, if one is active.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        state
            .cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Manually clear the error state.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.cooldown_until = None;
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        NetworkSnapshot {
            last_error_at: state.last_error_at,
            cooldown_until: state.cooldown_until,
            in_cooldown: state.cooldown_until.is_some_and(|until| until > now),
        }
    }
}
