// Request coordination module.
// De-duplication, retry/backoff and the shared network-error cooldown.

pub mod dedup;
pub mod network;
pub mod retry;

pub use dedup::RequestDeduplicator;
pub use network::{NetworkSnapshot, NetworkStatus};
pub use retry::{RetryController, RetryObserver, RetryState};
