// Configuration for the data-access layer.
// Loaded from a JSON file with per-field defaults; durations are stored in milliseconds.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::KeyValueStore;
use crate::cache::paths::config_path;
use crate::error::{ExplorerError, Result};
use crate::github::client::TokenProvider;

/// Storage key holding a user-supplied API token.
pub const TOKEN_STORAGE_KEY: &str = "github_token";

/// Environment variable consulted when no token is stored or configured.
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Serde helpers for durations expressed as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// When the domain service substitutes mock data for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Surface every failure.
    Never,
    /// Substitute on network, HTTP and rate-limit failures; surface parse errors.
    #[default]
    OnTransportFailure,
    /// Substitute on any failure except cancellation.
    Always,
}

impl FallbackPolicy {
    /// Whether this policy covers the given failure.
    pub fn covers(&self, err: &ExplorerError) -> bool {
        match self {
            FallbackPolicy::Never => false,
            FallbackPolicy::Always => !err.is_aborted(),
            FallbackPolicy::OnTransportFailure => matches!(
                err,
                ExplorerError::Transport { .. }
                    | ExplorerError::RateLimited { .. }
                    | ExplorerError::Network(_)
            ),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Static token; the persisted token and `GITHUB_TOKEN` are consulted too.
    pub token: Option<String>,
    /// How many times a 429 response is retried after its mandated wait.
    pub rate_limit_retries: u32,
    /// Wait used when a 429 response carries no `Retry-After` header.
    #[serde(with = "duration_ms")]
    pub default_retry_after: Duration,
    /// Global cooldown opened after a network failure or an exhausted 429 budget.
    #[serde(with = "duration_ms")]
    pub network_cooldown: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            user_agent: "gh-explorer".to_string(),
            token: None,
            rate_limit_retries: 3,
            default_retry_after: Duration::from_secs(10),
            network_cooldown: Duration::from_secs(5),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    #[serde(with = "duration_ms")]
    pub stale_after: Duration,
    pub max_entries: usize,
    #[serde(with = "duration_ms")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),
            max_entries: 50,
            sweep_interval: Duration::from_secs(30),
        }
    }
}

/// Request de-duplication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Minimum spacing between attempts for the same key.
    #[serde(with = "duration_ms")]
    pub cooldown: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(2),
        }
    }
}

/// Retry/backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub base_interval: Duration,
    #[serde(with = "duration_ms")]
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(max_attempts: u32, base_interval: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts,
            base_interval,
            max_interval,
        }
    }
}

/// Paginated list settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    pub initial_page: u32,
    pub per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            initial_page: 1,
            per_page: 10,
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub dedup: DedupConfig,
    pub retry: RetryConfig,
    pub pagination: PaginationConfig,
    pub fallback: FallbackPolicy,
}

impl ExplorerConfig {
    /// Load configuration.
    ///
    /// Search order:
    /// 1. Explicit path if provided (must exist)
    /// 2. `<config_dir>/gh-explorer/config.json`
    /// 3. Built-in defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            if !path.exists() {
                return Err(ExplorerError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::load_from_path(path);
        }

        match config_path().filter(|p| p.exists()) {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            ExplorerError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Token provider resolving, in order: the persisted token, the configured
    /// token, then the `GITHUB_TOKEN` environment variable.
    pub fn token_provider(&self, storage: Arc<dyn KeyValueStore>) -> TokenProvider {
        let configured = self.api.token.clone();
        Arc::new(move || {
            storage
                .get(TOKEN_STORAGE_KEY)
                .ok()
                .flatten()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .or_else(|| configured.clone())
                .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
                .filter(|t| !t.is_empty())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "dedup": { "cooldown": 500 }, "fallback": "never" }"#;
        let config: ExplorerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.dedup.cooldown, Duration::from_millis(500));
        assert_eq!(config.fallback, FallbackPolicy::Never);
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.api.base_url, "https://api.github.com");
    }

    #[test]
    fn test_load_explicit_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "pagination": { "per_page": 25 } }"#).unwrap();

        let config = ExplorerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.pagination.per_page, 25);
        assert_eq!(config.pagination.initial_page, 1);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp_dir = TempDir::new().unwrap();
        let err = ExplorerConfig::load(Some(&temp_dir.path().join("nope.json"))).unwrap_err();
        assert!(matches!(err, ExplorerError::Config(_)));
    }

    #[test]
    fn test_token_provider_prefers_stored_token() {
        let storage = Arc::new(MemoryStore::new());
        let mut config = ExplorerConfig::default();
        config.api.token = Some("configured".to_string());

        let provider = config.token_provider(storage.clone());
        assert_eq!(provider(), Some("configured".to_string()));

        storage.set(TOKEN_STORAGE_KEY, "stored").unwrap();
        assert_eq!(provider(), Some("stored".to_string()));
    }

    #[test]
    fn test_fallback_policy_coverage() {
        let http = ExplorerError::http(500, None);
        let parse = ExplorerError::Parse("bad json".to_string());

        assert!(FallbackPolicy::OnTransportFailure.covers(&http));
        assert!(!FallbackPolicy::OnTransportFailure.covers(&parse));
        assert!(FallbackPolicy::Always.covers(&parse));
        assert!(!FallbackPolicy::Always.covers(&ExplorerError::Aborted));
        assert!(!FallbackPolicy::Never.covers(&http));
    }
}
