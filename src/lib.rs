// GitHub user explorer data-access layer.
// Cached, de-duplicated and retried access to GitHub users, with mock fallback.

pub mod cache;
pub mod config;
pub mod error;
pub mod github;
pub mod request;
pub mod state;

use std::sync::Arc;

use tokio::task::JoinHandle;

pub use config::{ExplorerConfig, FallbackPolicy};
pub use error::{ExplorerError, Result};
pub use github::{ApiClient, GithubService, Repository, SearchResult, User};
pub use state::{FavoritesStore, UserList, UserListOptions, UserListState};

use cache::{KeyValueStore, ResponseCache};
use request::{NetworkStatus, RequestDeduplicator};

/// Session-wide shared services.
///
/// Built once at startup and passed to every consumer, so a rate-limit hit
/// or cached page in one list is seen by all of them.
pub struct Services {
    pub config: ExplorerConfig,
    pub storage: Arc<dyn KeyValueStore>,
    pub network: Arc<NetworkStatus>,
    pub client: Arc<ApiClient>,
    pub github: GithubService,
    pub search_cache: Arc<ResponseCache<SearchResult>>,
    pub search_dedup: RequestDeduplicator<SearchResult>,
}

impl Services {
    pub fn new(config: ExplorerConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let network = Arc::new(NetworkStatus::new());
        let client = Arc::new(
            ApiClient::new(&config.api)?
                .with_token_provider(config.token_provider(Arc::clone(&storage)))
                .with_network_status(Arc::clone(&network))
                .with_error_observer(Arc::new(|err: &ExplorerError, endpoint: &str| {
                    tracing::debug!(endpoint, error = %err, "API request failed");
                })),
        );
        let github = GithubService::new(Arc::clone(&client), config.fallback);
        let search_cache = Arc::new(ResponseCache::new(config.cache.clone()));
        let search_dedup = RequestDeduplicator::new(config.dedup.cooldown);

        Ok(Self {
            config,
            storage,
            network,
            client,
            github,
            search_cache,
            search_dedup,
        })
    }

    /// Favorites persisted in this session's storage.
    pub fn favorites(&self) -> FavoritesStore {
        FavoritesStore::load(Arc::clone(&self.storage))
    }

    /// Start periodic cache sweeping. Must be called inside a Tokio runtime.
    pub fn start_housekeeping(&self) -> JoinHandle<()> {
        self.search_cache.spawn_sweeper()
    }
}
