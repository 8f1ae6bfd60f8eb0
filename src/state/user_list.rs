// User list orchestration.
// Wires cache, de-duplication, retry and pagination around the GitHub service.

use std::sync::{Arc, Mutex};

use futures::FutureExt;
use tokio::sync::watch;

use crate::Services;
use crate::cache::{QueryParams, ResponseCache, build_key};
use crate::error::{ExplorerError, Result};
use crate::github::{GithubService, SearchResult, User};
use crate::request::{RequestDeduplicator, RetryController, RetryState};

use super::pagination::{FetchPage, IdOf, Page, Paginator};

/// Cache/dedup endpoint for live searches.
const SEARCH_ENDPOINT: &str = "users";

/// Cache/dedup endpoint for searches over the local favorites list.
const FAVORITES_ENDPOINT: &str = "favorites";

/// How a list is populated.
#[derive(Debug, Clone, Default)]
pub struct UserListOptions {
    /// Serve results from `favorites` instead of the API.
    pub show_favorites: bool,
    pub favorites: Vec<User>,
}

/// What the UI renders.
#[derive(Debug, Clone, Default)]
pub struct UserListState {
    pub users: Vec<User>,
    pub loading: bool,
    pub has_more: bool,
    pub error: Option<ExplorerError>,
}

/// Resolves one page of users through cache, dedup and retry.
struct UserFetcher {
    service: GithubService,
    cache: Arc<ResponseCache<SearchResult>>,
    dedup: RequestDeduplicator<SearchResult>,
    retry: Arc<RetryController>,
    show_favorites: bool,
    favorites: Mutex<Vec<User>>,
    query: Mutex<String>,
}

impl UserFetcher {
    fn endpoint(&self) -> &'static str {
        if self.show_favorites {
            FAVORITES_ENDPOINT
        } else {
            SEARCH_ENDPOINT
        }
    }

    fn query(&self) -> String {
        self.query.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_query(&self, query: &str) {
        *self.query.lock().unwrap_or_else(|e| e.into_inner()) = query.trim().to_string();
    }

    fn set_favorites(&self, favorites: Vec<User>) {
        *self.favorites.lock().unwrap_or_else(|e| e.into_inner()) = favorites;
    }

    /// Favorites matching `query`, all of them.
    fn matching_favorites(&self, query: &str) -> Vec<User> {
        let needle = query.trim().to_lowercase();
        self.favorites
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|user| user.matches(&needle))
            .cloned()
            .collect()
    }

    fn filter_favorites(&self, query: &str, page: u32, per_page: u32) -> SearchResult {
        let matching = self.matching_favorites(query);
        let start = (page.max(1) as usize - 1) * per_page as usize;
        SearchResult {
            total_count: matching.len() as u64,
            incomplete_results: false,
            items: matching
                .into_iter()
                .skip(start)
                .take(per_page as usize)
                .collect(),
        }
    }

    /// Cache, then de-duplicated fetch. Cooldown rejections are returned as errors.
    ///
    /// With `inline_retry` the search runs inside the retry loop; otherwise the
    /// caller reports failures through [`RetryController::handle_error`].
    async fn fetch_raw(
        self: &Arc<Self>,
        query: String,
        page: u32,
        per_page: u32,
        inline_retry: bool,
    ) -> Result<SearchResult> {
        let params = QueryParams::new()
            .with("q", &query)
            .with("page", page)
            .with("per_page", per_page);
        let key = build_key(self.endpoint(), Some(&params));

        if let Some(hit) = self.cache.get_fresh(&key) {
            tracing::debug!(%key, "serving users from cache");
            return Ok(hit);
        }

        let this = Arc::clone(self);
        let cache_key = key.clone();
        self.dedup
            .execute(&key, move || async move {
                let result = if this.show_favorites {
                    Ok(this.filter_favorites(&query, page, per_page))
                } else if inline_retry {
                    this.retry
                        .execute_with_retry(|| this.service.search_users(&query, page, per_page))
                        .await
                } else {
                    this.service.search_users(&query, page, per_page).await
                };
                if let Ok(found) = &result {
                    this.cache.set(cache_key, found.clone());
                }
                result
            })
            .await
    }

    /// Like [`UserFetcher::fetch_raw`], but a cooldown yields an empty, incomplete result.
    async fn fetch_users(
        self: &Arc<Self>,
        query: String,
        page: u32,
        per_page: u32,
    ) -> Result<SearchResult> {
        match self.fetch_raw(query, page, per_page, true).await {
            Err(err) if err.is_cooldown() => Ok(SearchResult::incomplete_empty()),
            other => other,
        }
    }
}

/// Searchable, incrementally loaded list of users.
pub struct UserList {
    fetcher: Arc<UserFetcher>,
    paginator: Paginator<User>,
    state_tx: watch::Sender<UserListState>,
}

impl UserList {
    pub fn new(services: &Services, options: UserListOptions) -> Self {
        let retry = Arc::new(RetryController::new(services.config.retry.clone()));
        let fetcher = Arc::new(UserFetcher {
            service: services.github.clone(),
            cache: Arc::clone(&services.search_cache),
            dedup: services.search_dedup.clone(),
            retry,
            show_favorites: options.show_favorites,
            favorites: Mutex::new(options.favorites),
            query: Mutex::new(String::new()),
        });

        let page_fetcher = Arc::clone(&fetcher);
        let fetch: FetchPage<User> = Arc::new(move |page: u32, per_page: u32| {
            let fetcher = Arc::clone(&page_fetcher);
            async move {
                // A cooldown is a soft miss: keep the list retriable.
                match fetcher.fetch_raw(fetcher.query(), page, per_page, false).await {
                    Ok(result) => {
                        fetcher.retry.reset();
                        Ok(Page::new(result.items, Some(result.total_count)))
                    }
                    Err(err) if err.is_cooldown() => Err(err),
                    Err(err) => {
                        fetcher.retry.handle_error(err.clone());
                        Err(err)
                    }
                }
            }
            .boxed()
        });
        let id_of: IdOf<User, u64> = Arc::new(|user: &User| user.id);

        let (state_tx, _) = watch::channel(UserListState::default());

        Self {
            fetcher,
            paginator: Paginator::new(services.config.pagination.clone(), fetch, id_of),
            state_tx,
        }
    }

    /// Populate the first page: from favorites without network, otherwise
    /// with an empty-query search.
    pub async fn mount(&self) {
        if self.fetcher.show_favorites {
            let favorites = self.fetcher.matching_favorites("");
            let total = favorites.len() as u64;
            self.paginator.reset(favorites, Some(total));
            self.publish(false);
        } else {
            self.search_users("").await;
        }
    }

    /// Start a new search, replacing the current list.
    pub async fn search_users(&self, query: &str) {
        self.fetcher.set_query(query);
        self.fetcher.retry.reset();
        self.publish(true);
        self.paginator.reload(None).await;
        self.publish(false);
    }

    /// Append the next page of the current search.
    ///
    /// Skipped while a previous failure's backoff is still running.
    pub async fn load_more_users(&self) {
        if self.paginator.is_loading()
            || !self.paginator.has_more()
            || self.fetcher.retry.state().in_cooldown
        {
            return;
        }
        self.publish(true);
        self.paginator.load_more().await;
        self.publish(false);
    }

    /// Fetch one page directly. A cooldown yields an empty, incomplete result.
    pub async fn fetch_users(&self, query: &str, page: u32, per_page: u32) -> Result<SearchResult> {
        self.fetcher
            .fetch_users(query.trim().to_string(), page, per_page)
            .await
    }

    /// Replace the favorites list; a favorites-mode list is re-filtered at once.
    pub fn set_favorites(&self, favorites: Vec<User>) {
        self.fetcher.set_favorites(favorites);
        self.fetcher.cache.invalidate_prefix(FAVORITES_ENDPOINT);

        if self.fetcher.show_favorites {
            let matching = self.fetcher.matching_favorites(&self.fetcher.query());
            let total = matching.len() as u64;
            self.paginator.reset(matching, Some(total));
            self.publish(false);
        }
    }

    pub fn query(&self) -> String {
        self.fetcher.query()
    }

    pub fn retry_state(&self) -> RetryState {
        self.fetcher.retry.state()
    }

    /// Current view state.
    pub fn state(&self) -> UserListState {
        self.state_tx.borrow().clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<UserListState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, loading: bool) {
        let snapshot = self.paginator.snapshot();
        let error = snapshot
            .last_error
            .filter(|err| !err.is_cooldown())
            .or_else(|| self.fetcher.retry.state().error);

        self.state_tx.send_replace(UserListState {
            users: snapshot.items,
            loading: loading || snapshot.status.is_loading(),
            has_more: snapshot.has_more,
            error,
        });
    }
}

impl Drop for UserList {
    fn drop(&mut self) {
        self.fetcher.retry.cleanup();
    }
}
