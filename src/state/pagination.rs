// Paginated list state.
// Accumulates pages from a fetch function, de-duplicating items by id.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;

use crate::config::PaginationConfig;
use crate::error::{ExplorerError, Result};

/// One fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total item count across all pages, when the source reports one.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: Option<u64>) -> Self {
        Self { items, total }
    }
}

/// Fetches `(page, per_page)`.
pub type FetchPage<T> = Arc<dyn Fn(u32, u32) -> BoxFuture<'static, Result<Page<T>>> + Send + Sync>;

/// Extracts the identity used for de-duplication.
pub type IdOf<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Loading status of a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadingState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

impl LoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, LoadingState::Loading)
    }
}

/// Snapshot of a paginated list.
#[derive(Debug, Clone)]
pub struct PaginationState<T> {
    pub items: Vec<T>,
    /// Last page merged into `items`; zero before the first load.
    pub current_page: u32,
    pub per_page: u32,
    pub total_items: Option<u64>,
    pub status: LoadingState,
    pub last_error: Option<ExplorerError>,
    pub has_more: bool,
}

struct Inner<T> {
    state: PaginationState<T>,
    /// Bumped by reset/reload so in-flight loads from an older list are dropped.
    generation: u64,
}

/// Incrementally loaded list with de-duplication by id.
///
/// `load_more` calls overlapping an outstanding load are silent no-ops; the
/// lock is never held across the fetch.
pub struct Paginator<T, K = u64> {
    inner: Mutex<Inner<T>>,
    fetch: FetchPage<T>,
    id_of: IdOf<T, K>,
    config: PaginationConfig,
}

impl<T, K> Paginator<T, K>
where
    T: Clone,
    K: Eq + Hash,
{
    pub fn new(config: PaginationConfig, fetch: FetchPage<T>, id_of: IdOf<T, K>) -> Self {
        let state = PaginationState {
            items: Vec::new(),
            current_page: config.initial_page.saturating_sub(1),
            per_page: config.per_page,
            total_items: None,
            status: LoadingState::Idle,
            last_error: None,
            has_more: true,
        };
        Self {
            inner: Mutex::new(Inner {
                state,
                generation: 0,
            }),
            fetch,
            id_of,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn snapshot(&self) -> PaginationState<T> {
        self.lock().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.status.is_loading()
    }

    pub fn has_more(&self) -> bool {
        self.lock().state.has_more
    }

    /// Fetch and merge the next page. Returns how many new items were added.
    ///
    /// Failures are recorded as `last_error`, never returned.
    pub async fn load_more(&self) -> usize {
        let (page, per_page, generation) = {
            let mut inner = self.lock();
            if inner.state.status.is_loading() || !inner.state.has_more {
                return 0;
            }
            inner.state.status = LoadingState::Loading;
            inner.state.last_error = None;
            (
                inner.state.current_page + 1,
                inner.state.per_page,
                inner.generation,
            )
        };

        tracing::debug!(page, per_page, "loading page");
        let result = (self.fetch)(page, per_page).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(page, "list was replaced, dropping late page");
            return 0;
        }
        match result {
            Ok(fetched) => self.merge(&mut inner.state, page, fetched),
            Err(err) => {
                tracing::warn!(page, error = %err, "page load failed");
                inner.state.status = LoadingState::Error;
                inner.state.last_error = Some(err);
                0
            }
        }
    }

    fn merge(&self, state: &mut PaginationState<T>, page: u32, fetched: Page<T>) -> usize {
        state.status = LoadingState::Loaded;
        if let Some(total) = fetched.total {
            state.total_items = Some(total);
        }

        if fetched.items.is_empty() {
            state.has_more = false;
            return 0;
        }

        let received = fetched.items.len();
        let mut seen: HashSet<K> = state.items.iter().map(|item| (self.id_of)(item)).collect();
        let fresh: Vec<T> = fetched
            .items
            .into_iter()
            .filter(|item| seen.insert((self.id_of)(item)))
            .collect();

        if fresh.is_empty() {
            tracing::debug!(page, "page held only known items, list exhausted");
            state.has_more = false;
            return 0;
        }

        let added = fresh.len();
        state.items.extend(fresh);
        state.current_page = page;
        state.has_more = match state.total_items {
            Some(total) => (state.items.len() as u64) < total,
            None => received >= state.per_page as usize,
        };
        added
    }

    /// Replace the list contents without fetching.
    pub fn reset(&self, items: Vec<T>, total: Option<u64>) {
        let mut inner = self.lock();
        inner.generation += 1;
        Self::reset_state(&mut inner.state, self.config.initial_page, items, total);
    }

    fn reset_state(state: &mut PaginationState<T>, page: u32, items: Vec<T>, total: Option<u64>) {
        state.has_more = if items.is_empty() {
            false
        } else {
            match total {
                Some(total) => (items.len() as u64) < total,
                None => items.len() >= state.per_page as usize,
            }
        };
        state.items = items;
        state.current_page = page;
        state.total_items = total;
        state.status = LoadingState::Loaded;
        state.last_error = None;
    }

    /// Start over: from `initial` when it is non-empty, otherwise by fetching
    /// the first page.
    pub async fn reload(&self, initial: Option<Vec<T>>) {
        if let Some(items) = initial.filter(|items| !items.is_empty()) {
            self.reset(items, None);
            return;
        }

        let (page, per_page, generation) = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state.status = LoadingState::Loading;
            inner.state.last_error = None;
            (self.config.initial_page, inner.state.per_page, inner.generation)
        };

        let result = (self.fetch)(page, per_page).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        match result {
            Ok(fetched) => Self::reset_state(&mut inner.state, page, fetched.items, fetched.total),
            Err(err) => {
                tracing::warn!(error = %err, "reload failed");
                inner.state.items.clear();
                inner.state.current_page = page.saturating_sub(1);
                inner.state.status = LoadingState::Error;
                inner.state.last_error = Some(err);
            }
        }
    }
}
