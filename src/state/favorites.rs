// Favorite users.
// Ordered, login-unique list persisted as one JSON array in the key/value store.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::KeyValueStore;
use crate::error::Result;
use crate::github::{GithubService, User};

/// Storage key holding the serialized favorites list.
pub const FAVORITES_STORAGE_KEY: &str = "favorites";

/// Favorites older than this are re-fetched by [`FavoritesStore::refresh`].
pub const REFRESH_INTERVAL_MINUTES: i64 = 5;

/// A user plus when their profile was last fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteUser {
    #[serde(flatten)]
    pub user: User,
    pub last_updated: DateTime<Utc>,
}

impl FavoriteUser {
    pub fn new(user: User) -> Self {
        Self {
            user,
            last_updated: Utc::now(),
        }
    }

    fn is_outdated(&self, now: DateTime<Utc>) -> bool {
        now - self.last_updated > Duration::minutes(REFRESH_INTERVAL_MINUTES)
    }
}

/// Persistent favorites list. No two entries share a login.
pub struct FavoritesStore {
    storage: Arc<dyn KeyValueStore>,
    favorites: Mutex<Vec<FavoriteUser>>,
}

impl std::fmt::Debug for FavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesStore")
            .field("favorites", &self.len())
            .finish()
    }
}

impl FavoritesStore {
    /// Reload the persisted list. Unreadable or corrupt data yields an empty list.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let favorites = match storage.get(FAVORITES_STORAGE_KEY) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "discarding unreadable favorites");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read favorites");
                Vec::new()
            }
        };

        Self {
            storage,
            favorites: Mutex::new(favorites),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FavoriteUser>> {
        self.favorites.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write `next` to storage, then make it the in-memory list.
    ///
    /// A failed write leaves memory untouched.
    fn commit(&self, current: &mut Vec<FavoriteUser>, next: Vec<FavoriteUser>) -> Result<()> {
        let raw = serde_json::to_string(&next)?;
        self.storage.set(FAVORITES_STORAGE_KEY, &raw)?;
        *current = next;
        Ok(())
    }

    /// Add a user, replacing any existing entry with the same login in place.
    pub fn add(&self, user: User) -> Result<()> {
        let mut favorites = self.lock();
        let mut next = favorites.clone();
        let entry = FavoriteUser::new(user);
        match next.iter_mut().find(|f| f.user.login == entry.user.login) {
            Some(existing) => *existing = entry,
            None => next.push(entry),
        }
        self.commit(&mut favorites, next)
    }

    /// Fetch the complete profile before adding, keeping `user` if that fails.
    pub async fn add_from_service(&self, user: User, service: &GithubService) -> Result<()> {
        let user = match service.get_user(&user.login).await {
            Ok(full) => full,
            Err(e) => {
                tracing::warn!(login = %user.login, error = %e, "using partial profile for favorite");
                user
            }
        };
        self.add(user)
    }

    /// Remove by login. Returns whether an entry was removed.
    pub fn remove(&self, login: &str) -> Result<bool> {
        let mut favorites = self.lock();
        let next: Vec<FavoriteUser> = favorites
            .iter()
            .filter(|f| f.user.login != login)
            .cloned()
            .collect();
        if next.len() == favorites.len() {
            return Ok(false);
        }
        self.commit(&mut favorites, next)?;
        Ok(true)
    }

    pub fn contains(&self, login: &str) -> bool {
        self.lock().iter().any(|f| f.user.login == login)
    }

    pub fn is_favorite(&self, login: &str) -> bool {
        self.contains(login)
    }

    /// Re-fetch a favorite whose data is older than the refresh interval.
    ///
    /// Returns `true` when the entry was updated.
    pub async fn refresh(&self, login: &str, service: &GithubService) -> Result<bool> {
        let outdated = self
            .lock()
            .iter()
            .find(|f| f.user.login == login)
            .is_some_and(|f| f.is_outdated(Utc::now()));
        if !outdated {
            return Ok(false);
        }

        let user = service.get_user(login).await?;
        let mut favorites = self.lock();
        let mut next = favorites.clone();
        let Some(existing) = next.iter_mut().find(|f| f.user.login == login) else {
            // Removed while the profile was being fetched.
            return Ok(false);
        };
        *existing = FavoriteUser::new(user);
        self.commit(&mut favorites, next)?;
        Ok(true)
    }

    pub fn favorites(&self) -> Vec<FavoriteUser> {
        self.lock().clone()
    }

    /// Plain user records, in insertion order.
    pub fn users(&self) -> Vec<User> {
        self.lock().iter().map(|f| f.user.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileStore, MemoryStore};
    use crate::config::{ApiConfig, FallbackPolicy};
    use crate::github::{ApiClient, MockDataProvider};
    use crate::error::ExplorerError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn user(login: &str) -> User {
        MockDataProvider::new().user(login)
    }

    fn offline_service() -> GithubService {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ApiConfig::default()
        };
        GithubService::new(
            Arc::new(ApiClient::new(&config).unwrap()),
            FallbackPolicy::OnTransportFailure,
        )
    }

    #[test]
    fn test_add_then_remove_restores_length() {
        let store = FavoritesStore::load(Arc::new(MemoryStore::new()));
        store.add(user("grace")).unwrap();
        let before = store.len();

        store.add(user("ada")).unwrap();
        assert!(store.is_favorite("ada"));

        assert!(store.remove("ada").unwrap());
        assert_eq!(store.len(), before);
        assert!(!store.is_favorite("ada"));
        assert!(!store.remove("ada").unwrap());
    }

    #[test]
    fn test_add_keeps_logins_unique() {
        let store = FavoritesStore::load(Arc::new(MemoryStore::new()));
        store.add(user("ada")).unwrap();
        store.add(user("linus")).unwrap();

        let mut updated = user("ada");
        updated.bio = Some("updated".to_string());
        store.add(updated).unwrap();

        let users = store.users();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].login, "ada");
        assert_eq!(users[0].bio.as_deref(), Some("updated"));
    }

    #[test]
    fn test_persisted_across_sessions() {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(temp_dir.path()));

        let store = FavoritesStore::load(Arc::clone(&storage));
        store.add(user("ada")).unwrap();
        store.add(user("grace")).unwrap();
        drop(store);

        let reloaded = FavoritesStore::load(storage);
        let logins: Vec<String> = reloaded.users().into_iter().map(|u| u.login).collect();
        assert_eq!(logins, vec!["ada", "grace"]);
    }

    #[test]
    fn test_corrupt_storage_loads_empty() {
        let storage = Arc::new(MemoryStore::new());
        storage.set(FAVORITES_STORAGE_KEY, "{ not json").unwrap();

        let store = FavoritesStore::load(storage);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_add_from_service_fetches_profile() {
        let store = FavoritesStore::load(Arc::new(MemoryStore::new()));
        let mut partial = user("octocat");
        partial.name = None;

        store.add_from_service(partial, &offline_service()).await.unwrap();

        let users = store.users();
        assert_eq!(users[0].login, "octocat");
        assert!(users[0].name.is_some());
    }

    #[tokio::test]
    async fn test_refresh_only_outdated_entries() {
        let storage = Arc::new(MemoryStore::new());
        let stale = FavoriteUser {
            user: user("ada"),
            last_updated: Utc::now() - Duration::minutes(30),
        };
        storage
            .set(FAVORITES_STORAGE_KEY, &serde_json::to_string(&vec![stale]).unwrap())
            .unwrap();

        let store = FavoritesStore::load(storage);
        store.add(user("grace")).unwrap();
        let service = offline_service();

        assert!(store.refresh("ada", &service).await.unwrap());
        assert!(!store.refresh("grace", &service).await.unwrap());
        assert!(!store.refresh("nobody", &service).await.unwrap());

        let refreshed = &store.favorites()[0];
        assert!(!refreshed.is_outdated(Utc::now()));
    }

    /// Storage whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        read_only: AtomicBool,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(ExplorerError::Other("storage is read-only".to_string()));
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_failed_write_leaves_list_unchanged() {
        let storage = Arc::new(FlakyStore::default());
        let store = FavoritesStore::load(storage.clone());
        store.add(user("ada")).unwrap();

        storage.read_only.store(true, Ordering::SeqCst);
        assert!(store.add(user("grace")).is_err());
        assert!(store.remove("ada").is_err());

        assert_eq!(store.len(), 1);
        assert!(store.contains("ada"));
        assert!(!store.contains("grace"));

        let reloaded = FavoritesStore::load(storage);
        assert_eq!(reloaded.users(), store.users());
    }
}
