// GitHub API endpoint functions.
// Typed read operations that fall back to mock data when the transport fails.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::cache::QueryParams;
use crate::config::FallbackPolicy;
use crate::error::Result;

use super::client::{ApiClient, RequestOptions};
use super::mock::{MOCK_LISTING_TOTAL, MockDataProvider};
use super::types::{Repository, SearchResult, User};

/// Domain facade over the transport.
///
/// Read failures covered by the [`FallbackPolicy`] are absorbed here and
/// replaced with deterministic mock data; everything else propagates.
#[derive(Debug, Clone)]
pub struct GithubService {
    client: Arc<ApiClient>,
    mock: MockDataProvider,
    fallback: FallbackPolicy,
}

impl GithubService {
    pub fn new(client: Arc<ApiClient>, fallback: FallbackPolicy) -> Self {
        Self {
            client,
            mock: MockDataProvider::new(),
            fallback,
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn fallback(&self) -> FallbackPolicy {
        self.fallback
    }

    /// Get a user's full profile.
    pub async fn get_user(&self, username: &str) -> Result<User> {
        let endpoint = format!("/users/{}", username);
        let result = self.fetch(&endpoint, None).await;
        self.or_fallback("get_user", result, || self.mock.user(username))
    }

    /// Get a user's repositories, most recently updated first.
    pub async fn get_user_repos(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Repository>> {
        let endpoint = format!("/users/{}/repos", username);
        let params = QueryParams::new()
            .with("page", page)
            .with("per_page", per_page)
            .with("sort", "updated");
        let result = self.fetch(&endpoint, Some(params)).await;
        self.or_fallback("get_user_repos", result, || {
            self.mock.user_repos(username, page, per_page)
        })
    }

    /// List users with ids after `since`.
    pub async fn get_users(&self, since: u64, per_page: u32) -> Result<Vec<User>> {
        let params = QueryParams::new()
            .with("since", since)
            .with("per_page", per_page);
        let result = self.fetch("/users", Some(params)).await;
        self.or_fallback("get_users", result, || self.mock.users(since, per_page))
    }

    /// Search users.
    ///
    /// A blank query is served by the unscoped listing, starting at the offset
    /// implied by `page`.
    pub async fn search_users(&self, query: &str, page: u32, per_page: u32) -> Result<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            let since = u64::from(page.max(1) - 1) * u64::from(per_page);
            let items = self.get_users(since, per_page).await?;
            return Ok(SearchResult {
                total_count: MOCK_LISTING_TOTAL,
                incomplete_results: false,
                items,
            });
        }

        let params = QueryParams::new()
            .with("q", query)
            .with("page", page)
            .with("per_page", per_page);
        let result = self.fetch("/search/users", Some(params)).await;
        self.or_fallback("search_users", result, || {
            self.mock.search_users(query, page, per_page)
        })
    }

    pub async fn get_user_followers(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<User>> {
        let endpoint = format!("/users/{}/followers", username);
        let params = QueryParams::new()
            .with("page", page)
            .with("per_page", per_page);
        let result = self.fetch(&endpoint, Some(params)).await;
        self.or_fallback("get_user_followers", result, || {
            self.mock.followers(username, page, per_page)
        })
    }

    pub async fn get_user_following(
        &self,
        username: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<User>> {
        let endpoint = format!("/users/{}/following", username);
        let params = QueryParams::new()
            .with("page", page)
            .with("per_page", per_page);
        let result = self.fetch(&endpoint, Some(params)).await;
        self.or_fallback("get_user_following", result, || {
            self.mock.following(username, page, per_page)
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: Option<QueryParams>,
    ) -> Result<T> {
        let mut options = RequestOptions::new();
        if let Some(params) = params {
            options = options.params(params);
        }
        self.client.get(endpoint, options).await?.require(endpoint)
    }

    fn or_fallback<T>(
        &self,
        operation: &str,
        result: Result<T>,
        mock: impl FnOnce() -> T,
    ) -> Result<T> {
        match result {
            Ok(data) => Ok(data),
            Err(err) if self.fallback.covers(&err) => {
                tracing::warn!(operation, error = %err, "API call failed, using mock data");
                Ok(mock())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::error::ExplorerError;
    use serde_json::json;
    use wiremock::matchers::{path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer, fallback: FallbackPolicy) -> GithubService {
        let config = ApiConfig {
            base_url: server.uri(),
            ..ApiConfig::default()
        };
        GithubService::new(Arc::new(ApiClient::new(&config).unwrap()), fallback)
    }

    #[tokio::test]
    async fn test_failed_get_user_falls_back_to_mock() {
        let server = MockServer::start().await;
        Mock::given(path("/users/unknown-user"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let user = service_for(&server, FallbackPolicy::OnTransportFailure)
            .get_user("unknown-user")
            .await
            .unwrap();

        assert_eq!(user.login, "unknown-user");
    }

    #[tokio::test]
    async fn test_never_policy_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(path("/users/ada"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = service_for(&server, FallbackPolicy::Never)
            .get_user("ada")
            .await
            .unwrap_err();

        assert!(matches!(err, ExplorerError::Transport { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_parse_failure_only_substituted_when_always() {
        let server = MockServer::start().await;
        Mock::given(path("/users/ada"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
            .mount(&server)
            .await;

        let err = service_for(&server, FallbackPolicy::OnTransportFailure)
            .get_user("ada")
            .await
            .unwrap_err();
        assert!(matches!(err, ExplorerError::Parse(_)));

        let user = service_for(&server, FallbackPolicy::Always)
            .get_user("ada")
            .await
            .unwrap();
        assert_eq!(user.login, "ada");
    }

    #[tokio::test]
    async fn test_search_passes_query() {
        let server = MockServer::start().await;
        Mock::given(path("/search/users"))
            .and(query_param("q", "ada"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "incomplete_results": false,
                "items": [{
                    "login": "ada",
                    "id": 1,
                    "avatar_url": "",
                    "html_url": ""
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = service_for(&server, FallbackPolicy::Never)
            .search_users(" ada ", 2, 10)
            .await
            .unwrap();

        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_search_lists_users_from_offset() {
        let server = MockServer::start().await;
        Mock::given(path("/users"))
            .and(query_param("since", "20"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "login": "user21",
                "id": 21,
                "avatar_url": "",
                "html_url": ""
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let result = service_for(&server, FallbackPolicy::Never)
            .search_users("", 3, 10)
            .await
            .unwrap();

        assert_eq!(result.total_count, MOCK_LISTING_TOTAL);
        assert_eq!(result.items[0].id, 21);
    }

    #[tokio::test]
    async fn test_unreachable_search_uses_mock() {
        let config = ApiConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..ApiConfig::default()
        };
        let service = GithubService::new(
            Arc::new(ApiClient::new(&config).unwrap()),
            FallbackPolicy::default(),
        );

        let result = service.search_users("ada", 1, 2).await.unwrap();
        assert_eq!(result.items.len(), 2);
        assert!(result.items.iter().all(|u| u.login.contains("ada")));
    }
}
