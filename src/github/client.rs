// GitHub API HTTP client.
// Handles authentication, rate limiting, cancellation and response classification.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::{
    Client, Method, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::QueryParams;
use crate::config::ApiConfig;
use crate::error::{ExplorerError, Result};
use crate::request::NetworkStatus;

use super::types::RateLimit;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Growth factor applied to the mandated wait on each consecutive 429.
const RATE_LIMIT_BACKOFF: f64 = 1.5;

/// Supplies the current API token, if any, at request time.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Notified with `(error, endpoint)` for every failed request.
pub type ErrorObserver = Arc<dyn Fn(&ExplorerError, &str) + Send + Sync>;

/// Notified with `(response, data)` for every successful JSON response.
pub type ResponseObserver = Arc<dyn Fn(&ResponseInfo, &Value) + Send + Sync>;

/// Response metadata handed to the response observer.
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: u16,
    pub url: String,
    pub headers: HeaderMap,
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload<T> {
    Data(T),
    /// The server answered 204.
    NoContent,
}

impl<T> Payload<T> {
    /// Unwrap the body, treating "no content" as a contract violation.
    pub fn require(self, endpoint: &str) -> Result<T> {
        match self {
            Payload::Data(data) => Ok(data),
            Payload::NoContent => Err(ExplorerError::Parse(format!(
                "expected a body from {}, got no content",
                endpoint
            ))),
        }
    }
}

/// Per-call request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub params: Option<QueryParams>,
    pub headers: Vec<(String, String)>,
    pub signal: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Abort the request (including any rate-limit wait) when `token` is cancelled.
    #[must_use]
    pub fn signal(mut self, token: CancellationToken) -> Self {
        self.signal = Some(token);
        self
    }
}

/// Error body shape returned by the API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// GitHub API client with authentication and rate limit tracking.
pub struct ApiClient {
    client: Client,
    base_url: String,
    rate_limit_retries: u32,
    default_retry_after: Duration,
    network_cooldown: Duration,
    token_provider: Option<TokenProvider>,
    on_error: Option<ErrorObserver>,
    on_response: Option<ResponseObserver>,
    network: Option<Arc<NetworkStatus>>,
    rate_limit: Mutex<RateLimit>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("rate_limit_retries", &self.rate_limit_retries)
            .field("authenticated", &self.token_provider.is_some())
            .finish()
    }
}

impl ApiClient {
    /// Create a new client from the API configuration.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ExplorerError::Config(format!("invalid user agent: {}", e)))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limit_retries: config.rate_limit_retries,
            default_retry_after: config.default_retry_after,
            network_cooldown: config.network_cooldown,
            token_provider: None,
            on_error: None,
            on_response: None,
            network: None,
            rate_limit: Mutex::new(RateLimit::default()),
        })
    }

    #[must_use]
    pub fn with_token_provider(mut self, provider: TokenProvider) -> Self {
        self.token_provider = Some(provider);
        self
    }

    #[must_use]
    pub fn with_error_observer(mut self, observer: ErrorObserver) -> Self {
        self.on_error = Some(observer);
        self
    }

    #[must_use]
    pub fn with_response_observer(mut self, observer: ResponseObserver) -> Self {
        self.on_response = Some(observer);
        self
    }

    /// Share a network-error cooldown with other components.
    #[must_use]
    pub fn with_network_status(mut self, network: Arc<NetworkStatus>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the most recently observed rate limit information.
    pub fn rate_limit(&self) -> RateLimit {
        self.rate_limit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        self.request(Method::GET, endpoint, None, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, endpoint, Some(body), options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, endpoint, Some(body), options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, endpoint, Some(body), options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        self.request(Method::DELETE, endpoint, None, options).await
    }

    /// Send a request, waiting out 429 responses within the retry budget.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Payload<T>> {
        let endpoint = normalize_endpoint(endpoint);
        let url = format!("{}{}", self.base_url, endpoint);

        if let Some(remaining) = self.network.as_ref().and_then(|n| n.remaining_cooldown()) {
            tracing::debug!(%endpoint, "network cooldown active, not sending");
            return Err(ExplorerError::RateLimited {
                retry_after: remaining,
            });
        }

        let mut attempt: u32 = 0;
        loop {
            let response = self
                .send_once(method.clone(), &url, body.as_ref(), &options)
                .await
                .inspect_err(|err| {
                    if matches!(err, ExplorerError::Network(_)) {
                        self.mark_network_error();
                    }
                    if !err.is_aborted() {
                        self.notify_error(err, &endpoint);
                    }
                })?;

            self.update_rate_limit(&response);

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = parse_retry_after(response.headers())
                    .unwrap_or(self.default_retry_after);

                if attempt < self.rate_limit_retries {
                    let wait = rate_limit_wait(retry_after, attempt);
                    attempt += 1;
                    tracing::warn!(
                        %endpoint,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, waiting before retry"
                    );
                    pause(wait, options.signal.as_ref()).await?;
                    continue;
                }

                let err = ExplorerError::RateLimited { retry_after };
                self.mark_network_error();
                self.notify_error(&err, &endpoint);
                return Err(err);
            }

            return self
                .classify(response, options.signal.as_ref())
                .await
                .inspect_err(|err| self.notify_error(err, &endpoint));
        }
    }

    /// One round trip, racing the abort signal.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Response> {
        let mut builder = self.client.request(method, url);

        if let Some(params) = &options.params {
            builder = builder.query(&params.present());
        }
        if let Some(token) = self.token_provider.as_ref().and_then(|provider| provider()) {
            builder = builder.header(AUTHORIZATION, format!("token {}", token));
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let send = builder.send();
        let result = match &options.signal {
            Some(signal) => tokio::select! {
                biased;
                _ = signal.cancelled() => return Err(ExplorerError::Aborted),
                result = send => result,
            },
            None => send.await,
        };

        Ok(result?)
    }

    /// Turn a non-429 response into a payload or a typed failure.
    async fn classify<T: DeserializeOwned>(
        &self,
        response: Response,
        signal: Option<&CancellationToken>,
    ) -> Result<Payload<T>> {
        let status = response.status();

        if !status.is_success() {
            // The message is best effort; only an abort ends the read early.
            let bytes = read_body(response, signal)
                .await
                .or_else(|err| if err.is_aborted() { Err(err) } else { Ok(Vec::new()) })?;
            let message = serde_json::from_slice::<ErrorBody>(&bytes)
                .ok()
                .and_then(|body| body.message);
            tracing::debug!(status = status.as_u16(), ?message, "request failed");
            return Err(ExplorerError::http(status.as_u16(), message));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Payload::NoContent);
        }

        let info = ResponseInfo {
            status: status.as_u16(),
            url: response.url().to_string(),
            headers: response.headers().clone(),
        };
        let bytes = read_body(response, signal).await?;
        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ExplorerError::Parse(e.to_string()))?;

        if let Some(observer) = &self.on_response {
            observer(&info, &value);
        }

        serde_json::from_value(value)
            .map(Payload::Data)
            .map_err(|e| ExplorerError::Parse(e.to_string()))
    }

    fn mark_network_error(&self) {
        if let Some(network) = &self.network {
            network.set_network_error(self.network_cooldown);
        }
    }

    fn notify_error(&self, err: &ExplorerError, endpoint: &str) {
        if let Some(observer) = &self.on_error {
            observer(err, endpoint);
        }
    }

    /// Update rate limit from response headers.
    fn update_rate_limit(&self, response: &Response) {
        let header = |name: &str| -> Option<u64> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        };

        let mut rate_limit = self.rate_limit.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(limit) = header("x-ratelimit-limit") {
            rate_limit.limit = limit;
        }
        if let Some(remaining) = header("x-ratelimit-remaining") {
            rate_limit.remaining = remaining;
        }
        if let Some(reset) = header("x-ratelimit-reset") {
            rate_limit.reset = reset;
        }
    }
}

/// Collapse leading slashes to exactly one.
fn normalize_endpoint(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

/// `Retry-After` in whole seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Wait before the next attempt after `attempt` consecutive 429s.
///
/// Saturates instead of overflowing on absurd `Retry-After` values.
fn rate_limit_wait(retry_after: Duration, attempt: u32) -> Duration {
    let secs = retry_after.as_secs_f64() * RATE_LIMIT_BACKOFF.powi(attempt as i32);
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Read the whole body, racing the abort signal.
async fn read_body(response: Response, signal: Option<&CancellationToken>) -> Result<Vec<u8>> {
    let read = response.bytes();
    let bytes = match signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(ExplorerError::Aborted),
            bytes = read => bytes?,
        },
        None => read.await?,
    };
    Ok(bytes.to_vec())
}

/// Sleep that ends early with `Aborted` when the signal fires.
async fn pause(duration: Duration, signal: Option<&CancellationToken>) -> Result<()> {
    match signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.cancelled() => Err(ExplorerError::Aborted),
            _ = tokio::time::sleep(duration) => Ok(()),
        },
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}
