// GitHub API module.
// Transport client, domain facade, mock fallback data and response types.

pub mod client;
pub mod endpoints;
pub mod mock;
pub mod types;

pub use client::{ApiClient, Payload, RequestOptions, ResponseInfo, TokenProvider};
pub use endpoints::GithubService;
pub use mock::MockDataProvider;
pub use types::*;
