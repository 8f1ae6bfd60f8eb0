// GitHub API response types.
// Defines structs for deserializing user, repository and search responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// GitHub user profile.
///
/// List endpoints return a summary (login, id, avatar, url); the profile
/// endpoint fills in the rest, so everything past the summary is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub avatar_url: String,
    pub html_url: String,
    pub name: Option<String>,
    pub company: Option<String>,
    pub blog: Option<String>,
    pub location: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub twitter_username: Option<String>,
    #[serde(default)]
    pub public_repos: u64,
    #[serde(default)]
    pub public_gists: u64,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub following: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Whether any text field matches the lower-cased needle.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        std::iter::once(Some(self.login.as_str()))
            .chain([
                self.name.as_deref(),
                self.bio.as_deref(),
                self.location.as_deref(),
                self.company.as_deref(),
            ])
            .flatten()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Minimal owner record embedded in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
    pub avatar_url: String,
    pub html_url: String,
}

/// GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub html_url: String,
    pub description: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    pub updated_at: Option<DateTime<Utc>>,
    pub owner: RepositoryOwner,
}

/// User search response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    pub items: Vec<User>,
}

impl SearchResult {
    /// Empty result flagged incomplete, used for soft rejections.
    pub fn incomplete_empty() -> Self {
        Self {
            total_count: 0,
            incomplete_results: true,
            items: Vec::new(),
        }
    }
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// Unix timestamp when the window resets.
    pub reset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_list_summary() {
        let json = r#"{
            "login": "octocat",
            "id": 583231,
            "avatar_url": "https://avatars.githubusercontent.com/u/583231?v=4",
            "html_url": "https://github.com/octocat",
            "type": "User",
            "site_admin": false
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.login, "octocat");
        assert_eq!(user.followers, 0);
        assert!(user.name.is_none());
        assert!(user.created_at.is_none());
    }

    #[test]
    fn test_deserialize_search_result() {
        let json = r#"{
            "total_count": 1,
            "incomplete_results": false,
            "items": [{
                "login": "ada",
                "id": 1,
                "avatar_url": "https://example.com/a.png",
                "html_url": "https://github.com/ada"
            }]
        }"#;

        let result: SearchResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.items[0].login, "ada");
    }

    #[test]
    fn test_user_matches_profile_fields() {
        let json = r#"{
            "login": "jdoe",
            "id": 7,
            "avatar_url": "",
            "html_url": "",
            "name": "Jane Doe",
            "location": "Lisbon",
            "company": null,
            "bio": null
        }"#;
        let user: User = serde_json::from_str(json).unwrap();

        assert!(user.matches("jdoe"));
        assert!(user.matches("jane"));
        assert!(user.matches("lisbon"));
        assert!(!user.matches("berlin"));
        assert!(user.matches(""));
    }
}
