// Deterministic mock GitHub data.
// Stands in for the API when a call fails; the same username always yields the same data.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::types::{Repository, RepositoryOwner, SearchResult, User};

/// Total reported for an unscoped user listing.
pub const MOCK_LISTING_TOTAL: u64 = 1000;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Grace", "Linus", "Margaret", "Ken", "Barbara", "Dennis", "Frances", "Alan", "Radia",
];
const LAST_NAMES: &[&str] = &[
    "Lovelace", "Hopper", "Torvalds", "Hamilton", "Thompson", "Liskov", "Ritchie", "Allen",
    "Turing", "Perlman",
];
const COMPANIES: &[&str] = &[
    "Acme Corp",
    "Initech",
    "Globex",
    "Hooli",
    "Umbrella Labs",
    "Stark Industries",
];
const LOCATIONS: &[&str] = &[
    "San Francisco, CA",
    "Berlin, Germany",
    "Lisbon, Portugal",
    "Tokyo, Japan",
    "Toronto, Canada",
    "Remote",
];
const BIOS: &[&str] = &[
    "Open source enthusiast.",
    "Building tools for developers.",
    "Systems programmer and coffee drinker.",
    "Frontend engineer who loves design systems.",
    "Cloud infrastructure and automation.",
];
const LANGUAGES: &[&str] = &[
    "Rust", "TypeScript", "Go", "Python", "Kotlin", "C", "Ruby",
];
const REPO_ADJECTIVES: &[&str] = &[
    "awesome", "tiny", "fast", "minimal", "modern", "simple", "async",
];
const REPO_NOUNS: &[&str] = &[
    "parser", "cli", "server", "toolkit", "dashboard", "cache", "router", "bot",
];

/// Well-known profiles served by exact login before the generator is used.
struct SeedUser {
    login: &'static str,
    id: u64,
    name: &'static str,
    company: &'static str,
    blog: &'static str,
    location: &'static str,
    bio: &'static str,
    twitter: &'static str,
    stats: [u64; 4],
    created_at: i64,
}

const SEED_USERS: &[SeedUser] = &[
    SeedUser {
        login: "johndoe",
        id: 1,
        name: "John Doe",
        company: "Acme Corp",
        blog: "https://johndoe.dev",
        location: "San Francisco, CA",
        bio: "Full-stack developer with a passion for React and Node.js.",
        twitter: "johndoedev",
        stats: [65, 30, 1200, 75],
        created_at: 1_326_641_802,
    },
    SeedUser {
        login: "janedoe",
        id: 2,
        name: "Jane Doe",
        company: "TechStart Inc.",
        blog: "https://janedoe.io",
        location: "New York, NY",
        bio: "Frontend specialist focusing on React and modern CSS.",
        twitter: "janedoedev",
        stats: [48, 12, 850, 120],
        created_at: 1_368_177_877,
    },
    SeedUser {
        login: "alexsmith",
        id: 3,
        name: "Alex Smith",
        company: "DevOps Unlimited",
        blog: "https://alexsmith.tech",
        location: "Seattle, WA",
        bio: "DevOps engineer and cloud architect.",
        twitter: "alexsmithtech",
        stats: [92, 25, 1500, 45],
        created_at: 1_316_711_528,
    },
];

impl SeedUser {
    fn to_user(&self) -> User {
        let created_at = DateTime::<Utc>::from_timestamp(self.created_at, 0);
        User {
            login: self.login.to_string(),
            id: self.id,
            avatar_url: avatar_url(self.id),
            html_url: profile_url(self.login),
            name: Some(self.name.to_string()),
            company: Some(self.company.to_string()),
            blog: Some(self.blog.to_string()),
            location: Some(self.location.to_string()),
            email: Some(format!("{}@example.com", self.login)),
            bio: Some(self.bio.to_string()),
            twitter_username: Some(self.twitter.to_string()),
            public_repos: self.stats[0],
            public_gists: self.stats[1],
            followers: self.stats[2],
            following: self.stats[3],
            created_at,
            updated_at: created_at,
        }
    }
}

/// Seed derived from a name's character codes.
pub fn seed_for(name: &str) -> u64 {
    name.chars().map(|c| c as u64).sum()
}

fn avatar_url(id: u64) -> String {
    format!("https://avatars.githubusercontent.com/u/{}?v=4", id)
}

fn profile_url(login: &str) -> String {
    format!("https://github.com/{}", login)
}

fn pick<'a>(rng: &mut StdRng, options: &[&'a str]) -> &'a str {
    options[rng.random_range(0..options.len())]
}

/// Listing entry: the fields list endpoints actually return.
fn summary(login: String, id: u64) -> User {
    User {
        html_url: profile_url(&login),
        avatar_url: avatar_url(id),
        login,
        id,
        name: None,
        company: None,
        blog: None,
        location: None,
        email: None,
        bio: None,
        twitter_username: None,
        public_repos: 0,
        public_gists: 0,
        followers: 0,
        following: 0,
        created_at: None,
        updated_at: None,
    }
}

fn page_offset(page: u32, per_page: u32) -> u64 {
    u64::from(page.max(1) - 1) * u64::from(per_page)
}

/// Generator for API-shaped fallback data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockDataProvider;

impl MockDataProvider {
    pub fn new() -> Self {
        Self
    }

    /// Full profile for `username`. Always succeeds.
    pub fn user(&self, username: &str) -> User {
        if let Some(seeded) = SEED_USERS.iter().find(|u| u.login == username) {
            return seeded.to_user();
        }

        let seed = seed_for(username);
        let mut rng = StdRng::seed_from_u64(seed);
        let id = 1_000_000 + seed;
        let created_at = DateTime::<Utc>::from_timestamp(
            1_200_000_000 + rng.random_range(0..400_000_000),
            0,
        );

        User {
            login: username.to_string(),
            id,
            avatar_url: avatar_url(id),
            html_url: profile_url(username),
            name: Some(format!(
                "{} {}",
                pick(&mut rng, FIRST_NAMES),
                pick(&mut rng, LAST_NAMES)
            )),
            company: Some(pick(&mut rng, COMPANIES).to_string()),
            blog: Some(format!("https://{}.dev", username)),
            location: Some(pick(&mut rng, LOCATIONS).to_string()),
            email: None,
            bio: Some(pick(&mut rng, BIOS).to_string()),
            twitter_username: None,
            public_repos: rng.random_range(5..120),
            public_gists: rng.random_range(0..40),
            followers: rng.random_range(0..5000),
            following: rng.random_range(0..300),
            created_at,
            updated_at: created_at,
        }
    }

    /// One page of `username`'s repositories.
    pub fn user_repos(&self, username: &str, page: u32, per_page: u32) -> Vec<Repository> {
        let seed = seed_for(username);
        let total = 5 + seed % 26;
        let offset = page_offset(page, per_page);
        let count = u64::from(per_page).min(total.saturating_sub(offset));
        let owner = RepositoryOwner {
            login: username.to_string(),
            avatar_url: avatar_url(1_000_000 + seed),
            html_url: profile_url(username),
        };

        (offset..offset + count)
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(31).wrapping_add(index));
                let name = format!(
                    "{}-{}-{}",
                    pick(&mut rng, REPO_ADJECTIVES),
                    pick(&mut rng, REPO_NOUNS),
                    index + 1
                );
                Repository {
                    id: seed * 10_000 + index + 1,
                    full_name: format!("{}/{}", username, name),
                    html_url: format!("https://github.com/{}/{}", username, name),
                    description: Some(format!("A {} project by {}", pick(&mut rng, REPO_NOUNS), username)),
                    language: Some(pick(&mut rng, LANGUAGES).to_string()),
                    stargazers_count: rng.random_range(0..2000),
                    forks_count: rng.random_range(0..300),
                    updated_at: DateTime::<Utc>::from_timestamp(
                        1_600_000_000 + rng.random_range(0..100_000_000),
                        0,
                    ),
                    name,
                    owner: owner.clone(),
                }
            })
            .collect()
    }

    /// Users with ids strictly after `since`; the seed profiles occupy the first ids.
    pub fn users(&self, since: u64, per_page: u32) -> Vec<User> {
        (since + 1..=since + u64::from(per_page))
            .map(|id| match SEED_USERS.iter().find(|u| u.id == id) {
                Some(seeded) => seeded.to_user(),
                None => summary(format!("user_{}", id), id),
            })
            .collect()
    }

    /// Search results whose logins embed the query.
    ///
    /// A blank query behaves like the unscoped listing with a large total.
    pub fn search_users(&self, query: &str, page: u32, per_page: u32) -> SearchResult {
        let query = query.trim();
        if query.is_empty() {
            return SearchResult {
                total_count: MOCK_LISTING_TOTAL,
                incomplete_results: false,
                items: self.users(page_offset(page, per_page), per_page),
            };
        }

        let seed = seed_for(query);
        let total = 20 + seed % 81;
        let offset = page_offset(page, per_page);
        let count = u64::from(per_page).min(total.saturating_sub(offset));

        SearchResult {
            total_count: total,
            incomplete_results: false,
            items: (offset..offset + count)
                .map(|index| summary(format!("{}_user_{}", query, index + 1), seed * 10_000 + index + 1))
                .collect(),
        }
    }

    pub fn followers(&self, username: &str, page: u32, per_page: u32) -> Vec<User> {
        self.related(username, "follower", page, per_page)
    }

    pub fn following(&self, username: &str, page: u32, per_page: u32) -> Vec<User> {
        self.related(username, "following", page, per_page)
    }

    fn related(&self, username: &str, relation: &str, page: u32, per_page: u32) -> Vec<User> {
        let seed = seed_for(username) + seed_for(relation);
        let total = 10 + seed % 41;
        let offset = page_offset(page, per_page);
        let count = u64::from(per_page).min(total.saturating_sub(offset));

        (offset..offset + count)
            .map(|index| {
                summary(
                    format!("{}_{}_{}", username, relation, index + 1),
                    2_000_000 + seed * 1_000 + index + 1,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_username_same_data() {
        let mock = MockDataProvider::new();
        assert_eq!(mock.user("octocat"), mock.user("octocat"));
        assert_eq!(
            mock.user_repos("octocat", 1, 5),
            mock.user_repos("octocat", 1, 5)
        );
    }

    #[test]
    fn test_unknown_user_keeps_login() {
        let user = MockDataProvider::new().user("unknown-user");
        assert_eq!(user.login, "unknown-user");
        assert!(user.name.is_some());
    }

    #[test]
    fn test_seed_users_served_by_login() {
        let user = MockDataProvider::new().user("janedoe");
        assert_eq!(user.id, 2);
        assert_eq!(user.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_search_embeds_query() {
        let result = MockDataProvider::new().search_users("ada", 1, 2);
        assert_eq!(result.items.len(), 2);
        assert!(result.items.iter().all(|u| u.login.contains("ada")));
        assert!(result.total_count >= 20);
    }

    #[test]
    fn test_search_pages_do_not_overlap_and_end() {
        let mock = MockDataProvider::new();
        let total = mock.search_users("ada", 1, 10).total_count;
        let first = mock.search_users("ada", 1, 10);
        let second = mock.search_users("ada", 2, 10);
        assert!(first.items.iter().all(|a| second.items.iter().all(|b| a.id != b.id)));

        let last_page = (total as u32).div_ceil(10);
        assert!(mock.search_users("ada", last_page + 1, 10).items.is_empty());
    }

    #[test]
    fn test_blank_search_is_listing() {
        let result = MockDataProvider::new().search_users("  ", 2, 10);
        assert_eq!(result.total_count, MOCK_LISTING_TOTAL);
        assert_eq!(result.items.len(), 10);
        assert_eq!(result.items[0].id, 11);
    }

    #[test]
    fn test_listing_starts_with_seed_users() {
        let users = MockDataProvider::new().users(0, 5);
        assert_eq!(users[0].login, "johndoe");
        assert_eq!(users[3].login, "user_4");
    }

    #[test]
    fn test_repos_pagination() {
        let mock = MockDataProvider::new();
        let total = 5 + seed_for("octocat") % 26;
        let all = mock.user_repos("octocat", 1, 100);
        assert_eq!(all.len() as u64, total);
        assert!(all.iter().all(|r| r.owner.login == "octocat"));
        assert_eq!(mock.user_repos("octocat", 1, 3)[..], all[..3]);
    }
}
