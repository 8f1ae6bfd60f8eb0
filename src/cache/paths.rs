// Platform path utilities.
// Locates the configuration file and the persistent key/value storage directory.

use std::path::PathBuf;

use directories::ProjectDirs;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "gh-explorer")
}

/// Base configuration directory (~/.config/gh-explorer on Linux).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Path to the JSON configuration file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.json"))
}

/// Directory backing the persistent key/value store.
pub fn storage_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("storage"))
}

/// File name for a storage key.
/// Replaces characters that are unsafe in file names with underscores.
pub fn storage_file_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' => '_',
            _ => c,
        })
        .collect();
    format!("{}.json", sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_file_name() {
        assert_eq!(storage_file_name("favorites"), "favorites.json");
        assert_eq!(storage_file_name("github/token"), "github_token.json");
        assert_eq!(storage_file_name("../escape"), "___escape.json");
    }

    #[test]
    fn test_config_path_file_name() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.json"));
        }
    }
}
