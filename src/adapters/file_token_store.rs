//! File-backed token store.
//!
//! Persists the token mirror as JSON, by default at
//! `~/.portal-sync/token.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::auth::StoredToken;
use crate::traits::{TokenError, TokenStore};

/// The token directory name under the home directory.
const TOKEN_DIR: &str = ".portal-sync";

/// The token file name.
const TOKEN_FILE: &str = "token.json";

/// Token store writing a single JSON file.
///
/// A missing file, an empty file, or a file holding a blank token all load as
/// `None`; a file that exists but cannot be parsed is an error.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store at the default location in the user's home directory.
    pub fn new() -> Result<Self, TokenError> {
        let home = dirs::home_dir()
            .ok_or_else(|| TokenError::LoadFailed("Failed to determine home directory".to_string()))?;
        Ok(Self {
            path: home.join(TOKEN_DIR).join(TOKEN_FILE),
        })
    }

    /// Store at an explicit path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<StoredToken>, TokenError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TokenError::LoadFailed(e.to_string())),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let token: StoredToken = serde_json::from_str(&contents)
            .map_err(|e| TokenError::Serialization(e.to_string()))?;
        Ok(token.has_token().then_some(token))
    }

    async fn save(&self, token: &StoredToken) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TokenError::SaveFailed(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(token)
            .map_err(|e| TokenError::Serialization(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| TokenError::SaveFailed(e.to_string()))
    }

    async fn clear(&self) -> Result<(), TokenError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TokenError::ClearFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> FileTokenStore {
        FileTokenStore::at_path(dir.path().join("nested").join("token.json"))
    }

    #[tokio::test]
    async fn test_load_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let token = StoredToken::new("abc").with_refresh_token("r-1");

        store.save(&token).await.unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load().await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&StoredToken::new("abc")).await.unwrap();

        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = FileTokenStore::at_path(&path).load().await;
        assert!(matches!(result, Err(TokenError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_blank_token_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"access_token":""}"#).unwrap();

        assert!(FileTokenStore::at_path(&path).load().await.unwrap().is_none());
    }

    #[test]
    fn test_default_path() {
        if let Ok(store) = FileTokenStore::new() {
            assert!(store.path().ends_with(".portal-sync/token.json"));
        }
    }
}
