//! Token record persisted by a [`TokenStore`](crate::traits::TokenStore).

use serde::{Deserialize, Serialize};

/// The mirrored copy of the last token handed out by the identity provider.
///
/// The access token is opaque: expiry is enforced by the identity provider and
/// discovered here only through a 401.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Bearer token sent in the `Authorization` header.
    pub access_token: String,
    /// Refresh token, when the identity provider issues one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which the token was stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<i64>,
}

impl StoredToken {
    /// Create a record for `access_token`, stamped with the current time.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            stored_at: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Check if the record carries a usable access token.
    pub fn has_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stamps_current_time() {
        let before = chrono::Utc::now().timestamp();
        let token = StoredToken::new("abc");
        let stored_at = token.stored_at.unwrap();
        assert!(stored_at >= before);
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_has_token_rejects_blank() {
        assert!(StoredToken::new("abc").has_token());
        assert!(!StoredToken::new("").has_token());
        assert!(!StoredToken::new("   ").has_token());
    }

    #[test]
    fn test_serialization_skips_missing_fields() {
        let token = StoredToken {
            access_token: "abc".to_string(),
            refresh_token: None,
            stored_at: None,
        };
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, r#"{"access_token":"abc"}"#);

        let parsed: StoredToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
