//! Upstream credential types.
//!
//! Defines the token payload returned by the Tractive `auth/token` endpoint.

use serde::{Deserialize, Serialize};

/// Bearer credential issued by the Tractive identity endpoint.
///
/// Fields other than `access_token` are kept for callers that want them;
/// keys not modeled here are carried in `extra` and served back unchanged.
/// `expires_at` is never checked: a cached credential is trusted until it is
/// overwritten or cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Unix timestamp (seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: None,
            client_id: None,
            expires_at: None,
            extra: serde_json::Map::new(),
        }
    }
}
