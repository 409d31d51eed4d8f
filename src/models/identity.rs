//! Authenticated identities used by browser sessions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single session cookie belonging to an identity.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Opaque credential material for one identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialBundle {
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
}

impl CredentialBundle {
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// An authenticated session usable by one concurrent browser session.
///
/// Loaded from configuration at startup and owned by the identity pool;
/// usage counters are runtime-only and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, alias = "credentials")]
    pub credential_bundle: CredentialBundle,
    /// Optional egress proxy pinned to this identity.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(skip)]
    pub in_use: bool,
    #[serde(skip)]
    pub total_requests: u64,
    #[serde(skip)]
    pub failed_requests: u64,
    #[serde(skip)]
    pub last_used: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(id: impl Into<String>, credential_bundle: CredentialBundle) -> Self {
        Self {
            id: id.into(),
            credential_bundle,
            proxy_url: None,
            in_use: false,
            total_requests: 0,
            failed_requests: 0,
            last_used: None,
        }
    }
}

/// Identity pool usage summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdentityStats {
    pub total: usize,
    pub in_use: usize,
    pub available: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_debug_redacts_value() {
        let cookie = SessionCookie {
            name: "session".to_string(),
            value: "secret-token".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            secure: true,
            http_only: true,
        };
        let printed = format!("{:?}", cookie);
        assert!(printed.contains("session"));
        assert!(!printed.contains("secret-token"));
    }

    #[test]
    fn test_identity_deserialize_defaults() {
        let json = r#"{
            "id": "acct-1",
            "credentials": {
                "cookies": [{"name": "session", "value": "v", "domain": ".example.com"}]
            }
        }"#;
        let identity: Identity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.id, "acct-1");
        assert_eq!(identity.credential_bundle.cookies.len(), 1);
        assert_eq!(identity.credential_bundle.cookies[0].path, "/");
        assert!(identity.credential_bundle.cookies[0].secure);
        assert!(!identity.in_use);
    }
}
