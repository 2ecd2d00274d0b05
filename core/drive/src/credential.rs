//! OAuth2 credential and client-secret models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use gapitoo_common::{Error, Result};

/// Google's OAuth2 authorization endpoint.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google's OAuth2 token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_SKEW_MINUTES: i64 = 5;

/// Lifecycle state of the persisted credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing usable on disk.
    Absent,
    /// Present but past (or near) its expiry.
    Expired,
    /// Present and usable as is.
    Valid,
}

impl CredentialState {
    /// Classify an optional credential.
    pub fn of(credential: Option<&Credential>) -> Self {
        match credential {
            None => CredentialState::Absent,
            Some(c) if c.is_expired() => CredentialState::Expired,
            Some(_) => CredentialState::Valid,
        }
    }
}

/// An OAuth2 credential together with the client identity needed to
/// refresh it.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Access token for API requests.
    pub access_token: String,
    /// Refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// When the access token expires. `None` means no known expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// OAuth client the token was issued to.
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Endpoint used for refresh grants.
    pub token_uri: String,
    /// Scopes granted.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl Credential {
    /// Check if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now() + Duration::minutes(EXPIRY_SKEW_MINUTES),
            None => false,
        }
    }

    /// Whether a refresh grant can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CredentialState {
        CredentialState::of(Some(self))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// OAuth client registration as downloaded from the provider console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

/// Top-level layout of the client-secret file: one of `installed` or `web`.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Parse a client-secret JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(json)?;
        file.installed.or(file.web).ok_or_else(|| {
            Error::InvalidInput(
                "Client secrets must contain an \"installed\" or \"web\" section".to_string(),
            )
        })
    }

    /// Load a client-secret file from disk.
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::InvalidInput(format!(
                "Cannot read client secrets {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: Option<DateTime<Utc>>, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "access".to_string(),
            refresh_token: refresh.map(String::from),
            expires_at,
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            scopes: vec![],
        }
    }

    #[test]
    fn test_credential_states() {
        assert_eq!(CredentialState::of(None), CredentialState::Absent);

        let valid = credential(Some(Utc::now() + Duration::hours(1)), None);
        assert_eq!(valid.state(), CredentialState::Valid);

        let expired = credential(Some(Utc::now() - Duration::hours(1)), Some("r"));
        assert_eq!(expired.state(), CredentialState::Expired);

        let no_expiry = credential(None, None);
        assert_eq!(no_expiry.state(), CredentialState::Valid);
    }

    #[test]
    fn test_near_expiry_counts_as_expired() {
        let c = credential(Some(Utc::now() + Duration::minutes(4)), None);
        assert!(c.is_expired());
    }

    #[test]
    fn test_can_refresh() {
        assert!(credential(None, Some("r")).can_refresh());
        assert!(!credential(None, Some("")).can_refresh());
        assert!(!credential(None, None).can_refresh());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let c = credential(None, Some("super-secret-refresh"));
        let out = format!("{:?}", c);
        assert!(!out.contains("super-secret-refresh"));
        assert!(!out.contains("\"access\""));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn test_client_secrets_installed() {
        let json = r#"{"installed": {
            "client_id": "abc.apps.googleusercontent.com",
            "project_id": "demo",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "shh",
            "redirect_uris": ["http://localhost"]
        }}"#;

        let secrets = ClientSecrets::from_json(json).unwrap();
        assert_eq!(secrets.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(secrets.client_secret.as_deref(), Some("shh"));
        assert_eq!(secrets.redirect_uris, vec!["http://localhost".to_string()]);
    }

    #[test]
    fn test_client_secrets_web_with_defaults() {
        let secrets = ClientSecrets::from_json(r#"{"web": {"client_id": "w"}}"#).unwrap();
        assert_eq!(secrets.client_id, "w");
        assert_eq!(secrets.auth_uri, GOOGLE_AUTH_URL);
        assert_eq!(secrets.token_uri, GOOGLE_TOKEN_URL);
    }

    #[test]
    fn test_client_secrets_missing_section() {
        assert!(ClientSecrets::from_json(r#"{"other": {}}"#).is_err());
        assert!(ClientSecrets::from_json("not json").is_err());
    }
}
