//! OAuth2 authentication and token management for Google Drive.

use chrono::{Duration, Utc};
use oauth2::basic::{BasicClient, BasicTokenResponse};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use gapitoo_common::{Error, Result};

use crate::config::{DriveConfig, DRIVE_SCOPE, OOB_REDIRECT_URL};
use crate::credential::{ClientSecrets, Credential, CredentialState, GOOGLE_AUTH_URL};
use crate::prompt::AuthorizationPrompt;
use crate::token_store::TokenStore;

type OAuthClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Configuration for OAuth2 authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Redirect URL for the OAuth2 callback.
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

impl AuthConfig {
    /// Configuration for a first-time authorization from a client-secret file.
    pub fn from_secrets(secrets: &ClientSecrets, redirect_url: &str, scopes: &[String]) -> Self {
        Self {
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            auth_url: secrets.auth_uri.clone(),
            token_url: secrets.token_uri.clone(),
            redirect_url: redirect_url.to_string(),
            scopes: scopes.to_vec(),
        }
    }

    /// Configuration able to refresh an existing credential.
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: credential.token_uri.clone(),
            redirect_url: OOB_REDIRECT_URL.to_string(),
            scopes: credential.scopes.clone(),
        }
    }
}

/// OAuth2 authentication manager for Google Drive.
pub struct AuthManager {
    client: OAuthClient,
    http: oauth2::reqwest::Client,
    config: AuthConfig,
}

impl AuthManager {
    /// Create a new authentication manager.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(
                AuthUrl::new(config.auth_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid auth URL: {}", e)))?,
            )
            .set_token_uri(
                TokenUrl::new(config.token_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid token URL: {}", e)))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone())
                    .map_err(|e| Error::InvalidInput(format!("Invalid redirect URL: {}", e)))?,
            )
            .set_auth_type(AuthType::RequestBody);

        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        // Redirects are never followed on token requests.
        let http = oauth2::reqwest::ClientBuilder::new()
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            http,
            config,
        })
    }

    /// Generate the authorization URL for the user to visit.
    ///
    /// Returns the URL and the CSRF state embedded in it.
    pub fn authorization_url(&self) -> (String, String) {
        let (auth_url, csrf_token) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.config.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        (auth_url.to_string(), csrf_token.secret().clone())
    }

    /// Exchange an authorization code for a credential.
    ///
    /// # Errors
    /// - Invalid authorization code
    /// - Network errors
    pub async fn exchange_code(&self, code: &str) -> Result<Credential> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token exchange failed: {}", e)))?;

        if token.refresh_token().is_none() {
            warn!("No refresh token received; the credential cannot be refreshed later");
        }

        Ok(self.to_credential(&token, None))
    }

    /// Refresh an expired credential.
    ///
    /// The refresh token is kept if the provider does not rotate it.
    ///
    /// # Errors
    /// - Credential has no refresh token
    /// - Invalid or revoked refresh token
    /// - Network errors
    pub async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Authentication("Credential has no refresh token".to_string()))?;

        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&self.http)
            .await
            .map_err(|e| Error::Authentication(format!("Token refresh failed: {}", e)))?;

        Ok(self.to_credential(&token, Some(refresh_token)))
    }

    fn to_credential(
        &self,
        token: &BasicTokenResponse,
        previous_refresh: Option<String>,
    ) -> Credential {
        let expires_in = token
            .expires_in()
            .unwrap_or_else(|| std::time::Duration::from_secs(3600));
        let expires_at =
            Utc::now() + Duration::from_std(expires_in).unwrap_or_else(|_| Duration::hours(1));

        let scopes = token
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
            .unwrap_or_else(|| self.config.scopes.clone());

        Credential {
            access_token: token.access_token().secret().clone(),
            refresh_token: token
                .refresh_token()
                .map(|t| t.secret().clone())
                .or(previous_refresh),
            expires_at: Some(expires_at),
            client_id: self.config.client_id.clone(),
            client_secret: self.config.client_secret.clone(),
            token_uri: self.config.token_url.clone(),
            scopes,
        }
    }
}

/// Loads, refreshes or acquires the credential at startup.
pub struct Authenticator {
    store: TokenStore,
    credentials_path: PathBuf,
    redirect_url: String,
    scopes: Vec<String>,
}

impl Authenticator {
    /// Create an authenticator from the client configuration.
    pub fn new(config: &DriveConfig) -> Self {
        let scopes = if config.scopes.is_empty() {
            vec![DRIVE_SCOPE.to_string()]
        } else {
            config.scopes.clone()
        };

        Self {
            store: TokenStore::new(&config.token_path),
            credentials_path: config.credentials_path.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes,
        }
    }

    /// Produce a valid credential.
    ///
    /// A valid persisted credential is returned as is. An expired one is
    /// refreshed when possible. Otherwise, including when the refresh
    /// fails, the interactive flow runs. Any new or refreshed credential is
    /// written back to the token file.
    pub async fn authenticate(&self, prompt: &dyn AuthorizationPrompt) -> Result<Credential> {
        let existing = self.store.load().await?;

        match (CredentialState::of(existing.as_ref()), existing) {
            (CredentialState::Valid, Some(credential)) => {
                info!("Using saved credential from {}", self.store.path().display());
                return Ok(credential);
            }
            (CredentialState::Expired, Some(credential)) if credential.can_refresh() => {
                info!("Refreshing expired access token");
                match self.refresh(&credential).await {
                    Ok(refreshed) => {
                        self.store.save(&refreshed).await?;
                        return Ok(refreshed);
                    }
                    Err(e) => warn!("Refresh failed, authorizing again: {}", e),
                }
            }
            (state, _) => debug!("Credential state {:?}, authorizing", state),
        }

        let credential = self.authorize_interactively(prompt).await?;
        self.store.save(&credential).await?;
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        AuthManager::new(AuthConfig::from_credential(credential))?
            .refresh(credential)
            .await
    }

    async fn authorize_interactively(
        &self,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<Credential> {
        let secrets = ClientSecrets::load(&self.credentials_path).await?;
        let manager = AuthManager::new(AuthConfig::from_secrets(
            &secrets,
            &self.redirect_url,
            &self.scopes,
        ))?;

        let (auth_url, _state) = manager.authorization_url();
        let code = prompt.authorization_code(&auth_url).await?;
        let credential = manager.exchange_code(&code).await?;

        info!("Authorization complete");
        Ok(credential)
    }
}

/// Token manager that refreshes and re-persists the credential when it
/// expires during the session.
pub struct TokenManager {
    store: TokenStore,
    credential: RwLock<Credential>,
}

impl TokenManager {
    /// Create a new token manager with an initial credential.
    pub fn new(store: TokenStore, credential: Credential) -> Self {
        Self {
            store,
            credential: RwLock::new(credential),
        }
    }

    /// Get a usable access token, refreshing if necessary.
    ///
    /// A credential that cannot be refreshed is handed out as is and the
    /// provider decides whether it is still accepted.
    pub async fn get_access_token(&self) -> Result<String> {
        let credential = self.credential.read().await;

        if !credential.is_expired() {
            return Ok(credential.access_token.clone());
        }

        drop(credential);

        let mut credential = self.credential.write().await;

        // Double-check after acquiring write lock
        if !credential.is_expired() {
            return Ok(credential.access_token.clone());
        }

        if !credential.can_refresh() {
            warn!("Access token expired and no refresh token is available");
            return Ok(credential.access_token.clone());
        }

        info!("Refreshing expired access token");

        let refreshed = AuthManager::new(AuthConfig::from_credential(&credential))?
            .refresh(&credential)
            .await?;
        self.store.save(&refreshed).await?;
        *credential = refreshed;

        Ok(credential.access_token.clone())
    }

    /// Get the current credential.
    pub async fn credential(&self) -> Credential {
        self.credential.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts prompts and answers with a fixed code.
    struct CountingPrompt {
        calls: AtomicUsize,
    }

    impl CountingPrompt {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AuthorizationPrompt for CountingPrompt {
        async fn authorization_code(&self, auth_url: &str) -> Result<String> {
            assert!(auth_url.contains("access_type=offline"));
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("user-code".to_string())
        }
    }

    fn credential(token_uri: &str, expires_in_minutes: i64, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: "old-access".to_string(),
            refresh_token: refresh.map(String::from),
            expires_at: Some(Utc::now() + Duration::minutes(expires_in_minutes)),
            client_id: "client".to_string(),
            client_secret: Some("secret".to_string()),
            token_uri: token_uri.to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    fn config_in(temp: &TempDir) -> DriveConfig {
        DriveConfig::new(temp.path().join("creds.json"), temp.path().join("token.json"))
    }

    fn write_secrets(temp: &TempDir, token_uri: &str) {
        let secrets = serde_json::json!({
            "installed": {
                "client_id": "client",
                "client_secret": "secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": token_uri,
                "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob"]
            }
        });
        std::fs::write(temp.path().join("creds.json"), secrets.to_string()).unwrap();
    }

    fn token_body(access: &str, refresh: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "access_token": access,
            "token_type": "Bearer",
            "expires_in": 3599,
            "scope": DRIVE_SCOPE
        });
        if let Some(refresh) = refresh {
            body["refresh_token"] = serde_json::json!(refresh);
        }
        body
    }

    fn test_config() -> AuthConfig {
        AuthConfig {
            client_id: "test_id".to_string(),
            client_secret: Some("test_secret".to_string()),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            redirect_url: OOB_REDIRECT_URL.to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
        }
    }

    #[test]
    fn test_authorization_url_generation() {
        let manager = AuthManager::new(test_config()).unwrap();
        let (url, csrf_token) = manager.authorization_url();

        assert!(url.starts_with(GOOGLE_AUTH_URL));
        assert!(url.contains("client_id=test_id"));
        assert!(url.contains("scope="));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("redirect_uri=urn"));
        assert!(!csrf_token.is_empty());
    }

    #[test]
    fn test_auth_manager_rejects_bad_token_url() {
        let mut config = test_config();
        config.token_url = "not a url".to_string();
        assert!(AuthManager::new(config).is_err());
    }

    #[test]
    fn test_auth_config_from_credential() {
        let c = credential("https://example.com/token", 60, Some("r"));
        let config = AuthConfig::from_credential(&c);
        assert_eq!(config.client_id, "client");
        assert_eq!(config.token_url, "https://example.com/token");
        assert_eq!(config.client_secret.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("new-access", None));
            })
            .await;

        let c = credential(&server.url("/token"), -10, Some("keep-me"));
        let manager = AuthManager::new(AuthConfig::from_credential(&c)).unwrap();
        let refreshed = manager.refresh(&c).await.unwrap();

        token_mock.assert_async().await;
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("keep-me"));
        assert!(!refreshed.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_fails() {
        let c = credential("https://example.com/token", -10, None);
        let manager = AuthManager::new(AuthConfig::from_credential(&c)).unwrap();
        let err = manager.refresh(&c).await.unwrap_err();
        assert!(matches!(err, Error::Authentication(_)));
    }

    #[tokio::test]
    async fn test_valid_credential_reused_without_prompt() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let saved = credential("https://example.com/token", 60, Some("r"));
        TokenStore::new(&config.token_path).save(&saved).await.unwrap();

        let prompt = CountingPrompt::new();
        let credential = Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap();

        assert_eq!(prompt.calls(), 0);
        assert_eq!(credential.access_token, "old-access");
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("refreshed-access", None));
            })
            .await;

        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let store = TokenStore::new(&config.token_path);
        store
            .save(&credential(&server.url("/token"), -30, Some("r")))
            .await
            .unwrap();

        let prompt = CountingPrompt::new();
        let credential = Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap();

        token_mock.assert_async().await;
        assert_eq!(prompt.calls(), 0);
        assert_eq!(credential.access_token, "refreshed-access");

        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted.access_token, "refreshed-access");
        assert_eq!(persisted.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_absent_credential_runs_interactive_flow() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("fresh-access", Some("fresh-refresh")));
            })
            .await;

        let temp = TempDir::new().unwrap();
        write_secrets(&temp, &server.url("/token"));
        let config = config_in(&temp);

        let prompt = CountingPrompt::new();
        let credential = Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap();

        token_mock.assert_async().await;
        assert_eq!(prompt.calls(), 1);
        assert_eq!(credential.access_token, "fresh-access");
        assert_eq!(credential.token_uri, server.url("/token"));

        let persisted = TokenStore::new(&config.token_path)
            .load()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.refresh_token.as_deref(), Some("fresh-refresh"));
    }

    #[tokio::test]
    async fn test_failed_refresh_falls_back_to_interactive_flow() {
        let server = MockServer::start_async().await;
        let refresh_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/revoked");
                then.status(400)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({ "error": "invalid_grant" }));
            })
            .await;
        let exchange_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("reauthorized", Some("new-refresh")));
            })
            .await;

        let temp = TempDir::new().unwrap();
        write_secrets(&temp, &server.url("/token"));
        let config = config_in(&temp);
        TokenStore::new(&config.token_path)
            .save(&credential(&server.url("/revoked"), -30, Some("stale")))
            .await
            .unwrap();

        let prompt = CountingPrompt::new();
        let credential = Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap();

        refresh_mock.assert_async().await;
        exchange_mock.assert_async().await;
        assert_eq!(prompt.calls(), 1);
        assert_eq!(credential.access_token, "reauthorized");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_reauthorizes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("reauthorized", Some("r")));
            })
            .await;

        let temp = TempDir::new().unwrap();
        write_secrets(&temp, &server.url("/token"));
        let config = config_in(&temp);
        TokenStore::new(&config.token_path)
            .save(&credential(&server.url("/token"), -30, None))
            .await
            .unwrap();

        let prompt = CountingPrompt::new();
        Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap();

        assert_eq!(prompt.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_secrets_file_fails() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        let prompt = CountingPrompt::new();
        let err = Authenticator::new(&config)
            .authenticate(&prompt)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(prompt.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_manager_refreshes_on_demand() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/token");
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(token_body("on-demand", None));
            })
            .await;

        let temp = TempDir::new().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        let manager = TokenManager::new(
            store.clone(),
            credential(&server.url("/token"), -1, Some("r")),
        );

        assert_eq!(manager.get_access_token().await.unwrap(), "on-demand");
        // Second call uses the refreshed token.
        assert_eq!(manager.get_access_token().await.unwrap(), "on-demand");

        token_mock.assert_async().await;
        assert_eq!(
            store.load().await.unwrap().unwrap().access_token,
            "on-demand"
        );
    }

    #[tokio::test]
    async fn test_token_manager_valid_token_no_refresh() {
        let temp = TempDir::new().unwrap();
        let manager = TokenManager::new(
            TokenStore::new(temp.path().join("token.json")),
            credential("http://127.0.0.1:9/token", 60, Some("r")),
        );

        assert_eq!(manager.get_access_token().await.unwrap(), "old-access");
        assert!(!temp.path().join("token.json").exists());
    }
}
