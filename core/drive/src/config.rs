//! Client configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use gapitoo_common::{Error, Result};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
/// Google Drive upload API base URL.
pub const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Full read/write access to the user's Drive.
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
/// Out-of-band redirect: the provider shows the code for the user to paste.
pub const OOB_REDIRECT_URL: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Resumable upload chunks must be a multiple of this size.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;
/// Default chunk size for uploads (8MB).
pub const DEFAULT_CHUNK_SIZE: usize = 32 * CHUNK_GRANULARITY;

const DEFAULT_CREDENTIALS_PATH: &str = "gcon/creds.json";
const DEFAULT_TOKEN_PATH: &str = "token.json";

/// Configuration for a [`DriveService`](crate::DriveService).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// OAuth client-secret JSON, only read for interactive authorization.
    pub credentials_path: PathBuf,
    /// Where the credential is persisted between runs.
    pub token_path: PathBuf,
    /// Redirect URI sent with the authorization request.
    pub redirect_url: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
    /// Drive metadata/media API base.
    pub api_base: String,
    /// Drive upload API base.
    pub upload_base: String,
    /// Bytes sent per resumable upload request.
    pub chunk_size: usize,
    /// Draw progress bars on stderr.
    pub show_progress: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            redirect_url: OOB_REDIRECT_URL.to_string(),
            scopes: vec![DRIVE_SCOPE.to_string()],
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: DRIVE_UPLOAD_BASE.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            show_progress: true,
        }
    }
}

impl DriveConfig {
    /// Create a configuration with the given credential and token paths.
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            ..Self::default()
        }
    }

    /// Token location under the user's config directory, if one exists.
    pub fn default_token_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("gapitoo").join(DEFAULT_TOKEN_PATH))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH))
    }

    /// Point both API bases at another host, e.g. a local mock server.
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.api_base = format!("{}/drive/v3", base);
        self.upload_base = format!("{}/upload/drive/v3", base);
        self
    }

    /// Set the upload chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable or disable progress bars.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Check the configuration before any I/O happens.
    ///
    /// # Errors
    /// - Chunk size is zero or not a multiple of 256 KiB
    /// - An API base is not a valid URL
    /// - No scope requested
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_size % CHUNK_GRANULARITY != 0 {
            return Err(Error::InvalidInput(format!(
                "Chunk size must be a positive multiple of {} bytes, got {}",
                CHUNK_GRANULARITY, self.chunk_size
            )));
        }

        for base in [&self.api_base, &self.upload_base] {
            url::Url::parse(base)
                .map_err(|e| Error::InvalidInput(format!("Invalid API base {}: {}", base, e)))?;
        }

        if self.scopes.is_empty() {
            return Err(Error::InvalidInput("At least one scope is required".to_string()));
        }

        Ok(())
    }
}
