//! Upload/download facade over one authenticated Drive session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use gapitoo_common::{resolve_id, Error, ResourceKind, Result};

use crate::auth::{Authenticator, TokenManager};
use crate::client::{DriveClient, DriveUser};
use crate::config::DriveConfig;
use crate::credential::Credential;
use crate::progress::transfer_bar;
use crate::prompt::AuthorizationPrompt;
use crate::token_store::TokenStore;

/// One authenticated session with Google Drive.
///
/// Holds the credential and HTTP session for the lifetime of the value;
/// nothing is shared process-wide.
pub struct DriveService {
    client: DriveClient,
    tokens: Arc<TokenManager>,
    config: DriveConfig,
}

impl DriveService {
    /// Load, refresh or acquire a credential and open a session.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Authorization failed or the client-secret file is unusable
    /// - Token file could not be written
    pub async fn initialize(config: DriveConfig, prompt: &dyn AuthorizationPrompt) -> Result<Self> {
        config.validate()?;

        let authenticator = Authenticator::new(&config);
        let credential = authenticator.authenticate(prompt).await?;

        Self::with_credential(config, credential)
    }

    /// Open a session with an already obtained credential.
    ///
    /// Refreshed tokens are still persisted to the configured token path.
    pub fn with_credential(config: DriveConfig, credential: Credential) -> Result<Self> {
        config.validate()?;

        let tokens = Arc::new(TokenManager::new(
            TokenStore::new(&config.token_path),
            credential,
        ));
        let client = DriveClient::new(&config, tokens.clone())?;

        Ok(Self {
            client,
            tokens,
            config,
        })
    }

    /// Current credential (useful for persistence).
    pub async fn credential(&self) -> Credential {
        self.tokens.credential().await
    }

    /// Account the session belongs to.
    pub async fn about(&self) -> Result<DriveUser> {
        self.client.about().await
    }

    /// Upload `local_path` into the folder given by ID or shareable URL.
    ///
    /// Returns the new file's ID.
    ///
    /// # Errors
    /// - Neither folder ID nor URL given, or the URL is malformed; nothing is
    ///   sent in that case
    /// - Local file unreadable
    /// - Any provider or network failure
    pub async fn upload(
        &self,
        local_path: impl AsRef<Path>,
        folder_id: Option<&str>,
        folder_url: Option<&str>,
    ) -> Result<String> {
        let folder_id = resolve_id(folder_id, folder_url, ResourceKind::Folder)?;
        self.upload_to_folder(local_path, &folder_id).await
    }

    /// Upload `local_path` into the folder with ID `folder_id`.
    pub async fn upload_to_folder(
        &self,
        local_path: impl AsRef<Path>,
        folder_id: &str,
    ) -> Result<String> {
        let local_path = local_path.as_ref();
        let name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::InvalidInput(format!("Not a file path: {}", local_path.display()))
            })?;

        let total = tokio::fs::metadata(local_path).await?.len();
        info!("Uploading {} ({} bytes) to folder {}", name, total, folder_id);

        let progress = transfer_bar(total, "Upload Progress", self.config.show_progress);
        let file = self
            .client
            .upload_file(local_path, &name, folder_id, &progress)
            .await;
        progress.finish();
        let file = file?;

        info!("{} uploaded; File ID: {}", name, file.id);
        Ok(file.id)
    }

    /// Download the file given by ID or shareable URL to `destination`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// - Neither file ID nor URL given, or the URL is malformed; nothing is
    ///   requested or written in that case
    /// - Destination not writable
    /// - Any provider or network failure
    pub async fn download(
        &self,
        destination: impl AsRef<Path>,
        file_id: Option<&str>,
        file_url: Option<&str>,
    ) -> Result<u64> {
        let file_id = resolve_id(file_id, file_url, ResourceKind::File)?;
        self.download_file(destination, &file_id).await
    }

    /// Download the file with ID `file_id` to `destination`.
    ///
    /// If `destination` is an existing directory the file keeps its remote
    /// name inside it.
    pub async fn download_file(
        &self,
        destination: impl AsRef<Path>,
        file_id: &str,
    ) -> Result<u64> {
        let destination = self.destination_path(destination.as_ref(), file_id).await?;

        let total = self.client.file_size(file_id).await?.unwrap_or(0);
        if total == 0 {
            debug!("No size reported for {}, progress total unknown", file_id);
        }

        info!("Downloading to {}...", destination.display());
        let progress = transfer_bar(total, "Download Progress", self.config.show_progress);
        let written = self
            .client
            .download_to(file_id, &destination, &progress)
            .await;
        progress.finish();
        let written = written?;

        info!("Downloaded {} bytes to {}", written, destination.display());
        Ok(written)
    }

    async fn destination_path(&self, destination: &Path, file_id: &str) -> Result<PathBuf> {
        let is_dir = tokio::fs::metadata(destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);

        if !is_dir {
            return Ok(destination.to_path_buf());
        }

        let file = self.client.get_file(file_id).await?;
        let name = Path::new(&file.name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                Error::InvalidInput(format!("File {} has no usable name", file_id))
            })?;
        Ok(destination.join(name))
    }
}
