//! Persisted credential storage.

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use gapitoo_common::Result;

use crate::credential::Credential;

/// Reads and writes the credential file.
///
/// The file is not locked; two processes refreshing at once may lose one
/// of the updates.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Create a store backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted credential.
    ///
    /// Returns `None` if the file does not exist or cannot be parsed.
    pub async fn load(&self) -> Result<Option<Credential>> {
        let json = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&json) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                warn!(
                    "Ignoring unreadable token file {}: {}",
                    self.path.display(),
                    e
                );
                Ok(None)
            }
        }
    }

    /// Persist `credential`, replacing any previous file.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(credential)?;
        let tmp = self.tmp_path();

        if let Err(e) = self.replace_with(&tmp, json.as_bytes()).await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e);
        }

        debug!("Saved credential to {}", self.path.display());
        Ok(())
    }

    /// Write `data` to a fresh owner-only `tmp` file, then move it over the
    /// token file.
    async fn replace_with(&self, tmp: &Path, data: &[u8]) -> Result<()> {
        match fs::remove_file(tmp).await {
            Ok(()) => debug!("Removed stale {}", tmp.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
