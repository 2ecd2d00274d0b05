//! Google Drive API client.

use bytes::Bytes;
use futures::StreamExt;
use indicatif::ProgressBar;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use gapitoo_common::{Error, Result};

use crate::auth::TokenManager;
use crate::config::DriveConfig;

/// Fields requested for file resources.
const FILE_FIELDS: &str = "id,name,mimeType,size,parents";

/// Characters escaped when an ID is placed in a URL path.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Google Drive file metadata from API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    /// File ID.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    /// File size in bytes (only for files, not folders).
    #[serde(default)]
    pub size: Option<String>,
    /// Parent folder IDs.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl DriveFile {
    /// Get size as u64.
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_ref().and_then(|s| s.parse().ok())
    }
}

/// Account the session is authenticated as.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: String,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    #[serde(default)]
    user: DriveUser,
}

/// Google Drive API client.
pub struct DriveClient {
    http: Client,
    token_manager: Arc<TokenManager>,
    api_base: String,
    upload_base: String,
    chunk_size: usize,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(config: &DriveConfig, token_manager: Arc<TokenManager>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("gapitoo/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            token_manager,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            chunk_size: config.chunk_size,
        })
    }

    /// Get authorization header.
    async fn auth_header(&self) -> Result<String> {
        let token = self.token_manager.get_access_token().await?;
        Ok(format!("Bearer {}", token))
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/files/{}",
            self.api_base,
            utf8_percent_encode(file_id, PATH_SEGMENT)
        )
    }

    /// Get the authenticated user.
    pub async fn about(&self) -> Result<DriveUser> {
        let url = format!("{}/about", self.api_base);
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", "user(displayName,emailAddress)")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to query account: {}", e)))?;

        let about: AboutResponse = self.handle_response(response).await?;
        Ok(about.user)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(self.file_url(file_id))
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file: {}", e)))?;

        self.handle_response(response).await
    }

    /// Get the byte size of a file, if the provider reports one.
    ///
    /// Folders and Google-native documents have no size.
    pub async fn file_size(&self, file_id: &str) -> Result<Option<u64>> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(self.file_url(file_id))
            .header(header::AUTHORIZATION, auth)
            .query(&[("fields", "size"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to get file size: {}", e)))?;

        let file: DriveFile = self.handle_response(response).await?;
        Ok(file.size_bytes())
    }

    /// Start a resumable upload session.
    ///
    /// Returns the session URI chunks are sent to.
    pub async fn start_resumable_upload(
        &self,
        name: &str,
        parent_id: &str,
        total_size: u64,
    ) -> Result<String> {
        let url = format!("{}/files", self.upload_base);
        let auth = self.auth_header().await?;

        let metadata = serde_json::json!({
            "name": name,
            "parents": [parent_id]
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, auth)
            .header("X-Upload-Content-Length", total_size.to_string())
            .query(&[
                ("uploadType", "resumable"),
                ("supportsAllDrives", "true"),
                ("fields", FILE_FIELDS),
            ])
            .json(&metadata)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to start resumable upload: {}", e)))?;

        let response = self.error_for_status(response).await?;

        // Extract upload URI from Location header
        let upload_uri = response
            .headers()
            .get(header::LOCATION)
            .ok_or_else(|| Error::Network("No upload URI in response".to_string()))?
            .to_str()
            .map_err(|e| Error::Network(format!("Invalid upload URI: {}", e)))?
            .to_string();

        debug!("Created resumable upload session for {}", name);
        Ok(upload_uri)
    }

    /// Upload a chunk to a resumable upload session.
    ///
    /// Returns the file resource once the provider reports the upload
    /// complete, `None` while more bytes are expected. An empty `data`
    /// finalizes a zero-byte upload.
    pub async fn upload_chunk(
        &self,
        upload_uri: &str,
        data: &[u8],
        start_byte: u64,
        total_size: u64,
    ) -> Result<Option<DriveFile>> {
        let content_range = if data.is_empty() {
            format!("bytes */{}", total_size)
        } else {
            let end_byte = start_byte + data.len() as u64 - 1;
            format!("bytes {}-{}/{}", start_byte, end_byte, total_size)
        };

        debug!("Uploading chunk: {}", content_range);

        let response = self
            .http
            .put(upload_uri)
            .header(header::CONTENT_LENGTH, data.len().to_string())
            .header(header::CONTENT_RANGE, content_range)
            .body(Bytes::copy_from_slice(data))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to upload chunk: {}", e)))?;

        let status = response.status();

        if status == StatusCode::OK || status == StatusCode::CREATED {
            let file: DriveFile = response
                .json()
                .await
                .map_err(|e| Error::Network(format!("Failed to parse upload response: {}", e)))?;
            Ok(Some(file))
        } else if status.as_u16() == 308 {
            // Resume Incomplete: more chunks needed
            Ok(None)
        } else {
            Err(self.status_error(response).await)
        }
    }

    /// Upload a local file into `parent_id` as a resumable upload.
    ///
    /// The file is sent in chunks of the configured size; `progress` is
    /// advanced after each accepted chunk.
    pub async fn upload_file(
        &self,
        path: &Path,
        name: &str,
        parent_id: &str,
        progress: &ProgressBar,
    ) -> Result<DriveFile> {
        let mut file = File::open(path).await?;
        let total_size = file.metadata().await?.len();

        let upload_uri = self
            .start_resumable_upload(name, parent_id, total_size)
            .await?;

        if total_size == 0 {
            return self
                .upload_chunk(&upload_uri, &[], 0, 0)
                .await?
                .ok_or_else(|| Error::Network("Upload did not complete".to_string()));
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let mut bytes_uploaded = 0u64;

        loop {
            let n = read_chunk(&mut file, &mut buffer).await?;
            if n == 0 {
                break;
            }

            let result = self
                .upload_chunk(&upload_uri, &buffer[..n], bytes_uploaded, total_size)
                .await?;

            bytes_uploaded += n as u64;
            progress.inc(n as u64);

            if let Some(file) = result {
                return Ok(file);
            }
        }

        Err(Error::Network("Upload did not complete".to_string()))
    }

    /// Stream a file's content to `dest`.
    ///
    /// The destination is created only once the provider has accepted the
    /// request. Returns the number of bytes written.
    pub async fn download_to(
        &self,
        file_id: &str,
        dest: &Path,
        progress: &ProgressBar,
    ) -> Result<u64> {
        let auth = self.auth_header().await?;

        let response = self
            .http
            .get(self.file_url(file_id))
            .header(header::AUTHORIZATION, auth)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to start download: {}", e)))?;

        let response = self.error_for_status(response).await?;

        let mut out = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::Network(format!("Stream read error: {}", e)))?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            progress.inc(chunk.len() as u64);
        }

        out.flush().await?;
        Ok(written)
    }

    /// Handle API response with error checking.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        self.error_for_status(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Network(format!("Failed to parse response: {}", e)))
    }

    async fn error_for_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.status_error(response).await)
        }
    }

    async fn status_error(&self, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::NOT_FOUND {
            Error::NotFound(format!("Resource not found: {}", body))
        } else if status == StatusCode::UNAUTHORIZED {
            Error::Authentication(format!("Invalid or expired token: {}", body))
        } else if status == StatusCode::FORBIDDEN {
            Error::PermissionDenied(format!("Access denied: {}", body))
        } else {
            Error::Network(format!("API error: {} - {}", status, body))
        }
    }
}

/// Fill `buf` from `file`, stopping early only at end of file.
async fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
