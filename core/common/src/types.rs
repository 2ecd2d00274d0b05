//! Resource references: Drive identifiers given directly or through a
//! shareable URL.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::{Error, Result};

/// Folder links look like `https://drive.google.com/drive/folders/<ID>?usp=<...>`.
static FOLDER_URL: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        "{}([^/]+){}",
        regex::escape("https://drive.google.com/drive/folders/"),
        regex::escape("?usp=")
    );
    Regex::new(&pattern).expect("folder URL pattern is valid")
});

/// File links are matched loosely on the `d/<ID>/view` segment.
static FILE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"d/([^/]+)/view").expect("file URL pattern is valid"));

/// Kind of Drive resource a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A folder, used as an upload destination.
    Folder,
    /// A file, used as a download source.
    File,
}

impl ResourceKind {
    /// Lowercase name used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Folder => "folder",
            ResourceKind::File => "file",
        }
    }

    /// Extract the identifier from a shareable URL of this kind.
    pub fn extract_id(&self, url: &str) -> Result<String> {
        let pattern = match self {
            ResourceKind::Folder => &*FOLDER_URL,
            ResourceKind::File => &*FILE_URL,
        };

        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| Error::InvalidUrl {
                kind: self.as_str(),
                url: url.to_string(),
            })
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to a Drive resource, either by ID or by shareable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// Provider-assigned identifier.
    Id(String),
    /// Shareable link the identifier is extracted from.
    Url(String),
}

impl ResourceRef {
    /// Build a reference from the optional ID/URL pair accepted by the
    /// transfer calls.
    ///
    /// Empty strings count as absent. An ID takes precedence over a URL.
    ///
    /// # Errors
    /// - `Error::MissingReference` if neither is present
    pub fn from_options(id: Option<&str>, url: Option<&str>, kind: ResourceKind) -> Result<Self> {
        let id = id.filter(|s| !s.is_empty());
        let url = url.filter(|s| !s.is_empty());

        match (id, url) {
            (Some(id), url) => {
                if url.is_some() {
                    tracing::debug!("Both {} ID and URL given, using the ID", kind);
                }
                Ok(ResourceRef::Id(id.to_string()))
            }
            (None, Some(url)) => Ok(ResourceRef::Url(url.to_string())),
            (None, None) => Err(Error::MissingReference { kind: kind.as_str() }),
        }
    }

    /// Resolve to a provider identifier.
    ///
    /// # Errors
    /// - `Error::InvalidUrl` if the URL does not match the pattern for `kind`
    pub fn resolve(&self, kind: ResourceKind) -> Result<String> {
        match self {
            ResourceRef::Id(id) => Ok(id.clone()),
            ResourceRef::Url(url) => kind.extract_id(url),
        }
    }
}

/// Resolve an optional ID/URL pair in one step.
pub fn resolve_id(id: Option<&str>, url: Option<&str>, kind: ResourceKind) -> Result<String> {
    ResourceRef::from_options(id, url, kind)?.resolve(kind)
}

/// Extract a folder ID from a `.../drive/folders/<ID>?usp=...` link.
pub fn extract_folder_id(url: &str) -> Result<String> {
    ResourceKind::Folder.extract_id(url)
}

/// Extract a file ID from a `.../file/d/<ID>/view...` link.
pub fn extract_file_id(url: &str) -> Result<String> {
    ResourceKind::File.extract_id(url)
}
