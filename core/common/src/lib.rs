//! Common utilities and types shared across the gapitoo crates.
//!
//! This module provides the error type used throughout the workspace and the
//! resource reference types that turn Drive IDs or shareable URLs into
//! identifiers the API understands.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{extract_file_id, extract_folder_id, resolve_id, ResourceKind, ResourceRef};
