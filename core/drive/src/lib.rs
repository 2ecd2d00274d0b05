//! Google Drive upload/download client for gapitoo.
//!
//! This crate provides one authenticated Drive session with:
//! - OAuth2 authorization-code flow with a persisted, auto-refreshed credential
//! - Resumable uploads sent in fixed-size chunks
//! - Streaming downloads to a local path
//! - Byte-level progress bars for both directions

pub mod auth;
pub mod client;
pub mod config;
pub mod credential;
pub mod progress;
pub mod prompt;
pub mod service;
pub mod token_store;

pub use auth::{AuthConfig, AuthManager, Authenticator, TokenManager};
pub use client::{DriveClient, DriveFile, DriveUser};
pub use config::DriveConfig;
pub use credential::{ClientSecrets, Credential, CredentialState};
pub use prompt::{AuthorizationPrompt, ConsolePrompt, StaticPrompt};
pub use service::DriveService;
pub use token_store::TokenStore;
