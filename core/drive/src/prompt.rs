//! Interactive step of the authorization-code flow.

use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use gapitoo_common::{Error, Result};

/// Presents the authorization URL and returns the code the user obtained.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Ask the user to visit `auth_url` and return the pasted code.
    async fn authorization_code(&self, auth_url: &str) -> Result<String>;
}

/// Prompt on the terminal: print the URL, read the code from stdin.
#[derive(Debug, Default, Clone)]
pub struct ConsolePrompt {
    open_browser: bool,
}

impl ConsolePrompt {
    /// Create a console prompt. With `open_browser` the URL is also opened
    /// in the system browser.
    pub fn new(open_browser: bool) -> Self {
        Self { open_browser }
    }
}

#[async_trait]
impl AuthorizationPrompt for ConsolePrompt {
    async fn authorization_code(&self, auth_url: &str) -> Result<String> {
        println!("Authorize the request by visiting this URL: {}", auth_url);

        if self.open_browser {
            if let Err(e) = open::that(auth_url) {
                tracing::warn!("Could not open browser: {}", e);
            }
        }

        print!("Enter the authorization code: ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;

        let code = line.trim();
        if code.is_empty() {
            return Err(Error::Authentication(
                "No authorization code entered".to_string(),
            ));
        }
        Ok(code.to_string())
    }
}

/// Prompt that always answers with a fixed code, for non-interactive use.
#[derive(Debug, Clone)]
pub struct StaticPrompt {
    code: String,
}

impl StaticPrompt {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

#[async_trait]
impl AuthorizationPrompt for StaticPrompt {
    async fn authorization_code(&self, _auth_url: &str) -> Result<String> {
        Ok(self.code.clone())
    }
}
