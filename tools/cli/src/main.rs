//! gapitoo CLI - Command line interface for Google Drive transfers.
//!
//! This tool uploads local files into Drive folders and downloads Drive
//! files to local paths, authorizing once and reusing the saved credential.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use gapitoo_common::{resolve_id, ResourceKind};
use gapitoo_drive::config::CHUNK_GRANULARITY;
use gapitoo_drive::{AuthorizationPrompt, ConsolePrompt, DriveConfig, DriveService, StaticPrompt};

/// Exit status for malformed or missing resource references.
const EXIT_USAGE: u8 = 2;
const EXIT_FAILURE: u8 = 1;

#[derive(Parser)]
#[command(name = "gapitoo")]
#[command(about = "gapitoo - Up-/Down-load files on Google Drive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Hide progress bars.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// OAuth client-secret JSON, needed for the first authorization.
    #[arg(long, global = true, env = "GAPITOO_CREDENTIALS", default_value = "gcon/creds.json")]
    credentials: PathBuf,

    /// Where the credential is saved between runs.
    #[arg(long, global = true, env = "GAPITOO_TOKEN", default_value = "token.json")]
    token: PathBuf,

    /// Keep the credential under the user config directory instead of --token.
    #[arg(long, global = true, conflicts_with = "token")]
    token_in_config_dir: bool,

    /// Open the authorization URL in the default browser.
    #[arg(long, global = true)]
    open_browser: bool,

    /// Authorization code to use instead of prompting.
    #[arg(long, global = true, env = "GAPITOO_AUTH_CODE", hide_env_values = true)]
    auth_code: Option<String>,

    /// Upload chunk size in MiB.
    #[arg(long, global = true, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..=1024))]
    chunk_size_mib: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize (or refresh) and show the signed-in account.
    Auth,

    /// Upload a file into a Drive folder.
    Upload {
        /// Local file to upload.
        file: PathBuf,

        /// Destination folder ID.
        #[arg(long)]
        folder_id: Option<String>,

        /// Destination folder link (https://drive.google.com/drive/folders/<ID>?usp=...).
        #[arg(long)]
        folder_url: Option<String>,
    },

    /// Download a Drive file.
    Download {
        /// Destination path (or existing directory).
        dest: PathBuf,

        /// Source file ID.
        #[arg(long)]
        file_id: Option<String>,

        /// Source file link (https://drive.google.com/file/d/<ID>/view?usp=...).
        #[arg(long)]
        file_url: Option<String>,
    },

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "gapitoo", &mut std::io::stdout());
        return ExitCode::SUCCESS;
    }

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let status = exit_status(&e);
            if status == EXIT_USAGE {
                eprintln!("{}", e);
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(status)
        }
    }
}

/// Exit status for a failed run: 2 for bad references, 1 otherwise.
fn exit_status(err: &anyhow::Error) -> u8 {
    let usage = err
        .downcast_ref::<gapitoo_common::Error>()
        .is_some_and(|e| e.is_usage());
    if usage {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = drive_config(&cli);
    let prompt: Box<dyn AuthorizationPrompt> = match &cli.auth_code {
        Some(code) => Box::new(StaticPrompt::new(code.clone())),
        None => Box::new(ConsolePrompt::new(cli.open_browser)),
    };

    match cli.command {
        Commands::Auth => cmd_auth(config, prompt.as_ref()).await,

        Commands::Upload {
            file,
            folder_id,
            folder_url,
        } => {
            // Resolve before authorizing so a bad reference never prompts.
            let folder_id =
                resolve_id(folder_id.as_deref(), folder_url.as_deref(), ResourceKind::Folder)?;
            cmd_upload(config, prompt.as_ref(), &file, &folder_id).await
        }

        Commands::Download {
            dest,
            file_id,
            file_url,
        } => {
            let file_id = resolve_id(file_id.as_deref(), file_url.as_deref(), ResourceKind::File)?;
            cmd_download(config, prompt.as_ref(), &dest, &file_id).await
        }

        Commands::Completions { .. } => Ok(()),
    }
}

/// Build the client configuration from command line flags.
fn drive_config(cli: &Cli) -> DriveConfig {
    let token_path = if cli.token_in_config_dir {
        DriveConfig::default_token_path()
    } else {
        cli.token.clone()
    };

    DriveConfig::new(&cli.credentials, token_path)
        .with_chunk_size(cli.chunk_size_mib as usize * 4 * CHUNK_GRANULARITY)
        .with_progress(!cli.quiet)
}

/// Authorize and show the account.
async fn cmd_auth(config: DriveConfig, prompt: &dyn AuthorizationPrompt) -> Result<()> {
    let token_path = config.token_path.clone();
    let service = DriveService::initialize(config, prompt)
        .await
        .context("Failed to authorize")?;

    let user = service.about().await.context("Failed to query account")?;

    println!("Authorized as {} <{}>", user.display_name, user.email_address);
    println!("  Token: {}", token_path.display());

    Ok(())
}

/// Upload a file into a folder.
async fn cmd_upload(
    config: DriveConfig,
    prompt: &dyn AuthorizationPrompt,
    file: &Path,
    folder_id: &str,
) -> Result<()> {
    info!("Uploading {} to folder {}", file.display(), folder_id);

    let service = DriveService::initialize(config, prompt)
        .await
        .context("Failed to authorize")?;

    let id = service
        .upload_to_folder(file, folder_id)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!("{} uploaded; File ID: {}", name, id);

    Ok(())
}

/// Download a file.
async fn cmd_download(
    config: DriveConfig,
    prompt: &dyn AuthorizationPrompt,
    dest: &Path,
    file_id: &str,
) -> Result<()> {
    info!("Downloading {} to {}", file_id, dest.display());

    let service = DriveService::initialize(config, prompt)
        .await
        .context("Failed to authorize")?;

    let written = service
        .download_file(dest, file_id)
        .await
        .with_context(|| format!("Failed to download {}", file_id))?;

    println!("Downloaded {} bytes to {}", written, dest.display());

    Ok(())
}
