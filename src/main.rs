//! # askdrive CLI (`ask`)
//!
//! The `ask` binary is a terminal chat assistant grounded in documents from
//! Google Drive. It provides commands for credential verification, folder
//! and file discovery, batched document reads, and the interactive chat
//! session itself.
//!
//! ## Usage
//!
//! ```bash
//! ask --config ./askdrive.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ask auth` | Verify the stored Drive credential (refresh + report) |
//! | `ask folders` | List every folder under the configured root |
//! | `ask files` | List files in a folder (optionally the whole subtree) |
//! | `ask read [PATH...]` | Read remote or local documents into the context |
//! | `ask chat` | Start the interactive session (or send one message) |
//!
//! ## Examples
//!
//! ```bash
//! # Check the stored credential works
//! ask auth
//!
//! # See what a deep scan of the root would read
//! ask files --deep
//!
//! # Read at most five remote files, then ask about them
//! ask read --deep --limit 5
//! ask chat --message "Summarize the supplied documents"
//!
//! # Read local files and archive the originals to Drive
//! ask read notes.pdf minutes.docx --archive
//!
//! # Interactive session
//! ask chat
//! ```

mod chat;
mod config;
mod drive;
mod extract;
mod ingest;
mod ledger;
mod models;
mod progress;
mod render;
mod repl;
mod session;
mod speech;
mod walker;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::progress::ProgressMode;

/// askdrive — a terminal chat assistant grounded in Drive documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the Drive credential path, root folder, and model settings.
#[derive(Parser)]
#[command(
    name = "ask",
    about = "askdrive — a terminal chat assistant grounded in documents from Google Drive",
    version,
    long_about = "askdrive reads PDF, DOCX, and native Google documents from a Drive folder \
    tree (or from local paths) into a per-session context, grounds an LLM chat session in \
    that context, and can save replies back as DOCX or synthesized speech."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./askdrive.toml`. The Drive credential path, root
    /// folder id, and model settings are read from this file; the API key
    /// comes from the `GEMINI_API_KEY` environment variable.
    #[arg(long, global = true, default_value = "./askdrive.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Verify the stored Drive credential.
    ///
    /// Loads the credential JSON, exchanges the refresh token for a fresh
    /// access token, and reports the granted scopes and token expiry.
    /// Producing the credential file in the first place is a one-time
    /// browser consent flow outside this tool.
    Auth,

    /// List every folder under the configured root.
    ///
    /// Walks the folder tree (bounded by `drive.max_depth`) and prints a
    /// flattened, indented listing. Branches that fail to list are counted
    /// and reported; the rest of the tree still prints.
    Folders,

    /// List files in a folder.
    ///
    /// Shallow by default; `--deep` unions the whole subtree. Only file
    /// entries are shown, filtered by the configured name globs.
    Files {
        /// Folder id to list (defaults to the configured root).
        #[arg(long)]
        folder: Option<String>,

        /// Recurse into every descendant folder.
        #[arg(long)]
        deep: bool,
    },

    /// Read documents into the session context and print the batch report.
    ///
    /// With PATH arguments, reads local files and directories. Without
    /// them, discovers and reads remote files from the selected folder.
    /// Each document is decoded to text and offered to the context ledger;
    /// duplicates (by name) are skipped, and one file's failure never
    /// aborts the rest of the batch.
    Read {
        /// Local files or directories to read. Omit to read from Drive.
        paths: Vec<PathBuf>,

        /// Folder id to read from (defaults to the configured root).
        #[arg(long)]
        folder: Option<String>,

        /// Recurse into every descendant folder (remote reads only).
        #[arg(long)]
        deep: bool,

        /// Read at most this many of the discovered files.
        #[arg(long)]
        limit: Option<usize>,

        /// Also upload each local original into the selected folder.
        #[arg(long)]
        archive: bool,

        /// Progress output: `off`, `human`, or `json` (default: human
        /// when stderr is a TTY).
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Start the chat session.
    ///
    /// Interactive by default: plain lines are chat turns and `:` commands
    /// drive folder browsing, reads, saves, and speech (`:help` lists
    /// them). With `--message`, sends a single turn and exits.
    Chat {
        /// Folder id to use as the working folder.
        #[arg(long)]
        folder: Option<String>,

        /// Send one message, print the reply, and exit.
        #[arg(long)]
        message: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Auth => {
            let gateway = drive::DriveGateway::new(&cfg.drive)?;
            let status = gateway.verify().await?;
            println!("credential ok");
            println!("  token expires: {}", status.expires_at.to_rfc3339());
            if status.scopes.is_empty() {
                println!("  scopes: (none recorded)");
            } else {
                for scope in &status.scopes {
                    println!("  scope: {}", scope);
                }
            }
        }
        Commands::Folders => {
            let gateway = drive::DriveGateway::new(&cfg.drive)?;
            let listing =
                walker::list_folders(&gateway, &cfg.drive.root_folder_id, cfg.drive.max_depth)
                    .await;
            if listing.failed_branches > 0 {
                eprintln!(
                    "warning: {} folder branch(es) could not be listed; results are partial",
                    listing.failed_branches
                );
            }
            if listing.folders.is_empty() {
                println!("no folders under the root");
            }
            for folder in &listing.folders {
                println!("{}  [{}]", folder.display_label, folder.id);
            }
        }
        Commands::Files { folder, deep } => {
            let gateway = drive::DriveGateway::new(&cfg.drive)?;
            let mut state = session::SessionState::new(&cfg);
            if let Some(id) = folder {
                state.select_folder_id(&id);
            }
            let listing = ingest::discover_files(&gateway, &mut state, &cfg, deep).await?;
            if listing.failed_branches > 0 {
                eprintln!(
                    "warning: {} folder branch(es) could not be listed; results are partial",
                    listing.failed_branches
                );
            }
            if listing.files.is_empty() {
                println!("no files found");
            }
            for file in &listing.files {
                println!("{}  [{}]", file.name, file.id);
            }
        }
        Commands::Read {
            paths,
            folder,
            deep,
            limit,
            archive,
            progress,
        } => {
            let progress = progress
                .unwrap_or_else(ProgressMode::default_for_tty)
                .reporter();
            let mut state = session::SessionState::new(&cfg);
            if let Some(id) = folder {
                state.select_folder_id(&id);
            }

            let report = if paths.is_empty() {
                let gateway = drive::DriveGateway::new(&cfg.drive)?;
                ingest::read_remote(&gateway, &mut state, &cfg, deep, limit, progress.as_ref())
                    .await?
            } else {
                // Local reads need the gateway only when archiving.
                let gateway = if archive {
                    Some(drive::DriveGateway::new(&cfg.drive)?)
                } else {
                    None
                };
                ingest::read_local(
                    &paths,
                    &mut state,
                    &cfg,
                    gateway.as_ref().map(|g| g as &dyn drive::StorageGateway),
                    progress.as_ref(),
                )
                .await?
            };
            ingest::print_report(&report);
        }
        Commands::Chat { folder, message } => {
            let progress = ProgressMode::default_for_tty().reporter();
            repl::run_chat(cfg, folder, message, progress).await?;
        }
    }

    Ok(())
}
