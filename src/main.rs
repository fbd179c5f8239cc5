//! # EasyResearch CLI (`er`)
//!
//! ## Usage
//!
//! ```bash
//! er --config ./config/er.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `er init` | Create the SQLite database and schema |
//! | `er ingest <workspace> <paths>...` | Index files and directories |
//! | `er ask <workspace> "<question>"` | Answer a question from the workspace |
//! | `er workspaces` | List workspaces |
//! | `er stats <workspace>` | Chunk, file, and size counters |
//! | `er remove <workspace> <filename>` | Remove one file's chunks |
//! | `er drop <workspace>` | Delete a workspace |
//! | `er summarize <workspace>` | Overview of the workspace |
//!
//! ## Examples
//!
//! ```bash
//! er init
//! er ingest policies ./docs/refunds.pdf ./docs/faq
//! er ask policies "What is the refund window?"
//! er ask policies "And for international orders?" --history chat.json
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use easy_research::commands::{self, AskArgs};
use easy_research::config;

/// EasyResearch: ask questions about your documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Credentials can be placed in a `.env` file.
#[derive(Parser)]
#[command(name = "er", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/er.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Index files or directories into a workspace.
    ///
    /// Directories are walked recursively. Re-ingesting a file replaces its
    /// chunks. Files that fail are reported and skipped.
    Ingest {
        workspace: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a question against a workspace.
    Ask {
        workspace: String,
        question: String,

        /// JSON file with prior turns: `[{"role": "user", "content": "..."}, ...]`.
        #[arg(long)]
        history: Option<PathBuf>,

        /// Number of passages to answer from.
        #[arg(long)]
        k: Option<usize>,

        /// API key for the generation provider. Overrides the environment.
        #[arg(long)]
        api_key: Option<String>,

        /// Recall strategy: `standard` or `hypothetical`.
        #[arg(long)]
        strategy: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List workspaces.
    Workspaces,

    /// Show workspace statistics.
    Stats { workspace: String },

    /// Remove one file from a workspace.
    Remove { workspace: String, filename: String },

    /// Delete a workspace and all of its chunks.
    Drop { workspace: String },

    /// Summarize a workspace: main topic, objectives, audience.
    Summarize {
        workspace: String,

        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Ingest { workspace, paths } => {
            commands::run_ingest(&cfg, &workspace, &paths).await?;
        }
        Commands::Ask {
            workspace,
            question,
            history,
            k,
            api_key,
            strategy,
            json,
        } => {
            commands::run_ask(
                &cfg,
                AskArgs {
                    workspace: &workspace,
                    question: &question,
                    history: history.as_deref(),
                    k,
                    api_key,
                    strategy: strategy.as_deref(),
                    json,
                },
            )
            .await?;
        }
        Commands::Workspaces => commands::run_workspaces(&cfg).await?,
        Commands::Stats { workspace } => commands::run_stats(&cfg, &workspace).await?,
        Commands::Remove {
            workspace,
            filename,
        } => commands::run_remove(&cfg, &workspace, &filename).await?,
        Commands::Drop { workspace } => commands::run_drop(&cfg, &workspace).await?,
        Commands::Summarize { workspace, api_key } => {
            commands::run_summarize(&cfg, &workspace, api_key.as_deref()).await?;
        }
    }

    Ok(())
}
