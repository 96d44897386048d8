use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "mora")]
#[command(about = "Mora CLI - ingestion, key management and scan tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = "mora.toml", env = "MORA_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the vector index from .txt and .md documents
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Index directory (defaults to retrieval.index_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Characters per chunk
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Characters shared between neighbouring chunks
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
    },

    /// Generate a base64 AES-256 payload key
    Keygen {
        /// Write the key to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encrypt a file with the payload key (IV-prefixed AES-256-CBC)
    Encrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base64 key (otherwise read from --key-env)
        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value = "ENCRYPTION_KEY")]
        key_env: String,
    },

    /// Decrypt a file produced by `encrypt` or the scan pipeline
    Decrypt {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Base64 key (otherwise read from --key-env)
        #[arg(long)]
        key: Option<String>,

        #[arg(long, default_value = "ENCRYPTION_KEY")]
        key_env: String,
    },

    /// Capture one image, encrypt it, store it and upload it
    Scan {
        /// Still image to use as the capture source
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Stored file name (default breast_scan_<timestamp>.png)
        #[arg(long)]
        filename: Option<String>,
    },

    /// Inspect stored chat history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List sessions with stored turns
    List,

    /// Print a session's most recent turns
    Show {
        /// Session key, `{user}_{session}` for user-scoped sessions
        session: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(path: &Path) -> Result<mora::Config> {
    if path.exists() {
        Ok(mora::Config::from_toml(&std::fs::read_to_string(path)?)?)
    } else {
        tracing::debug!("No config at {:?}, using defaults", path);
        Ok(mora::Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            inputs,
            output,
            chunk_size,
            chunk_overlap,
        } => {
            let config = load_config(&cli.config)?;
            commands::run_ingest(&config, inputs, output, chunk_size, chunk_overlap).await?;
        }
        Commands::Keygen { output } => {
            commands::run_keygen(output)?;
        }
        Commands::Encrypt {
            input,
            output,
            key,
            key_env,
        } => {
            let key = commands::keys::resolve_key(key.as_deref(), &key_env)?;
            let written = commands::run_encrypt(&input, output, &key)?;
            println!("Encrypted {:?} -> {:?}", input, written);
        }
        Commands::Decrypt {
            input,
            output,
            key,
            key_env,
        } => {
            let key = commands::keys::resolve_key(key.as_deref(), &key_env)?;
            let written = commands::run_decrypt(&input, output, &key)?;
            println!("Decrypted {:?} -> {:?}", input, written);
        }
        Commands::Scan { image, filename } => {
            let config = commands::scan::load_scan_config(&cli.config)?;
            commands::run_scan(config, image, filename).await?;
        }
        Commands::History { action } => {
            let config = load_config(&cli.config)?;
            match action {
                HistoryAction::List => commands::run_history_list(&config).await?,
                HistoryAction::Show {
                    session,
                    limit,
                    json,
                } => commands::run_history_show(&config, &session, limit, json).await?,
            }
        }
    }

    Ok(())
}
