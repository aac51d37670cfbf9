//! cryptstore CLI
//!
//! Usage:
//!   cryptstore --config storage.json put <key> [--file <path>]
//!   cryptstore --config storage.json get <key>
//!   cryptstore --config storage.json rm <key>
//!   cryptstore --config storage.json ls [prefix] [--recursive]
//!   cryptstore --config storage.json stat <key>
//!   cryptstore keygen

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use cryptstore::{EncryptedStorage, Registry, Storage, StorageConfig};
use cryptstore_keys::age::AgeKey;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cryptstore")]
#[command(author, version, about = "Encrypted key/value storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt and store a value read from a file or stdin
    Put {
        key: String,
        /// Read the value from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Load, verify and print a value
    Get { key: String },

    /// Delete a value
    Rm { key: String },

    /// List keys under a prefix
    Ls {
        #[arg(default_value = "")]
        prefix: String,
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show size and modification time of a key
    Stat { key: String },

    /// Generate a local age identity
    Keygen,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::Keygen = cli.command {
        keygen();
        return Ok(());
    }

    let Some(path) = cli.config.as_ref() else {
        bail!("--config is required for {}", command_name(&cli.command));
    };
    let config = StorageConfig::from_file(path)
        .await
        .with_context(|| format!("loading {}", path.display()))?;
    let storage = EncryptedStorage::provision(&config, &Registry::with_defaults())
        .await
        .context("provisioning storage")?;

    let result = run(&storage, cli.command).await;
    storage.cleanup().await.context("closing providers")?;
    result
}

async fn run(storage: &EncryptedStorage, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Put { key, file } => {
            let value = match file {
                Some(path) => tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    tokio::io::stdin().read_to_end(&mut buf).await?;
                    buf
                }
            };
            debug!(key = %key, bytes = value.len(), "put");
            storage.store(&key, &value).await?;
        }

        Commands::Get { key } => {
            let value = storage.load(&key).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&value).await?;
            stdout.flush().await?;
        }

        Commands::Rm { key } => storage.delete(&key).await?,

        Commands::Ls { prefix, recursive } => {
            for key in storage.list(&prefix, recursive).await? {
                println!("{key}");
            }
        }

        Commands::Stat { key } => {
            let info = storage.stat(&key).await?;
            println!("key:      {}", info.key);
            println!("size:     {}", info.size);
            println!("modified: {}", info.modified.to_rfc3339());
            println!("terminal: {}", info.is_terminal);
        }

        Commands::Keygen => keygen(),
    }
    Ok(())
}

fn keygen() {
    let (recipient, identity) = AgeKey::generate();
    println!("# recipient: {recipient}");
    println!("{identity}");
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Put { .. } => "put",
        Commands::Get { .. } => "get",
        Commands::Rm { .. } => "rm",
        Commands::Ls { .. } => "ls",
        Commands::Stat { .. } => "stat",
        Commands::Keygen => "keygen",
    }
}
