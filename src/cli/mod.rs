use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub mod archive;
pub mod config;
pub mod docs;
pub mod init;
pub mod version;

use config::{default_config_path, LoggingConfig, SpqfConfig};

#[derive(Parser)]
#[command(name = "spqf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Operator CLI for SPQF channel governance", long_about = None)]
pub struct Cli {
    /// Path to config file (default: <config dir>/spqf/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Database directory (overrides storage.db_dir from the config file)
    #[arg(long, global = true)]
    pub db_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default config file and create the database directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Show or edit a config document: config <doc> [key] [= [value]]
    Config {
        /// Document name (channel or account)
        doc: String,

        /// Optional key, "=" and value
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Seed missing vote defaults into a document
    Defaults {
        /// Document name (channel or account)
        doc: String,
    },

    /// List archived votes, or show one in full
    Archive {
        /// Vote id
        id: Option<u64>,
    },

    /// List pending deadlines
    Pending,

    /// Display version information
    Version,
}

/// Install the global tracing subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| format!("Invalid log level '{}': {}", logging.level, e))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| format!("Failed to initialize logging: {}", e).into())
}

fn db_dir(cli_dir: Option<&str>, config: &SpqfConfig) -> PathBuf {
    cli_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.db_dir.clone())
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::Version => {
            version::execute();
            return Ok(());
        }
        Commands::Init { force } => {
            let config_path = cli
                .config
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(default_config_path);
            let db_dir = db_dir(cli.db_dir.as_deref(), &SpqfConfig::default());
            return init::execute(&config_path, &db_dir, *force);
        }
        _ => {}
    }

    let config = SpqfConfig::load_or_default(cli.config.as_deref().map(Path::new))?;
    init_tracing(&config.logging)?;
    let db_dir = db_dir(cli.db_dir.as_deref(), &config);
    tracing::debug!(db_dir = %db_dir.display(), "using database directory");

    match cli.command {
        Commands::Config { doc, args } => docs::execute_config(&db_dir, doc, args).await,
        Commands::Defaults { doc } => docs::execute_defaults(&db_dir, doc).await,
        Commands::Archive { id } => archive::execute_archive(&db_dir, id).await,
        Commands::Pending => archive::execute_pending(&db_dir).await,
        Commands::Init { .. } | Commands::Version => Ok(()),
    }
}
