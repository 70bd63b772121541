mod cmd_log;
mod cmd_serve;
mod cmd_status;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ingrid::{Config, LocalCache, MemoryStore, Stores};
use ingrid_couch::CouchStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingrid")]
#[command(about = "Undo/redo history and backups for the Ingrid editor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    session: SessionArgs,

    /// Log at debug level (otherwise RUST_LOG, default info)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Document store server address
    #[arg(long, global = true, env = "INGRID_STORE_URL", default_value = ingrid::config::DEFAULT_STORE_URL)]
    store_url: String,

    /// Database holding history entries
    #[arg(long, global = true, env = "INGRID_HISTORY_DB", default_value = ingrid::config::DEFAULT_HISTORY_DB)]
    history_db: String,

    /// Database holding full-state backups
    #[arg(long, global = true, env = "INGRID_BACKUP_DB", default_value = ingrid::config::DEFAULT_BACKUP_DB)]
    backup_db: String,

    /// Local cache directory (default: platform cache dir, or a scratch
    /// directory with --memory)
    #[arg(long, global = true, env = "INGRID_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Keep documents in process memory instead of the store server
    #[arg(long, global = true, env = "INGRID_MEMORY")]
    memory: bool,

    /// Quiet period before a cached snapshot is backed up
    #[arg(long, global = true, env = "INGRID_BACKUP_DEBOUNCE_MS", default_value_t = 5000)]
    backup_debounce_ms: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bridge editor messages: JSON envelopes in on stdin, out on stdout
    Serve,
    /// Show the status of both document stores
    Status {
        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Show history entries from the current position back to the root
    Log {
        /// Maximum number of entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl SessionArgs {
    /// Resolves the flags into a [`Config`].
    ///
    /// With `--memory` and no cache directory, the cache goes to a scratch
    /// directory that lives as long as the returned guard.
    fn config(&self) -> Result<(Config, Option<TempDir>)> {
        let config = Config::new()
            .with_store_url(&self.store_url)
            .with_history_db(&self.history_db)
            .with_backup_db(&self.backup_db)
            .with_backup_debounce(Duration::from_millis(self.backup_debounce_ms));
        match (&self.cache_dir, self.memory) {
            (Some(dir), _) => Ok((config.with_cache_dir(dir), None)),
            (None, true) => {
                let scratch = TempDir::new().context("failed to create scratch cache directory")?;
                let config = config.with_cache_dir(scratch.path());
                Ok((config, Some(scratch)))
            }
            (None, false) => Ok((config, None)),
        }
    }

    /// Opens both stores. With `provision`, missing databases are created.
    async fn stores(&self, config: &Config, provision: bool) -> Result<Stores> {
        if self.memory {
            // In-memory history starts empty, so a path cached by an earlier
            // run would point at entries that no longer exist.
            let cache = LocalCache::open(config.cache_dir()?).context("failed to open local cache")?;
            cache
                .forget_history()
                .context("failed to reset cached history path")?;
            return Ok(Stores {
                history: Arc::new(MemoryStore::new(config.history_db())),
                backup: Arc::new(MemoryStore::new(config.backup_db())),
            });
        }

        let history = CouchStore::new(config.store_url(), config.history_db())
            .context("failed to configure history store")?;
        let backup = CouchStore::new(config.store_url(), config.backup_db())
            .context("failed to configure backup store")?;
        if provision {
            for store in [&history, &backup] {
                // An unreachable server is reported later by the store checks.
                if let Err(e) = store.ensure_database().await {
                    warn!(db = store.db_name(), error = %e, "could not ensure database exists");
                }
            }
        }
        Ok(Stores {
            history: Arc::new(history),
            backup: Arc::new(backup),
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let provision = matches!(cli.command, Commands::Serve);
    let (config, _scratch) = cli.session.config()?;
    let stores = cli.session.stores(&config, provision).await?;

    match cli.command {
        Commands::Serve => cmd_serve::run(config, stores).await,
        Commands::Status { pretty } => cmd_status::run(stores, pretty).await,
        Commands::Log { limit, json } => cmd_log::run(&config, stores, limit, json).await,
    }
}
