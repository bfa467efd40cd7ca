use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use issue_tracker::db::SqliteStore;
use issue_tracker::server;
use issue_tracker::store::StoreHandle;

const IN_MEMORY: &str = ":memory:";

/// Per-project issue tracking over HTTP.
///
/// Serves `/api/issues/{project}` with GET (list, query parameters filter),
/// POST (create), PUT (update) and DELETE (delete).
#[derive(Parser)]
#[command(name = "issue-tracker")]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// SQLite database file, or `:memory:` for a throwaway store
    #[arg(long, env = "ISSUE_TRACKER_DB", default_value = "issue-tracker.sqlite")]
    db: PathBuf,
}

fn open_store(db: &Path) -> Result<SqliteStore, issue_tracker::error::StoreError> {
    if db.as_os_str() == IN_MEMORY {
        SqliteStore::open_in_memory()
    } else {
        SqliteStore::open(db)
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = match open_store(&cli.db) {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(db = %cli.db.display(), %err, "cannot open store");
            process::exit(1);
        }
    };
    tracing::info!(db = %cli.db.display(), "store opened");

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(%err, "failed to create tokio runtime");
            process::exit(1);
        }
    };

    let addr = SocketAddr::new(cli.host, cli.port);
    if let Err(err) = rt.block_on(server::start(addr, StoreHandle::new(store))) {
        tracing::error!(%addr, %err, "server error");
        process::exit(1);
    }
}
