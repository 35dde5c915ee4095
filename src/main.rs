//! # ragserve daemon (`ragd`)
//!
//! The `ragd` binary runs the question-answering service. Configuration
//! comes from the environment (a `.env` file is honored).
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragd init` | Create the SQLite database and run schema migrations |
//! | `ragd ingest` | Rebuild the vector collection from the data directory |
//! | `ragd serve` | Run the HTTP gateway, worker pool, and document watcher |
//! | `ragd worker` | Run only the worker pool (scale-out process) |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! ragd init
//!
//! # Index ./data (or $DATA_DIR)
//! ragd ingest
//!
//! # Serve everything in one process
//! ragd serve
//!
//! # Extra worker capacity against the same database
//! WORKERS=8 ragd worker
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;

use ragserve::config::Config;
use ragserve::context::AppContext;
use ragserve::{db, ingest, migrate, server, watcher, worker};

#[derive(Parser)]
#[command(
    name = "ragd",
    about = "ragserve — retrieval-augmented question answering over your documents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables (chunks, collections,
    /// tasks, sessions). Idempotent; safe to re-run.
    Init,

    /// Rebuild the vector collection from the data directory.
    ///
    /// Scans `$DATA_DIR`, extracts and chunks every document, embeds the
    /// chunks, and atomically replaces the collection.
    Ingest,

    /// Run the full service: HTTP gateway, worker pool, and (unless
    /// disabled) the document watcher.
    Serve,

    /// Run only the worker pool.
    ///
    /// Useful for scaling answer throughput separately from the gateway;
    /// all processes share one database.
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config.db.path).await?;
            migrate::run_migrations(&pool).await?;
            println!("Database initialized at {}", config.db.path.display());
        }
        Commands::Ingest => {
            let ctx = AppContext::init(config).await?;
            let report = ingest::reingest(&ctx).await?;
            println!(
                "Ingested {} files into {} chunks ({} skipped)",
                report.files, report.chunks, report.skipped
            );
        }
        Commands::Serve => {
            let ctx = AppContext::init(config).await?;
            worker::run_workers(ctx.clone(), ctx.config.queue.workers);

            if ctx.config.watch.enabled {
                let watch_ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = watcher::watch_and_reingest(watch_ctx).await {
                        warn!("document watcher stopped: {e:#}");
                    }
                });
            }

            server::run_server(ctx).await?;
        }
        Commands::Worker => {
            let ctx = AppContext::init(config).await?;
            let handles = worker::run_workers(ctx.clone(), ctx.config.queue.workers);
            for handle in handles {
                handle.await?;
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
