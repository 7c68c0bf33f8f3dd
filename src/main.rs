// src/main.rs

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use parlance::repositories::sqlite::{
    AnalysisResultRepo, SessionRepo, SqliteAnalysisResultRepository, SqliteSessionRepository,
};
use parlance::scorer::{HttpScorer, Scorer};
use parlance::tasks::{AnalysisWorker, StaleClaimSweeper, SweeperConfig, WorkerConfig};
use parlance::utils::clock::{Clock, SystemClock};
use parlance::Database;

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "parlance")]
#[command(author, version, about = "Parlance - voice-session analysis daemon")]
struct Args {
    /// Path to the SQLite DB (DATABASE_URL env overrides)
    #[arg(long, default_value = "data/parlance.db")]
    db_path: String,

    /// Scoring service endpoint (SCORER_URL env overrides)
    #[arg(long)]
    scorer_url: Option<String>,

    /// Seconds between analysis poll cycles
    #[arg(long, default_value_t = 5)]
    poll_interval_secs: u64,

    /// Max sessions fetched per poll cycle
    #[arg(long, default_value_t = 10)]
    batch_size: i64,

    /// Claim attempts before a session drops out of polling
    #[arg(long, default_value_t = 3)]
    max_attempts: i64,

    /// Number of concurrent analysis workers
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Seconds between stale-claim sweeps
    #[arg(long, default_value_t = 60)]
    sweep_interval_secs: u64,

    /// Seconds before an in-progress claim is presumed dead
    #[arg(long, default_value_t = 300)]
    stale_after_secs: i64,

    /// Seconds before a scorer request times out
    #[arg(long, default_value_t = 30)]
    scorer_timeout_secs: u64,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("parlance=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();

    let db_path = std::env::var("DATABASE_URL").unwrap_or_else(|_| args.db_path.clone());
    let scorer_url = std::env::var("SCORER_URL")
        .ok()
        .or_else(|| args.scorer_url.clone());
    let Some(scorer_url) = scorer_url else {
        anyhow::bail!("no scoring endpoint configured; pass --scorer-url or set SCORER_URL");
    };

    info!(
        "Parlance starting. db={}, workers={}, scorer={}",
        db_path, args.workers, scorer_url
    );

    let db = Database::new(&db_path).await?;
    db.migrate().await?;

    let sessions: Arc<dyn SessionRepo> =
        Arc::new(SqliteSessionRepository::new(db.pool().clone()));
    let results: Arc<dyn AnalysisResultRepo> =
        Arc::new(SqliteAnalysisResultRepository::new(db.pool().clone()));
    let scorer: Arc<dyn Scorer> = Arc::new(HttpScorer::new(
        scorer_url,
        Duration::from_secs(args.scorer_timeout_secs),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_config = WorkerConfig {
        poll_interval: Duration::from_secs(args.poll_interval_secs),
        batch_size: args.batch_size,
        max_attempts: args.max_attempts,
    };

    let mut handles = Vec::new();
    for _ in 0..args.workers.max(1) {
        let worker = AnalysisWorker::new(
            sessions.clone(),
            results.clone(),
            scorer.clone(),
            clock.clone(),
            worker_config.clone(),
        );
        handles.push(worker.spawn(shutdown_rx.clone()));
    }

    let sweeper = StaleClaimSweeper::new(
        sessions.clone(),
        clock.clone(),
        SweeperConfig {
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            stale_after: chrono::Duration::seconds(args.stale_after_secs),
        },
    );
    handles.push(sweeper.spawn(shutdown_rx.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C detected, shutting down...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        if let Err(e) = handle.await {
            error!("background task join error: {:?}", e);
        }
    }

    info!("Parlance finished gracefully. Goodbye!");
    Ok(())
}
