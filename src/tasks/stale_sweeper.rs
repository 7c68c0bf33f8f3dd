//! src/tasks/stale_sweeper.rs
//!
//! Recovers sessions stranded `in_progress` by a worker that died between
//! claiming and writing an outcome. Anything claimed before the staleness
//! cutoff goes back to `pending` with its attempt count intact, so a session
//! that keeps killing workers still runs out of attempts eventually.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::repositories::sqlite::SessionRepo;
use crate::utils::clock::Clock;
use crate::Error;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub sweep_interval: Duration,
    /// How long a claim may sit before it is presumed dead.
    pub stale_after: chrono::Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            stale_after: chrono::Duration::seconds(300),
        }
    }
}

#[derive(Clone)]
pub struct StaleClaimSweeper {
    sessions: Arc<dyn SessionRepo>,
    clock: Arc<dyn Clock>,
    config: SweeperConfig,
}

impl StaleClaimSweeper {
    pub fn new(sessions: Arc<dyn SessionRepo>, clock: Arc<dyn Clock>, config: SweeperConfig) -> Self {
        Self {
            sessions,
            clock,
            config,
        }
    }

    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        })
    }

    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "stale-claim sweeper started: sweep_interval={:?} stale_after={}s",
            self.config.sweep_interval,
            self.config.stale_after.num_seconds()
        );

        loop {
            tokio::select! {
                _ = sleep(self.config.sweep_interval) => {
                    if let Err(e) = self.sweep_once().await {
                        error!("stale-claim sweep failed: {:?}", e);
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("stale-claim sweeper shutting down");
                        break;
                    }
                }
            }
        }

        info!("stale-claim sweeper stopped");
    }

    /// One sweep pass. Returns how many sessions were requeued.
    pub async fn sweep_once(&self) -> Result<u64, Error> {
        let cutoff = self.clock.now() - self.config.stale_after;
        let recovered = self.sessions.sweep_stale_claims(cutoff).await?;
        if recovered > 0 {
            info!("requeued {} stale analysis claim(s)", recovered);
        } else {
            debug!("no stale analysis claims found");
        }
        Ok(recovered)
    }
}
