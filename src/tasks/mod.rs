// Background loops that run against the session store.

pub mod analysis_worker;
pub mod stale_sweeper;

pub use analysis_worker::{AnalysisWorker, WorkerConfig};
pub use stale_sweeper::{StaleClaimSweeper, SweeperConfig};
