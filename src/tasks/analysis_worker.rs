//! src/tasks/analysis_worker.rs
//!
//! Polling worker that claims finished sessions, runs the scorer on them,
//! and persists the outcome. Several workers may run against one store; the
//! conditional claim UPDATE in the session repository arbitrates, so losing
//! a claim race is an expected non-event here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::models::Session;
use crate::repositories::sqlite::{AnalysisResultRepo, ClaimOutcome, SessionRepo};
use crate::scorer::{ScoreError, Scorer};
use crate::utils::clock::Clock;
use crate::Error;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    /// Max sessions fetched per cycle.
    pub batch_size: i64,
    /// Claim attempts after which a session is excluded from polling.
    pub max_attempts: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 3,
        }
    }
}

#[derive(Clone)]
pub struct AnalysisWorker {
    sessions: Arc<dyn SessionRepo>,
    results: Arc<dyn AnalysisResultRepo>,
    scorer: Arc<dyn Scorer>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl AnalysisWorker {
    pub fn new(
        sessions: Arc<dyn SessionRepo>,
        results: Arc<dyn AnalysisResultRepo>,
        scorer: Arc<dyn Scorer>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            sessions,
            results,
            scorer,
            clock,
            config,
        }
    }

    /// Spawn the polling loop in a dedicated task. Returns a `JoinHandle<()>`
    /// so the caller can await the final cycle during shutdown.
    pub fn spawn(self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(shutdown_rx).await;
        })
    }

    /// Poll until the shutdown watch flips. A cycle already in flight always
    /// finishes before the loop exits, so a claimed session is never left
    /// with half its outcome written because of a clean shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            "analysis worker started: poll_interval={:?} batch_size={} max_attempts={}",
            self.config.poll_interval, self.config.batch_size, self.config.max_attempts
        );

        loop {
            tokio::select! {
                _ = sleep(self.config.poll_interval) => {
                    match self.run_cycle().await {
                        Ok(0) => {}
                        Ok(n) => debug!("analysis cycle processed {} session(s)", n),
                        // Store trouble fails the cycle only; the next tick
                        // retries from a fresh listing.
                        Err(e) => error!("analysis cycle aborted: {:?}", e),
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("analysis worker shutting down");
                        break;
                    }
                }
            }
        }

        info!("analysis worker stopped");
    }

    /// One poll pass: snapshot claimable sessions, then claim and score each.
    /// Returns how many sessions this worker claimed. Per-session trouble is
    /// recorded on the session row and does not stop the batch.
    pub async fn run_cycle(&self) -> Result<usize, Error> {
        let batch = self
            .sessions
            .get_pending_sessions(self.config.max_attempts, self.config.batch_size)
            .await?;

        let mut claimed = 0;
        for session in batch {
            match self.sessions.claim_for_analysis(&session.id, self.clock.now()).await {
                Ok(ClaimOutcome::Claimed) => {}
                Ok(ClaimOutcome::Conflict) => {
                    debug!("session {} already claimed by another worker, skipping", session.id);
                    continue;
                }
                Err(e) => {
                    error!("claim failed for session {}: {:?}", session.id, e);
                    continue;
                }
            }
            claimed += 1;

            if let Err(e) = self.analyze_claimed(&session).await {
                error!("failed to persist analysis outcome for session {}: {:?}", session.id, e);
            }
        }

        Ok(claimed)
    }

    /// Score one claimed session and persist the outcome. The claim is
    /// already committed, so no store lock is held across the scorer call.
    /// A crash in here leaves the row `in_progress` for the stale-claim
    /// sweeper; the result upsert is idempotent, so the replay after
    /// recovery is safe.
    async fn analyze_claimed(&self, session: &Session) -> Result<(), Error> {
        let scored = self
            .scorer
            .score(session.report_ref.as_deref(), session.audio_ref.as_deref())
            .await;

        match scored {
            Ok(report) => {
                self.results
                    .upsert(&session.id, &report, session.analysis_version, self.clock.now())
                    .await?;
                self.sessions.complete_analysis(&session.id).await?;
                info!(
                    "session {} analyzed: intent={} lead_score={:.2}",
                    session.id, report.intent_label, report.lead_score
                );
                Ok(())
            }
            Err(ScoreError::Transient(message)) => {
                warn!("scoring failed for session {} (retryable): {}", session.id, message);
                self.sessions.fail_analysis(&session.id, &message).await
            }
            Err(ScoreError::Terminal(message)) => {
                warn!("scoring failed for session {} (terminal): {}", session.id, message);
                self.sessions
                    .fail_analysis_terminal(&session.id, &message, self.config.max_attempts)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::db::Database;
    use crate::models::{AnalysisStatus, NewSession};
    use crate::repositories::sqlite::{
        SqliteAnalysisResultRepository, SqliteSessionRepository, SqliteUserRepository, UserRepo,
    };
    use crate::scorer::{MockScorer, ScoreReport};
    use crate::utils::clock::SystemClock;
    use crate::utils::ids;

    async fn setup_test_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    async fn seed_session(db: &Database, report_ref: Option<&str>) -> String {
        let now = Utc.with_ymd_and_hms(2026, 2, 17, 10, 0, 0).unwrap();
        let users = SqliteUserRepository::new(db.pool().clone());
        let user = users
            .upsert_by_email(&ids::new_id(), "caller@example.com", None, now)
            .await
            .unwrap();

        let sessions = SqliteSessionRepository::new(db.pool().clone());
        let session = sessions
            .create(
                &NewSession {
                    id: ids::new_id(),
                    user_id: user.id,
                    started_at: now,
                    ended_at: Some(now),
                    duration_sec: Some(120),
                    booking_made: false,
                    analysis_version: 1,
                    report_ref: report_ref.map(str::to_string),
                    audio_ref: None,
                },
                now,
            )
            .await
            .unwrap();
        session.id
    }

    fn worker(db: &Database, scorer: MockScorer) -> AnalysisWorker {
        AnalysisWorker::new(
            Arc::new(SqliteSessionRepository::new(db.pool().clone())),
            Arc::new(SqliteAnalysisResultRepository::new(db.pool().clone())),
            Arc::new(scorer),
            Arc::new(SystemClock),
            WorkerConfig::default(),
        )
    }

    #[tokio::test]
    async fn scorer_is_not_invoked_when_nothing_is_claimable() {
        let db = setup_test_db().await;

        let mut scorer = MockScorer::new();
        scorer.expect_score().times(0);

        let claimed = worker(&db, scorer).run_cycle().await.unwrap();
        assert_eq!(claimed, 0);
    }

    #[tokio::test]
    async fn scorer_receives_the_session_artifact_refs() {
        let db = setup_test_db().await;
        let session_id = seed_session(&db, Some("reports/demo/s1.json")).await;

        let mut scorer = MockScorer::new();
        scorer
            .expect_score()
            .withf(|report_ref, audio_ref| {
                *report_ref == Some("reports/demo/s1.json") && audio_ref.is_none()
            })
            .times(1)
            .returning(|_, _| {
                Ok(ScoreReport {
                    sentiment_score: 0.8,
                    engagement_score: 0.6,
                    lead_score: 0.7,
                    intent_label: "pricing".into(),
                    summary: None,
                })
            });

        let worker = worker(&db, scorer);
        assert_eq!(worker.run_cycle().await.unwrap(), 1);

        let sessions = SqliteSessionRepository::new(db.pool().clone());
        let session = sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(session.analysis_status, AnalysisStatus::Completed);
    }
}
