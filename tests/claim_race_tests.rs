// tests/claim_race_tests.rs
//
// The claim protocol is only honest under real connection-level concurrency,
// so these tests run against a tempfile-backed WAL database instead of the
// single-connection :memory: pool.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use parlance::models::{AnalysisStatus, NewSession};
use parlance::repositories::sqlite::{
    ClaimOutcome, SessionRepo, SqliteSessionRepository, SqliteUserRepository, UserRepo,
};
use parlance::utils::ids;
use parlance::Database;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 17, 9, 0, 0).unwrap()
}

async fn setup_file_db(dir: &TempDir) -> Database {
    let path = dir.path().join("race.db");
    let db = Database::new(path.to_str().unwrap()).await.unwrap();
    db.migrate().await.unwrap();
    db
}

async fn seed_contested_session(db: &Database, session_id: &str) {
    let users = SqliteUserRepository::new(db.pool().clone());
    let user = users
        .upsert_by_email(&ids::new_id(), "racer@acme.com", None, t0())
        .await
        .unwrap();

    let sessions = SqliteSessionRepository::new(db.pool().clone());
    sessions
        .create(
            &NewSession {
                id: session_id.to_string(),
                user_id: user.id,
                started_at: t0(),
                ended_at: Some(t0() + chrono::Duration::seconds(60)),
                duration_sec: Some(60),
                booking_made: false,
                analysis_version: 1,
                report_ref: None,
                audio_ref: None,
            },
            t0(),
        )
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_one_of_many_claimants_wins() {
    let dir = TempDir::new().unwrap();
    let db = setup_file_db(&dir).await;
    seed_contested_session(&db, "contested").await;

    let sessions = Arc::new(SqliteSessionRepository::new(db.pool().clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = sessions.clone();
        let claim_at = t0() + chrono::Duration::seconds(1 + i);
        handles.push(tokio::spawn(async move {
            repo.claim_for_analysis("contested", claim_at).await.unwrap()
        }));
    }

    let mut wins = 0;
    let mut losses = 0;
    for handle in handles {
        match handle.await.unwrap() {
            ClaimOutcome::Claimed => wins += 1,
            ClaimOutcome::Conflict => losses += 1,
        }
    }

    assert_eq!(wins, 1, "exactly one claimant may win");
    assert_eq!(losses, 7);

    let session = sessions.get("contested").await.unwrap().expect("session");
    assert_eq!(session.analysis_status, AnalysisStatus::InProgress);
    assert_eq!(session.analysis_attempts, 1, "losing claims must not spend attempts");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finished_sessions_cannot_be_reclaimed() {
    let dir = TempDir::new().unwrap();
    let db = setup_file_db(&dir).await;
    seed_contested_session(&db, "finished").await;

    let sessions = SqliteSessionRepository::new(db.pool().clone());

    assert_eq!(
        sessions.claim_for_analysis("finished", t0()).await.unwrap(),
        ClaimOutcome::Claimed
    );
    sessions.complete_analysis("finished").await.unwrap();

    // Completed rows fail the status guard the same way a concurrent claim
    // does.
    assert_eq!(
        sessions
            .claim_for_analysis("finished", t0() + chrono::Duration::seconds(10))
            .await
            .unwrap(),
        ClaimOutcome::Conflict
    );

    let session = sessions.get("finished").await.unwrap().expect("session");
    assert_eq!(session.analysis_status, AnalysisStatus::Completed);
    assert_eq!(session.analysis_attempts, 1);
}
