// src/repositories/sqlite/analysis_result.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::error::constraint_err;
use crate::models::AnalysisResult;
use crate::scorer::ScoreReport;
use crate::utils::ids;
use crate::Error;

#[async_trait]
pub trait AnalysisResultRepo: Send + Sync {
    /// Insert the scoring output for a session, or overwrite every scored
    /// field (and the version) in place when a row already exists. The unique
    /// index on `session_id` guarantees exactly one row per session.
    async fn upsert(
        &self,
        session_id: &str,
        report: &ScoreReport,
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, Error>;

    async fn get_by_session(&self, session_id: &str) -> Result<Option<AnalysisResult>, Error>;
}

#[derive(Clone)]
pub struct SqliteAnalysisResultRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAnalysisResultRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisResultRepo for SqliteAnalysisResultRepository {
    async fn upsert(
        &self,
        session_id: &str,
        report: &ScoreReport,
        version: i64,
        now: DateTime<Utc>,
    ) -> Result<AnalysisResult, Error> {
        let result = sqlx::query_as::<_, AnalysisResult>(
            r#"
            INSERT INTO analysis_results (
                id, session_id, sentiment_score, engagement_score, lead_score,
                intent_label, summary, analysis_version, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                sentiment_score = excluded.sentiment_score,
                engagement_score = excluded.engagement_score,
                lead_score = excluded.lead_score,
                intent_label = excluded.intent_label,
                summary = excluded.summary,
                analysis_version = excluded.analysis_version
            RETURNING id, session_id, sentiment_score, engagement_score, lead_score,
                      intent_label, summary, analysis_version, created_at
            "#,
        )
        .bind(ids::new_id())
        .bind(session_id)
        .bind(report.sentiment_score)
        .bind(report.engagement_score)
        .bind(report.lead_score)
        .bind(&report.intent_label)
        .bind(&report.summary)
        .bind(version)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(constraint_err)?;

        Ok(result)
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<AnalysisResult>, Error> {
        let result = sqlx::query_as::<_, AnalysisResult>(
            r#"
            SELECT id, session_id, sentiment_score, engagement_score, lead_score,
                   intent_label, summary, analysis_version, created_at
            FROM analysis_results
            WHERE session_id = ?
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }
}
