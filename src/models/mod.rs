use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A visitor or contact, matched across sessions by `visitor_id` (falling
/// back to `email`). Counter columns are maintained incrementally by the
/// repository insert paths, never recomputed.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub visitor_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub total_sessions: i64,
    pub total_bookings: i64,
}

/// Long-term profile memory for a user (high-signal fields only).
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct UserProfile {
    pub user_id: String,
    pub company: Option<String>,
    pub domain: Option<String>,
    pub last_intent_type: Option<String>,
    pub booked_before: bool,
    pub last_visit_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum AnalysisStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "pending"),
            AnalysisStatus::InProgress => write!(f, "in_progress"),
            AnalysisStatus::Completed => write!(f, "completed"),
            AnalysisStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AnalysisStatus::Pending),
            "in_progress" => Ok(AnalysisStatus::InProgress),
            "completed" => Ok(AnalysisStatus::Completed),
            "failed" => Ok(AnalysisStatus::Failed),
            _ => Err(format!("Unknown analysis status: {}", s)),
        }
    }
}

/// One finished voice conversation, inserted at session end and analyzed
/// asynchronously by the worker pool.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i64>,
    pub booking_made: bool,
    pub analysis_status: AnalysisStatus,
    pub analysis_version: i64,
    pub report_ref: Option<String>,
    pub audio_ref: Option<String>,
    pub analysis_attempts: i64,
    pub last_analysis_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a session row. Status and attempt bookkeeping start at
/// their defaults (`pending`, 0).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i64>,
    pub booking_made: bool,
    pub analysis_version: i64,
    pub report_ref: Option<String>,
    pub audio_ref: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct Booking {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub timezone: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewBooking {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub timezone: Option<String>,
}

/// Scoring output for a session; exactly one row per session_id, overwritten
/// in place on re-analysis.
#[derive(Debug, Serialize, Deserialize, Clone, FromRow)]
pub struct AnalysisResult {
    pub id: String,
    pub session_id: String,
    pub sentiment_score: f64,
    pub engagement_score: f64,
    pub lead_score: f64,
    pub intent_label: String,
    pub summary: Option<String>,
    pub analysis_version: i64,
    pub created_at: DateTime<Utc>,
}
