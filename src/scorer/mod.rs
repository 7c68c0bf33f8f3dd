//! src/scorer/mod.rs
//!
//! Boundary to the external scoring service. The worker hands over the
//! session's artifact references and gets back scores, an intent label, and a
//! summary; how those are computed is entirely the scorer's business.
//!
//! The trait-based design lets tests substitute a mock or scripted scorer
//! without any network access.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Scoring output for one session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ScoreReport {
    pub sentiment_score: f64,
    pub engagement_score: f64,
    pub lead_score: f64,
    pub intent_label: String,
    pub summary: Option<String>,
}

/// Scoring failures split by whether a later attempt could succeed.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// Network trouble, timeouts, scorer overload. Worth retrying.
    #[error("transient scoring failure: {0}")]
    Transient(String),

    /// The input itself is unusable; retrying cannot help.
    #[error("terminal scoring failure: {0}")]
    Terminal(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Score a finished session from its artifact references. Both refs are
    /// opaque locators into external object storage and are forwarded as-is.
    async fn score<'a>(
        &self,
        report_ref: Option<&'a str>,
        audio_ref: Option<&'a str>,
    ) -> Result<ScoreReport, ScoreError>;
}

/// Default scorer: POSTs the artifact references to a configured HTTP
/// endpoint and expects a `ScoreReport` JSON body back.
#[derive(Clone)]
pub struct HttpScorer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpScorer {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl Scorer for HttpScorer {
    async fn score<'a>(
        &self,
        report_ref: Option<&'a str>,
        audio_ref: Option<&'a str>,
    ) -> Result<ScoreReport, ScoreError> {
        let body = serde_json::json!({
            "report_ref": report_ref,
            "audio_ref": audio_ref,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoreError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ScoreError::Transient(format!("scorer returned {}", status)));
        }
        if !status.is_success() {
            // 4xx means the scorer understood us and said no; retrying the
            // same payload will not change its mind.
            return Err(ScoreError::Terminal(format!("scorer rejected request: {}", status)));
        }

        response
            .json::<ScoreReport>()
            .await
            .map_err(|e| ScoreError::Terminal(format!("malformed scorer response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_report_deserializes_from_scorer_payload() {
        let payload = r#"{
            "sentiment_score": 0.72,
            "engagement_score": 0.55,
            "lead_score": 0.9,
            "intent_label": "pricing",
            "summary": "Asked about enterprise pricing."
        }"#;
        let report: ScoreReport = serde_json::from_str(payload).unwrap();
        assert_eq!(report.intent_label, "pricing");
        assert_eq!(report.lead_score, 0.9);

        // summary is optional on the wire
        let bare = r#"{
            "sentiment_score": 0.1,
            "engagement_score": 0.2,
            "lead_score": 0.3,
            "intent_label": "other"
        }"#;
        let report: ScoreReport = serde_json::from_str(bare).unwrap();
        assert_eq!(report.summary, None);
    }
}
