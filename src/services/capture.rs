//! src/services/capture.rs
//!
//! Session-end ingestion: resolve the caller to a user row, refresh the
//! long-term profile, record the session, and record the booking if one was
//! made. Each repository call commits on its own and carries its own
//! aggregate updates, so a partial failure here never double-counts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{NewBooking, NewSession};
use crate::repositories::sqlite::{BookingRepo, SessionRepo, UserProfileRepo, UserRepo};
use crate::utils::clock::Clock;
use crate::utils::ids;
use crate::Error;

/// Everything the conversation layer hands over when a session ends.
/// `participant_identity` is whatever the front end registered the caller
/// under: a visitor uuid when the widget is wired correctly, sometimes an
/// email, sometimes free text.
#[derive(Debug, Clone)]
pub struct SessionCapture {
    pub session_id: String,
    pub participant_identity: Option<String>,
    /// Name collected during the conversation; beats identity heuristics.
    pub name: Option<String>,
    /// Email collected during the conversation; beats identity heuristics.
    pub email: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_sec: Option<i64>,
    pub report_ref: Option<String>,
    pub audio_ref: Option<String>,
    pub booking_made: bool,
    pub booking: Option<BookingRequest>,
    pub intent_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub scheduled_time: DateTime<Utc>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub user_id: String,
    pub session_id: String,
}

pub struct SessionCaptureService {
    users: Arc<dyn UserRepo>,
    profiles: Arc<dyn UserProfileRepo>,
    sessions: Arc<dyn SessionRepo>,
    bookings: Arc<dyn BookingRepo>,
    clock: Arc<dyn Clock>,
}

impl SessionCaptureService {
    pub fn new(
        users: Arc<dyn UserRepo>,
        profiles: Arc<dyn UserProfileRepo>,
        sessions: Arc<dyn SessionRepo>,
        bookings: Arc<dyn BookingRepo>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            profiles,
            sessions,
            bookings,
            clock,
        }
    }

    /// Ingest one finished session. The session row lands `pending` and is
    /// picked up by the analysis worker later; nothing here waits on scoring.
    pub async fn capture(&self, capture: SessionCapture) -> Result<CaptureOutcome, Error> {
        let now = self.clock.now();

        let mut email: Option<String> = None;
        let mut visitor_id: Option<String> = None;

        if let Some(identity) = capture.participant_identity.as_deref() {
            if identity_looks_like_email(identity) {
                email = Some(identity.trim().to_string());
            } else if let Some((normalized, hashed)) = normalize_visitor_id(identity) {
                if hashed {
                    warn!(
                        "participant identity not uuid/hex, hashed to visitor_id: identity={:?}",
                        identity
                    );
                }
                visitor_id = Some(normalized);
            }
        }

        // Values collected during the conversation beat identity heuristics.
        let name = capture.name.clone();
        if capture.email.is_some() {
            email = capture.email.clone();
        }

        // The upsert may return an existing row, so this id is a candidate
        // only; `user.id` is authoritative from here on.
        let candidate_id = ids::new_id();
        let user = match visitor_id.as_deref() {
            Some(vid) => {
                self.users
                    .upsert_by_visitor_id(&candidate_id, vid, email.as_deref(), name.as_deref(), now)
                    .await?
            }
            None => {
                // No usable identity at all still gets a stable per-session
                // address, so the session row always has an owner.
                let email = email
                    .unwrap_or_else(|| format!("anon-{}@session.local", capture.session_id));
                self.users
                    .upsert_by_email(&candidate_id, &email, name.as_deref(), now)
                    .await?
            }
        };

        self.profiles
            .upsert(
                &user.id,
                None,
                None,
                capture.intent_type.as_deref(),
                if capture.booking_made { Some(true) } else { None },
                now,
            )
            .await?;

        let ended_at = capture.ended_at.or_else(|| {
            capture
                .duration_sec
                .map(|secs| capture.started_at + chrono::Duration::seconds(secs))
        });

        let session = self
            .sessions
            .create(
                &NewSession {
                    id: capture.session_id.clone(),
                    user_id: user.id.clone(),
                    started_at: capture.started_at,
                    ended_at,
                    duration_sec: capture.duration_sec,
                    booking_made: capture.booking_made,
                    analysis_version: 1,
                    report_ref: capture.report_ref.clone(),
                    audio_ref: capture.audio_ref.clone(),
                },
                now,
            )
            .await?;

        if capture.booking_made {
            if let Some(request) = capture.booking {
                let booking = NewBooking {
                    id: ids::new_id(),
                    session_id: session.id.clone(),
                    user_id: user.id.clone(),
                    scheduled_time: request.scheduled_time,
                    timezone: request.timezone,
                };
                // A lost booking row must not lose the session itself.
                if let Err(e) = self.bookings.insert(&booking, now).await {
                    warn!("failed to insert booking row for session {}: {:?}", session.id, e);
                }
            }
        }

        info!(
            "session captured: session_id={} user_id={} visitor_id={:?}",
            session.id, user.id, user.visitor_id
        );

        Ok(CaptureOutcome {
            user_id: user.id,
            session_id: session.id,
        })
    }
}

/// local@domain.tld shape, nothing fancier.
fn identity_looks_like_email(identity: &str) -> bool {
    let trimmed = identity.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.contains('@') => {
            match domain.rsplit_once('.') {
                Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
                None => false,
            }
        }
        _ => false,
    }
}

/// Normalize a participant identity into a stable 32-char lowercase hex
/// visitor id. Uuid-shaped identities (hyphenated or bare hex) map to their
/// simple form; anything else falls back to a sha256 prefix, which is still
/// stable but flags a front-end mismatch to the caller.
fn normalize_visitor_id(identity: &str) -> Option<(String, bool)> {
    let trimmed = identity.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = Uuid::parse_str(trimmed) {
        return Some((parsed.simple().to_string(), false));
    }

    let digest = Sha256::digest(trimmed.as_bytes());
    let hex: String = digest[..16].iter().map(|b| format!("{b:02x}")).collect();
    Some((hex, true))
}
