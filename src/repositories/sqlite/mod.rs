// src/repositories/sqlite/mod.rs

pub mod analysis_result;
pub mod booking;
pub mod session;
pub mod user;
pub mod user_profile;

pub use self::analysis_result::{AnalysisResultRepo, SqliteAnalysisResultRepository};
pub use self::booking::{BookingRepo, SqliteBookingRepository};
pub use self::session::{ClaimOutcome, SessionRepo, SqliteSessionRepository};
pub use self::user::{SqliteUserRepository, UserRepo};
pub use self::user_profile::{SqliteUserProfileRepository, UserProfileRepo};
