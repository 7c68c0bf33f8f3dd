pub mod capture;

pub use capture::{BookingRequest, CaptureOutcome, SessionCapture, SessionCaptureService};
