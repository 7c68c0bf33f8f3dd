// src/utils/ids.rs

use uuid::Uuid;

/// Returns a new row id: 32 lowercase hex chars (uuid v4, simple format).
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}
