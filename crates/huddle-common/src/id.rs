//! Identifier generation.
//!
//! Rooms, participants, and messages all use UUID v7:
//! - Monotonically increasing (time-sortable)
//! - 48 bits of Unix timestamp (millisecond precision)
//! - 74 bits of randomness (unique without coordination)
//! - Compatible with all UUID infrastructure

use uuid::Uuid;

/// Generate a new time-sortable id using UUID v7.
pub fn generate_id() -> Uuid {
    Uuid::now_v7()
}

/// Extract the approximate creation timestamp from a UUID v7.
pub fn extract_timestamp(id: Uuid) -> Option<chrono::DateTime<chrono::Utc>> {
    let bytes = id.as_bytes();
    // UUID v7: first 48 bits are millisecond timestamp
    let ms = ((bytes[0] as u64) << 40)
        | ((bytes[1] as u64) << 32)
        | ((bytes[2] as u64) << 24)
        | ((bytes[3] as u64) << 16)
        | ((bytes[4] as u64) << 8)
        | (bytes[5] as u64);

    chrono::DateTime::from_timestamp_millis(ms as i64)
}
