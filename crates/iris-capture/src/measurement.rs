use std::collections::HashMap;

use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

/// Millisecond-precision UTC encoding, e.g. `2025-10-23T12:34:56.789Z`.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// One captured unit: an encoded payload plus its descriptive metadata.
///
/// Constructed by a capture backend on each successful read and never
/// mutated afterwards. `metadata` carries at least `width`, `height`, and
/// `format`; `semantic_id` is reserved for future semantic tagging and is
/// never interpreted by this workspace.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Capture instant, millisecond-precision UTC.
    pub timestamp: String,
    /// Encoded bytes (JPEG for camera backends).
    pub payload: Vec<u8>,
    /// String key/value metadata describing the payload.
    pub metadata: HashMap<String, String>,
    /// Optional external identifier, absent by default.
    pub semantic_id: Option<String>,
}

impl Measurement {
    /// Build a measurement stamped with the current time.
    pub fn new(payload: Vec<u8>, metadata: HashMap<String, String>) -> Self {
        Self {
            timestamp: Self::now_iso(),
            payload,
            metadata,
            semantic_id: None,
        }
    }

    /// Current UTC time in the fixed millisecond encoding.
    pub fn now_iso() -> String {
        OffsetDateTime::now_utc()
            .format(&TIMESTAMP_FORMAT)
            .expect("format timestamp")
    }
}
