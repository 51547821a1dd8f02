//! Represents an uploaded PDF document (an "edital").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Description stored when the uploader leaves the field blank.
pub const DESCRIPTION_PLACEHOLDER: &str = "no description";

/// A single uploaded document.
///
/// The row stores metadata only; the payload lives in the storage
/// directory under `stored_name`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Document {
    /// Surrogate key assigned by SQLite. Monotonic, never reused.
    pub id: i64,

    /// Filename as supplied by the client. Untrusted.
    pub original_name: String,

    /// Filename on disk: `<stem>-<token>.pdf`.
    pub stored_name: String,

    /// Free-text annotation, or [`DESCRIPTION_PLACEHOLDER`].
    pub description: String,

    /// Payload size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of the payload.
    pub checksum: String,

    /// When the row was inserted.
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata captured from an upload form before the row exists.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub original_name: String,
    pub description: String,
}

impl NewDocument {
    /// Build the insert payload, substituting the placeholder for a blank
    /// or missing description.
    pub fn new(original_name: impl Into<String>, description: Option<String>) -> Self {
        let description = description
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DESCRIPTION_PLACEHOLDER.to_string());

        Self {
            original_name: original_name.into(),
            description,
        }
    }
}
