//! Represents multipart upload sessions and parts.

use crate::models::object::Acl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Caller-held handle to an in-progress multipart transfer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultipartSession {
    pub upload_id: String,
    pub key: String,
}

/// A part reference submitted on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

/// A multipart upload session as the store tracks it.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartUpload {
    /// Unique upload ID (returned to client).
    pub upload_id: String,

    /// Object key being uploaded.
    pub key: String,

    pub content_type: Option<String>,

    pub cache_control: Option<String>,

    pub content_disposition: Option<String>,

    #[sqlx(try_from = "String")]
    pub acl: Acl,

    #[sqlx(json)]
    pub metadata: BTreeMap<String, String>,

    pub initiated_at: DateTime<Utc>,
}

/// Represents a single uploaded part in a multipart upload session.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct MultipartPart {
    /// Part number (1-based).
    pub part_number: i32,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Hex MD5 of this part.
    pub etag: String,

    /// Timestamp when this part was uploaded.
    pub uploaded_at: DateTime<Utc>,
}
