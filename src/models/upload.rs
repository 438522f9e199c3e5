//! Caller-owned upload entities handed to the storage engine.
//!
//! The engine reads these but never mutates them: persisting the `url` and
//! `etag` returned by a store call is the domain layer's job.

use serde::{Deserialize, Serialize};

/// Who may read an object without a presigned URL.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    /// Map the domain's `secure` flag onto a visibility.
    pub fn from_secure(secure: bool) -> Self {
        if secure {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// An uploaded file as the application knows it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Upload {
    /// Domain identifier; also drives the key depth segment.
    pub id: i64,

    /// Hex SHA-1 of the file content.
    pub sha1: String,

    /// Filename as supplied by the user, used for the download disposition.
    pub original_filename: String,

    /// Lowercase extension without the leading dot.
    pub extension: String,

    pub visibility: Visibility,

    /// Absolute URL recorded after a successful store.
    pub url: Option<String>,

    /// Remote etag recorded after a successful store.
    pub etag: Option<String>,

    /// Derived artifacts sharing this upload's visibility.
    #[serde(default)]
    pub optimized: Vec<OptimizedVariant>,
}

/// A resized or re-encoded rendition of an upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OptimizedVariant {
    pub id: i64,
    pub upload_id: i64,
    pub sha1: String,
    pub extension: String,
    pub version: u32,
    pub width: u32,
    pub height: u32,
    pub url: Option<String>,
    pub etag: Option<String>,
}
