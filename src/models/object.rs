//! Represents an object (file) as the remote store records it.

use crate::models::upload::Visibility;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{collections::BTreeMap, fmt, str::FromStr};
use thiserror::Error;

/// Canned access-control setting on a stored object.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acl {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "public-read")]
    PublicRead,
}

#[derive(Debug, Error)]
#[error("unknown ACL `{0}`")]
pub struct ParseAclError(String);

impl Acl {
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

impl From<Visibility> for Acl {
    fn from(visibility: Visibility) -> Self {
        match visibility {
            Visibility::Public => Acl::PublicRead,
            Visibility::Private => Acl::Private,
        }
    }
}

impl FromStr for Acl {
    type Err = ParseAclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Acl::Private),
            "public-read" => Ok(Acl::PublicRead),
            other => Err(ParseAclError(other.to_string())),
        }
    }
}

impl TryFrom<String> for Acl {
    type Error = ParseAclError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single object (blob) held by the store.
///
/// Carries the metadata the store serves back on GET/HEAD. Payload bytes
/// live on disk and are never loaded into this struct.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Full key within the bucket, including any folder or tenant prefix.
    pub key: String,

    pub content_type: Option<String>,

    pub cache_control: Option<String>,

    /// `attachment; filename="..."` for downloads, absent for inline images.
    pub content_disposition: Option<String>,

    #[sqlx(try_from = "String")]
    pub acl: Acl,

    /// User metadata (`x-amz-meta-*`), stored as a JSON object.
    #[sqlx(json)]
    pub metadata: BTreeMap<String, String>,

    pub size_bytes: i64,

    /// Hex MD5 for single-part objects, `{md5-of-md5s}-{parts}` for multipart.
    pub etag: String,

    pub last_modified: DateTime<Utc>,
}

/// One row of a listing page.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub etag: String,
    pub size_bytes: i64,
}

/// A marker-paginated listing page, ordered by key.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    pub is_truncated: bool,
}

impl ListPage {
    /// Key to pass as the marker for the next page.
    pub fn next_marker(&self) -> Option<&str> {
        self.objects.last().map(|o| o.key.as_str())
    }
}
