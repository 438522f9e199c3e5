//! Local catalog entries checked by the reconciliation scanner.

use serde::{Deserialize, Serialize};

/// An object the application expects to find in the store.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Identifier of the owning upload or variant record.
    pub id: i64,

    /// Tenant-free path as produced by the key resolver.
    pub key: String,

    /// Etag recorded when the object was stored.
    pub etag: String,

    /// URL printed when the record is reported missing.
    pub url: String,
}
