//! The outbound contract to a remote object store.
//!
//! Everything above this trait works in terms of bucket-relative keys and
//! never touches a vendor API directly. [`LocalObjectClient`] is the
//! bundled implementation.
//!
//! [`LocalObjectClient`]: crate::services::local_client::LocalObjectClient

use crate::models::{
    multipart::{CompletedPart, MultipartPart},
    object::{Acl, ListPage, StoredObject},
};
use crate::services::presign::{HttpMethod, PresignError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::{collections::BTreeMap, io, sync::Arc, time::Duration};
use thiserror::Error;

/// Streaming object payload.
pub type ObjectBody = BoxStream<'static, io::Result<Bytes>>;

pub type SharedClient = Arc<dyn ObjectClient>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("object `{0}` not found")]
    NoSuchKey(String),
    #[error("multipart upload `{0}` not found")]
    NoSuchUpload(String),
    #[error("invalid part {part_number}: {reason}")]
    InvalidPart { part_number: i32, reason: String },
    #[error("parts must be listed in ascending order without duplicates")]
    InvalidPartOrder,
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Presign(#[from] PresignError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NoSuchKey(_))
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Object metadata written with a PUT, copy, or multipart creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Acl,
    pub metadata: BTreeMap<String, String>,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            cache_control: None,
            content_disposition: None,
            acl: Acl::Private,
            metadata: BTreeMap::new(),
        }
    }
}

/// How a server-side copy treats the destination's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CopyOptions {
    /// Keep the source's metadata and ACL.
    #[default]
    Preserve,
    /// Replace metadata and ACL with the given values.
    Replace(PutOptions),
}

#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Name of the bucket this client writes into.
    fn bucket(&self) -> &str;

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> ClientResult<StoredObject>;

    async fn get_object(&self, key: &str) -> ClientResult<(StoredObject, ObjectBody)>;

    async fn head_object(&self, key: &str) -> ClientResult<StoredObject>;

    async fn copy_object(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> ClientResult<StoredObject>;

    /// Deleting an absent key succeeds.
    async fn delete_object(&self, key: &str) -> ClientResult<()>;

    /// Keys strictly greater than `marker`, in key order.
    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> ClientResult<ListPage>;

    async fn get_acl(&self, key: &str) -> ClientResult<Acl>;

    async fn put_acl(&self, key: &str, acl: Acl) -> ClientResult<()>;

    /// Returns the new upload id.
    async fn create_multipart_upload(&self, key: &str, options: PutOptions)
    -> ClientResult<String>;

    async fn list_parts(&self, key: &str, upload_id: &str) -> ClientResult<Vec<MultipartPart>>;

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<StoredObject>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> ClientResult<()>;

    /// Install or replace the expiry rule `rule_id` on `prefix`.
    async fn configure_lifecycle_rule(
        &self,
        rule_id: &str,
        prefix: &str,
        expiry_days: u32,
    ) -> ClientResult<()>;

    /// Local computation; never performs a round trip.
    fn presigned_url(
        &self,
        key: &str,
        method: HttpMethod,
        expires_in: Duration,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String>;
}
