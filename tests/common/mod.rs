#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::{collections::BTreeMap, io, sync::Arc, time::Duration};
use tempfile::TempDir;
use upload_store::{
    config::{LocalClientConfig, StoreConfig},
    models::{
        multipart::{CompletedPart, MultipartPart},
        object::{Acl, ListPage, StoredObject},
        upload::{Upload, Visibility},
    },
    services::{
        local_client::LocalObjectClient,
        object_client::{
            ClientError, ClientResult, CopyOptions, ObjectBody, ObjectClient, PutOptions,
            SharedClient,
        },
        presign::HttpMethod,
        s3_store::S3Store,
    },
};

pub const ENDPOINT: &str = "http://127.0.0.1:3000";
pub const HOST: &str = "127.0.0.1:3000";
pub const SHA1: &str = "abcdef0123456789abcdef0123456789abcdef01";

pub struct Harness {
    pub dir: TempDir,
    pub client: LocalObjectClient,
    pub store: S3Store,
}

pub async fn local_client(dir: &TempDir, bucket: &str) -> LocalObjectClient {
    LocalObjectClient::open(LocalClientConfig {
        bucket: bucket.into(),
        storage_dir: dir.path().join("objects"),
        database_path: dir.path().join("meta.db"),
        endpoint: ENDPOINT.into(),
        region: "us-east-1".into(),
        access_key: "access".into(),
        secret_key: "secret".into(),
    })
    .await
    .unwrap()
}

/// Bucket `uploads`, folder `mysite`, served from the local endpoint.
pub fn site_config() -> StoreConfig {
    StoreConfig::new("uploads/mysite", &format!("{}/uploads", ENDPOINT))
        .unwrap()
        .with_cdn_url("https://cdn.example.com")
        .unwrap()
}

pub async fn harness(config: StoreConfig) -> Harness {
    let dir = TempDir::new().unwrap();
    let client = local_client(&dir, &config.bucket_name).await;
    let store = S3Store::new(Arc::new(client.clone()) as SharedClient, config);
    Harness { dir, client, store }
}

pub fn upload(id: i64, name: &str, visibility: Visibility) -> Upload {
    let extension = name.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
    Upload {
        id,
        sha1: SHA1.into(),
        original_filename: name.into(),
        extension: extension.into(),
        visibility,
        url: None,
        etag: None,
        optimized: vec![],
    }
}

pub fn body(data: &[u8]) -> ObjectBody {
    futures::stream::iter(vec![Ok(Bytes::copy_from_slice(data))]).boxed()
}

pub async fn read_all(mut body: ObjectBody) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

pub async fn put(client: &LocalObjectClient, key: &str, data: &[u8]) -> StoredObject {
    client
        .put_object(key, body(data), PutOptions::default())
        .await
        .unwrap()
}

/// Delegates to a local client, failing selected calls.
pub struct FaultyClient {
    pub inner: LocalObjectClient,
    pub fail_copy: bool,
    pub fail_list_under: Option<String>,
}

impl FaultyClient {
    pub fn new(inner: LocalObjectClient) -> Self {
        Self {
            inner,
            fail_copy: false,
            fail_list_under: None,
        }
    }

    fn injected() -> ClientError {
        ClientError::Io(io::Error::other("injected failure"))
    }
}

#[async_trait]
impl ObjectClient for FaultyClient {
    fn bucket(&self) -> &str {
        self.inner.bucket()
    }

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> ClientResult<StoredObject> {
        self.inner.put_object(key, body, options).await
    }

    async fn get_object(&self, key: &str) -> ClientResult<(StoredObject, ObjectBody)> {
        self.inner.get_object(key).await
    }

    async fn head_object(&self, key: &str) -> ClientResult<StoredObject> {
        self.inner.head_object(key).await
    }

    async fn copy_object(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> ClientResult<StoredObject> {
        if self.fail_copy {
            return Err(Self::injected());
        }
        self.inner.copy_object(source, destination, options).await
    }

    async fn delete_object(&self, key: &str) -> ClientResult<()> {
        self.inner.delete_object(key).await
    }

    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> ClientResult<ListPage> {
        if let Some(failing) = &self.fail_list_under {
            if prefix.contains(failing.as_str()) {
                return Err(Self::injected());
            }
        }
        self.inner.list_objects(prefix, marker, max_keys).await
    }

    async fn get_acl(&self, key: &str) -> ClientResult<Acl> {
        self.inner.get_acl(key).await
    }

    async fn put_acl(&self, key: &str, acl: Acl) -> ClientResult<()> {
        self.inner.put_acl(key, acl).await
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: PutOptions,
    ) -> ClientResult<String> {
        self.inner.create_multipart_upload(key, options).await
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> ClientResult<Vec<MultipartPart>> {
        self.inner.list_parts(key, upload_id).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<StoredObject> {
        self.inner.complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> ClientResult<()> {
        self.inner.abort_multipart_upload(key, upload_id).await
    }

    async fn configure_lifecycle_rule(
        &self,
        rule_id: &str,
        prefix: &str,
        expiry_days: u32,
    ) -> ClientResult<()> {
        self.inner.configure_lifecycle_rule(rule_id, prefix, expiry_days).await
    }

    fn presigned_url(
        &self,
        key: &str,
        method: HttpMethod,
        expires_in: Duration,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String> {
        self.inner.presigned_url(key, method, expires_in, params)
    }
}
