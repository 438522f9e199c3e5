//! src/services/local_client.rs
//!
//! LocalObjectClient, the bundled object store: SQLite for object metadata,
//! multipart sessions and lifecycle rules, local disk for payloads sharded
//! beneath `base_path/{shard}/{shard}/{key}`. Implements [`ObjectClient`] so
//! the storage engine can run against it exactly as against a remote service.

use crate::{
    config::LocalClientConfig,
    models::{
        multipart::{CompletedPart, MultipartPart, MultipartUpload},
        object::{Acl, ListPage, ObjectSummary, StoredObject},
    },
    services::{
        object_client::{
            ClientError, ClientResult, CopyOptions, ObjectBody, ObjectClient, PutOptions,
        },
        presign::{self, Credentials, HttpMethod, PresignedUrlBuilder},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::StreamExt;
use md5::Context;
use sqlx::{
    QueryBuilder, SqlitePool,
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePoolOptions},
    types::Json,
};
use std::{
    collections::BTreeMap,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
    sync::Mutex,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Embedded schema, applied by [`LocalObjectClient::migrate`].
pub const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MAX_PART_NUMBER: i32 = 10_000;
const MULTIPART_DIR: &str = ".multipart";
const KEY_LOCK_STRIPES: usize = 64;
const OBJECT_COLUMNS: &str = "key, content_type, cache_control, content_disposition, acl, \
                              metadata, size_bytes, etag, last_modified";
const UPLOAD_COLUMNS: &str = "upload_id, key, content_type, cache_control, content_disposition, \
                              acl, metadata, initiated_at";

#[derive(Clone)]
pub struct LocalObjectClient {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    config: Arc<LocalClientConfig>,

    /// Striped per-key locks. A payload rename and its metadata row change
    /// happen under the key's stripe so readers never pair one write's
    /// bytes with another write's size and etag.
    key_locks: Arc<[Mutex<()>]>,
}

impl LocalObjectClient {
    /// Wrap an existing pool. The schema is assumed to be in place.
    pub fn new(db: Arc<SqlitePool>, config: LocalClientConfig) -> Self {
        Self {
            db,
            base_path: config.storage_dir.clone(),
            config: Arc::new(config),
            key_locks: (0..KEY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Create the storage directory and database if needed, connect, and
    /// apply the schema.
    pub async fn open(config: LocalClientConfig) -> ClientResult<Self> {
        fs::create_dir_all(&config.storage_dir).await?;
        if let Some(parent) = config.database_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        debug!("opened metadata database {}", config.database_path.display());

        let client = Self::new(Arc::new(pool), config);
        client.migrate().await?;
        Ok(client)
    }

    /// Run the embedded schema statements. Idempotent.
    pub async fn migrate(&self) -> ClientResult<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        debug!("running {} migration statements", statements.len());
        for stmt in statements {
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    pub fn config(&self) -> &LocalClientConfig {
        &self.config
    }

    /// Check a presigned request against this store's credentials.
    pub fn verify_presigned(
        &self,
        method: HttpMethod,
        host: &str,
        path: &str,
        query: &BTreeMap<String, String>,
    ) -> ClientResult<()> {
        let credentials = Credentials {
            access_key: &self.config.access_key,
            secret_key: &self.config.secret_key,
        };
        presign::verify(method, host, path, query, &credentials, Utc::now())?;
        Ok(())
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> ClientResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(ClientError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.split('/').any(|seg| seg == ".." || seg == ".") {
            return Err(ClientError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(ClientError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.config.bucket, key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn key_lock(&self, key: &str) -> &Mutex<()> {
        let digest = md5::compute(key);
        let slot = u16::from_be_bytes([digest[0], digest[1]]) as usize;
        &self.key_locks[slot % self.key_locks.len()]
    }

    fn multipart_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(MULTIPART_DIR).join(upload_id)
    }

    async fn ensure_parent(path: &Path) -> ClientResult<PathBuf> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ClientError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        Ok(parent)
    }

    /// Stream `body` into a fresh temp file under `dir`, fsync it, and return
    /// its path with the byte count and hex MD5. The temp file is removed on
    /// any error.
    async fn write_temp(dir: &Path, mut body: ObjectBody) -> ClientResult<(PathBuf, i64, String)> {
        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        let result = async {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                size_bytes += chunk.len() as i64;
                digest.consume(&chunk);
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<(), io::Error>(())
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ClientError::Io(err));
        }
        Ok((tmp_path, size_bytes, format!("{:x}", digest.compute())))
    }

    /// Atomically move a finished temp file into its final location.
    async fn commit(tmp_path: &Path, file_path: &Path) -> ClientResult<()> {
        if let Err(err) = fs::rename(tmp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(tmp_path, file_path).await?;
            } else {
                let _ = fs::remove_file(tmp_path).await;
                return Err(ClientError::Io(err));
            }
        }
        Ok(())
    }

    /// Insert or overwrite the metadata row for `key` (last writer wins).
    async fn upsert_object(
        &self,
        key: &str,
        options: &PutOptions,
        size_bytes: i64,
        etag: &str,
    ) -> ClientResult<StoredObject> {
        let sql = format!(
            r#"
            INSERT INTO objects ({OBJECT_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                content_type = excluded.content_type,
                cache_control = excluded.cache_control,
                content_disposition = excluded.content_disposition,
                acl = excluded.acl,
                metadata = excluded.metadata,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                last_modified = excluded.last_modified
            RETURNING {OBJECT_COLUMNS}
            "#
        );
        let object = sqlx::query_as::<_, StoredObject>(&sql)
            .bind(key)
            .bind(options.content_type.as_deref())
            .bind(options.cache_control.as_deref())
            .bind(options.content_disposition.as_deref())
            .bind(options.acl.as_str())
            .bind(Json(&options.metadata))
            .bind(size_bytes)
            .bind(etag)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await?;
        Ok(object)
    }

    async fn fetch_object(&self, key: &str) -> ClientResult<StoredObject> {
        let sql = format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE key = ?");
        sqlx::query_as::<_, StoredObject>(&sql)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| ClientError::NoSuchKey(key.to_string()))
    }

    async fn fetch_upload(&self, key: &str, upload_id: &str) -> ClientResult<MultipartUpload> {
        let sql = format!(
            "SELECT {UPLOAD_COLUMNS} FROM multipart_uploads WHERE upload_id = ? AND key = ?"
        );
        sqlx::query_as::<_, MultipartUpload>(&sql)
            .bind(upload_id)
            .bind(key)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| ClientError::NoSuchUpload(upload_id.to_string()))
    }

    /// Store one part of a multipart upload. Re-uploading a part number
    /// replaces it. Reached through presigned PUT URLs.
    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: ObjectBody,
    ) -> ClientResult<MultipartPart> {
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(ClientError::InvalidPart {
                part_number,
                reason: format!("part number must be between 1 and {}", MAX_PART_NUMBER),
            });
        }
        self.fetch_upload(key, upload_id).await?;

        let dir = self.multipart_dir(upload_id);
        fs::create_dir_all(&dir).await?;
        let (tmp_path, size_bytes, etag) = Self::write_temp(&dir, body).await?;
        Self::commit(&tmp_path, &dir.join(part_number.to_string())).await?;

        let part = sqlx::query_as::<_, MultipartPart>(
            r#"
            INSERT INTO multipart_parts (upload_id, part_number, size_bytes, etag, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(upload_id, part_number) DO UPDATE SET
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                uploaded_at = excluded.uploaded_at
            RETURNING part_number, size_bytes, etag, uploaded_at
            "#,
        )
        .bind(upload_id)
        .bind(part_number)
        .bind(size_bytes)
        .bind(&etag)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!("stored part {} of upload {} ({} bytes)", part_number, upload_id, size_bytes);
        Ok(part)
    }

    /// Apply every lifecycle rule: delete objects under a rule's prefix that
    /// were last modified more than `expiry_days` before `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> ClientResult<u64> {
        let rules: Vec<(String, i64)> =
            sqlx::query_as("SELECT prefix, expiry_days FROM lifecycle_rules")
                .fetch_all(&*self.db)
                .await?;

        let mut purged = 0;
        for (prefix, expiry_days) in rules {
            let Some(cutoff) = TimeDelta::try_days(expiry_days)
                .and_then(|age| now.checked_sub_signed(age))
            else {
                warn!(
                    "lifecycle rule for `{}` skipped: {} days is out of range",
                    prefix, expiry_days
                );
                continue;
            };
            let candidates: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
                "SELECT key, last_modified FROM objects WHERE instr(key, ?) = 1 ORDER BY key",
            )
            .bind(&prefix)
            .fetch_all(&*self.db)
            .await?;

            for (key, last_modified) in candidates {
                if last_modified < cutoff {
                    self.delete_object(&key).await?;
                    purged += 1;
                }
            }
        }

        if purged > 0 {
            info!("lifecycle purge removed {} objects", purged);
        }
        Ok(purged)
    }

    /// Recursively remove empty directories up to `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectClient for LocalObjectClient {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn put_object(
        &self,
        key: &str,
        body: ObjectBody,
        options: PutOptions,
    ) -> ClientResult<StoredObject> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        let parent = Self::ensure_parent(&file_path).await?;

        let (tmp_path, size_bytes, etag) = Self::write_temp(&parent, body).await?;

        let _guard = self.key_lock(key).lock().await;
        Self::commit(&tmp_path, &file_path).await?;
        match self.upsert_object(key, &options, size_bytes, &etag).await {
            Ok(object) => {
                debug!("put {} ({} bytes, etag {})", key, size_bytes, etag);
                Ok(object)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(err)
            }
        }
    }

    async fn get_object(&self, key: &str) -> ClientResult<(StoredObject, ObjectBody)> {
        self.ensure_key_safe(key)?;
        let _guard = self.key_lock(key).lock().await;
        let object = self.fetch_object(key).await?;
        let file = File::open(self.object_path(key)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ClientError::NoSuchKey(key.to_string())
            } else {
                ClientError::Io(err)
            }
        })?;
        Ok((object, ReaderStream::new(file).boxed()))
    }

    async fn head_object(&self, key: &str) -> ClientResult<StoredObject> {
        self.ensure_key_safe(key)?;
        self.fetch_object(key).await
    }

    async fn copy_object(
        &self,
        source: &str,
        destination: &str,
        options: CopyOptions,
    ) -> ClientResult<StoredObject> {
        self.ensure_key_safe(source)?;
        self.ensure_key_safe(destination)?;

        let dst_path = self.object_path(destination);
        let parent = Self::ensure_parent(&dst_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let src = {
            let _guard = self.key_lock(source).lock().await;
            let src = self.fetch_object(source).await?;
            if let Err(err) = fs::copy(self.object_path(source), &tmp_path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(if err.kind() == ErrorKind::NotFound {
                    ClientError::NoSuchKey(source.to_string())
                } else {
                    ClientError::Io(err)
                });
            }
            src
        };

        let options = match options {
            CopyOptions::Preserve => PutOptions {
                content_type: src.content_type.clone(),
                cache_control: src.cache_control.clone(),
                content_disposition: src.content_disposition.clone(),
                acl: src.acl,
                metadata: src.metadata.clone(),
            },
            CopyOptions::Replace(options) => options,
        };

        let _guard = self.key_lock(destination).lock().await;
        Self::commit(&tmp_path, &dst_path).await?;
        let copied = self
            .upsert_object(destination, &options, src.size_bytes, &src.etag)
            .await?;
        debug!("copied {} -> {}", source, destination);
        Ok(copied)
    }

    async fn delete_object(&self, key: &str) -> ClientResult<()> {
        self.ensure_key_safe(key)?;
        let _guard = self.key_lock(key).lock().await;
        sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(ClientError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.base_path).await;
        }
        Ok(())
    }

    async fn list_objects(
        &self,
        prefix: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> ClientResult<ListPage> {
        let max_keys = max_keys.clamp(1, 1000);
        let fetch_limit = max_keys + 1;

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT key, etag, size_bytes FROM objects WHERE instr(key, ",
        );
        builder.push_bind(prefix);
        builder.push(") = 1");
        if let Some(marker) = marker {
            builder.push(" AND key > ");
            builder.push_bind(marker);
        }
        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(fetch_limit as i64);

        let mut objects: Vec<ObjectSummary> = builder.build_query_as().fetch_all(&*self.db).await?;
        let is_truncated = objects.len() == fetch_limit;
        if is_truncated {
            objects.pop();
        }
        Ok(ListPage {
            objects,
            is_truncated,
        })
    }

    async fn get_acl(&self, key: &str) -> ClientResult<Acl> {
        self.ensure_key_safe(key)?;
        Ok(self.fetch_object(key).await?.acl)
    }

    async fn put_acl(&self, key: &str, acl: Acl) -> ClientResult<()> {
        self.ensure_key_safe(key)?;
        let result = sqlx::query("UPDATE objects SET acl = ? WHERE key = ?")
            .bind(acl.as_str())
            .bind(key)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ClientError::NoSuchKey(key.to_string()));
        }
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        options: PutOptions,
    ) -> ClientResult<String> {
        self.ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().simple().to_string();
        sqlx::query(&format!(
            "INSERT INTO multipart_uploads ({UPLOAD_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&upload_id)
        .bind(key)
        .bind(options.content_type.as_deref())
        .bind(options.cache_control.as_deref())
        .bind(options.content_disposition.as_deref())
        .bind(options.acl.as_str())
        .bind(Json(&options.metadata))
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        debug!("created multipart upload {} for {}", upload_id, key);
        Ok(upload_id)
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> ClientResult<Vec<MultipartPart>> {
        self.fetch_upload(key, upload_id).await?;
        let parts = sqlx::query_as::<_, MultipartPart>(
            "SELECT part_number, size_bytes, etag, uploaded_at
             FROM multipart_parts WHERE upload_id = ? ORDER BY part_number",
        )
        .bind(upload_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<StoredObject> {
        let upload = self.fetch_upload(key, upload_id).await?;
        if parts.is_empty() {
            return Err(ClientError::InvalidPart {
                part_number: 0,
                reason: "at least one part is required".into(),
            });
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(ClientError::InvalidPartOrder);
        }

        let stored: BTreeMap<i32, MultipartPart> = self
            .list_parts(key, upload_id)
            .await?
            .into_iter()
            .map(|p| (p.part_number, p))
            .collect();

        let mut digests = Vec::with_capacity(parts.len() * 16);
        for requested in parts {
            let part = stored
                .get(&requested.part_number)
                .ok_or_else(|| ClientError::InvalidPart {
                    part_number: requested.part_number,
                    reason: "part was never uploaded".into(),
                })?;
            if part.etag != requested.etag.trim_matches('"') {
                return Err(ClientError::InvalidPart {
                    part_number: requested.part_number,
                    reason: "etag does not match the uploaded part".into(),
                });
            }
            let raw = hex::decode(&part.etag).map_err(|_| ClientError::InvalidPart {
                part_number: requested.part_number,
                reason: "stored etag is not hex".into(),
            })?;
            digests.extend_from_slice(&raw);
        }

        let dir = self.multipart_dir(upload_id);
        let file_path = self.object_path(key);
        let parent = Self::ensure_parent(&file_path).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let assembled = async {
            let mut out = File::create(&tmp_path).await?;
            let mut size_bytes = 0;
            for requested in parts {
                let mut part_file = File::open(dir.join(requested.part_number.to_string())).await?;
                size_bytes += tokio::io::copy(&mut part_file, &mut out).await? as i64;
            }
            out.flush().await?;
            out.sync_all().await?;
            Ok::<i64, io::Error>(size_bytes)
        }
        .await;
        let size_bytes = match assembled {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ClientError::Io(err));
            }
        };

        let etag = format!("{:x}-{}", md5::compute(&digests), parts.len());
        let options = PutOptions {
            content_type: upload.content_type,
            cache_control: upload.cache_control,
            content_disposition: upload.content_disposition,
            acl: upload.acl,
            metadata: upload.metadata,
        };
        let object = {
            let _guard = self.key_lock(key).lock().await;
            Self::commit(&tmp_path, &file_path).await?;
            self.upsert_object(key, &options, size_bytes, &etag).await?
        };

        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        if let Err(err) = fs::remove_dir_all(&dir).await {
            debug!("failed to remove part directory {}: {}", dir.display(), err);
        }

        info!("completed multipart upload {} into {} ({} parts)", upload_id, key, parts.len());
        Ok(object)
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> ClientResult<()> {
        self.fetch_upload(key, upload_id).await?;
        sqlx::query("DELETE FROM multipart_parts WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        sqlx::query("DELETE FROM multipart_uploads WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;

        let dir = self.multipart_dir(upload_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(ClientError::Io(err)),
        }
        info!("aborted multipart upload {} for {}", upload_id, key);
        Ok(())
    }

    async fn configure_lifecycle_rule(
        &self,
        rule_id: &str,
        prefix: &str,
        expiry_days: u32,
    ) -> ClientResult<()> {
        sqlx::query(
            "INSERT INTO lifecycle_rules (rule_id, prefix, expiry_days, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(rule_id) DO UPDATE SET
                prefix = excluded.prefix,
                expiry_days = excluded.expiry_days,
                updated_at = excluded.updated_at",
        )
        .bind(rule_id)
        .bind(prefix)
        .bind(expiry_days as i64)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        info!("lifecycle rule `{}`: expire `{}` after {} days", rule_id, prefix, expiry_days);
        Ok(())
    }

    fn presigned_url(
        &self,
        key: &str,
        method: HttpMethod,
        expires_in: Duration,
        params: &BTreeMap<String, String>,
    ) -> ClientResult<String> {
        self.ensure_key_safe(key)?;
        let url = PresignedUrlBuilder::new(&self.config.endpoint, &self.config.bucket, key)
            .method(method)
            .expires_in_seconds(expires_in.as_secs())
            .access_key(&self.config.access_key)
            .secret_key(&self.config.secret_key)
            .region(&self.config.region)
            .params(params.clone())
            .build()?;
        Ok(url)
    }
}
