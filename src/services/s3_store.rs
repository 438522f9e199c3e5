//! The storage engine: lifecycle of uploaded files in a remote object store.
//!
//! [`S3Store`] turns domain entities into keys, talks to the store through an
//! [`ObjectClient`], and owns the URL rules (ownership, CDN rewriting,
//! presigning). It never mutates the entities it is handed; callers persist
//! the returned url and etag themselves.
//!
//! [`ObjectClient`]: crate::services::object_client::ObjectClient

use crate::{
    config::{ConfigError, StoreConfig},
    models::{
        multipart::{CompletedPart, MultipartPart, MultipartSession},
        object::{Acl, StoredObject},
        upload::{OptimizedVariant, Upload, Visibility},
    },
    services::{
        key_resolver::{KeyResolver, StorageKey, TEMP_SEGMENT, TOMBSTONE_SEGMENT},
        object_client::{ClientError, CopyOptions, PutOptions, SharedClient},
        presign::HttpMethod,
        tombstone::TombstoneManager,
    },
};
use futures::StreamExt;
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

/// One year, immutable: stored content never changes under a key.
pub const CACHE_CONTROL: &str = "max-age=31556952, public, immutable";

const INLINE_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "ico", "webp", "avif", "bmp"];
const MAX_PART_NUMBER: i32 = 10_000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Remote(#[from] ClientError),
    #[error("invalid multipart request: {0}")]
    InvalidMultipart(String),
    #[error("catalog could not be read: {0}")]
    Catalog(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Remote(err) if err.is_not_found())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a URL is not one of ours.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OwnershipError {
    #[error("`{0}` is not an absolute URL")]
    Malformed(String),
    #[error("host `{0}` is neither the store nor the CDN")]
    ForeignHost(String),
    #[error("path `{0}` is outside the bucket folder")]
    OutsideBucketFolder(String),
}

/// Which configured origin a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlOrigin {
    Store,
    Cdn,
}

/// Where the bytes for a store call come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A local file streamed into the store.
    File(PathBuf),
    /// A full key already in the bucket, typically a finished temporary
    /// upload. Copied to the canonical key, then deleted.
    ExternalKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub url: String,
    pub etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUpload {
    pub url: String,
    pub key: String,
}

/// Maps bucket-relative paths to full keys:
/// `[folder/][tenant/]path` and `[folder/]tombstone/[tenant/]path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyLayout {
    folder: Option<String>,
    tenant: Option<String>,
}

impl KeyLayout {
    pub fn new(folder: Option<&str>, tenant: Option<&str>) -> Self {
        let clean = |s: &str| {
            let s = s.trim_matches('/');
            (!s.is_empty()).then(|| s.to_string())
        };
        Self {
            folder: folder.and_then(clean),
            tenant: tenant.and_then(clean),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.bucket_folder.as_deref(), config.tenant.as_deref())
    }

    fn folder_prefix(&self) -> String {
        self.folder.as_ref().map(|f| format!("{}/", f)).unwrap_or_default()
    }

    fn tenant_prefix(&self) -> String {
        self.tenant.as_ref().map(|t| format!("{}/", t)).unwrap_or_default()
    }

    pub fn prefix(&self) -> String {
        format!("{}{}", self.folder_prefix(), self.tenant_prefix())
    }

    pub fn qualify(&self, path: &str) -> String {
        format!("{}{}", self.prefix(), path.trim_start_matches('/'))
    }

    /// Inverse of [`KeyLayout::qualify`].
    pub fn strip<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix().as_str())
    }

    pub fn tombstone_prefix(&self) -> String {
        format!("{}{}{}", self.folder_prefix(), TOMBSTONE_SEGMENT, self.tenant_prefix())
    }

    pub fn tombstone_key(&self, path: &str) -> String {
        format!("{}{}", self.tombstone_prefix(), path.trim_start_matches('/'))
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: SharedClient,
    config: Arc<StoreConfig>,
    layout: KeyLayout,
    resolver: KeyResolver,
    tombstones: TombstoneManager,
}

impl S3Store {
    pub fn new(client: SharedClient, config: StoreConfig) -> Self {
        let layout = KeyLayout::from_config(&config);
        let tombstones = TombstoneManager::new(client.clone(), layout.clone());
        Self {
            client,
            config: Arc::new(config),
            layout,
            resolver: KeyResolver::default(),
            tombstones,
        }
    }

    pub fn with_resolver(mut self, resolver: KeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn tombstones(&self) -> &TombstoneManager {
        &self.tombstones
    }

    /// Full bucket key for a resolver path.
    pub fn qualified_key(&self, path: &str) -> String {
        self.layout.qualify(path)
    }

    /// `{base_url}/{key}` for a full bucket key.
    pub fn absolute_url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.as_str().trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Put an upload under its canonical key with public or private access
    /// per its visibility.
    pub async fn store(
        &self,
        source: UploadSource,
        upload: &Upload,
        content_type: Option<&str>,
    ) -> StoreResult<StoredFile> {
        let path = self.resolver.path_for_upload(upload);
        let options = self.put_options(&upload.original_filename, content_type, upload.visibility);
        self.put_at(source, &path, options).await
    }

    /// Same as [`S3Store::store`] for a derived rendition. Visibility is the
    /// parent upload's.
    pub async fn store_optimized_variant(
        &self,
        source: UploadSource,
        variant: &OptimizedVariant,
        content_type: Option<&str>,
        visibility: Visibility,
    ) -> StoreResult<StoredFile> {
        let path = self.resolver.path_for_optimized_variant(variant);
        let options = self.put_options(path.file_name(), content_type, visibility);
        self.put_at(source, &path, options).await
    }

    async fn put_at(
        &self,
        source: UploadSource,
        path: &StorageKey,
        options: PutOptions,
    ) -> StoreResult<StoredFile> {
        let key = self.layout.qualify(path.as_str());
        let object = match source {
            UploadSource::File(file_path) => {
                let file = File::open(&file_path).await?;
                let body = ReaderStream::new(file).boxed();
                self.client.put_object(&key, body, options).await?
            }
            UploadSource::ExternalKey(source_key) => {
                let object = self
                    .client
                    .copy_object(&source_key, &key, CopyOptions::Replace(options))
                    .await?;
                self.client.delete_object(&source_key).await?;
                debug!("moved {} -> {}", source_key, key);
                object
            }
        };
        info!("stored {} ({} bytes, acl {})", key, object.size_bytes, object.acl);
        Ok(StoredFile {
            url: self.absolute_url(&key),
            etag: object.etag,
        })
    }

    /// Soft-delete: move the object at `path` into the tombstone area.
    /// URLs this store does not own are left alone.
    pub async fn remove(&self, url: &str, path: &str) -> StoreResult<()> {
        if let Err(reason) = self.ownership(url) {
            debug!("not removing {}: {}", url, reason);
            return Ok(());
        }
        self.tombstones.remove(path).await
    }

    /// Hard delete, bypassing the tombstone area.
    pub async fn delete_permanently(&self, path: &str) -> StoreResult<()> {
        let key = self.layout.qualify(path);
        self.client.delete_object(&key).await?;
        info!("permanently deleted {}", key);
        Ok(())
    }

    /// Server-side copy between two resolver paths. No-op for foreign URLs.
    pub async fn copy(&self, url: &str, source: &str, destination: &str) -> StoreResult<()> {
        if !self.owns_url(url) {
            debug!("not copying foreign url {}", url);
            return Ok(());
        }
        let source = self.layout.qualify(source);
        let destination = self.layout.qualify(destination);
        self.client
            .copy_object(&source, &destination, CopyOptions::Preserve)
            .await?;
        Ok(())
    }

    /// Re-apply the upload's visibility to its object and every variant.
    ///
    /// Returns `false` when the primary object is missing; missing variants
    /// are logged and skipped.
    pub async fn update_acl(&self, upload: &Upload) -> StoreResult<bool> {
        let acl = Acl::from(upload.visibility);
        let primary = self.layout.qualify(self.resolver.path_for_upload(upload).as_str());
        let updated = self.apply_acl(&primary, acl).await?;

        for variant in &upload.optimized {
            let path = self.resolver.path_for_optimized_variant(variant);
            self.apply_acl(&self.layout.qualify(path.as_str()), acl).await?;
        }
        Ok(updated)
    }

    async fn apply_acl(&self, key: &str, acl: Acl) -> StoreResult<bool> {
        match self.client.put_acl(key, acl).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => {
                warn!("cannot set acl {} on missing object {}", acl, key);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stream the upload's object into `destination`, returning bytes written.
    pub async fn download_file(&self, upload: &Upload, destination: &Path) -> StoreResult<u64> {
        let key = self.layout.qualify(self.resolver.path_for_upload(upload).as_str());
        let (_, mut body) = self.client.get_object(&key).await?;

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let mut file = File::create(destination).await?;
        let mut written = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("downloaded {} to {} ({} bytes)", key, destination.display(), written);
        Ok(written)
    }

    // ---------------------------------------------------------------
    // URLs
    // ---------------------------------------------------------------

    /// Classify `url` against the base and CDN origins.
    ///
    /// A URL on the base host must also sit under the bucket folder when one
    /// is configured; it is never reconsidered as a CDN URL.
    pub fn ownership(&self, url: &str) -> Result<UrlOrigin, OwnershipError> {
        let parsed = self.parse_url(url).ok_or_else(|| OwnershipError::Malformed(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| OwnershipError::Malformed(url.to_string()))?;

        if Some(host) == self.config.base_url.host_str() {
            let prefix = format!("{}/", self.folder_url_path());
            if self.layout.folder.is_some() && !parsed.path().starts_with(&prefix) {
                return Err(OwnershipError::OutsideBucketFolder(parsed.path().to_string()));
            }
            return Ok(UrlOrigin::Store);
        }

        match &self.config.cdn_url {
            Some(cdn) if cdn.host_str() == Some(host) => Ok(UrlOrigin::Cdn),
            _ => Err(OwnershipError::ForeignHost(host.to_string())),
        }
    }

    pub fn owns_url(&self, url: &str) -> bool {
        self.ownership(url).is_ok()
    }

    /// Rewrite a store URL onto the CDN, dropping the base path and bucket
    /// folder. Anything else comes back unchanged.
    pub fn cdn_url(&self, url: &str) -> String {
        let Some(cdn) = &self.config.cdn_url else {
            return url.to_string();
        };
        let Some(parsed) = self.parse_url(url) else {
            return url.to_string();
        };
        if parsed.host_str() != self.config.base_url.host_str() {
            return url.to_string();
        }

        let prefix = self.folder_url_path();
        let Some(rest) = parsed.path().strip_prefix(prefix.as_str()) else {
            return url.to_string();
        };
        if !rest.starts_with('/') {
            return url.to_string();
        }

        let mut rewritten = cdn.clone();
        rewritten.set_path(&format!("{}{}", cdn.path().trim_end_matches('/'), rest));
        rewritten.set_query(parsed.query());
        rewritten.to_string()
    }

    /// URL a client should use to read the upload. Private or forced
    /// downloads get a short-lived presigned URL; public uploads their
    /// stored URL.
    pub fn url_for(&self, upload: &Upload, force_download: bool) -> StoreResult<String> {
        let key = self.layout.qualify(self.resolver.path_for_upload(upload).as_str());
        if !upload.visibility.is_private() && !force_download {
            return Ok(upload.url.clone().unwrap_or_else(|| self.absolute_url(&key)));
        }

        let mut params = BTreeMap::new();
        if force_download {
            params.insert(
                "response-content-disposition".to_string(),
                attachment_disposition(&upload.original_filename),
            );
        }
        let url = self
            .client
            .presigned_url(&key, HttpMethod::Get, self.config.presign_expiry, &params)?;
        Ok(url)
    }

    /// Presigned PUT for a direct client upload to a fresh temporary key.
    /// `metadata` is signed into the URL as `x-amz-meta-*`.
    pub fn signed_url_for_temporary_upload(
        &self,
        file_name: &str,
        expires_in: Duration,
        metadata: &BTreeMap<String, String>,
    ) -> StoreResult<PresignedUpload> {
        let path = self.resolver.temporary_upload_path(file_name, None);
        let key = self.layout.qualify(path.as_str());
        let params: BTreeMap<String, String> = metadata
            .iter()
            .map(|(k, v)| (format!("x-amz-meta-{}", k.to_ascii_lowercase()), v.clone()))
            .collect();
        let url = self
            .client
            .presigned_url(&key, HttpMethod::Put, expires_in, &params)?;
        Ok(PresignedUpload { url, key })
    }

    fn parse_url(&self, url: &str) -> Option<Url> {
        if url.starts_with("//") {
            Url::parse(&format!("{}:{}", self.config.base_url.scheme(), url)).ok()
        } else {
            Url::parse(url).ok()
        }
    }

    /// `{base path}/{folder}` with no trailing slash; empty at the root.
    fn folder_url_path(&self) -> String {
        let base = self.config.base_url.path().trim_end_matches('/');
        match &self.layout.folder {
            Some(folder) => format!("{}/{}", base, folder),
            None => base.to_string(),
        }
    }

    // ---------------------------------------------------------------
    // Multipart
    // ---------------------------------------------------------------

    /// Start a direct multipart upload to a fresh temporary key.
    pub async fn create_multipart(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        metadata: BTreeMap<String, String>,
    ) -> StoreResult<MultipartSession> {
        let path = self.resolver.temporary_upload_path(file_name, None);
        let key = self.layout.qualify(path.as_str());
        let mut options = self.put_options(file_name, content_type, Visibility::Private);
        options.metadata = metadata;

        let upload_id = self.client.create_multipart_upload(&key, options).await?;
        info!("started multipart upload {} for {}", upload_id, key);
        Ok(MultipartSession { upload_id, key })
    }

    /// Presigned PUT for one part.
    pub fn presign_part(
        &self,
        session: &MultipartSession,
        part_number: i32,
    ) -> StoreResult<String> {
        self.ensure_temporary(session)?;
        if !(1..=MAX_PART_NUMBER).contains(&part_number) {
            return Err(StoreError::InvalidMultipart(format!(
                "part number {} outside 1..={}",
                part_number, MAX_PART_NUMBER
            )));
        }
        let params = BTreeMap::from([
            ("partNumber".to_string(), part_number.to_string()),
            ("uploadId".to_string(), session.upload_id.clone()),
        ]);
        let url = self.client.presigned_url(
            &session.key,
            HttpMethod::Put,
            self.config.presign_expiry,
            &params,
        )?;
        Ok(url)
    }

    pub async fn list_parts(&self, session: &MultipartSession) -> StoreResult<Vec<MultipartPart>> {
        self.ensure_temporary(session)?;
        Ok(self.client.list_parts(&session.key, &session.upload_id).await?)
    }

    /// Assemble the parts. Part validation is the remote store's; its errors
    /// are returned as-is.
    pub async fn complete_multipart(
        &self,
        session: &MultipartSession,
        parts: &[CompletedPart],
    ) -> StoreResult<StoredObject> {
        self.ensure_temporary(session)?;
        let object = self
            .client
            .complete_multipart_upload(&session.key, &session.upload_id, parts)
            .await?;
        info!("completed multipart upload {} ({} parts)", session.upload_id, parts.len());
        Ok(object)
    }

    pub async fn abort_multipart(&self, session: &MultipartSession) -> StoreResult<()> {
        self.ensure_temporary(session)?;
        self.client
            .abort_multipart_upload(&session.key, &session.upload_id)
            .await?;
        Ok(())
    }

    fn ensure_temporary(&self, session: &MultipartSession) -> StoreResult<()> {
        if session.upload_id.trim().is_empty() {
            return Err(StoreError::InvalidMultipart("missing upload id".into()));
        }
        let is_temp = self
            .layout
            .strip(&session.key)
            .is_some_and(|path| path.starts_with(TEMP_SEGMENT));
        if !is_temp {
            return Err(StoreError::InvalidMultipart(format!(
                "`{}` is not a temporary upload key",
                session.key
            )));
        }
        Ok(())
    }

    fn put_options(
        &self,
        file_name: &str,
        content_type: Option<&str>,
        visibility: Visibility,
    ) -> PutOptions {
        PutOptions {
            content_type: Some(
                content_type
                    .map(str::to_string)
                    .unwrap_or_else(|| content_type_for(file_name).to_string()),
            ),
            cache_control: Some(CACHE_CONTROL.to_string()),
            content_disposition: content_disposition_for(file_name),
            acl: Acl::from(visibility),
            metadata: BTreeMap::new(),
        }
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && !ext.contains('/'))
}

/// Image types browsers may render inline. SVG is excluded.
pub fn is_inline_safe(file_name: &str) -> bool {
    extension_of(file_name).is_some_and(|ext| INLINE_IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

pub fn attachment_disposition(file_name: &str) -> String {
    format!("attachment; filename=\"{}\"", file_name.replace('"', ""))
}

/// `None` for inline-safe images, an attachment disposition otherwise.
pub fn content_disposition_for(file_name: &str) -> Option<String> {
    if is_inline_safe(file_name) {
        None
    } else {
        Some(attachment_disposition(file_name))
    }
}

pub fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::LocalClientConfig, services::local_client::LocalObjectClient};
    use tempfile::TempDir;

    async fn store_with(config: StoreConfig) -> (TempDir, S3Store) {
        let dir = TempDir::new().unwrap();
        let client = LocalObjectClient::open(LocalClientConfig {
            bucket: config.bucket_name.clone(),
            storage_dir: dir.path().join("objects"),
            database_path: dir.path().join("meta.db"),
            endpoint: "http://127.0.0.1:3000".into(),
            region: "us-east-1".into(),
            access_key: "access".into(),
            secret_key: "secret".into(),
        })
        .await
        .unwrap();
        (dir, S3Store::new(Arc::new(client), config))
    }

    fn site_config() -> StoreConfig {
        StoreConfig::new("uploads/mysite", "https://example.com/uploads")
            .unwrap()
            .with_cdn_url("https://cdn.example.com")
            .unwrap()
    }

    #[test]
    fn layout_qualifies_and_tombstones() {
        let layout = KeyLayout::new(Some("/site/"), Some("t1"));
        assert_eq!(layout.qualify("original/a.png"), "site/t1/original/a.png");
        assert_eq!(layout.strip("site/t1/original/a.png"), Some("original/a.png"));
        assert_eq!(layout.strip("other/original/a.png"), None);
        assert_eq!(layout.tombstone_key("original/a.png"), "site/tombstone/t1/original/a.png");

        let bare = KeyLayout::default();
        assert_eq!(bare.qualify("original/a.png"), "original/a.png");
        assert_eq!(bare.tombstone_prefix(), "tombstone/");
    }

    #[tokio::test]
    async fn cdn_rewrite_strips_base_path_and_folder() {
        let (_dir, store) = store_with(site_config()).await;
        assert_eq!(
            store.cdn_url("https://example.com/uploads/mysite/original/1X/abc.png"),
            "https://cdn.example.com/original/1X/abc.png"
        );
        // folder name reappearing deeper in the path is kept
        assert_eq!(
            store.cdn_url("https://example.com/uploads/mysite/original/mysite/abc.png"),
            "https://cdn.example.com/original/mysite/abc.png"
        );
        assert_eq!(
            store.cdn_url("https://other.com/uploads/mysite/a.png"),
            "https://other.com/uploads/mysite/a.png"
        );
        assert_eq!(
            store.cdn_url("https://example.com/uploads/mysiteX/a.png"),
            "https://example.com/uploads/mysiteX/a.png"
        );
        assert_eq!(store.cdn_url("not a url"), "not a url");
    }

    #[tokio::test]
    async fn cdn_rewrite_is_identity_without_cdn() {
        let config = StoreConfig::new("uploads", "https://example.com").unwrap();
        let (_dir, store) = store_with(config).await;
        let url = "https://example.com/original/1X/abc.png";
        assert_eq!(store.cdn_url(url), url);
    }

    #[tokio::test]
    async fn ownership_classifies_urls() {
        let (_dir, store) = store_with(site_config()).await;
        assert_eq!(
            store.ownership("https://example.com/uploads/mysite/original/a.png"),
            Ok(UrlOrigin::Store)
        );
        assert_eq!(
            store.ownership("//example.com/uploads/mysite/original/a.png"),
            Ok(UrlOrigin::Store)
        );
        assert_eq!(
            store.ownership("https://cdn.example.com/original/a.png"),
            Ok(UrlOrigin::Cdn)
        );
        assert!(matches!(
            store.ownership("https://example.com/uploads/othersite/a.png"),
            Err(OwnershipError::OutsideBucketFolder(_))
        ));
        assert!(matches!(
            store.ownership("https://evil.com/uploads/mysite/a.png"),
            Err(OwnershipError::ForeignHost(_))
        ));
        assert!(matches!(store.ownership("::::"), Err(OwnershipError::Malformed(_))));
        assert!(!store.owns_url("relative/path.png"));
    }

    #[test]
    fn disposition_depends_on_extension() {
        assert_eq!(content_disposition_for("photo.png"), None);
        assert_eq!(content_disposition_for("PHOTO.JPEG"), None);
        assert_eq!(
            content_disposition_for("doc.pdf").as_deref(),
            Some("attachment; filename=\"doc.pdf\"")
        );
        assert_eq!(
            content_disposition_for("logo.svg").as_deref(),
            Some("attachment; filename=\"logo.svg\"")
        );
        assert_eq!(attachment_disposition("a\"b.txt"), "attachment; filename=\"ab.txt\"");
        assert_eq!(content_type_for("x.webp"), "image/webp");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn private_urls_are_presigned() {
        let (_dir, store) = store_with(site_config()).await;
        let mut upload = Upload {
            id: 1,
            sha1: "abcdef0123456789abcdef0123456789abcdef01".into(),
            original_filename: "report.pdf".into(),
            extension: "pdf".into(),
            visibility: Visibility::Public,
            url: Some("https://example.com/uploads/mysite/original/x.pdf".into()),
            etag: None,
            optimized: vec![],
        };
        assert_eq!(
            store.url_for(&upload, false).unwrap(),
            "https://example.com/uploads/mysite/original/x.pdf"
        );

        let forced = store.url_for(&upload, true).unwrap();
        assert!(forced.contains("X-Amz-Signature="));
        assert!(forced.contains("response-content-disposition="));

        upload.visibility = Visibility::Private;
        let private = store.url_for(&upload, false).unwrap();
        assert!(private.starts_with("http://127.0.0.1:3000/uploads/mysite/original/1X/a/bc/"));
        assert!(private.contains("X-Amz-Expires=300"));
    }

    #[tokio::test]
    async fn multipart_sessions_must_target_temp_keys() {
        let (_dir, store) = store_with(site_config()).await;
        let session = store
            .create_multipart("video.mp4", None, BTreeMap::new())
            .await
            .unwrap();
        assert!(session.key.starts_with("mysite/temp/"));

        let url = store.presign_part(&session, 3).unwrap();
        assert!(url.contains("partNumber=3"));
        assert!(matches!(
            store.presign_part(&session, 0),
            Err(StoreError::InvalidMultipart(_))
        ));

        let forged = MultipartSession {
            upload_id: session.upload_id.clone(),
            key: "mysite/original/1X/a.png".into(),
        };
        assert!(matches!(
            store.list_parts(&forged).await,
            Err(StoreError::InvalidMultipart(_))
        ));
        store.abort_multipart(&session).await.unwrap();
    }
}
