//! Canonical storage paths for uploads, optimized variants and temporary
//! direct uploads.
//!
//! Paths produced here are bucket- and tenant-agnostic; the storage engine
//! prefixes them with the bucket folder and tenant before talking to the
//! store.

use crate::models::upload::{OptimizedVariant, Upload};
use std::{fmt, sync::Arc};
use uuid::Uuid;

pub const ORIGINAL_SEGMENT: &str = "original/";
pub const OPTIMIZED_SEGMENT: &str = "optimized/";
pub const TOMBSTONE_SEGMENT: &str = "tombstone/";
pub const TEMP_SEGMENT: &str = "temp/";

/// A bucket-relative object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derivation rule for content-addressed paths. Implementations must be pure:
/// the same entity always yields the same path.
pub trait KeyPolicy: Send + Sync {
    fn upload_path(&self, upload: &Upload) -> String;
    fn variant_path(&self, variant: &OptimizedVariant) -> String;
}

/// `original/{depth}X/{a}/{bc}/{sha1}.{ext}` and
/// `optimized/{depth}X/{a}/{bc}/{sha1}_{version}_{w}x{h}.{ext}`.
///
/// `depth` grows by one for every factor of 16 past the first thousand ids,
/// which keeps directory fan-out bounded on stores that care.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestKeyPolicy;

impl DigestKeyPolicy {
    fn depth_for(id: i64) -> u32 {
        let depth = (id as f64 / 1000.0).log(16.0).ceil();
        if depth.is_finite() && depth > 0.0 {
            depth as u32
        } else {
            0
        }
    }

    fn sharded(segment: &str, id: i64, sha1: &str, leaf: &str) -> String {
        let first = sha1.get(0..1).unwrap_or("0");
        let next = sha1.get(1..3).unwrap_or("00");
        format!(
            "{}{}X/{}/{}/{}",
            segment,
            Self::depth_for(id) + 1,
            first,
            next,
            leaf
        )
    }
}

impl KeyPolicy for DigestKeyPolicy {
    fn upload_path(&self, upload: &Upload) -> String {
        let leaf = with_extension(&upload.sha1, &upload.extension);
        Self::sharded(ORIGINAL_SEGMENT, upload.id, &upload.sha1, &leaf)
    }

    fn variant_path(&self, variant: &OptimizedVariant) -> String {
        let stem = format!(
            "{}_{}_{}x{}",
            variant.sha1, variant.version, variant.width, variant.height
        );
        let leaf = with_extension(&stem, &variant.extension);
        Self::sharded(OPTIMIZED_SEGMENT, variant.upload_id, &variant.sha1, &leaf)
    }
}

fn with_extension(stem: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, extension)
    }
}

#[derive(Clone)]
pub struct KeyResolver {
    policy: Arc<dyn KeyPolicy>,
}

impl Default for KeyResolver {
    fn default() -> Self {
        Self::new(DigestKeyPolicy)
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver").finish_non_exhaustive()
    }
}

impl KeyResolver {
    pub fn new(policy: impl KeyPolicy + 'static) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn path_for_upload(&self, upload: &Upload) -> StorageKey {
        StorageKey::new(self.policy.upload_path(upload))
    }

    pub fn path_for_optimized_variant(&self, variant: &OptimizedVariant) -> StorageKey {
        StorageKey::new(self.policy.variant_path(variant))
    }

    /// `temp/[{folder_prefix}/]{random}/{file_name}` for direct client
    /// uploads awaiting finalisation. Every call yields a fresh key.
    pub fn temporary_upload_path(
        &self,
        file_name: &str,
        folder_prefix: Option<&str>,
    ) -> StorageKey {
        let mut key = String::from(TEMP_SEGMENT);
        let folder = folder_prefix
            .map(|f| f.trim_matches('/'))
            .filter(|f| !f.is_empty());
        if let Some(folder) = folder {
            key.push_str(folder);
            key.push('/');
        }
        key.push_str(&Uuid::new_v4().simple().to_string());
        key.push('/');
        key.push_str(&sanitize_file_name(file_name));
        StorageKey::new(key)
    }
}

/// Keep the final path component and replace anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::Visibility;

    fn upload(id: i64) -> Upload {
        Upload {
            id,
            sha1: "abcdef0123456789abcdef0123456789abcdef01".into(),
            original_filename: "Photo.PNG".into(),
            extension: "PNG".into(),
            visibility: Visibility::Public,
            url: None,
            etag: None,
            optimized: vec![],
        }
    }

    #[test]
    fn upload_paths_are_stable_and_depth_scaled() {
        let resolver = KeyResolver::default();
        let path = resolver.path_for_upload(&upload(42));
        assert_eq!(
            path.as_str(),
            "original/1X/a/bc/abcdef0123456789abcdef0123456789abcdef01.png"
        );
        assert_eq!(resolver.path_for_upload(&upload(42)), path);

        assert!(resolver.path_for_upload(&upload(1_000)).as_str().starts_with("original/1X/"));
        assert!(resolver.path_for_upload(&upload(1_001)).as_str().starts_with("original/2X/"));
        assert!(resolver.path_for_upload(&upload(16_001)).as_str().starts_with("original/3X/"));
        assert!(resolver.path_for_upload(&upload(-5)).as_str().starts_with("original/1X/"));
    }

    #[test]
    fn variant_paths_carry_dimensions() {
        let variant = OptimizedVariant {
            id: 7,
            upload_id: 42,
            sha1: "0123456789abcdef0123456789abcdef01234567".into(),
            extension: "webp".into(),
            version: 2,
            width: 100,
            height: 50,
            url: None,
            etag: None,
        };
        let path = KeyResolver::default().path_for_optimized_variant(&variant);
        assert_eq!(
            path.as_str(),
            "optimized/1X/0/12/0123456789abcdef0123456789abcdef01234567_2_100x50.webp"
        );
        assert_eq!(path.file_name(), "0123456789abcdef0123456789abcdef01234567_2_100x50.webp");
    }

    #[test]
    fn temporary_paths_are_unique_and_nested_under_folder() {
        let resolver = KeyResolver::default();
        let a = resolver.temporary_upload_path("report.pdf", None);
        let b = resolver.temporary_upload_path("report.pdf", None);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("temp/"));
        assert!(a.as_str().ends_with("/report.pdf"));

        let nested = resolver.temporary_upload_path("x.bin", Some("/site-a/"));
        assert!(nested.as_str().starts_with("temp/site-a/"));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_file_name("C:\\temp\\a.txt"), "a.txt");
        assert_eq!(sanitize_file_name("..."), "file");
    }
}
