//! Reconciliation of a local catalog against the remote listing.
//!
//! A scan pages through every object under a prefix, marks each catalog
//! record whose key and etag both match a remote object as verified, and
//! reports the rest as missing. The report is advisory; nothing is written
//! back to the catalog.

use crate::{
    models::{catalog::CatalogRecord, upload::Upload},
    services::{
        key_resolver::{KeyResolver, OPTIMIZED_SEGMENT, ORIGINAL_SEGMENT},
        object_client::SharedClient,
        s3_store::{KeyLayout, S3Store, StoreResult},
    },
};
use std::{
    collections::{HashMap, HashSet},
    path::Path,
};
use tracing::{debug, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// A set of records expected to exist remotely.
pub trait Catalog: Send + Sync {
    fn name(&self) -> &str;
    fn records(&self) -> &[CatalogRecord];
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    name: String,
    records: Vec<CatalogRecord>,
}

impl InMemoryCatalog {
    pub fn new(name: impl Into<String>, records: Vec<CatalogRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    /// Uploads that have been stored, i.e. carry both a url and an etag.
    pub fn from_uploads(resolver: &KeyResolver, uploads: &[Upload]) -> Self {
        let records = uploads
            .iter()
            .filter_map(|upload| {
                Some(CatalogRecord {
                    id: upload.id,
                    key: resolver.path_for_upload(upload).into_string(),
                    etag: upload.etag.clone()?,
                    url: upload.url.clone()?,
                })
            })
            .collect();
        Self::new("uploads", records)
    }

    /// Stored optimized variants of the given uploads.
    pub fn from_variants(resolver: &KeyResolver, uploads: &[Upload]) -> Self {
        let records = uploads
            .iter()
            .flat_map(|upload| upload.optimized.iter())
            .filter_map(|variant| {
                Some(CatalogRecord {
                    id: variant.id,
                    key: resolver.path_for_optimized_variant(variant).into_string(),
                    etag: variant.etag.clone()?,
                    url: variant.url.clone()?,
                })
            })
            .collect();
        Self::new("optimized", records)
    }

    /// A JSON array of records.
    pub async fn from_json_file(name: impl Into<String>, path: &Path) -> StoreResult<Self> {
        let raw = tokio::fs::read(path).await?;
        let records: Vec<CatalogRecord> = serde_json::from_slice(&raw)?;
        debug!("loaded {} catalog records from {}", records.len(), path.display());
        Ok(Self::new(name, records))
    }
}

impl Catalog for InMemoryCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn records(&self) -> &[CatalogRecord] {
        &self.records
    }
}

/// Stages of a single catalog scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Listing,
    Verifying,
    Reporting,
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub catalog: String,
    pub listed: usize,
    pub verified: usize,
    pub missing: Vec<CatalogRecord>,
}

impl ScanReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}

/// Per-catalog outcomes of a full run. A failed listing aborts only the
/// catalog it belongs to.
#[derive(Debug)]
pub struct ReconcileSummary {
    pub uploads: StoreResult<ScanReport>,
    pub optimized: Option<StoreResult<ScanReport>>,
}

pub struct ReconciliationScanner {
    client: SharedClient,
    layout: KeyLayout,
    page_size: usize,
}

impl ReconciliationScanner {
    pub fn new(store: &S3Store) -> Self {
        Self {
            client: store.client().clone(),
            layout: store.layout().clone(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Scan everything under the resolver path `prefix` against `catalog`.
    ///
    /// Etags compare without surrounding quotes. A listing failure
    /// discards all progress for this scan.
    pub async fn scan(&self, prefix: &str, catalog: &dyn Catalog) -> StoreResult<ScanReport> {
        let remote_prefix = self.layout.qualify(prefix);
        let mut expected: HashMap<(&str, &str), Vec<i64>> = HashMap::new();
        for record in catalog.records() {
            expected
                .entry((record.key.as_str(), unquote(&record.etag)))
                .or_default()
                .push(record.id);
        }

        let mut verified: HashSet<i64> = HashSet::new();
        let mut listed = 0usize;
        let mut marker: Option<String> = None;

        loop {
            debug!(catalog = catalog.name(), phase = ?ScanPhase::Listing, marker = ?marker);
            let page = self
                .client
                .list_objects(&remote_prefix, marker.as_deref(), self.page_size)
                .await
                .inspect_err(|err| warn!("listing `{}` failed: {}", remote_prefix, err))?;
            if page.objects.is_empty() {
                break;
            }

            debug!(
                catalog = catalog.name(),
                phase = ?ScanPhase::Verifying,
                count = page.objects.len()
            );
            for object in &page.objects {
                listed += 1;
                let Some(path) = self.layout.strip(&object.key) else {
                    continue;
                };
                if let Some(ids) = expected.get(&(path, unquote(&object.etag))) {
                    verified.extend(ids.iter().copied());
                }
            }

            match page.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }

        debug!(catalog = catalog.name(), phase = ?ScanPhase::Reporting);
        let missing: Vec<CatalogRecord> = catalog
            .records()
            .iter()
            .filter(|record| !verified.contains(&record.id))
            .cloned()
            .collect();

        info!(
            "reconciled `{}`: {} listed, {} verified, {} missing",
            catalog.name(),
            listed,
            verified.len(),
            missing.len()
        );
        Ok(ScanReport {
            catalog: catalog.name().to_string(),
            listed,
            verified: verified.len(),
            missing,
        })
    }

    /// Scan uploads under `original/` and, when given, variants under
    /// `optimized/`. Each scan succeeds or fails on its own.
    pub async fn run(
        &self,
        uploads: &dyn Catalog,
        optimized: Option<&dyn Catalog>,
    ) -> ReconcileSummary {
        let uploads = self.scan(ORIGINAL_SEGMENT, uploads).await;
        let optimized = match optimized {
            Some(catalog) => Some(self.scan(OPTIMIZED_SEGMENT, catalog).await),
            None => None,
        };
        ReconcileSummary { uploads, optimized }
    }
}

fn unquote(etag: &str) -> &str {
    etag.trim_matches('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload::{OptimizedVariant, Visibility};

    #[test]
    fn catalogs_skip_unstored_entities() {
        let stored = Upload {
            id: 1,
            sha1: "abcdef0123456789abcdef0123456789abcdef01".into(),
            original_filename: "a.png".into(),
            extension: "png".into(),
            visibility: Visibility::Public,
            url: Some("https://example.com/a.png".into()),
            etag: Some("etag-1".into()),
            optimized: vec![OptimizedVariant {
                id: 10,
                upload_id: 1,
                sha1: "abcdef0123456789abcdef0123456789abcdef01".into(),
                extension: "png".into(),
                version: 1,
                width: 10,
                height: 10,
                url: None,
                etag: None,
            }],
        };
        let pending = Upload {
            id: 2,
            url: None,
            etag: None,
            optimized: vec![],
            ..stored.clone()
        };

        let resolver = KeyResolver::default();
        let uploads = InMemoryCatalog::from_uploads(&resolver, &[stored.clone(), pending]);
        assert_eq!(uploads.records().len(), 1);
        assert_eq!(uploads.records()[0].key, resolver.path_for_upload(&stored).into_string());

        let variants = InMemoryCatalog::from_variants(&resolver, &[stored]);
        assert!(variants.records().is_empty());
        assert_eq!(variants.name(), "optimized");
    }

    #[test]
    fn etags_compare_unquoted() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("abc"), "abc");
    }
}
