mod common;

use common::*;
use std::sync::Arc;
use upload_store::{
    models::catalog::CatalogRecord,
    services::{
        object_client::SharedClient,
        reconcile::{Catalog, InMemoryCatalog, ReconciliationScanner},
        s3_store::S3Store,
    },
};

fn record(id: i64, key: &str, etag: &str) -> CatalogRecord {
    CatalogRecord {
        id,
        key: key.into(),
        etag: etag.into(),
        url: format!("{}/uploads/mysite/{}", ENDPOINT, key),
    }
}

#[tokio::test]
async fn reports_records_without_a_matching_remote_object() {
    let h = harness(site_config()).await;
    let a = put(&h.client, "mysite/original/1X/a.png", b"a").await;
    let b = put(&h.client, "mysite/original/1X/b.png", b"b").await;
    let c = put(&h.client, "mysite/original/1X/c.png", b"c").await;
    // outside the scanned prefix
    put(&h.client, "mysite/optimized/1X/a_1_10x10.png", b"v").await;

    let catalog = InMemoryCatalog::new(
        "uploads",
        vec![
            record(1, "original/1X/a.png", &a.etag),
            record(2, "original/1X/b.png", &format!("\"{}\"", b.etag)),
            record(3, "original/1X/c.png", &c.etag),
            record(4, "original/1X/d.png", &a.etag),
        ],
    );

    let report = ReconciliationScanner::new(&h.store)
        .with_page_size(2)
        .scan("original/", &catalog)
        .await
        .unwrap();

    assert_eq!(report.listed, 3);
    assert_eq!(report.verified, 3);
    assert_eq!(report.missing_count(), 1);
    assert_eq!(report.missing[0].id, 4);
}

#[tokio::test]
async fn etag_mismatch_counts_as_missing() {
    let h = harness(site_config()).await;
    put(&h.client, "mysite/original/1X/a.png", b"new content").await;

    let catalog = InMemoryCatalog::new(
        "uploads",
        vec![record(1, "original/1X/a.png", "0123456789abcdef0123456789abcdef")],
    );
    let report = ReconciliationScanner::new(&h.store)
        .scan("original/", &catalog)
        .await
        .unwrap();
    assert_eq!(report.missing_count(), 1);
}

#[tokio::test]
async fn empty_catalog_reports_nothing() {
    let h = harness(site_config()).await;
    put(&h.client, "mysite/original/1X/a.png", b"a").await;

    let catalog = InMemoryCatalog::new("uploads", vec![]);
    let report = ReconciliationScanner::new(&h.store)
        .scan("original/", &catalog)
        .await
        .unwrap();
    assert_eq!(report.missing_count(), 0);
    assert_eq!(report.listed, 1);
}

#[tokio::test]
async fn listing_failure_aborts_only_its_catalog() {
    let h = harness(site_config()).await;
    let a = put(&h.client, "mysite/original/1X/a.png", b"a").await;

    let mut faulty = FaultyClient::new(h.client.clone());
    faulty.fail_list_under = Some("optimized/".into());
    let store = S3Store::new(Arc::new(faulty) as SharedClient, site_config());

    let uploads = InMemoryCatalog::new("uploads", vec![record(1, "original/1X/a.png", &a.etag)]);
    let optimized = InMemoryCatalog::new(
        "optimized",
        vec![record(10, "optimized/1X/a_1_10x10.png", "x")],
    );

    let summary = ReconciliationScanner::new(&store)
        .run(&uploads, Some(&optimized as &dyn Catalog))
        .await;

    assert_eq!(summary.uploads.unwrap().missing_count(), 0);
    assert!(summary.optimized.unwrap().is_err());
}

#[tokio::test]
async fn catalogs_load_from_json() {
    let h = harness(site_config()).await;
    let path = h.dir.path().join("uploads.json");
    let records = vec![record(1, "original/1X/a.png", "abc")];
    tokio::fs::write(&path, serde_json::to_vec(&records).unwrap())
        .await
        .unwrap();

    let catalog = InMemoryCatalog::from_json_file("uploads", &path).await.unwrap();
    assert_eq!(catalog.records(), records.as_slice());

    tokio::fs::write(&path, b"{not json").await.unwrap();
    assert!(InMemoryCatalog::from_json_file("uploads", &path).await.is_err());
}
