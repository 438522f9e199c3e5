mod common;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use common::*;
use std::{collections::BTreeMap, time::Duration};
use tower::ServiceExt;
use upload_store::{
    models::{multipart::CompletedPart, upload::Visibility},
    routes::routes::routes,
    services::{
        object_client::{ClientError, ObjectClient},
        presign::HttpMethod,
        s3_store::{StoreError, UploadSource},
    },
};

fn app(h: &Harness) -> Router {
    routes().with_state(h.client.clone())
}

fn request(method: &str, url: &str, body: Body) -> Request<Body> {
    let uri = url.strip_prefix(ENDPOINT).unwrap_or(url);
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST)
        .body(body)
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn multipart_round_trip_over_presigned_urls() {
    let h = harness(site_config()).await;
    let session = h
        .store
        .create_multipart("big.bin", None, BTreeMap::new())
        .await
        .unwrap();

    let chunks: [&[u8]; 2] = [b"first chunk ", b"second chunk"];
    let mut completed = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let part_number = i as i32 + 1;
        let url = h.store.presign_part(&session, part_number).unwrap();
        let response = app(&h)
            .oneshot(request("PUT", &url, Body::from(chunk.to_vec())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();
        assert_eq!(etag, format!("\"{:x}\"", md5::compute(chunk)));
        completed.push(CompletedPart { part_number, etag });
    }

    let parts = h.store.list_parts(&session).await.unwrap();
    assert_eq!(parts.len(), 2);

    let object = h.store.complete_multipart(&session, &completed).await.unwrap();
    assert!(object.etag.ends_with("-2"));
    assert_eq!(object.size_bytes, 24);

    let url = h
        .client
        .presigned_url(&session.key, HttpMethod::Get, Duration::from_secs(60), &BTreeMap::new())
        .unwrap();
    let response = app(&h).oneshot(request("GET", &url, Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"first chunk second chunk");
}

#[tokio::test]
async fn completing_with_a_missing_part_is_rejected() {
    let h = harness(site_config()).await;
    let session = h
        .store
        .create_multipart("big.bin", None, BTreeMap::new())
        .await
        .unwrap();

    let url = h.store.presign_part(&session, 1).unwrap();
    let response = app(&h)
        .oneshot(request("PUT", &url, Body::from("only part")))
        .await
        .unwrap();
    let etag = response.headers()[header::ETAG].to_str().unwrap().to_string();

    let parts = vec![
        CompletedPart { part_number: 1, etag },
        CompletedPart {
            part_number: 2,
            etag: "\"00000000000000000000000000000000\"".into(),
        },
    ];
    let err = h.store.complete_multipart(&session, &parts).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Remote(ClientError::InvalidPart { part_number: 2, .. })
    ));

    h.store.abort_multipart(&session).await.unwrap();
    assert!(matches!(
        h.store.list_parts(&session).await,
        Err(StoreError::Remote(ClientError::NoSuchUpload(_)))
    ));
}

#[tokio::test]
async fn direct_upload_then_finalize() {
    let h = harness(site_config()).await;
    let metadata = BTreeMap::from([("sha1-checksum".to_string(), SHA1.to_string())]);
    let presigned = h
        .store
        .signed_url_for_temporary_upload("notes.txt", Duration::from_secs(60), &metadata)
        .unwrap();

    let response = app(&h)
        .oneshot(request("PUT", &presigned.url, Body::from("hello")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let temp = h.client.head_object(&presigned.key).await.unwrap();
    assert_eq!(temp.metadata.get("sha1-checksum").map(String::as_str), Some(SHA1));

    let upload = upload(11, "notes.txt", Visibility::Public);
    let stored = h
        .store
        .store(UploadSource::ExternalKey(presigned.key.clone()), &upload, None)
        .await
        .unwrap();

    // public objects are readable without a signature
    let response = app(&h)
        .oneshot(request("GET", &stored.url, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"notes.txt\""
    );
    assert_eq!(body_bytes(response).await, b"hello");
}

#[tokio::test]
async fn private_objects_need_a_valid_signature() {
    let h = harness(site_config()).await;
    let source = h.dir.path().join("secret.txt");
    tokio::fs::write(&source, b"secret").await.unwrap();
    let upload = upload(12, "secret.txt", Visibility::Private);
    let stored = h
        .store
        .store(UploadSource::File(source), &upload, None)
        .await
        .unwrap();

    let response = app(&h)
        .oneshot(request("GET", &stored.url, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let signed = h.store.url_for(&upload, true).unwrap();
    let response = app(&h)
        .oneshot(request("HEAD", &signed, Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&h).oneshot(request("GET", &signed, Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"secret.txt\""
    );

    let tampered = signed.replacen("secret.txt", "other.txt", 1);
    let response = app(&h).oneshot(request("GET", &tampered, Body::empty())).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app(&h)
        .oneshot(request("PUT", &stored.url, Body::from("overwrite")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_endpoints_report_ready() {
    let h = harness(site_config()).await;
    let response = app(&h)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&h)
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
