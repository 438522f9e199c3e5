//! HTTP handlers for object reads and presigned writes.
//!
//! Bodies are streamed in both directions. Reads are allowed for
//! `public-read` objects or with a valid presigned query; writes always need
//! a presigned PUT, either a whole object or one part of a multipart upload.

use crate::{
    errors::AppError,
    models::object::{Acl, StoredObject},
    services::{
        local_client::LocalObjectClient,
        object_client::{ObjectClient, PutOptions},
        presign::{HttpMethod, PresignError, SIGNATURE_PARAM},
    },
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use futures::StreamExt;
use std::{collections::BTreeMap, io};
use tracing::debug;

const META_PREFIX: &str = "x-amz-meta-";
const DISPOSITION_OVERRIDE: &str = "response-content-disposition";

type ObjectQuery = BTreeMap<String, String>;

/// How a read was authorised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadAccess {
    Public,
    Signed,
}

/// `GET /{bucket}/{*key}`
pub async fn get_object(
    State(client): State<LocalObjectClient>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    ensure_bucket(&client, &bucket)?;
    let access = authorize_read(&client, HttpMethod::Get, &bucket, &key, &query, &headers).await?;

    let (meta, body) = client.get_object(&key).await?;
    let mut response = Response::new(Body::from_stream(body));
    set_object_headers(response.headers_mut(), &meta, signed_override(&query, access));
    Ok(response)
}

/// `HEAD /{bucket}/{*key}`: same headers as GET, no body. Presigned GET
/// URLs are accepted too.
pub async fn head_object(
    State(client): State<LocalObjectClient>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    ensure_bucket(&client, &bucket)?;
    let head = authorize_read(&client, HttpMethod::Head, &bucket, &key, &query, &headers).await;
    let access = match head {
        Err(err) if err.code == "SignatureDoesNotMatch" => {
            authorize_read(&client, HttpMethod::Get, &bucket, &key, &query, &headers).await?
        }
        other => other?,
    };

    let meta = client.head_object(&key).await?;
    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta, signed_override(&query, access));
    Ok(response)
}

/// `PUT /{bucket}/{*key}`, or `?partNumber=&uploadId=` for a part.
///
/// `x-amz-meta-*` query parameters become object metadata.
pub async fn put_object(
    State(client): State<LocalObjectClient>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<ObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    ensure_bucket(&client, &bucket)?;
    if !query.contains_key(SIGNATURE_PARAM) {
        return Err(AppError::forbidden("writes require a presigned URL"));
    }
    let host = host_header(&headers)?;
    client.verify_presigned(HttpMethod::Put, host, &object_path(&bucket, &key), &query)?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other))
        .boxed();

    let etag = match (query.get("uploadId"), query.get("partNumber")) {
        (Some(upload_id), Some(part_number)) => {
            let part_number: i32 = part_number.parse().map_err(|_| {
                AppError::bad_request(
                    "InvalidArgument",
                    format!("bad partNumber `{}`", part_number),
                )
            })?;
            client.upload_part(&key, upload_id, part_number, stream).await?.etag
        }
        (None, None) => {
            let options = PutOptions {
                content_type: headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                acl: Acl::Private,
                metadata: metadata_from_query(&query),
                ..PutOptions::default()
            };
            client.put_object(&key, stream, options).await?.etag
        }
        _ => {
            return Err(AppError::bad_request(
                "InvalidArgument",
                "uploadId and partNumber must be given together",
            ));
        }
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::OK;
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
        response.headers_mut().insert(header::ETAG, value);
    }
    Ok(response)
}

fn ensure_bucket(client: &LocalObjectClient, bucket: &str) -> Result<(), AppError> {
    if client.bucket() == bucket {
        Ok(())
    } else {
        Err(AppError::not_found("NoSuchBucket", format!("bucket `{}` not found", bucket)))
    }
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("/{}/{}", bucket, key)
}

fn host_header(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::bad_request("InvalidRequest", "missing Host header"))
}

async fn authorize_read(
    client: &LocalObjectClient,
    method: HttpMethod,
    bucket: &str,
    key: &str,
    query: &ObjectQuery,
    headers: &HeaderMap,
) -> Result<ReadAccess, AppError> {
    if query.contains_key(SIGNATURE_PARAM) {
        let host = host_header(headers)?;
        client
            .verify_presigned(method, host, &object_path(bucket, key), query)
            .map_err(AppError::from)?;
        return Ok(ReadAccess::Signed);
    }

    let acl = client.get_acl(key).await?;
    if acl == Acl::PublicRead {
        Ok(ReadAccess::Public)
    } else {
        debug!("unsigned read of private object {}", key);
        Err(PresignError::MissingParameter(SIGNATURE_PARAM).into())
    }
}

/// A signed `response-content-disposition` replaces the stored one.
fn signed_override(query: &ObjectQuery, access: ReadAccess) -> Option<&str> {
    match access {
        ReadAccess::Signed => query.get(DISPOSITION_OVERRIDE).map(String::as_str),
        ReadAccess::Public => None,
    }
}

fn metadata_from_query(query: &ObjectQuery) -> BTreeMap<String, String> {
    query
        .iter()
        .filter_map(|(k, v)| {
            k.to_ascii_lowercase()
                .strip_prefix(META_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect()
}

fn set_object_headers(headers: &mut HeaderMap, meta: &StoredObject, disposition: Option<&str>) {
    let content_type = meta
        .content_type
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size_bytes.max(0)));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }
    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let optional = [
        (header::CACHE_CONTROL, meta.cache_control.as_deref()),
        (
            header::CONTENT_DISPOSITION,
            disposition.or(meta.content_disposition.as_deref()),
        ),
    ];
    for (name, value) in optional {
        if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }

    for (name, value) in &meta.metadata {
        let name = HeaderName::from_bytes(format!("{}{}", META_PREFIX, name).as_bytes());
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_is_taken_from_amz_meta_params() {
        let query: ObjectQuery = [
            ("X-Amz-Meta-Sha1-Checksum", "abc"),
            ("x-amz-meta-", "ignored"),
            ("X-Amz-Date", "20250101T000000Z"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let metadata = metadata_from_query(&query);
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["sha1-checksum"], "abc");
    }

    #[test]
    fn disposition_override_needs_signature() {
        let query: ObjectQuery = [(DISPOSITION_OVERRIDE.to_string(), "attachment".to_string())]
            .into_iter()
            .collect();
        assert_eq!(signed_override(&query, ReadAccess::Signed), Some("attachment"));
        assert_eq!(signed_override(&query, ReadAccess::Public), None);
    }
}
