//! Presigned URL generation and verification (AWS Signature Version 4,
//! query-string form).
//!
//! The signature covers the method, the path-style URI `/{bucket}/{key}`,
//! every query parameter except `X-Amz-Signature`, and the `host` header.
//! Payloads are `UNSIGNED-PAYLOAD`. Generation is a pure computation over
//! the credentials, so it is safe to call from any number of tasks.

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// HTTP methods supported for presigned URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Put,
    Head,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Maximum lifetime of a presigned URL (7 days).
pub const MAX_EXPIRES_SECONDS: u64 = 604_800;

const DEFAULT_EXPIRES_SECONDS: u64 = 3600;
const DEFAULT_REGION: &str = "us-east-1";
const SERVICE: &str = "s3";
const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";
pub const SIGNATURE_PARAM: &str = "X-Amz-Signature";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresignError {
    #[error("access key is required")]
    MissingAccessKey,
    #[error("secret key is required")]
    MissingSecretKey,
    #[error("bucket name is invalid")]
    InvalidBucket,
    #[error("object key is invalid")]
    InvalidKey,
    #[error("endpoint URL `{0}` is invalid")]
    InvalidEndpoint(String),
    #[error("presigned request is missing `{0}`")]
    MissingParameter(&'static str),
    #[error("presigned request is malformed: {0}")]
    Malformed(String),
    #[error("presigned request has expired")]
    Expired,
    #[error("access key `{0}` is not recognised")]
    UnknownAccessKey(String),
    #[error("the request signature does not match")]
    SignatureMismatch,
}

/// Builder for creating presigned URLs.
#[derive(Debug, Clone)]
pub struct PresignedUrlBuilder {
    endpoint: String,
    bucket: String,
    key: String,
    method: HttpMethod,
    expires_seconds: u64,
    access_key: String,
    secret_key: String,
    region: String,
    timestamp: Option<DateTime<Utc>>,
    params: BTreeMap<String, String>,
}

impl PresignedUrlBuilder {
    pub fn new(endpoint: &str, bucket: &str, key: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            key: key.trim_start_matches('/').to_string(),
            method: HttpMethod::Get,
            expires_seconds: DEFAULT_EXPIRES_SECONDS,
            access_key: String::new(),
            secret_key: String::new(),
            region: DEFAULT_REGION.to_string(),
            timestamp: None,
            params: BTreeMap::new(),
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Capped at [`MAX_EXPIRES_SECONDS`].
    pub fn expires_in_seconds(mut self, seconds: u64) -> Self {
        self.expires_seconds = seconds.min(MAX_EXPIRES_SECONDS);
        self
    }

    pub fn access_key(mut self, key: &str) -> Self {
        self.access_key = key.to_string();
        self
    }

    pub fn secret_key(mut self, key: &str) -> Self {
        self.secret_key = key.to_string();
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    /// Pin the signing time (tests).
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Add a signed query parameter such as `partNumber` or
    /// `response-content-disposition`.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.into());
        }
        self
    }

    pub fn build(self) -> Result<String, PresignError> {
        if self.access_key.is_empty() {
            return Err(PresignError::MissingAccessKey);
        }
        if self.secret_key.is_empty() {
            return Err(PresignError::MissingSecretKey);
        }
        if self.bucket.is_empty() {
            return Err(PresignError::InvalidBucket);
        }
        if self.key.is_empty() {
            return Err(PresignError::InvalidKey);
        }

        let host = extract_host(&self.endpoint)?;
        let now = self.timestamp.unwrap_or_else(Utc::now);
        let date_str = now.format("%Y%m%d").to_string();
        let amz_date = now.format(AMZ_DATE_FORMAT).to_string();
        let credential_scope = format!("{}/{}/{}/aws4_request", date_str, self.region, SERVICE);

        let mut query = self.params;
        query.insert("X-Amz-Algorithm".into(), ALGORITHM.into());
        query.insert(
            "X-Amz-Credential".into(),
            format!("{}/{}", self.access_key, credential_scope),
        );
        query.insert("X-Amz-Date".into(), amz_date.clone());
        query.insert("X-Amz-Expires".into(), self.expires_seconds.to_string());
        query.insert("X-Amz-SignedHeaders".into(), "host".into());

        let canonical_uri = uri_encode_path(&format!("/{}/{}", self.bucket, self.key));
        let canonical_query = build_canonical_query_string(&query);
        let signature = sign(
            &self.secret_key,
            &SigningInput {
                method: self.method,
                canonical_uri: &canonical_uri,
                canonical_query: &canonical_query,
                host: &host,
                amz_date: &amz_date,
                date: &date_str,
                region: &self.region,
            },
        );

        Ok(format!(
            "{}{}?{}&{}={}",
            self.endpoint, canonical_uri, canonical_query, SIGNATURE_PARAM, signature
        ))
    }
}

/// Credentials a verifier accepts.
#[derive(Debug, Clone)]
pub struct Credentials<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
}

/// Check a presigned request as received by the server.
///
/// `path` is the decoded `/{bucket}/{key}` path and `query` the decoded
/// query parameters, both exactly as the router extracted them.
pub fn verify(
    method: HttpMethod,
    host: &str,
    path: &str,
    query: &BTreeMap<String, String>,
    credentials: &Credentials<'_>,
    now: DateTime<Utc>,
) -> Result<(), PresignError> {
    let provided = query
        .get(SIGNATURE_PARAM)
        .ok_or(PresignError::MissingParameter(SIGNATURE_PARAM))?;
    let algorithm = required(query, "X-Amz-Algorithm")?;
    if algorithm != ALGORITHM {
        return Err(PresignError::Malformed(format!(
            "unsupported algorithm `{}`",
            algorithm
        )));
    }

    let credential = required(query, "X-Amz-Credential")?;
    let mut parts = credential.splitn(5, '/');
    let (Some(access_key), Some(date), Some(region), Some(SERVICE), Some("aws4_request")) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(PresignError::Malformed(format!(
            "bad credential scope `{}`",
            credential
        )));
    };
    if access_key != credentials.access_key {
        return Err(PresignError::UnknownAccessKey(access_key.to_string()));
    }

    let amz_date = required(query, "X-Amz-Date")?;
    let signed_at = NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT)
        .map_err(|err| PresignError::Malformed(format!("bad X-Amz-Date: {}", err)))?
        .and_utc();
    let expires: i64 = required(query, "X-Amz-Expires")?
        .parse()
        .map_err(|_| PresignError::Malformed("bad X-Amz-Expires".into()))?;
    if expires < 0 || expires as u64 > MAX_EXPIRES_SECONDS {
        return Err(PresignError::Malformed("X-Amz-Expires out of range".into()));
    }
    if now > signed_at + TimeDelta::seconds(expires) {
        return Err(PresignError::Expired);
    }

    let signed: BTreeMap<String, String> = query
        .iter()
        .filter(|(k, _)| k.as_str() != SIGNATURE_PARAM)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let canonical_uri = uri_encode_path(path);
    let canonical_query = build_canonical_query_string(&signed);
    let provided = hex::decode(provided).map_err(|_| PresignError::SignatureMismatch)?;
    signature_mac(
        credentials.secret_key,
        &SigningInput {
            method,
            canonical_uri: &canonical_uri,
            canonical_query: &canonical_query,
            host,
            amz_date,
            date,
            region,
        },
    )
    .verify_slice(&provided)
    .map_err(|_| PresignError::SignatureMismatch)
}

fn required<'a>(
    query: &'a BTreeMap<String, String>,
    name: &'static str,
) -> Result<&'a str, PresignError> {
    query
        .get(name)
        .map(String::as_str)
        .ok_or(PresignError::MissingParameter(name))
}

struct SigningInput<'a> {
    method: HttpMethod,
    canonical_uri: &'a str,
    canonical_query: &'a str,
    host: &'a str,
    amz_date: &'a str,
    date: &'a str,
    region: &'a str,
}

fn sign(secret_key: &str, input: &SigningInput<'_>) -> String {
    hex::encode(signature_mac(secret_key, input).finalize().into_bytes())
}

/// The final signing MAC, fed with the string to sign but not finalized.
/// Verification checks it in constant time.
fn signature_mac(secret_key: &str, input: &SigningInput<'_>) -> HmacSha256 {
    let canonical_request = format!(
        "{}\n{}\n{}\nhost:{}\n\nhost\nUNSIGNED-PAYLOAD",
        input.method.as_str(),
        input.canonical_uri,
        input.canonical_query,
        input.host
    );
    let scope = format!("{}/{}/{}/aws4_request", input.date, input.region, SERVICE);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        input.amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), input.date.as_bytes());
    let k_region = hmac_sha256(&k_date, input.region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let mut mac = HmacSha256::new_from_slice(&k_signing).expect("HMAC can take key of any size");
    mac.update(string_to_sign.as_bytes());
    mac
}

/// URI-encode a path, preserving slashes.
fn uri_encode_path(path: &str) -> String {
    encode(path, true)
}

/// URI-encode a query component.
pub fn uri_encode_value(value: &str) -> String {
    encode(value, false)
}

fn encode(input: &str, keep_slash: bool) -> String {
    use std::fmt::Write;
    let mut result = String::with_capacity(input.len() * 3);
    for b in input.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(b as char)
            }
            b'/' if keep_slash => result.push('/'),
            _ => {
                let _ = write!(result, "%{:02X}", b);
            }
        }
    }
    result
}

fn build_canonical_query_string(params: &BTreeMap<String, String>) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (uri_encode_value(k), uri_encode_value(v)))
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// `host[:port]` of an endpoint URL, as a client would send it.
pub fn extract_host(endpoint: &str) -> Result<String, PresignError> {
    let url = Url::parse(endpoint).map_err(|_| PresignError::InvalidEndpoint(endpoint.into()))?;
    let host = url
        .host_str()
        .ok_or_else(|| PresignError::InvalidEndpoint(endpoint.into()))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
