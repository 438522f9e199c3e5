use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use url::Url;

const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(300);
const DEFAULT_TOMBSTONE_GRACE_DAYS: u32 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required setting `{0}` is missing")]
    Missing(&'static str),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("`{name}` is not a valid absolute URL: {value}")]
    InvalidUrl { name: &'static str, value: String },
    #[error("tenant `{0}` must be a single non-empty path segment")]
    InvalidTenant(String),
}

/// Immutable settings for the storage engine, built once at startup and
/// shared by reference.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub bucket_name: String,

    /// Sub-path inside the bucket, without leading or trailing slashes.
    pub bucket_folder: Option<String>,

    /// Absolute URL objects are served from; object URLs are
    /// `{base_url}/{key}`.
    pub base_url: Url,

    /// Rewrite target for public reads.
    pub cdn_url: Option<Url>,

    /// Set in multi-tenant deployments; namespaces keys and tombstones.
    pub tenant: Option<String>,

    pub presign_expiry: Duration,

    pub tombstone_grace_days: u32,
}

impl StoreConfig {
    /// `bucket` may carry a folder: `my-bucket/site/assets`.
    pub fn new(bucket: &str, base_url: &str) -> Result<Self, ConfigError> {
        let bucket = bucket.trim().trim_matches('/');
        if bucket.is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        let (name, folder) = match bucket.split_once('/') {
            Some((name, folder)) => (name, Some(folder.trim_matches('/').to_string())),
            None => (bucket, None),
        };
        validate_bucket_name(name)?;

        Ok(Self {
            bucket_name: name.to_string(),
            bucket_folder: folder.filter(|f| !f.is_empty()),
            base_url: parse_absolute_url("base_url", base_url)?,
            cdn_url: None,
            tenant: None,
            presign_expiry: DEFAULT_PRESIGN_EXPIRY,
            tombstone_grace_days: DEFAULT_TOMBSTONE_GRACE_DAYS,
        })
    }

    pub fn with_cdn_url(mut self, cdn_url: &str) -> Result<Self, ConfigError> {
        self.cdn_url = Some(parse_absolute_url("cdn_url", cdn_url)?);
        Ok(self)
    }

    pub fn with_tenant(mut self, tenant: &str) -> Result<Self, ConfigError> {
        if tenant.is_empty() || tenant.contains('/') || tenant == "." || tenant == ".." {
            return Err(ConfigError::InvalidTenant(tenant.to_string()));
        }
        self.tenant = Some(tenant.to_string());
        Ok(self)
    }

    pub fn with_presign_expiry(mut self, expiry: Duration) -> Self {
        self.presign_expiry = expiry;
        self
    }

    pub fn with_tombstone_grace_days(mut self, days: u32) -> Self {
        self.tombstone_grace_days = days;
        self
    }
}

/// Settings for the bundled disk + SQLite object service.
#[derive(Debug, Clone)]
pub struct LocalClientConfig {
    pub bucket: String,
    pub storage_dir: PathBuf,
    pub database_path: PathBuf,

    /// Public endpoint presigned URLs point at, e.g. `http://127.0.0.1:3000`.
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub client: LocalClientConfig,
    pub store: StoreConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload storage layer and local object service")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_STORE_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_STORE_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Bucket, optionally with a folder: `name/folder` (overrides UPLOAD_STORE_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Directory where object payloads are stored (overrides UPLOAD_STORE_STORAGE_DIR)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// SQLite database file (overrides UPLOAD_STORE_DATABASE_PATH)
    #[arg(long, global = true)]
    pub database_path: Option<PathBuf>,

    /// Endpoint presigned URLs point at (overrides UPLOAD_STORE_ENDPOINT)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Base URL of stored objects (overrides UPLOAD_STORE_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// CDN URL for public reads (overrides UPLOAD_STORE_CDN_URL)
    #[arg(long, global = true)]
    pub cdn_url: Option<String>,

    /// Tenant namespace (overrides UPLOAD_STORE_TENANT)
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the local object service
    Serve,

    /// Apply the SQLite schema and exit
    Migrate,

    /// Report catalog records whose objects are missing from the store
    Reconcile {
        /// JSON array of catalog records for primary uploads
        #[arg(long)]
        uploads_catalog: PathBuf,

        /// JSON array of catalog records for optimized variants
        #[arg(long)]
        optimized_catalog: Option<PathBuf>,

        /// Skip the optimized-variant scan
        #[arg(long)]
        skip_optimized: bool,
    },

    /// Install the tombstone expiry rule
    Lifecycle {
        /// Grace period in days (overrides UPLOAD_STORE_TOMBSTONE_GRACE_DAYS)
        #[arg(long)]
        grace_days: Option<u32>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let host = args
            .host
            .unwrap_or_else(|| env::var("UPLOAD_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into()));
        let port = match args.port {
            Some(port) => port,
            None => env_parse("UPLOAD_STORE_PORT", 3000)?,
        };
        let bucket = args.bucket.unwrap_or_else(|| {
            env::var("UPLOAD_STORE_BUCKET").unwrap_or_else(|_| "uploads".into())
        });
        let storage_dir = args.storage_dir.unwrap_or_else(|| {
            env::var("UPLOAD_STORE_STORAGE_DIR")
                .unwrap_or_else(|_| "./data/objects".into())
                .into()
        });
        let database_path = args.database_path.unwrap_or_else(|| {
            env::var("UPLOAD_STORE_DATABASE_PATH")
                .unwrap_or_else(|_| "./data/meta/upload_store.db".into())
                .into()
        });
        let endpoint = args.endpoint.unwrap_or_else(|| {
            env::var("UPLOAD_STORE_ENDPOINT")
                .unwrap_or_else(|_| format!("http://127.0.0.1:{}", port))
        });

        let access_key = required_env("UPLOAD_STORE_ACCESS_KEY")?;
        let secret_key = required_env("UPLOAD_STORE_SECRET_KEY")?;

        let mut store = StoreConfig::new(
            &bucket,
            &args
                .base_url
                .or_else(|| env::var("UPLOAD_STORE_BASE_URL").ok())
                .unwrap_or_else(|| {
                    let name = bucket.trim_matches('/').split('/').next().unwrap_or_default();
                    format!("{}/{}", endpoint.trim_end_matches('/'), name)
                }),
        )?
        .with_presign_expiry(Duration::from_secs(env_parse(
            "UPLOAD_STORE_PRESIGN_EXPIRY_SECS",
            DEFAULT_PRESIGN_EXPIRY.as_secs(),
        )?))
        .with_tombstone_grace_days(env_parse(
            "UPLOAD_STORE_TOMBSTONE_GRACE_DAYS",
            DEFAULT_TOMBSTONE_GRACE_DAYS,
        )?);
        if let Some(cdn) = args.cdn_url.or_else(|| env::var("UPLOAD_STORE_CDN_URL").ok()) {
            store = store.with_cdn_url(&cdn)?;
        }
        if let Some(tenant) = args.tenant.or_else(|| env::var("UPLOAD_STORE_TENANT").ok()) {
            store = store.with_tenant(&tenant)?;
        }

        let client = LocalClientConfig {
            bucket: store.bucket_name.clone(),
            storage_dir,
            database_path,
            endpoint,
            region: env::var("UPLOAD_STORE_REGION").unwrap_or_else(|_| "us-east-1".into()),
            access_key,
            secret_key,
        };

        Ok((
            Self {
                host,
                port,
                client,
                store,
            },
            args.command,
        ))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn required_env(name: &'static str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name).into()),
    }
}

fn parse_absolute_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
    };
    let url = Url::parse(value.trim_end_matches('/')).map_err(|_| invalid())?;
    if url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(url)
}

/// Validate bucket name format.
///
/// Enforces S3-like naming rules:
/// - 3–63 characters
/// - lowercase letters, digits, dots, hyphens only
/// - cannot start/end with dot or hyphen
/// - cannot contain consecutive dots or dot-hyphen patterns
/// - cannot look like an IPv4 address
pub fn validate_bucket_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidBucketName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let len = name.len();
    if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
        return Err(invalid("must be between 3 and 63 characters"));
    }
    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(
            "allowed characters are lowercase letters, digits, dots, and hyphens",
        ));
    }
    if name.starts_with('.') || name.ends_with('.') || name.starts_with('-') || name.ends_with('-')
    {
        return Err(invalid("must start and end with a lowercase letter or digit"));
    }
    if name.contains("..") || name.contains("-.") || name.contains(".-") {
        return Err(invalid(
            "cannot contain consecutive dots or dot-hyphen combinations",
        ));
    }
    if is_ipv4_like(name) {
        return Err(invalid("must not be formatted like an IP address"));
    }
    Ok(())
}

/// Check if a string matches IPv4-like dotted decimal form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4 && parts.iter().all(|segment| segment.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_folder_is_split_off() {
        let cfg =
            StoreConfig::new("my-bucket/site/assets/", "https://example.com/uploads").unwrap();
        assert_eq!(cfg.bucket_name, "my-bucket");
        assert_eq!(cfg.bucket_folder.as_deref(), Some("site/assets"));
        assert_eq!(cfg.base_url.as_str(), "https://example.com/uploads");

        let cfg = StoreConfig::new("my-bucket", "https://example.com").unwrap();
        assert_eq!(cfg.bucket_folder, None);
    }

    #[test]
    fn missing_or_invalid_settings_are_configuration_errors() {
        assert_eq!(
            StoreConfig::new("  ", "https://example.com").unwrap_err(),
            ConfigError::Missing("bucket")
        );
        assert!(matches!(
            StoreConfig::new("Bad_Bucket", "https://example.com"),
            Err(ConfigError::InvalidBucketName { .. })
        ));
        assert!(matches!(
            StoreConfig::new("bucket", "not a url"),
            Err(ConfigError::InvalidUrl { name: "base_url", .. })
        ));
        let cfg = StoreConfig::new("bucket", "https://example.com").unwrap();
        assert!(cfg.clone().with_tenant("a/b").is_err());
        assert!(cfg.with_cdn_url("cdn.example.com").is_err());
    }

    #[test]
    fn bucket_names_follow_s3_rules() {
        assert!(validate_bucket_name("uploads").is_ok());
        assert!(validate_bucket_name("my.bucket-1").is_ok());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("192.168.1.1").is_err());
    }
}
