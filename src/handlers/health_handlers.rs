//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, no I/O
//! - GET /readyz   -> metadata database and object directory checks

use crate::services::local_client::LocalObjectClient;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::BTreeMap, path::Path};
use tokio::fs;
use uuid::Uuid;

const SENTINEL_BYTES: &[u8] = b"readyz";

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise. The body lists each check.
pub async fn readyz(State(client): State<LocalObjectClient>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", check_database(&client).await);
    checks.insert("disk", check_object_dir(&client.base_path).await);

    let ready = checks.values().all(|c| c.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "error" },
            checks,
        }),
    )
}

async fn check_database(client: &LocalObjectClient) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lifecycle_rules")
        .fetch_one(&*client.db)
        .await
    {
        Ok(_) => CheckStatus::passed(),
        Err(e) => CheckStatus::failed(format!("query failed: {}", e)),
    }
}

/// Write, read back and remove a sentinel file under the object directory.
async fn check_object_dir(base_path: &Path) -> CheckStatus {
    let sentinel = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&sentinel, SENTINEL_BYTES).await {
        return CheckStatus::failed(format!("could not write sentinel: {}", e));
    }
    let outcome = match fs::read(&sentinel).await {
        Ok(bytes) if bytes == SENTINEL_BYTES => CheckStatus::passed(),
        Ok(_) => CheckStatus::failed("sentinel content mismatch".to_string()),
        Err(e) => CheckStatus::failed(format!("could not read sentinel: {}", e)),
    };
    let _ = fs::remove_file(&sentinel).await;
    outcome
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn passed() -> Self {
        Self { ok: true, error: None }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
