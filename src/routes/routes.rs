//! Routes of the bundled object service.
//!
//! - `GET  /healthz`, `GET /readyz`: health checks
//! - `PUT  /{bucket}/{*key}`: presigned upload, or one part with
//!   `?partNumber=&uploadId=`
//! - `GET  /{bucket}/{*key}`: download (public-read or presigned)
//! - `HEAD /{bucket}/{*key}`: metadata only
//!
//! The wildcard `*key` keeps nested keys like `site/original/1X/a/bc/x.png`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, head_object, put_object},
    },
    services::local_client::LocalObjectClient,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};

pub fn routes() -> Router<LocalObjectClient> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/{bucket}/{*key}",
            put(put_object).get(get_object).head(head_object),
        )
        .layer(DefaultBodyLimit::disable())
}
