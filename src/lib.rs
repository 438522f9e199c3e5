//! Object storage layer for user uploads.
//!
//! [`services::s3_store::S3Store`] is the entry point: it stores, removes,
//! copies and serves uploads through any [`services::object_client::ObjectClient`].
//! The crate also ships a local S3-style object service (disk + SQLite) with
//! its HTTP surface, used for development and tests.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
