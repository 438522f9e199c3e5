//! Core data models for the upload storage layer.
//!
//! `upload` holds the caller-owned domain entities; `object` and `multipart`
//! describe what the remote store keeps. Store-side records map to SQLite
//! rows via `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod catalog;
pub mod multipart;
pub mod object;
pub mod upload;
