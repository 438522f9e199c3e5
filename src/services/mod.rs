//! Storage layer services.
//!
//! `object_client` is the outbound contract to a remote store and
//! `local_client` its bundled disk + SQLite implementation. `s3_store` is the
//! engine built on top, with `key_resolver`, `tombstone` and `reconcile` as
//! its collaborators.

pub mod key_resolver;
pub mod local_client;
pub mod object_client;
pub mod presign;
pub mod reconcile;
pub mod s3_store;
pub mod tombstone;
