//! Axum handlers for the bundled object service.

pub mod health_handlers;
pub mod object_handlers;
