//! HTTP surface of the ID service.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env parsing and startup validation.
//! - [`routes`] - axum router, shared state and handlers.
//! - [`error`] - request errors and their JSON responses.
//! - [`telemetry`] - log subscriber setup.

pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;
