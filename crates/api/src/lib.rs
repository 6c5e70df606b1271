// Test code patterns:
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Ridgeline API Library
//!
//! HTTP server components for the Ridgeline Consulting site: webhook intake,
//! contact form, checkout/portal session endpoints, and the internal
//! analytics dashboard.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
