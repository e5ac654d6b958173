//! Scriptorium: blog backend services.
//!
//! - [`cache`]: dependency-aware second-level cache for query results.
//! - [`drive`]: drive account binding and token refresh.
//! - [`infra`]: telemetry and the HTTP surface.

pub mod application;
pub mod cache;
pub mod config;
pub mod drive;
pub mod infra;
