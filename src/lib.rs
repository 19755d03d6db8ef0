//! Data access layer for the legal-services site.
//!
//! Reads go through a fingerprinted cache with request coalescing and
//! out-of-order protection; writes invalidate cached reads by tag. UI code
//! holds an [`ApiClient`] and subscribes to the queries it renders.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod infra;
pub mod transport;

pub use client::{ApiClient, CacheStats, QueryState, Watch};
pub use error::AppError;
pub use lexquery_api_types as types;
