//! Shared configuration, error types, IDs, and observability primitives for flowq crates.
//!
//! Architecture role:
//! - defines engine/runtime configuration passed across layers
//! - provides the common [`FlowqError`] / [`Result`] contracts and stable [`ErrorCode`]s
//! - hosts prometheus-backed metrics
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::EngineConfig;
pub use error::{ErrorCode, FlowqError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;
