//! Logical planning for flowq scripts.
//!
//! Architecture role:
//! - resolves relation schemas and rewrites scalar references into placeholders
//! - type-checks plans (analyzer) and deduplicates scalar side inputs per unit
//! - lowers compiled units to physical plans and stage DAGs
//!
//! Key modules:
//! - [`scalar_rewriter`]
//! - [`analyzer`]
//! - [`scalar_dedup`]
//! - [`unit`]
//! - [`physical_planner`]

pub mod analyzer;
pub mod explain;
pub mod logical_plan;
pub mod physical_plan;
pub mod physical_planner;
pub mod scalar_dedup;
pub mod scalar_rewriter;
pub mod schema_resolver;
pub mod stage;
pub mod unit;

pub use analyzer::*;
pub use explain::*;
pub use logical_plan::*;
pub use physical_plan::*;
pub use physical_planner::*;
pub use scalar_dedup::*;
pub use scalar_rewriter::*;
pub use schema_resolver::*;
pub use stage::*;
pub use unit::*;
