//! Session API for flowq scripts.
//!
//! Aliases are defined with [`DataFrame`] builders and [`expr`] helpers, then
//! stored or opened through an [`Engine`], interactively or as one batch.

mod planner_facade;
mod runtime;
mod session;

pub mod dataframe;
pub mod engine;
pub mod expr;
pub mod tuples;

pub use dataframe::{typed_schema, untyped_schema, DataFrame};
pub use engine::Engine;
pub use expr::*;
pub use flowq_execution::OutputResult;
pub use tuples::render_tuples;

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}
