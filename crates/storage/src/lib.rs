//! In-memory load/store substrate for flowq.
//!
//! [`Catalog`] implements the execution crate's `TableSource` and
//! `TableSink`; stored outputs are kept as untyped text so reloading them
//! goes through the same declared-schema casts as any other load.

pub mod catalog;
pub mod mem_table;

pub use catalog::*;
pub use mem_table::*;
