//! Merge engine: combines per-target result sets into a single ordered,
//! grouped, limited, and aggregated logical cursor that reproduces
//! single-database SQL semantics over rows arriving from independent
//! shards.

pub mod compare;
pub mod cursor;
mod group;
mod stream;

pub use cursor::{CursorState, LogicalCursor, MergeEngine};
