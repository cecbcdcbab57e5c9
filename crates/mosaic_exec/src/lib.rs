//! Parallel execution engine: issues routed statements concurrently
//! across backend connections with all-or-nothing partial-failure
//! semantics and strict resource cleanup.

pub mod connection;
pub mod engine;
pub mod memory;
pub mod policy;

pub use connection::{ConnectionProvider, ResultHandle, ShardConnection};
pub use engine::ExecutorEngine;
pub use policy::FailurePolicy;
