//! Shared leaf types for the Mosaic sharding middleware: scalar values,
//! the error taxonomy, and configuration.

pub mod config;
pub mod datum;
pub mod error;

pub use config::{ExecutorConfig, MergeConfig, MosaicConfig};
pub use datum::{Datum, OwnedRow};
pub use error::{ExecError, MergeError, MosaicError, MosaicResult, RouteError, TargetFailure};
