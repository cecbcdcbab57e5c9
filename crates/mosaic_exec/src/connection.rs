//! Capability traits for the (external) connection layer. One flat trait
//! set replaces per-vendor connection class hierarchies; vendors are
//! selected by configuration behind `ConnectionProvider`, not by
//! inheritance.

use mosaic_common::{Datum, MosaicResult, OwnedRow};

/// Hands out live connections by data source identifier.
pub trait ConnectionProvider: Send + Sync {
    /// Returns a usable connection or a connectivity error, which the
    /// execution engine surfaces as part of the aggregated failure.
    fn connection(&self, data_source: &str) -> MosaicResult<Box<dyn ShardConnection>>;
}

/// One live backend connection, exclusively owned by the execution unit
/// that acquired it. Both operations consume the connection: a successful
/// query hands it off inside the returned `ResultHandle`; every other
/// outcome drops (releases) it.
pub trait ShardConnection: Send {
    fn execute_query(
        self: Box<Self>,
        sql: &str,
        params: &[Datum],
    ) -> MosaicResult<Box<dyn ResultHandle>>;

    /// Execute every parameter set as one batch round trip; returns the
    /// total affected-row count.
    fn execute_batch(self: Box<Self>, sql: &str, param_sets: &[Vec<Datum>]) -> MosaicResult<u64>;
}

/// Forward-only cursor over one physical result set. Owns the backing
/// connection/statement resources for its lifetime; `close` releases them
/// and must be safe to call more than once (callers close exactly once,
/// implementations tolerate repeats).
pub trait ResultHandle: Send + std::fmt::Debug {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> MosaicResult<Option<OwnedRow>>;

    fn close(&mut self);
}
