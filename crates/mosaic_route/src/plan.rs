//! Routing output: the deduplicated set of per-target executable
//! statements plus the directive the merge engine needs to reassemble one
//! logical result set.

use mosaic_common::Datum;

use crate::context::{AggregateItem, OrderByItem};

/// One fully resolved, per-target executable statement. Immutable once
/// produced; consumed exactly once by the execution engine.
#[derive(Debug, Clone)]
pub struct RouteUnit {
    pub data_source: String,
    pub actual_table: String,
    /// Rewritten SQL: physical table names, per-shard LIMIT.
    pub sql: String,
    /// One entry per execution; multiple entries batch on one target.
    pub param_sets: Vec<Vec<Datum>>,
}

impl RouteUnit {
    /// Parameters for the single-execution (query) path.
    pub fn params(&self) -> &[Datum] {
        self.param_sets.first().map(|p| p.as_slice()).unwrap_or(&[])
    }
}

/// True LIMIT/OFFSET to apply over the merged stream. Per-shard SQL was
/// rewritten to request `offset + count` rows with no shard-side offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitValue {
    pub offset: usize,
    pub count: usize,
}

/// Merge directives derived from the statement context at route time.
#[derive(Debug, Clone, Default)]
pub struct MergeDirective {
    pub order_by: Vec<OrderByItem>,
    pub group_by: Vec<usize>,
    pub aggregates: Vec<AggregateItem>,
    /// Set only when routing decided a merge-side LIMIT step is needed.
    pub limit: Option<LimitValue>,
    /// Columns visible to the caller; derived AVG columns sit beyond this.
    pub visible_columns: Option<usize>,
}

impl MergeDirective {
    /// True when the merge engine has any reordering/regrouping work to do
    /// beyond concatenating per-shard streams.
    pub fn is_trivial(&self) -> bool {
        self.order_by.is_empty()
            && self.group_by.is_empty()
            && self.aggregates.is_empty()
            && self.limit.is_none()
    }
}

/// The complete routing result for one logical statement.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub units: Vec<RouteUnit>,
    pub directive: MergeDirective,
}

impl RoutePlan {
    /// Number of physical targets this statement fans out to.
    pub fn fan_out(&self) -> usize {
        self.units.len()
    }
}
