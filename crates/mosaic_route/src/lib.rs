//! Routing engine: maps a parsed statement plus bound parameter values to
//! the concrete set of {data source, physical table} targets, rewrites the
//! SQL text per target, and derives the merge directive the result-set
//! merge engine will need.

pub mod context;
pub mod plan;
pub mod rewrite;
pub mod router;
pub mod rule;

pub use context::{
    AggFunc, AggregateItem, Condition, Limit, OrderByItem, ShardingValues, SqlSpan, StatementContext,
    StatementKind, TableToken,
};
pub use plan::{LimitValue, MergeDirective, RoutePlan, RouteUnit};
pub use router::route;
pub use rule::{DataNode, ShardingRule, ShardingStrategy, TableRule};
