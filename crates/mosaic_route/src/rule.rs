//! Static sharding configuration: which physical targets each logical
//! table spreads over, and the strategy that picks targets from condition
//! values. Strategy implementations are plugins; routing only sees the
//! `ShardingStrategy` capability.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::context::ShardingValues;

/// One physical target: a (data source, physical table) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }
}

/// Resolves condition values to physical-target indexes. Implementations
/// may reject condition shapes they do not support (e.g. a range condition
/// against an exact-match hash strategy) by returning `Err` with the
/// human-readable reason; routing wraps it into a `RouteError`.
pub trait ShardingStrategy: Send + Sync {
    fn resolve(&self, values: &ShardingValues) -> Result<BTreeSet<usize>, String>;
}

/// Distribution of one logical table.
pub struct TableRule {
    pub logical_table: String,
    /// Physical targets; the vector index is the strategy's target index.
    pub targets: Vec<DataNode>,
    /// Column whose condition values drive target selection.
    pub sharding_column: String,
    pub strategy: Arc<dyn ShardingStrategy>,
}

impl std::fmt::Debug for TableRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRule")
            .field("logical_table", &self.logical_table)
            .field("targets", &self.targets)
            .field("sharding_column", &self.sharding_column)
            .finish_non_exhaustive()
    }
}

/// Static sharding configuration for one logical schema.
///
/// A table absent from `tables` is un-sharded: it routes to the default
/// data source under its own name, or routing fails when no default is
/// configured.
#[derive(Debug, Default)]
pub struct ShardingRule {
    pub tables: HashMap<String, TableRule>,
    /// Groups of logical tables guaranteed to be co-partitioned
    /// identically. Routing computes targets once per group.
    pub binding_groups: Vec<Vec<String>>,
    pub default_data_source: Option<String>,
}

impl ShardingRule {
    pub fn table_rule(&self, logical_table: &str) -> Option<&TableRule> {
        self.tables.get(logical_table)
    }

    /// The binding group containing `logical_table`, if any.
    pub fn binding_group_of(&self, logical_table: &str) -> Option<&[String]> {
        self.binding_groups
            .iter()
            .find(|g| g.iter().any(|t| t == logical_table))
            .map(|g| g.as_slice())
    }

    /// True when both tables belong to one binding group.
    pub fn is_binding_pair(&self, a: &str, b: &str) -> bool {
        self.binding_group_of(a)
            .is_some_and(|g| g.iter().any(|t| t == b))
    }
}
