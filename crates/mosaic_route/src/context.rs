//! Parser-facing statement description. The SQL parser itself is an
//! external collaborator; routing consumes its output through these types
//! and never re-tokenizes the SQL text.

use mosaic_common::Datum;

/// Statement classification, as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// A byte range inside the logical SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlSpan {
    pub offset: usize,
    pub len: usize,
}

/// One occurrence of a logical table name in the SQL text, at the exact
/// position the parser recorded. Rewrite splices at these offsets rather
/// than string-replacing, so identical substrings inside literals are
/// never corrupted.
#[derive(Debug, Clone)]
pub struct TableToken {
    pub logical_name: String,
    pub span: SqlSpan,
}

/// Condition values handed to a sharding strategy.
#[derive(Debug, Clone)]
pub enum ShardingValues {
    /// Equality or IN list: the column equals one of these values.
    Exact(Vec<Datum>),
    /// BETWEEN, inclusive on both ends.
    Range { lower: Datum, upper: Datum },
}

/// One parsed predicate relevant to routing, keyed by table and column.
/// Parameter placeholders are already substituted with bound values.
#[derive(Debug, Clone)]
pub struct Condition {
    pub table: String,
    pub column: String,
    pub values: ShardingValues,
}

/// One ORDER BY item: result-column index plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderByItem {
    pub index: usize,
    pub desc: bool,
}

/// Aggregate function kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "SUM",
            AggFunc::Count => "COUNT",
            AggFunc::Min => "MIN",
            AggFunc::Max => "MAX",
            AggFunc::Avg => "AVG",
        }
    }
}

/// One aggregate selection. For AVG the rewriter appends derived SUM and
/// COUNT columns to the per-shard query; `avg_parts` records their
/// result-column indexes so the merge engine can reconstruct the true
/// average instead of averaging per-shard averages.
#[derive(Debug, Clone)]
pub struct AggregateItem {
    pub func: AggFunc,
    /// Result column holding the (partial) aggregate value.
    pub index: usize,
    /// (sum column, count column) for AVG reconstruction.
    pub avg_parts: Option<(usize, usize)>,
}

/// LIMIT/OFFSET literals plus the byte span of the whole clause, which the
/// router needs to rewrite the per-shard request to `LIMIT offset+count`.
#[derive(Debug, Clone)]
pub struct Limit {
    pub offset: usize,
    pub count: usize,
    pub span: SqlSpan,
}

/// Immutable description of one logical SQL statement and its
/// routing-relevant facts. Produced by the external parser.
#[derive(Debug, Clone)]
pub struct StatementContext {
    pub kind: StatementKind,
    /// Logical SQL text, table names still logical.
    pub sql: String,
    /// Table name occurrences in `sql`, in appearance order.
    pub tables: Vec<TableToken>,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<OrderByItem>,
    /// GROUP BY result-column indexes.
    pub group_by: Vec<usize>,
    pub aggregates: Vec<AggregateItem>,
    pub limit: Option<Limit>,
    /// Number of leading result columns visible to the caller; derived
    /// columns appended by the rewriter (AVG parts) sit beyond this.
    pub visible_columns: Option<usize>,
    /// Bound parameter sets. Queries carry at most one; batched updates
    /// carry one per logical row.
    pub param_sets: Vec<Vec<Datum>>,
}

impl StatementContext {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            tables: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            aggregates: Vec::new(),
            limit: None,
            visible_columns: None,
            param_sets: Vec::new(),
        }
    }

    /// Logical table names in first-appearance order, deduplicated.
    pub fn logical_tables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for token in &self.tables {
            if !seen.contains(&token.logical_name.as_str()) {
                seen.push(token.logical_name.as_str());
            }
        }
        seen
    }

    /// Condition on `table.column`, if the parser found one.
    pub fn condition(&self, table: &str, column: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.table == table && c.column == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_tables_dedup_preserves_order() {
        let mut ctx = StatementContext::new(
            StatementKind::Select,
            "SELECT * FROM t_order o JOIN t_order_item i ON o.id = i.order_id JOIN t_order x ON 1=1",
        );
        for (name, offset) in [("t_order", 14), ("t_order_item", 32), ("t_order", 70)] {
            ctx.tables.push(TableToken {
                logical_name: name.into(),
                span: SqlSpan {
                    offset,
                    len: name.len(),
                },
            });
        }
        assert_eq!(ctx.logical_tables(), vec!["t_order", "t_order_item"]);
    }
}
