use thiserror::Error;

/// Convenience alias for `Result<T, MosaicError>`.
pub type MosaicResult<T> = Result<T, MosaicError>;

/// Top-level error type that all subsystem errors convert into.
#[derive(Error, Debug)]
pub enum MosaicError {
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Routing errors. These abort before any execution begins.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("Table {0} has no sharding rule and no default data source")]
    UnroutableTable(String),

    #[error("Unsupported condition on {table}.{column}: {reason}")]
    UnsupportedCondition {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Strategy for table {table} returned target index {index}, but only {targets} targets exist")]
    TargetIndexOutOfRange {
        table: String,
        index: usize,
        targets: usize,
    },

    #[error("Tables {tables:?} are sharded but not in one binding group; cross-shard Cartesian routing is not supported")]
    CartesianRouting { tables: Vec<String> },

    #[error("Rewrite token [{offset}, {offset}+{len}) out of bounds for SQL of {sql_len} bytes")]
    TokenOutOfBounds {
        offset: usize,
        len: usize,
        sql_len: usize,
    },
}

/// Identity and cause of one failed execution target.
#[derive(Debug, Clone)]
pub struct TargetFailure {
    pub data_source: String,
    pub actual_table: String,
    pub message: String,
}

impl std::fmt::Display for TargetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}: {}",
            self.data_source, self.actual_table, self.message
        )
    }
}

fn join_failures(failures: &[TargetFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Execution-engine errors. A multi-target statement reports either the
/// first failure or a composite of all failures, per the failure policy.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Cannot obtain connection for data source {data_source}: {reason}")]
    Connection { data_source: String, reason: String },

    #[error("Execution failed on {0}")]
    Target(TargetFailure),

    #[error("Execution failed on {} of {total} targets: {}", .failures.len(), join_failures(.failures))]
    Aggregate {
        total: usize,
        failures: Vec<TargetFailure>,
    },

    #[error("Execution worker panicked for target {data_source}.{actual_table}")]
    WorkerPanic {
        data_source: String,
        actual_table: String,
    },
}

/// Merge-engine errors. A merge error aborts the logical cursor and closes
/// every remaining underlying handle.
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("ORDER BY column {column} is not comparable: {left} vs {right}")]
    IncomparableOrderKey {
        column: usize,
        left: &'static str,
        right: &'static str,
    },

    #[error("Merge column {column} out of bounds for row of {width} columns")]
    ColumnOutOfBounds { column: usize, width: usize },

    #[error("Cannot combine {got} into {function} aggregate at column {column}")]
    AggregateTypeMismatch {
        function: &'static str,
        column: usize,
        got: &'static str,
    },

    #[error("Grouping merge aborted: {buffered} buffered rows exceed limit of {limit}")]
    RowBufferExceeded { buffered: usize, limit: usize },

    #[error("Logical cursor is closed")]
    CursorClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_enumerates_targets() {
        let err = ExecError::Aggregate {
            total: 3,
            failures: vec![
                TargetFailure {
                    data_source: "ds_0".into(),
                    actual_table: "t_order_0".into(),
                    message: "connection refused".into(),
                },
                TargetFailure {
                    data_source: "ds_1".into(),
                    actual_table: "t_order_1".into(),
                    message: "syntax error".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 of 3"));
        assert!(msg.contains("ds_0.t_order_0: connection refused"));
        assert!(msg.contains("ds_1.t_order_1: syntax error"));
    }

    #[test]
    fn subsystem_errors_convert_to_top_level() {
        let e: MosaicError = RouteError::UnroutableTable("t_missing".into()).into();
        assert!(matches!(e, MosaicError::Route(_)));
        let e: MosaicError = MergeError::CursorClosed.into();
        assert!(matches!(e, MosaicError::Merge(_)));
    }
}
