//! In-memory connection layer: a `ConnectionProvider` over preloaded
//! per-target row sets, with failure injection and open/close accounting.
//! Used by the engine and merge test suites in place of real backends;
//! rows are served in insertion order, so fixtures model shard-side
//! ORDER BY by preloading sorted data.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use mosaic_common::{Datum, ExecError, MosaicResult, OwnedRow, TargetFailure};

use crate::connection::{ConnectionProvider, ResultHandle, ShardConnection};

#[derive(Debug, Clone)]
struct TableData {
    columns: Vec<String>,
    rows: Vec<OwnedRow>,
}

/// Execution accounting, for assertions on resource discipline.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    /// (data source, sql) per query execution.
    pub queries: Vec<(String, String)>,
    /// (data source, parameter-set count) per batch execution.
    pub batches: Vec<(String, usize)>,
    pub opened_handles: usize,
    /// Handles whose close() was called at least once.
    pub closed_handles: usize,
    /// Total close() invocations; equals `opened_handles` when every
    /// handle was closed exactly once.
    pub close_calls: usize,
    /// Rows actually pulled per (data source, table).
    pub rows_fetched: HashMap<(String, String), usize>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<HashMap<(String, String), TableData>>,
    failing: Mutex<Vec<(String, String)>>,
    stats: Mutex<MemoryStats>,
}

/// The in-memory "cluster": tables keyed by (data source, physical table).
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(
        &self,
        data_source: &str,
        table: &str,
        columns: &[&str],
        rows: Vec<Vec<Datum>>,
    ) {
        self.inner.tables.lock().insert(
            (data_source.to_string(), table.to_string()),
            TableData {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: rows.into_iter().map(OwnedRow::new).collect(),
            },
        );
    }

    /// Make every statement against this target fail.
    pub fn fail_target(&self, data_source: &str, table: &str) {
        self.inner
            .failing
            .lock()
            .push((data_source.to_string(), table.to_string()));
    }

    pub fn stats(&self) -> MemoryStats {
        self.inner.stats.lock().clone()
    }
}

impl ConnectionProvider for MemoryDatabase {
    fn connection(&self, data_source: &str) -> MosaicResult<Box<dyn ShardConnection>> {
        let known = self
            .inner
            .tables
            .lock()
            .keys()
            .any(|(ds, _)| ds == data_source);
        if !known {
            return Err(ExecError::Connection {
                data_source: data_source.to_string(),
                reason: "unknown data source".into(),
            }
            .into());
        }
        Ok(Box::new(MemoryConnection {
            data_source: data_source.to_string(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryConnection {
    data_source: String,
    inner: Arc<Inner>,
}

impl MemoryConnection {
    /// Longest table name of this data source appearing in the SQL text.
    /// Longest wins so `t_order_1` is not mistaken for `t_order`.
    fn resolve_table(&self, sql: &str) -> MosaicResult<(String, TableData)> {
        let tables = self.inner.tables.lock();
        let best = tables
            .iter()
            .filter(|((ds, table), _)| ds == &self.data_source && sql.contains(table.as_str()))
            .max_by_key(|((_, table), _)| table.len());
        match best {
            Some(((_, table), data)) => Ok((table.clone(), data.clone())),
            None => Err(ExecError::Target(TargetFailure {
                data_source: self.data_source.clone(),
                actual_table: "<unresolved>".into(),
                message: format!("no table of {} matches statement", self.data_source),
            })
            .into()),
        }
    }

    fn check_failure(&self, table: &str) -> MosaicResult<()> {
        let failing = self.inner.failing.lock();
        if failing
            .iter()
            .any(|(ds, t)| ds == &self.data_source && t == table)
        {
            return Err(ExecError::Target(TargetFailure {
                data_source: self.data_source.clone(),
                actual_table: table.to_string(),
                message: "injected failure".into(),
            })
            .into());
        }
        Ok(())
    }
}

impl ShardConnection for MemoryConnection {
    fn execute_query(
        self: Box<Self>,
        sql: &str,
        _params: &[Datum],
    ) -> MosaicResult<Box<dyn ResultHandle>> {
        let (table, data) = self.resolve_table(sql)?;
        self.check_failure(&table)?;
        {
            let mut stats = self.inner.stats.lock();
            stats.queries.push((self.data_source.clone(), sql.to_string()));
            stats.opened_handles += 1;
        }
        Ok(Box::new(MemoryHandle {
            data_source: self.data_source.clone(),
            table,
            columns: data.columns,
            rows: data.rows,
            pos: 0,
            closed: false,
            inner: self.inner,
        }))
    }

    fn execute_batch(self: Box<Self>, sql: &str, param_sets: &[Vec<Datum>]) -> MosaicResult<u64> {
        let (table, _) = self.resolve_table(sql)?;
        self.check_failure(&table)?;
        self.inner
            .stats
            .lock()
            .batches
            .push((self.data_source.clone(), param_sets.len()));
        Ok(param_sets.len() as u64)
    }
}

#[derive(Debug)]
struct MemoryHandle {
    data_source: String,
    table: String,
    columns: Vec<String>,
    rows: Vec<OwnedRow>,
    pos: usize,
    closed: bool,
    inner: Arc<Inner>,
}

impl ResultHandle for MemoryHandle {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> MosaicResult<Option<OwnedRow>> {
        if self.closed || self.pos >= self.rows.len() {
            return Ok(None);
        }
        let row = self.rows[self.pos].clone();
        self.pos += 1;
        *self
            .inner
            .stats
            .lock()
            .rows_fetched
            .entry((self.data_source.clone(), self.table.clone()))
            .or_insert(0) += 1;
        Ok(Some(row))
    }

    fn close(&mut self) {
        let mut stats = self.inner.stats.lock();
        stats.close_calls += 1;
        if !self.closed {
            self.closed = true;
            stats.closed_handles += 1;
        }
    }
}
