//! The logical cursor: one iterator over the merged result of a
//! multi-target query, with LIMIT/OFFSET applied after every other merge
//! step. Backend handles are released as soon as the cursor can prove it
//! will never pull another row, and exactly once overall.

use mosaic_common::{MergeConfig, MergeError, MosaicResult, OwnedRow};
use mosaic_exec::ResultHandle;
use mosaic_route::MergeDirective;

use crate::group::grouped_rows;
use crate::stream::OrderedStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    NotStarted,
    Streaming,
    Exhausted,
    Closed,
}

/// Row source behind the cursor, picked per statement shape.
#[derive(Debug)]
enum Inner {
    /// Per-target streams drained one after another, in route order.
    Concat {
        handles: Vec<Box<dyn ResultHandle>>,
        pos: usize,
    },
    /// Streaming k-way merge on the ORDER BY columns.
    Ordered(OrderedStream),
    /// Grouped and aggregated rows, fully materialized up front.
    Buffered(std::vec::IntoIter<OwnedRow>),
}

impl Inner {
    fn pull(&mut self) -> MosaicResult<Option<OwnedRow>> {
        match self {
            Inner::Concat { handles, pos } => {
                while *pos < handles.len() {
                    if let Some(row) = handles[*pos].next_row()? {
                        return Ok(Some(row));
                    }
                    *pos += 1;
                }
                Ok(None)
            }
            Inner::Ordered(stream) => stream.next(),
            Inner::Buffered(rows) => Ok(rows.next()),
        }
    }
}

#[derive(Debug)]
pub struct LogicalCursor {
    inner: Inner,
    state: CursorState,
    columns: Vec<String>,
    /// Rows still to drop before the first visible row.
    skip: usize,
    /// Rows still to emit; `None` means unlimited.
    remaining: Option<usize>,
    released: bool,
}

impl LogicalCursor {
    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next merged row, or `None` once the logical result set ends.
    /// Calling again after `close()` is an error; after exhaustion it
    /// keeps returning `None`.
    pub fn next_row(&mut self) -> MosaicResult<Option<OwnedRow>> {
        match self.state {
            CursorState::Closed => return Err(MergeError::CursorClosed.into()),
            CursorState::Exhausted => return Ok(None),
            CursorState::NotStarted | CursorState::Streaming => {}
        }
        self.state = CursorState::Streaming;
        loop {
            if self.remaining == Some(0) {
                self.state = CursorState::Exhausted;
                self.release();
                return Ok(None);
            }
            let pulled = match self.inner.pull() {
                Ok(pulled) => pulled,
                Err(e) => {
                    // A failed merge step poisons the cursor.
                    self.release();
                    self.state = CursorState::Closed;
                    return Err(e);
                }
            };
            let Some(row) = pulled else {
                self.state = CursorState::Exhausted;
                self.release();
                return Ok(None);
            };
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    // The last visible row: no further pulls can happen,
                    // so the backends are released before it is returned.
                    self.release();
                }
            }
            return Ok(Some(row));
        }
    }

    /// Idempotent. Releases all backend handles on first call.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            self.release();
            self.state = CursorState::Closed;
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match &mut self.inner {
            Inner::Concat { handles, .. } => {
                for handle in handles {
                    handle.close();
                }
            }
            Inner::Ordered(stream) => stream.close_all(),
            Inner::Buffered(_) => {}
        }
    }
}

impl Drop for LogicalCursor {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct MergeEngine {
    config: MergeConfig,
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Combine per-target result handles into one logical cursor,
    /// following the directive produced at route time. Takes ownership
    /// of every handle; each is closed exactly once, whether merging
    /// succeeds, fails, or the cursor is dropped half-read.
    pub fn merge(
        &self,
        mut handles: Vec<Box<dyn ResultHandle>>,
        directive: &MergeDirective,
    ) -> MosaicResult<LogicalCursor> {
        let mut columns: Vec<String> = handles
            .first()
            .map(|h| h.columns().to_vec())
            .unwrap_or_default();

        let grouped = !directive.group_by.is_empty() || !directive.aggregates.is_empty();
        let (inner, released) = if grouped {
            tracing::debug!(fan_out = handles.len(), strategy = "grouped", "merging");
            let result = grouped_rows(&mut handles, directive, self.config.max_rows_buffered);
            // Grouping drains the streams whole; the handles are done
            // regardless of the outcome.
            for handle in &mut handles {
                handle.close();
            }
            if let Some(visible) = directive.visible_columns {
                columns.truncate(visible);
            }
            (Inner::Buffered(result?.into_iter()), true)
        } else if !directive.order_by.is_empty() && handles.len() > 1 {
            tracing::debug!(fan_out = handles.len(), strategy = "ordered", "merging");
            (
                Inner::Ordered(OrderedStream::new(handles, directive.order_by.clone())),
                false,
            )
        } else {
            // Single target, or an unordered union: route order stands.
            tracing::debug!(fan_out = handles.len(), strategy = "concat", "merging");
            (Inner::Concat { handles, pos: 0 }, false)
        };

        let (skip, remaining) = match directive.limit {
            Some(limit) => (limit.offset, Some(limit.count)),
            None => (0, None),
        };
        Ok(LogicalCursor {
            inner,
            state: CursorState::NotStarted,
            columns,
            skip,
            remaining,
            released,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_common::Datum;
    use mosaic_exec::memory::MemoryDatabase;
    use mosaic_exec::ConnectionProvider;
    use mosaic_route::{AggFunc, AggregateItem, LimitValue, OrderByItem};

    fn int_rows(values: &[i64]) -> Vec<Vec<Datum>> {
        values.iter().map(|v| vec![Datum::Int64(*v)]).collect()
    }

    /// Three shards, each preloaded with already-sorted rows.
    fn three_shards(data: [&[i64]; 3]) -> (MemoryDatabase, Vec<Box<dyn ResultHandle>>) {
        let db = MemoryDatabase::new();
        let mut handles = Vec::new();
        for (i, values) in data.iter().enumerate() {
            let ds = format!("ds_{}", i);
            let table = format!("t_num_{}", i);
            db.add_table(&ds, &table, &["n"], int_rows(values));
            let conn = db.connection(&ds).unwrap();
            handles.push(
                conn.execute_query(&format!("SELECT n FROM {} ORDER BY n", table), &[])
                    .unwrap(),
            );
        }
        (db, handles)
    }

    fn collect(cursor: &mut LogicalCursor) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            out.push(match row.values[0] {
                Datum::Int64(v) => v,
                ref other => panic!("unexpected datum {:?}", other),
            });
        }
        out
    }

    #[test]
    fn ordered_merge_interleaves_sorted_shards() {
        let (_db, handles) = three_shards([&[1, 4, 7], &[2, 5, 8], &[3, 6, 9]]);
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: false }],
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(cursor.state(), CursorState::Exhausted);
    }

    #[test]
    fn descending_merge_reverses() {
        let (_db, handles) = three_shards([&[7, 4, 1], &[8, 5, 2], &[9, 6, 3]]);
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: true }],
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![9, 8, 7, 6, 5, 4, 3, 2, 1]);
    }

    #[test]
    fn limit_offset_applies_after_merge_and_stops_fetching() {
        // Shards hold {1,2}, {3,4}, {5,6}; LIMIT 2 OFFSET 3 over the
        // merged order must yield 4 and 5.
        let (db, handles) = three_shards([&[1, 2], &[3, 4], &[5, 6]]);
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: false }],
            limit: Some(LimitValue { offset: 3, count: 2 }),
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![4, 5]);

        let stats = db.stats();
        // No shard is drained past offset + count rows.
        for fetched in stats.rows_fetched.values() {
            assert!(*fetched <= 5, "fetched {} rows from one shard", fetched);
        }
        // Emitting the final visible row released every handle.
        assert_eq!(stats.closed_handles, 3);
        assert_eq!(stats.close_calls, 3);
    }

    #[test]
    fn equal_keys_keep_route_order() {
        let db = MemoryDatabase::new();
        db.add_table(
            "ds_0",
            "t_a",
            &["k", "src"],
            vec![vec![Datum::Int64(1), Datum::Text("first".into())]],
        );
        db.add_table(
            "ds_1",
            "t_b",
            &["k", "src"],
            vec![vec![Datum::Int64(1), Datum::Text("second".into())]],
        );
        let mut handles = Vec::new();
        for (ds, table) in [("ds_0", "t_a"), ("ds_1", "t_b")] {
            let conn = db.connection(ds).unwrap();
            handles.push(
                conn.execute_query(&format!("SELECT k, src FROM {}", table), &[])
                    .unwrap(),
            );
        }
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: false }],
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        let first = cursor.next_row().unwrap().unwrap();
        let second = cursor.next_row().unwrap().unwrap();
        assert_eq!(first.values[1], Datum::Text("first".into()));
        assert_eq!(second.values[1], Datum::Text("second".into()));
    }

    #[test]
    fn single_handle_passes_through_unchanged() {
        let (_db, mut handles) = three_shards([&[3, 1, 2], &[], &[]]);
        handles.truncate(1);
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &MergeDirective::default())
            .unwrap();
        // No directive: rows surface in backend order, untouched.
        assert_eq!(collect(&mut cursor), vec![3, 1, 2]);
    }

    #[test]
    fn unordered_union_concatenates_in_route_order() {
        let (db, handles) = three_shards([&[1, 2], &[3], &[4, 5]]);
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &MergeDirective::default())
            .unwrap();
        assert_eq!(collect(&mut cursor), vec![1, 2, 3, 4, 5]);
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 3);
        assert_eq!(stats.close_calls, 3);
    }

    #[test]
    fn grouped_avg_divides_global_sum_by_global_count() {
        // Partial rows: key, avg placeholder, sum, count.
        let db = MemoryDatabase::new();
        db.add_table(
            "ds_0",
            "t_g_0",
            &["k", "avg_v", "sum_v", "cnt_v"],
            vec![vec![
                Datum::Text("a".into()),
                Datum::Null,
                Datum::Float64(30.0),
                Datum::Int64(2),
            ]],
        );
        db.add_table(
            "ds_1",
            "t_g_1",
            &["k", "avg_v", "sum_v", "cnt_v"],
            vec![vec![
                Datum::Text("a".into()),
                Datum::Null,
                Datum::Float64(40.0),
                Datum::Int64(1),
            ]],
        );
        let mut handles = Vec::new();
        for (ds, table) in [("ds_0", "t_g_0"), ("ds_1", "t_g_1")] {
            let conn = db.connection(ds).unwrap();
            handles.push(
                conn.execute_query(&format!("SELECT ... FROM {}", table), &[])
                    .unwrap(),
            );
        }
        let directive = MergeDirective {
            group_by: vec![0],
            aggregates: vec![AggregateItem {
                func: AggFunc::Avg,
                index: 1,
                avg_parts: Some((2, 3)),
            }],
            visible_columns: Some(2),
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        assert_eq!(cursor.columns(), &["k".to_string(), "avg_v".to_string()]);
        let row = cursor.next_row().unwrap().unwrap();
        assert_eq!(row.values.len(), 2);
        assert_eq!(row.values[0], Datum::Text("a".into()));
        // 70 / 3, not the mean of the per-shard means 15 and 40.
        assert_eq!(row.values[1], Datum::Float64(70.0 / 3.0));
        assert_eq!(cursor.next_row().unwrap(), None);

        // Grouping closed the backends before the first fetch.
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 2);
        assert_eq!(stats.close_calls, 2);
    }

    #[test]
    fn merge_failure_closes_all_handles() {
        let db = MemoryDatabase::new();
        db.add_table(
            "ds_0",
            "t_m_0",
            &["v"],
            vec![vec![Datum::Int64(1)]],
        );
        db.add_table(
            "ds_1",
            "t_m_1",
            &["v"],
            vec![vec![Datum::Text("oops".into())]],
        );
        let mut handles = Vec::new();
        for (ds, table) in [("ds_0", "t_m_0"), ("ds_1", "t_m_1")] {
            let conn = db.connection(ds).unwrap();
            handles.push(
                conn.execute_query(&format!("SELECT v FROM {}", table), &[])
                    .unwrap(),
            );
        }
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: false }],
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        assert!(cursor.next_row().is_err());
        assert_eq!(cursor.state(), CursorState::Closed);
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 2);
        assert_eq!(stats.close_calls, 2);
    }

    #[test]
    fn close_is_idempotent_and_next_after_close_fails() {
        let (db, handles) = three_shards([&[1], &[2], &[3]]);
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &MergeDirective::default())
            .unwrap();
        assert_eq!(cursor.next_row().unwrap().unwrap().values[0], Datum::Int64(1));
        cursor.close();
        cursor.close();
        assert!(matches!(
            cursor.next_row(),
            Err(mosaic_common::MosaicError::Merge(MergeError::CursorClosed))
        ));
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 3);
        assert_eq!(stats.close_calls, 3);
    }

    #[test]
    fn dropping_a_half_read_cursor_releases_backends() {
        let (db, handles) = three_shards([&[1, 2], &[3, 4], &[5, 6]]);
        {
            let mut cursor = MergeEngine::new(MergeConfig::default())
                .merge(handles, &MergeDirective::default())
                .unwrap();
            let _ = cursor.next_row().unwrap();
        }
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 3);
        assert_eq!(stats.close_calls, 3);
    }

    #[test]
    fn buffer_limit_propagates_and_still_closes() {
        let (db, handles) = three_shards([&[1], &[2], &[3]]);
        let directive = MergeDirective {
            group_by: vec![0],
            ..MergeDirective::default()
        };
        let err = MergeEngine::new(MergeConfig { max_rows_buffered: 2 })
            .merge(handles, &directive)
            .unwrap_err();
        assert!(matches!(
            err,
            mosaic_common::MosaicError::Merge(MergeError::RowBufferExceeded { .. })
        ));
        let stats = db.stats();
        assert_eq!(stats.closed_handles, 3);
        assert_eq!(stats.close_calls, 3);
    }

    #[test]
    fn nulls_sort_first_ascending_in_merge() {
        let db = MemoryDatabase::new();
        db.add_table(
            "ds_0",
            "t_n_0",
            &["v"],
            vec![vec![Datum::Int64(1)], vec![Datum::Int64(2)]],
        );
        db.add_table(
            "ds_1",
            "t_n_1",
            &["v"],
            vec![vec![Datum::Null], vec![Datum::Int64(3)]],
        );
        let mut handles = Vec::new();
        for (ds, table) in [("ds_0", "t_n_0"), ("ds_1", "t_n_1")] {
            let conn = db.connection(ds).unwrap();
            handles.push(
                conn.execute_query(&format!("SELECT v FROM {}", table), &[])
                    .unwrap(),
            );
        }
        let directive = MergeDirective {
            order_by: vec![OrderByItem { index: 0, desc: false }],
            ..MergeDirective::default()
        };
        let mut cursor = MergeEngine::new(MergeConfig::default())
            .merge(handles, &directive)
            .unwrap();
        let mut got = Vec::new();
        while let Some(row) = cursor.next_row().unwrap() {
            got.push(row.values[0].clone());
        }
        assert_eq!(got.len(), 4);
        // SQL NULL never equals NULL, so the null head is checked by kind.
        assert!(got[0].is_null());
        assert_eq!(got[1], Datum::Int64(1));
        assert_eq!(got[2], Datum::Int64(2));
        assert_eq!(got[3], Datum::Int64(3));
    }
}
