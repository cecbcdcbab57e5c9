//! Scatter execution across route units. Single-target statements run
//! inline; multi-target statements fan out over a bounded set of scoped
//! worker threads. Every submitted unit runs to completion (or its own
//! failure) before the outcome is reported, so resources are always
//! released exactly once.

use mosaic_common::{ExecError, ExecutorConfig, MosaicResult, TargetFailure};
use mosaic_route::RouteUnit;

use crate::connection::{ConnectionProvider, ResultHandle, ShardConnection};
use crate::policy::FailurePolicy;

/// The parallel execution engine. One instance per execution group: its
/// worker budget is independent of other groups, so a slow statement
/// cannot starve unrelated concurrent statements.
pub struct ExecutorEngine {
    config: ExecutorConfig,
}

impl ExecutorEngine {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Execute every unit's query and return one result handle per unit,
    /// in route-plan order. On any failure the handles of units that
    /// succeeded are closed and the aggregated error is returned per
    /// `policy` — the caller never sees a partial result set.
    ///
    /// Success-path handles belong to the caller (normally the merge
    /// engine), which must close each exactly once.
    pub fn execute_query(
        &self,
        units: &[RouteUnit],
        provider: &dyn ConnectionProvider,
        policy: FailurePolicy,
    ) -> MosaicResult<Vec<Box<dyn ResultHandle>>> {
        let results = self.scatter(units, provider, |conn, unit| {
            conn.execute_query(&unit.sql, unit.params())
        });

        let mut handles = Vec::with_capacity(units.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(handle) => handles.push(handle),
                Err(failure) => failures.push(failure),
            }
        }
        if failures.is_empty() {
            return Ok(handles);
        }
        // All-or-nothing: discard partial results from the winners.
        for handle in &mut handles {
            handle.close();
        }
        Err(report(units.len(), failures, policy).into())
    }

    /// Execute every unit's parameter sets as one batch round trip per
    /// unit and return the total affected-row count. Thread usage is
    /// O(targets), not O(parameter sets).
    pub fn execute_update(
        &self,
        units: &[RouteUnit],
        provider: &dyn ConnectionProvider,
        policy: FailurePolicy,
    ) -> MosaicResult<u64> {
        let results = self.scatter(units, provider, |conn, unit| {
            conn.execute_batch(&unit.sql, &unit.param_sets)
        });

        let mut affected = 0u64;
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(count) => affected += count,
                Err(failure) => failures.push(failure),
            }
        }
        if failures.is_empty() {
            Ok(affected)
        } else {
            Err(report(units.len(), failures, policy).into())
        }
    }

    /// Run `job` once per unit and collect per-unit outcomes in unit
    /// order. One unit runs inline; several fan out across at most
    /// `max_worker_threads` scoped threads, worker `w` taking units
    /// `w, w+n, w+2n, …`. A failing unit never terminates its siblings.
    fn scatter<T, F>(
        &self,
        units: &[RouteUnit],
        provider: &dyn ConnectionProvider,
        job: F,
    ) -> Vec<Result<T, TargetFailure>>
    where
        T: Send,
        F: Fn(Box<dyn ShardConnection>, &RouteUnit) -> MosaicResult<T> + Sync,
    {
        let run_unit = |unit: &RouteUnit| -> Result<T, TargetFailure> {
            let failure = |message: String| TargetFailure {
                data_source: unit.data_source.clone(),
                actual_table: unit.actual_table.clone(),
                message,
            };
            let conn = provider
                .connection(&unit.data_source)
                .map_err(|e| failure(e.to_string()))?;
            // The connection is consumed here: a successful query hands it
            // off inside the ResultHandle, everything else releases it.
            job(conn, unit).map_err(|e| {
                let f = failure(e.to_string());
                tracing::warn!(
                    data_source = %f.data_source,
                    table = %f.actual_table,
                    "execution target failed: {}",
                    f.message
                );
                f
            })
        };

        match units {
            [] => Vec::new(),
            [single] => vec![run_unit(single)],
            _ => {
                let workers = self.config.max_worker_threads.max(1).min(units.len());
                let mut slots: Vec<Option<Result<T, TargetFailure>>> =
                    (0..units.len()).map(|_| None).collect();

                std::thread::scope(|s| {
                    let worker_handles: Vec<_> = (0..workers)
                        .map(|w| {
                            let run_unit = &run_unit;
                            s.spawn(move || {
                                let mut out = Vec::new();
                                let mut i = w;
                                while i < units.len() {
                                    out.push((i, run_unit(&units[i])));
                                    i += workers;
                                }
                                out
                            })
                        })
                        .collect();

                    for (w, handle) in worker_handles.into_iter().enumerate() {
                        match handle.join() {
                            Ok(results) => {
                                for (i, r) in results {
                                    slots[i] = Some(r);
                                }
                            }
                            Err(_) => {
                                // The worker's completed handles are lost to
                                // the panic; its units all report as failed.
                                let mut i = w;
                                while i < units.len() {
                                    slots[i] = Some(Err(TargetFailure {
                                        data_source: units[i].data_source.clone(),
                                        actual_table: units[i].actual_table.clone(),
                                        message: "execution worker panicked".into(),
                                    }));
                                    i += workers;
                                }
                            }
                        }
                    }
                });

                slots
                    .into_iter()
                    .enumerate()
                    .map(|(i, slot)| {
                        slot.unwrap_or_else(|| {
                            Err(TargetFailure {
                                data_source: units[i].data_source.clone(),
                                actual_table: units[i].actual_table.clone(),
                                message: "execution result lost".into(),
                            })
                        })
                    })
                    .collect()
            }
        }
    }
}

fn report(total: usize, mut failures: Vec<TargetFailure>, policy: FailurePolicy) -> ExecError {
    match policy {
        FailurePolicy::FailFast => ExecError::Target(failures.remove(0)),
        FailurePolicy::CollectAll => ExecError::Aggregate { total, failures },
    }
}

#[cfg(test)]
mod tests {
    use mosaic_common::{Datum, MosaicError};

    use super::*;
    use crate::memory::MemoryDatabase;

    fn unit(ds: &str, table: &str) -> RouteUnit {
        RouteUnit {
            data_source: ds.into(),
            actual_table: table.into(),
            sql: format!("SELECT order_id FROM {}", table),
            param_sets: Vec::new(),
        }
    }

    fn three_shard_db() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        for (i, rows) in [vec![1i64, 2], vec![3, 4], vec![5, 6]].iter().enumerate() {
            db.add_table(
                &format!("ds_{}", i),
                &format!("t_order_{}", i),
                &["order_id"],
                rows.iter().map(|v| vec![Datum::Int64(*v)]).collect(),
            );
        }
        db
    }

    fn three_units() -> Vec<RouteUnit> {
        (0..3)
            .map(|i| unit(&format!("ds_{}", i), &format!("t_order_{}", i)))
            .collect()
    }

    #[test]
    fn single_unit_executes_inline() {
        let db = three_shard_db();
        let engine = ExecutorEngine::new(ExecutorConfig::single_threaded());
        let handles = engine
            .execute_query(&[unit("ds_0", "t_order_0")], &db, FailurePolicy::FailFast)
            .unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].columns(), ["order_id"]);
        assert_eq!(db.stats().queries.len(), 1);
    }

    #[test]
    fn multi_unit_handles_come_back_in_unit_order() {
        let db = three_shard_db();
        let engine = ExecutorEngine::new(ExecutorConfig { max_worker_threads: 2 });
        let mut handles = engine
            .execute_query(&three_units(), &db, FailurePolicy::FailFast)
            .unwrap();
        assert_eq!(handles.len(), 3);
        let first = handles[0].next_row().unwrap().unwrap();
        assert_eq!(first.values[0], Datum::Int64(1));
        let mid = handles[1].next_row().unwrap().unwrap();
        assert_eq!(mid.values[0], Datum::Int64(3));
        for h in &mut handles {
            h.close();
        }
    }

    #[test]
    fn worker_count_below_unit_count_still_covers_every_unit() {
        let db = MemoryDatabase::new();
        let units: Vec<RouteUnit> = (0..8)
            .map(|i| {
                db.add_table(
                    &format!("ds_{}", i),
                    &format!("t_{}", i),
                    &["v"],
                    vec![vec![Datum::Int64(i)]],
                );
                unit(&format!("ds_{}", i), &format!("t_{}", i))
            })
            .collect();
        let engine = ExecutorEngine::new(ExecutorConfig { max_worker_threads: 2 });
        let mut handles = engine.execute_query(&units, &db, FailurePolicy::FailFast).unwrap();
        assert_eq!(handles.len(), 8);
        for (i, h) in handles.iter_mut().enumerate() {
            assert_eq!(h.next_row().unwrap().unwrap().values[0], Datum::Int64(i as i64));
            h.close();
        }
    }

    #[test]
    fn fail_fast_reports_first_failure_and_closes_winners() {
        let db = three_shard_db();
        db.fail_target("ds_1", "t_order_1");
        let engine = ExecutorEngine::new(ExecutorConfig { max_worker_threads: 3 });
        let err = engine
            .execute_query(&three_units(), &db, FailurePolicy::FailFast)
            .unwrap_err();
        match err {
            MosaicError::Exec(ExecError::Target(f)) => {
                assert_eq!(f.data_source, "ds_1");
                assert_eq!(f.actual_table, "t_order_1");
            }
            other => panic!("unexpected error: {}", other),
        }
        // Siblings ran to completion and their handles were released.
        let stats = db.stats();
        assert_eq!(stats.queries.len(), 3);
        assert_eq!(stats.opened_handles, 2);
        assert_eq!(stats.close_calls, 2);
    }

    #[test]
    fn collect_all_enumerates_every_failing_unit_in_order() {
        let db = three_shard_db();
        db.fail_target("ds_0", "t_order_0");
        db.fail_target("ds_2", "t_order_2");
        let engine = ExecutorEngine::new(ExecutorConfig { max_worker_threads: 3 });
        let err = engine
            .execute_query(&three_units(), &db, FailurePolicy::CollectAll)
            .unwrap_err();
        match err {
            MosaicError::Exec(ExecError::Aggregate { total, failures }) => {
                assert_eq!(total, 3);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].actual_table, "t_order_0");
                assert_eq!(failures[1].actual_table, "t_order_2");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn unknown_data_source_surfaces_as_target_failure() {
        let db = three_shard_db();
        let engine = ExecutorEngine::new(ExecutorConfig::single_threaded());
        let err = engine
            .execute_query(&[unit("ds_9", "t_order_9")], &db, FailurePolicy::FailFast)
            .unwrap_err();
        match err {
            MosaicError::Exec(ExecError::Target(f)) => {
                assert_eq!(f.data_source, "ds_9");
                assert!(f.message.contains("ds_9"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn update_batches_once_per_unit() {
        let db = three_shard_db();
        let engine = ExecutorEngine::new(ExecutorConfig { max_worker_threads: 2 });
        let param_sets: Vec<Vec<Datum>> = (0..3)
            .map(|i| vec![Datum::Int64(i), Datum::Text(format!("init_{}", i))])
            .collect();
        let units: Vec<RouteUnit> = (0..2)
            .map(|i| RouteUnit {
                data_source: format!("ds_{}", i),
                actual_table: format!("t_order_{}", i),
                sql: format!("INSERT INTO t_order_{} (order_id, status) VALUES (?, ?)", i),
                param_sets: param_sets.clone(),
            })
            .collect();
        let affected = engine
            .execute_update(&units, &db, FailurePolicy::FailFast)
            .unwrap();
        assert_eq!(affected, 6);
        // One batch round trip per unit, not one per parameter set.
        let stats = db.stats();
        assert_eq!(stats.batches.len(), 2);
        assert!(stats.batches.iter().all(|(_, size)| *size == 3));
    }

    #[test]
    fn empty_unit_set_is_a_no_op() {
        let db = three_shard_db();
        let engine = ExecutorEngine::new(ExecutorConfig::single_threaded());
        let handles = engine.execute_query(&[], &db, FailurePolicy::FailFast).unwrap();
        assert!(handles.is_empty());
        assert_eq!(engine.execute_update(&[], &db, FailurePolicy::FailFast).unwrap(), 0);
    }
}
