//! The routing pass: condition evaluation against the sharding rule,
//! binding-group reuse, target dedup, per-target SQL rewrite, and merge
//! directive derivation.

use std::collections::{HashMap, HashSet};

use mosaic_common::{MosaicResult, RouteError};

use crate::context::StatementContext;
use crate::plan::{LimitValue, MergeDirective, RoutePlan, RouteUnit};
use crate::rewrite::{rewrite_sql, Replacement};
use crate::rule::{ShardingRule, TableRule};

/// Route one statement against the sharding rule, producing the
/// deduplicated set of per-target units plus the merge directive.
///
/// Routing errors abort before any execution begins; a returned plan has
/// no side effects yet.
pub fn route(ctx: &StatementContext, rule: &ShardingRule) -> MosaicResult<RoutePlan> {
    let logical_tables = ctx.logical_tables();
    let first_table = match logical_tables.first() {
        Some(t) => *t,
        None => {
            return Err(RouteError::UnroutableTable("<statement references no tables>".into()).into())
        }
    };

    let sharded: Vec<(&str, &TableRule)> = logical_tables
        .iter()
        .filter_map(|t| rule.table_rule(t).map(|r| (*t, r)))
        .collect();

    // Multiple sharded tables are only routable as one binding group:
    // targets are computed once from the first bound table and reused,
    // never resolved independently per table.
    if sharded.len() > 1 {
        let primary = sharded[0].0;
        if !sharded[1..].iter().all(|(t, _)| rule.is_binding_pair(primary, t)) {
            return Err(RouteError::CartesianRouting {
                tables: sharded.iter().map(|(t, _)| t.to_string()).collect(),
            }
            .into());
        }
    }

    let Some(&(primary, primary_rule)) = sharded.first() else {
        // Every referenced table is un-sharded: single fixed target on the
        // default data source, SQL text unchanged.
        let Some(default_ds) = rule.default_data_source.as_deref() else {
            return Err(RouteError::UnroutableTable(first_table.to_string()).into());
        };
        let unit = RouteUnit {
            data_source: default_ds.to_string(),
            actual_table: first_table.to_string(),
            sql: ctx.sql.clone(),
            param_sets: ctx.param_sets.clone(),
        };
        tracing::debug!(table = first_table, data_source = default_ds, "routed to default data source");
        return Ok(RoutePlan {
            units: vec![unit],
            directive: MergeDirective::default(),
        });
    };

    // Dedup by (data source, physical table) before anything else:
    // overlapping conditions may resolve to the same target, and every
    // later decision (merge step, LIMIT rewrite) depends on the true
    // fan-out, not the raw index count.
    let mut target_indexes = Vec::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    for idx in resolve_targets(ctx, primary, primary_rule)? {
        let node = &primary_rule.targets[idx];
        if seen.insert((node.data_source.as_str(), node.table.as_str())) {
            target_indexes.push(idx);
        }
    }

    let fan_out = target_indexes.len();
    // Request offset+count rows from every shard; the true offset is
    // applied over the globally merged order. Pushing the original offset
    // per shard would drop rows that belong in the merged window.
    let shard_limit = if fan_out > 1 { ctx.limit.as_ref() } else { None };

    let mut units = Vec::with_capacity(fan_out);
    for &idx in &target_indexes {
        let node = &primary_rule.targets[idx];

        // Physical name per referenced sharded table at this target index.
        // Binding siblings are co-partitioned, so the same index is valid
        // for each of them.
        let mut table_map: HashMap<&str, &str> = HashMap::new();
        table_map.insert(primary, node.table.as_str());
        for &(sibling, sibling_rule) in sharded.iter().skip(1) {
            let sibling_node =
                sibling_rule
                    .targets
                    .get(idx)
                    .ok_or(RouteError::TargetIndexOutOfRange {
                        table: sibling.to_string(),
                        index: idx,
                        targets: sibling_rule.targets.len(),
                    })?;
            table_map.insert(sibling, sibling_node.table.as_str());
        }

        let mut replacements: Vec<Replacement> = ctx
            .tables
            .iter()
            .filter_map(|token| {
                table_map.get(token.logical_name.as_str()).map(|actual| Replacement {
                    span: token.span,
                    text: (*actual).to_string(),
                })
            })
            .collect();
        if let Some(limit) = shard_limit {
            replacements.push(Replacement {
                span: limit.span,
                text: format!("LIMIT {}", limit.offset + limit.count),
            });
        }

        units.push(RouteUnit {
            data_source: node.data_source.clone(),
            actual_table: node.table.clone(),
            sql: rewrite_sql(&ctx.sql, replacements)?,
            param_sets: ctx.param_sets.clone(),
        });
    }

    let directive = if fan_out > 1 {
        MergeDirective {
            order_by: ctx.order_by.clone(),
            group_by: ctx.group_by.clone(),
            aggregates: ctx.aggregates.clone(),
            limit: shard_limit.map(|l| LimitValue {
                offset: l.offset,
                count: l.count,
            }),
            visible_columns: ctx.visible_columns,
        }
    } else {
        // The single shard already produced final order, groups, and
        // limit; the logical cursor is a pass-through.
        MergeDirective::default()
    };

    tracing::debug!(table = primary, fan_out, "routed statement");
    Ok(RoutePlan { units, directive })
}

/// Resolve the physical-target indexes for one sharded table from its
/// condition on the sharding column. No usable condition means an explicit
/// full fan-out, logged at warn level.
fn resolve_targets(
    ctx: &StatementContext,
    table: &str,
    table_rule: &TableRule,
) -> MosaicResult<Vec<usize>> {
    let total = table_rule.targets.len();
    match ctx.condition(table, &table_rule.sharding_column) {
        None => {
            tracing::warn!(
                table,
                sharding_column = %table_rule.sharding_column,
                targets = total,
                "no usable sharding condition; routing to all physical targets"
            );
            Ok((0..total).collect())
        }
        Some(cond) => {
            let indexes =
                table_rule
                    .strategy
                    .resolve(&cond.values)
                    .map_err(|reason| RouteError::UnsupportedCondition {
                        table: table.to_string(),
                        column: cond.column.clone(),
                        reason,
                    })?;
            let mut out = Vec::with_capacity(indexes.len());
            for idx in indexes {
                if idx >= total {
                    return Err(RouteError::TargetIndexOutOfRange {
                        table: table.to_string(),
                        index: idx,
                        targets: total,
                    }
                    .into());
                }
                out.push(idx);
            }
            Ok(out)
        }
    }
}
