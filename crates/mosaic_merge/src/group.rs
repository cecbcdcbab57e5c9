//! Grouping and aggregation merge. Shards return one partial-aggregate
//! row per group; this pass drains every stream into a keyed buffer,
//! combines partials that share a group key, restores AVG columns from
//! their SUM/COUNT companions, and sorts the final rows. Buffering is
//! bounded by `MergeConfig::max_rows_buffered`.

use std::collections::HashMap;

use mosaic_common::datum::decimal_trim;
use mosaic_common::{Datum, MergeError, MosaicError, MosaicResult, OwnedRow};
use mosaic_exec::ResultHandle;
use mosaic_route::{AggFunc, AggregateItem, MergeDirective};

use crate::compare::compare_rows;

/// Encode the grouping columns of a row as a byte key. The encoding
/// mirrors the cross-width normalization of `Datum`'s `Hash` impl, so
/// `Int32(7)` and `Int64(7)` land in the same group.
fn encode_group_key(row: &OwnedRow, group_by: &[usize]) -> Result<Vec<u8>, MergeError> {
    let mut key = Vec::with_capacity(group_by.len() * 9);
    for &column in group_by {
        let value = row.get(column).ok_or(MergeError::ColumnOutOfBounds {
            column,
            width: row.len(),
        })?;
        match value {
            Datum::Null => key.push(0),
            Datum::Boolean(b) => {
                key.push(1);
                key.push(*b as u8);
            }
            Datum::Int32(v) => {
                key.push(2);
                key.extend_from_slice(&(*v as i64).to_be_bytes());
            }
            Datum::Int64(v) => {
                key.push(2);
                key.extend_from_slice(&v.to_be_bytes());
            }
            Datum::Float64(v) => {
                key.push(3);
                key.extend_from_slice(&v.to_bits().to_be_bytes());
            }
            Datum::Text(s) => {
                key.push(4);
                key.extend_from_slice(&(s.len() as u32).to_be_bytes());
                key.extend_from_slice(s.as_bytes());
            }
            Datum::Timestamp(us) => {
                key.push(5);
                key.extend_from_slice(&us.to_be_bytes());
            }
            Datum::Date(days) => {
                key.push(6);
                key.extend_from_slice(&days.to_be_bytes());
            }
            Datum::Decimal(m, s) => {
                let (nm, ns) = decimal_trim(*m, *s);
                key.push(7);
                key.extend_from_slice(&nm.to_be_bytes());
                key.push(ns);
            }
        }
    }
    Ok(key)
}

fn column_mut(row: &mut OwnedRow, column: usize) -> Result<&mut Datum, MergeError> {
    let width = row.len();
    row.values
        .get_mut(column)
        .ok_or(MergeError::ColumnOutOfBounds { column, width })
}

fn column_ref(row: &OwnedRow, column: usize) -> Result<&Datum, MergeError> {
    row.get(column).ok_or(MergeError::ColumnOutOfBounds {
        column,
        width: row.len(),
    })
}

/// Add the incoming partial into the accumulator column (SUM, COUNT,
/// and the AVG companion columns).
fn combine_additive(
    acc: &mut OwnedRow,
    incoming: &OwnedRow,
    column: usize,
    function: &'static str,
) -> Result<(), MergeError> {
    let value = column_ref(incoming, column)?.clone();
    let slot = column_mut(acc, column)?;
    match slot.add(&value) {
        Some(sum) => {
            *slot = sum;
            Ok(())
        }
        None => Err(MergeError::AggregateTypeMismatch {
            function,
            column,
            got: value.kind(),
        }),
    }
}

/// Fold one incoming partial row into the accumulator for its group.
fn combine_row(
    acc: &mut OwnedRow,
    incoming: &OwnedRow,
    aggregates: &[AggregateItem],
) -> MosaicResult<()> {
    for item in aggregates {
        match item.func {
            AggFunc::Sum | AggFunc::Count => {
                combine_additive(acc, incoming, item.index, item.func.name())?;
            }
            AggFunc::Min | AggFunc::Max => {
                let value = column_ref(incoming, item.index)?.clone();
                if value.is_null() {
                    continue;
                }
                let slot = column_mut(acc, item.index)?;
                if slot.is_null() {
                    *slot = value;
                    continue;
                }
                let ord = (*slot)
                    .partial_cmp(&value)
                    .ok_or(MergeError::AggregateTypeMismatch {
                        function: item.func.name(),
                        column: item.index,
                        got: value.kind(),
                    })?;
                let replace = match item.func {
                    AggFunc::Min => ord == std::cmp::Ordering::Greater,
                    _ => ord == std::cmp::Ordering::Less,
                };
                if replace {
                    *slot = value;
                }
            }
            AggFunc::Avg => {
                let (sum_col, count_col) = avg_parts(item)?;
                combine_additive(acc, incoming, sum_col, item.func.name())?;
                combine_additive(acc, incoming, count_col, item.func.name())?;
            }
        }
    }
    Ok(())
}

fn avg_parts(item: &AggregateItem) -> Result<(usize, usize), MosaicError> {
    item.avg_parts.ok_or_else(|| {
        MosaicError::Internal(format!(
            "AVG aggregate at column {} has no SUM/COUNT companion columns",
            item.index
        ))
    })
}

/// Replace each AVG column with companion SUM divided by companion
/// COUNT. An empty group (COUNT 0) yields NULL, never 0/0.
fn finish_averages(row: &mut OwnedRow, aggregates: &[AggregateItem]) -> MosaicResult<()> {
    for item in aggregates {
        if item.func != AggFunc::Avg {
            continue;
        }
        let (sum_col, count_col) = avg_parts(item)?;
        let sum = column_ref(row, sum_col)?.clone();
        let count = column_ref(row, count_col)?.clone();
        let value = if sum.is_null() || count.is_null() || count.as_i64() == Some(0) {
            Datum::Null
        } else {
            let numerator = sum.as_f64().ok_or(MergeError::AggregateTypeMismatch {
                function: item.func.name(),
                column: sum_col,
                got: sum.kind(),
            })?;
            let denominator = count.as_i64().ok_or(MergeError::AggregateTypeMismatch {
                function: item.func.name(),
                column: count_col,
                got: count.kind(),
            })?;
            Datum::Float64(numerator / denominator as f64)
        };
        *column_mut(row, item.index)? = value;
    }
    Ok(())
}

/// Drain every handle and produce the final grouped, aggregated, and
/// ordered row set. Handles are left exhausted but open; the caller
/// owns closing them.
pub(crate) fn grouped_rows(
    handles: &mut [Box<dyn ResultHandle>],
    directive: &MergeDirective,
    max_rows_buffered: usize,
) -> MosaicResult<Vec<OwnedRow>> {
    let mut groups: HashMap<Vec<u8>, OwnedRow> = HashMap::new();
    for handle in handles.iter_mut() {
        while let Some(row) = handle.next_row()? {
            let key = encode_group_key(&row, &directive.group_by)?;
            match groups.get_mut(&key) {
                Some(acc) => combine_row(acc, &row, &directive.aggregates)?,
                None => {
                    if groups.len() >= max_rows_buffered {
                        return Err(MergeError::RowBufferExceeded {
                            buffered: groups.len() + 1,
                            limit: max_rows_buffered,
                        }
                        .into());
                    }
                    groups.insert(key, row);
                }
            }
        }
    }

    let mut entries: Vec<(Vec<u8>, OwnedRow)> = groups.into_iter().collect();
    if directive.order_by.is_empty() {
        // No requested order: fall back to the group key so the output
        // is deterministic across runs.
        entries.sort_by(|a, b| a.0.cmp(&b.0));
    }
    let mut rows: Vec<OwnedRow> = entries.into_iter().map(|(_, row)| row).collect();

    for row in &mut rows {
        finish_averages(row, &directive.aggregates)?;
        if let Some(visible) = directive.visible_columns {
            row.values.truncate(visible);
        }
    }

    if !directive.order_by.is_empty() {
        let mut sort_err: Option<MergeError> = None;
        rows.sort_by(|a, b| match compare_rows(a, b, &directive.order_by) {
            Ok(ord) => ord,
            Err(e) => {
                if sort_err.is_none() {
                    sort_err = Some(e);
                }
                std::cmp::Ordering::Equal
            }
        });
        if let Some(e) = sort_err {
            return Err(e.into());
        }
    }

    Ok(rows)
}
