//! Ordering-key comparison. Convention: NULL sorts **first** under an
//! ascending column; a DESC column reverses the whole comparison, so
//! nulls land last there. The convention is fixed here rather than
//! inherited from any backend's behavior.

use std::cmp::Ordering;

use mosaic_common::{Datum, MergeError, OwnedRow};
use mosaic_route::OrderByItem;

/// Compare two values of one ordering column under the null convention.
/// Non-null values of incomparable kinds are a `MergeError`.
pub fn compare_order_values(a: &Datum, b: &Datum, column: usize) -> Result<Ordering, MergeError> {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ok(Ordering::Equal),
        (true, false) => Ok(Ordering::Less),
        (false, true) => Ok(Ordering::Greater),
        (false, false) => a.partial_cmp(b).ok_or(MergeError::IncomparableOrderKey {
            column,
            left: a.kind(),
            right: b.kind(),
        }),
    }
}

/// Compare two rows on the ORDER BY column sequence, applying each
/// column's direction in turn.
pub fn compare_rows(
    a: &OwnedRow,
    b: &OwnedRow,
    order_by: &[OrderByItem],
) -> Result<Ordering, MergeError> {
    for item in order_by {
        let va = a.get(item.index).ok_or(MergeError::ColumnOutOfBounds {
            column: item.index,
            width: a.len(),
        })?;
        let vb = b.get(item.index).ok_or(MergeError::ColumnOutOfBounds {
            column: item.index,
            width: b.len(),
        })?;
        let mut ord = compare_order_values(va, vb, item.index)?;
        if item.desc {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return Ok(ord);
        }
    }
    Ok(Ordering::Equal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<Datum>) -> OwnedRow {
        OwnedRow::new(values)
    }

    #[test]
    fn nulls_sort_first_ascending() {
        assert_eq!(
            compare_order_values(&Datum::Null, &Datum::Int64(1), 0).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            compare_order_values(&Datum::Null, &Datum::Null, 0).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn desc_reverses_whole_comparison() {
        let a = row(vec![Datum::Int64(1)]);
        let b = row(vec![Datum::Null]);
        let desc = [OrderByItem { index: 0, desc: true }];
        // NULL first under ASC, so under DESC the non-null row comes first.
        assert_eq!(compare_rows(&a, &b, &desc).unwrap(), Ordering::Less);
    }

    #[test]
    fn later_columns_break_earlier_ties() {
        let a = row(vec![Datum::Int64(1), Datum::Text("a".into())]);
        let b = row(vec![Datum::Int64(1), Datum::Text("b".into())]);
        let order = [
            OrderByItem { index: 0, desc: false },
            OrderByItem { index: 1, desc: false },
        ];
        assert_eq!(compare_rows(&a, &b, &order).unwrap(), Ordering::Less);
    }

    #[test]
    fn incomparable_kinds_are_an_error() {
        let err = compare_order_values(&Datum::Int64(1), &Datum::Text("x".into()), 2).unwrap_err();
        assert!(matches!(err, MergeError::IncomparableOrderKey { column: 2, .. }));
    }

    #[test]
    fn out_of_bounds_order_column_is_an_error() {
        let a = row(vec![Datum::Int64(1)]);
        let b = row(vec![Datum::Int64(2)]);
        let order = [OrderByItem { index: 5, desc: false }];
        assert!(matches!(
            compare_rows(&a, &b, &order).unwrap_err(),
            MergeError::ColumnOutOfBounds { column: 5, width: 1 }
        ));
    }
}
