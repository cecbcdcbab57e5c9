//! Streaming k-way merge over live per-target cursors. Each `next()`
//! compares the head row of every still-open segment on the ORDER BY
//! columns and emits the minimum, advancing only that segment — the
//! blocking read lands on whichever backend holds the current candidate.
//!
//! Fully equal keys tie-break on segment (route-unit) position, making
//! the merge a stable generalization of per-shard pre-sorted input. The
//! scan is O(k) per row; fan-outs here are small.

use mosaic_common::{MosaicResult, OwnedRow};
use mosaic_exec::ResultHandle;
use mosaic_route::OrderByItem;

use crate::compare::compare_rows;

/// One per-target cursor in the merge arena, indexed by route-unit
/// position.
#[derive(Debug)]
struct Segment {
    handle: Box<dyn ResultHandle>,
    current: Option<OwnedRow>,
}

#[derive(Debug)]
pub(crate) struct OrderedStream {
    segments: Vec<Segment>,
    order_by: Vec<OrderByItem>,
    primed: bool,
}

impl OrderedStream {
    pub(crate) fn new(handles: Vec<Box<dyn ResultHandle>>, order_by: Vec<OrderByItem>) -> Self {
        Self {
            segments: handles
                .into_iter()
                .map(|handle| Segment {
                    handle,
                    current: None,
                })
                .collect(),
            order_by,
            primed: false,
        }
    }

    pub(crate) fn next(&mut self) -> MosaicResult<Option<OwnedRow>> {
        if !self.primed {
            for seg in &mut self.segments {
                seg.current = seg.handle.next_row()?;
            }
            self.primed = true;
        }

        // Lowest segment index wins ties: replacement only on strictly-less.
        let mut best: Option<(usize, &OwnedRow)> = None;
        for (i, seg) in self.segments.iter().enumerate() {
            let Some(row) = &seg.current else { continue };
            best = match best {
                None => Some((i, row)),
                Some((b, best_row)) => {
                    if compare_rows(row, best_row, &self.order_by)? == std::cmp::Ordering::Less {
                        Some((i, row))
                    } else {
                        Some((b, best_row))
                    }
                }
            };
        }
        let i = match best {
            Some((i, _)) => i,
            None => return Ok(None),
        };

        let seg = &mut self.segments[i];
        let row = seg.current.take();
        seg.current = seg.handle.next_row()?;
        Ok(row)
    }

    pub(crate) fn close_all(&mut self) {
        for seg in &mut self.segments {
            seg.handle.close();
        }
    }
}
