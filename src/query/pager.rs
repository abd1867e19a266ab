//! Page window selection over an ordered result set.
//!
//! Two scan modes produce the same window. `Forward` ranks the first `end` keys
//! under the requested order and slices `[start, end)`. `Reverse` is used for
//! windows close to the tail of a large set: it ranks the first `total - start`
//! keys under the opposite order, slices the mirrored range
//! `[total - end, total - start)` and flips it back in memory.

use crate::catalog::schema::RecordId;
use crate::query::operators::{SortKey, top_k};
use crate::query::plan::Direction;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Forward,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    pub mode: ScanMode,
    pub start: usize,
    pub end: usize,
    pub total: usize,
}

impl PagePlan {
    /// `requested_end` of `None` means the window runs to the end of the set.
    pub fn new(start: usize, requested_end: Option<usize>, total: usize, threshold: usize) -> Self {
        let end = requested_end.map_or(total, |end| end.min(total));
        let start = start.min(end);
        let mode = if total > threshold.saturating_mul(2) && total - start < threshold {
            ScanMode::Reverse
        } else {
            ScanMode::Forward
        };
        Self {
            mode,
            start,
            end,
            total,
        }
    }

    pub fn forward(start: usize, end: usize, total: usize) -> Self {
        let end = end.min(total);
        Self {
            mode: ScanMode::Forward,
            start: start.min(end),
            end,
            total,
        }
    }

    pub fn reverse(start: usize, end: usize, total: usize) -> Self {
        Self {
            mode: ScanMode::Reverse,
            ..Self::forward(start, end, total)
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Record ids of the window, in `direction` order. `keys` must hold the whole set.
    pub fn select(&self, keys: Vec<SortKey>, direction: Direction) -> Vec<RecordId> {
        let total = keys.len();
        let end = self.end.min(total);
        let start = self.start.min(end);
        if start == end {
            return Vec::new();
        }
        debug!(mode = ?self.mode, start, end, total, "selecting page");
        match self.mode {
            ScanMode::Forward => top_k(keys, direction, end)
                .get(start..end)
                .map(|page| page.iter().map(|k| k.id).collect())
                .unwrap_or_default(),
            ScanMode::Reverse => {
                let ranked = top_k(keys, direction.reverse(), total - start);
                let mut page: Vec<RecordId> = ranked
                    .get(total - end..total - start)
                    .map(|page| page.iter().map(|k| k.id).collect())
                    .unwrap_or_default();
                page.reverse();
                page
            }
        }
    }
}
