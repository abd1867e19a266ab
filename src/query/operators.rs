use crate::catalog::schema::RecordId;
use crate::catalog::types::Value;
use crate::error::{BrowseError, BrowseResult};
use crate::query::plan::{Combinator, Direction, Predicate};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Predicate bound to slot indices of a value row.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledPredicate {
    Contains(usize, String),
    Between(usize, Value, Value),
    All(Vec<CompiledPredicate>),
    Any(Vec<CompiledPredicate>),
}

impl CompiledPredicate {
    /// Binds each predicate's grid position to a slot via `slot`. An empty input
    /// compiles to a predicate that accepts every row.
    pub fn compile<'p, I, F>(combinator: Combinator, predicates: I, slot: F) -> BrowseResult<Self>
    where
        I: IntoIterator<Item = &'p Predicate>,
        F: Fn(usize) -> Option<usize>,
    {
        let mut compiled = Vec::new();
        for predicate in predicates {
            let idx = slot(predicate.position()).ok_or_else(|| {
                BrowseError::invalid(format!(
                    "predicate on grid column {} has no value slot",
                    predicate.position()
                ))
            })?;
            compiled.push(match predicate {
                Predicate::Contains { needle, .. } => {
                    CompiledPredicate::Contains(idx, needle.to_lowercase())
                }
                Predicate::Range { low, high, .. } => {
                    CompiledPredicate::Between(idx, low.clone(), high.clone())
                }
            });
        }
        if compiled.is_empty() {
            return Ok(CompiledPredicate::All(compiled));
        }
        Ok(match combinator {
            Combinator::And => CompiledPredicate::All(compiled),
            Combinator::Or => CompiledPredicate::Any(compiled),
        })
    }

    pub fn accepts_all(&self) -> bool {
        matches!(self, CompiledPredicate::All(inner) if inner.is_empty())
    }

    pub fn eval(&self, values: &[Value]) -> bool {
        match self {
            CompiledPredicate::Contains(idx, needle) => values.get(*idx).is_some_and(|v| {
                !v.is_null() && v.display_text().to_lowercase().contains(needle.as_str())
            }),
            CompiledPredicate::Between(idx, lo, hi) => values.get(*idx).is_some_and(|v| {
                compare_values(v, lo).is_some_and(|o| o.is_ge())
                    && compare_values(v, hi).is_some_and(|o| o.is_le())
            }),
            CompiledPredicate::All(inner) => inner.iter().all(|p| p.eval(values)),
            CompiledPredicate::Any(inner) => inner.iter().any(|p| p.eval(values)),
        }
    }
}

/// Numeric-aware comparison; `None` when either side is null.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        _ => Some(left.cmp(right)),
    }
}

/// Sort value of one filtered record. Ties on `value` fall back to `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub value: Value,
    pub id: RecordId,
}

impl SortKey {
    pub fn new(value: Value, id: RecordId) -> Self {
        Self { value, id }
    }
}

/// Total order over sort keys; the direction applies to the whole (value, id) tuple.
/// Nulls rank above every value, so they come last ascending and first descending.
pub fn compare_keys(a: &SortKey, b: &SortKey, direction: Direction) -> Ordering {
    let cmp = (a.value.is_null(), &a.value)
        .cmp(&(b.value.is_null(), &b.value))
        .then_with(|| a.id.cmp(&b.id));
    match direction {
        Direction::Asc => cmp,
        Direction::Desc => cmp.reverse(),
    }
}

struct Ranked {
    key: SortKey,
    direction: Direction,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.key, &other.key, self.direction)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Ranked {}

/// First `limit` keys under `direction`, in order.
pub fn top_k(keys: Vec<SortKey>, direction: Direction, limit: usize) -> Vec<SortKey> {
    if limit == 0 {
        return Vec::new();
    }
    if limit >= keys.len() {
        let mut keys = keys;
        keys.sort_by(|a, b| compare_keys(a, b, direction));
        return keys;
    }
    let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(limit);
    for key in keys {
        let candidate = Ranked { key, direction };
        if heap.len() < limit {
            heap.push(candidate);
            continue;
        }
        // Keep only the best `limit` keys seen so far.
        if heap
            .peek()
            .is_some_and(|worst_of_best| candidate < *worst_of_best)
        {
            let _ = heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec().into_iter().map(|r| r.key).collect()
}
