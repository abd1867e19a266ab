use crate::catalog::selection::ColumnSelection;
use crate::catalog::types::{ColumnKind, Value};
use crate::error::{BrowseError, BrowseResult};
use crate::query::plan::{ColumnTarget, Predicate, PredicateSet, QueryShape, SortSpec};
use crate::query::request::{ColumnSearch, GridRequest};

/// Storage identity and declared kind of the grid column at `position`.
pub fn grid_column(
    selection: &ColumnSelection,
    position: usize,
) -> BrowseResult<(ColumnTarget, ColumnKind)> {
    if position == 0 {
        return Ok((ColumnTarget::Key, ColumnKind::Text));
    }
    let column = selection.column_at(position).ok_or_else(|| {
        BrowseError::invalid(format!(
            "grid column {position} is out of range (grid has {} columns)",
            selection.grid_width()
        ))
    })?;
    Ok((
        ColumnTarget::Field {
            dataset: column.dataset_id,
            code: column.code.clone(),
        },
        column.kind,
    ))
}

fn parse_bound(raw: &str, kind: ColumnKind, position: usize) -> BrowseResult<Value> {
    let trimmed = raw.trim();
    let malformed = || {
        BrowseError::invalid(format!(
            "range bound '{raw}' on grid column {position} is not a valid {kind}"
        ))
    };
    match kind {
        ColumnKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| malformed()),
        ColumnKind::Float => match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Value::Float(v)),
            _ => Err(malformed()),
        },
        ColumnKind::Text => Err(BrowseError::invalid(format!(
            "grid column {position} holds text and cannot be range filtered"
        ))),
    }
}

/// Turns grid request parameters into typed predicates and a sort order.
pub struct PredicateBuilder<'a> {
    selection: &'a ColumnSelection,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(selection: &'a ColumnSelection) -> Self {
        Self { selection }
    }

    pub fn build(&self, request: &GridRequest) -> BrowseResult<QueryShape> {
        let predicates = match request.global_search.as_deref() {
            Some(needle) if !needle.is_empty() => self.global(request, needle)?,
            _ => self.per_column(request)?,
        };
        Ok(QueryShape {
            predicates,
            sort: self.sort(request)?,
        })
    }

    /// One OR-ed substring predicate per searchable grid column.
    fn global(&self, request: &GridRequest, needle: &str) -> BrowseResult<PredicateSet> {
        let needle = needle.to_lowercase();
        let mut predicates = Vec::new();
        for position in 0..self.selection.grid_width() {
            if !request.is_searchable(position) {
                continue;
            }
            let (target, _) = grid_column(self.selection, position)?;
            predicates.push(Predicate::Contains {
                position,
                target,
                needle: needle.clone(),
            });
        }
        Ok(PredicateSet::any(predicates))
    }

    fn per_column(&self, request: &GridRequest) -> BrowseResult<PredicateSet> {
        let mut predicates = Vec::new();
        for (&position, params) in &request.columns {
            let Some(search) = &params.search else {
                continue;
            };
            let (target, kind) = grid_column(self.selection, position)?;
            predicates.push(match search {
                ColumnSearch::Text(needle) => Predicate::Contains {
                    position,
                    target,
                    needle: needle.to_lowercase(),
                },
                ColumnSearch::Range(low, high) => {
                    let low = parse_bound(low, kind, position)?;
                    let high = parse_bound(high, kind, position)?;
                    if low > high {
                        return Err(BrowseError::invalid(format!(
                            "range on grid column {position} has low bound above high bound"
                        )));
                    }
                    Predicate::Range {
                        position,
                        target,
                        low,
                        high,
                    }
                }
            });
        }
        Ok(PredicateSet::all(predicates))
    }

    fn sort(&self, request: &GridRequest) -> BrowseResult<SortSpec> {
        let Some(order) = request.order else {
            return Ok(SortSpec::key_ascending());
        };
        let (target, _) = grid_column(self.selection, order.column)?;
        Ok(SortSpec {
            position: order.column,
            target,
            direction: order.direction,
        })
    }
}
