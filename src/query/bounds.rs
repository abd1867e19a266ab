use crate::catalog::schema::{Column, Dataset};
use crate::catalog::types::{ColumnKind, Value};
use crate::error::BrowseResult;
use crate::query::join::JoinEngine;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Range slider bounds of one numeric column; both `Null` when it holds no value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Value,
    pub max: Value,
}

/// Keyed by `<dataset code>__<column code>`.
pub type BoundsMap = BTreeMap<String, Bounds>;

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Value::Null,
            max: Value::Null,
        }
    }

    fn from_precomputed(kind: ColumnKind, min: f64, max: f64) -> Self {
        match kind {
            ColumnKind::Integer => Self {
                min: Value::Integer(min as i64),
                max: Value::Integer(max as i64),
            },
            _ => Self {
                min: Value::Float(min),
                max: Value::Float(max),
            },
        }
    }

    /// Folds typed values, skipping nulls.
    pub fn of<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let mut bounds = Self::empty();
        for value in values.into_iter().filter(|v| !v.is_null()) {
            if bounds.min.is_null() || value < bounds.min {
                bounds.min = value.clone();
            }
            if bounds.max.is_null() || value > bounds.max {
                bounds.max = value;
            }
        }
        bounds
    }
}

/// Live min/max of `column` over every record of `dataset`.
pub fn live_column_bounds<S: Storage + ?Sized>(
    storage: &S,
    dataset: &Dataset,
    column: &Column,
) -> BrowseResult<Bounds> {
    let records = storage.project(dataset.id, &[column.code.as_str()])?;
    let mut values = Vec::with_capacity(records.len());
    for record in records {
        let raw = record.values.into_iter().next().unwrap_or(Value::Null);
        values.push(raw.cast(column.kind, &column.code)?);
    }
    Ok(Bounds::of(values))
}

/// Bounds of every numeric column of the selection over the joined, unfiltered rows.
///
/// Precomputed column bounds are trusted only for single-dataset selections, where
/// the unfiltered row set is the whole dataset.
pub fn aggregate_bounds<S: Storage + ?Sized>(
    engine: &JoinEngine<'_, S>,
) -> BrowseResult<BoundsMap> {
    let selection = engine.selection();
    let mut bounds = BoundsMap::new();
    for (idx, column) in selection.columns().iter().enumerate() {
        if !column.kind.is_numeric() {
            continue;
        }
        let position = idx + 1;
        let Some(key) = selection.bounds_key(position) else {
            continue;
        };
        let entry = if !selection.is_multi_dataset() {
            match column.precomputed_bounds() {
                Some((min, max)) => Bounds::from_precomputed(column.kind, min, max),
                None => {
                    live_column_bounds(engine.storage(), &engine.canonical().dataset, column)?
                }
            }
        } else {
            let ids = engine.unfiltered_ids()?;
            Bounds::of(
                engine
                    .column_values(ids, position)?
                    .into_iter()
                    .map(|(_, v)| v),
            )
        };
        bounds.insert(key, entry);
    }
    Ok(bounds)
}
