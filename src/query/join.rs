use crate::catalog::schema::{Column, DatasetId, RecordId};
use crate::catalog::selection::{ColumnSelection, DatasetGroup};
use crate::catalog::types::Value;
use crate::error::{BrowseError, BrowseResult};
use crate::query::operators::{CompiledPredicate, SortKey};
use crate::query::plan::{Combinator, Predicate, PredicateSet, SortSpec};
use crate::storage::Storage;
use compact_str::CompactString;
use std::cell::OnceCell;
use std::collections::HashMap;

/// First-record-per-key values of the predicate columns of one non-canonical dataset.
struct JoinedGroup {
    positions: Vec<usize>,
    first: HashMap<CompactString, Vec<Value>>,
}

fn cast_values(columns: &[&Column], raw: Vec<Value>) -> BrowseResult<Vec<Value>> {
    raw.into_iter()
        .zip(columns)
        .map(|(value, column)| value.cast(column.kind, &column.code))
        .collect()
}

/// Multi-dataset join by key.
///
/// Rows are identified by records of the canonical dataset. A canonical record
/// survives only when every other selected dataset holds at least one record with
/// the same key; columns of those datasets are read from their first such record.
///
/// An engine lives for one request; the unfiltered join is computed at most once.
pub struct JoinEngine<'a, S: Storage + ?Sized> {
    storage: &'a S,
    selection: &'a ColumnSelection,
    canonical: usize,
    unfiltered: OnceCell<Vec<RecordId>>,
}

impl<'a, S: Storage + ?Sized> JoinEngine<'a, S> {
    /// `default_dataset` is a dataset code; it becomes canonical when it is part of the
    /// selection, otherwise the first dataset in resolution order does.
    pub fn new(
        storage: &'a S,
        selection: &'a ColumnSelection,
        default_dataset: Option<&str>,
    ) -> Self {
        let canonical = default_dataset
            .and_then(|code| {
                selection
                    .groups()
                    .iter()
                    .position(|g| g.dataset.code == code)
            })
            .unwrap_or(0);
        Self {
            storage,
            selection,
            canonical,
            unfiltered: OnceCell::new(),
        }
    }

    pub fn storage(&self) -> &'a S {
        self.storage
    }

    pub fn selection(&self) -> &'a ColumnSelection {
        self.selection
    }

    pub fn canonical(&self) -> &DatasetGroup {
        &self.selection.groups()[self.canonical]
    }

    fn others(&self) -> impl Iterator<Item = &DatasetGroup> {
        self.selection
            .groups()
            .iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != self.canonical)
            .map(|(_, group)| group)
    }

    fn first_per_key(
        &self,
        dataset: DatasetId,
        columns: &[&Column],
    ) -> BrowseResult<HashMap<CompactString, Vec<Value>>> {
        let codes: Vec<&str> = columns.iter().map(|c| c.code.as_str()).collect();
        let records = self.storage.project(dataset, &codes)?;
        let mut first = HashMap::with_capacity(records.len());
        for record in records {
            if first.contains_key(&record.key) {
                continue;
            }
            let values = cast_values(columns, record.values)?;
            first.insert(record.key, values);
        }
        Ok(first)
    }

    fn column(&self, position: usize) -> BrowseResult<(&DatasetGroup, &Column)> {
        match (
            self.selection.group_at(position),
            self.selection.column_at(position),
        ) {
            (Some(group), Some(column)) => Ok((group, column)),
            _ => Err(BrowseError::invalid(format!(
                "grid column {position} is out of range"
            ))),
        }
    }

    /// Canonical record ids of the joined rows accepted by `predicates`, in storage order.
    ///
    /// Under AND, predicates on other datasets are applied to their first-record-per-key
    /// maps before the key intersection. Under OR every predicate is evaluated on the
    /// joined row.
    pub fn filtered_ids(&self, predicates: &PredicateSet) -> BrowseResult<Vec<RecordId>> {
        if predicates.is_empty() {
            return Ok(self.unfiltered_ids()?.to_vec());
        }
        self.scan(predicates)
    }

    /// Canonical record ids of every joined row, in storage order.
    pub fn unfiltered_ids(&self) -> BrowseResult<&[RecordId]> {
        if let Some(ids) = self.unfiltered.get() {
            return Ok(ids);
        }
        let ids = self.scan(&PredicateSet::empty())?;
        Ok(self.unfiltered.get_or_init(|| ids))
    }

    fn scan(&self, predicates: &PredicateSet) -> BrowseResult<Vec<RecordId>> {
        let pushdown = predicates.combinator == Combinator::And;
        let mut joined = Vec::new();
        for group in self.others() {
            let local: Vec<&Predicate> = predicates
                .predicates
                .iter()
                .filter(|p| group.positions.contains(&p.position()))
                .collect();
            let mut positions: Vec<usize> = local.iter().map(|p| p.position()).collect();
            positions.sort_unstable();
            positions.dedup();
            let columns: Vec<&Column> = positions
                .iter()
                .filter_map(|&p| self.selection.column_at(p))
                .collect();
            let mut first = self.first_per_key(group.dataset.id, &columns)?;
            if pushdown && !local.is_empty() {
                let compiled = CompiledPredicate::compile(Combinator::And, local, |pos| {
                    positions.iter().position(|&p| p == pos)
                })?;
                first.retain(|_, values| compiled.eval(values));
            }
            joined.push(JoinedGroup { positions, first });
        }

        let canonical = self.canonical();
        let residual: Vec<&Predicate> = predicates
            .predicates
            .iter()
            .filter(|p| {
                !pushdown || p.position() == 0 || canonical.positions.contains(&p.position())
            })
            .collect();
        let compiled = CompiledPredicate::compile(predicates.combinator, residual, Some)?;
        let canonical_columns: Vec<&Column> = canonical.columns.iter().collect();
        let codes = if compiled.accepts_all() {
            Vec::new()
        } else {
            canonical.codes()
        };

        let records = self.storage.project(canonical.dataset.id, &codes)?;
        let width = self.selection.grid_width();
        let mut ids = Vec::new();
        for record in records {
            if !joined.iter().all(|g| g.first.contains_key(&record.key)) {
                continue;
            }
            if compiled.accepts_all() {
                ids.push(record.id);
                continue;
            }
            let mut row = vec![Value::Null; width];
            row[0] = Value::Text(record.key.clone());
            let values = cast_values(&canonical_columns, record.values)?;
            for (value, &pos) in values.into_iter().zip(&canonical.positions) {
                row[pos] = value;
            }
            if !pushdown {
                for group in &joined {
                    if let Some(values) = group.first.get(&record.key) {
                        for (value, &pos) in values.iter().zip(&group.positions) {
                            row[pos] = value.clone();
                        }
                    }
                }
            }
            if compiled.eval(&row) {
                ids.push(record.id);
            }
        }
        Ok(ids)
    }

    /// Row count before filtering: the declared count of a lone dataset, the live
    /// joined count otherwise.
    pub fn unfiltered_count(&self) -> BrowseResult<u64> {
        if !self.selection.is_multi_dataset() {
            return Ok(self.canonical().dataset.row_count);
        }
        Ok(self.unfiltered_ids()?.len() as u64)
    }

    /// Typed values of the grid column at `position` for `ids`, in the order of `ids`.
    pub fn column_values(
        &self,
        ids: &[RecordId],
        position: usize,
    ) -> BrowseResult<Vec<(RecordId, Value)>> {
        let canonical = self.canonical().dataset.id;
        if position == 0 {
            return Ok(self
                .storage
                .project_ids(canonical, ids, &[])?
                .into_iter()
                .map(|r| (r.id, Value::Text(r.key)))
                .collect());
        }
        let (group, column) = self.column(position)?;
        if group.dataset.id == canonical {
            let records = self
                .storage
                .project_ids(canonical, ids, &[column.code.as_str()])?;
            return records
                .into_iter()
                .map(|r| {
                    let raw = r.values.into_iter().next().unwrap_or(Value::Null);
                    Ok((r.id, raw.cast(column.kind, &column.code)?))
                })
                .collect();
        }
        let first = self.first_per_key(group.dataset.id, &[column])?;
        Ok(self
            .storage
            .project_ids(canonical, ids, &[])?
            .into_iter()
            .map(|r| {
                let value = first
                    .get(&r.key)
                    .and_then(|values| values.first())
                    .cloned()
                    .unwrap_or(Value::Null);
                (r.id, value)
            })
            .collect())
    }

    /// Sort keys for `ids`; only the sort column is read.
    pub fn sort_keys(&self, ids: &[RecordId], sort: &SortSpec) -> BrowseResult<Vec<SortKey>> {
        Ok(self
            .column_values(ids, sort.position)?
            .into_iter()
            .map(|(id, value)| SortKey::new(value, id))
            .collect())
    }

    /// Full grid rows for `ids` in the order of `ids`; element 0 is the key.
    pub fn rows(&self, ids: &[RecordId]) -> BrowseResult<Vec<Vec<Value>>> {
        let canonical = self.canonical();
        let canonical_columns: Vec<&Column> = canonical.columns.iter().collect();
        let records = self
            .storage
            .project_ids(canonical.dataset.id, ids, &canonical.codes())?;
        let width = self.selection.grid_width();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let mut row = vec![Value::Null; width];
            for (value, &pos) in cast_values(&canonical_columns, record.values)?
                .into_iter()
                .zip(&canonical.positions)
            {
                row[pos] = value;
            }
            for group in self.others() {
                let Some(first) =
                    self.storage
                        .first_by_key(group.dataset.id, &record.key, &group.codes())?
                else {
                    continue;
                };
                let columns: Vec<&Column> = group.columns.iter().collect();
                for (value, &pos) in cast_values(&columns, first.values)?
                    .into_iter()
                    .zip(&group.positions)
                {
                    row[pos] = value;
                }
            }
            row[0] = Value::Text(record.key);
            rows.push(row);
        }
        Ok(rows)
    }
}
