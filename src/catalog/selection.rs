use crate::catalog::schema::{Column, ColumnId, Dataset, DatasetId, KEY_COLUMN};
use crate::error::{BrowseError, BrowseResult};
use crate::storage::Storage;
use std::collections::HashMap;

/// Separator between the dataset part and the column part of a reference.
pub const REFERENCE_SEPARATOR: &str = "__";

/// Columns of one dataset inside a selection, in request order.
#[derive(Debug, Clone)]
pub struct DatasetGroup {
    pub dataset: Dataset,
    pub columns: Vec<Column>,
    /// Grid position of each column; position 0 is the key column.
    pub positions: Vec<usize>,
}

impl DatasetGroup {
    pub fn codes(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.code.as_str()).collect()
    }
}

/// Request-scoped resolution of `dataset__column` references.
#[derive(Debug, Clone)]
pub struct ColumnSelection {
    references: Vec<String>,
    columns: Vec<Column>,
    column_groups: Vec<usize>,
    groups: Vec<DatasetGroup>,
}

pub fn split_reference(reference: &str) -> BrowseResult<(&str, &str)> {
    match reference.split_once(REFERENCE_SEPARATOR) {
        Some((dataset, column)) if !dataset.is_empty() && !column.is_empty() => {
            Ok((dataset, column))
        }
        _ => Err(BrowseError::invalid(format!(
            "column reference '{reference}' is not of the form dataset{REFERENCE_SEPARATOR}column"
        ))),
    }
}

fn resolve_dataset<S: Storage + ?Sized>(storage: &S, reference: &str) -> BrowseResult<Dataset> {
    if let Ok(id) = reference.parse::<u32>()
        && let Some(dataset) = storage.dataset(DatasetId(id))?
    {
        return Ok(dataset);
    }
    storage
        .dataset_by_code(reference)?
        .ok_or_else(|| BrowseError::dataset_not_found(reference))
}

fn resolve_column<S: Storage + ?Sized>(
    storage: &S,
    dataset: &Dataset,
    reference: &str,
    full_reference: &str,
) -> BrowseResult<Column> {
    if let Ok(id) = reference.parse::<u32>()
        && let Some(column) = storage.column(dataset.id, ColumnId(id))?
    {
        return Ok(column);
    }
    storage
        .column_by_code(dataset.id, reference)?
        .ok_or_else(|| BrowseError::column_not_found(full_reference))
}

impl ColumnSelection {
    /// Resolves references in order. Each distinct dataset reference hits storage once.
    pub fn resolve<S: Storage + ?Sized>(
        storage: &S,
        references: &[String],
    ) -> BrowseResult<Self> {
        if references.is_empty() {
            return Err(BrowseError::invalid("column selection is empty"));
        }
        let mut resolved_datasets: HashMap<&str, Dataset> = HashMap::new();
        let mut group_index: HashMap<DatasetId, usize> = HashMap::new();
        let mut groups: Vec<DatasetGroup> = Vec::new();
        let mut columns = Vec::with_capacity(references.len());
        let mut column_groups = Vec::with_capacity(references.len());

        for (idx, reference) in references.iter().enumerate() {
            let (dataset_ref, column_ref) = split_reference(reference)?;
            let dataset = match resolved_datasets.get(dataset_ref) {
                Some(dataset) => dataset.clone(),
                None => {
                    let dataset = resolve_dataset(storage, dataset_ref)?;
                    resolved_datasets.insert(dataset_ref, dataset.clone());
                    dataset
                }
            };
            let column = resolve_column(storage, &dataset, column_ref, reference)?;
            let group = *group_index.entry(dataset.id).or_insert_with(|| {
                groups.push(DatasetGroup {
                    dataset,
                    columns: Vec::new(),
                    positions: Vec::new(),
                });
                groups.len() - 1
            });
            groups[group].columns.push(column.clone());
            groups[group].positions.push(idx + 1);
            columns.push(column);
            column_groups.push(group);
        }

        Ok(Self {
            references: references.to_vec(),
            columns,
            column_groups,
            groups,
        })
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn groups(&self) -> &[DatasetGroup] {
        &self.groups
    }

    pub fn datasets(&self) -> impl Iterator<Item = &Dataset> {
        self.groups.iter().map(|g| &g.dataset)
    }

    pub fn is_multi_dataset(&self) -> bool {
        self.groups.len() > 1
    }

    /// Key column plus every selected column.
    pub fn grid_width(&self) -> usize {
        self.columns.len() + 1
    }

    /// Column shown at grid `position`; `None` for the key column and out of range.
    pub fn column_at(&self, position: usize) -> Option<&Column> {
        position.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    pub fn group_at(&self, position: usize) -> Option<&DatasetGroup> {
        position
            .checked_sub(1)
            .and_then(|i| self.column_groups.get(i))
            .map(|&g| &self.groups[g])
    }

    /// Dataset ids in ascending order, independent of request order.
    pub fn canonical_dataset_ids(&self) -> Vec<DatasetId> {
        let mut ids: Vec<DatasetId> = self.groups.iter().map(|g| g.dataset.id).collect();
        ids.sort();
        ids
    }

    /// `<dataset code>__<column code>` for the column at `position`.
    pub fn bounds_key(&self, position: usize) -> Option<String> {
        let group = self.group_at(position)?;
        let column = self.column_at(position)?;
        Some(format!(
            "{}{REFERENCE_SEPARATOR}{}",
            group.dataset.code, column.code
        ))
    }

    /// Export header: the key column followed by column codes.
    pub fn header(&self) -> Vec<String> {
        std::iter::once(KEY_COLUMN.to_string())
            .chain(self.columns.iter().map(|c| c.code.clone()))
            .collect()
    }
}
