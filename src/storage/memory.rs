use crate::catalog::schema::{
    Column, ColumnId, Dataset, DatasetId, NewColumn, NewDataset, Record, RecordId,
};
use crate::catalog::types::{Payload, Value};
use crate::error::{BrowseError, BrowseResult, ResourceType};
use crate::storage::{ProjectedRecord, Storage};
use compact_str::CompactString;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub inserted: usize,
    /// Rows identical (dataset, key, payload) to an existing record.
    pub duplicates: usize,
}

#[derive(Debug, Default)]
struct Inner {
    next_dataset: u32,
    next_column: u32,
    next_record: u64,
    datasets: BTreeMap<DatasetId, Dataset>,
    columns: BTreeMap<DatasetId, Vec<Column>>,
    records: BTreeMap<DatasetId, Vec<Record>>,
    positions: HashMap<RecordId, usize>,
    by_key: HashMap<(DatasetId, CompactString), Vec<usize>>,
}

impl Inner {
    fn require_dataset(&self, id: DatasetId) -> BrowseResult<()> {
        if self.datasets.contains_key(&id) {
            Ok(())
        } else {
            Err(BrowseError::dataset_not_found(id.to_string()))
        }
    }

    fn refresh_dataset_stats(&mut self, id: DatasetId) {
        let records = self.records.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        let row_count = records.len() as u64;
        if let Some(columns) = self.columns.get_mut(&id) {
            for column in columns.iter_mut().filter(|c| c.kind.is_numeric()) {
                let mut min: Option<f64> = None;
                let mut max: Option<f64> = None;
                for record in records {
                    let Some(v) = record
                        .payload
                        .cast(&column.code, column.kind)
                        .ok()
                        .and_then(|v| v.as_f64())
                    else {
                        continue;
                    };
                    min = Some(min.map_or(v, |m| m.min(v)));
                    max = Some(max.map_or(v, |m| m.max(v)));
                }
                column.min = min;
                column.max = max;
            }
        }
        if let Some(dataset) = self.datasets.get_mut(&id) {
            dataset.row_count = row_count;
        }
    }
}

fn project_record(record: &Record, codes: &[&str]) -> ProjectedRecord {
    ProjectedRecord {
        id: record.id,
        key: record.key.clone(),
        values: codes
            .iter()
            .map(|code| record.payload.get(code).clone())
            .collect(),
    }
}

/// In-process storage engine plus the ingestion hooks that populate it.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    inner: RwLock<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dataset(&self, new: NewDataset) -> BrowseResult<DatasetId> {
        let mut inner = self.inner.write();
        if inner.datasets.values().any(|d| d.code == new.code) {
            return Err(BrowseError::AlreadyExists {
                resource_type: ResourceType::Dataset,
                resource_id: new.code,
            });
        }
        inner.next_dataset += 1;
        let id = DatasetId(inner.next_dataset);
        inner.datasets.insert(
            id,
            Dataset {
                id,
                code: new.code,
                name: new.name,
                info: new.info,
                website: new.website,
                authors: new.authors,
                language: new.language,
                row_count: 0,
                tags: new.tags,
            },
        );
        inner.columns.insert(id, Vec::new());
        inner.records.insert(id, Vec::new());
        Ok(id)
    }

    pub fn declare_column(&self, dataset: DatasetId, new: NewColumn) -> BrowseResult<ColumnId> {
        let mut inner = self.inner.write();
        inner.require_dataset(dataset)?;
        let code = Column::clean_code(&new.code);
        if inner
            .columns
            .get(&dataset)
            .is_some_and(|cols| cols.iter().any(|c| c.code == code))
        {
            return Err(BrowseError::AlreadyExists {
                resource_type: ResourceType::Column,
                resource_id: code,
            });
        }
        inner.next_column += 1;
        let id = ColumnId(inner.next_column);
        inner.columns.entry(dataset).or_default().push(Column {
            id,
            dataset_id: dataset,
            code,
            name: new.name,
            description: new.description,
            kind: new.kind,
            size: new.size,
            mandatory: new.mandatory,
            min: None,
            max: None,
        });
        Ok(id)
    }

    /// Appends records to `dataset`, then refreshes its row count and the
    /// precomputed bounds of its numeric columns.
    pub fn load_records<I, K>(&self, dataset: DatasetId, rows: I) -> BrowseResult<LoadSummary>
    where
        I: IntoIterator<Item = (K, Payload)>,
        K: Into<CompactString>,
    {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.require_dataset(dataset)?;
        let declared: BTreeSet<String> = inner
            .columns
            .get(&dataset)
            .map(|cols| cols.iter().map(|c| c.code.clone()).collect())
            .unwrap_or_default();

        let mut staged = Vec::new();
        for (key, mut payload) in rows {
            if let Some(unknown) = payload.codes().find(|code| !declared.contains(*code)) {
                return Err(BrowseError::invalid(format!(
                    "payload field '{unknown}' is not a declared column"
                )));
            }
            for code in &declared {
                if !payload.contains(code) {
                    payload.insert(code.clone(), Value::Null);
                }
            }
            staged.push((key.into(), payload));
        }

        let mut summary = LoadSummary::default();
        for (key, payload) in staged {
            let lookup = (dataset, key);
            let records = inner.records.entry(dataset).or_default();
            let duplicate = inner
                .by_key
                .get(&lookup)
                .is_some_and(|slots| slots.iter().any(|&i| records[i].payload == payload));
            if duplicate {
                summary.duplicates += 1;
                continue;
            }
            inner.next_record += 1;
            let id = RecordId(inner.next_record);
            let slot = records.len();
            records.push(Record {
                id,
                dataset_id: dataset,
                key: lookup.1.clone(),
                payload,
            });
            inner.positions.insert(id, slot);
            inner.by_key.entry(lookup).or_default().push(slot);
            summary.inserted += 1;
        }
        inner.refresh_dataset_stats(dataset);
        debug!(
            dataset = %dataset,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "records loaded"
        );
        Ok(summary)
    }

    /// Removes a dataset with its columns and records.
    pub fn drop_dataset(&self, dataset: DatasetId) -> BrowseResult<()> {
        let mut inner = self.inner.write();
        inner.require_dataset(dataset)?;
        inner.datasets.remove(&dataset);
        inner.columns.remove(&dataset);
        if let Some(records) = inner.records.remove(&dataset) {
            for record in &records {
                inner.positions.remove(&record.id);
            }
        }
        inner.by_key.retain(|(owner, _), _| *owner != dataset);
        Ok(())
    }

    /// Tags still attached to at least one dataset.
    pub fn tags(&self) -> BTreeSet<String> {
        self.inner
            .read()
            .datasets
            .values()
            .flat_map(|d| d.tags.iter().cloned())
            .collect()
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.inner.read().datasets.values().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn dataset(&self, id: DatasetId) -> BrowseResult<Option<Dataset>> {
        Ok(self.inner.read().datasets.get(&id).cloned())
    }

    fn dataset_by_code(&self, code: &str) -> BrowseResult<Option<Dataset>> {
        Ok(self
            .inner
            .read()
            .datasets
            .values()
            .find(|d| d.code == code)
            .cloned())
    }

    fn column(&self, dataset: DatasetId, id: ColumnId) -> BrowseResult<Option<Column>> {
        Ok(self
            .inner
            .read()
            .columns
            .get(&dataset)
            .and_then(|cols| cols.iter().find(|c| c.id == id).cloned()))
    }

    fn column_by_code(&self, dataset: DatasetId, code: &str) -> BrowseResult<Option<Column>> {
        Ok(self
            .inner
            .read()
            .columns
            .get(&dataset)
            .and_then(|cols| cols.iter().find(|c| c.code == code).cloned()))
    }

    fn project(&self, dataset: DatasetId, codes: &[&str]) -> BrowseResult<Vec<ProjectedRecord>> {
        let inner = self.inner.read();
        inner.require_dataset(dataset)?;
        Ok(inner
            .records
            .get(&dataset)
            .map(|records| records.iter().map(|r| project_record(r, codes)).collect())
            .unwrap_or_default())
    }

    fn project_ids(
        &self,
        dataset: DatasetId,
        ids: &[RecordId],
        codes: &[&str],
    ) -> BrowseResult<Vec<ProjectedRecord>> {
        let inner = self.inner.read();
        inner.require_dataset(dataset)?;
        let Some(records) = inner.records.get(&dataset) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| inner.positions.get(id).and_then(|&slot| records.get(slot)))
            .filter(|record| record.dataset_id == dataset)
            .map(|record| project_record(record, codes))
            .collect())
    }

    fn first_by_key(
        &self,
        dataset: DatasetId,
        key: &str,
        codes: &[&str],
    ) -> BrowseResult<Option<ProjectedRecord>> {
        let inner = self.inner.read();
        inner.require_dataset(dataset)?;
        let lookup = (dataset, CompactString::from(key));
        let first = inner
            .by_key
            .get(&lookup)
            .and_then(|slots| slots.first())
            .and_then(|&slot| inner.records.get(&dataset).and_then(|r| r.get(slot)));
        Ok(first.map(|record| project_record(record, codes)))
    }
}
