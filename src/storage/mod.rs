//! Storage engine seam.
//!
//! The query core only needs lookups of dataset/column metadata and narrow
//! projections of records; filtering, joining and ordering happen in
//! [`crate::query`]. [`memory::MemoryStorage`] is the in-process engine used by
//! the tests and by embedders without an external store.

pub mod memory;

use crate::catalog::schema::{Column, ColumnId, Dataset, DatasetId, RecordId};
use crate::catalog::types::Value;
use crate::error::BrowseResult;
use compact_str::CompactString;

pub use memory::{LoadSummary, MemoryStorage};

/// One record reduced to its key and the requested raw payload fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedRecord {
    pub id: RecordId,
    pub key: CompactString,
    /// Raw values in the order of the requested codes; absent fields are `Null`.
    pub values: Vec<Value>,
}

pub trait Storage: Send + Sync {
    fn dataset(&self, id: DatasetId) -> BrowseResult<Option<Dataset>>;

    fn dataset_by_code(&self, code: &str) -> BrowseResult<Option<Dataset>>;

    fn column(&self, dataset: DatasetId, id: ColumnId) -> BrowseResult<Option<Column>>;

    fn column_by_code(&self, dataset: DatasetId, code: &str) -> BrowseResult<Option<Column>>;

    /// Every record of `dataset` in storage order.
    fn project(&self, dataset: DatasetId, codes: &[&str]) -> BrowseResult<Vec<ProjectedRecord>>;

    /// Records of `dataset` for `ids`, in the order of `ids`. Unknown ids are skipped.
    fn project_ids(
        &self,
        dataset: DatasetId,
        ids: &[RecordId],
        codes: &[&str],
    ) -> BrowseResult<Vec<ProjectedRecord>>;

    /// First record of `dataset` (storage order) whose key equals `key`.
    fn first_by_key(
        &self,
        dataset: DatasetId,
        key: &str,
        codes: &[&str],
    ) -> BrowseResult<Option<ProjectedRecord>>;
}
