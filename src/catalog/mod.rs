pub mod schema;
pub mod selection;
pub mod types;

pub use schema::{
    Column, ColumnId, ColumnSize, Dataset, DatasetId, KEY_COLUMN, Language, NewColumn,
    NewDataset, Record, RecordId,
};
pub use selection::{ColumnSelection, DatasetGroup};
pub use types::{ColumnKind, Payload, Value};
