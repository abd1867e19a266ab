use crate::catalog::schema::{Column, ColumnSize, Dataset};
use crate::catalog::types::{ColumnKind, Value};
use crate::error::{BrowseError, BrowseResult};
use crate::query::bounds::BoundsMap;
use serde::{Deserialize, Serialize};

/// One grid page as the widget consumes it. Counts travel as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResponse {
    #[serde(rename = "iTotalRecords")]
    pub total_records: String,
    #[serde(rename = "iTotalDisplayRecords")]
    pub total_display_records: String,
    #[serde(rename = "aaData")]
    pub rows: Vec<Vec<Value>>,
    pub min_max_dict: BoundsMap,
}

impl GridResponse {
    pub fn new(total: u64, displayed: u64, rows: Vec<Vec<Value>>, bounds: BoundsMap) -> Self {
        Self {
            total_records: total.to_string(),
            total_display_records: displayed.to_string(),
            rows,
            min_max_dict: bounds,
        }
    }

    pub fn total(&self) -> u64 {
        self.total_records.parse().unwrap_or(0)
    }

    pub fn displayed(&self) -> u64 {
        self.total_display_records.parse().unwrap_or(0)
    }

    pub fn to_json(&self) -> BrowseResult<String> {
        serde_json::to_string(self).map_err(|e| BrowseError::Encode(e.to_string()))
    }
}

/// Header metadata for one grid column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub reference: String,
    pub dataset: String,
    pub code: String,
    pub name: String,
    pub kind: ColumnKind,
    pub size: ColumnSize,
    pub mandatory: bool,
}

impl ColumnDescriptor {
    pub fn new(reference: &str, dataset: &Dataset, column: &Column) -> Self {
        Self {
            reference: reference.to_string(),
            dataset: dataset.code.clone(),
            code: column.code.clone(),
            name: column.name.clone(),
            kind: column.kind,
            size: column.size,
            mandatory: column.mandatory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::bounds::Bounds;

    #[test]
    fn serializes_widget_field_names() {
        let mut bounds = BoundsMap::new();
        bounds.insert(
            "Lexique383__nblettres".to_string(),
            Bounds {
                min: Value::Integer(1),
                max: Value::Integer(25),
            },
        );
        let response = GridResponse::new(
            142_694,
            1,
            vec![vec![Value::from("chat"), Value::Integer(4)]],
            bounds,
        );
        assert_eq!(
            response.to_json().unwrap(),
            r#"{"iTotalRecords":"142694","iTotalDisplayRecords":"1","aaData":[["chat",4]],"min_max_dict":{"Lexique383__nblettres":{"min":1,"max":25}}}"#
        );
        assert_eq!(response.total(), 142_694);
        assert_eq!(response.displayed(), 1);
    }
}
