use crate::catalog::types::{ColumnKind, Payload};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of the implicit key column shared by every dataset.
pub const KEY_COLUMN: &str = "ortho";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "French")]
    French,
    #[serde(rename = "English")]
    English,
    #[serde(rename = "Dutch")]
    Dutch,
    #[serde(rename = "Multiple languages")]
    Multiple,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnSize {
    Large,
    #[default]
    Medium,
    Small,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    pub language: Language,
    /// Record count refreshed after every bulk load; trusted as the unfiltered count.
    pub row_count: u64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub dataset_id: DatasetId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: ColumnKind,
    pub size: ColumnSize,
    pub mandatory: bool,
    /// Bounds computed at load time. Only meaningful for numeric kinds.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Column {
    /// Replaces characters that cannot appear in a column code.
    pub fn clean_code(raw: &str) -> String {
        raw.chars()
            .map(|c| match c {
                '"' | '\'' | ';' | '.' | ',' | ' ' | '`' => '_',
                other => other,
            })
            .collect()
    }

    pub fn precomputed_bounds(&self) -> Option<(f64, f64)> {
        if !self.kind.is_numeric() {
            return None;
        }
        Some((self.min?, self.max?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub dataset_id: DatasetId,
    pub key: CompactString,
    pub payload: Payload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDataset {
    pub code: String,
    pub name: String,
    pub language: Language,
    pub info: Option<String>,
    pub website: Option<String>,
    pub authors: Option<String>,
    pub tags: BTreeSet<String>,
}

impl NewDataset {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewColumn {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: ColumnKind,
    pub size: ColumnSize,
    pub mandatory: bool,
}

impl NewColumn {
    pub fn new(code: impl Into<String>, kind: ColumnKind) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            description: None,
            kind,
            size: if kind == ColumnKind::Integer {
                ColumnSize::Small
            } else {
                ColumnSize::Medium
            },
            mandatory: false,
        }
    }

    pub fn text(code: impl Into<String>) -> Self {
        Self::new(code, ColumnKind::Text)
    }

    pub fn integer(code: impl Into<String>) -> Self {
        Self::new(code, ColumnKind::Integer)
    }

    pub fn float(code: impl Into<String>) -> Self {
        Self::new(code, ColumnKind::Float)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_code_replaces_forbidden_characters() {
        assert_eq!(Column::clean_code("freq films.2"), "freq_films_2");
        assert_eq!(Column::clean_code("a'b\"c;d,e`f"), "a_b_c_d_e_f");
    }

    #[test]
    fn text_columns_have_no_precomputed_bounds() {
        let column = Column {
            id: ColumnId(1),
            dataset_id: DatasetId(1),
            code: "cgram".into(),
            name: "cgram".into(),
            description: None,
            kind: ColumnKind::Text,
            size: ColumnSize::Medium,
            mandatory: false,
            min: Some(0.0),
            max: Some(1.0),
        };
        assert_eq!(column.precomputed_bounds(), None);
    }

    #[test]
    fn language_uses_display_labels() {
        assert_eq!(
            serde_json::to_string(&Language::Multiple).unwrap(),
            "\"Multiple languages\""
        );
    }
}
