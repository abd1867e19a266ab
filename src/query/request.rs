//! Grid widget request parameters.
//!
//! The widget sends a flat list of form/query pairs such as
//! `columns[2][search][value]=NOM` or `order[0][dir]=desc`. Unknown keys
//! (`draw`, `columns[i][data]`, regex flags, ...) are ignored.

use crate::error::{BrowseError, BrowseResult};
use crate::query::plan::Direction;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLength {
    /// `length=-1`
    All,
    Limit(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSearch {
    Text(String),
    /// Raw `[low, high]` literals, parsed later under the column kind.
    Range(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnParams {
    /// `None` when the widget did not send the flag; treated as searchable.
    pub searchable: Option<bool>,
    pub search: Option<ColumnSearch>,
}

impl ColumnParams {
    pub fn is_searchable(&self) -> bool {
        self.searchable.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParam {
    pub column: usize,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridRequest {
    pub global_search: Option<String>,
    pub columns: BTreeMap<usize, ColumnParams>,
    pub order: Option<OrderParam>,
    pub start: usize,
    pub length: Option<PageLength>,
    pub export_mode: Option<String>,
    pub export_post: bool,
}

#[derive(Default)]
struct ColumnDraft {
    searchable: Option<bool>,
    text: Option<String>,
    range: Vec<String>,
}

fn parse_bool(key: &str, raw: &str) -> BrowseResult<bool> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(BrowseError::invalid(format!(
            "{key} must be 'true' or 'false', got '{other}'"
        ))),
    }
}

fn parse_index(key: &str, raw: &str) -> BrowseResult<usize> {
    raw.trim().parse::<usize>().map_err(|_| {
        BrowseError::invalid(format!(
            "{key} must be a non-negative integer, got '{raw}'"
        ))
    })
}

impl GridRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the widget's flat key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> BrowseResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = GridRequest::default();
        let mut drafts: BTreeMap<usize, ColumnDraft> = BTreeMap::new();
        let mut order_column: Option<usize> = None;
        let mut order_dir: Option<Direction> = None;

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = value.as_ref();
            match key {
                "search[value]" => {
                    request.global_search = (!value.is_empty()).then(|| value.to_string());
                }
                "order[0][column]" => order_column = Some(parse_index(key, value)?),
                "order[0][dir]" => order_dir = Some(Direction::parse(value)?),
                "start" => request.start = parse_index(key, value)?,
                "length" => {
                    request.length = Some(if value.trim() == "-1" {
                        PageLength::All
                    } else {
                        PageLength::Limit(parse_index(key, value)?)
                    });
                }
                "export_mode" => {
                    request.export_mode = (!value.is_empty()).then(|| value.to_string());
                }
                "export_post" => request.export_post = !value.is_empty(),
                _ => {
                    let Some(rest) = key.strip_prefix("columns[") else {
                        continue;
                    };
                    let Some((idx, field)) = rest.split_once(']') else {
                        continue;
                    };
                    let Ok(idx) = idx.parse::<usize>() else {
                        continue;
                    };
                    match field {
                        "[searchable]" => {
                            drafts.entry(idx).or_default().searchable =
                                Some(parse_bool(key, value)?);
                        }
                        "[search][value]" => {
                            drafts.entry(idx).or_default().text = Some(value.to_string());
                        }
                        "[search][value][]" => {
                            drafts.entry(idx).or_default().range.push(value.to_string());
                        }
                        _ => {}
                    }
                }
            }
        }

        for (idx, draft) in drafts {
            // A non-empty text value wins over range values sent for the same column.
            let text = draft.text.filter(|text| !text.is_empty());
            let search = match (text, draft.range.len()) {
                (Some(text), _) => Some(ColumnSearch::Text(text)),
                (None, 0) => None,
                (None, 2) => {
                    let mut bounds = draft.range.into_iter();
                    match (bounds.next(), bounds.next()) {
                        (Some(low), Some(high)) => Some(ColumnSearch::Range(low, high)),
                        _ => None,
                    }
                }
                (None, n) => {
                    return Err(BrowseError::invalid(format!(
                        "range filter on column {idx} needs exactly two values, got {n}"
                    )));
                }
            };
            request.columns.insert(
                idx,
                ColumnParams {
                    searchable: draft.searchable,
                    search,
                },
            );
        }

        if order_column.is_some() || order_dir.is_some() {
            request.order = Some(OrderParam {
                column: order_column.unwrap_or(0),
                direction: order_dir.unwrap_or(Direction::Asc),
            });
        }
        Ok(request)
    }

    pub fn with_global_search(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.global_search = (!text.is_empty()).then_some(text);
        self
    }

    pub fn with_searchable(mut self, column: usize, searchable: bool) -> Self {
        self.columns.entry(column).or_default().searchable = Some(searchable);
        self
    }

    pub fn with_column_search(mut self, column: usize, text: impl Into<String>) -> Self {
        self.columns.entry(column).or_default().search = Some(ColumnSearch::Text(text.into()));
        self
    }

    pub fn with_range(
        mut self,
        column: usize,
        low: impl Into<String>,
        high: impl Into<String>,
    ) -> Self {
        self.columns.entry(column).or_default().search =
            Some(ColumnSearch::Range(low.into(), high.into()));
        self
    }

    pub fn with_order(mut self, column: usize, direction: Direction) -> Self {
        self.order = Some(OrderParam { column, direction });
        self
    }

    pub fn with_window(mut self, start: usize, length: PageLength) -> Self {
        self.start = start;
        self.length = Some(length);
        self
    }

    pub fn with_export(mut self, mode: impl Into<String>, post: bool) -> Self {
        self.export_mode = Some(mode.into());
        self.export_post = post;
        self
    }

    /// Column searchability; columns absent from the request are searchable.
    pub fn is_searchable(&self, column: usize) -> bool {
        self.columns
            .get(&column)
            .is_none_or(ColumnParams::is_searchable)
    }
}
