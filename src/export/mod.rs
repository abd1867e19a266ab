//! Full-result exports.
//!
//! Delimited formats are written row by row while ids are resolved to rows in
//! fixed-size chunks, so memory stays bounded by the chunk size. The workbook
//! format goes through [`SpreadsheetWriter`].

pub mod xlsx;

use crate::catalog::schema::RecordId;
use crate::catalog::types::Value;
use crate::error::{BrowseError, BrowseResult};
use crate::query::join::JoinEngine;
use crate::storage::Storage;
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

pub use xlsx::XlsxSheetWriter;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportMode {
    Csv,
    Tsv,
    Excel,
}

impl ExportMode {
    /// Case-insensitive `CSV`, `TSV` or `EXCEL`.
    pub fn parse(raw: &str) -> BrowseResult<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("csv") {
            Ok(ExportMode::Csv)
        } else if raw.eq_ignore_ascii_case("tsv") {
            Ok(ExportMode::Tsv)
        } else if raw.eq_ignore_ascii_case("excel") {
            Ok(ExportMode::Excel)
        } else {
            Err(BrowseError::invalid(format!(
                "unsupported export mode '{raw}'"
            )))
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportMode::Csv => "CSV",
            ExportMode::Tsv => "TSV",
            ExportMode::Excel => "EXCEL",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportMode::Csv => "csv",
            ExportMode::Tsv => "tsv",
            ExportMode::Excel => "xlsx",
        }
    }

    pub fn file_name(self, basename: &str) -> String {
        format!("{basename}.{}", self.extension())
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportMode::Csv => "text/csv",
            ExportMode::Tsv => "text/tab-separated-values",
            ExportMode::Excel => XLSX_CONTENT_TYPE,
        }
    }

    /// Field delimiter of the delimited formats.
    pub fn delimiter(self) -> Option<u8> {
        match self {
            ExportMode::Csv => Some(b','),
            ExportMode::Tsv => Some(b'\t'),
            ExportMode::Excel => None,
        }
    }
}

impl FromStr for ExportMode {
    type Err = BrowseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for workbook exports. Implementations may buffer until [`finish`](Self::finish).
pub trait SpreadsheetWriter {
    fn write_header(&mut self, header: &[String]) -> BrowseResult<()>;

    fn write_row(&mut self, row: &[Value]) -> BrowseResult<()>;

    fn finish<W: Write>(self, out: W) -> BrowseResult<()>;
}

/// Grid rows of an ordered id list, fetched from storage one chunk at a time.
pub struct ExportRows<'e, 'a, S: Storage + ?Sized> {
    engine: &'e JoinEngine<'a, S>,
    ids: Vec<RecordId>,
    cursor: usize,
    chunk: usize,
    buffer: VecDeque<Vec<Value>>,
}

impl<'e, 'a, S: Storage + ?Sized> ExportRows<'e, 'a, S> {
    pub fn new(engine: &'e JoinEngine<'a, S>, ids: Vec<RecordId>, chunk: usize) -> Self {
        Self {
            engine,
            ids,
            cursor: 0,
            chunk: chunk.max(1),
            buffer: VecDeque::new(),
        }
    }
}

impl<S: Storage + ?Sized> Iterator for ExportRows<'_, '_, S> {
    type Item = BrowseResult<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() {
            if self.cursor >= self.ids.len() {
                return None;
            }
            let end = (self.cursor + self.chunk).min(self.ids.len());
            let fetched = self.engine.rows(&self.ids[self.cursor..end]);
            self.cursor = end;
            match fetched {
                Ok(rows) => self.buffer.extend(rows),
                Err(err) => {
                    self.cursor = self.ids.len();
                    return Some(Err(err));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

fn csv_error(err: csv::Error) -> BrowseError {
    if err.is_io_error() {
        match err.into_kind() {
            csv::ErrorKind::Io(io) => BrowseError::Io(io),
            other => BrowseError::Encode(format!("{other:?}")),
        }
    } else {
        BrowseError::Encode(err.to_string())
    }
}

/// Writes `header` then every row with `delimiter`; nulls become empty cells.
/// Returns the number of data rows written.
pub fn write_delimited<W, I>(
    delimiter: u8,
    header: &[String],
    rows: I,
    out: W,
) -> BrowseResult<u64>
where
    W: Write,
    I: IntoIterator<Item = BrowseResult<Vec<Value>>>,
{
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(out);
    writer.write_record(header).map_err(csv_error)?;
    let mut written = 0u64;
    for row in rows {
        let row = row?;
        writer
            .write_record(row.iter().map(Value::display_text))
            .map_err(csv_error)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Feeds `header` and every row into `sheet`, then finishes it into `out`.
pub fn write_spreadsheet<X, W, I>(
    mut sheet: X,
    header: &[String],
    rows: I,
    out: W,
) -> BrowseResult<u64>
where
    X: SpreadsheetWriter,
    W: Write,
    I: IntoIterator<Item = BrowseResult<Vec<Value>>>,
{
    sheet.write_header(header)?;
    let mut written = 0u64;
    for row in rows {
        sheet.write_row(&row?)?;
        written += 1;
    }
    sheet.finish(out)?;
    Ok(written)
}
