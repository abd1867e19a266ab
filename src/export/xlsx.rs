use crate::catalog::types::Value;
use crate::error::{BrowseError, BrowseResult};
use crate::export::SpreadsheetWriter;
use rust_xlsxwriter::{Workbook, Worksheet, XlsxError};
use std::io::Write;

fn xlsx_error(err: XlsxError) -> BrowseError {
    BrowseError::Encode(err.to_string())
}

/// Single-sheet workbook, buffered in memory until `finish`.
pub struct XlsxSheetWriter {
    worksheet: Worksheet,
    next_row: u32,
}

impl XlsxSheetWriter {
    pub fn new(sheet_name: &str) -> BrowseResult<Self> {
        let mut worksheet = Worksheet::new();
        worksheet.set_name(sheet_name).map_err(xlsx_error)?;
        Ok(Self {
            worksheet,
            next_row: 0,
        })
    }

    fn column(idx: usize) -> BrowseResult<u16> {
        u16::try_from(idx)
            .map_err(|_| BrowseError::invalid(format!("workbook column {idx} is out of range")))
    }
}

impl SpreadsheetWriter for XlsxSheetWriter {
    fn write_header(&mut self, header: &[String]) -> BrowseResult<()> {
        for (idx, name) in header.iter().enumerate() {
            self.worksheet
                .write_string(self.next_row, Self::column(idx)?, name.as_str())
                .map_err(xlsx_error)?;
        }
        self.next_row += 1;
        Ok(())
    }

    fn write_row(&mut self, row: &[Value]) -> BrowseResult<()> {
        for (idx, value) in row.iter().enumerate() {
            let col = Self::column(idx)?;
            let written = match value {
                Value::Text(s) => self.worksheet.write_string(self.next_row, col, s.as_str()),
                Value::Integer(v) => self.worksheet.write_number(self.next_row, col, *v as f64),
                Value::Float(v) => self.worksheet.write_number(self.next_row, col, *v),
                Value::Null => continue,
            };
            written.map_err(xlsx_error)?;
        }
        self.next_row += 1;
        Ok(())
    }

    fn finish<W: Write>(self, mut out: W) -> BrowseResult<()> {
        let mut workbook = Workbook::new();
        workbook.push_worksheet(self.worksheet);
        let bytes = workbook.save_to_buffer().map_err(xlsx_error)?;
        out.write_all(&bytes)?;
        out.flush()?;
        Ok(())
    }
}
