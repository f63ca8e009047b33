//! Spreadsheet reading: the reader capability and workbook extraction

use crate::cell::{format_number, join_row, CellValue};
use crate::error::XlsearchError;
use calamine::{open_workbook_auto, Data, DataType, Reader, Sheets};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Row iterator handed out by a [`Workbook`]. Finite and not restartable.
pub type RowIter<'a> = Box<dyn Iterator<Item = Vec<CellValue>> + 'a>;

/// Opens spreadsheet files.
pub trait SpreadsheetReader: Send + Sync {
    fn open(&self, path: &Path) -> crate::Result<Box<dyn Workbook>>;
}

/// An opened spreadsheet.
pub trait Workbook {
    /// Sheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Rows of one sheet, top to bottom
    fn rows(&mut self, sheet: &str) -> crate::Result<RowIter<'_>>;
}

/// One non-empty row ready for the index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowEntry {
    /// Zero-based position of the row in its sheet
    pub row_index: usize,
    pub content: String,
}

/// All indexable rows of one sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRows {
    pub sheet_name: String,
    pub rows: Vec<RowEntry>,
}

impl SheetRows {
    pub fn entry_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read every sheet of `path` into memory.
///
/// Nothing is returned unless the whole workbook could be read, so a
/// failure part way through never reaches the store.
pub fn extract_workbook(
    reader: &dyn SpreadsheetReader,
    path: &Path,
    skip_header: bool,
) -> crate::Result<Vec<SheetRows>> {
    let mut workbook = reader.open(path)?;
    let mut sheets = Vec::new();

    for sheet_name in workbook.sheet_names() {
        let rows = workbook
            .rows(&sheet_name)?
            .enumerate()
            .skip(usize::from(skip_header))
            .filter_map(|(row_index, cells)| {
                let content = join_row(&cells);
                (!content.is_empty()).then_some(RowEntry { row_index, content })
            })
            .collect();

        sheets.push(SheetRows { sheet_name, rows });
    }

    Ok(sheets)
}

/// [`SpreadsheetReader`] backed by calamine (xlsx, xlsm, xlsb, xls, ods).
#[derive(Debug, Clone, Copy, Default)]
pub struct CalamineReader;

impl SpreadsheetReader for CalamineReader {
    fn open(&self, path: &Path) -> crate::Result<Box<dyn Workbook>> {
        let sheets =
            open_workbook_auto(path).map_err(|e| XlsearchError::extraction(path, e))?;
        Ok(Box::new(CalamineWorkbook {
            path: path.to_path_buf(),
            sheets,
        }))
    }
}

struct CalamineWorkbook {
    path: PathBuf,
    sheets: Sheets<BufReader<File>>,
}

impl Workbook for CalamineWorkbook {
    fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    fn rows(&mut self, sheet: &str) -> crate::Result<RowIter<'_>> {
        let range = self
            .sheets
            .worksheet_range(sheet)
            .map_err(|e| XlsearchError::extraction(&self.path, e))?;

        // The range starts at the first used cell; pad so row indices match the sheet.
        let leading = range.start().map(|(row, _)| row as usize).unwrap_or(0);
        let rows: Vec<Vec<CellValue>> = range
            .rows()
            .map(|row| row.iter().map(convert_cell).collect())
            .collect();

        Ok(Box::new(
            std::iter::repeat_with(Vec::new)
                .take(leading)
                .chain(rows),
        ))
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Other(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => match cell.as_datetime() {
            Some(datetime) if datetime.time() == chrono::NaiveTime::MIN => {
                CellValue::Other(datetime.format("%Y-%m-%d").to_string())
            }
            Some(datetime) => CellValue::Other(datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Other(format_number(dt.as_f64())),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Other(s.clone()),
    }
}
