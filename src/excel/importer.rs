//! Excel importer implementation - Excel (.xlsx) → Tables

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::core::UploadedTable;
use crate::error::{EngineError, EngineResult};
use crate::style::StyleMap;
use crate::types::{parse_date_text, CellValue, Column, Table};

/// One worksheet read as a table
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSheet {
    pub name: String,
    pub table: Table,
    pub source: SourceCells,
}

/// Where an imported table sat in its worksheet.
///
/// `rows[0]` is the header's worksheet row, `rows[i]` the row data row
/// `i - 1` was read from. Blank rows dropped on import have no entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCells {
    pub file: PathBuf,
    pub sheet: String,
    pub rows: Vec<u32>,
    pub first_col: u16,
    pub columns: u16,
}

impl SourceCells {
    /// Re-key worksheet-addressed styles to table coordinates
    pub fn remap(&self, styles: &StyleMap) -> StyleMap {
        let mut out = StyleMap::new();
        for (table_row, &sheet_row) in self.rows.iter().enumerate() {
            for (col, style) in styles.row(sheet_row) {
                let Some(rel) = col.checked_sub(self.first_col) else {
                    continue;
                };
                if rel < self.columns {
                    out.set(table_row as u32, rel, style.clone());
                }
            }
        }
        out
    }
}

/// Excel importer for converting .xlsx files to tables
pub struct ExcelImporter {
    path: PathBuf,
}

impl ExcelImporter {
    /// Create a new Excel importer
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Import every non-empty worksheet; row 1 is the header
    pub fn import(&self) -> EngineResult<Vec<ImportedSheet>> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path).map_err(|e| {
            EngineError::Import(format!("Failed to open Excel file {}: {}", self.path.display(), e))
        })?;

        let mut sheets = Vec::new();
        for sheet_name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&sheet_name)
                .map_err(|e| {
                    EngineError::Import(format!("Failed to read sheet '{}': {}", sheet_name, e))
                })?;
            if range.is_empty() {
                continue; // Skip empty sheets
            }
            let (table, rows) = Self::range_to_table(&range);
            debug!(
                sheet = %sheet_name,
                rows = table.row_count(),
                columns = table.column_count(),
                "sheet imported"
            );
            let (first_row, first_col) = range.start().unwrap_or((0, 0));
            let source = SourceCells {
                file: self.path.clone(),
                sheet: sheet_name.clone(),
                rows: rows.into_iter().map(|r| first_row + r).collect(),
                first_col: u16::try_from(first_col).unwrap_or(u16::MAX),
                columns: u16::try_from(table.column_count()).unwrap_or(u16::MAX),
            };
            sheets.push(ImportedSheet {
                name: sheet_name,
                table,
                source,
            });
        }

        if sheets.is_empty() {
            return Err(EngineError::Import(format!(
                "{} contains no data",
                self.path.display()
            )));
        }
        Ok(sheets)
    }

    /// File stem used to name a single-sheet file in a multi-file upload
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The table plus, per table row, its row offset within the range
    fn range_to_table(range: &Range<Data>) -> (Table, Vec<u32>) {
        let mut rows = range.rows();
        let Some(header) = rows.next() else {
            return (Table::new(), Vec::new());
        };
        let mut kept = vec![0];

        let mut seen = HashSet::new();
        let mut columns: Vec<Column> = header
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let raw = match cell {
                    Data::Empty => String::new(),
                    other => convert_cell(other).display_text().trim().to_string(),
                };
                let base = if raw.is_empty() {
                    format!("Column_{}", idx + 1)
                } else {
                    raw
                };
                let mut name = base.clone();
                let mut n = 2;
                while !seen.insert(name.to_lowercase()) {
                    name = format!("{}_{}", base, n);
                    n += 1;
                }
                Column::new(name, Vec::new())
            })
            .collect();

        for (offset, row) in (1u32..).zip(rows) {
            if row.iter().all(|cell| matches!(cell, Data::Empty)) {
                continue; // Skip blank rows
            }
            kept.push(offset);
            for (idx, column) in columns.iter_mut().enumerate() {
                column
                    .values
                    .push(row.get(idx).map(convert_cell).unwrap_or(CellValue::Null));
            }
        }

        (Table { columns }, kept)
    }
}

/// Import several workbooks as one upload.
///
/// With more than one file, a file holding a single sheet is named after
/// the file; otherwise tables keep their worksheet names.
pub fn import_uploads(paths: &[PathBuf]) -> EngineResult<Vec<UploadedTable>> {
    let multi = paths.len() > 1;
    let mut uploads = Vec::new();
    for path in paths {
        let importer = ExcelImporter::new(path);
        let sheets = importer.import()?;
        let single = sheets.len() == 1;
        for sheet in sheets {
            let name = if multi && single {
                importer.file_stem()
            } else {
                sheet.name
            };
            uploads.push(UploadedTable::new(name, sheet.table).with_source(sheet.source));
        }
    }
    Ok(uploads)
}

/// Map a calamine cell to a typed value
pub fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::String(s) if s.trim().is_empty() => CellValue::Null,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::DateTime(dt) => {
            serial_to_datetime(dt.as_f64()).map_or(CellValue::Null, CellValue::Date)
        }
        Data::DateTimeIso(s) => {
            parse_date_text(s).map_or_else(|| CellValue::Text(s.clone()), CellValue::Date)
        }
        Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Null,
    }
}

/// Convert an Excel serial date (1900 system) to a timestamp
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}
