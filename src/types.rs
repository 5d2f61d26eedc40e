use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::spec::OperationSpec;
use crate::style::StyleMap;

/// Date layouts recognised when a text cell (or a spec value) is read as a date.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];

//==============================================================================
// Cell values
//==============================================================================

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDateTime),
    Text(String),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Null, or text that is empty after trimming
    pub fn is_null(&self) -> bool {
        match self {
            CellValue::Null => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view; text is parsed leniently (thousands separators allowed)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().replace(',', "").parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date_text(s),
            _ => None,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Date(d) => {
                if d.time() == chrono::NaiveTime::MIN {
                    d.format("%Y-%m-%d").to_string()
                } else {
                    d.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            CellValue::Text(s) => s.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            CellValue::Null => "Null",
            CellValue::Bool(_) => "Boolean",
            CellValue::Number(_) => "Number",
            CellValue::Date(_) => "Date",
            CellValue::Text(_) => "Text",
        }
    }

    /// Convert a JSON scalar from a spec document
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(CellValue::Null, CellValue::Number),
            serde_json::Value::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }

    /// Loose equality: numbers match numeric text, everything else is typed.
    pub fn loosely_equals(&self, other: &CellValue) -> bool {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a == b,
            (CellValue::Number(a), CellValue::Text(_)) => other.as_number() == Some(*a),
            (CellValue::Text(_), CellValue::Number(b)) => self.as_number() == Some(*b),
            (CellValue::Date(a), _) => other.as_date() == Some(*a),
            (_, CellValue::Date(b)) => self.as_date() == Some(*b),
            _ => self == other,
        }
    }

    /// Sort order within one column. Nulls are handled by the caller.
    pub fn sort_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            (CellValue::Bool(a), CellValue::Bool(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            CellValue::Number(_) => 0,
            CellValue::Date(_) => 1,
            CellValue::Bool(_) => 2,
            CellValue::Text(_) => 3,
            CellValue::Null => 4,
        }
    }
}

pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Format a number for display, removing unnecessary decimal places
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

//==============================================================================
// Tables
//==============================================================================

/// A named column of typed values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a header and row-major data, checking every row's width.
    pub fn from_rows(headers: &[&str], rows: Vec<Vec<CellValue>>) -> Result<Self, String> {
        let mut columns: Vec<Column> = headers
            .iter()
            .map(|h| Column::new(*h, Vec::with_capacity(rows.len())))
            .collect();
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(format!(
                    "Row {} has {} values, expected {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                ));
            }
            for (col, value) in columns.iter_mut().zip(row) {
                col.values.push(value);
            }
        }
        Ok(Self { columns })
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Number of rows (length of first column, all should be same)
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |col| col.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Exact match first, then a trimmed case-insensitive match.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                let wanted = name.trim().to_lowercase();
                self.columns
                    .iter()
                    .position(|c| c.name.trim().to_lowercase() == wanted)
            })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.column_index(name).map(|idx| &self.columns[idx])
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        &self.columns[col].values[row]
    }

    pub fn row(&self, row: usize) -> Vec<CellValue> {
        self.columns.iter().map(|c| c.values[row].clone()).collect()
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        for (col, value) in self.columns.iter_mut().zip(row) {
            col.values.push(value);
        }
    }

    /// New table containing the given source rows, in the given order
    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| {
                    let values = indices.iter().map(|&i| c.values[i].clone()).collect();
                    Column::new(c.name.clone(), values)
                })
                .collect(),
        }
    }

    /// Validate all columns have the same length
    pub fn validate_lengths(&self) -> Result<(), String> {
        let row_count = self.row_count();
        for column in &self.columns {
            if column.len() != row_count {
                return Err(format!(
                    "Column '{}' has {} rows, expected {} rows",
                    column.name,
                    column.len(),
                    row_count
                ));
            }
        }
        Ok(())
    }
}

//==============================================================================
// Sheets and artifacts
//==============================================================================

/// Sheet-level view settings that are not per-cell style
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    /// Frozen (rows, cols); `None` = no freeze
    pub freeze_panes: Option<(u32, u16)>,
    pub auto_filter: bool,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            freeze_panes: None,
            auto_filter: true,
        }
    }
}

/// One named worksheet: table data plus its style and layout
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub table: Table,
    pub styles: StyleMap,
    pub layout: SheetLayout,
    /// Data-row indices holding computed subtotal rows
    pub summary_rows: BTreeSet<usize>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, table: Table) -> Self {
        Self {
            name: name.into(),
            table,
            styles: StyleMap::new(),
            layout: SheetLayout::default(),
            summary_rows: BTreeSet::new(),
        }
    }

    /// Worksheet row count including the header
    pub fn worksheet_rows(&self) -> usize {
        self.table.row_count() + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Upload,
    Generated,
}

/// An immutable, fully-realized workbook
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub sheets: Vec<Sheet>,
    pub source: SourceKind,
    pub created_at: DateTime<Utc>,
    pub produced_by: Option<OperationSpec>,
    /// Where the artifact was persisted, if it was
    pub file: Option<PathBuf>,
}

impl Artifact {
    pub fn new(sheets: Vec<Sheet>, source: SourceKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sheets,
            source,
            created_at: Utc::now(),
            produced_by: None,
            file: None,
        }
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Data row counts (header excluded)
    pub fn row_counts(&self) -> Vec<usize> {
        self.sheets.iter().map(|s| s.table.row_count()).collect()
    }

    /// Case-insensitive sheet lookup
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.sheets
            .iter()
            .position(|s| s.name.to_lowercase() == wanted)
    }

    pub fn filename(&self) -> Option<String> {
        self.file
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_table() -> Table {
        Table::from_rows(
            &["Status", "Amount"],
            vec![
                vec![CellValue::text("Active"), CellValue::Number(10.0)],
                vec![CellValue::text("Paused"), CellValue::Number(20.0)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let err = Table::from_rows(&["a", "b"], vec![vec![CellValue::Null]]).unwrap_err();
        assert!(err.contains("expected 2"));
    }

    #[test]
    fn test_column_index_falls_back_to_case_insensitive() {
        let table = status_table();
        assert_eq!(table.column_index("Status"), Some(0));
        assert_eq!(table.column_index(" amount "), Some(1));
        assert_eq!(table.column_index("Missing"), None);
    }

    #[test]
    fn test_take_rows_reorders() {
        let table = status_table();
        let taken = table.take_rows(&[1, 0, 1]);
        assert_eq!(taken.row_count(), 3);
        assert_eq!(taken.cell(0, 0), &CellValue::text("Paused"));
        assert_eq!(taken.cell(1, 1), &CellValue::Number(10.0));
        assert!(taken.validate_lengths().is_ok());
    }

    #[test]
    fn test_null_detection() {
        assert!(CellValue::Null.is_null());
        assert!(CellValue::text("  ").is_null());
        assert!(!CellValue::Number(0.0).is_null());
    }

    #[test]
    fn test_loose_equality() {
        assert!(CellValue::Number(5.0).loosely_equals(&CellValue::text("5")));
        assert!(!CellValue::text("Active").loosely_equals(&CellValue::text("active")));
        let date = parse_date_text("2024-03-01").unwrap();
        assert!(CellValue::Date(date).loosely_equals(&CellValue::text("01/03/2024")));
    }

    #[test]
    fn test_display_text() {
        assert_eq!(CellValue::Number(3.0).display_text(), "3");
        assert_eq!(CellValue::Number(2.5).display_text(), "2.5");
        assert_eq!(CellValue::Bool(true).display_text(), "TRUE");
        let date = parse_date_text("2024-03-01").unwrap();
        assert_eq!(CellValue::Date(date).display_text(), "2024-03-01");
    }

    #[test]
    fn test_artifact_sheet_lookup() {
        let artifact = Artifact::new(
            vec![Sheet::new("Learners", status_table())],
            SourceKind::Upload,
        );
        assert_eq!(artifact.sheet_index("learners"), Some(0));
        assert_eq!(artifact.row_counts(), vec![2]);
        assert!(artifact.filename().is_none());
    }
}
