//! StyleStore: carries cell styles across row-structure changes.
//!
//! A derived sheet knows, for each of its data rows, which base row it came
//! from (`origin`). The header is copied as-is, surviving rows copy their
//! source row's styles, rows with no source inherit the last base data row,
//! and rows that were removed take their styles with them.

use std::collections::BTreeSet;

use crate::style::{CellStyle, StyleMap};
use crate::types::Sheet;

/// Rebuild a StyleMap for a derived table.
///
/// `base_rows` is the number of data rows in the base sheet; `origin[i]` is
/// the base data row that output data row `i` came from.
pub fn carry(base: &StyleMap, base_rows: usize, origin: &[Option<usize>]) -> StyleMap {
    let mut out = StyleMap::new();

    for (col, style) in base.row(0) {
        out.set(0, col, style.clone());
    }

    let fallback = base_rows.checked_sub(1);
    for (dest, source) in origin.iter().enumerate() {
        let source = match source {
            Some(j) if *j < base_rows => Some(*j),
            _ => fallback,
        };
        let Some(source) = source else { continue };
        for (col, style) in base.row(worksheet_row(source)) {
            out.set(worksheet_row(dest), col, style.clone());
        }
    }
    out
}

/// Map summary-row markers through a provenance vector
pub fn carry_summary_rows(base: &BTreeSet<usize>, origin: &[Option<usize>]) -> BTreeSet<usize> {
    origin
        .iter()
        .enumerate()
        .filter(|(_, src)| src.is_some_and(|j| base.contains(&j)))
        .map(|(i, _)| i)
        .collect()
}

/// Give a sheet with no header styling the default header look
pub fn ensure_header_style(sheet: &mut Sheet) {
    if sheet.styles.row(0).next().is_some() {
        return;
    }
    for col in 0..sheet.table.column_count() {
        sheet.styles.set(0, col as u16, CellStyle::header());
    }
}

/// Worksheet row for a zero-based data row
pub fn worksheet_row(data_row: usize) -> u32 {
    data_row as u32 + 1
}
