//! SubtotalInserter: one computed summary row after each group.
//!
//! The output table is built functionally: for every run of equal
//! `group_by` values the group rows are emitted, followed by a label row
//! holding the computed aggregate. Input must already be sorted by the
//! grouping column; runs are taken as they appear.

use std::collections::BTreeSet;

use crate::core::style_store::{self, worksheet_row};
use crate::spec::{AggregateFn, SubtotalSpec};
use crate::style::{CellStyle, Fill, Font, Rgb};
use crate::types::{CellValue, Column, Sheet, Table};

/// Rows rebuilt with subtotal rows inserted
#[derive(Debug, Clone, PartialEq)]
pub struct SubtotalOutcome {
    pub table: Table,
    /// Input row for each output row; `None` for inserted subtotal rows
    pub origin: Vec<Option<usize>>,
    /// Output indices of the inserted subtotal rows
    pub inserted: BTreeSet<usize>,
    pub groups: usize,
}

/// Insert subtotal rows into `table`.
///
/// Rows listed in `existing` are summary rows from an earlier pass: they
/// close the current group, are copied through unchanged and never counted.
pub fn insert(
    table: &Table,
    existing: &BTreeSet<usize>,
    spec: &SubtotalSpec,
) -> Result<SubtotalOutcome, String> {
    let group_col = table
        .column_index(&spec.group_by)
        .ok_or_else(|| format!("column '{}' not found", spec.group_by))?;
    let agg_col = table
        .column_index(&spec.aggregate_column)
        .ok_or_else(|| format!("column '{}' not found", spec.aggregate_column))?;
    let label_col = label_column(table.column_count(), group_col, agg_col);

    let mut out = Table {
        columns: table
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), Vec::new()))
            .collect(),
    };
    let mut origin = Vec::new();
    let mut inserted = BTreeSet::new();
    let mut groups = 0;

    let mut current: Option<(String, Vec<usize>)> = None;
    let mut flush = |group: Option<(String, Vec<usize>)>,
                     out: &mut Table,
                     origin: &mut Vec<Option<usize>>,
                     inserted: &mut BTreeSet<usize>| {
        let Some((key, members)) = group else { return };
        let values: Vec<&CellValue> = members.iter().map(|&i| table.cell(i, agg_col)).collect();
        let mut row = vec![CellValue::Null; table.column_count()];
        if let Some(label_col) = label_col {
            row[label_col] = CellValue::Text(format!("{} {}", key, spec.function.label()));
        }
        row[agg_col] = aggregate(spec.function, &values);
        inserted.insert(origin.len());
        out.push_row(row);
        origin.push(None);
        groups += 1;
    };

    for i in 0..table.row_count() {
        if existing.contains(&i) {
            flush(current.take(), &mut out, &mut origin, &mut inserted);
            out.push_row(table.row(i));
            origin.push(Some(i));
            continue;
        }
        let key = group_label(table.cell(i, group_col));
        let same_group = current.as_ref().is_some_and(|(k, _)| *k == key);
        if same_group {
            if let Some((_, members)) = current.as_mut() {
                members.push(i);
            }
        } else {
            flush(current.take(), &mut out, &mut origin, &mut inserted);
            current = Some((key, vec![i]));
        }
        out.push_row(table.row(i));
        origin.push(Some(i));
    }
    flush(current.take(), &mut out, &mut origin, &mut inserted);

    Ok(SubtotalOutcome {
        table: out,
        origin,
        inserted,
        groups,
    })
}

/// Insert subtotals into a sheet, carrying styles and styling the new rows.
/// Returns the number of groups.
pub fn apply(sheet: &mut Sheet, spec: &SubtotalSpec) -> Result<usize, String> {
    let outcome = insert(&sheet.table, &sheet.summary_rows, spec)?;
    let agg_col = sheet.table.column_index(&spec.aggregate_column).unwrap_or(0);

    let mut styles = style_store::carry(&sheet.styles, sheet.table.row_count(), &outcome.origin);
    let mut summary = style_store::carry_summary_rows(&sheet.summary_rows, &outcome.origin);
    let width = outcome.table.column_count();
    for &row in &outcome.inserted {
        for col in 0..width {
            let mut style = summary_style();
            if col == agg_col {
                style.number_format = Some(number_format(spec.function).to_string());
            }
            styles.set(worksheet_row(row), col as u16, style);
        }
        summary.insert(row);
    }

    sheet.table = outcome.table;
    sheet.styles = styles;
    sheet.summary_rows = summary;
    Ok(outcome.groups)
}

fn summary_style() -> CellStyle {
    CellStyle {
        fill: Some(Fill { color: Rgb::SUBTOTAL_GRAY }),
        font: Font {
            bold: true,
            ..Font::default()
        },
        ..CellStyle::default()
    }
}

fn number_format(function: AggregateFn) -> &'static str {
    match function {
        AggregateFn::Count => "0",
        AggregateFn::Sum | AggregateFn::Average => "0.00",
    }
}

/// The label goes in the group column; if that is the aggregate column too,
/// use the first other column.
fn label_column(width: usize, group_col: usize, agg_col: usize) -> Option<usize> {
    if group_col != agg_col {
        Some(group_col)
    } else {
        (0..width).find(|&c| c != agg_col)
    }
}

fn group_label(value: &CellValue) -> String {
    if value.is_null() {
        "(blank)".to_string()
    } else {
        value.display_text()
    }
}

fn aggregate(function: AggregateFn, values: &[&CellValue]) -> CellValue {
    match function {
        AggregateFn::Count => {
            CellValue::Number(values.iter().filter(|v| !v.is_null()).count() as f64)
        }
        AggregateFn::Sum => CellValue::Number(values.iter().filter_map(|v| v.as_number()).sum()),
        AggregateFn::Average => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
            if numbers.is_empty() {
                CellValue::Null
            } else {
                CellValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
    }
}
