//! DataTransformer: row-level table operations.
//!
//! Every operation is expressed as a row selection: the indices of the input
//! rows that survive, in their new order. [`apply`] materializes the selected
//! table; the engine composes selections to track where each output row came
//! from so styles can follow it.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::spec::{DeleteRows, Operation};
use crate::types::Table;

/// Rows kept by a row-level operation, or the reason it was skipped
pub type Selection = Result<Vec<usize>, String>;

/// Apply one row-level operation, returning the new table.
pub fn apply(table: &Table, op: &Operation) -> Result<Table, String> {
    select(table, op, &BTreeSet::new()).map(|rows| table.take_rows(&rows))
}

/// Compute the surviving row indices for one row-level operation.
///
/// Rows listed in `protected` (computed summary rows) are never matched by a
/// condition, so filters drop them and condition deletes keep them.
/// Operations that are not row-level keep every row.
pub fn select(table: &Table, op: &Operation, protected: &BTreeSet<usize>) -> Selection {
    let count = table.row_count();
    let all = || (0..count).collect::<Vec<_>>();

    match op {
        Operation::Filter(filter) => {
            let col = resolve(table, &filter.column)?;
            let mask = filter
                .condition
                .mask_where(&table.columns[col].values, |i| !protected.contains(&i));
            Ok(keep_where(&mask, true))
        }
        Operation::DeleteRows(DeleteRows::Matching { column, condition }) => {
            let col = resolve(table, column)?;
            let mask =
                condition.mask_where(&table.columns[col].values, |i| !protected.contains(&i));
            Ok(keep_where(&mask, false))
        }
        Operation::DeleteRows(DeleteRows::Numbers(numbers)) => {
            let doomed: BTreeSet<usize> = numbers
                .iter()
                .filter(|&&n| n >= 1 && (n as u64) <= count as u64)
                .map(|&n| n as usize - 1)
                .collect();
            Ok((0..count).filter(|i| !doomed.contains(i)).collect())
        }
        Operation::RemoveLastRow => Ok((0..count.saturating_sub(1)).collect()),
        Operation::Sort(sort) => {
            let mut keys = Vec::with_capacity(sort.by.len());
            for (name, ascending) in sort.by.iter().zip(&sort.ascending) {
                keys.push((resolve(table, name)?, *ascending));
            }
            let mut rows = all();
            rows.sort_by(|&a, &b| compare_rows(table, &keys, a, b));
            Ok(rows)
        }
        Operation::TopN(n) => Ok((0..count.min(*n)).collect()),
        Operation::BottomN(n) => Ok((count.saturating_sub(*n)..count).collect()),
        _ => Ok(all()),
    }
}

fn resolve(table: &Table, column: &str) -> Result<usize, String> {
    table
        .column_index(column)
        .ok_or_else(|| format!("column '{}' not found", column))
}

fn keep_where(mask: &[bool], keep: bool) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter(|(_, &m)| m == keep)
        .map(|(i, _)| i)
        .collect()
}

/// Multi-key comparison; nulls sort last in either direction.
fn compare_rows(table: &Table, keys: &[(usize, bool)], a: usize, b: usize) -> Ordering {
    for &(col, ascending) in keys {
        let left = table.cell(a, col);
        let right = table.cell(b, col);
        let ord = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = left.sort_cmp(right);
                if ascending {
                    ord
                } else {
                    ord.reverse()
                }
            }
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
