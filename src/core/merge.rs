//! MergeEngine: many uploaded tables into one multi-sheet workbook.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::types::Sheet;

/// Excel's sheet name limit
pub const MAX_SHEET_NAME: usize = 31;

/// Merged sheets plus notes about renamed/disambiguated tabs
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub sheets: Vec<Sheet>,
    pub notes: Vec<String>,
}

/// Merge `inputs` into one sheet each, after any `prefix` sheets.
///
/// Each input sheet is named from `desired` when possible: the remaining
/// desired name that best matches the input name (case-insensitive
/// substring), else the next unused desired name, else the sanitized
/// original, else `File_<n>`. Names are made unique.
pub fn merge(prefix: Vec<Sheet>, inputs: Vec<Sheet>, desired: &[String]) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut taken: HashSet<String> = HashSet::new();

    for mut sheet in prefix {
        let name = unique_name(&sanitize_sheet_name(&sheet.name), &taken);
        taken.insert(name.to_lowercase());
        sheet.name = name;
        outcome.sheets.push(sheet);
    }

    let mut remaining: Vec<&String> = desired.iter().filter(|d| !d.trim().is_empty()).collect();

    for (idx, mut sheet) in inputs.into_iter().enumerate() {
        let chosen = take_best_match(&sheet.name, &mut remaining)
            .or_else(|| (!remaining.is_empty()).then(|| remaining.remove(0).clone()))
            .map(|n| sanitize_sheet_name(&n))
            .filter(|n| !n.is_empty())
            .or_else(|| Some(sanitize_sheet_name(&sheet.name)).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| format!("File_{}", idx + 1));

        let name = unique_name(&chosen, &taken);
        if name != chosen {
            outcome
                .notes
                .push(format!("sheet name '{}' already used, renamed to '{}'", chosen, name));
        }
        taken.insert(name.to_lowercase());
        sheet.name = name;
        outcome.sheets.push(sheet);
    }

    outcome
}

/// Remove and return the desired name that best matches `input`.
fn take_best_match(input: &str, remaining: &mut Vec<&String>) -> Option<String> {
    let wanted = normalize(input);
    if wanted.is_empty() {
        return None;
    }
    let best = remaining
        .iter()
        .enumerate()
        .filter(|(_, d)| {
            let d = normalize(d);
            !d.is_empty() && (wanted.contains(&d) || d.contains(&wanted))
        })
        .max_by_key(|(i, d)| (normalize(d).len(), std::cmp::Reverse(*i)))
        .map(|(i, _)| i)?;
    Some(remaining.remove(best).clone())
}

fn normalize(name: &str) -> String {
    let mut n = name.trim().to_lowercase();
    for ext in [".xlsx", ".xls", ".csv"] {
        if let Some(stripped) = n.strip_suffix(ext) {
            n = stripped.to_string();
        }
    }
    if let Some(stripped) = n.strip_prefix("output_") {
        n = stripped.to_string();
    }
    n.replace(['_', ' '], "")
}

/// Strip characters Excel forbids in sheet names and cap the length.
pub fn sanitize_sheet_name(name: &str) -> String {
    static FORBIDDEN: OnceLock<Regex> = OnceLock::new();
    let re = FORBIDDEN.get_or_init(|| Regex::new(r"[\\/*?:\[\]]").expect("valid sheet name regex"));
    let cleaned = re.replace_all(name, "");
    let cleaned = cleaned.trim().trim_matches('\'');
    cleaned.chars().take(MAX_SHEET_NAME).collect::<String>().trim().to_string()
}

/// Append `_2`, `_3`, ... until the name is unused (case-insensitive),
/// keeping the result within the sheet name limit.
pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&name.to_lowercase()) {
        return name.to_string();
    }
    (2..)
        .map(|n| {
            let suffix = format!("_{}", n);
            let stem: String = name.chars().take(MAX_SHEET_NAME - suffix.len()).collect();
            format!("{}{}", stem, suffix)
        })
        .find(|candidate| !taken.contains(&candidate.to_lowercase()))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::Rgb;
    use crate::types::{CellValue, Table};

    fn sheet(name: &str, rows: usize) -> Sheet {
        let data = (0..rows).map(|i| vec![CellValue::Number(i as f64)]).collect();
        Sheet::new(name, Table::from_rows(&["N"], data).unwrap())
    }

    fn names(outcome: &MergeOutcome) -> Vec<&str> {
        outcome.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_k_tables_give_k_sheets() {
        let out = merge(Vec::new(), vec![sheet("jan", 2), sheet("feb", 3), sheet("mar", 1)], &[]);
        assert_eq!(names(&out), vec!["jan", "feb", "mar"]);
        let rows: Vec<usize> = out.sheets.iter().map(|s| s.worksheet_rows()).collect();
        assert_eq!(rows, vec![3, 4, 2]);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn test_desired_names_matched_by_substring() {
        let desired = vec!["Applicants".to_string(), "Learners".to_string()];
        let out = merge(
            Vec::new(),
            vec![sheet("output_learners_2024.xlsx", 1), sheet("new_applicants", 1)],
            &desired,
        );
        assert_eq!(names(&out), vec!["Learners", "Applicants"]);
    }

    #[test]
    fn test_unmatched_inputs_take_next_desired_name() {
        let desired = vec!["Summary".to_string(), "Detail".to_string()];
        let out = merge(Vec::new(), vec![sheet("x1", 1), sheet("x2", 1), sheet("x3", 1)], &desired);
        assert_eq!(names(&out), vec!["Summary", "Detail", "x3"]);
    }

    #[test]
    fn test_empty_names_fall_back_to_file_n() {
        let out = merge(Vec::new(), vec![sheet("", 1), sheet("[*]", 1)], &[]);
        assert_eq!(names(&out), vec!["File_1", "File_2"]);
    }

    #[test]
    fn test_collisions_get_numeric_suffix() {
        let out = merge(vec![sheet("Data", 1)], vec![sheet("data", 1), sheet("Data", 1)], &[]);
        assert_eq!(names(&out), vec!["Data", "data_2", "Data_3"]);
        assert_eq!(out.notes.len(), 2);
    }

    #[test]
    fn test_prefix_sheets_keep_styles_and_come_first() {
        let mut prior = sheet("Report", 2);
        prior.styles.set_fill(1, 0, Rgb(0xFF0000));
        let out = merge(vec![prior], vec![sheet("upload", 1)], &[]);
        assert_eq!(names(&out), vec!["Report", "upload"]);
        assert_eq!(out.sheets[0].styles.fill_at(1, 0), Some(Rgb(0xFF0000)));
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("Q1/Q2: [draft]?"), "Q1Q2 draft");
        let long = "x".repeat(40);
        assert_eq!(sanitize_sheet_name(&long).len(), MAX_SHEET_NAME);
    }

    #[test]
    fn test_unique_name_respects_length_limit() {
        let long = "y".repeat(31);
        let taken: HashSet<String> = [long.clone()].into_iter().collect();
        let name = unique_name(&long, &taken);
        assert_eq!(name.len(), MAX_SHEET_NAME);
        assert!(name.ends_with("_2"));
    }
}
