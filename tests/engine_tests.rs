//! OperationEngine end-to-end behavior: upload, apply, chain, download

use pretty_assertions::assert_eq;
use serde_json::json;
use sheetforge::core::{Continuation, OperationEngine, UploadedTable};
use sheetforge::session::InMemorySessionStore;
use sheetforge::style::{parse_color, Rgb};
use sheetforge::types::{CellValue, Table};
use sheetforge::{EngineConfig, EngineError, OperationSpec};
use std::sync::Arc;
use tempfile::TempDir;

// ═══════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════

fn engine(dir: &TempDir) -> OperationEngine<InMemorySessionStore> {
    OperationEngine::new(
        EngineConfig::default().with_output_dir(dir.path()),
        InMemorySessionStore::new(),
    )
}

fn spec(value: serde_json::Value) -> OperationSpec {
    OperationSpec::from_value(&value).unwrap()
}

fn text_column(table: &Table, name: &str) -> Vec<String> {
    table
        .column(name)
        .unwrap()
        .values
        .iter()
        .map(CellValue::display_text)
        .collect()
}

fn status_table() -> Table {
    Table::from_rows(
        &["Status"],
        vec![
            vec![CellValue::text("Active")],
            vec![CellValue::text("Paused")],
            vec![CellValue::text("Active")],
        ],
    )
    .unwrap()
}

fn scores_table() -> Table {
    let names = ["Ann", "Bob", "Cid", "Dee", "Eve", "Fay"];
    let scores = [72.0, 40.0, 95.0, 55.0, 88.0, 61.0];
    Table::from_rows(
        &["Name", "Score"],
        names
            .iter()
            .zip(scores)
            .map(|(n, s)| vec![CellValue::text(*n), CellValue::Number(s)])
            .collect(),
    )
    .unwrap()
}

fn upload(engine: &OperationEngine<InMemorySessionStore>, session: &str, table: Table) {
    engine
        .upload(session, vec![UploadedTable::new("Sheet1", table)], None)
        .unwrap();
}

fn last_table(engine: &OperationEngine<InMemorySessionStore>, session: &str) -> Table {
    let chain = engine.session(session).unwrap();
    chain.last_generated().unwrap().sheets[0].table.clone()
}

// ═══════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_spec_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    let report = engine
        .apply("s", &spec(json!({})), Continuation::Continue)
        .unwrap();
    assert!(report.applied.is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(last_table(&engine, "s"), scores_table());
}

#[test]
fn test_filter_keeps_matching_rows() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", status_table());

    let report = engine
        .apply(
            "s",
            &spec(json!({"filter": {"Status": {"operator": "==", "value": "Active"}}})),
            Continuation::Continue,
        )
        .unwrap();
    assert_eq!(report.row_counts, vec![2]);
    assert_eq!(text_column(&last_table(&engine, "s"), "Status"), vec!["Active", "Active"]);
}

#[test]
fn test_delete_rows_removes_matching_rows() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", status_table());

    engine
        .apply(
            "s",
            &spec(json!({
                "delete_rows": {
                    "column": "Status",
                    "condition": {"operator": "==", "value": "Active"}
                }
            })),
            Continuation::Continue,
        )
        .unwrap();
    assert_eq!(text_column(&last_table(&engine, "s"), "Status"), vec!["Paused"]);
}

#[test]
fn test_filter_and_delete_are_complementary() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());
    let condition = json!({"operator": ">", "value": 60});

    engine
        .apply("s", &spec(json!({"filter": {"Score": condition.clone()}})), Continuation::Restart)
        .unwrap();
    let kept = text_column(&last_table(&engine, "s"), "Name");

    engine
        .apply(
            "s",
            &spec(json!({"delete_rows": {"column": "Score", "condition": condition}})),
            Continuation::Restart,
        )
        .unwrap();
    let removed = text_column(&last_table(&engine, "s"), "Name");

    assert_eq!(kept.len() + removed.len(), 6);
    assert!(kept.iter().all(|n| !removed.contains(n)));
    assert_eq!(kept, vec!["Ann", "Cid", "Eve", "Fay"]);
}

#[test]
fn test_top_n_highlight_keeps_row_order() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    engine
        .apply(
            "s",
            &spec(json!({"highlight_rows": {
                "column": "Score",
                "condition": {"operator": "topN", "value": 2},
                "color": "green"
            }})),
            Continuation::Continue,
        )
        .unwrap();

    let chain = engine.session("s").unwrap();
    let sheet = &chain.last_generated().unwrap().sheets[0];
    assert_eq!(sheet.table, scores_table());

    let green = parse_color("green");
    let highlighted: Vec<u32> = (1..=6)
        .filter(|row| sheet.styles.fill_at(*row, 0) == green)
        .collect();
    // Cid (95) and Eve (88) sit at data rows 2 and 4
    assert_eq!(highlighted, vec![3, 5]);
}

#[test]
fn test_subtotals_insert_one_row_per_group() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let table = Table::from_rows(
        &["Employer", "Trainer"],
        vec![
            vec![CellValue::text("A"), CellValue::text("x")],
            vec![CellValue::text("A"), CellValue::text("y")],
            vec![CellValue::text("B"), CellValue::text("z")],
        ],
    )
    .unwrap();
    upload(&engine, "s", table);

    let report = engine
        .apply(
            "s",
            &spec(json!({
                "subtotals": {
                    "group_by": "Employer",
                    "aggregate_column": "Trainer",
                    "function": "count"
                }
            })),
            Continuation::Continue,
        )
        .unwrap();
    assert_eq!(report.row_counts, vec![5]);

    let out = last_table(&engine, "s");
    assert_eq!(text_column(&out, "Employer"), vec!["A", "A", "A Count", "B", "B Count"]);
    assert_eq!(text_column(&out, "Trainer"), vec!["x", "y", "2", "z", "1"]);

    let chain = engine.session("s").unwrap();
    let sheet = &chain.last_generated().unwrap().sheets[0];
    assert_eq!(sheet.summary_rows.iter().copied().collect::<Vec<_>>(), vec![2, 4]);
    assert_eq!(sheet.styles.fill_at(3, 0), Some(Rgb::SUBTOTAL_GRAY));
}

#[test]
fn test_subtotal_row_count_is_rows_plus_groups() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let regions = ["East", "East", "East", "North", "South", "South", "West"];
    let table = Table::from_rows(
        &["Region", "Sales"],
        regions
            .iter()
            .enumerate()
            .map(|(i, r)| vec![CellValue::text(*r), CellValue::Number(i as f64 * 10.0)])
            .collect(),
    )
    .unwrap();
    upload(&engine, "s", table);

    let report = engine
        .apply(
            "s",
            &spec(json!({
                "subtotals": {"group_by": "Region", "aggregate_column": "Sales", "function": "sum"}
            })),
            Continuation::Continue,
        )
        .unwrap();
    assert_eq!(report.row_counts, vec![regions.len() + 4]);
}

#[test]
fn test_merge_k_tables_without_collisions() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let tables = vec![
        UploadedTable::new("learners_jan", scores_table()),
        UploadedTable::new("learners_feb", status_table()),
        UploadedTable::new("learners_mar", scores_table()),
    ];
    engine.upload("s", tables, None).unwrap();

    let report = engine
        .apply("s", &spec(json!({"merge_files": true})), Continuation::Continue)
        .unwrap();
    assert_eq!(report.sheet_names.len(), 3);
    assert_eq!(report.row_counts, vec![6, 3, 6]);
}

#[test]
fn test_merge_uses_desired_sheet_names() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let tables = vec![
        UploadedTable::new("output_applicants.xlsx", status_table()),
        UploadedTable::new("output_learners.xlsx", scores_table()),
    ];
    engine.upload("s", tables, None).unwrap();

    let report = engine
        .apply(
            "s",
            &spec(json!({"merge_files": true, "sheet_names": ["Learners", "Applicants"]})),
            Continuation::Continue,
        )
        .unwrap();
    assert_eq!(report.sheet_names, vec!["Applicants", "Learners"]);
}

#[test]
fn test_merge_on_generated_artifact_keeps_sheet_count() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    let tables = vec![
        UploadedTable::new("Learners", scores_table()),
        UploadedTable::new("Applicants", status_table()),
    ];
    engine.upload("s", tables, None).unwrap();
    engine
        .apply(
            "s",
            &spec(json!({"apply_to_all_sheets": true, "remove_last_row": true})),
            Continuation::Continue,
        )
        .unwrap();

    let report = engine
        .apply("s", &spec(json!({"merge_files": true})), Continuation::Continue)
        .unwrap();
    assert_eq!(report.sheet_names, vec!["Learners", "Applicants"]);
    assert_eq!(report.row_counts, vec![5, 2]);
}

#[test]
fn test_merge_appends_tables_uploaded_after_generated_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine
        .upload("s", vec![UploadedTable::new("Learners", scores_table())], None)
        .unwrap();
    engine
        .apply("s", &spec(json!({"top_n": 2})), Continuation::Continue)
        .unwrap();
    engine
        .add_upload("s", vec![UploadedTable::new("Applicants", status_table())], None)
        .unwrap();

    let merge = spec(json!({"merge_files": true}));
    let report = engine.apply("s", &merge, Continuation::Continue).unwrap();
    assert_eq!(report.sheet_names, vec!["Learners", "Applicants"]);
    assert_eq!(report.row_counts, vec![2, 3]);

    // The new tables were consumed by the first merge
    let report = engine.apply("s", &merge, Continuation::Continue).unwrap();
    assert_eq!(report.row_counts, vec![2, 3]);

    let report = engine.apply("s", &merge, Continuation::Restart).unwrap();
    assert_eq!(report.sheet_names, vec!["Applicants"]);
}

#[test]
fn test_cosmetic_chain_preserves_untouched_styles() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    engine
        .apply(
            "s",
            &spec(json!({
                "highlight_rows": {"column": "Score", "condition": {"operator": ">", "value": 60}},
                "freeze_panes": true
            })),
            Continuation::Continue,
        )
        .unwrap();
    let first = engine.session("s").unwrap();
    let before = first.last_generated().unwrap().sheets[0].styles.clone();

    engine
        .apply(
            "s",
            &spec(json!({
                "highlight_cells": {"column": "Name", "condition": "Bob", "color": "blue"}
            })),
            Continuation::Continue,
        )
        .unwrap();
    let second = engine.session("s").unwrap();
    let sheet = &second.last_generated().unwrap().sheets[0];

    // Bob is data row 1 → worksheet row 2, column 0
    for ((row, col), style) in before.iter() {
        if (row, col) == (2, 0) {
            continue;
        }
        assert_eq!(sheet.styles.get(row, col), Some(style), "style changed at ({}, {})", row, col);
    }
    assert_eq!(sheet.styles.fill_at(2, 0), parse_color("blue"));
    assert_eq!(sheet.layout.freeze_panes, Some((1, 0)));
}

#[test]
fn test_restart_applies_to_upload() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    engine
        .apply("s", &spec(json!({"top_n": 2})), Continuation::Continue)
        .unwrap();
    let report = engine
        .apply("s", &spec(json!({"top_n": 3})), Continuation::Continue)
        .unwrap();
    assert_eq!(report.row_counts, vec![2]);

    let report = engine
        .apply("s", &spec(json!({"top_n": 3})), Continuation::Restart)
        .unwrap();
    assert_eq!(report.row_counts, vec![3]);

    let chain = engine.session("s").unwrap();
    assert_eq!(chain.history().len(), 1);
    assert_eq!(chain.downloads().len(), 3);
}

#[test]
fn test_target_sheet_scoping() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    engine
        .upload(
            "s",
            vec![
                UploadedTable::new("Scores", scores_table()),
                UploadedTable::new("Status", status_table()),
            ],
            None,
        )
        .unwrap();

    let report = engine
        .apply("s", &spec(json!({"target_sheet": "scores", "top_n": 1})), Continuation::Continue)
        .unwrap();
    assert_eq!(report.row_counts, vec![1, 3]);

    let report = engine
        .apply("s", &spec(json!({"target_sheet": "Missing", "top_n": 1})), Continuation::Continue)
        .unwrap();
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.row_counts, vec![1, 3]);
}

#[test]
fn test_missing_column_is_skipped() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    let report = engine
        .apply(
            "s",
            &spec(json!({"filter": {"Region": "West"}, "sort": {"by": "Score"}})),
            Continuation::Continue,
        )
        .unwrap();
    assert!(!report.is_clean());
    assert_eq!(report.skipped[0].operation, "filter");
    assert!(report.skipped[0].reason.contains("Region"));
    assert_eq!(text_column(&last_table(&engine, "s"), "Score")[0], "40");
}

#[test]
fn test_report_json_shape() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    let report = engine
        .apply(
            "s",
            &spec(json!({"remove_last_row": true, "custom_filename": "trimmed scores"})),
            Continuation::Continue,
        )
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(value["sheetNames"], json!(["Sheet1"]));
    assert_eq!(value["rowCounts"], json!([5]));
    assert!(value["filename"].as_str().unwrap().starts_with("trimmed_scores_"));
}

#[test]
fn test_download_every_generated_artifact() {
    let dir = TempDir::new().unwrap();
    let engine = engine(&dir);
    upload(&engine, "s", scores_table());

    let first = engine
        .apply("s", &spec(json!({"top_n": 2})), Continuation::Continue)
        .unwrap();
    let second = engine
        .apply("s", &spec(json!({"sort": {"by": "Name"}})), Continuation::Restart)
        .unwrap();

    for report in [&first, &second] {
        let path = engine.download("s", &report.artifact_id).unwrap();
        assert!(path.exists());
    }
    assert!(matches!(
        engine.download("s", "nope"),
        Err(EngineError::ArtifactNotFound(_))
    ));

    assert!(engine.clear("s"));
    assert!(matches!(
        engine.download("s", &first.artifact_id),
        Err(EngineError::SessionNotFound(_))
    ));
}

#[test]
fn test_sessions_are_isolated_across_threads() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(engine(&dir));

    let handles: Vec<_> = (1..=4)
        .map(|n| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let session = format!("session-{}", n);
                upload(&engine, &session, scores_table());
                let spec = OperationSpec::from_value(&json!({"top_n": n})).unwrap();
                engine.apply(&session, &spec, Continuation::Continue).unwrap()
            })
        })
        .collect();

    for (n, handle) in (1..=4).zip(handles) {
        let report = handle.join().unwrap();
        assert_eq!(report.row_counts, vec![n]);
    }
}
