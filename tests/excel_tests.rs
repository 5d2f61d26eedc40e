//! Excel import, style seeding and export round trips

use pretty_assertions::assert_eq;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use serde_json::json;
use sheetforge::core::{Continuation, OperationEngine};
use sheetforge::excel::{import_uploads, read_source_styles, ExcelImporter};
use sheetforge::session::InMemorySessionStore;
use sheetforge::style::{BorderLine, Rgb};
use sheetforge::types::CellValue;
use sheetforge::{EngineConfig, EngineError, OperationSpec};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ORANGE: u32 = 0xFFA500;

/// Learners workbook: styled header, Cid's row filled orange, a bordered score column
fn write_styled_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Learners").unwrap();

    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x203864))
        .set_font_color(Color::White);
    let marked = Format::new().set_background_color(Color::RGB(ORANGE));
    let bordered = Format::new().set_border_bottom(FormatBorder::Thin).set_num_format("0.0");

    sheet.write_string_with_format(0, 0, "Name", &header).unwrap();
    sheet.write_string_with_format(0, 1, "Score", &header).unwrap();
    let rows = [("Ann", 72.0), ("Bob", 40.0), ("Cid", 95.0), ("Dee", 55.0)];
    for (i, (name, score)) in rows.iter().enumerate() {
        let row = i as u32 + 1;
        if *name == "Cid" {
            sheet.write_string_with_format(row, 0, *name, &marked).unwrap();
        } else {
            sheet.write_string(row, 0, *name).unwrap();
        }
        sheet.write_number_with_format(row, 1, *score, &bordered).unwrap();
    }
    workbook.save(path).unwrap();
}

fn write_plain_workbook(path: &Path, sheet_name: &str, rows: &[(&str, f64)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name).unwrap();
    sheet.write_string(0, 0, "Name").unwrap();
    sheet.write_string(0, 1, "Score").unwrap();
    for (i, (name, score)) in rows.iter().enumerate() {
        sheet.write_string(i as u32 + 1, 0, *name).unwrap();
        sheet.write_number(i as u32 + 1, 1, *score).unwrap();
    }
    workbook.save(path).unwrap();
}

fn engine(dir: &TempDir) -> OperationEngine<InMemorySessionStore> {
    OperationEngine::new(
        EngineConfig::default().with_output_dir(dir.path().join("out")),
        InMemorySessionStore::new(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// IMPORT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_import_reads_header_and_typed_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("learners.xlsx");
    write_styled_workbook(&path);

    let sheets = ExcelImporter::new(&path).import().unwrap();
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "Learners");
    let table = &sheets[0].table;
    assert_eq!(table.column_names(), vec!["Name", "Score"]);
    assert_eq!(table.row_count(), 4);
    assert_eq!(table.cell(2, 1), &CellValue::Number(95.0));
}

#[test]
fn test_multi_file_upload_names_sheets_after_files() {
    let dir = TempDir::new().unwrap();
    let jan = dir.path().join("january.xlsx");
    let feb = dir.path().join("february.xlsx");
    write_plain_workbook(&jan, "Sheet1", &[("Ann", 1.0)]);
    write_plain_workbook(&feb, "Sheet1", &[("Bob", 2.0), ("Cid", 3.0)]);

    let uploads = import_uploads(&[jan, feb]).unwrap();
    let names: Vec<&str> = uploads.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["january", "february"]);
    assert_eq!(uploads[1].table.row_count(), 2);
}

#[test]
fn test_import_missing_file_fails() {
    let result = import_uploads(&[PathBuf::from("/nonexistent/missing.xlsx")]);
    assert!(matches!(result, Err(EngineError::Import(_))));
}

// ═══════════════════════════════════════════════════════════════════════════
// STYLE SEEDING
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_read_source_styles() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("learners.xlsx");
    write_styled_workbook(&path);

    let styles = read_source_styles(&path).unwrap();
    assert_eq!(styles.len(), 1);
    let (name, map) = &styles[0];
    assert_eq!(name, "Learners");

    let header = map.get(0, 0).unwrap();
    assert!(header.font.bold);
    assert_eq!(header.font.color, Some(Rgb::WHITE));
    assert_eq!(map.fill_at(0, 1), Some(Rgb(0x203864)));

    assert_eq!(map.fill_at(3, 0), Some(Rgb(ORANGE)));
    assert_eq!(map.fill_at(1, 0), None);

    let score = map.get(2, 1).unwrap();
    assert_eq!(score.border.bottom, BorderLine::Thin);
    assert_eq!(score.number_format.as_deref(), Some("0.0"));
}

#[test]
fn test_styles_follow_rows_through_sort_and_export() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("learners.xlsx");
    write_styled_workbook(&input);

    let engine = engine(&dir);
    let tables = import_uploads(std::slice::from_ref(&input)).unwrap();
    engine.upload("s", tables, Some(input.as_path())).unwrap();

    let spec = OperationSpec::from_value(&json!({
        "sort": {"by": "Score", "ascending": false},
        "custom_filename": "sorted"
    }))
    .unwrap();
    let report = engine.apply("s", &spec, Continuation::Continue).unwrap();
    let output = engine.download("s", &report.artifact_id).unwrap();

    let sheets = ExcelImporter::new(&output).import().unwrap();
    let names: Vec<String> = sheets[0]
        .table
        .column("Name")
        .unwrap()
        .values
        .iter()
        .map(CellValue::display_text)
        .collect();
    assert_eq!(names, vec!["Cid", "Ann", "Dee", "Bob"]);

    // Cid moved to the first data row and kept the orange fill
    let styles = read_source_styles(&output).unwrap();
    let (_, map) = &styles[0];
    assert_eq!(map.fill_at(1, 0), Some(Rgb(ORANGE)));
    assert_eq!(map.fill_at(3, 0), None);
    assert!(map.get(0, 0).unwrap().font.bold);
    assert_eq!(map.get(4, 1).unwrap().border.bottom, BorderLine::Thin);
}

#[test]
fn test_highlight_written_to_workbook() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("plain.xlsx");
    write_plain_workbook(&input, "Scores", &[("Ann", 10.0), ("Bob", 20.0), ("Ann", 30.0)]);

    let engine = engine(&dir);
    engine
        .upload("s", import_uploads(std::slice::from_ref(&input)).unwrap(), None)
        .unwrap();
    let spec = OperationSpec::from_value(&json!({
        "highlight_duplicates": {"columns": ["Name"]},
        "freeze_panes": {"row": 1, "col": 1}
    }))
    .unwrap();
    let report = engine.apply("s", &spec, Continuation::Continue).unwrap();
    let output = engine.download("s", &report.artifact_id).unwrap();

    let (_, map) = read_source_styles(&output).unwrap().remove(0);
    let light_red = sheetforge::style::parse_color("light_red");
    assert_eq!(map.fill_at(1, 0), light_red);
    assert_eq!(map.fill_at(2, 0), None);
    assert_eq!(map.fill_at(3, 0), light_red);
    // Fresh uploads get the default header look
    assert_eq!(map.fill_at(0, 0), Some(Rgb::HEADER_BLUE));
}

#[test]
fn test_seeded_styles_skip_blank_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gappy.xlsx");
    let red = Format::new().set_background_color(Color::RGB(0xFF0000));
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Learners").unwrap();
    sheet.write_string(0, 0, "Name").unwrap();
    // row 2 left blank
    sheet.write_string_with_format(2, 0, "Ann", &red).unwrap();
    sheet.write_string(3, 0, "Bob").unwrap();
    workbook.save(&path).unwrap();

    let engine = engine(&dir);
    let tables = import_uploads(std::slice::from_ref(&path)).unwrap();
    assert_eq!(tables[0].table.row_count(), 2);
    engine.upload("s", tables, Some(path.as_path())).unwrap();

    let chain = engine.session("s").unwrap();
    let styles = &chain.upload().sheets[0].styles;
    assert_eq!(styles.fill_at(1, 0), Some(Rgb(0xFF0000)));
    assert_eq!(styles.fill_at(2, 0), None);
}

#[test]
fn test_seeded_styles_follow_table_not_starting_at_a1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("offset.xlsx");
    let red = Format::new().set_background_color(Color::RGB(0xFF0000));
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Learners").unwrap();
    sheet.write_string(1, 1, "Name").unwrap();
    sheet.write_string_with_format(2, 1, "Ann", &red).unwrap();
    sheet.write_string(3, 1, "Bob").unwrap();
    workbook.save(&path).unwrap();

    let engine = engine(&dir);
    let tables = import_uploads(std::slice::from_ref(&path)).unwrap();
    assert_eq!(tables[0].table.column_names(), vec!["Name"]);
    engine.upload("s", tables, Some(path.as_path())).unwrap();

    let chain = engine.session("s").unwrap();
    let styles = &chain.upload().sheets[0].styles;
    assert_eq!(styles.fill_at(1, 0), Some(Rgb(0xFF0000)));
    assert_eq!(styles.fill_at(2, 1), None);
}

#[test]
fn test_source_styles_match_worksheet_in_multi_file_upload() {
    let dir = TempDir::new().unwrap();
    let jan = dir.path().join("january.xlsx");
    let feb = dir.path().join("february.xlsx");
    write_styled_workbook(&jan);
    write_plain_workbook(&feb, "Learners", &[("Ann", 1.0), ("Bob", 2.0), ("Cid", 3.0)]);

    let engine = engine(&dir);
    let tables = import_uploads(&[jan.clone(), feb]).unwrap();
    engine.upload("s", tables, Some(jan.as_path())).unwrap();

    let chain = engine.session("s").unwrap();
    let sheets = &chain.upload().sheets;
    assert_eq!(sheets[0].name, "january");
    // Cid is data row 2
    assert_eq!(sheets[0].styles.fill_at(3, 0), Some(Rgb(ORANGE)));
    assert_eq!(sheets[1].styles.fill_at(3, 0), None);
}
