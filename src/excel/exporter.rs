//! Excel exporter implementation - Artifact → .xlsx

use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, FormatPattern, Workbook, Worksheet};
use std::path::Path;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::style::{BorderLine, CellStyle, HAlign, VAlign};
use crate::types::{Artifact, CellValue, Sheet};

/// Number format applied to date cells that carry none of their own
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";

/// Writes artifacts as workbooks: one worksheet per sheet, header in row 1
pub struct ArtifactExporter<'a> {
    config: &'a EngineConfig,
}

impl<'a> ArtifactExporter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Export the artifact to an Excel .xlsx file
    pub fn export(&self, artifact: &Artifact, output_path: &Path) -> EngineResult<()> {
        let mut workbook = Workbook::new();

        for sheet in &artifact.sheets {
            self.export_sheet(&mut workbook, sheet)?;
        }

        workbook
            .save(output_path)
            .map_err(|e| EngineError::Export(format!("Failed to save Excel file: {}", e)))?;

        debug!(path = %output_path.display(), sheets = artifact.sheets.len(), "workbook written");
        Ok(())
    }

    /// Export a single sheet to a worksheet
    fn export_sheet(&self, workbook: &mut Workbook, sheet: &Sheet) -> EngineResult<()> {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&sheet.name)
            .map_err(|e| {
                EngineError::Export(format!(
                    "Failed to set worksheet name '{}': {}",
                    sheet.name, e
                ))
            })?;

        let table = &sheet.table;

        // Header row (row 0)
        for (col_idx, column) in table.columns.iter().enumerate() {
            let col = col_idx as u16;
            let format = sheet.styles.get(0, col).map(to_format).unwrap_or_else(Format::new);
            worksheet
                .write_string_with_format(0, col, &column.name, &format)
                .map_err(|e| EngineError::Export(format!("Failed to write header: {}", e)))?;
        }

        // Data rows (starting at row 1)
        for row_idx in 0..table.row_count() {
            let row = row_idx as u32 + 1;
            for (col_idx, column) in table.columns.iter().enumerate() {
                let col = col_idx as u16;
                let value = &column.values[row_idx];
                let style = sheet.styles.get(row, col);
                write_cell(worksheet, row, col, value, style)?;
            }
        }

        self.set_column_widths(worksheet, sheet)?;

        if let Some((rows, cols)) = sheet.layout.freeze_panes {
            worksheet
                .set_freeze_panes(rows, cols)
                .map_err(|e| EngineError::Export(format!("Failed to freeze panes: {}", e)))?;
        }

        if sheet.layout.auto_filter && table.column_count() > 0 {
            worksheet
                .autofilter(0, 0, table.row_count() as u32, (table.column_count() - 1) as u16)
                .map_err(|e| EngineError::Export(format!("Failed to add auto filter: {}", e)))?;
        }

        Ok(())
    }

    /// Width = longest text in the column plus padding, capped
    fn set_column_widths(&self, worksheet: &mut Worksheet, sheet: &Sheet) -> EngineResult<()> {
        for (col_idx, column) in sheet.table.columns.iter().enumerate() {
            let longest = column
                .values
                .iter()
                .map(|v| v.display_text().chars().count())
                .chain(std::iter::once(column.name.chars().count()))
                .max()
                .unwrap_or(0);
            let width = (longest as f64 + self.config.column_width_padding)
                .min(self.config.max_column_width);
            worksheet
                .set_column_width(col_idx as u16, width)
                .map_err(|e| EngineError::Export(format!("Failed to set column width: {}", e)))?;
        }
        Ok(())
    }
}

/// Write a single cell value with its style
fn write_cell(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &CellValue,
    style: Option<&CellStyle>,
) -> EngineResult<()> {
    let mut format = style.map(to_format).unwrap_or_else(Format::new);
    let result = match value {
        CellValue::Null => {
            if style.is_none() {
                return Ok(());
            }
            worksheet.write_blank(row, col, &format)
        }
        CellValue::Bool(b) => worksheet.write_boolean_with_format(row, col, *b, &format),
        CellValue::Number(n) => worksheet.write_number_with_format(row, col, *n, &format),
        CellValue::Text(s) => worksheet.write_string_with_format(row, col, s, &format),
        CellValue::Date(dt) => {
            if style.and_then(|s| s.number_format.as_ref()).is_none() {
                format = format.set_num_format(DEFAULT_DATE_FORMAT);
            }
            worksheet.write_number_with_format(row, col, excel_serial(dt), &format)
        }
    };
    result
        .map(|_| ())
        .map_err(|e| {
            EngineError::Export(format!("Failed to write {} cell: {}", value.type_name(), e))
        })
}

/// Translate a cell style into an xlsxwriter format
pub fn to_format(style: &CellStyle) -> Format {
    let mut format = Format::new();

    if let Some(fill) = style.fill {
        format = format
            .set_pattern(FormatPattern::Solid)
            .set_background_color(Color::RGB(fill.color.0));
    }
    if style.font.bold {
        format = format.set_bold();
    }
    if style.font.italic {
        format = format.set_italic();
    }
    if let Some(color) = style.font.color {
        format = format.set_font_color(Color::RGB(color.0));
    }

    let border = style.border;
    if border.left != BorderLine::None {
        format = format.set_border_left(to_border(border.left));
    }
    if border.right != BorderLine::None {
        format = format.set_border_right(to_border(border.right));
    }
    if border.top != BorderLine::None {
        format = format.set_border_top(to_border(border.top));
    }
    if border.bottom != BorderLine::None {
        format = format.set_border_bottom(to_border(border.bottom));
    }

    if let Some(h) = style.alignment.horizontal {
        format = format.set_align(match h {
            HAlign::Left => FormatAlign::Left,
            HAlign::Center => FormatAlign::Center,
            HAlign::Right => FormatAlign::Right,
        });
    }
    if let Some(v) = style.alignment.vertical {
        format = format.set_align(match v {
            VAlign::Top => FormatAlign::Top,
            VAlign::Center => FormatAlign::VerticalCenter,
            VAlign::Bottom => FormatAlign::Bottom,
        });
    }
    if style.alignment.wrap {
        format = format.set_text_wrap();
    }
    if let Some(num_format) = &style.number_format {
        format = format.set_num_format(num_format);
    }

    format
}

fn to_border(line: BorderLine) -> FormatBorder {
    match line {
        BorderLine::None => FormatBorder::None,
        BorderLine::Thin => FormatBorder::Thin,
        BorderLine::Medium => FormatBorder::Medium,
        BorderLine::Thick => FormatBorder::Thick,
        BorderLine::Dashed => FormatBorder::Dashed,
        BorderLine::Dotted => FormatBorder::Dotted,
        BorderLine::Double => FormatBorder::Double,
    }
}

/// Days since the 1900 date system epoch, with the time as a fraction
pub fn excel_serial(dt: &NaiveDateTime) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    (*dt - epoch).num_seconds() as f64 / 86_400.0
}
