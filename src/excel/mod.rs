//! Excel import/export
//!
//! - Import: .xlsx → tables (values via calamine)
//! - Style reader: .xlsx → per-cell styles (zip + quick-xml)
//! - Export: artifact → .xlsx (rust_xlsxwriter)

mod exporter;
mod importer;
mod style_reader;

pub use exporter::{excel_serial, to_format, ArtifactExporter, DEFAULT_DATE_FORMAT};
pub use importer::{
    convert_cell, import_uploads, serial_to_datetime, ExcelImporter, ImportedSheet, SourceCells,
};
pub use style_reader::{parse_cell_ref, read_source_styles};
