//! Engine configuration

use std::path::PathBuf;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory generated workbooks are written to
    pub output_dir: PathBuf,
    /// Fill used by highlight_rows / highlight_cells / conditional_format when no color is given
    pub default_highlight_color: String,
    /// Fill used by highlight_duplicates when no color is given
    pub duplicate_color: String,
    /// Fill used by highlight_nulls when no color is given
    pub null_color: String,
    pub max_column_width: f64,
    pub column_width_padding: f64,
    /// Attach a filter control to fresh sheets
    pub auto_filter_by_default: bool,
    /// Stem used when a spec has no custom_filename
    pub default_filename: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            output_dir: std::env::temp_dir().join("sheetforge"),
            default_highlight_color: "yellow".to_string(),
            duplicate_color: "light_red".to_string(),
            null_color: "gray".to_string(),
            max_column_width: 50.0,
            column_width_padding: 2.0,
            auto_filter_by_default: true,
            default_filename: "excel_operations".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}
