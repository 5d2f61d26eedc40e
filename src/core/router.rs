//! SheetRouter: which sheets a step targets.

use crate::spec::SheetScope;
use crate::types::Sheet;

/// Routing decision for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Indices of the targeted sheets, in workbook order
    Sheets(Vec<usize>),
    /// `target_sheet` named a sheet that does not exist
    SheetNotFound(String),
}

/// Resolve a scope against the current sheets.
///
/// An explicit `apply_to_all_sheets` or a workbook with several sheets and
/// no target fans out to every sheet; a named target matches
/// case-insensitively.
pub fn route(sheets: &[Sheet], scope: &SheetScope) -> Route {
    match scope {
        SheetScope::AllSheets | SheetScope::Default => Route::Sheets((0..sheets.len()).collect()),
        SheetScope::Target(name) => {
            let wanted = name.trim().to_lowercase();
            sheets
                .iter()
                .position(|s| s.name.trim().to_lowercase() == wanted)
                .map_or_else(|| Route::SheetNotFound(name.clone()), |idx| Route::Sheets(vec![idx]))
        }
    }
}
