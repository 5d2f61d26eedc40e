//! PresentationTransformer: cosmetic operations on a finished sheet.
//!
//! Highlights are planned as an ordered list of [`StyleLayer`]s, each a
//! per-row fill decision over one column or a whole row. Layers are painted
//! in order, so a later layer overwrites an earlier one on the same cell.
//! Computed summary rows never take part in predicate evaluation.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::core::style_store::worksheet_row;
use crate::spec::{ColumnsHighlight, Condition, Highlight, Operation};
use crate::style::{parse_color, Rgb};
use crate::types::Sheet;

/// What a layer paints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerScope {
    /// Every column of a matching row
    Row,
    /// A single column
    Column(usize),
}

/// One (predicate, style) decision: `fills[i]` is the fill for data row `i`
#[derive(Debug, Clone, PartialEq)]
pub struct StyleLayer {
    pub scope: LayerScope,
    pub fills: Vec<Option<Rgb>>,
}

impl StyleLayer {
    fn from_mask(scope: LayerScope, mask: &[bool], color: Rgb) -> Self {
        Self {
            scope,
            fills: mask.iter().map(|&m| m.then_some(color)).collect(),
        }
    }

    pub fn matched(&self) -> usize {
        self.fills.iter().filter(|f| f.is_some()).count()
    }
}

/// Outcome of one cosmetic operation on one sheet
#[derive(Debug, Default)]
pub struct Painted {
    /// Cells or rows touched
    pub matched: usize,
    pub notes: Vec<String>,
    /// Columns that could not be resolved (the rest were applied)
    pub missing_columns: Vec<String>,
}

pub struct PresentationTransformer<'a> {
    config: &'a EngineConfig,
}

impl<'a> PresentationTransformer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Apply one cosmetic operation. `Err` carries the reason it was skipped.
    pub fn apply(&self, sheet: &mut Sheet, op: &Operation) -> Result<Painted, String> {
        let mut painted = Painted::default();
        match op {
            Operation::FreezePanes { rows, cols } => {
                sheet.layout.freeze_panes = (*rows > 0 || *cols > 0).then_some((*rows, *cols));
            }
            Operation::AutoFilter(on) => sheet.layout.auto_filter = *on,
            _ => {
                let layers = self.plan(sheet, op, &mut painted)?;
                painted.matched = layers.iter().map(StyleLayer::matched).sum();
                paint(sheet, &layers);
            }
        }
        Ok(painted)
    }

    /// Build the ordered layers for a highlight-style operation.
    pub fn plan(
        &self,
        sheet: &Sheet,
        op: &Operation,
        painted: &mut Painted,
    ) -> Result<Vec<StyleLayer>, String> {
        let layers = match op {
            Operation::HighlightRows(h) => {
                vec![self.highlight(sheet, h, LayerScope::Row, painted)?]
            }
            Operation::HighlightCells(h) => {
                let col = resolve(sheet, &h.column)?;
                vec![self.highlight(sheet, h, LayerScope::Column(col), painted)?]
            }
            Operation::ConditionalFormat(cf) => {
                let col = resolve(sheet, &cf.column)?;
                let values = &sheet.table.columns[col].values;
                let mut fills = vec![None; values.len()];
                for rule in &cf.rules {
                    let color = self.color(
                        rule.color.as_deref(),
                        &self.config.default_highlight_color,
                        painted,
                    );
                    let mask = eligible_mask(sheet, &rule.condition, col);
                    for (fill, hit) in fills.iter_mut().zip(mask) {
                        // first matching rule wins
                        if fill.is_none() && hit {
                            *fill = Some(color);
                        }
                    }
                }
                vec![StyleLayer {
                    scope: LayerScope::Column(col),
                    fills,
                }]
            }
            Operation::HighlightDuplicates(h) => {
                let color = self.color(h.color.as_deref(), &self.config.duplicate_color, painted);
                self.columns(sheet, h, painted)?
                    .into_iter()
                    .map(|col| {
                        let mask = duplicate_mask(sheet, col);
                        StyleLayer::from_mask(LayerScope::Column(col), &mask, color)
                    })
                    .collect()
            }
            Operation::HighlightNulls(h) => {
                let color = self.color(h.color.as_deref(), &self.config.null_color, painted);
                self.columns(sheet, h, painted)?
                    .into_iter()
                    .map(|col| {
                        let mask: Vec<bool> = sheet.table.columns[col]
                            .values
                            .iter()
                            .enumerate()
                            .map(|(i, v)| !sheet.summary_rows.contains(&i) && v.is_null())
                            .collect();
                        StyleLayer::from_mask(LayerScope::Column(col), &mask, color)
                    })
                    .collect()
            }
            other => return Err(format!("'{}' is not a cosmetic operation", other.kind().key())),
        };
        Ok(layers)
    }

    fn highlight(
        &self,
        sheet: &Sheet,
        h: &Highlight,
        scope: LayerScope,
        painted: &mut Painted,
    ) -> Result<StyleLayer, String> {
        let col = resolve(sheet, &h.column)?;
        let color = self.color(h.color.as_deref(), &self.config.default_highlight_color, painted);
        Ok(StyleLayer::from_mask(scope, &eligible_mask(sheet, &h.condition, col), color))
    }

    /// Resolve the target columns; empty means every column.
    fn columns(
        &self,
        sheet: &Sheet,
        h: &ColumnsHighlight,
        painted: &mut Painted,
    ) -> Result<Vec<usize>, String> {
        if h.columns.is_empty() {
            return Ok((0..sheet.table.column_count()).collect());
        }
        let mut found = Vec::new();
        for name in &h.columns {
            match sheet.table.column_index(name) {
                Some(col) => found.push(col),
                None => painted.missing_columns.push(name.clone()),
            }
        }
        if found.is_empty() {
            return Err(format!("none of the columns {:?} were found", h.columns));
        }
        Ok(found)
    }

    fn color(&self, requested: Option<&str>, default: &str, painted: &mut Painted) -> Rgb {
        let fallback = parse_color(default).unwrap_or(Rgb(0xFFFF00));
        match requested {
            None => fallback,
            Some(name) => parse_color(name).unwrap_or_else(|| {
                painted
                    .notes
                    .push(format!("unknown color '{}', using {}", name, default));
                fallback
            }),
        }
    }
}

/// Paint layers onto the sheet's styles, in order.
pub fn paint(sheet: &mut Sheet, layers: &[StyleLayer]) {
    let width = sheet.table.column_count();
    for layer in layers {
        for (row, fill) in layer.fills.iter().enumerate() {
            let Some(color) = fill else { continue };
            match layer.scope {
                LayerScope::Row => {
                    for col in 0..width {
                        sheet.styles.set_fill(worksheet_row(row), col as u16, *color);
                    }
                }
                LayerScope::Column(col) => {
                    sheet.styles.set_fill(worksheet_row(row), col as u16, *color)
                }
            }
        }
    }
}

fn resolve(sheet: &Sheet, column: &str) -> Result<usize, String> {
    sheet
        .table
        .column_index(column)
        .ok_or_else(|| format!("column '{}' not found", column))
}

fn eligible_mask(sheet: &Sheet, condition: &Condition, col: usize) -> Vec<bool> {
    condition.mask_where(&sheet.table.columns[col].values, |i| !sheet.summary_rows.contains(&i))
}

/// Cells whose value occurs at least twice in the column
fn duplicate_mask(sheet: &Sheet, col: usize) -> Vec<bool> {
    let values = &sheet.table.columns[col].values;
    let key = |i: usize| -> Option<String> {
        let v = &values[i];
        (!v.is_null() && !sheet.summary_rows.contains(&i))
            .then(|| v.display_text().trim().to_string())
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    for i in 0..values.len() {
        if let Some(k) = key(i) {
            *counts.entry(k).or_default() += 1;
        }
    }
    (0..values.len())
        .map(|i| key(i).is_some_and(|k| counts.get(&k).copied().unwrap_or(0) >= 2))
        .collect()
}
