//! OperationSpec: the declarative request grammar.
//!
//! A spec document maps operation kinds to one object or an array of
//! objects, plus the routing modifiers `target_sheet` / `apply_to_all_sheets`
//! and an optional ordered `operations: [...]` list of sub-specs. It is
//! validated once here and turned into a tagged union; every kind becomes a
//! list of one or more [`Operation`] values.
//!
//! # Example
//!
//! ```
//! use sheetforge::spec::{Operation, OperationSpec};
//!
//! let spec = OperationSpec::from_json_str(
//!     r#"{"filter": {"Status": {"operator": "==", "value": "Active"}}}"#,
//! )?;
//! assert!(matches!(spec.operations[0], Operation::Filter(_)));
//! # Ok::<(), sheetforge::error::EngineError>(())
//! ```

mod condition;
mod schema;

pub use condition::{CompareOp, Condition, MonthSpec, DEFAULT_RANK_N};
pub use schema::validate_against_schema;

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{EngineError, EngineResult};

//==============================================================================
// Operation kinds
//==============================================================================

/// What an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Row-level table transforms
    Data,
    /// Style and sheet view changes
    Presentation,
    /// Sheet set changes (merge, rename)
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Filter,
    Sort,
    DeleteRows,
    RemoveLastRow,
    TopN,
    BottomN,
    HighlightRows,
    HighlightCells,
    ConditionalFormat,
    HighlightDuplicates,
    HighlightNulls,
    FreezePanes,
    Subtotals,
    AutoFilter,
    MergeFiles,
    RenameTabs,
}

impl OperationKind {
    pub const ALL: [OperationKind; 16] = [
        OperationKind::Filter,
        OperationKind::Sort,
        OperationKind::DeleteRows,
        OperationKind::RemoveLastRow,
        OperationKind::TopN,
        OperationKind::BottomN,
        OperationKind::HighlightRows,
        OperationKind::HighlightCells,
        OperationKind::ConditionalFormat,
        OperationKind::HighlightDuplicates,
        OperationKind::HighlightNulls,
        OperationKind::FreezePanes,
        OperationKind::Subtotals,
        OperationKind::AutoFilter,
        OperationKind::MergeFiles,
        OperationKind::RenameTabs,
    ];

    pub fn key(self) -> &'static str {
        match self {
            OperationKind::Filter => "filter",
            OperationKind::Sort => "sort",
            OperationKind::DeleteRows => "delete_rows",
            OperationKind::RemoveLastRow => "remove_last_row",
            OperationKind::TopN => "top_n",
            OperationKind::BottomN => "bottom_n",
            OperationKind::HighlightRows => "highlight_rows",
            OperationKind::HighlightCells => "highlight_cells",
            OperationKind::ConditionalFormat => "conditional_format",
            OperationKind::HighlightDuplicates => "highlight_duplicates",
            OperationKind::HighlightNulls => "highlight_nulls",
            OperationKind::FreezePanes => "freeze_panes",
            OperationKind::Subtotals => "subtotals",
            OperationKind::AutoFilter => "auto_filter",
            OperationKind::MergeFiles => "merge_files",
            OperationKind::RenameTabs => "rename_tabs",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn category(self) -> Category {
        match self {
            OperationKind::Filter
            | OperationKind::Sort
            | OperationKind::DeleteRows
            | OperationKind::RemoveLastRow
            | OperationKind::TopN
            | OperationKind::BottomN => Category::Data,
            OperationKind::MergeFiles | OperationKind::RenameTabs => Category::Structural,
            _ => Category::Presentation,
        }
    }

    /// Fixed execution order for row-level operations within one step:
    /// remove_last_row → delete_rows → filter → sort → top_n/bottom_n.
    pub fn data_rank(self) -> Option<u8> {
        match self {
            OperationKind::RemoveLastRow => Some(0),
            OperationKind::DeleteRows => Some(1),
            OperationKind::Filter => Some(2),
            OperationKind::Sort => Some(3),
            OperationKind::TopN | OperationKind::BottomN => Some(4),
            _ => None,
        }
    }

    /// Execution order for presentation operations within one step.
    /// Subtotals change row structure, so they run before any fill.
    pub fn presentation_rank(self) -> Option<u8> {
        match self {
            OperationKind::Subtotals => Some(0),
            OperationKind::HighlightRows => Some(1),
            OperationKind::HighlightCells => Some(2),
            OperationKind::ConditionalFormat => Some(3),
            OperationKind::HighlightDuplicates => Some(4),
            OperationKind::HighlightNulls => Some(5),
            OperationKind::FreezePanes => Some(6),
            OperationKind::AutoFilter => Some(7),
            _ => None,
        }
    }
}

//==============================================================================
// Operation payloads
//==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOp {
    pub column: String,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortOp {
    pub by: Vec<String>,
    /// One flag per key in `by`
    pub ascending: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteRows {
    /// 1-indexed data row numbers
    Numbers(Vec<i64>),
    Matching { column: String, condition: Condition },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub column: String,
    pub condition: Condition,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatRule {
    pub condition: Condition,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalFormat {
    pub column: String,
    pub rules: Vec<FormatRule>,
}

/// highlight_duplicates / highlight_nulls; empty `columns` means every column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnsHighlight {
    pub columns: Vec<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Average,
}

impl AggregateFn {
    pub fn label(self) -> &'static str {
        match self {
            AggregateFn::Count => "Count",
            AggregateFn::Sum => "Sum",
            AggregateFn::Average => "Average",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "count" | "counta" => Some(AggregateFn::Count),
            "sum" | "total" => Some(AggregateFn::Sum),
            "average" | "avg" | "mean" => Some(AggregateFn::Average),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtotalSpec {
    pub group_by: String,
    pub aggregate_column: String,
    pub function: AggregateFn,
}

/// A tab addressed either by position (`sheet_0`) or by its current name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabRef {
    Index(usize),
    Name(String),
}

/// One validated operation
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Filter(FilterOp),
    Sort(SortOp),
    DeleteRows(DeleteRows),
    RemoveLastRow,
    TopN(usize),
    BottomN(usize),
    HighlightRows(Highlight),
    HighlightCells(Highlight),
    ConditionalFormat(ConditionalFormat),
    HighlightDuplicates(ColumnsHighlight),
    HighlightNulls(ColumnsHighlight),
    /// Frozen (rows, cols); (0, 0) removes any freeze
    FreezePanes { rows: u32, cols: u16 },
    Subtotals(SubtotalSpec),
    AutoFilter(bool),
    MergeFiles { sheet_names: Vec<String> },
    RenameTabs(Vec<(TabRef, String)>),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Filter(_) => OperationKind::Filter,
            Operation::Sort(_) => OperationKind::Sort,
            Operation::DeleteRows(_) => OperationKind::DeleteRows,
            Operation::RemoveLastRow => OperationKind::RemoveLastRow,
            Operation::TopN(_) => OperationKind::TopN,
            Operation::BottomN(_) => OperationKind::BottomN,
            Operation::HighlightRows(_) => OperationKind::HighlightRows,
            Operation::HighlightCells(_) => OperationKind::HighlightCells,
            Operation::ConditionalFormat(_) => OperationKind::ConditionalFormat,
            Operation::HighlightDuplicates(_) => OperationKind::HighlightDuplicates,
            Operation::HighlightNulls(_) => OperationKind::HighlightNulls,
            Operation::FreezePanes { .. } => OperationKind::FreezePanes,
            Operation::Subtotals(_) => OperationKind::Subtotals,
            Operation::AutoFilter(_) => OperationKind::AutoFilter,
            Operation::MergeFiles { .. } => OperationKind::MergeFiles,
            Operation::RenameTabs(_) => OperationKind::RenameTabs,
        }
    }

    /// Short human-readable description for reports and logs
    pub fn describe(&self) -> String {
        match self {
            Operation::Filter(f) => format!("filter {} {}", f.column, f.condition.describe()),
            Operation::Sort(s) => format!("sort by {}", s.by.join(", ")),
            Operation::DeleteRows(DeleteRows::Numbers(n)) => format!("delete rows {:?}", n),
            Operation::DeleteRows(DeleteRows::Matching { column, condition }) => {
                format!("delete rows where {} {}", column, condition.describe())
            }
            Operation::RemoveLastRow => "remove last row".to_string(),
            Operation::TopN(n) => format!("keep first {} rows", n),
            Operation::BottomN(n) => format!("keep last {} rows", n),
            Operation::HighlightRows(h) => {
                format!("highlight rows where {} {}", h.column, h.condition.describe())
            }
            Operation::HighlightCells(h) => {
                format!("highlight cells where {} {}", h.column, h.condition.describe())
            }
            Operation::ConditionalFormat(c) => {
                format!("conditional format on {} ({} rules)", c.column, c.rules.len())
            }
            Operation::HighlightDuplicates(h) => {
                format!("highlight duplicates in {}", columns_label(&h.columns))
            }
            Operation::HighlightNulls(h) => {
                format!("highlight empty cells in {}", columns_label(&h.columns))
            }
            Operation::FreezePanes { rows, cols } => {
                format!("freeze {} row(s), {} column(s)", rows, cols)
            }
            Operation::Subtotals(s) => format!(
                "subtotal {} of {} by {}",
                s.function.label().to_lowercase(),
                s.aggregate_column,
                s.group_by
            ),
            Operation::AutoFilter(on) => format!("auto filter {}", if *on { "on" } else { "off" }),
            Operation::MergeFiles { .. } => "merge files".to_string(),
            Operation::RenameTabs(r) => format!("rename {} tab(s)", r.len()),
        }
    }
}

fn columns_label(columns: &[String]) -> String {
    if columns.is_empty() {
        "all columns".to_string()
    } else {
        columns.join(", ")
    }
}

//==============================================================================
// Routing + spec
//==============================================================================

/// Which sheets a step targets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetScope {
    /// Neither modifier set: the single sheet, or all sheets when there are many
    #[default]
    Default,
    Target(String),
    AllSheets,
}

/// A validated operation spec
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub scope: SheetScope,
    pub operations: Vec<Operation>,
    /// Ordered sub-specs from `operations: [...]`
    pub steps: Vec<OperationSpec>,
    pub custom_filename: Option<String>,
    /// The document as received
    pub raw: Value,
}

impl OperationSpec {
    pub fn empty() -> Self {
        Self {
            scope: SheetScope::Default,
            operations: Vec::new(),
            steps: Vec::new(),
            custom_filename: None,
            raw: Value::Object(Map::new()),
        }
    }

    pub fn from_json_str(text: &str) -> EngineResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Load a spec file; `.yaml`/`.yml` are read as YAML, anything else as JSON
    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let value: Value = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> EngineResult<Self> {
        let Value::Object(map) = value else {
            return Err(EngineError::SpecValidation(
                "operation spec must be a JSON object".to_string(),
            ));
        };
        validate_against_schema(value)?;

        if let Some(steps_value) = map.get("operations") {
            let Value::Array(items) = steps_value else {
                return Err(EngineError::SpecValidation(
                    "'operations' must be an array".to_string(),
                ));
            };
            let mut steps = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let Value::Object(step_map) = item else {
                    return Err(EngineError::SpecValidation(format!(
                        "operations[{}] must be an object",
                        idx
                    )));
                };
                let step = parse_step(step_map, item)
                    .map_err(|e| prefix_error(e, &format!("operations[{}]", idx)))?;
                if idx > 0 && step.merge_names().is_some() {
                    return Err(EngineError::SpecValidation(format!(
                        "operations[{}]: merge_files must be the first operation",
                        idx
                    )));
                }
                steps.push(step);
            }
            return Ok(Self {
                scope: SheetScope::Default,
                operations: Vec::new(),
                steps,
                custom_filename: string_field(map, "custom_filename")?,
                raw: value.clone(),
            });
        }

        parse_step(map, value)
    }

    /// True for `{}`: no operations at all
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.steps.iter().all(OperationSpec::is_empty)
    }

    /// The steps to execute in order: the `operations` list, or the spec itself
    pub fn plan(&self) -> Vec<&OperationSpec> {
        if self.steps.is_empty() {
            vec![self]
        } else {
            self.steps.iter().collect()
        }
    }

    /// Desired sheet names when this step merges files
    pub fn merge_names(&self) -> Option<&[String]> {
        self.operations.iter().find_map(|op| match op {
            Operation::MergeFiles { sheet_names } => Some(sheet_names.as_slice()),
            _ => None,
        })
    }

    /// Last custom filename given anywhere in the spec
    pub fn filename_stem(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find_map(|s| s.custom_filename.as_deref())
            .or(self.custom_filename.as_deref())
    }

    pub fn kinds(&self) -> Vec<OperationKind> {
        self.plan()
            .iter()
            .flat_map(|s| s.operations.iter().map(Operation::kind))
            .collect()
    }
}

fn prefix_error(err: EngineError, prefix: &str) -> EngineError {
    match err {
        EngineError::SpecValidation(msg) => {
            EngineError::SpecValidation(format!("{}: {}", prefix, msg))
        }
        other => other,
    }
}

//==============================================================================
// Step parsing
//==============================================================================

fn parse_step(map: &Map<String, Value>, raw: &Value) -> EngineResult<OperationSpec> {
    let target = string_field(map, "target_sheet")?;
    let all = match map.get("apply_to_all_sheets") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(EngineError::SpecValidation(format!(
                "apply_to_all_sheets must be a boolean, got {}",
                other
            )))
        }
    };
    let scope = match (target, all) {
        (Some(_), true) => {
            return Err(EngineError::SpecValidation(
                "target_sheet and apply_to_all_sheets are mutually exclusive".to_string(),
            ))
        }
        (Some(name), false) => SheetScope::Target(name),
        (None, true) => SheetScope::AllSheets,
        (None, false) => SheetScope::Default,
    };

    let mut operations = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "target_sheet" | "apply_to_all_sheets" | "custom_filename" | "sheet_names" => {}
            "operations" => {
                return Err(EngineError::SpecValidation(
                    "nested 'operations' lists are not supported".to_string(),
                ))
            }
            other => {
                let kind = OperationKind::from_key(other).ok_or_else(|| {
                    EngineError::SpecValidation(format!("unknown operation '{}'", other))
                })?;
                let parsed = parse_kind(kind, value, map)
                    .map_err(|e| prefix_error(e, kind.key()))?;
                operations.extend(parsed);
            }
        }
    }

    let merges = operations.iter().any(|op| op.kind() == OperationKind::MergeFiles);
    if map.contains_key("sheet_names") && !merges {
        return Err(EngineError::SpecValidation(
            "sheet_names is only valid together with merge_files".to_string(),
        ));
    }

    Ok(OperationSpec {
        scope,
        operations,
        steps: Vec::new(),
        custom_filename: string_field(map, "custom_filename")?,
        raw: raw.clone(),
    })
}

fn parse_kind(
    kind: OperationKind,
    value: &Value,
    step: &Map<String, Value>,
) -> EngineResult<Vec<Operation>> {
    let ops = match kind {
        OperationKind::Filter => {
            let mut ops = Vec::new();
            for entry in one_or_many(value)? {
                ops.extend(parse_filter(entry)?);
            }
            ops
        }
        OperationKind::Sort => one_or_many(value)?
            .into_iter()
            .map(parse_sort)
            .collect::<EngineResult<_>>()?,
        OperationKind::DeleteRows => one_or_many(value)?
            .into_iter()
            .map(parse_delete)
            .collect::<EngineResult<_>>()?,
        OperationKind::RemoveLastRow => match bool_value(value)? {
            true => vec![Operation::RemoveLastRow],
            false => Vec::new(),
        },
        OperationKind::TopN => vec![Operation::TopN(count_value(value)?)],
        OperationKind::BottomN => vec![Operation::BottomN(count_value(value)?)],
        OperationKind::HighlightRows => one_or_many(value)?
            .into_iter()
            .map(|m| parse_highlight(m).map(Operation::HighlightRows))
            .collect::<EngineResult<_>>()?,
        OperationKind::HighlightCells => one_or_many(value)?
            .into_iter()
            .map(|m| parse_highlight(m).map(Operation::HighlightCells))
            .collect::<EngineResult<_>>()?,
        OperationKind::ConditionalFormat => one_or_many(value)?
            .into_iter()
            .map(parse_conditional_format)
            .collect::<EngineResult<_>>()?,
        OperationKind::HighlightDuplicates => parse_columns_highlight(value)?
            .into_iter()
            .map(Operation::HighlightDuplicates)
            .collect(),
        OperationKind::HighlightNulls => parse_columns_highlight(value)?
            .into_iter()
            .map(Operation::HighlightNulls)
            .collect(),
        OperationKind::FreezePanes => vec![parse_freeze(value)?],
        OperationKind::Subtotals => one_or_many(value)?
            .into_iter()
            .map(parse_subtotals)
            .collect::<EngineResult<_>>()?,
        OperationKind::AutoFilter => vec![Operation::AutoFilter(bool_value(value)?)],
        OperationKind::MergeFiles => match bool_value(value)? {
            true => vec![Operation::MergeFiles {
                sheet_names: match step.get("sheet_names") {
                    Some(v) => string_list(v, "sheet_names")?,
                    None => Vec::new(),
                },
            }],
            false => Vec::new(),
        },
        OperationKind::RenameTabs => vec![parse_rename(value)?],
    };
    Ok(ops)
}

fn one_or_many(value: &Value) -> EngineResult<Vec<&Map<String, Value>>> {
    match value {
        Value::Object(map) => Ok(vec![map]),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                other => Err(EngineError::SpecValidation(format!(
                    "expected an object, got {}",
                    other
                ))),
            })
            .collect(),
        other => Err(EngineError::SpecValidation(format!(
            "expected an object or a non-empty array of objects, got {}",
            other
        ))),
    }
}

fn required_str(map: &Map<String, Value>, key: &str) -> EngineResult<String> {
    string_field(map, key)?
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::SpecValidation(format!("missing required field '{}'", key)))
}

fn string_field(map: &Map<String, Value>, key: &str) -> EngineResult<Option<String>> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(EngineError::SpecValidation(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn string_list(value: &Value, key: &str) -> EngineResult<Vec<String>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    EngineError::SpecValidation(format!("'{}' must contain only strings", key))
                })
            })
            .collect(),
        other => Err(EngineError::SpecValidation(format!(
            "'{}' must be a string or list of strings, got {}",
            key, other
        ))),
    }
}

fn bool_value(value: &Value) -> EngineResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| EngineError::SpecValidation(format!("expected a boolean, got {}", value)))
}

fn count_value(value: &Value) -> EngineResult<usize> {
    let raw = match value {
        Value::Object(map) => map.get("n"),
        other => Some(other),
    };
    raw.and_then(Value::as_u64)
        .map(|n| n as usize)
        .ok_or_else(|| {
            EngineError::SpecValidation(format!("expected a non-negative integer, got {}", value))
        })
}

fn condition_field(map: &Map<String, Value>) -> EngineResult<Condition> {
    let raw = map
        .get("condition")
        .ok_or_else(|| {
            EngineError::SpecValidation("missing required field 'condition'".to_string())
        })?;
    Condition::from_json(raw)
}

fn parse_filter(map: &Map<String, Value>) -> EngineResult<Vec<Operation>> {
    // `{column, condition}` form
    if let (Some(Value::String(column)), Some(_)) = (map.get("column"), map.get("condition")) {
        if map.len() == 2 {
            return Ok(vec![Operation::Filter(FilterOp {
                column: column.clone(),
                condition: condition_field(map)?,
            })]);
        }
    }
    if map.is_empty() {
        return Err(EngineError::SpecValidation("filter needs at least one column".to_string()));
    }
    map.iter()
        .map(|(column, raw)| {
            Ok(Operation::Filter(FilterOp {
                column: column.clone(),
                condition: Condition::from_json(raw)?,
            }))
        })
        .collect()
}

fn parse_sort(map: &Map<String, Value>) -> EngineResult<Operation> {
    let by = string_list(map.get("by").unwrap_or(&Value::Null), "by")?;
    if by.is_empty() {
        return Err(EngineError::SpecValidation("missing required field 'by'".to_string()));
    }
    let ascending = match map.get("ascending") {
        None | Some(Value::Null) => vec![true; by.len()],
        Some(Value::Bool(b)) => vec![*b; by.len()],
        Some(Value::Array(flags)) => {
            let flags: Vec<bool> = flags
                .iter()
                .map(|f| {
                    f.as_bool().ok_or_else(|| {
                        EngineError::SpecValidation("'ascending' must contain booleans".to_string())
                    })
                })
                .collect::<EngineResult<_>>()?;
            if flags.len() != by.len() {
                return Err(EngineError::SpecValidation(format!(
                    "'ascending' has {} flags for {} sort keys",
                    flags.len(),
                    by.len()
                )));
            }
            flags
        }
        Some(other) => {
            return Err(EngineError::SpecValidation(format!(
                "'ascending' must be a boolean or list of booleans, got {}",
                other
            )))
        }
    };
    Ok(Operation::Sort(SortOp { by, ascending }))
}

fn parse_delete(map: &Map<String, Value>) -> EngineResult<Operation> {
    if let Some(numbers) = map.get("row_numbers") {
        let Value::Array(items) = numbers else {
            return Err(EngineError::SpecValidation("'row_numbers' must be an array".to_string()));
        };
        let numbers = items
            .iter()
            .map(|n| {
                n.as_i64().ok_or_else(|| {
                    EngineError::SpecValidation(format!("row number must be an integer, got {}", n))
                })
            })
            .collect::<EngineResult<_>>()?;
        return Ok(Operation::DeleteRows(DeleteRows::Numbers(numbers)));
    }
    Ok(Operation::DeleteRows(DeleteRows::Matching {
        column: required_str(map, "column")?,
        condition: condition_field(map)?,
    }))
}

fn parse_highlight(map: &Map<String, Value>) -> EngineResult<Highlight> {
    Ok(Highlight {
        column: required_str(map, "column")?,
        condition: condition_field(map)?,
        color: string_field(map, "color")?,
    })
}

fn parse_conditional_format(map: &Map<String, Value>) -> EngineResult<Operation> {
    let column = required_str(map, "column")?;
    let Some(Value::Array(rules)) = map.get("rules") else {
        return Err(EngineError::SpecValidation("missing required field 'rules'".to_string()));
    };
    if rules.is_empty() {
        return Err(EngineError::SpecValidation("'rules' must not be empty".to_string()));
    }
    let rules = rules
        .iter()
        .map(|rule| match rule {
            Value::Object(r) => Ok(FormatRule {
                condition: condition_field(r)?,
                color: string_field(r, "color")?,
            }),
            other => Err(EngineError::SpecValidation(format!(
                "rule must be an object, got {}",
                other
            ))),
        })
        .collect::<EngineResult<_>>()?;
    Ok(Operation::ConditionalFormat(ConditionalFormat { column, rules }))
}

fn parse_columns_highlight(value: &Value) -> EngineResult<Vec<ColumnsHighlight>> {
    if let Value::Bool(on) = value {
        return Ok(if *on {
            vec![ColumnsHighlight {
                columns: Vec::new(),
                color: None,
            }]
        } else {
            Vec::new()
        });
    }
    one_or_many(value)?
        .into_iter()
        .map(|map| {
            let columns = match map.get("columns").or_else(|| map.get("column")) {
                Some(v) => string_list(v, "columns")?,
                None => Vec::new(),
            };
            Ok(ColumnsHighlight {
                columns,
                color: string_field(map, "color")?,
            })
        })
        .collect()
}

fn parse_freeze(value: &Value) -> EngineResult<Operation> {
    match value {
        Value::Bool(true) => Ok(Operation::FreezePanes { rows: 1, cols: 0 }),
        Value::Bool(false) => Ok(Operation::FreezePanes { rows: 0, cols: 0 }),
        Value::Object(map) => {
            let rows = match map.get("row") {
                None | Some(Value::Null) => 1,
                Some(v) => v.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(|| {
                    EngineError::SpecValidation(format!(
                        "'row' must be a non-negative integer, got {}",
                        v
                    ))
                })?,
            };
            let cols = match map.get("col") {
                None | Some(Value::Null) => 0,
                Some(v) => v.as_u64().and_then(|n| u16::try_from(n).ok()).ok_or_else(|| {
                    EngineError::SpecValidation(format!(
                        "'col' must be a non-negative integer, got {}",
                        v
                    ))
                })?,
            };
            Ok(Operation::FreezePanes { rows, cols })
        }
        other => Err(EngineError::SpecValidation(format!(
            "expected an object or boolean, got {}",
            other
        ))),
    }
}

fn parse_subtotals(map: &Map<String, Value>) -> EngineResult<Operation> {
    let function = match string_field(map, "function")? {
        None => AggregateFn::Count,
        Some(f) => AggregateFn::parse(&f).ok_or_else(|| {
            EngineError::SpecValidation(format!(
                "unknown subtotal function '{}' (expected count, sum or average)",
                f
            ))
        })?,
    };
    Ok(Operation::Subtotals(SubtotalSpec {
        group_by: required_str(map, "group_by")?,
        aggregate_column: required_str(map, "aggregate_column")?,
        function,
    }))
}

fn parse_rename(value: &Value) -> EngineResult<Operation> {
    let Value::Object(map) = value else {
        return Err(EngineError::SpecValidation(
            "expected an object of tab → new name".to_string(),
        ));
    };
    let renames = map
        .iter()
        .map(|(key, new_name)| {
            let new_name = new_name
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    EngineError::SpecValidation(format!(
                        "new name for '{}' must be a non-empty string",
                        key
                    ))
                })?;
            let tab = key
                .strip_prefix("sheet_")
                .and_then(|idx| idx.parse::<usize>().ok())
                .map_or_else(|| TabRef::Name(key.clone()), TabRef::Index);
            Ok((tab, new_name.to_string()))
        })
        .collect::<EngineResult<_>>()?;
    Ok(Operation::RenameTabs(renames))
}
