//! Row predicates used by filter, delete_rows, highlights and conditional formats.

use chrono::{Datelike, Local, Months, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{EngineError, EngineResult};
use crate::types::CellValue;

/// N used when a topN/bottomN condition omits its value
pub const DEFAULT_RANK_N: usize = 5;

const MONTH_NAMES: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
        }
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Gt => ord == Greater,
            CompareOp::Lt => ord == Less,
            CompareOp::Ge => ord != Less,
            CompareOp::Le => ord != Greater,
        }
    }
}

/// `YYYY-MM`, a bare month number, or a month name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSpec {
    pub year: Option<i32>,
    pub month: u32,
}

impl MonthSpec {
    pub fn parse(value: &Value) -> Option<Self> {
        static YEAR_MONTH: OnceLock<Regex> = OnceLock::new();
        let re = YEAR_MONTH.get_or_init(|| {
            Regex::new(r"^(\d{4})-(\d{1,2})$").expect("valid year-month regex")
        });

        let text = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.trim().to_string(),
            _ => return None,
        };

        let spec = if let Some(caps) = re.captures(&text) {
            MonthSpec {
                year: caps[1].parse().ok(),
                month: caps[2].parse().ok()?,
            }
        } else if let Ok(month) = text.parse::<u32>() {
            MonthSpec { year: None, month }
        } else {
            let lower = text.to_lowercase();
            let idx = MONTH_NAMES
                .iter()
                .position(|m| *m == lower || (lower.len() >= 3 && m.starts_with(&lower)))?;
            MonthSpec {
                year: None,
                month: idx as u32 + 1,
            }
        };

        (1..=12).contains(&spec.month).then_some(spec)
    }

    fn contains(&self, date: NaiveDate) -> bool {
        date.month() == self.month && self.year.map_or(true, |y| date.year() == y)
    }
}

/// A typed predicate over a single cell (or, for rank conditions, a column)
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare { op: CompareOp, value: CellValue },
    Contains(String),
    In(Vec<CellValue>),
    IsNull,
    /// topN (`top = true`) / bottomN
    Rank { top: bool, n: usize },
    DateInMonth(MonthSpec),
    DateInPreviousMonth { reference: Option<NaiveDate> },
}

impl Condition {
    /// Parse `{operator, value}` or a bare value (equality).
    pub fn from_json(raw: &Value) -> EngineResult<Self> {
        let Value::Object(map) = raw else {
            return Ok(Condition::Compare {
                op: CompareOp::Eq,
                value: CellValue::from_json(raw),
            });
        };
        if !map.contains_key("operator") {
            if map.contains_key("value") {
                return Ok(Condition::Compare {
                    op: CompareOp::Eq,
                    value: CellValue::from_json(&map["value"]),
                });
            }
            return Err(EngineError::SpecValidation(
                "condition must have an 'operator' or 'value'".to_string(),
            ));
        }

        let operator = map["operator"].as_str().ok_or_else(|| {
            EngineError::SpecValidation("condition 'operator' must be a string".to_string())
        })?;
        let value = map.get("value").unwrap_or(&Value::Null);
        let normalized = operator.trim().to_lowercase().replace(['_', ' '], "");

        let condition = match normalized.as_str() {
            "==" | "=" | "equals" | "eq" => compare(CompareOp::Eq, value),
            "!=" | "<>" | "notequals" | "ne" => compare(CompareOp::Ne, value),
            ">" | "gt" => compare(CompareOp::Gt, value),
            "<" | "lt" => compare(CompareOp::Lt, value),
            ">=" | "gte" | "ge" => compare(CompareOp::Ge, value),
            "<=" | "lte" | "le" => compare(CompareOp::Le, value),
            "contains" => Condition::Contains(CellValue::from_json(value).display_text()),
            "in" => match value {
                Value::Array(items) => {
                    Condition::In(items.iter().map(CellValue::from_json).collect())
                }
                _ => {
                    return Err(EngineError::SpecValidation(
                        "operator 'in' requires an array value".to_string(),
                    ))
                }
            },
            "isnull" => Condition::IsNull,
            "topn" | "bottomn" => Condition::Rank {
                top: normalized == "topn",
                n: rank_n(value)?,
            },
            "dateinmonth" => Condition::DateInMonth(MonthSpec::parse(value).ok_or_else(|| {
                EngineError::SpecValidation(format!("invalid month for date_in_month: {}", value))
            })?),
            "dateinpreviousmonth" => Condition::DateInPreviousMonth {
                reference: match value {
                    Value::Null => None,
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(
                        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
                            EngineError::SpecValidation(format!(
                                "invalid reference date '{}' (expected YYYY-MM-DD)",
                                s
                            ))
                        })?,
                    ),
                    other => {
                        return Err(EngineError::SpecValidation(format!(
                            "invalid reference date: {}",
                            other
                        )))
                    }
                },
            },
            _ => {
                return Err(EngineError::SpecValidation(format!(
                    "unknown condition operator '{}'",
                    operator
                )))
            }
        };
        Ok(condition)
    }

    pub fn describe(&self) -> String {
        match self {
            Condition::Compare { op, value } => format!("{} {}", op.symbol(), value.display_text()),
            Condition::Contains(s) => format!("contains '{}'", s),
            Condition::In(items) => format!("in [{} values]", items.len()),
            Condition::IsNull => "is null".to_string(),
            Condition::Rank { top: true, n } => format!("top {}", n),
            Condition::Rank { top: false, n } => format!("bottom {}", n),
            Condition::DateInMonth(m) => match m.year {
                Some(y) => format!("date in {}-{:02}", y, m.month),
                None => format!("date in month {}", m.month),
            },
            Condition::DateInPreviousMonth { .. } => "date in previous month".to_string(),
        }
    }

    /// Evaluate over a whole column.
    pub fn mask(&self, values: &[CellValue]) -> Vec<bool> {
        self.mask_where(values, |_| true)
    }

    /// Evaluate over a column, considering only rows where `eligible` holds.
    /// Ineligible rows never match and do not take part in rank thresholds.
    pub fn mask_where(&self, values: &[CellValue], eligible: impl Fn(usize) -> bool) -> Vec<bool> {
        let threshold = match self {
            Condition::Rank { top, n } => rank_threshold(
                values
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| eligible(*i))
                    .map(|(_, v)| v),
                *top,
                *n,
            ),
            _ => None,
        };
        let today = Local::now().date_naive();

        values
            .iter()
            .enumerate()
            .map(|(i, v)| eligible(i) && self.matches(v, threshold, today))
            .collect()
    }

    fn matches(&self, value: &CellValue, threshold: Option<f64>, today: NaiveDate) -> bool {
        if let Condition::IsNull = self {
            return value.is_null();
        }
        if let Condition::Compare {
            op,
            value: CellValue::Null,
        } = self
        {
            return match op {
                CompareOp::Eq => value.is_null(),
                CompareOp::Ne => !value.is_null(),
                _ => false,
            };
        }
        if value.is_null() {
            return false;
        }

        match self {
            Condition::Compare { op: CompareOp::Eq, value: target } => value.loosely_equals(target),
            Condition::Compare { op: CompareOp::Ne, value: target } => {
                !value.loosely_equals(target)
            }
            Condition::Compare { op, value: target } => {
                if let (Some(a), Some(b)) = (value.as_number(), target.as_number()) {
                    a.partial_cmp(&b).is_some_and(|ord| op.holds(ord))
                } else if let (Some(a), Some(b)) = (value.as_date(), target.as_date()) {
                    op.holds(a.cmp(&b))
                } else {
                    false
                }
            }
            Condition::Contains(needle) => value
                .display_text()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Condition::In(items) => items.iter().any(|item| value.loosely_equals(item)),
            Condition::Rank { top, .. } => match (value.as_number(), threshold) {
                (Some(v), Some(t)) => {
                    if *top {
                        v >= t
                    } else {
                        v <= t
                    }
                }
                _ => false,
            },
            Condition::DateInMonth(spec) => {
                value.as_date().is_some_and(|d| spec.contains(d.date()))
            }
            Condition::DateInPreviousMonth { reference } => {
                let reference = reference.unwrap_or(today);
                let Some(previous) = reference.checked_sub_months(Months::new(1)) else {
                    return false;
                };
                value.as_date().is_some_and(|d| {
                    d.date().year() == previous.year() && d.date().month() == previous.month()
                })
            }
            Condition::IsNull => value.is_null(),
        }
    }
}

fn compare(op: CompareOp, value: &Value) -> Condition {
    Condition::Compare {
        op,
        value: CellValue::from_json(value),
    }
}

fn rank_n(value: &Value) -> EngineResult<usize> {
    match value {
        Value::Null => Ok(DEFAULT_RANK_N),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n as usize)
            .ok_or_else(|| {
                EngineError::SpecValidation(format!("invalid N for topN/bottomN: {}", n))
            }),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| {
                EngineError::SpecValidation(format!("invalid N for topN/bottomN: '{}'", s))
            }),
        other => Err(EngineError::SpecValidation(format!(
            "invalid N for topN/bottomN: {}",
            other
        ))),
    }
}

/// The N-th largest (top) or smallest (bottom) numeric value, counting duplicates.
/// Every value at or beyond it matches, so ties at the boundary are included.
fn rank_threshold<'a>(
    values: impl Iterator<Item = &'a CellValue>,
    top: bool,
    n: usize,
) -> Option<f64> {
    if n == 0 {
        return None;
    }
    let mut numbers: Vec<f64> = values
        .filter(|v| !v.is_null())
        .filter_map(CellValue::as_number)
        .collect();
    if numbers.is_empty() {
        return None;
    }
    if top {
        numbers.sort_by(|a, b| b.total_cmp(a));
    } else {
        numbers.sort_by(|a, b| a.total_cmp(b));
    }
    Some(numbers[n.min(numbers.len()) - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nums(values: &[f64]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::Number(*v)).collect()
    }

    #[test]
    fn test_bare_value_is_equality() {
        let c = Condition::from_json(&json!("Active")).unwrap();
        assert_eq!(
            c,
            Condition::Compare {
                op: CompareOp::Eq,
                value: CellValue::text("Active")
            }
        );
    }

    #[test]
    fn test_operator_aliases() {
        let c = Condition::from_json(&json!({"operator": "TOP_N", "value": 3})).unwrap();
        assert_eq!(c, Condition::Rank { top: true, n: 3 });
        let c = Condition::from_json(&json!({"operator": "bottomN"})).unwrap();
        assert_eq!(c, Condition::Rank { top: false, n: DEFAULT_RANK_N });
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err =
            Condition::from_json(&json!({"operator": "approximately", "value": 3})).unwrap_err();
        assert!(err.to_string().contains("approximately"));
    }

    #[test]
    fn test_numeric_comparisons_coerce_text() {
        let c = Condition::from_json(&json!({"operator": ">", "value": "10"})).unwrap();
        let values = vec![CellValue::Number(5.0), CellValue::text("15"), CellValue::text("n/a")];
        assert_eq!(c.mask(&values), vec![false, true, false]);
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let c = Condition::from_json(&json!({"operator": "contains", "value": "act"})).unwrap();
        let values = vec![CellValue::text("Active"), CellValue::text("Paused"), CellValue::Null];
        assert_eq!(c.mask(&values), vec![true, false, false]);
    }

    #[test]
    fn test_in_operator() {
        let c = Condition::from_json(&json!({"operator": "in", "value": ["A", 2]})).unwrap();
        let values = vec![CellValue::text("A"), CellValue::Number(2.0), CellValue::text("B")];
        assert_eq!(c.mask(&values), vec![true, true, false]);
        assert!(Condition::from_json(&json!({"operator": "in", "value": "A"})).is_err());
    }

    #[test]
    fn test_null_handling() {
        let c = Condition::from_json(&json!({"operator": "is_null"})).unwrap();
        let values = vec![CellValue::Null, CellValue::text(""), CellValue::Number(0.0)];
        assert_eq!(c.mask(&values), vec![true, true, false]);

        let ne = Condition::from_json(&json!({"operator": "!=", "value": "x"})).unwrap();
        assert_eq!(ne.mask(&[CellValue::Null]), vec![false]);
    }

    #[test]
    fn test_top_n_includes_ties() {
        let c = Condition::Rank { top: true, n: 2 };
        assert_eq!(
            c.mask(&nums(&[10.0, 9.0, 9.0, 8.0])),
            vec![true, true, true, false]
        );
    }

    #[test]
    fn test_bottom_n_larger_than_column_matches_all_numbers() {
        let c = Condition::Rank { top: false, n: 10 };
        let mut values = nums(&[3.0, 1.0]);
        values.push(CellValue::text("x"));
        assert_eq!(c.mask(&values), vec![true, true, false]);
    }

    #[test]
    fn test_rank_respects_eligibility() {
        let c = Condition::Rank { top: true, n: 1 };
        let values = nums(&[5.0, 100.0, 7.0]);
        assert_eq!(c.mask_where(&values, |i| i != 1), vec![false, false, true]);
    }

    #[test]
    fn test_month_spec_forms() {
        assert_eq!(
            MonthSpec::parse(&json!("2024-03")),
            Some(MonthSpec { year: Some(2024), month: 3 })
        );
        assert_eq!(MonthSpec::parse(&json!(11)), Some(MonthSpec { year: None, month: 11 }));
        assert_eq!(MonthSpec::parse(&json!("March")), Some(MonthSpec { year: None, month: 3 }));
        assert_eq!(MonthSpec::parse(&json!("13")), None);
    }

    #[test]
    fn test_date_in_month() {
        let c =
            Condition::from_json(&json!({"operator": "date_in_month", "value": "2024-03"}))
                .unwrap();
        let values = vec![
            CellValue::text("2024-03-15"),
            CellValue::text("15/03/2023"),
            CellValue::text("not a date"),
        ];
        assert_eq!(c.mask(&values), vec![true, false, false]);
    }

    #[test]
    fn test_date_in_previous_month_with_reference() {
        let c = Condition::from_json(&json!({
            "operator": "date_in_previous_month",
            "value": "2024-01-10"
        }))
        .unwrap();
        let values = vec![CellValue::text("2023-12-31"), CellValue::text("2024-01-02")];
        assert_eq!(c.mask(&values), vec![true, false]);
    }
}
