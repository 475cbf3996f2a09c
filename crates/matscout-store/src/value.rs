//! Cell values and the text forms accepted when appending.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};

use matscout_contracts::error::{HarnessError, HarnessResult};

static RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*-\s*(-?\d+(?:\.\d+)?)\s*$").expect("range pattern is valid")
});

/// One cell of the table.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Read a CSV cell: empty is null, anything that parses as a finite
    /// number is a number, the rest is text.
    pub fn parse_cell(cell: &str) -> Self {
        let trimmed = cell.trim();
        if trimmed.is_empty() {
            return FieldValue::Null;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Number(n),
            _ => FieldValue::Text(cell.to_string()),
        }
    }

    /// The cell as written back to CSV.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(t) => t.clone(),
            FieldValue::Null => String::new(),
        }
    }

    /// The numeric reading of this cell, if it has one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(t) => t.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            FieldValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::Text(t) => Value::String(t.clone()),
            FieldValue::Null => Value::Null,
        }
    }
}

/// A property value supplied to `MaterialStore::append`.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendValue {
    Null,
    Number(f64),
    Text(String),
}

impl AppendValue {
    /// Convert a JSON argument; booleans, arrays, and objects have no
    /// meaning as a property value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(AppendValue::Null),
            Value::Number(n) => n.as_f64().map(AppendValue::Number),
            Value::String(s) => Some(AppendValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Interpret the value: text may be a null marker, a number, or a
    /// `"min-max"` range.
    pub fn parse(&self) -> HarnessResult<ParsedValue> {
        match self {
            AppendValue::Null => Ok(ParsedValue::Null),
            AppendValue::Number(n) => Ok(ParsedValue::Number(*n)),
            AppendValue::Text(text) => parse_value_text(text),
        }
    }
}

/// An appended value after interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedValue {
    Null,
    Number(f64),
    Range(f64, f64),
}

/// Parse the text form of a property value.
///
/// `""`, `"none"`, `"null"` and `"nan"` (any case) are null; a decimal is a
/// number; `"a-b"` is a range.
///
/// # Errors
///
/// Returns `HarnessError::Parse` for anything else.
pub fn parse_value_text(text: &str) -> HarnessResult<ParsedValue> {
    let trimmed = text.trim();
    if trimmed.is_empty() || ["none", "null", "nan"].contains(&trimmed.to_lowercase().as_str()) {
        return Ok(ParsedValue::Null);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Ok(ParsedValue::Number(n));
        }
    }
    if let Some(captures) = RANGE.captures(trimmed) {
        let bound = |i: usize| captures[i].parse::<f64>();
        if let (Ok(min), Ok(max)) = (bound(1), bound(2)) {
            return Ok(ParsedValue::Range(min, max));
        }
    }
    Err(HarnessError::Parse {
        input: text.to_string(),
        reason: "expected a number or a 'min-max' range".to_string(),
    })
}

/// Bounds for a range search; an absent bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeQuery {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeQuery {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    /// True when `[low, high]` overlaps the query.
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        self.min.map(|min| high >= min).unwrap_or(true) && self.max.map(|max| low <= max).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn cells_parse_by_shape() {
        assert_eq!(FieldValue::parse_cell(""), FieldValue::Null);
        assert_eq!(FieldValue::parse_cell(" 8.96 "), FieldValue::Number(8.96));
        assert_eq!(FieldValue::parse_cell("metal"), FieldValue::Text("metal".into()));
        assert_eq!(FieldValue::parse_cell("inf"), FieldValue::Text("inf".into()));
        assert_eq!(FieldValue::Number(1085.0).to_cell(), "1085");
    }

    #[test]
    fn numeric_text_reads_as_number() {
        assert_eq!(FieldValue::Text(" 2.7".into()).as_number(), Some(2.7));
        assert_eq!(FieldValue::Text("n/a".into()).as_number(), None);
        assert_eq!(FieldValue::Null.as_number(), None);
    }

    #[test]
    fn value_text_forms() {
        assert_eq!(parse_value_text("").unwrap(), ParsedValue::Null);
        assert_eq!(parse_value_text("NaN").unwrap(), ParsedValue::Null);
        assert_eq!(parse_value_text("None").unwrap(), ParsedValue::Null);
        assert_eq!(parse_value_text("2.5").unwrap(), ParsedValue::Number(2.5));
        assert_eq!(parse_value_text("100-200").unwrap(), ParsedValue::Range(100.0, 200.0));
        assert_eq!(parse_value_text(" 9.5 - 10.5 ").unwrap(), ParsedValue::Range(9.5, 10.5));
        assert_eq!(parse_value_text("-40-85").unwrap(), ParsedValue::Range(-40.0, 85.0));

        let err = parse_value_text("very dense").unwrap_err();
        assert!(matches!(err, HarnessError::Parse { ref input, .. } if input == "very dense"));
    }

    #[test]
    fn json_arguments_convert() {
        assert_eq!(AppendValue::from_json(&json!(3)), Some(AppendValue::Number(3.0)));
        assert_eq!(AppendValue::from_json(&json!(null)), Some(AppendValue::Null));
        assert_eq!(AppendValue::from_json(&json!(true)), None);
    }

    #[test]
    fn range_overlap() {
        let query = RangeQuery::new(Some(2.0), Some(3.6));
        assert!(query.overlaps(2.5, 3.5));
        assert!(query.overlaps(3.0, 4.0));
        assert!(!query.overlaps(4.0, 5.0));
        assert!(RangeQuery::default().overlaps(-1.0, 1.0));
    }
}
