//! Type-aware equivalence for a single pair of cell values.
//!
//! `compare` is pure and total: values that fail every lenient parse fall
//! through to the string / other classification and take part in ordinary
//! mismatch logic.

use chrono::NaiveDateTime;
use serde::ser::{Serialize, Serializer};

use crate::value::{parse_iso_datetime, CellValue, ValueKind};

/// Relative tolerance used when none is configured.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Lenient classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    Null,
    Bool,
    Number,
    Datetime,
    String,
    Other,
}

/// Which rule decided the verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchKind {
    BothNull,
    Exact,
    CoercedExact,
    NumericTolerance,
    /// Numbers outside tolerance; carries `1 - relative_error`.
    NumericMismatch { similarity: f64 },
    CoercedBoolNumber,
    CaseInsensitiveExact,
    StringMismatch,
    DatetimeExact,
    DatetimeSameDay,
    DatetimeMismatch,
    Mismatch,
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BothNull => write!(f, "both_null"),
            Self::Exact => write!(f, "exact"),
            Self::CoercedExact => write!(f, "coerced_exact"),
            Self::NumericTolerance => write!(f, "numeric_tol"),
            Self::NumericMismatch { similarity } => write!(f, "numeric_rel={similarity:.4}"),
            Self::CoercedBoolNumber => write!(f, "coerced_bool_number"),
            Self::CaseInsensitiveExact => write!(f, "case_insensitive_exact"),
            Self::StringMismatch => write!(f, "string_mismatch"),
            Self::DatetimeExact => write!(f, "datetime_exact"),
            Self::DatetimeSameDay => write!(f, "datetime_same_day"),
            Self::DatetimeMismatch => write!(f, "datetime_mismatch"),
            Self::Mismatch => write!(f, "mismatch"),
        }
    }
}

impl Serialize for MatchKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub is_match: bool,
    pub type_mismatch: bool,
    pub kind: MatchKind,
}

impl Verdict {
    fn new(is_match: bool, type_mismatch: bool, kind: MatchKind) -> Self {
        Self {
            is_match,
            type_mismatch,
            kind,
        }
    }

    /// Equal only after coercion across differing types.
    pub fn is_coerced_match(&self) -> bool {
        self.is_match && self.type_mismatch
    }
}

// ---------------------------------------------------------------------------
// Lenient parsing
// ---------------------------------------------------------------------------

fn as_bool(v: &CellValue) -> Option<bool> {
    match v {
        CellValue::Bool(b) => Some(*b),
        CellValue::Int(0) => Some(false),
        CellValue::Int(1) => Some(true),
        CellValue::Float(f) if *f == 0.0 => Some(false),
        CellValue::Float(f) if *f == 1.0 => Some(true),
        CellValue::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Some(true),
            "false" | "f" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric reading of a value. Text is trimmed and thousands separators
/// are dropped; empty text is not numeric. Booleans are never numbers.
pub fn as_number(v: &CellValue) -> Option<f64> {
    match v {
        CellValue::Int(n) => Some(*n as f64),
        CellValue::Float(f) => Some(*f),
        CellValue::Text(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.replace(',', "").parse().ok()
        }
        _ => None,
    }
}

fn as_datetime(v: &CellValue) -> Option<NaiveDateTime> {
    match v {
        CellValue::Timestamp(ts) => Some(*ts),
        CellValue::Text(s) => parse_iso_datetime(s),
        _ => None,
    }
}

pub fn classify(v: &CellValue) -> ValueClass {
    if v.is_null() {
        ValueClass::Null
    } else if as_bool(v).is_some() {
        ValueClass::Bool
    } else if as_number(v).is_some() {
        ValueClass::Number
    } else if as_datetime(v).is_some() {
        ValueClass::Datetime
    } else if matches!(v, CellValue::Text(_)) {
        ValueClass::String
    } else {
        ValueClass::Other
    }
}

/// Scalars with the same rendering are raw-equal; bytes and nested values
/// only equal themselves.
fn raw_equal(a: &CellValue, b: &CellValue) -> bool {
    if a == b {
        return true;
    }
    is_scalar(a) && is_scalar(b) && a.render() == b.render()
}

fn is_scalar(v: &CellValue) -> bool {
    matches!(
        v.kind(),
        ValueKind::Bool | ValueKind::Number | ValueKind::Text | ValueKind::Timestamp
    )
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Compare `expected` against `actual`.
///
/// The type-mismatch flag is raised when the lenient classes differ or
/// when the stored kinds differ (text `"30"` vs integer `30`).
pub fn compare(expected: &CellValue, actual: &CellValue, tolerance: f64) -> Verdict {
    if expected.is_null() && actual.is_null() {
        return Verdict::new(true, false, MatchKind::BothNull);
    }

    let type_mismatch =
        classify(expected) != classify(actual) || expected.kind() != actual.kind();

    if raw_equal(expected, actual) {
        let kind = if type_mismatch {
            MatchKind::CoercedExact
        } else {
            MatchKind::Exact
        };
        return Verdict::new(true, type_mismatch, kind);
    }

    let n_exp = as_number(expected);
    let n_act = as_number(actual);
    if let (Some(a), Some(b)) = (n_exp, n_act) {
        let denom = a.abs().max(b.abs()).max(1.0);
        let rel = (a - b).abs() / denom;
        if rel <= tolerance {
            return Verdict::new(true, type_mismatch, MatchKind::NumericTolerance);
        }
        return Verdict::new(
            false,
            type_mismatch,
            MatchKind::NumericMismatch {
                similarity: 1.0 - rel,
            },
        );
    }

    if bool_matches_number(as_bool(expected), n_act) || bool_matches_number(as_bool(actual), n_exp) {
        return Verdict::new(true, true, MatchKind::CoercedBoolNumber);
    }

    if let (CellValue::Text(a), CellValue::Text(b)) = (expected, actual) {
        if a.trim().to_lowercase() == b.trim().to_lowercase() {
            return Verdict::new(true, type_mismatch, MatchKind::CaseInsensitiveExact);
        }
        return Verdict::new(false, type_mismatch, MatchKind::StringMismatch);
    }

    if let (Some(a), Some(b)) = (as_datetime(expected), as_datetime(actual)) {
        if a == b {
            return Verdict::new(true, type_mismatch, MatchKind::DatetimeExact);
        }
        if a.date() == b.date() {
            return Verdict::new(true, type_mismatch, MatchKind::DatetimeSameDay);
        }
        return Verdict::new(false, type_mismatch, MatchKind::DatetimeMismatch);
    }

    Verdict::new(false, type_mismatch, MatchKind::Mismatch)
}

fn bool_matches_number(b: Option<bool>, n: Option<f64>) -> bool {
    match (b, n) {
        (Some(true), Some(n)) => n == 1.0,
        (Some(false), Some(n)) => n == 0.0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: impl Into<CellValue>, b: impl Into<CellValue>) -> Verdict {
        compare(&a.into(), &b.into(), DEFAULT_TOLERANCE)
    }

    #[test]
    fn both_null() {
        let v = compare(&CellValue::Null, &CellValue::Null, DEFAULT_TOLERANCE);
        assert_eq!(v, Verdict::new(true, false, MatchKind::BothNull));
        assert_eq!(v.kind.to_string(), "both_null");
    }

    #[test]
    fn text_thirty_vs_integer_thirty() {
        let v = cmp("30", 30_i64);
        assert!(v.is_match);
        assert!(v.type_mismatch);
        assert_eq!(v.kind, MatchKind::CoercedExact);
    }

    #[test]
    fn bool_vs_one() {
        let v = cmp(true, 1_i64);
        assert!(v.is_match);
        assert!(v.type_mismatch);
        assert_eq!(v.kind, MatchKind::CoercedBoolNumber);

        let v = cmp(false, 0_i64);
        assert!(v.is_match);
        assert_eq!(v.kind, MatchKind::CoercedBoolNumber);

        let v = cmp("yes", 1_i64);
        assert!(v.is_match);

        let v = cmp(true, 0_i64);
        assert!(!v.is_match);
    }

    #[test]
    fn case_insensitive_strings() {
        let v = cmp("Hello", " hello ");
        assert!(v.is_match);
        assert!(!v.type_mismatch);
        assert_eq!(v.kind, MatchKind::CaseInsensitiveExact);

        let v = cmp("Hello", "World");
        assert!(!v.is_match);
        assert_eq!(v.kind, MatchKind::StringMismatch);
    }

    #[test]
    fn numeric_tolerance() {
        let v = compare(&100.0.into(), &100.000_000_05.into(), 1e-6);
        assert!(v.is_match);
        assert_eq!(v.kind, MatchKind::NumericTolerance);

        let v = compare(&100.0.into(), &101.0.into(), 1e-6);
        assert!(!v.is_match);
        assert_eq!(v.kind.to_string(), "numeric_rel=0.9901");
    }

    #[test]
    fn small_numbers_use_absolute_floor() {
        // denominator floors at 1.0
        let v = compare(&0.0.into(), &1e-10.into(), DEFAULT_TOLERANCE);
        assert!(v.is_match);
    }

    #[test]
    fn thousands_separators() {
        let v = cmp("1,234.5", 1234.5);
        assert!(v.is_match);
        assert!(v.type_mismatch);
        assert_eq!(v.kind, MatchKind::NumericTolerance);
    }

    #[test]
    fn int_and_float_share_a_kind() {
        let v = cmp(2_i64, 2.0);
        assert!(v.is_match);
        assert!(!v.type_mismatch);
        assert_eq!(v.kind, MatchKind::Exact);
    }

    #[test]
    fn datetimes() {
        let ts = parse_iso_datetime("2024-05-01T12:00:00").unwrap();
        let v = cmp(ts, "2024-05-01T12:00:00Z");
        assert!(v.is_match);
        assert_eq!(v.kind, MatchKind::DatetimeExact);

        let v = cmp(ts, "2024-05-01T18:30:00");
        assert!(v.is_match);
        assert_eq!(v.kind, MatchKind::DatetimeSameDay);

        let v = cmp(ts, "2024-05-02");
        assert!(!v.is_match);
        assert_eq!(v.kind, MatchKind::DatetimeMismatch);
    }

    #[test]
    fn two_iso_strings_compare_as_strings() {
        let v = cmp("2024-05-01T10:00:00", "2024-05-01T11:00:00");
        assert!(!v.is_match);
        assert_eq!(v.kind, MatchKind::StringMismatch);
    }

    #[test]
    fn null_against_value() {
        let v = compare(&CellValue::Null, &CellValue::Text("x".into()), DEFAULT_TOLERANCE);
        assert!(!v.is_match);
        assert!(v.type_mismatch);
        assert_eq!(v.kind, MatchKind::Mismatch);
    }

    #[test]
    fn empty_text_is_not_numeric() {
        assert_eq!(classify(&CellValue::Text("  ".into())), ValueClass::String);
        assert_eq!(as_number(&CellValue::Text("".into())), None);
    }

    #[test]
    fn classification() {
        assert_eq!(classify(&CellValue::Int(1)), ValueClass::Bool);
        assert_eq!(classify(&CellValue::Int(7)), ValueClass::Number);
        assert_eq!(classify(&"T".into()), ValueClass::Bool);
        assert_eq!(classify(&"2024-01-01".into()), ValueClass::Datetime);
        assert_eq!(classify(&CellValue::Bytes(vec![1])), ValueClass::Other);
    }

    #[test]
    fn render_equality_is_scalar_only() {
        let v = cmp(CellValue::Bytes(vec![0xde, 0xad]), "dead");
        assert!(!v.is_match);
        assert_eq!(v.kind, MatchKind::Mismatch);

        let v = cmp(CellValue::Nested(serde_json::json!([1])), "[1]");
        assert!(!v.is_match);

        let same = cmp(CellValue::Nested(serde_json::json!({"a": 1})), CellValue::Nested(serde_json::json!({"a": 1})));
        assert!(same.is_match);
        assert_eq!(same.kind, MatchKind::Exact);

        // scalars still take the render fast path
        let v = cmp("30", 30_i64);
        assert!(v.is_match);
        assert_eq!(v.kind, MatchKind::CoercedExact);
    }

    #[test]
    fn unparsable_values_never_panic() {
        let v = compare(
            &CellValue::Bytes(vec![1, 2]),
            &CellValue::Nested(serde_json::json!([1])),
            DEFAULT_TOLERANCE,
        );
        assert!(!v.is_match);
        assert_eq!(v.kind, MatchKind::Mismatch);
    }
}
