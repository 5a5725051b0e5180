use std::collections::HashMap;

use serde::Serialize;

use crate::schema::{normalize, CanonicalColumn, CanonicalType, NormalizedSchema, Nullability, RawColumn};
use crate::summary::{summarize_findings, SchemaSummary};

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One schema observation. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaFinding {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub column: String,
}

impl SchemaFinding {
    pub fn new(severity: Severity, code: &str, message: impl Into<String>, column: &str) -> Self {
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            column: column.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Migration validation
// ---------------------------------------------------------------------------

/// Diff two normalised schemas for migration risk, `src` → `dst`.
///
/// Findings come out in a stable order: missing columns (source order),
/// extra columns (target order), then per-column checks (source order).
pub fn validate_migration(
    src: &NormalizedSchema,
    dst: &NormalizedSchema,
    src_label: &str,
    dst_label: &str,
) -> Vec<SchemaFinding> {
    let src_map: HashMap<&str, &CanonicalColumn> =
        src.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let dst_map: HashMap<&str, &CanonicalColumn> =
        dst.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut findings = Vec::new();

    for col in &src.columns {
        if !dst_map.contains_key(col.name.as_str()) {
            findings.push(SchemaFinding::new(
                Severity::Error,
                "COLUMN_MISSING",
                format!("{} missing in {dst_label}", col.name),
                &col.name,
            ));
        }
    }
    for col in &dst.columns {
        if !src_map.contains_key(col.name.as_str()) {
            findings.push(SchemaFinding::new(
                Severity::Warning,
                "EXTRA_COLUMN",
                format!("{} extra in {dst_label} (not in {src_label})", col.name),
                &col.name,
            ));
        }
    }
    for col in &src.columns {
        if let Some(other) = dst_map.get(col.name.as_str()) {
            compare_columns(col, other, &mut findings);
        }
    }

    findings
}

fn compare_columns(a: &CanonicalColumn, b: &CanonicalColumn, out: &mut Vec<SchemaFinding>) {
    let name = a.name.as_str();

    if a.canonical_type != b.canonical_type {
        out.push(SchemaFinding::new(
            Severity::Error,
            "TYPE_MISMATCH",
            format!("{name}: {} vs {}", a.canonical_type, b.canonical_type),
            name,
        ));
        return;
    }

    if a.nullable != b.nullable {
        let severity = if a.nullable == Nullability::Nullable && b.nullable == Nullability::NotNull {
            Severity::Error
        } else {
            Severity::Warning
        };
        out.push(SchemaFinding::new(
            severity,
            "NULLABILITY_CHANGE",
            format!("{name} nullability {} -> {}", a.nullable, b.nullable),
            name,
        ));
    }

    let (ma, mb) = (&a.metadata, &b.metadata);
    match a.canonical_type {
        CanonicalType::String => {
            if let (Some(la), Some(lb)) = (ma.length, mb.length) {
                if lb < la {
                    out.push(SchemaFinding::new(
                        Severity::Error,
                        "STRING_TRUNCATION",
                        format!("{name} length {la} -> {lb}"),
                        name,
                    ));
                }
            }
        }
        CanonicalType::Decimal => {
            if let (Some(pa), Some(pb)) = (ma.precision, mb.precision) {
                if pb < pa {
                    out.push(SchemaFinding::new(
                        Severity::Error,
                        "DECIMAL_PRECISION_LOSS",
                        format!("{name} precision {pa} -> {pb}"),
                        name,
                    ));
                }
            }
            if let (Some(sa), Some(sb)) = (ma.scale, mb.scale) {
                if sb < sa {
                    out.push(SchemaFinding::new(
                        Severity::Error,
                        "DECIMAL_SCALE_LOSS",
                        format!("{name} scale {sa} -> {sb}"),
                        name,
                    ));
                }
            }
        }
        CanonicalType::Int => {
            if let (Some(ba), Some(bb)) = (ma.bits, mb.bits) {
                if bb < ba {
                    out.push(SchemaFinding::new(
                        Severity::Error,
                        "INT_WIDTH_LOSS",
                        format!("{name} {ba}-bit -> {bb}-bit"),
                        name,
                    ));
                }
            }
        }
        CanonicalType::Timestamp => {
            if let (Some(ta), Some(tb)) = (ma.timezone, mb.timezone) {
                if ta != tb {
                    out.push(SchemaFinding::new(
                        Severity::Warning,
                        "TIMEZONE_CHANGE",
                        format!("{name} tz {ta} -> {tb}"),
                        name,
                    ));
                }
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Schema report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NormalizationWarnings {
    pub a: Vec<SchemaFinding>,
    pub b: Vec<SchemaFinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub normalized_a: NormalizedSchema,
    pub normalized_b: NormalizedSchema,
    pub warnings: NormalizationWarnings,
    pub findings: Vec<SchemaFinding>,
    pub summary: SchemaSummary,
}

/// Normalise both raw schemas, validate A → B and summarise.
pub fn compare_schemas(
    raw_a: &[RawColumn],
    raw_b: &[RawColumn],
    hint_a: &str,
    hint_b: &str,
    label_a: &str,
    label_b: &str,
) -> SchemaReport {
    let mut normalized_a = normalize(raw_a, hint_a);
    let mut normalized_b = normalize(raw_b, hint_b);
    let findings = validate_migration(&normalized_a, &normalized_b, label_a, label_b);
    let summary = summarize_findings(&findings, normalized_a.columns.len(), normalized_b.columns.len());

    let warnings = NormalizationWarnings {
        a: std::mem::take(&mut normalized_a.warnings),
        b: std::mem::take(&mut normalized_b.warnings),
    };

    SchemaReport {
        normalized_a,
        normalized_b,
        warnings,
        findings,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Nullability::{NotNull, Nullable, Unknown};

    fn schema(cols: &[(&str, &str, Nullability)]) -> NormalizedSchema {
        let raw: Vec<RawColumn> = cols
            .iter()
            .map(|(n, t, nl)| RawColumn::new(*n, *t, *nl))
            .collect();
        normalize(&raw, "test")
    }

    fn codes(findings: &[SchemaFinding]) -> Vec<&str> {
        findings.iter().map(|f| f.code.as_str()).collect()
    }

    #[test]
    fn decimal_precision_loss() {
        let a = schema(&[("amount", "DECIMAL(10,2)", Nullable)]);
        let b = schema(&[("amount", "DECIMAL(8,2)", Nullable)]);
        let findings = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&findings), vec!["DECIMAL_PRECISION_LOSS"]);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].column, "amount");
    }

    #[test]
    fn precision_and_scale_checked_independently() {
        let a = schema(&[("amount", "NUMERIC(12,4)", Nullable)]);
        let b = schema(&[("amount", "NUMERIC(10,2)", Nullable)]);
        let findings = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&findings), vec!["DECIMAL_PRECISION_LOSS", "DECIMAL_SCALE_LOSS"]);
    }

    #[test]
    fn string_truncation() {
        let a = schema(&[("name", "VARCHAR(50)", Nullable)]);
        let b = schema(&[("name", "VARCHAR(20)", Nullable)]);
        let findings = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&findings), vec!["STRING_TRUNCATION"]);
        assert_eq!(findings[0].message, "name length 50 -> 20");
    }

    #[test]
    fn widening_is_silent() {
        let a = schema(&[("name", "VARCHAR(20)", Nullable), ("n", "INT", Nullable)]);
        let b = schema(&[("name", "VARCHAR(50)", Nullable), ("n", "BIGINT", Nullable)]);
        assert!(validate_migration(&a, &b, "A", "B").is_empty());
    }

    #[test]
    fn unparametrized_side_skips_length_check() {
        let a = schema(&[("name", "VARCHAR(50)", Nullable)]);
        let b = schema(&[("name", "TEXT", Nullable)]);
        assert!(validate_migration(&a, &b, "A", "B").is_empty());
    }

    #[test]
    fn nullability_severity() {
        let a = schema(&[("x", "INT", Nullable)]);
        let b = schema(&[("x", "INT", NotNull)]);
        let f = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&f), vec!["NULLABILITY_CHANGE"]);
        assert_eq!(f[0].severity, Severity::Error);

        let f = validate_migration(&b, &a, "A", "B");
        assert_eq!(f[0].severity, Severity::Warning);

        let c = schema(&[("x", "INT", Unknown)]);
        let f = validate_migration(&a, &c, "A", "B");
        assert_eq!(f[0].severity, Severity::Warning);
    }

    #[test]
    fn type_mismatch_stops_column_checks() {
        let a = schema(&[("x", "INT", Nullable)]);
        let b = schema(&[("x", "VARCHAR(10)", NotNull)]);
        let f = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&f), vec!["TYPE_MISMATCH"]);
        assert_eq!(f[0].message, "x: INT vs STRING");
    }

    #[test]
    fn int_width_and_timezone() {
        let a = schema(&[("n", "BIGINT", Nullable), ("ts", "TIMESTAMP_TZ", Nullable)]);
        let b = schema(&[("n", "SMALLINT", Nullable), ("ts", "TIMESTAMP", Nullable)]);
        let f = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&f), vec!["INT_WIDTH_LOSS", "TIMEZONE_CHANGE"]);
        assert_eq!(f[0].severity, Severity::Error);
        assert_eq!(f[1].severity, Severity::Warning);
    }

    #[test]
    fn missing_and_extra_columns() {
        let a = schema(&[("id", "INT", Nullable), ("old", "TEXT", Nullable)]);
        let b = schema(&[("id", "INT", Nullable), ("new", "TEXT", Nullable)]);
        let f = validate_migration(&a, &b, "A", "B");
        assert_eq!(codes(&f), vec!["COLUMN_MISSING", "EXTRA_COLUMN"]);
        assert_eq!(f[0].severity, Severity::Error);
        assert_eq!(f[0].column, "old");
        assert_eq!(f[1].severity, Severity::Warning);
        assert_eq!(f[1].column, "new");
    }

    #[test]
    fn compare_schemas_collects_everything() {
        let a = vec![
            RawColumn::new("id", "INT", Nullable),
            RawColumn::new("geo", "GEOGRAPHY", Nullable),
        ];
        let b = vec![RawColumn::new("id", "SMALLINT", Nullable)];
        let report = compare_schemas(&a, &b, "csv", "postgres", "A", "B");
        assert_eq!(report.warnings.a.len(), 1);
        assert!(report.warnings.b.is_empty());
        assert!(report.normalized_a.warnings.is_empty());
        assert_eq!(report.summary.total_columns_a, 2);
        assert_eq!(report.summary.total_columns_b, 1);
        assert_eq!(report.summary.total_findings, 2);
        assert_eq!(report.summary.severity_counts["error"], 2);
    }
}
