use serde::Serialize;

use crate::digest::{KeyStrategy, RowKey};
use crate::equivalence::MatchKind;
use crate::migration::SchemaReport;
use crate::value::CellValue;

/// Which of the two datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    A,
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "a"),
            Self::B => write!(f, "b"),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Truncated key lists, sorted by key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationDetails {
    pub missing_in_b: Vec<RowKey>,
    pub extra_in_b: Vec<RowKey>,
    pub changed: Vec<RowKey>,
}

/// Reconciliation section of the report. Counts are exact; only
/// `details` is truncated.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationSummary {
    pub rows_a: u64,
    pub rows_b: u64,
    pub missing_in_b: usize,
    pub extra_in_b: usize,
    pub changed: usize,
    pub key_a: KeyStrategy,
    pub key_b: KeyStrategy,
    pub details: ReconciliationDetails,
}

// ---------------------------------------------------------------------------
// Cell diff
// ---------------------------------------------------------------------------

/// One column of a changed row that fails value equivalence, or that
/// matches only after coercion across value classes.
///
/// `value_a` / `value_b` are `None` when the column is absent from that
/// side's row, which is distinct from a present null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDifference {
    #[serde(skip)]
    pub key: RowKey,
    pub column: String,
    #[serde(rename = "a", skip_serializing_if = "Option::is_none")]
    pub value_a: Option<CellValue>,
    #[serde(rename = "b", skip_serializing_if = "Option::is_none")]
    pub value_b: Option<CellValue>,
    pub match_kind: MatchKind,
    pub coerced: bool,
}

/// Differences for one changed key. An empty list means the digest
/// change did not survive type-aware comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    pub key: RowKey,
    pub differences: Vec<CellDifference>,
    /// Columns equal only after coercion (`"30"` vs `30`). Never part of
    /// `differences`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub coerced_matches: Vec<CellDifference>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CellDiffStats {
    /// Changed keys found on both sides during the rescan.
    pub compared_rows: usize,
    pub compared_cells: usize,
    /// Cells that matched only after coercion across value classes.
    pub coerced_matches: usize,
    /// Changed keys missing from a rescan.
    pub skipped_keys: usize,
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub name: String,
    pub engine_version: String,
    pub run_at: String,
    pub label_a: String,
    pub label_b: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub meta: ReconMeta,
    pub schema_report: SchemaReport,
    pub reconciliation: ReconciliationSummary,
    pub cell_diffs: Vec<RowDiff>,
    pub cell_diff_stats: CellDiffStats,
}

impl ComparisonReport {
    /// Any missing, extra or changed row, or any error-severity schema finding.
    pub fn has_differences(&self) -> bool {
        let r = &self.reconciliation;
        r.missing_in_b > 0
            || r.extra_in_b > 0
            || r.changed > 0
            || self.schema_report.summary.errors() > 0
    }
}
