use std::collections::{BTreeSet, HashMap};
use std::thread;

use crate::digest::{KeyStrategy, RowKey};
use crate::equivalence::compare;
use crate::error::ReconError;
use crate::model::{CellDiffStats, CellDifference, RowDiff, Side};
use crate::source::DatasetSource;
use crate::value::{CellValue, Row};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellDiffOutcome {
    /// One entry per changed key found on both sides, sorted by key.
    pub rows: Vec<RowDiff>,
    pub stats: CellDiffStats,
}

/// Rescan `source`, keeping only rows whose key is in `wanted`.
fn collect_rows(
    source: &dyn DatasetSource,
    side: Side,
    strategy: &KeyStrategy,
    wanted: &BTreeSet<RowKey>,
    chunk_size: usize,
) -> Result<HashMap<RowKey, Row>, ReconError> {
    let fail = |message: String| ReconError::CellDiff { side, message };

    let mut kept = HashMap::new();
    for chunk in source.rows(chunk_size).map_err(|e| fail(e.to_string()))? {
        let chunk = chunk.map_err(|e| fail(e.to_string()))?;
        for row in chunk {
            let key = strategy.key_of(&row);
            if wanted.contains(&key) {
                kept.insert(key, row);
            }
        }
    }
    log::debug!("dataset {side}: rescan kept {} of {} changed rows", kept.len(), wanted.len());
    Ok(kept)
}

/// Compare two rows column by column over the union of their columns
/// (A's order, then columns only B has).
fn diff_row(key: &RowKey, a: &Row, b: &Row, tolerance: f64, stats: &mut CellDiffStats) -> RowDiff {
    let mut columns: Vec<&str> = a.columns().collect();
    columns.extend(b.columns().filter(|c| a.get(c).is_none()));

    let mut differences = Vec::new();
    let mut coerced_matches = Vec::new();
    for column in columns {
        let value_a = a.get(column);
        let value_b = b.get(column);
        let verdict = compare(
            value_a.unwrap_or(&CellValue::Null),
            value_b.unwrap_or(&CellValue::Null),
            tolerance,
        );
        stats.compared_cells += 1;

        if verdict.is_match && !verdict.is_coerced_match() {
            continue;
        }
        let cell = CellDifference {
            key: key.clone(),
            column: column.to_string(),
            value_a: value_a.cloned(),
            value_b: value_b.cloned(),
            match_kind: verdict.kind,
            coerced: verdict.type_mismatch,
        };
        if verdict.is_match {
            stats.coerced_matches += 1;
            coerced_matches.push(cell);
        } else {
            differences.push(cell);
        }
    }

    RowDiff {
        key: key.clone(),
        differences,
        coerced_matches,
    }
}

/// Rescan both datasets for the `changed` keys and diff them with
/// type-aware equivalence.
///
/// A changed key that either rescan no longer yields is skipped and
/// counted in `skipped_keys`: sources are not required to be stable
/// across scans.
pub fn diff_changed(
    a: &dyn DatasetSource,
    b: &dyn DatasetSource,
    key_a: &KeyStrategy,
    key_b: &KeyStrategy,
    changed: &BTreeSet<RowKey>,
    chunk_size: usize,
    tolerance: f64,
) -> Result<CellDiffOutcome, ReconError> {
    if changed.is_empty() {
        return Ok(CellDiffOutcome::default());
    }

    let (rows_a, rows_b) = thread::scope(|s| {
        let handle_a = s.spawn(|| collect_rows(a, Side::A, key_a, changed, chunk_size));
        let rows_b = collect_rows(b, Side::B, key_b, changed, chunk_size);
        let rows_a = handle_a
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (rows_a, rows_b)
    });
    let rows_a = rows_a?;
    let rows_b = rows_b?;

    let mut outcome = CellDiffOutcome::default();
    for key in changed {
        match (rows_a.get(key), rows_b.get(key)) {
            (Some(ra), Some(rb)) => {
                outcome.stats.compared_rows += 1;
                let diff = diff_row(key, ra, rb, tolerance, &mut outcome.stats);
                outcome.rows.push(diff);
            }
            _ => {
                log::debug!("changed key {key:?} not found on rescan, skipped");
                outcome.stats.skipped_keys += 1;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equivalence::MatchKind;
    use crate::source::MemorySource;

    fn id_key() -> KeyStrategy {
        KeyStrategy::Explicit(vec!["id".into()])
    }

    fn changed(keys: &[&str]) -> BTreeSet<RowKey> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn run(a: Vec<Row>, b: Vec<Row>, keys: &[&str]) -> CellDiffOutcome {
        let a = MemorySource::new("a", a);
        let b = MemorySource::new("b", b);
        diff_changed(&a, &b, &id_key(), &id_key(), &changed(keys), 100, 1e-9).unwrap()
    }

    #[test]
    fn case_only_change_has_no_differences() {
        let out = run(
            vec![Row::from_pairs([("id", CellValue::Int(2)), ("name", "Bob".into())])],
            vec![Row::from_pairs([("id", CellValue::Int(2)), ("name", "bob".into())])],
            &["2"],
        );
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].key, "2");
        assert!(out.rows[0].differences.is_empty());
        assert_eq!(out.stats.compared_rows, 1);
        assert_eq!(out.stats.compared_cells, 2);
    }

    #[test]
    fn reports_only_genuine_mismatches() {
        let out = run(
            vec![Row::from_pairs([
                ("id", CellValue::Int(7)),
                ("age", CellValue::Text("30".into())),
                ("city", "Oslo".into()),
            ])],
            vec![Row::from_pairs([
                ("id", CellValue::Int(7)),
                ("age", CellValue::Int(30)),
                ("city", "Bergen".into()),
            ])],
            &["7"],
        );
        let diffs = &out.rows[0].differences;
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].column, "city");
        assert_eq!(diffs[0].match_kind, MatchKind::StringMismatch);
        assert!(!diffs[0].coerced);
        assert_eq!(out.stats.coerced_matches, 1);

        let coerced = &out.rows[0].coerced_matches;
        assert_eq!(coerced.len(), 1);
        assert_eq!(coerced[0].key, "7");
        assert_eq!(coerced[0].column, "age");
        assert_eq!(coerced[0].value_a, Some(CellValue::Text("30".into())));
        assert_eq!(coerced[0].value_b, Some(CellValue::Int(30)));
        assert_eq!(coerced[0].match_kind, MatchKind::CoercedExact);
        assert!(coerced[0].coerced);
    }

    #[test]
    fn coerced_matches_serialize_beside_differences() {
        let out = run(
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("active", CellValue::Bool(true))])],
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("active", CellValue::Int(1))])],
            &["1"],
        );
        let json = serde_json::to_value(&out.rows[0]).unwrap();
        assert_eq!(json["differences"], serde_json::json!([]));
        let cell = &json["coerced_matches"][0];
        assert_eq!(cell["column"], "active");
        assert_eq!(cell["a"], true);
        assert_eq!(cell["b"], 1);
        assert_eq!(cell["coerced"], true);
        assert!(cell.get("key").is_none());

        // plain rows omit the list
        let plain = run(
            vec![Row::from_pairs([("id", CellValue::Int(2)), ("n", "x".into())])],
            vec![Row::from_pairs([("id", CellValue::Int(2)), ("n", "y".into())])],
            &["2"],
        );
        let json = serde_json::to_value(&plain.rows[0]).unwrap();
        assert!(json.get("coerced_matches").is_none());
    }

    #[test]
    fn column_union_keeps_absent_distinct_from_null() {
        let out = run(
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("old", CellValue::Int(5))])],
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("new", CellValue::Int(6))])],
            &["1"],
        );
        let diffs = &out.rows[0].differences;
        let cols: Vec<&str> = diffs.iter().map(|d| d.column.as_str()).collect();
        assert_eq!(cols, vec!["old", "new"]);
        assert_eq!(diffs[0].value_b, None);
        assert_eq!(diffs[1].value_a, None);
        assert_eq!(diffs[1].value_b, Some(CellValue::Int(6)));
    }

    #[test]
    fn missing_keys_are_skipped() {
        let out = run(
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("v", CellValue::Int(1))])],
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("v", CellValue::Int(2))])],
            &["1", "9"],
        );
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.stats.skipped_keys, 1);
    }

    #[test]
    fn nothing_changed_means_no_scan() {
        let out = run(vec![], vec![], &[]);
        assert_eq!(out, CellDiffOutcome::default());
    }

    #[test]
    fn numeric_tolerance_applies() {
        let a = MemorySource::new(
            "a",
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("x", CellValue::Float(100.0))])],
        );
        let b = MemorySource::new(
            "b",
            vec![Row::from_pairs([("id", CellValue::Int(1)), ("x", CellValue::Float(100.00000005))])],
        );
        let strict = diff_changed(&a, &b, &id_key(), &id_key(), &changed(&["1"]), 10, 1e-12).unwrap();
        assert_eq!(strict.rows[0].differences.len(), 1);
        let loose = diff_changed(&a, &b, &id_key(), &id_key(), &changed(&["1"]), 10, 1e-6).unwrap();
        assert!(loose.rows[0].differences.is_empty());
    }
}
