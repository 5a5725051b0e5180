use std::collections::HashSet;
use std::fmt::Write as _;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::CandidateKeyConfig;
use crate::source::column_union;
use crate::value::{CellValue, Row};

/// Row identity shared by both datasets.
pub type RowKey = String;

/// Separator between key components.
pub const KEY_DELIMITER: char = '|';
const KEY_ESCAPE: char = '\\';
/// Null key component. Escaping guarantees text never encodes to this.
const KEY_NULL: &str = "\\N";

// ---------------------------------------------------------------------------
// Row digest
// ---------------------------------------------------------------------------

/// SHA-256 over a row's full content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowDigest([u8; 32]);

impl RowDigest {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in self.0 {
            let _ = write!(s, "{b:02x}");
        }
        s
    }
}

impl std::fmt::Display for RowDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for RowDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RowDigest({})", self.to_hex())
    }
}

fn hash_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Digest every column of `row`, sorted by column name.
///
/// Each column contributes its length-prefixed name, a type tag and its
/// length-prefixed rendering, so column order never matters and no value
/// can impersonate null or straddle a field boundary.
pub fn row_digest(row: &Row) -> RowDigest {
    let mut fields: Vec<(&str, &CellValue)> = row.iter().collect();
    fields.sort_unstable_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Sha256::new();
    for (name, value) in fields {
        hash_field(&mut hasher, name.as_bytes());
        hasher.update([value.tag()]);
        hash_field(&mut hasher, value.render().as_bytes());
    }
    RowDigest(hasher.finalize().into())
}

// ---------------------------------------------------------------------------
// Row keys
// ---------------------------------------------------------------------------

fn push_key_component(out: &mut String, value: &CellValue) {
    if value.is_null() {
        out.push_str(KEY_NULL);
        return;
    }
    for ch in value.render().chars() {
        if ch == KEY_ESCAPE || ch == KEY_DELIMITER {
            out.push(KEY_ESCAPE);
        }
        out.push(ch);
    }
}

/// Build a key from `columns` in the given order. An absent column counts
/// as null.
pub fn row_key<S: AsRef<str>>(row: &Row, columns: &[S]) -> RowKey {
    let mut key = String::new();
    for (i, col) in columns.iter().enumerate() {
        if i > 0 {
            key.push(KEY_DELIMITER);
        }
        push_key_component(&mut key, row.value_or_null(col.as_ref()));
    }
    key
}

/// How a dataset's rows are keyed for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "columns", rename_all = "snake_case")]
pub enum KeyStrategy {
    Explicit(Vec<String>),
    Detected(Vec<String>),
    /// No key found: each row is keyed by its own digest, so exact
    /// duplicates collapse into one key.
    RowDigest,
}

impl KeyStrategy {
    pub fn key_for(&self, row: &Row, digest: &RowDigest) -> RowKey {
        match self {
            Self::Explicit(cols) | Self::Detected(cols) => row_key(row, cols),
            Self::RowDigest => digest.to_hex(),
        }
    }

    /// Key for `row`, digesting it only when the strategy needs to.
    pub fn key_of(&self, row: &Row) -> RowKey {
        match self {
            Self::Explicit(cols) | Self::Detected(cols) => row_key(row, cols),
            Self::RowDigest => row_digest(row).to_hex(),
        }
    }
}

impl std::fmt::Display for KeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit(cols) => write!(f, "explicit [{}]", cols.join(", ")),
            Self::Detected(cols) => write!(f, "detected [{}]", cols.join(", ")),
            Self::RowDigest => write!(f, "row digest"),
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate key detection
// ---------------------------------------------------------------------------

/// Look for a column, then an unordered column pair, whose values are
/// unique across the first `max_sample` rows.
///
/// Pairs are tried in column order (first index ascending, then second)
/// and only among the first `max_pair_columns` columns.
pub fn detect_candidate_key(sample: &[Row], config: &CandidateKeyConfig) -> Option<Vec<String>> {
    let sample = &sample[..sample.len().min(config.max_sample)];
    let n = sample.len();
    if n == 0 {
        return None;
    }
    let columns = column_union(sample);

    for col in &columns {
        let distinct: HashSet<RowKey> = sample.iter().map(|r| row_key(r, &[col])).collect();
        if distinct.len() == n {
            return Some(vec![col.clone()]);
        }
    }

    let pair_cols = &columns[..columns.len().min(config.max_pair_columns)];
    if pair_cols.len() < columns.len() {
        log::debug!(
            "candidate key: pair search limited to first {} of {} columns",
            pair_cols.len(),
            columns.len()
        );
    }
    for i in 0..pair_cols.len() {
        for j in (i + 1)..pair_cols.len() {
            let pair = [&pair_cols[i], &pair_cols[j]];
            let distinct: HashSet<RowKey> = sample.iter().map(|r| row_key(r, &pair)).collect();
            if distinct.len() == n {
                return Some(vec![pair_cols[i].clone(), pair_cols[j].clone()]);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, CellValue)]) -> Row {
        Row::from_pairs(pairs.iter().cloned())
    }

    fn default_cfg() -> CandidateKeyConfig {
        CandidateKeyConfig::default()
    }

    #[test]
    fn digest_ignores_column_order() {
        let a = row(&[("id", 1_i64.into()), ("name", "Alice".into()), ("n", CellValue::Null)]);
        let b = row(&[("n", CellValue::Null), ("name", "Alice".into()), ("id", 1_i64.into())]);
        assert_eq!(row_digest(&a), row_digest(&b));
    }

    #[test]
    fn digest_is_case_sensitive_and_typed() {
        let a = row(&[("name", "bob".into())]);
        let b = row(&[("name", "Bob".into())]);
        assert_ne!(row_digest(&a), row_digest(&b));

        let text = row(&[("age", "30".into())]);
        let int = row(&[("age", 30_i64.into())]);
        assert_ne!(row_digest(&text), row_digest(&int));
    }

    #[test]
    fn digest_null_differs_from_null_text() {
        let a = row(&[("x", CellValue::Null)]);
        let b = row(&[("x", "NULL".into())]);
        let c = row(&[("x", "".into())]);
        assert_ne!(row_digest(&a), row_digest(&b));
        assert_ne!(row_digest(&a), row_digest(&c));
    }

    #[test]
    fn digest_field_boundaries() {
        let a = row(&[("a", "x|".into()), ("b", "y".into())]);
        let b = row(&[("a", "x".into()), ("b", "|y".into())]);
        assert_ne!(row_digest(&a), row_digest(&b));
        assert_eq!(row_digest(&a).to_hex().len(), 64);
    }

    #[test]
    fn key_is_readable_for_plain_values() {
        let r = row(&[("id", 2_i64.into()), ("region", "eu".into())]);
        assert_eq!(row_key(&r, &["id"]), "2");
        assert_eq!(row_key(&r, &["region", "id"]), "eu|2");
    }

    #[test]
    fn key_null_is_unambiguous() {
        let null = row(&[("id", CellValue::Null)]);
        let text = row(&[("id", "NULL".into())]);
        let escaped = row(&[("id", "\\N".into())]);
        assert_eq!(row_key(&null, &["id"]), "\\N");
        assert_ne!(row_key(&null, &["id"]), row_key(&text, &["id"]));
        assert_ne!(row_key(&null, &["id"]), row_key(&escaped, &["id"]));
    }

    #[test]
    fn key_delimiter_is_escaped() {
        let a = row(&[("a", "x|y".into()), ("b", "z".into())]);
        let b = row(&[("a", "x".into()), ("b", "y|z".into())]);
        assert_ne!(row_key(&a, &["a", "b"]), row_key(&b, &["a", "b"]));
    }

    #[test]
    fn detects_single_column() {
        let sample = vec![
            row(&[("dept", "a".into()), ("id", 1_i64.into())]),
            row(&[("dept", "a".into()), ("id", 2_i64.into())]),
        ];
        assert_eq!(detect_candidate_key(&sample, &default_cfg()), Some(vec!["id".to_string()]));
    }

    #[test]
    fn detects_first_unique_pair() {
        let sample = vec![
            row(&[("a", 1_i64.into()), ("b", 1_i64.into()), ("c", 1_i64.into())]),
            row(&[("a", 1_i64.into()), ("b", 2_i64.into()), ("c", 1_i64.into())]),
            row(&[("a", 2_i64.into()), ("b", 1_i64.into()), ("c", 2_i64.into())]),
        ];
        // (a,b) is unique; (a,c) is not
        assert_eq!(
            detect_candidate_key(&sample, &default_cfg()),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn no_key_for_duplicate_rows() {
        let r = row(&[("a", 1_i64.into()), ("b", 2_i64.into())]);
        let sample = vec![r.clone(), r];
        assert_eq!(detect_candidate_key(&sample, &default_cfg()), None);
        assert_eq!(detect_candidate_key(&[], &default_cfg()), None);
    }

    #[test]
    fn pair_search_respects_column_ceiling() {
        let sample = vec![
            row(&[("a", 1_i64.into()), ("b", 1_i64.into()), ("c", 1_i64.into())]),
            row(&[("a", 1_i64.into()), ("b", 1_i64.into()), ("c", 2_i64.into())]),
            row(&[("a", 2_i64.into()), ("b", 1_i64.into()), ("c", 1_i64.into())]),
        ];
        let wide = default_cfg();
        assert_eq!(
            detect_candidate_key(&sample, &wide),
            Some(vec!["a".to_string(), "c".to_string()])
        );
        let narrow = CandidateKeyConfig {
            max_pair_columns: 2,
            ..CandidateKeyConfig::default()
        };
        assert_eq!(detect_candidate_key(&sample, &narrow), None);
    }

    #[test]
    fn sample_is_bounded() {
        let sample = vec![
            row(&[("a", 1_i64.into())]),
            row(&[("a", 2_i64.into())]),
            row(&[("a", 2_i64.into())]),
        ];
        let cfg = CandidateKeyConfig {
            max_sample: 2,
            ..CandidateKeyConfig::default()
        };
        assert_eq!(detect_candidate_key(&sample, &cfg), Some(vec!["a".to_string()]));
    }

    #[test]
    fn digest_strategy_keys_by_hex() {
        let r = row(&[("a", 1_i64.into())]);
        let d = row_digest(&r);
        assert_eq!(KeyStrategy::RowDigest.key_for(&r, &d), d.to_hex());
        assert_eq!(KeyStrategy::RowDigest.key_of(&r), d.to_hex());
        assert_eq!(
            KeyStrategy::Explicit(vec!["a".into()]).key_for(&r, &d),
            "1"
        );
    }
}
