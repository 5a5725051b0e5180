// Property-based tests for digests and reconciliation.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;
use tally_recon::config::ReconConfig;
use tally_recon::digest::{row_digest, row_key};
use tally_recon::equivalence::compare;
use tally_recon::reconcile::reconcile;
use tally_recon::{CellValue, MemorySource, Row};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn arb_value() -> impl Strategy<Value = CellValue> {
    prop_oneof![
        1 => Just(CellValue::Null),
        3 => any::<i64>().prop_map(CellValue::Int),
        2 => (-1.0e6..1.0e6f64).prop_map(CellValue::Float),
        1 => any::<bool>().prop_map(CellValue::Bool),
        3 => r"[a-zA-Z|\\ ]{0,8}".prop_map(CellValue::Text),
    ]
}

/// Distinct column names with values.
fn arb_fields() -> impl Strategy<Value = Vec<(String, CellValue)>> {
    prop::collection::btree_map(r"[a-z]{1,6}", arb_value(), 1..8)
        .prop_map(|m| m.into_iter().collect())
}

/// Rows with a unique integer `id` plus arbitrary payload columns.
fn arb_dataset() -> impl Strategy<Value = Vec<Row>> {
    prop::collection::btree_map(any::<i32>(), prop::collection::vec(arb_value(), 2), 0..40).prop_map(
        |m| {
            m.into_iter()
                .map(|(id, vals)| {
                    let mut row = Row::new();
                    row.insert("id", CellValue::Int(id as i64));
                    for (i, v) in vals.into_iter().enumerate() {
                        row.insert(format!("c{i}"), v);
                    }
                    row
                })
                .collect()
        },
    )
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn digest_ignores_column_order(fields in arb_fields(), seed in any::<u64>()) {
        let forward = Row::from_pairs(fields.clone());
        let mut shuffled = fields;
        // deterministic rotation + reversal
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        if seed % 2 == 0 {
            shuffled.reverse();
        }
        let permuted = Row::from_pairs(shuffled);
        prop_assert_eq!(row_digest(&forward), row_digest(&permuted));
    }

    #[test]
    fn single_column_keys_are_injective(a in arb_value(), b in arb_value()) {
        let ra = Row::from_pairs([("k", a.clone())]);
        let rb = Row::from_pairs([("k", b.clone())]);
        if row_key(&ra, &["k"]) == row_key(&rb, &["k"]) {
            prop_assert_eq!(a.render(), b.render());
            prop_assert_eq!(a.is_null(), b.is_null());
        }
    }

    #[test]
    fn identical_datasets_reconcile_clean(rows in arb_dataset(), chunk in 1usize..16, detect in any::<bool>()) {
        let a = MemorySource::new("a", rows.clone());
        let b = MemorySource::new("b", rows.iter().rev().cloned().collect());
        let cfg = ReconConfig {
            primary_key: if detect { None } else { Some(vec!["id".into()]) },
            chunk_size: chunk,
            ..ReconConfig::default()
        };
        // detection needs both sides to see the same first chunk
        let cfg = if detect { ReconConfig { chunk_size: rows.len().max(1), ..cfg } } else { cfg };
        let r = reconcile(&a, &b, &cfg).unwrap();
        prop_assert!(r.missing_in_b.is_empty());
        prop_assert!(r.extra_in_b.is_empty());
        prop_assert!(r.changed.is_empty());
        prop_assert_eq!(r.rows_a, rows.len() as u64);
    }

    #[test]
    fn compare_is_reflexive(v in arb_value()) {
        let verdict = compare(&v, &v, 1e-9);
        prop_assert!(verdict.is_match);
        prop_assert!(!verdict.type_mismatch);
    }
}
