use std::collections::{BTreeSet, HashMap};
use std::thread;

use crate::config::ReconConfig;
use crate::digest::{detect_candidate_key, row_digest, KeyStrategy, RowDigest, RowKey};
use crate::error::ReconError;
use crate::model::{ReconciliationDetails, ReconciliationSummary, Side};
use crate::source::DatasetSource;
use crate::value::Row;

/// Full reconciliation outcome for one job. Key sets are complete.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationResult {
    pub rows_a: u64,
    pub rows_b: u64,
    pub missing_in_b: BTreeSet<RowKey>,
    pub extra_in_b: BTreeSet<RowKey>,
    pub changed: BTreeSet<RowKey>,
    pub key_a: KeyStrategy,
    pub key_b: KeyStrategy,
}

impl ReconciliationResult {
    pub fn is_clean(&self) -> bool {
        self.missing_in_b.is_empty() && self.extra_in_b.is_empty() && self.changed.is_empty()
    }

    /// Report section with each detail list cut to `detail_limit` keys.
    pub fn summary(&self, detail_limit: usize) -> ReconciliationSummary {
        let head = |set: &BTreeSet<RowKey>| -> Vec<RowKey> { set.iter().take(detail_limit).cloned().collect() };
        ReconciliationSummary {
            rows_a: self.rows_a,
            rows_b: self.rows_b,
            missing_in_b: self.missing_in_b.len(),
            extra_in_b: self.extra_in_b.len(),
            changed: self.changed.len(),
            key_a: self.key_a.clone(),
            key_b: self.key_b.clone(),
            details: ReconciliationDetails {
                missing_in_b: head(&self.missing_in_b),
                extra_in_b: head(&self.extra_in_b),
                changed: head(&self.changed),
            },
        }
    }
}

/// Key→digest map for one dataset.
struct SideScan {
    digests: HashMap<RowKey, RowDigest>,
    rows: u64,
    strategy: KeyStrategy,
}

fn resolve_strategy(config: &ReconConfig, first_chunk: &[Row], side: Side) -> KeyStrategy {
    let strategy = match &config.primary_key {
        Some(pk) => KeyStrategy::Explicit(pk.clone()),
        None => match detect_candidate_key(first_chunk, &config.candidate_key) {
            Some(cols) => KeyStrategy::Detected(cols),
            None => KeyStrategy::RowDigest,
        },
    };
    log::info!("dataset {side}: keyed by {strategy}");
    strategy
}

fn scan_side(
    source: &dyn DatasetSource,
    side: Side,
    config: &ReconConfig,
) -> Result<SideScan, ReconError> {
    let fail = |message: String| ReconError::Reconciliation { side, message };

    let chunks = source
        .rows(config.chunk_size)
        .map_err(|e| fail(e.to_string()))?;

    let mut digests: HashMap<RowKey, RowDigest> = HashMap::new();
    let mut rows: u64 = 0;
    let mut strategy: Option<KeyStrategy> = None;

    for (idx, chunk) in chunks.enumerate() {
        let chunk = chunk.map_err(|e| fail(e.to_string()))?;
        let strategy = strategy.get_or_insert_with(|| resolve_strategy(config, &chunk, side));

        for row in &chunk {
            let digest = row_digest(row);
            let key = strategy.key_for(row, &digest);
            digests.insert(key, digest);
        }
        rows += chunk.len() as u64;
        log::debug!("dataset {side}: chunk {} done, {rows} rows", idx + 1);
    }

    // Empty dataset: nothing to detect from.
    let strategy = strategy.unwrap_or_else(|| match &config.primary_key {
        Some(pk) => KeyStrategy::Explicit(pk.clone()),
        None => KeyStrategy::RowDigest,
    });

    if digests.len() as u64 != rows {
        log::debug!(
            "dataset {side}: {} duplicate keys collapsed",
            rows - digests.len() as u64
        );
    }

    Ok(SideScan {
        digests,
        rows,
        strategy,
    })
}

/// Scan both datasets on separate threads and classify keys as missing,
/// extra or changed.
///
/// A failure on either side aborts the whole reconciliation.
pub fn reconcile(
    a: &dyn DatasetSource,
    b: &dyn DatasetSource,
    config: &ReconConfig,
) -> Result<ReconciliationResult, ReconError> {
    let (scan_a, scan_b) = thread::scope(|s| {
        let handle_a = s.spawn(|| scan_side(a, Side::A, config));
        let scan_b = scan_side(b, Side::B, config);
        let scan_a = handle_a
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (scan_a, scan_b)
    });
    let scan_a = scan_a?;
    let scan_b = scan_b?;

    if config.primary_key.is_none() && scan_a.strategy != scan_b.strategy {
        log::warn!(
            "datasets resolved different keys: a {}, b {}",
            scan_a.strategy,
            scan_b.strategy
        );
    }

    let mut missing_in_b = BTreeSet::new();
    let mut changed = BTreeSet::new();
    for (key, digest_a) in &scan_a.digests {
        match scan_b.digests.get(key) {
            None => {
                missing_in_b.insert(key.clone());
            }
            Some(digest_b) if digest_b != digest_a => {
                changed.insert(key.clone());
            }
            Some(_) => {}
        }
    }
    let extra_in_b: BTreeSet<RowKey> = scan_b
        .digests
        .keys()
        .filter(|k| !scan_a.digests.contains_key(*k))
        .cloned()
        .collect();

    log::info!(
        "reconciled {} / {} rows: {} missing, {} extra, {} changed",
        scan_a.rows,
        scan_b.rows,
        missing_in_b.len(),
        extra_in_b.len(),
        changed.len()
    );

    Ok(ReconciliationResult {
        rows_a: scan_a.rows,
        rows_b: scan_b.rows,
        missing_in_b,
        extra_in_b,
        changed,
        key_a: scan_a.strategy,
        key_b: scan_b.strategy,
    })
}
