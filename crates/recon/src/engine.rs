use std::collections::HashSet;
use std::thread;

use crate::cell_diff::diff_changed;
use crate::config::{DatasetConfig, ReconConfig};
use crate::error::ReconError;
use crate::file_source::FileSource;
use crate::migration::{compare_schemas, SchemaReport};
use crate::model::{ComparisonReport, ReconMeta, Side};
use crate::reconcile::reconcile;
use crate::schema::RawColumn;
use crate::source::DatasetSource;

/// Columns listed when a key column cannot be found.
const AVAILABLE_SAMPLE: usize = 20;

/// Run one comparison job: schema diff alongside reconciliation, then a
/// cell diff of the changed keys.
///
/// All-or-nothing: any fatal error aborts the job and no partial report is
/// returned. The error's [`stage`](ReconError::stage) says how far it got.
pub fn run(
    config: &ReconConfig,
    a: &dyn DatasetSource,
    b: &dyn DatasetSource,
) -> Result<ComparisonReport, ReconError> {
    config.validate()?;

    let (schema_a, schema_b) = fetch_schemas(a, b)?;
    if let Some(ref pk) = config.primary_key {
        check_primary_key(pk, &schema_a, &schema_b, a.label(), b.label())?;
    }

    let (schema_report, reconciliation) = thread::scope(|s| {
        let schema_job = s.spawn(|| {
            compare_schemas(&schema_a, &schema_b, a.kind(), b.kind(), a.label(), b.label())
        });
        let reconciliation = reconcile(a, b, config);
        let schema_report = schema_job
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic));
        (schema_report, reconciliation)
    });
    let reconciliation = reconciliation?;

    let cell_diff = diff_changed(
        a,
        b,
        &reconciliation.key_a,
        &reconciliation.key_b,
        &reconciliation.changed,
        config.chunk_size,
        config.tolerance,
    )?;

    log::info!(
        "{}: {} schema findings, {} changed rows, {} with cell differences",
        config.name,
        schema_report.findings.len(),
        reconciliation.changed.len(),
        cell_diff.rows.iter().filter(|r| !r.differences.is_empty()).count()
    );

    Ok(ComparisonReport {
        meta: meta(config, a, b),
        schema_report,
        reconciliation: reconciliation.summary(config.detail_limit),
        cell_diffs: cell_diff.rows,
        cell_diff_stats: cell_diff.stats,
    })
}

/// Schema comparison alone, without scanning rows.
pub fn run_schema(
    a: &dyn DatasetSource,
    b: &dyn DatasetSource,
) -> Result<SchemaReport, ReconError> {
    let (schema_a, schema_b) = fetch_schemas(a, b)?;
    Ok(compare_schemas(&schema_a, &schema_b, a.kind(), b.kind(), a.label(), b.label()))
}

/// Open the two datasets named in the config's `[datasets]` section.
pub fn open_datasets(config: &ReconConfig) -> Result<(FileSource, FileSource), ReconError> {
    let datasets = config.datasets.as_ref().ok_or_else(|| {
        ReconError::Configuration("config has no [datasets.a] / [datasets.b] section".into())
    })?;
    let open = |side: Side, ds: &DatasetConfig| {
        FileSource::open(&ds.file, ds.file_options(config.nullability)).map_err(|e| {
            ReconError::SchemaFetch {
                side,
                message: e.to_string(),
            }
        })
    };
    Ok((open(Side::A, &datasets.a)?, open(Side::B, &datasets.b)?))
}

fn meta(config: &ReconConfig, a: &dyn DatasetSource, b: &dyn DatasetSource) -> ReconMeta {
    ReconMeta {
        name: config.name.clone(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
        label_a: a.label().to_string(),
        label_b: b.label().to_string(),
    }
}

fn fetch_schemas(
    a: &dyn DatasetSource,
    b: &dyn DatasetSource,
) -> Result<(Vec<RawColumn>, Vec<RawColumn>), ReconError> {
    let fetch = |side: Side, source: &dyn DatasetSource| {
        source.schema().map_err(|e| ReconError::SchemaFetch {
            side,
            message: e.to_string(),
        })
    };
    Ok((fetch(Side::A, a)?, fetch(Side::B, b)?))
}

fn missing_columns<'a>(pk: &'a [String], schema: &[RawColumn]) -> Vec<&'a str> {
    let names: HashSet<&str> = schema.iter().map(|c| c.name.as_str()).collect();
    pk.iter()
        .map(String::as_str)
        .filter(|c| !names.contains(c))
        .collect()
}

/// Every key column must exist on both sides before any row is streamed.
fn check_primary_key(
    pk: &[String],
    schema_a: &[RawColumn],
    schema_b: &[RawColumn],
    label_a: &str,
    label_b: &str,
) -> Result<(), ReconError> {
    let missing_a = missing_columns(pk, schema_a);
    let missing_b = missing_columns(pk, schema_b);
    if missing_a.is_empty() && missing_b.is_empty() {
        return Ok(());
    }

    let describe = |label: &str, missing: &[&str], schema: &[RawColumn]| -> Option<String> {
        if missing.is_empty() {
            return None;
        }
        let available: Vec<&str> = schema
            .iter()
            .take(AVAILABLE_SAMPLE)
            .map(|c| c.name.as_str())
            .collect();
        let more = schema.len().saturating_sub(AVAILABLE_SAMPLE);
        let suffix = if more > 0 {
            format!(", ... {more} more")
        } else {
            String::new()
        };
        Some(format!(
            "{label} lacks [{}] (available: {}{suffix})",
            missing.join(", "),
            available.join(", ")
        ))
    };
    let parts: Vec<String> = [
        describe(label_a, &missing_a, schema_a),
        describe(label_b, &missing_b, schema_b),
    ]
    .into_iter()
    .flatten()
    .collect();

    Err(ReconError::Configuration(format!(
        "primary key column(s) not found: {}",
        parts.join("; ")
    )))
}
