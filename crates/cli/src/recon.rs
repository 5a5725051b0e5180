//! `tally run | compare | schema | validate`: dataset reconciliation commands.

use std::path::{Path, PathBuf};

use clap::Args;
use serde::Serialize;
use tally_recon::{
    open_datasets, ComparisonReport, FileOptions, FileSource, NullabilityMode, ReconConfig,
    ReconError, SchemaReport,
};

use crate::exit_codes::{stage_exit_code, EXIT_CONFIG, EXIT_DIFFERENCES, EXIT_OUTPUT};
use crate::CliError;

/// Flags that override config values.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Primary key column(s), comma separated. Auto-detected when omitted
    #[arg(long, value_delimiter = ',')]
    pub key: Vec<String>,

    /// Relative numeric tolerance for cell comparison
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Rows per chunk while scanning
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// How column nullability is inferred: none, sample or stream
    #[arg(long)]
    pub nullability: Option<NullabilityMode>,
}

impl Overrides {
    fn apply(&self, config: &mut ReconConfig) {
        if !self.key.is_empty() {
            config.primary_key = Some(self.key.clone());
        }
        if let Some(t) = self.tolerance {
            config.tolerance = t;
        }
        if let Some(n) = self.chunk_size {
            config.chunk_size = n;
        }
        if let Some(mode) = self.nullability {
            config.nullability = mode;
        }
    }
}

/// Where the report goes.
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Print the JSON report to stdout
    #[arg(long)]
    pub json: bool,

    /// Write the JSON report to a file
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Exit 1 when rows differ or error-severity schema findings exist
    #[arg(long)]
    pub fail_on_diff: bool,
}

impl From<ReconError> for CliError {
    fn from(e: ReconError) -> Self {
        let hint = match &e {
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
                Some("check the config with `tally validate <config>`")
            }
            ReconError::Configuration(msg) if msg.contains("primary key") => {
                Some("pass --key with columns present in both datasets, or omit it to auto-detect")
            }
            _ => None,
        };
        let err = CliError::new(stage_exit_code(e.stage()), e.to_string());
        match hint {
            Some(h) => err.with_hint(h),
            None => err,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn cmd_run(config_path: PathBuf, overrides: Overrides, out: OutputArgs) -> Result<(), CliError> {
    let mut config = ReconConfig::from_file(&config_path)?;
    overrides.apply(&mut config);

    let (a, b) = open_datasets(&config)?;
    let report = tally_recon::run(&config, &a, &b)?;
    finish_report(&report, &out)
}

pub fn cmd_compare(
    a: PathBuf,
    b: PathBuf,
    name: Option<String>,
    overrides: Overrides,
    out: OutputArgs,
) -> Result<(), CliError> {
    let mut config = ReconConfig::default();
    if let Some(name) = name {
        config.name = name;
    }
    overrides.apply(&mut config);

    let source_a = open_file(&a, config.nullability, tally_recon::Side::A)?;
    let source_b = open_file(&b, config.nullability, tally_recon::Side::B)?;
    let report = tally_recon::run(&config, &source_a, &source_b)?;
    finish_report(&report, &out)
}

pub fn cmd_schema(
    a: PathBuf,
    b: PathBuf,
    nullability: Option<NullabilityMode>,
    out: OutputArgs,
) -> Result<(), CliError> {
    let mode = nullability.unwrap_or_default();
    let source_a = open_file(&a, mode, tally_recon::Side::A)?;
    let source_b = open_file(&b, mode, tally_recon::Side::B)?;
    let report = tally_recon::run_schema(&source_a, &source_b)?;

    write_report(&report, &out)?;
    print_schema_summary(&report);

    if out.fail_on_diff && report.summary.errors() > 0 {
        return Err(CliError::new(EXIT_DIFFERENCES, ""));
    }
    Ok(())
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = ReconConfig::from_file(&config_path)?;
    let key = match &config.primary_key {
        Some(pk) => format!("key [{}]", pk.join(", ")),
        None => "auto-detected key".to_string(),
    };
    match &config.datasets {
        Some(ds) => eprintln!(
            "valid: '{}' comparing {} with {}, {key}",
            config.name,
            ds.a.file.display(),
            ds.b.file.display(),
        ),
        None => {
            return Err(CliError::new(
                EXIT_CONFIG,
                format!("{}: no [datasets.a] / [datasets.b] section", config_path.display()),
            )
            .with_hint("`tally run` needs both datasets; use `tally compare <a> <b>` for ad-hoc files"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_file(path: &Path, nullability: NullabilityMode, side: tally_recon::Side) -> Result<FileSource, CliError> {
    let options = FileOptions {
        nullability,
        ..FileOptions::default()
    };
    FileSource::open(path, options).map_err(|e| {
        CliError::from(ReconError::SchemaFetch {
            side,
            message: e.to_string(),
        })
    })
}

fn write_report<T: Serialize>(report: &T, out: &OutputArgs) -> Result<(), CliError> {
    if !out.json && out.output.is_none() {
        return Ok(());
    }
    let json_str = serde_json::to_string_pretty(report)
        .map_err(|e| CliError::new(EXIT_OUTPUT, format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = out.output {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_OUTPUT, format!("cannot write {}: {e}", path.display())))?;
        eprintln!("wrote {}", path.display());
    }
    if out.json {
        println!("{json_str}");
    }
    Ok(())
}

fn finish_report(report: &ComparisonReport, out: &OutputArgs) -> Result<(), CliError> {
    write_report(report, out)?;
    print_summary(report);

    if out.fail_on_diff && report.has_differences() {
        return Err(CliError::new(EXIT_DIFFERENCES, ""));
    }
    Ok(())
}

/// Human summary to stderr.
fn print_summary(report: &ComparisonReport) {
    let r = &report.reconciliation;
    let with_cells = report
        .cell_diffs
        .iter()
        .filter(|d| !d.differences.is_empty())
        .count();
    eprintln!(
        "{}: {} vs {} rows, {} missing in {}, {} extra in {}, {} changed ({} with cell differences)",
        report.meta.name,
        r.rows_a,
        r.rows_b,
        r.missing_in_b,
        report.meta.label_b,
        r.extra_in_b,
        report.meta.label_b,
        r.changed,
        with_cells,
    );
    if report.cell_diff_stats.skipped_keys > 0 {
        eprintln!(
            "warning: {} changed row(s) not found on rescan",
            report.cell_diff_stats.skipped_keys
        );
    }
    print_schema_summary(&report.schema_report);
}

fn print_schema_summary(report: &SchemaReport) {
    let s = &report.summary;
    if s.total_findings == 0 {
        eprintln!("schema: {} / {} columns, no findings", s.total_columns_a, s.total_columns_b);
        return;
    }
    let top: Vec<String> = s
        .top_issue_counts
        .iter()
        .map(|c| format!("{} x{}", c.code, c.count))
        .collect();
    eprintln!(
        "schema: {} / {} columns, {} finding(s), {} error(s): {}",
        s.total_columns_a,
        s.total_columns_b,
        s.total_findings,
        s.errors(),
        top.join(", ")
    );
}
