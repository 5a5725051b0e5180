// tally - compare two datasets: schema, row reconciliation, cell differences

mod exit_codes;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tally_recon::NullabilityMode;
use tracing::Level;

use exit_codes::EXIT_SUCCESS;
use recon::{OutputArgs, Overrides};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile two tabular datasets: schema, rows and cells")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log level for diagnostics on stderr
    #[arg(long, global = true, value_enum, default_value = "warn", env = "TALLY_LOG")]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the comparison described by a config file
    #[command(after_help = "\
Examples:
  tally run customers.tally.toml
  tally run customers.tally.toml --json > report.json
  tally run customers.tally.toml --key id,region --fail-on-diff
  tally run nightly.toml --output out/report.json --verbosity info")]
    Run {
        /// Config file (TOML) with [datasets.a] and [datasets.b]
        config: PathBuf,

        #[command(flatten)]
        overrides: Overrides,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Compare two files directly (CSV, TSV, NDJSON or JSON)
    #[command(after_help = "\
Examples:
  tally compare legacy.csv warehouse.ndjson --key id
  tally compare a.csv b.csv --json | jq '.reconciliation'
  tally compare a.csv b.csv --tolerance 0.001 --fail-on-diff")]
    Compare {
        /// Dataset A (the reference)
        a: PathBuf,

        /// Dataset B (compared against A)
        b: PathBuf,

        /// Comparison name recorded in the report
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        overrides: Overrides,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Compare schemas only, without reading rows beyond the schema sample
    #[command(after_help = "\
Examples:
  tally schema legacy.csv warehouse.ndjson
  tally schema a.csv b.csv --nullability stream --json
  tally schema a.csv b.csv --fail-on-diff")]
    Schema {
        a: PathBuf,
        b: PathBuf,

        /// How column nullability is inferred: none, sample or stream
        #[arg(long)]
        nullability: Option<NullabilityMode>,

        #[command(flatten)]
        out: OutputArgs,
    },

    /// Parse and validate a config file without touching the datasets
    #[command(after_help = "\
Examples:
  tally validate customers.tally.toml")]
    Validate { config: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum Verbosity {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Verbosity> for Level {
    fn from(v: Verbosity) -> Self {
        match v {
            Verbosity::Error => Level::ERROR,
            Verbosity::Warn => Level::WARN,
            Verbosity::Info => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
            Verbosity::Trace => Level::TRACE,
        }
    }
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("TALLY_COMMIT"), ")",
        "\nengine:  tally-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TALLY_TARGET"),
    )
}

/// Diagnostics go to stderr; stdout is reserved for `--json`.
fn setup_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_max_level(Level::from(verbosity))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbosity);

    let result = match cli.command {
        Commands::Run { config, overrides, out } => recon::cmd_run(config, overrides, out),
        Commands::Compare { a, b, name, overrides, out } => {
            recon::cmd_compare(a, b, name, overrides, out)
        }
        Commands::Schema { a, b, nullability, out } => recon::cmd_schema(a, b, nullability, out),
        Commands::Validate { config } => recon::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
