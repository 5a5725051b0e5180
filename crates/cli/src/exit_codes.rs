//! CLI Exit Code Registry
//!
//! Single source of truth for `tally` exit codes. Scripts rely on them.
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | 0    | Success (or differences found without `--fail-on-diff`)     |
//! | 1    | Differences found and `--fail-on-diff` given                |
//! | 2    | Usage error (bad arguments; also clap's own parse errors)   |
//! | 3    | Configuration error (bad config, unknown key column)        |
//! | 4    | Schema stage failed (dataset unreadable, schema unavailable)|
//! | 5    | Reconciliation stage failed (scan aborted mid-stream)       |
//! | 6    | Cell-diff stage failed (rescan aborted)                     |
//! | 7    | Output could not be written                                 |
//!
//! Stage codes (3-6) follow [`tally_recon::Stage`]: anything at 5 or above
//! means rows were being read when the job aborted.

use tally_recon::Stage;

/// Success - command completed.
pub const EXIT_SUCCESS: u8 = 0;

/// Differences found. Like `diff(1)`, 1 means "datasets differ".
pub const EXIT_DIFFERENCES: u8 = 1;

/// Usage error - bad arguments, missing required options. Raised by clap.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

pub const EXIT_CONFIG: u8 = 3;
pub const EXIT_SCHEMA: u8 = 4;
pub const EXIT_RECONCILIATION: u8 = 5;
pub const EXIT_CELL_DIFF: u8 = 6;

/// Report serialization or `--output` write failed.
pub const EXIT_OUTPUT: u8 = 7;

pub fn stage_exit_code(stage: Stage) -> u8 {
    match stage {
        Stage::Configuration => EXIT_CONFIG,
        Stage::Schema => EXIT_SCHEMA,
        Stage::Reconciliation => EXIT_RECONCILIATION,
        Stage::CellDiff => EXIT_CELL_DIFF,
    }
}
