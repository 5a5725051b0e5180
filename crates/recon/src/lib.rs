//! `tally-recon`: dataset reconciliation engine.
//!
//! Given two tabular datasets, normalises and diffs their schemas, classifies
//! rows as missing, extra or changed by content digest, and explains changed
//! rows cell by cell with type-aware equivalence. Datasets arrive through the
//! [`DatasetSource`] trait; no CLI or terminal output lives here.

pub mod cell_diff;
pub mod config;
pub mod digest;
pub mod engine;
pub mod equivalence;
pub mod error;
pub mod file_source;
pub mod migration;
pub mod model;
pub mod reconcile;
pub mod schema;
pub mod source;
pub mod summary;
pub mod value;

pub use config::ReconConfig;
pub use digest::{KeyStrategy, RowKey};
pub use engine::{open_datasets, run, run_schema};
pub use error::{ReconError, SourceError, Stage};
pub use file_source::{FileFormat, FileOptions, FileSource};
pub use migration::{SchemaFinding, SchemaReport, Severity};
pub use model::{ComparisonReport, Side};
pub use source::{DatasetSource, MemorySource, NullabilityMode};
pub use value::{CellValue, Row};
