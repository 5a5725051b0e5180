use std::fmt;

use serde::Serialize;

use crate::model::Side;

/// Pipeline stage an error surfaced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Configuration,
    Schema,
    Reconciliation,
    CellDiff,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::Schema => write!(f, "schema"),
            Self::Reconciliation => write!(f, "reconciliation"),
            Self::CellDiff => write!(f, "cell-diff"),
        }
    }
}

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config value out of range.
    ConfigValidation(String),
    /// Job is inconsistent with the datasets (e.g. key column not present).
    Configuration(String),
    /// A source could not describe its schema.
    SchemaFetch { side: Side, message: String },
    /// Scan failed during digesting. No partial result is produced.
    Reconciliation { side: Side, message: String },
    /// Rescan failed while diffing changed rows.
    CellDiff { side: Side, message: String },
    /// IO error (config file read, etc.).
    Io(String),
}

impl ReconError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::ConfigParse(_) | Self::ConfigValidation(_) | Self::Configuration(_) | Self::Io(_) => {
                Stage::Configuration
            }
            Self::SchemaFetch { .. } => Stage::Schema,
            Self::Reconciliation { .. } => Stage::Reconciliation,
            Self::CellDiff { .. } => Stage::CellDiff,
        }
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::SchemaFetch { side, message } => {
                write!(f, "dataset {side}: cannot read schema: {message}")
            }
            Self::Reconciliation { side, message } => {
                write!(f, "dataset {side}: reconciliation scan failed: {message}")
            }
            Self::CellDiff { side, message } => {
                write!(f, "dataset {side}: cell diff scan failed: {message}")
            }
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

/// Failure reported by a dataset source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceError {
    pub message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<csv::Error> for SourceError {
    fn from(e: csv::Error) -> Self {
        Self::new(format!("CSV: {e}"))
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages() {
        assert_eq!(ReconError::ConfigParse("x".into()).stage(), Stage::Configuration);
        let e = ReconError::Reconciliation {
            side: Side::B,
            message: "boom".into(),
        };
        assert_eq!(e.stage(), Stage::Reconciliation);
        assert_eq!(e.to_string(), "dataset b: reconciliation scan failed: boom");
        assert_eq!(Stage::CellDiff.to_string(), "cell-diff");
        assert_eq!(serde_json::to_string(&Stage::CellDiff).unwrap(), "\"cell-diff\"");
    }
}
