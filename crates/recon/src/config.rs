use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::equivalence::DEFAULT_TOLERANCE;
use crate::error::ReconError;
use crate::file_source::{FileFormat, FileOptions};
use crate::source::NullabilityMode;

pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_DETAIL_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Explicit key columns. Detected per dataset when absent.
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub nullability: NullabilityMode,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Entries kept per detail list in the report. Counts are never truncated.
    #[serde(default = "default_detail_limit")]
    pub detail_limit: usize,
    #[serde(default)]
    pub candidate_key: CandidateKeyConfig,
    #[serde(default)]
    pub datasets: Option<DatasetsConfig>,
}

fn default_name() -> String {
    "comparison".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_detail_limit() -> usize {
    DEFAULT_DETAIL_LIMIT
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            primary_key: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            nullability: NullabilityMode::default(),
            tolerance: DEFAULT_TOLERANCE,
            detail_limit: DEFAULT_DETAIL_LIMIT,
            candidate_key: CandidateKeyConfig::default(),
            datasets: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate key search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateKeyConfig {
    #[serde(default = "default_max_sample")]
    pub max_sample: usize,
    /// Only the first N columns take part in the pairwise search.
    #[serde(default = "default_max_pair_columns")]
    pub max_pair_columns: usize,
}

fn default_max_sample() -> usize {
    10_000
}

fn default_max_pair_columns() -> usize {
    64
}

impl Default for CandidateKeyConfig {
    fn default() -> Self {
        Self {
            max_sample: default_max_sample(),
            max_pair_columns: default_max_pair_columns(),
        }
    }
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetsConfig {
    pub a: DatasetConfig,
    pub b: DatasetConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub file: PathBuf,
    #[serde(default)]
    pub format: Option<FileFormat>,
    #[serde(default)]
    pub label: Option<String>,
    /// Single ASCII character, CSV only.
    #[serde(default)]
    pub delimiter: Option<char>,
}

impl DatasetConfig {
    pub fn file_options(&self, nullability: NullabilityMode) -> FileOptions {
        FileOptions {
            format: self.format,
            label: self.label.clone(),
            // validate() guarantees ASCII
            delimiter: self.delimiter.map(|c| c as u8),
            nullability,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing + validation
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file. Relative dataset paths resolve against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ReconError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("{}: {e}", path.display())))?;
        let mut config = Self::from_toml(&text)?;
        if let (Some(datasets), Some(base)) = (config.datasets.as_mut(), path.parent()) {
            for ds in [&mut datasets.a, &mut datasets.b] {
                if ds.file.is_relative() {
                    ds.file = base.join(&ds.file);
                }
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.chunk_size == 0 {
            return Err(ReconError::ConfigValidation("chunk_size must be > 0".into()));
        }

        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "tolerance must be a finite number >= 0, got {}",
                self.tolerance
            )));
        }

        if self.candidate_key.max_sample == 0 {
            return Err(ReconError::ConfigValidation(
                "candidate_key.max_sample must be > 0".into(),
            ));
        }

        if let Some(ref pk) = self.primary_key {
            if pk.is_empty() {
                return Err(ReconError::ConfigValidation(
                    "primary_key must name at least one column (omit it to auto-detect)".into(),
                ));
            }
            if let Some(blank) = pk.iter().position(|c| c.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "primary_key[{blank}] is empty"
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for col in pk {
                if !seen.insert(col.as_str()) {
                    return Err(ReconError::ConfigValidation(format!(
                        "primary_key lists '{col}' more than once"
                    )));
                }
            }
        }

        if let Some(ref datasets) = self.datasets {
            for (side, ds) in [("a", &datasets.a), ("b", &datasets.b)] {
                if ds.file.as_os_str().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "datasets.{side}.file is empty"
                    )));
                }
                if let Some(d) = ds.delimiter {
                    if !d.is_ascii() {
                        return Err(ReconError::ConfigValidation(format!(
                            "datasets.{side}.delimiter must be a single ASCII character, got '{d}'"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = ReconConfig::from_toml("").unwrap();
        assert_eq!(cfg.name, "comparison");
        assert_eq!(cfg.chunk_size, 100_000);
        assert_eq!(cfg.tolerance, 1e-9);
        assert_eq!(cfg.detail_limit, 100);
        assert_eq!(cfg.nullability, NullabilityMode::Sample);
        assert_eq!(cfg.candidate_key.max_sample, 10_000);
        assert_eq!(cfg.candidate_key.max_pair_columns, 64);
        assert!(cfg.primary_key.is_none());
        assert!(cfg.datasets.is_none());
    }

    #[test]
    fn full_config() {
        let cfg = ReconConfig::from_toml(
            r#"
name = "orders migration"
primary_key = ["order_id", "line"]
chunk_size = 500
nullability = "stream"
tolerance = 1e-6

[candidate_key]
max_pair_columns = 16

[datasets.a]
file = "old/orders.csv"
label = "legacy"

[datasets.b]
file = "new/orders.tsv"
format = "csv"
delimiter = "\t"
"#,
        )
        .unwrap();
        assert_eq!(cfg.primary_key.as_deref(), Some(&["order_id".to_string(), "line".to_string()][..]));
        assert_eq!(cfg.nullability, NullabilityMode::Stream);
        assert_eq!(cfg.candidate_key.max_pair_columns, 16);
        assert_eq!(cfg.candidate_key.max_sample, 10_000);
        let ds = cfg.datasets.unwrap();
        assert_eq!(ds.a.label.as_deref(), Some("legacy"));
        let opts = ds.b.file_options(NullabilityMode::None);
        assert_eq!(opts.delimiter, Some(b'\t'));
        assert_eq!(opts.format, Some(FileFormat::Csv));
    }

    #[test]
    fn rejects_bad_values() {
        for input in [
            "chunk_size = 0",
            "tolerance = -1.0",
            "tolerance = nan",
            "primary_key = []",
            "primary_key = [\"id\", \"id\"]",
            "[candidate_key]\nmax_sample = 0",
        ] {
            let err = ReconConfig::from_toml(input).unwrap_err();
            assert!(matches!(err, ReconError::ConfigValidation(_)), "{input}: {err}");
        }
    }

    #[test]
    fn rejects_unknown_keys_and_modes() {
        assert!(matches!(
            ReconConfig::from_toml("primary = [\"id\"]"),
            Err(ReconError::ConfigParse(_))
        ));
        assert!(matches!(
            ReconConfig::from_toml("nullability = \"always\""),
            Err(ReconError::ConfigParse(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.toml");
        std::fs::write(
            &path,
            "[datasets.a]\nfile = \"a.csv\"\n[datasets.b]\nfile = \"/abs/b.csv\"\n",
        )
        .unwrap();
        let cfg = ReconConfig::from_file(&path).unwrap();
        let ds = cfg.datasets.unwrap();
        assert_eq!(ds.a.file, dir.path().join("a.csv"));
        assert_eq!(ds.b.file, PathBuf::from("/abs/b.csv"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ReconConfig::from_file(Path::new("/nonexistent/job.toml")).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
    }
}
