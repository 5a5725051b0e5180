use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::schema::{Nullability, RawColumn};
use crate::value::{CellValue, Row};

/// Rows inspected for type inference and `sample` nullability.
pub const SCHEMA_SAMPLE_ROWS: usize = 1000;

/// A lazy sequence of row chunks. Each item is at most `chunk_size` rows.
pub type RowChunks<'a> = Box<dyn Iterator<Item = Result<Vec<Row>, SourceError>> + Send + 'a>;

/// A dataset the engine can describe and scan.
///
/// `rows` must return a fresh, independent scan on every call: the cell
/// diff stage rescans both datasets after reconciliation has consumed a
/// first pass. Implementations are shared across scan threads.
pub trait DatasetSource: Send + Sync {
    /// Display label used in findings and logs.
    fn label(&self) -> &str;

    /// Short name of the source kind, passed to schema normalization.
    fn kind(&self) -> &str {
        "dataset"
    }

    fn schema(&self) -> Result<Vec<RawColumn>, SourceError>;

    fn rows(&self, chunk_size: usize) -> Result<RowChunks<'_>, SourceError>;

    /// Row count if known without scanning, otherwise -1.
    fn row_count(&self) -> i64 {
        -1
    }
}

// ---------------------------------------------------------------------------
// Nullability inference
// ---------------------------------------------------------------------------

/// How sources decide each column's nullable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullabilityMode {
    /// Report every column as not-null.
    None,
    /// Nullable if a null appears in the schema sample.
    #[default]
    Sample,
    /// Nullable if a null appears anywhere; stops once every column has one.
    Stream,
}

impl std::fmt::Display for NullabilityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Sample => write!(f, "sample"),
            Self::Stream => write!(f, "stream"),
        }
    }
}

impl std::str::FromStr for NullabilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "sample" => Ok(Self::Sample),
            "stream" => Ok(Self::Stream),
            other => Err(format!("unknown nullability mode '{other}' (expected none, sample or stream)")),
        }
    }
}

/// Scan rows for nulls in `columns`. An absent column counts as null.
pub(crate) fn scan_nulls<I>(columns: &[String], rows: I) -> Result<Vec<bool>, SourceError>
where
    I: Iterator<Item = Result<Row, SourceError>>,
{
    let mut seen = vec![false; columns.len()];
    for row in rows {
        let row = row?;
        for (flag, col) in seen.iter_mut().zip(columns) {
            if !*flag && row.value_or_null(col).is_null() {
                *flag = true;
            }
        }
        if seen.iter().all(|f| *f) {
            break;
        }
    }
    Ok(seen)
}

pub(crate) fn to_nullability(flags: Vec<bool>) -> Vec<Nullability> {
    flags.into_iter().map(Nullability::from_flag).collect()
}

// ---------------------------------------------------------------------------
// Schema helpers
// ---------------------------------------------------------------------------

/// Column names across `rows` in first-seen order.
pub fn column_union(rows: &[Row]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut cols = Vec::new();
    for row in rows {
        for name in row.columns() {
            if seen.insert(name) {
                cols.push(name.to_string());
            }
        }
    }
    cols
}

/// Declared type name for a column of already typed values. Integers mixed
/// with floats widen to DOUBLE; any other mix falls back to VARCHAR. A
/// column with no non-null value reports NULL.
pub(crate) fn declared_type_of<'a>(values: impl Iterator<Item = &'a CellValue>) -> &'static str {
    let mut current: Option<&'static str> = None;
    for v in values {
        let name = match v {
            CellValue::Null => continue,
            CellValue::Int(_) => "BIGINT",
            CellValue::Float(_) => "DOUBLE",
            CellValue::Bool(_) => "BOOLEAN",
            CellValue::Text(_) => "VARCHAR",
            CellValue::Timestamp(_) => "TIMESTAMP",
            CellValue::Bytes(_) => "BINARY",
            CellValue::Nested(_) => "JSON",
        };
        current = Some(match (current, name) {
            (None, n) => n,
            (Some(c), n) if c == n => c,
            (Some("BIGINT"), "DOUBLE") | (Some("DOUBLE"), "BIGINT") => "DOUBLE",
            _ => "VARCHAR",
        });
    }
    current.unwrap_or("NULL")
}

// ---------------------------------------------------------------------------
// In-memory source
// ---------------------------------------------------------------------------

/// Rows held in memory. Schema is inferred from the rows unless one is
/// supplied with [`MemorySource::with_schema`].
#[derive(Debug, Clone)]
pub struct MemorySource {
    label: String,
    rows: Vec<Row>,
    columns: Option<Vec<RawColumn>>,
    nullability: NullabilityMode,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            label: label.into(),
            rows,
            columns: None,
            nullability: NullabilityMode::default(),
        }
    }

    pub fn with_schema(mut self, columns: Vec<RawColumn>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_nullability(mut self, mode: NullabilityMode) -> Self {
        self.nullability = mode;
        self
    }

    fn infer_schema(&self) -> Result<Vec<RawColumn>, SourceError> {
        let sample = &self.rows[..self.rows.len().min(SCHEMA_SAMPLE_ROWS)];
        let names = column_union(sample);

        let flags = match self.nullability {
            NullabilityMode::None => vec![false; names.len()],
            NullabilityMode::Sample => scan_nulls(&names, sample.iter().cloned().map(Ok))?,
            NullabilityMode::Stream => scan_nulls(&names, self.rows.iter().cloned().map(Ok))?,
        };

        Ok(names
            .iter()
            .zip(to_nullability(flags))
            .map(|(name, nullable)| {
                let ty = declared_type_of(sample.iter().map(|r| r.value_or_null(name)));
                RawColumn::new(name.clone(), ty, nullable)
            })
            .collect())
    }
}

impl DatasetSource for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> &str {
        "memory"
    }

    fn schema(&self) -> Result<Vec<RawColumn>, SourceError> {
        match &self.columns {
            Some(cols) => Ok(cols.clone()),
            None => self.infer_schema(),
        }
    }

    fn rows(&self, chunk_size: usize) -> Result<RowChunks<'_>, SourceError> {
        let chunk_size = chunk_size.max(1);
        Ok(Box::new(self.rows.chunks(chunk_size).map(|c| Ok(c.to_vec()))))
    }

    fn row_count(&self) -> i64 {
        self.rows.len() as i64
    }
}
