use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::schema::RawColumn;
use crate::source::{
    column_union, declared_type_of, scan_nulls, to_nullability, DatasetSource, NullabilityMode,
    RowChunks, SCHEMA_SAMPLE_ROWS,
};
use crate::value::{parse_iso_datetime, CellValue, Row};

type RowIter<'a> = Box<dyn Iterator<Item = Result<Row, SourceError>> + Send + 'a>;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    /// One JSON object per line.
    Ndjson,
    /// A single JSON array of objects.
    Json,
}

impl FileFormat {
    /// Guess from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" => Some(Self::Csv),
            "ndjson" | "jsonl" => Some(Self::Ndjson),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Ndjson => write!(f, "ndjson"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Detected from the extension when unset.
    pub format: Option<FileFormat>,
    /// Defaults to the file name.
    pub label: Option<String>,
    /// CSV only. Defaults to tab for `.tsv`, comma otherwise.
    pub delimiter: Option<u8>,
    pub nullability: NullabilityMode,
}

// ---------------------------------------------------------------------------
// CSV typing
// ---------------------------------------------------------------------------

/// Column type inferred from CSV text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CsvType {
    Int,
    Float,
    Bool,
    Timestamp,
    Text,
}

impl CsvType {
    fn declared(self) -> &'static str {
        match self {
            Self::Int => "BIGINT",
            Self::Float => "DOUBLE",
            Self::Bool => "BOOLEAN",
            Self::Timestamp => "TIMESTAMP",
            Self::Text => "VARCHAR",
        }
    }

    /// Narrowest type every non-empty value parses as.
    fn infer<'a>(values: impl Iterator<Item = &'a str> + Clone) -> Self {
        let mut present = values.filter(|v| !v.is_empty());
        if present.clone().next().is_none() {
            return Self::Text;
        }
        if present.clone().all(|v| v.parse::<i64>().is_ok()) {
            Self::Int
        } else if present.clone().all(|v| v.parse::<f64>().is_ok()) {
            Self::Float
        } else if present.clone().all(|v| parse_bool_literal(v).is_some()) {
            Self::Bool
        } else if present.all(|v| parse_iso_datetime(v).is_some()) {
            Self::Timestamp
        } else {
            Self::Text
        }
    }

    /// Convert one field. Empty is null; a value that does not fit the
    /// column type is kept as text.
    fn cell(self, raw: &str) -> CellValue {
        if raw.is_empty() {
            return CellValue::Null;
        }
        let typed = match self {
            Self::Int => raw.parse::<i64>().ok().map(CellValue::Int),
            Self::Float => raw.parse::<f64>().ok().map(CellValue::Float),
            Self::Bool => parse_bool_literal(raw).map(CellValue::Bool),
            Self::Timestamp => parse_iso_datetime(raw).map(CellValue::Timestamp),
            Self::Text => None,
        };
        typed.unwrap_or_else(|| CellValue::Text(raw.to_string()))
    }
}

fn parse_bool_literal(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Chunking
// ---------------------------------------------------------------------------

/// Groups a row iterator into chunks. Stops after the first error.
struct Chunked<'a> {
    rows: RowIter<'a>,
    chunk_size: usize,
    done: bool,
}

impl Iterator for Chunked<'_> {
    type Item = Result<Vec<Row>, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size.min(4096));
        while chunk.len() < self.chunk_size {
            match self.rows.next() {
                Some(Ok(row)) => chunk.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

// ---------------------------------------------------------------------------
// File source
// ---------------------------------------------------------------------------

/// A CSV, NDJSON or JSON file. Each `rows` call reopens the file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    format: FileFormat,
    label: String,
    delimiter: u8,
    nullability: NullabilityMode,
    /// CSV header with inferred types. Empty for JSON formats.
    csv_columns: Vec<(String, CsvType)>,
}

impl FileSource {
    /// Open `path`, checking it is readable and, for CSV, inferring column
    /// types from the first rows.
    pub fn open(path: impl AsRef<Path>, options: FileOptions) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let format = match options.format {
            Some(f) => f,
            None => FileFormat::from_path(&path).ok_or_else(|| {
                SourceError::new(format!(
                    "{}: cannot determine format from extension (use csv, ndjson or json)",
                    path.display()
                ))
            })?,
        };
        let label = options.label.unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        });
        let is_tsv = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
        let delimiter = options
            .delimiter
            .unwrap_or(if is_tsv { b'\t' } else { b',' });

        File::open(&path).map_err(|e| SourceError::new(format!("{}: {e}", path.display())))?;

        let mut source = Self {
            path,
            format,
            label,
            delimiter,
            nullability: options.nullability,
            csv_columns: Vec::new(),
        };
        if format == FileFormat::Csv {
            source.csv_columns = source.infer_csv_columns()?;
            log::debug!(
                "{}: {} CSV columns inferred",
                source.label,
                source.csv_columns.len()
            );
        }
        Ok(source)
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn csv_reader(&self) -> Result<csv::Reader<File>, SourceError> {
        let file = File::open(&self.path)
            .map_err(|e| SourceError::new(format!("{}: {e}", self.path.display())))?;
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(file))
    }

    fn infer_csv_columns(&self) -> Result<Vec<(String, CsvType)>, SourceError> {
        let mut reader = self.csv_reader()?;
        let header: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let mut sample = Vec::new();
        for record in reader.records().take(SCHEMA_SAMPLE_ROWS) {
            sample.push(record?);
        }

        Ok(header
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                let ty = CsvType::infer(sample.iter().map(move |r| r.get(i).unwrap_or("")));
                (name, ty)
            })
            .collect())
    }

    fn row_iter(&self) -> Result<RowIter<'_>, SourceError> {
        match self.format {
            FileFormat::Csv => {
                let reader = self.csv_reader()?;
                let columns = &self.csv_columns;
                Ok(Box::new(reader.into_records().map(move |record| -> Result<Row, SourceError> {
                    let record = record?;
                    Ok(columns
                        .iter()
                        .enumerate()
                        .map(|(i, (name, ty))| (name.clone(), ty.cell(record.get(i).unwrap_or(""))))
                        .collect())
                })))
            }
            FileFormat::Ndjson => {
                let file = File::open(&self.path)?;
                let lines = BufReader::new(file).lines().enumerate();
                Ok(Box::new(lines.filter_map(|(idx, line)| match line {
                    Ok(l) if l.trim().is_empty() => None,
                    Ok(l) => Some(
                        serde_json::from_str::<serde_json::Value>(&l)
                            .map_err(|e| SourceError::new(format!("record {}: JSON: {e}", idx + 1)))
                            .and_then(|v| object_to_row(v, idx + 1)),
                    ),
                    Err(e) => Some(Err(SourceError::from(e))),
                })))
            }
            FileFormat::Json => {
                let file = File::open(&self.path)?;
                let doc: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
                let serde_json::Value::Array(items) = doc else {
                    return Err(SourceError::new(format!(
                        "{}: expected a top-level JSON array",
                        self.path.display()
                    )));
                };
                Ok(Box::new(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(idx, v)| object_to_row(v, idx + 1)),
                ))
            }
        }
    }

    fn sample_rows(&self) -> Result<Vec<Row>, SourceError> {
        self.row_iter()?.take(SCHEMA_SAMPLE_ROWS).collect()
    }
}

fn object_to_row(value: serde_json::Value, record: usize) -> Result<Row, SourceError> {
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k, CellValue::from_json(v)))
            .collect()),
        other => Err(SourceError::new(format!(
            "record {record}: expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl DatasetSource for FileSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> &str {
        match self.format {
            FileFormat::Csv => "csv",
            FileFormat::Ndjson => "ndjson",
            FileFormat::Json => "json",
        }
    }

    fn schema(&self) -> Result<Vec<RawColumn>, SourceError> {
        let needs_sample =
            self.format != FileFormat::Csv || self.nullability == NullabilityMode::Sample;
        let sample = if needs_sample {
            self.sample_rows()?
        } else {
            Vec::new()
        };

        let typed: Vec<(String, &'static str)> = match self.format {
            FileFormat::Csv => self
                .csv_columns
                .iter()
                .map(|(name, ty)| (name.clone(), ty.declared()))
                .collect(),
            _ => column_union(&sample)
                .into_iter()
                .map(|name| {
                    let ty = declared_type_of(sample.iter().map(|r| r.value_or_null(&name)));
                    (name, ty)
                })
                .collect(),
        };
        let names: Vec<String> = typed.iter().map(|(n, _)| n.clone()).collect();

        let flags = match self.nullability {
            NullabilityMode::None => vec![false; names.len()],
            NullabilityMode::Sample => scan_nulls(&names, sample.into_iter().map(Ok))?,
            NullabilityMode::Stream => scan_nulls(&names, self.row_iter()?)?,
        };

        Ok(typed
            .into_iter()
            .zip(to_nullability(flags))
            .map(|((name, ty), nullable)| RawColumn::new(name, ty, nullable))
            .collect())
    }

    fn rows(&self, chunk_size: usize) -> Result<RowChunks<'_>, SourceError> {
        Ok(Box::new(Chunked {
            rows: self.row_iter()?,
            chunk_size: chunk_size.max(1),
            done: false,
        }))
    }

    /// Counts by scanning. A file that fails to read reports -1.
    fn row_count(&self) -> i64 {
        match self.row_iter() {
            Ok(rows) => rows
                .map(|r| r.map(|_| 1_i64))
                .sum::<Result<i64, SourceError>>()
                .unwrap_or(-1),
            Err(_) => -1,
        }
    }
}
