use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, Serializer};
use serde::Deserialize;

use crate::migration::{SchemaFinding, Severity};

// ---------------------------------------------------------------------------
// Canonical type model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CanonicalType {
    Int,
    Float,
    Decimal,
    String,
    Boolean,
    Date,
    Time,
    Timestamp,
    Json,
    Object,
    Array,
    Binary,
    Unknown,
}

impl std::fmt::Display for CanonicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Decimal => "DECIMAL",
            Self::String => "STRING",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Json => "JSON",
            Self::Object => "OBJECT",
            Self::Array => "ARRAY",
            Self::Binary => "BINARY",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

/// Tri-state nullability as reported by a source. Serialises as
/// `true` / `false` / `"unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Nullability {
    Nullable,
    NotNull,
    #[default]
    Unknown,
}

impl Nullability {
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            Self::Nullable
        } else {
            Self::NotNull
        }
    }
}

impl std::fmt::Display for Nullability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nullable => write!(f, "true"),
            Self::NotNull => write!(f, "false"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl Serialize for Nullability {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Nullable => serializer.serialize_bool(true),
            Self::NotNull => serializer.serialize_bool(false),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

impl<'de> Deserialize<'de> for Nullability {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Text(String),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Flag(b) => Self::from_flag(b),
            Repr::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Self::Nullable,
                "false" => Self::NotNull,
                _ => Self::Unknown,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum TimezoneMode {
    #[serde(rename = "with")]
    WithZone,
    #[serde(rename = "none")]
    NoZone,
}

impl std::fmt::Display for TimezoneMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WithZone => write!(f, "with"),
            Self::NoZone => write!(f, "none"),
        }
    }
}

/// Type parameters recovered from a raw type string. Absent values are
/// omitted from serialised output.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TypeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<TimezoneMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_hint: Option<String>,
}

impl TypeMetadata {
    fn bits(bits: u16) -> Self {
        Self { bits: Some(bits), ..Self::default() }
    }
}

/// A column as declared by a source, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct RawColumn {
    pub name: String,
    #[serde(alias = "type", alias = "dtype")]
    pub declared_type: String,
    #[serde(default)]
    pub nullable: Nullability,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, nullable: Nullability) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CanonicalColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub canonical_type: CanonicalType,
    pub metadata: TypeMetadata,
    pub nullable: Nullability,
    pub original: String,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct NormalizedSchema {
    pub columns: Vec<CanonicalColumn>,
    pub warnings: Vec<SchemaFinding>,
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

static DECIMAL_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(DECIMAL|NUMERIC|NUMBER)\((\d+),\s*(\d+)\)").expect("valid regex"));
static STRING_PARAMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(VARCHAR|CHAR|CHARACTER)\((\d+)\)").expect("valid regex"));

/// One entry of the type table. `matches` and `metadata` both receive the
/// upper-cased, trimmed type string.
struct TypeRule {
    canonical: CanonicalType,
    matches: fn(&str) -> bool,
    metadata: fn(&str) -> TypeMetadata,
}

fn contains_any(t: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| t.contains(n))
}

fn no_metadata(_: &str) -> TypeMetadata {
    TypeMetadata::default()
}

fn decimal_params(t: &str) -> TypeMetadata {
    let caps = DECIMAL_PARAMS.captures(t);
    TypeMetadata {
        precision: caps.as_ref().and_then(|c| c[2].parse().ok()),
        scale: caps.as_ref().and_then(|c| c[3].parse().ok()),
        ..TypeMetadata::default()
    }
}

fn string_length(t: &str) -> TypeMetadata {
    TypeMetadata {
        length: STRING_PARAMS.captures(t).and_then(|c| c[2].parse().ok()),
        ..TypeMetadata::default()
    }
}

fn timestamp_zone(t: &str) -> TypeMetadata {
    // Snowflake's TIMESTAMP_NTZ is the zone-less variant
    let zoned = !t.contains("NTZ")
        && (t.contains("TZ") || t.contains("WITH TIME ZONE") || t.contains("OFFSET"));
    TypeMetadata {
        timezone: Some(if zoned { TimezoneMode::WithZone } else { TimezoneMode::NoZone }),
        ..TypeMetadata::default()
    }
}

/// Evaluated top to bottom; the first matching rule wins.
static TYPE_RULES: &[TypeRule] = &[
    TypeRule {
        canonical: CanonicalType::Decimal,
        matches: |t| DECIMAL_PARAMS.is_match(t),
        metadata: decimal_params,
    },
    TypeRule {
        canonical: CanonicalType::Decimal,
        matches: |t| t.starts_with("DECIMAL") || t.starts_with("NUMERIC") || t.starts_with("NUMBER"),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::String,
        matches: |t| STRING_PARAMS.is_match(t),
        metadata: string_length,
    },
    TypeRule {
        canonical: CanonicalType::String,
        matches: |t| contains_any(t, &["STRING", "TEXT", "VARCHAR", "CHAR"]),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Int,
        matches: |t| t.contains("BIGINT"),
        metadata: |_| TypeMetadata::bits(64),
    },
    TypeRule {
        canonical: CanonicalType::Int,
        matches: |t| t.contains("SMALLINT"),
        metadata: |_| TypeMetadata::bits(16),
    },
    TypeRule {
        canonical: CanonicalType::Int,
        matches: |t| t.contains("TINYINT"),
        metadata: |_| TypeMetadata::bits(8),
    },
    TypeRule {
        canonical: CanonicalType::Int,
        matches: |t| t.contains("INT"),
        metadata: |_| TypeMetadata::bits(32),
    },
    TypeRule {
        canonical: CanonicalType::Float,
        matches: |t| contains_any(t, &["DOUBLE", "FLOAT64"]),
        metadata: |_| TypeMetadata::bits(64),
    },
    TypeRule {
        canonical: CanonicalType::Float,
        matches: |t| contains_any(t, &["FLOAT", "REAL"]),
        metadata: |_| TypeMetadata::bits(32),
    },
    TypeRule {
        canonical: CanonicalType::Boolean,
        matches: |t| t.contains("BOOL"),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Timestamp,
        matches: |t| t.contains("TIMESTAMP"),
        metadata: timestamp_zone,
    },
    TypeRule {
        canonical: CanonicalType::Date,
        matches: |t| t == "DATE",
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Time,
        matches: |t| t == "TIME",
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Json,
        matches: |t| t.contains("JSON"),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Object,
        matches: |t| contains_any(t, &["STRUCT", "OBJECT", "MAP"]),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Array,
        matches: |t| t.contains("ARRAY"),
        metadata: no_metadata,
    },
    TypeRule {
        canonical: CanonicalType::Binary,
        matches: |t| contains_any(t, &["BINARY", "BYTEA", "BYTES"]),
        metadata: no_metadata,
    },
];

/// Map a raw type string onto the canonical model.
pub fn parse_type(raw: &str) -> (CanonicalType, TypeMetadata) {
    let t = raw.trim().to_uppercase();
    for rule in TYPE_RULES {
        if (rule.matches)(&t) {
            return (rule.canonical, (rule.metadata)(&t));
        }
    }
    let meta = TypeMetadata {
        original_hint: Some(t),
        ..TypeMetadata::default()
    };
    (CanonicalType::Unknown, meta)
}

/// Normalise a declared schema. `source_hint` names the source kind
/// (`csv`, `postgres`, ...) and only appears in warnings.
pub fn normalize(raw: &[RawColumn], source_hint: &str) -> NormalizedSchema {
    let mut columns = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();

    for col in raw {
        let (canonical_type, metadata) = parse_type(&col.declared_type);

        if col.name.trim().is_empty() {
            warnings.push(SchemaFinding::new(
                Severity::Warning,
                "UNNAMED_COLUMN",
                format!("{source_hint}: column with type '{}' has no name", col.declared_type),
                "",
            ));
        }
        if canonical_type == CanonicalType::Unknown {
            warnings.push(SchemaFinding::new(
                Severity::Warning,
                "UNRECOGNIZED_TYPE",
                format!(
                    "{source_hint}: {} has unrecognized type '{}'",
                    col.name, col.declared_type
                ),
                &col.name,
            ));
        }

        columns.push(CanonicalColumn {
            name: col.name.clone(),
            canonical_type,
            metadata,
            nullable: col.nullable,
            original: col.declared_type.clone(),
        });
    }

    NormalizedSchema { columns, warnings }
}
