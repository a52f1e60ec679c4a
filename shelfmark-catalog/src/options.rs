//! Option structures for import, export, inference and quality runs.
//!
//! Every structure is closed: deserializing one with an unknown key fails, and
//! `validate` rejects values the engine cannot honour.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccessLevel, ImportMode};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("chunk_size must be at least 1")]
    ZeroChunkSize,
    #[error("invalid range for {field}: {from} is after {to}")]
    InvertedRange {
        field: &'static str,
        from: String,
        to: String,
    },
}

/// Field delimiter of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::Comma
    }
}

impl Delimiter {
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Comma => b',',
            Self::Tab => b'\t',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comma => "comma",
            Self::Tab => "tab",
        }
    }
}

impl std::str::FromStr for Delimiter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "comma" | "," | "csv" => Ok(Self::Comma),
            "tab" | "\t" | "tsv" => Ok(Self::Tab),
            other => Err(format!("unknown delimiter '{other}' (expected comma or tab)")),
        }
    }
}

pub const DEFAULT_CHUNK_SIZE: usize = 100;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

/// Options for a CSV import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportOptions {
    /// Reconciliation mode. Default: `upsert`.
    #[serde(default)]
    pub mode: ImportMode,
    /// Create lookup entities that do not exist yet. Default: off.
    #[serde(default)]
    pub create_missing_relations: bool,
    /// Record invalid rows as failed and continue. When off, the first invalid
    /// row stops the run. Default: on.
    #[serde(default = "default_true")]
    pub skip_invalid_rows: bool,
    /// Leave an unresolvable reference unset (with a warning) instead of
    /// failing the row. Default: off.
    #[serde(default)]
    pub skip_unresolved_fields: bool,
    /// Rows committed per transaction. Default: 100.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub delimiter: Delimiter,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mode: ImportMode::default(),
            create_missing_relations: false,
            skip_invalid_rows: true,
            skip_unresolved_fields: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: Delimiter::default(),
        }
    }
}

impl ImportOptions {
    pub fn with_mode(mode: ImportMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.chunk_size == 0 {
            return Err(OptionsError::ZeroChunkSize);
        }
        Ok(())
    }
}

/// Output format for an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportOptions {
    #[serde(default)]
    pub delimiter: Delimiter,
    /// Prefix the file with a UTF-8 byte-order mark. Default: on.
    #[serde(default = "default_true")]
    pub include_bom: bool,
    /// Emit the machine field-mapping row after the header. Default: on.
    #[serde(default = "default_true")]
    pub include_mapping_row: bool,
    /// Records fetched and written per chunk. Default: 100.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            include_bom: true,
            include_mapping_row: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ExportOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.chunk_size == 0 {
            return Err(OptionsError::ZeroChunkSize);
        }
        Ok(())
    }
}

/// Which records an export includes. Every unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportFilter {
    /// Collection name (exact).
    #[serde(default)]
    pub collection: Option<String>,
    /// Language name or ISO code (exact).
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub access_level: Option<AccessLevel>,
    /// Inclusive bounds on the record's creation date.
    #[serde(default)]
    pub created_from: Option<NaiveDate>,
    #[serde(default)]
    pub created_to: Option<NaiveDate>,
    /// Inclusive bounds on the publication year.
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub featured: Option<bool>,
}

impl ExportFilter {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(OptionsError::InvertedRange {
                    field: "created",
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        if let (Some(from), Some(to)) = (self.year_from, self.year_to) {
            if from > to {
                return Err(OptionsError::InvertedRange {
                    field: "publication_year",
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Options for the translation-relationship inference pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceOptions {
    /// Report without mutating.
    #[serde(default)]
    pub dry_run: bool,
    /// Remove existing "translated" edges before inferring.
    #[serde(default)]
    pub clear_existing: bool,
}

/// Which records a quality run checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualityScope {
    All,
    Books(Vec<i64>),
    /// Every record created or updated by one import run.
    ImportRun(i64),
}

/// Options for a quality run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityOptions {
    /// Delete unresolved issues of the checked records before re-checking.
    #[serde(default)]
    pub clear_existing: bool,
}
