//! Structural validation of a delimited catalog file.
//!
//! Checks the file as a whole before any row is interpreted. Errors block an
//! import; warnings and informational notes are advisory.

use std::collections::HashSet;
use std::path::Path;

use shelfmark_catalog::columns::{self, Field};
use shelfmark_catalog::options::Delimiter;
use thiserror::Error;

use crate::normalize::{HeaderMap, HeaderSlot};
use crate::source::{self, SourceError, SourceTable};

/// A blocking structural problem.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Duplicate column header '{0}'")]
    DuplicateHeader(String),
    #[error("No Title column in header")]
    NoTitleColumn,
    #[error("No Internal ID or Palm Code column in header")]
    NoKeyColumn,
}

/// Outcome of structural validation.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
    pub has_bom: bool,
    pub has_mapping_row: bool,
    pub data_rows: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

/// A file that passed structural validation, ready for row processing.
#[derive(Debug)]
pub struct ValidatedFile {
    pub table: SourceTable,
    pub headers: HeaderMap,
    pub report: ValidationReport,
}

impl ValidatedFile {
    /// Data rows with their 1-based file row numbers.
    pub fn data_rows(&self) -> impl Iterator<Item = (usize, &[String])> {
        let skip = usize::from(self.report.has_mapping_row);
        let first = 2 + skip;
        self.table
            .rows
            .iter()
            .skip(skip)
            .enumerate()
            .map(move |(i, row)| (first + i, row.as_slice()))
    }
}

/// Validate a file on disk.
pub fn validate_file(path: &Path, delimiter: Delimiter) -> ValidationReport {
    match inspect_file(path, delimiter) {
        Ok(file) => file.report,
        Err(report) => report,
    }
}

/// Read and validate a file, returning it ready for import when valid.
///
/// On structural failure the report (with its errors) is returned instead.
pub fn inspect_file(path: &Path, delimiter: Delimiter) -> Result<ValidatedFile, ValidationReport> {
    let table = match source::read_source(path, delimiter) {
        Ok(table) => table,
        Err(e) => {
            return Err(ValidationReport {
                errors: vec![e.into()],
                ..Default::default()
            });
        }
    };
    inspect_table(table)
}

/// Validate an already-split table.
pub fn inspect_table(table: SourceTable) -> Result<ValidatedFile, ValidationReport> {
    let mut report = ValidationReport {
        has_bom: table.has_bom,
        ..Default::default()
    };

    if table.has_bom {
        report.info.push("UTF-8 byte-order mark present".to_string());
    } else {
        report.info.push("No byte-order mark; reading as UTF-8".to_string());
    }

    let headers = HeaderMap::from_header(&table.header);

    let mut seen = HashSet::new();
    for slot in &headers.slots {
        let name = match slot {
            HeaderSlot::Known(column) => column.header.to_string(),
            HeaderSlot::Extra(name) => name.to_lowercase(),
            HeaderSlot::Ignored => continue,
        };
        if !seen.insert(name.clone()) {
            report.errors.push(ValidationError::DuplicateHeader(name));
        }
    }

    let known = headers.known_columns();
    if !headers.has_field(Field::Title) {
        report.errors.push(ValidationError::NoTitleColumn);
    }
    if !columns::has_key_column(&known) {
        report.errors.push(ValidationError::NoKeyColumn);
    }

    let extras = headers.extra_columns();
    if !extras.is_empty() {
        report.warnings.push(format!(
            "Unknown columns kept as extra fields: {}",
            extras.join(", ")
        ));
    }

    report.has_mapping_row = table
        .rows
        .first()
        .is_some_and(|row| headers.is_mapping_row(row));
    if !report.has_mapping_row {
        report
            .warnings
            .push("No field-mapping row after the header".to_string());
    }

    report.data_rows = table.rows.len() - usize::from(report.has_mapping_row);
    if report.data_rows == 0 {
        report.warnings.push("File has no data rows".to_string());
    }

    if report.is_valid() {
        Ok(ValidatedFile {
            table,
            headers,
            report,
        })
    } else {
        Err(report)
    }
}
