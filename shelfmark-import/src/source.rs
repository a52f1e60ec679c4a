//! Reading delimited catalog files into memory.

use std::path::Path;

use shelfmark_catalog::columns::UTF8_BOM;
use shelfmark_catalog::options::Delimiter;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("File is not valid UTF-8 (first bad byte at offset {0})")]
    NotUtf8(usize),
    #[error("File is empty")]
    Empty,
    #[error("Malformed delimited data: {0}")]
    Csv(#[from] csv::Error),
}

/// A delimited file split into records.
///
/// Row numbers are 1-based record positions in the file, so the header is
/// row 1 and the first data row is row 2 (or 3 after a mapping row).
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub has_bom: bool,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read and split a delimited file.
pub fn read_source(path: &Path, delimiter: Delimiter) -> Result<SourceTable, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_source(&bytes, delimiter)
}

/// Split in-memory delimited data.
pub fn parse_source(bytes: &[u8], delimiter: Delimiter) -> Result<SourceTable, SourceError> {
    let (has_bom, body) = match bytes.strip_prefix(UTF8_BOM) {
        Some(rest) => (true, rest),
        None => (false, bytes),
    };
    if let Err(e) = std::str::from_utf8(body) {
        return Err(SourceError::NotUtf8(e.valid_up_to()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(false)
        .flexible(true)
        .from_reader(body);

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    // Trailing blank lines are not rows.
    while records
        .last()
        .is_some_and(|r| r.iter().all(|c| c.trim().is_empty()))
    {
        records.pop();
    }

    let mut records = records.into_iter();
    let header = records.next().ok_or(SourceError::Empty)?;
    Ok(SourceTable {
        has_bom,
        header,
        rows: records.collect(),
    })
}
