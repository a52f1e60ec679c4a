//! Streaming catalog export.
//!
//! Matching books are fetched in keyset pages of `chunk_size` IDs and written
//! with the same column layout the importer reads, so an exported file can be
//! imported again unchanged. Only one page of records is held at a time.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rusqlite::Connection;
use shelfmark_catalog::columns::{COLUMNS, Field, UTF8_BOM, format_bool, join_list};
use shelfmark_catalog::options::{ExportFilter, ExportOptions, OptionsError};
use shelfmark_catalog::types::BookDetail;
use shelfmark_db::operations::{self, OperationError};
use shelfmark_db::queries;
use thiserror::Error;

use crate::progress::ImportProgress;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("Database error: {0}")]
    Db(#[from] OperationError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistics from an export.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportStats {
    pub records: usize,
    pub chunks: usize,
}

/// The header row.
pub fn header_row() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.header).collect()
}

/// The machine field-mapping row.
pub fn mapping_row() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.mapping).collect()
}

/// Render a book as one data row, in column order.
pub fn book_row(detail: &BookDetail) -> Vec<String> {
    let book = &detail.book;
    let primary = detail
        .languages
        .iter()
        .find(|l| l.is_primary)
        .or_else(|| detail.languages.first());

    COLUMNS
        .iter()
        .map(|column| match column.field {
            Field::InternalId => book.internal_id.clone().unwrap_or_default(),
            Field::PalmCode => book.palm_code.clone().unwrap_or_default(),
            Field::Title => book.title.clone(),
            Field::Subtitle => book.subtitle.clone().unwrap_or_default(),
            Field::TranslatedTitle => book.translated_title.clone().unwrap_or_default(),
            Field::Description => book.description.clone().unwrap_or_default(),
            Field::PublicationYear => opt_number(book.publication_year),
            Field::Pages => opt_number(book.pages),
            Field::AccessLevel => book.access_level.as_str().to_string(),
            Field::Active => format_bool(book.is_active).to_string(),
            Field::Featured => format_bool(book.is_featured).to_string(),
            Field::SortOrder => book.sort_order.to_string(),
            Field::Publisher => detail
                .publisher
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            Field::Collection => detail
                .collection
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            Field::Language => primary.map(|l| l.name.clone()).unwrap_or_default(),
            Field::LanguageCode => primary
                .and_then(|l| l.iso_code.clone())
                .unwrap_or_default(),
            Field::AdditionalLanguages => {
                let others: Vec<&str> = detail
                    .languages
                    .iter()
                    .filter(|l| primary.is_none_or(|p| p.language_id != l.language_id))
                    .map(|l| l.name.as_str())
                    .collect();
                join_list(&others)
            }
            Field::Creators(role) => {
                let names: Vec<&str> = detail
                    .creators_with_role(role)
                    .map(|c| c.name.as_str())
                    .collect();
                join_list(&names)
            }
            Field::Classification(type_name) => {
                let values: Vec<&str> = detail
                    .classifications_of_type(type_name)
                    .map(|c| c.value.as_str())
                    .collect();
                join_list(&values)
            }
            Field::Locations => {
                let names: Vec<&str> = detail.locations.iter().map(|l| l.name.as_str()).collect();
                join_list(&names)
            }
            Field::Files(kind) => {
                let names: Vec<&str> = detail
                    .files_of_kind(kind)
                    .map(|f| f.filename.as_str())
                    .collect();
                join_list(&names)
            }
        })
        .collect()
}

fn opt_number(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Stream every book matching `filter` to `writer`.
pub fn export_catalog<W: Write>(
    conn: &Connection,
    mut writer: W,
    filter: &ExportFilter,
    options: &ExportOptions,
    progress: Option<&dyn ImportProgress>,
) -> Result<ExportStats, ExportError> {
    options.validate()?;
    filter.validate()?;

    let total = queries::count_books(conn, filter)? as usize;
    if let Some(p) = progress {
        p.on_phase(&format!("Exporting {} books", total));
    }

    if options.include_bom {
        writer.write_all(UTF8_BOM)?;
    }
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(options.delimiter.as_byte())
        .from_writer(writer);
    csv_writer.write_record(header_row())?;
    if options.include_mapping_row {
        csv_writer.write_record(mapping_row())?;
    }

    let mut stats = ExportStats::default();
    let mut after_id = 0;
    loop {
        let page = queries::export_page(conn, filter, after_id, options.chunk_size)?;
        let Some(&last) = page.last() else {
            break;
        };
        for book_id in page {
            // A book deleted between paging and loading is simply left out.
            let Some(detail) = operations::get_book_detail(conn, book_id)? else {
                continue;
            };
            csv_writer.write_record(book_row(&detail))?;
            stats.records += 1;
            if let Some(p) = progress {
                p.on_row(stats.records, total);
            }
        }
        csv_writer.flush()?;
        stats.chunks += 1;
        after_id = last;
    }
    csv_writer.flush()?;

    log::info!(
        "Exported {} books in {} chunks",
        stats.records,
        stats.chunks
    );
    if let Some(p) = progress {
        p.on_complete(&format!("Exported {} books", stats.records));
    }
    Ok(stats)
}

/// Export to a file, creating or truncating it.
pub fn export_to_path(
    conn: &Connection,
    path: &Path,
    filter: &ExportFilter,
    options: &ExportOptions,
    progress: Option<&dyn ImportProgress>,
) -> Result<ExportStats, ExportError> {
    let file = File::create(path)?;
    export_catalog(conn, BufWriter::new(file), filter, options, progress)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_and_mapping_rows_line_up() {
        let headers = header_row();
        let mappings = mapping_row();
        assert_eq!(headers.len(), COLUMNS.len());
        assert_eq!(mappings.len(), headers.len());
        assert_eq!(headers[0], "Internal ID");
        assert_eq!(mappings[0], "book.internal_id");
    }
}
