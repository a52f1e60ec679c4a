//! Column layout shared by import and export.
//!
//! A delimited catalog file has a human-readable header row, an optional
//! machine field-mapping row, then data rows. Multi-valued cells join their
//! values with [`LIST_SEPARATOR`].

use crate::types::{CreatorRole, FileKind};

/// Separator between values of a multi-valued cell.
pub const LIST_SEPARATOR: char = '|';

/// UTF-8 byte-order mark.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// What a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    InternalId,
    PalmCode,
    Title,
    Subtitle,
    TranslatedTitle,
    Description,
    PublicationYear,
    Pages,
    AccessLevel,
    Active,
    Featured,
    SortOrder,
    Publisher,
    Collection,
    Language,
    LanguageCode,
    AdditionalLanguages,
    Creators(CreatorRole),
    /// Values of the named classification type.
    Classification(&'static str),
    Locations,
    Files(FileKind),
}

impl Field {
    /// Whether the cell may hold several `|`-separated values.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            Self::AdditionalLanguages
                | Self::Creators(_)
                | Self::Classification(_)
                | Self::Locations
                | Self::Files(FileKind::Audio)
        )
    }
}

/// One column of the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Display header (row 1).
    pub header: &'static str,
    /// Dotted storage field name (row 2).
    pub mapping: &'static str,
    pub field: Field,
}

const fn col(header: &'static str, mapping: &'static str, field: Field) -> Column {
    Column {
        header,
        mapping,
        field,
    }
}

/// Classification types that have a dedicated column.
pub const CLASSIFICATION_COLUMNS: [&str; 3] = ["Genre", "Subject", "Keyword"];

/// The full layout, in export order.
pub const COLUMNS: &[Column] = &[
    col("Internal ID", "book.internal_id", Field::InternalId),
    col("Palm Code", "book.palm_code", Field::PalmCode),
    col("Title", "book.title", Field::Title),
    col("Subtitle", "book.subtitle", Field::Subtitle),
    col("Translated Title", "book.translated_title", Field::TranslatedTitle),
    col("Description", "book.description", Field::Description),
    col("Publication Year", "book.publication_year", Field::PublicationYear),
    col("Pages", "book.pages", Field::Pages),
    col("Access Level", "book.access_level", Field::AccessLevel),
    col("Active", "book.is_active", Field::Active),
    col("Featured", "book.is_featured", Field::Featured),
    col("Sort Order", "book.sort_order", Field::SortOrder),
    col("Publisher", "publisher.name", Field::Publisher),
    col("Collection", "collection.name", Field::Collection),
    col("Language", "language.name", Field::Language),
    col("Language Code", "language.iso_code", Field::LanguageCode),
    col("Additional Languages", "languages.additional", Field::AdditionalLanguages),
    col("Authors", "creators.author", Field::Creators(CreatorRole::Author)),
    col("Illustrators", "creators.illustrator", Field::Creators(CreatorRole::Illustrator)),
    col("Translators", "creators.translator", Field::Creators(CreatorRole::Translator)),
    col("Editors", "creators.editor", Field::Creators(CreatorRole::Editor)),
    col("Genres", "classifications.genre", Field::Classification("Genre")),
    col("Subjects", "classifications.subject", Field::Classification("Subject")),
    col("Keywords", "classifications.keyword", Field::Classification("Keyword")),
    col("Locations", "locations.name", Field::Locations),
    col("PDF File", "files.pdf", Field::Files(FileKind::Pdf)),
    col("Thumbnail File", "files.thumbnail", Field::Files(FileKind::Thumbnail)),
    col("Audio Files", "files.audio", Field::Files(FileKind::Audio)),
];

/// Find the column for a header cell.
///
/// Display headers match case-insensitively after trimming; a mapping field
/// name is accepted as well.
pub fn find_column(header: &str) -> Option<&'static Column> {
    let header = header.trim();
    COLUMNS
        .iter()
        .find(|c| c.header.eq_ignore_ascii_case(header) || c.mapping == header)
}

/// Find the column holding a given field.
pub fn column_for(field: Field) -> Option<&'static Column> {
    COLUMNS.iter().find(|c| c.field == field)
}

/// Whether a column set can identify records (carries an external key).
pub fn has_key_column(columns: &[&Column]) -> bool {
    columns
        .iter()
        .any(|c| matches!(c.field, Field::InternalId | Field::PalmCode))
}

/// Split a multi-valued cell. Empty cells and empty segments yield nothing.
pub fn split_list(cell: &str) -> Vec<String> {
    cell.split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join values into a multi-valued cell.
pub fn join_list<S: AsRef<str>>(values: &[S]) -> String {
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push(LIST_SEPARATOR);
        }
        out.push_str(value.as_ref());
    }
    out
}

/// Parse a boolean cell: `1/0`, `true/false`, `yes/no`, `y/n`.
pub fn parse_bool(cell: &str) -> Option<bool> {
    match cell.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Render a boolean the way exports write it.
pub fn format_bool(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_drops_empty_segments() {
        assert_eq!(split_list("A | B||C "), vec!["A", "B", "C"]);
        assert!(split_list("").is_empty());
        assert!(split_list(" | ").is_empty());
    }

    #[test]
    fn join_round_trips_split() {
        let values = vec!["Ana".to_string(), "Luis".to_string()];
        assert_eq!(split_list(&join_list(&values)), values);
    }

    #[test]
    fn headers_match_loosely() {
        assert_eq!(find_column(" internal id ").unwrap().field, Field::InternalId);
        assert_eq!(find_column("book.title").unwrap().field, Field::Title);
        assert!(find_column("Shelf").is_none());
    }

    #[test]
    fn mapping_names_are_unique() {
        for (i, a) in COLUMNS.iter().enumerate() {
            for b in &COLUMNS[i + 1..] {
                assert_ne!(a.mapping, b.mapping);
                assert_ne!(a.header, b.header);
            }
        }
    }

    #[test]
    fn bool_cells() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
