//! Row normalization: one delimited row into a typed candidate record.

use std::collections::BTreeMap;

use shelfmark_catalog::columns::{self, Column, Field};
use shelfmark_catalog::types::{AccessLevel, BookFields, CreatorRole, FileKind, RowIssue};

/// What one header cell maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSlot {
    Known(&'static Column),
    /// A column the layout does not know, kept as a pass-through field.
    Extra(String),
    /// A blank header cell; its values are ignored.
    Ignored,
}

/// Header row resolved against the column layout.
#[derive(Debug, Clone)]
pub struct HeaderMap {
    pub slots: Vec<HeaderSlot>,
}

impl HeaderMap {
    pub fn from_header(header: &[String]) -> Self {
        let slots = header
            .iter()
            .map(|cell| {
                let cell = cell.trim();
                if cell.is_empty() {
                    HeaderSlot::Ignored
                } else if let Some(column) = columns::find_column(cell) {
                    HeaderSlot::Known(column)
                } else {
                    HeaderSlot::Extra(cell.to_string())
                }
            })
            .collect();
        Self { slots }
    }

    pub fn known_columns(&self) -> Vec<&'static Column> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                HeaderSlot::Known(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    pub fn extra_columns(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter_map(|s| match s {
                HeaderSlot::Extra(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_field(&self, field: Field) -> bool {
        self.known_columns().iter().any(|c| c.field == field)
    }

    /// Whether a row is the machine field-mapping row: every non-empty cell
    /// equals the mapping name of its known column, and at least one does.
    pub fn is_mapping_row(&self, row: &[String]) -> bool {
        let mut matched = false;
        for (slot, cell) in self.slots.iter().zip(row) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            match slot {
                HeaderSlot::Known(column) if column.mapping == cell => matched = true,
                _ => return false,
            }
        }
        matched
    }
}

/// A data row after type coercion, before lookup resolution.
///
/// A `None` scalar or an empty list means the cell was blank.
#[derive(Debug, Clone, Default)]
pub struct CandidateBook {
    pub row: usize,
    pub internal_id: Option<String>,
    pub palm_code: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub translated_title: Option<String>,
    pub description: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
    pub access_level: Option<AccessLevel>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
    pub sort_order: Option<i32>,
    pub publisher: Option<String>,
    pub collection: Option<String>,
    pub language: Option<String>,
    pub language_code: Option<String>,
    pub additional_languages: Vec<String>,
    pub creators: BTreeMap<CreatorRole, Vec<String>>,
    /// Values per classification type name.
    pub classifications: BTreeMap<String, Vec<String>>,
    pub locations: Vec<String>,
    pub files: BTreeMap<FileKind, Vec<String>>,
    pub extra: BTreeMap<String, String>,
    pub issues: Vec<RowIssue>,
}

impl CandidateBook {
    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.level == shelfmark_catalog::types::IssueLevel::Error)
    }

    pub fn has_key(&self) -> bool {
        self.internal_id.is_some() || self.palm_code.is_some()
    }

    /// Short label for messages: the external key, else the title.
    pub fn label(&self) -> String {
        self.internal_id
            .as_deref()
            .or(self.palm_code.as_deref())
            .or(self.title.as_deref())
            .unwrap_or("(untitled)")
            .to_string()
    }

    /// All language names, primary first, without repeats.
    pub fn language_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for name in self.language.iter().chain(&self.additional_languages) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Copy every provided scalar onto `fields`. Blank cells leave the target
    /// untouched. Lookup ids are not set here.
    pub fn apply_scalars(&self, fields: &mut BookFields) {
        if let Some(v) = &self.internal_id {
            fields.internal_id = Some(v.clone());
        }
        if let Some(v) = &self.palm_code {
            fields.palm_code = Some(v.clone());
        }
        if let Some(v) = &self.title {
            fields.title = v.clone();
        }
        if let Some(v) = &self.subtitle {
            fields.subtitle = Some(v.clone());
        }
        if let Some(v) = &self.translated_title {
            fields.translated_title = Some(v.clone());
        }
        if let Some(v) = &self.description {
            fields.description = Some(v.clone());
        }
        if let Some(v) = self.publication_year {
            fields.publication_year = Some(v);
        }
        if let Some(v) = self.pages {
            fields.pages = Some(v);
        }
        if let Some(v) = self.access_level {
            fields.access_level = v;
        }
        if let Some(v) = self.is_active {
            fields.is_active = v;
        }
        if let Some(v) = self.is_featured {
            fields.is_featured = v;
        }
        if let Some(v) = self.sort_order {
            fields.sort_order = v;
        }
        for (key, value) in &self.extra {
            fields.extra_fields.insert(key.clone(), value.clone());
        }
    }
}

/// Normalize one data row. Parse problems are attached to the candidate.
pub fn normalize_row(headers: &HeaderMap, row_number: usize, record: &[String]) -> CandidateBook {
    let mut candidate = CandidateBook {
        row: row_number,
        ..Default::default()
    };

    if record.len() > headers.slots.len()
        && record[headers.slots.len()..]
            .iter()
            .any(|c| !c.trim().is_empty())
    {
        candidate.issues.push(RowIssue::warning(
            row_number,
            None,
            format!(
                "row has {} cells but the header has {}; extra cells ignored",
                record.len(),
                headers.slots.len()
            ),
        ));
    }

    for (slot, raw) in headers.slots.iter().zip(record) {
        let cell = raw.trim();
        if cell.is_empty() {
            continue;
        }
        match slot {
            HeaderSlot::Ignored => {}
            HeaderSlot::Extra(name) => {
                candidate.extra.insert(name.clone(), cell.to_string());
            }
            HeaderSlot::Known(column) => apply_cell(&mut candidate, column, cell),
        }
    }

    candidate
}

fn apply_cell(candidate: &mut CandidateBook, column: &Column, cell: &str) {
    let row = candidate.row;
    let text = || Some(cell.to_string());
    match column.field {
        Field::InternalId => candidate.internal_id = text(),
        Field::PalmCode => candidate.palm_code = text(),
        Field::Title => candidate.title = text(),
        Field::Subtitle => candidate.subtitle = text(),
        Field::TranslatedTitle => candidate.translated_title = text(),
        Field::Description => candidate.description = text(),
        Field::Publisher => candidate.publisher = text(),
        Field::Collection => candidate.collection = text(),
        Field::Language => candidate.language = text(),
        Field::LanguageCode => candidate.language_code = text(),
        Field::PublicationYear => {
            candidate.publication_year = parse_int(candidate, column, cell, i32::MIN);
        }
        Field::Pages => candidate.pages = parse_int(candidate, column, cell, 0),
        Field::SortOrder => candidate.sort_order = parse_int(candidate, column, cell, i32::MIN),
        Field::AccessLevel => match AccessLevel::parse(cell) {
            Some(level) => candidate.access_level = Some(level),
            None => candidate.issues.push(RowIssue::error(
                row,
                Some(column.header),
                format!("'{cell}' is not an access level (expected full, limited or unavailable)"),
            )),
        },
        Field::Active | Field::Featured => match columns::parse_bool(cell) {
            Some(value) if column.field == Field::Active => candidate.is_active = Some(value),
            Some(value) => candidate.is_featured = Some(value),
            None => candidate.issues.push(RowIssue::error(
                row,
                Some(column.header),
                format!("'{cell}' is not a boolean (expected yes/no, true/false or 1/0)"),
            )),
        },
        Field::AdditionalLanguages => candidate.additional_languages = columns::split_list(cell),
        Field::Creators(role) => {
            candidate.creators.insert(role, columns::split_list(cell));
        }
        Field::Classification(type_name) => {
            let mut values = columns::split_list(cell);
            values.sort();
            values.dedup();
            candidate.classifications.insert(type_name.to_string(), values);
        }
        Field::Locations => {
            let mut values = columns::split_list(cell);
            values.sort();
            values.dedup();
            candidate.locations = values;
        }
        Field::Files(kind) => {
            let values = if column.field.is_list() {
                columns::split_list(cell)
            } else {
                vec![cell.to_string()]
            };
            candidate.files.insert(kind, values);
        }
    }
}

fn parse_int(candidate: &mut CandidateBook, column: &Column, cell: &str, min: i32) -> Option<i32> {
    match cell.parse::<i32>() {
        Ok(value) if value >= min => Some(value),
        Ok(value) => {
            candidate.issues.push(RowIssue::error(
                candidate.row,
                Some(column.header),
                format!("{value} is below the minimum of {min}"),
            ));
            None
        }
        Err(_) => {
            candidate.issues.push(RowIssue::error(
                candidate.row,
                Some(column.header),
                format!("'{cell}' is not a whole number"),
            ));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn coerces_and_splits() {
        let headers = HeaderMap::from_header(&strings(&[
            "Internal ID",
            "Title",
            "Publication Year",
            "Authors",
            "Featured",
            "Shelf",
        ]));
        let candidate = normalize_row(
            &headers,
            3,
            &strings(&["A-1", " Uno ", "1999", "Ana | Luis", "yes", "B3"]),
        );
        assert!(!candidate.has_errors());
        assert_eq!(candidate.title.as_deref(), Some("Uno"));
        assert_eq!(candidate.publication_year, Some(1999));
        assert_eq!(candidate.creators[&CreatorRole::Author], vec!["Ana", "Luis"]);
        assert_eq!(candidate.is_featured, Some(true));
        assert_eq!(candidate.extra["Shelf"], "B3");
    }

    #[test]
    fn bad_cells_become_row_issues() {
        let headers = HeaderMap::from_header(&strings(&["Title", "Publication Year", "Pages"]));
        let candidate = normalize_row(&headers, 4, &strings(&["Uno", "circa 1900", "-3"]));
        assert!(candidate.has_errors());
        assert_eq!(candidate.issues.len(), 2);
        assert_eq!(candidate.issues[0].row, 4);
        assert_eq!(candidate.issues[0].field.as_deref(), Some("Publication Year"));
    }

    #[test]
    fn empty_cells_are_not_provided() {
        let headers = HeaderMap::from_header(&strings(&["Title", "Authors", "Genres"]));
        let candidate = normalize_row(&headers, 2, &strings(&["Uno", "", " "]));
        assert!(candidate.creators.is_empty());
        assert!(candidate.classifications.is_empty());
        let short = normalize_row(&headers, 3, &strings(&["Dos"]));
        assert_eq!(short.title.as_deref(), Some("Dos"));
    }

    #[test]
    fn mapping_row_detection() {
        let headers = HeaderMap::from_header(&strings(&["Title", "Internal ID", "Shelf"]));
        assert!(headers.is_mapping_row(&strings(&["book.title", "book.internal_id", ""])));
        assert!(!headers.is_mapping_row(&strings(&["Uno", "A-1", ""])));
        assert!(!headers.is_mapping_row(&strings(&["", "", ""])));
    }
}
