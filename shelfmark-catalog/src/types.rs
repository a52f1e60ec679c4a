//! Data model types for the book catalog.
//!
//! These types represent the persistent catalog schema: books and their
//! relations, lookup entities, import runs, relationships between books, and
//! data-quality issues.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Book ────────────────────────────────────────────────────────────────────

/// Access level of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Full,
    Limited,
    Unavailable,
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::Full
    }
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [Self::Full, Self::Limited, Self::Unavailable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Limited => "limited",
            Self::Unavailable => "unavailable",
        }
    }

    /// Parse a stored or user-supplied value. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "full" => Some(Self::Full),
            "limited" => Some(Self::Limited),
            "unavailable" => Some(Self::Unavailable),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog record as stored in the `books` table.
///
/// `id` is the internal surrogate; the identity used to reconcile imports is
/// the external key (`internal_id`, falling back to `palm_code`).
#[derive(Debug, Clone)]
pub struct Book {
    pub id: i64,
    pub internal_id: Option<String>,
    pub palm_code: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub translated_title: Option<String>,
    pub description: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub is_featured: bool,
    pub sort_order: i32,
    pub publisher_id: Option<i64>,
    pub collection_id: Option<i64>,
    /// Pass-through columns the import layout does not know about.
    pub extra_fields: BTreeMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

/// The writable columns of a book, used for inserts and updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFields {
    pub internal_id: Option<String>,
    pub palm_code: Option<String>,
    pub title: String,
    pub subtitle: Option<String>,
    pub translated_title: Option<String>,
    pub description: Option<String>,
    pub publication_year: Option<i32>,
    pub pages: Option<i32>,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub is_featured: bool,
    pub sort_order: i32,
    pub publisher_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub extra_fields: BTreeMap<String, String>,
}

impl BookFields {
    /// Defaults for a freshly created record: active, not featured, full access.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            is_active: true,
            ..Default::default()
        }
    }
}

impl From<&Book> for BookFields {
    fn from(book: &Book) -> Self {
        Self {
            internal_id: book.internal_id.clone(),
            palm_code: book.palm_code.clone(),
            title: book.title.clone(),
            subtitle: book.subtitle.clone(),
            translated_title: book.translated_title.clone(),
            description: book.description.clone(),
            publication_year: book.publication_year,
            pages: book.pages,
            access_level: book.access_level,
            is_active: book.is_active,
            is_featured: book.is_featured,
            sort_order: book.sort_order,
            publisher_id: book.publisher_id,
            collection_id: book.collection_id,
            extra_fields: book.extra_fields.clone(),
        }
    }
}

/// Role a creator plays on a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorRole {
    Author,
    Illustrator,
    Translator,
    Editor,
}

impl CreatorRole {
    pub const ALL: [CreatorRole; 4] = [
        Self::Author,
        Self::Illustrator,
        Self::Translator,
        Self::Editor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Illustrator => "illustrator",
            Self::Translator => "translator",
            Self::Editor => "editor",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "illustrator" => Self::Illustrator,
            "translator" => Self::Translator,
            "editor" => Self::Editor,
            _ => Self::Author,
        }
    }
}

/// Kind of media file attached to a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Pdf,
    Thumbnail,
    Audio,
}

impl FileKind {
    pub const ALL: [FileKind; 3] = [Self::Pdf, Self::Thumbnail, Self::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Thumbnail => "thumbnail",
            Self::Audio => "audio",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "thumbnail" => Self::Thumbnail,
            "audio" => Self::Audio,
            _ => Self::Pdf,
        }
    }
}

/// A reference from a book to a name-keyed lookup entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookCreator {
    pub creator_id: i64,
    pub name: String,
    pub role: CreatorRole,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLanguage {
    pub language_id: i64,
    pub name: String,
    pub iso_code: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookClassification {
    pub type_id: i64,
    pub type_name: String,
    pub value_id: i64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFile {
    pub kind: FileKind,
    pub filename: String,
    pub position: i32,
}

/// A book together with all of its relations, as needed for diffing,
/// auditing and export.
#[derive(Debug, Clone)]
pub struct BookDetail {
    pub book: Book,
    pub publisher: Option<LookupRef>,
    pub collection: Option<LookupRef>,
    /// Ordered by role, then position.
    pub creators: Vec<BookCreator>,
    /// Primary language first, then additional languages in position order.
    pub languages: Vec<BookLanguage>,
    pub classifications: Vec<BookClassification>,
    pub locations: Vec<LookupRef>,
    /// Ordered by kind, then position.
    pub files: Vec<BookFile>,
}

impl BookDetail {
    pub fn creators_with_role(&self, role: CreatorRole) -> impl Iterator<Item = &BookCreator> {
        self.creators.iter().filter(move |c| c.role == role)
    }

    pub fn files_of_kind(&self, kind: FileKind) -> impl Iterator<Item = &BookFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    pub fn classifications_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a BookClassification> {
        self.classifications
            .iter()
            .filter(move |c| c.type_name == type_name)
    }
}

// ── Lookup Entities ─────────────────────────────────────────────────────────

/// The closed set of name-keyed reference data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LookupKind {
    Publisher,
    Collection,
    Creator,
    Language,
    ClassificationType,
    /// Scoped by its classification type.
    ClassificationValue,
    Location,
}

impl LookupKind {
    pub const ALL: [LookupKind; 7] = [
        Self::Publisher,
        Self::Collection,
        Self::Creator,
        Self::Language,
        Self::ClassificationType,
        Self::ClassificationValue,
        Self::Location,
    ];

    /// Human-readable label used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Collection => "collection",
            Self::Creator => "creator",
            Self::Language => "language",
            Self::ClassificationType => "classification type",
            Self::ClassificationValue => "classification value",
            Self::Location => "geographic location",
        }
    }

    /// Whether lookups of this kind are scoped under a parent entity.
    pub fn is_scoped(&self) -> bool {
        matches!(self, Self::ClassificationValue)
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A lookup entity to be inserted.
#[derive(Debug, Clone)]
pub struct NewLookup<'a> {
    pub kind: LookupKind,
    pub name: &'a str,
    /// Classification type id for classification values.
    pub parent_id: Option<i64>,
    /// ISO code for languages.
    pub iso_code: Option<&'a str>,
}

// ── Relationships ───────────────────────────────────────────────────────────

/// Tag on a directed edge between two books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Translated,
    Edition,
    Series,
    Related,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Translated => "translated",
            Self::Edition => "edition",
            Self::Series => "series",
            Self::Related => "related",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "translated" | "translation" => Self::Translated,
            "edition" => Self::Edition,
            "series" => Self::Series,
            _ => Self::Related,
        }
    }
}

/// A directed edge between two books.
#[derive(Debug, Clone)]
pub struct BookRelationship {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub relationship_type: RelationshipType,
    pub notes: Option<String>,
    pub created_at: String,
}

// ── Import Tracking ─────────────────────────────────────────────────────────

/// How incoming rows are reconciled against existing records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    CreateOnly,
    UpdateOnly,
    Upsert,
    CreateDuplicates,
}

impl Default for ImportMode {
    fn default() -> Self {
        Self::Upsert
    }
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateOnly => "create_only",
            Self::UpdateOnly => "update_only",
            Self::Upsert => "upsert",
            Self::CreateDuplicates => "create_duplicates",
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "create_only" | "create" => Ok(Self::CreateOnly),
            "update_only" | "update" => Ok(Self::UpdateOnly),
            "upsert" => Ok(Self::Upsert),
            "create_duplicates" | "duplicate" | "duplicates" => Ok(Self::CreateDuplicates),
            other => Err(format!(
                "unknown import mode '{other}' (expected create_only, update_only, upsert or create_duplicates)"
            )),
        }
    }
}

/// Lifecycle state of an import run. Terminal states are never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

/// A problem tied to one input row. Row 0 means the file as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIssue {
    pub row: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    pub level: IssueLevel,
}

impl RowIssue {
    pub fn error(row: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.map(str::to_string),
            message: message.into(),
            level: IssueLevel::Error,
        }
    }

    pub fn warning(row: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            field: field.map(str::to_string),
            message: message.into(),
            level: IssueLevel::Warning,
        }
    }
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "row {} [{}]: {}", self.row, field, self.message),
            None => write!(f, "row {}: {}", self.row, self.message),
        }
    }
}

/// A capped sample of row issues plus a count of those left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub entries: Vec<RowIssue>,
    pub remaining: usize,
}

impl ErrorLog {
    pub const MAX_ENTRIES: usize = 100;

    pub fn push(&mut self, issue: RowIssue) {
        if self.entries.len() < Self::MAX_ENTRIES {
            self.entries.push(issue);
        } else {
            self.remaining += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One CSV import attempt.
#[derive(Debug, Clone)]
pub struct ImportRun {
    pub id: i64,
    pub source_filename: String,
    pub mode: ImportMode,
    pub total_rows: u64,
    pub processed: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub failed: u64,
    /// `processed / total_rows` as a percentage.
    pub success_rate: f64,
    pub error_log: ErrorLog,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
}

/// What an import run did to a book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    Created,
    Updated,
}

impl RunAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

// ── Data Quality ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "critical" => Self::Critical,
            "info" => Self::Info,
            _ => Self::Warning,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected anomaly tied to a book.
#[derive(Debug, Clone)]
pub struct QualityIssue {
    pub id: i64,
    pub book_id: i64,
    pub issue_type: String,
    pub severity: Severity,
    pub message: String,
    pub resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<String>,
    pub resolution_notes: Option<String>,
    pub created_at: String,
}

// ── Seed Data ───────────────────────────────────────────────────────────────

/// A language definition, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageSeed {
    pub name: String,
    #[serde(default)]
    pub iso_code: Option<String>,
}

/// A classification type and its known values, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationTypeSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}
