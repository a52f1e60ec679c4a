//! CRUD operations for all catalog entity types.

use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, params};
use shelfmark_catalog::types::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Entity not found: {entity_type} with id '{id}'")]
    NotFound { entity_type: String, id: String },
    #[error("Import run {0} is already finalized")]
    RunFinalized(i64),
    #[error("Classification values need a classification type")]
    MissingParent,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ── Lookup Operations ───────────────────────────────────────────────────────

fn lookup_table(kind: LookupKind) -> &'static str {
    match kind {
        LookupKind::Publisher => "publishers",
        LookupKind::Collection => "collections",
        LookupKind::Creator => "creators",
        LookupKind::Language => "languages",
        LookupKind::ClassificationType => "classification_types",
        LookupKind::ClassificationValue => "classification_values",
        LookupKind::Location => "locations",
    }
}

/// Find a lookup entity by exact (case-sensitive) name.
///
/// `parent_id` scopes classification values to their type and is ignored for
/// every other kind.
pub fn find_lookup(
    conn: &Connection,
    kind: LookupKind,
    parent_id: Option<i64>,
    name: &str,
) -> Result<Option<i64>, OperationError> {
    let table = lookup_table(kind);
    let id = if kind.is_scoped() {
        let parent_id = parent_id.ok_or(OperationError::MissingParent)?;
        conn.query_row(
            &format!("SELECT id FROM {table} WHERE type_id = ?1 AND name = ?2"),
            params![parent_id, name],
            |row| row.get(0),
        )
        .optional()?
    } else {
        conn.query_row(
            &format!("SELECT id FROM {table} WHERE name = ?1"),
            params![name],
            |row| row.get(0),
        )
        .optional()?
    };
    Ok(id)
}

/// Insert a lookup entity with defaults. Returns the generated ID.
pub fn insert_lookup(conn: &Connection, lookup: &NewLookup<'_>) -> Result<i64, OperationError> {
    match lookup.kind {
        LookupKind::ClassificationValue => {
            let parent_id = lookup.parent_id.ok_or(OperationError::MissingParent)?;
            conn.execute(
                "INSERT INTO classification_values (type_id, name) VALUES (?1, ?2)",
                params![parent_id, lookup.name],
            )?;
        }
        LookupKind::Language => {
            conn.execute(
                "INSERT INTO languages (name, iso_code) VALUES (?1, ?2)",
                params![lookup.name, lookup.iso_code],
            )?;
        }
        kind => {
            let table = lookup_table(kind);
            conn.execute(
                &format!("INSERT INTO {table} (name) VALUES (?1)"),
                params![lookup.name],
            )?;
        }
    }
    Ok(conn.last_insert_rowid())
}

/// Insert or update a language from seed data. Returns its ID.
pub fn upsert_language(conn: &Connection, language: &LanguageSeed) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO languages (name, iso_code) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET iso_code = COALESCE(excluded.iso_code, iso_code)",
        params![language.name, language.iso_code],
    )?;
    let id = conn.query_row(
        "SELECT id FROM languages WHERE name = ?1",
        params![language.name],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert or update a classification type and its known values. Returns its ID.
pub fn upsert_classification_type(
    conn: &Connection,
    seed: &ClassificationTypeSeed,
) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO classification_types (name, description) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET description = COALESCE(excluded.description, description)",
        params![seed.name, seed.description],
    )?;
    let type_id: i64 = conn.query_row(
        "SELECT id FROM classification_types WHERE name = ?1",
        params![seed.name],
        |row| row.get(0),
    )?;
    for value in &seed.values {
        conn.execute(
            "INSERT OR IGNORE INTO classification_values (type_id, name) VALUES (?1, ?2)",
            params![type_id, value],
        )?;
    }
    Ok(type_id)
}

/// Look up a language's ISO code.
pub fn language_iso_code(conn: &Connection, language_id: i64) -> Result<Option<String>, OperationError> {
    let code = conn
        .query_row(
            "SELECT iso_code FROM languages WHERE id = ?1",
            params![language_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(code.flatten())
}

// ── Book Operations ─────────────────────────────────────────────────────────

pub(crate) const BOOK_COLUMNS: &str = "id, internal_id, palm_code, title, subtitle, translated_title,
    description, publication_year, pages, access_level, is_active, is_featured, sort_order,
    publisher_id, collection_id, extra_fields, created_at, updated_at";

/// Insert a new book. Returns the generated ID.
pub fn insert_book(conn: &Connection, fields: &BookFields) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO books (internal_id, palm_code, title, subtitle, translated_title,
             description, publication_year, pages, access_level, is_active, is_featured,
             sort_order, publisher_id, collection_id, extra_fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            fields.internal_id,
            fields.palm_code,
            fields.title,
            fields.subtitle,
            fields.translated_title,
            fields.description,
            fields.publication_year,
            fields.pages,
            fields.access_level.as_str(),
            fields.is_active,
            fields.is_featured,
            fields.sort_order,
            fields.publisher_id,
            fields.collection_id,
            extra_to_json(&fields.extra_fields)?,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite every writable column of an existing book.
pub fn update_book(conn: &Connection, id: i64, fields: &BookFields) -> Result<(), OperationError> {
    let changed = conn.execute(
        "UPDATE books SET internal_id = ?2, palm_code = ?3, title = ?4, subtitle = ?5,
             translated_title = ?6, description = ?7, publication_year = ?8, pages = ?9,
             access_level = ?10, is_active = ?11, is_featured = ?12, sort_order = ?13,
             publisher_id = ?14, collection_id = ?15, extra_fields = ?16,
             updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            fields.internal_id,
            fields.palm_code,
            fields.title,
            fields.subtitle,
            fields.translated_title,
            fields.description,
            fields.publication_year,
            fields.pages,
            fields.access_level.as_str(),
            fields.is_active,
            fields.is_featured,
            fields.sort_order,
            fields.publisher_id,
            fields.collection_id,
            extra_to_json(&fields.extra_fields)?,
        ],
    )?;
    if changed == 0 {
        return Err(OperationError::NotFound {
            entity_type: "book".to_string(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Fetch a book by surrogate ID.
pub fn get_book(conn: &Connection, id: i64) -> Result<Option<Book>, OperationError> {
    let book = conn
        .query_row(
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"),
            params![id],
            row_to_book,
        )
        .optional()?;
    Ok(book)
}

/// Find the active book matching an external key.
///
/// `internal_id` is tried first, then `palm_code`. When several active books
/// share a key, the oldest one wins.
pub fn find_active_book_by_key(
    conn: &Connection,
    internal_id: Option<&str>,
    palm_code: Option<&str>,
) -> Result<Option<Book>, OperationError> {
    if let Some(internal_id) = internal_id {
        let found = conn
            .query_row(
                &format!(
                    "SELECT {BOOK_COLUMNS} FROM books
                     WHERE internal_id = ?1 AND is_active = 1 ORDER BY id LIMIT 1"
                ),
                params![internal_id],
                row_to_book,
            )
            .optional()?;
        if found.is_some() {
            return Ok(found);
        }
    }
    if let Some(palm_code) = palm_code {
        let found = conn
            .query_row(
                &format!(
                    "SELECT {BOOK_COLUMNS} FROM books
                     WHERE palm_code = ?1 AND is_active = 1 ORDER BY id LIMIT 1"
                ),
                params![palm_code],
                row_to_book,
            )
            .optional()?;
        return Ok(found);
    }
    Ok(None)
}

/// Fetch a book together with all of its relations.
pub fn get_book_detail(conn: &Connection, id: i64) -> Result<Option<BookDetail>, OperationError> {
    let Some(book) = get_book(conn, id)? else {
        return Ok(None);
    };

    let publisher = match book.publisher_id {
        Some(pid) => lookup_ref(conn, "publishers", pid)?,
        None => None,
    };
    let collection = match book.collection_id {
        Some(cid) => lookup_ref(conn, "collections", cid)?,
        None => None,
    };

    let mut stmt = conn.prepare_cached(
        "SELECT bc.creator_id, c.name, bc.role, bc.position
         FROM book_creators bc JOIN creators c ON c.id = bc.creator_id
         WHERE bc.book_id = ?1",
    )?;
    let mut creators = stmt
        .query_map(params![id], |row| {
            let role: String = row.get(2)?;
            Ok(BookCreator {
                creator_id: row.get(0)?,
                name: row.get(1)?,
                role: CreatorRole::from_str_loose(&role),
                position: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    creators.sort_by_key(|c| (c.role, c.position));

    let mut stmt = conn.prepare_cached(
        "SELECT l.id, l.name, l.iso_code, bl.is_primary
         FROM book_languages bl JOIN languages l ON l.id = bl.language_id
         WHERE bl.book_id = ?1
         ORDER BY bl.is_primary DESC, bl.position",
    )?;
    let languages = stmt
        .query_map(params![id], |row| {
            Ok(BookLanguage {
                language_id: row.get(0)?,
                name: row.get(1)?,
                iso_code: row.get(2)?,
                is_primary: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT t.id, t.name, v.id, v.name
         FROM book_classifications bc
         JOIN classification_values v ON v.id = bc.value_id
         JOIN classification_types t ON t.id = v.type_id
         WHERE bc.book_id = ?1
         ORDER BY t.name, v.name",
    )?;
    let classifications = stmt
        .query_map(params![id], |row| {
            Ok(BookClassification {
                type_id: row.get(0)?,
                type_name: row.get(1)?,
                value_id: row.get(2)?,
                value: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT l.id, l.name FROM book_locations bl JOIN locations l ON l.id = bl.location_id
         WHERE bl.book_id = ?1 ORDER BY l.name",
    )?;
    let locations = stmt
        .query_map(params![id], |row| {
            Ok(LookupRef {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare_cached(
        "SELECT kind, filename, position FROM book_files WHERE book_id = ?1",
    )?;
    let mut files = stmt
        .query_map(params![id], |row| {
            let kind: String = row.get(0)?;
            Ok(BookFile {
                kind: FileKind::from_str_loose(&kind),
                filename: row.get(1)?,
                position: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    files.sort_by_key(|f| (f.kind, f.position));

    Ok(Some(BookDetail {
        book,
        publisher,
        collection,
        creators,
        languages,
        classifications,
        locations,
        files,
    }))
}

fn lookup_ref(conn: &Connection, table: &str, id: i64) -> Result<Option<LookupRef>, OperationError> {
    let found = conn
        .query_row(
            &format!("SELECT id, name FROM {table} WHERE id = ?1"),
            params![id],
            |row| {
                Ok(LookupRef {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(found)
}

/// Replace the creators of one role, keeping the given order.
pub fn set_book_creators(
    conn: &Connection,
    book_id: i64,
    role: CreatorRole,
    creator_ids: &[i64],
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM book_creators WHERE book_id = ?1 AND role = ?2",
        params![book_id, role.as_str()],
    )?;
    for (position, creator_id) in creator_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO book_creators (book_id, creator_id, role, position)
             VALUES (?1, ?2, ?3, ?4)",
            params![book_id, creator_id, role.as_str(), position as i64],
        )?;
    }
    Ok(())
}

/// Replace a book's languages. The first language is the primary one.
pub fn set_book_languages(
    conn: &Connection,
    book_id: i64,
    language_ids: &[i64],
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM book_languages WHERE book_id = ?1",
        params![book_id],
    )?;
    for (position, language_id) in language_ids.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO book_languages (book_id, language_id, is_primary, position)
             VALUES (?1, ?2, ?3, ?4)",
            params![book_id, language_id, position == 0, position as i64],
        )?;
    }
    Ok(())
}

/// Replace a book's values of one classification type.
pub fn set_book_classifications(
    conn: &Connection,
    book_id: i64,
    type_id: i64,
    value_ids: &[i64],
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM book_classifications
         WHERE book_id = ?1
           AND value_id IN (SELECT id FROM classification_values WHERE type_id = ?2)",
        params![book_id, type_id],
    )?;
    for value_id in value_ids {
        conn.execute(
            "INSERT OR IGNORE INTO book_classifications (book_id, value_id) VALUES (?1, ?2)",
            params![book_id, value_id],
        )?;
    }
    Ok(())
}

/// Replace a book's geographic locations.
pub fn set_book_locations(
    conn: &Connection,
    book_id: i64,
    location_ids: &[i64],
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM book_locations WHERE book_id = ?1",
        params![book_id],
    )?;
    for location_id in location_ids {
        conn.execute(
            "INSERT OR IGNORE INTO book_locations (book_id, location_id) VALUES (?1, ?2)",
            params![book_id, location_id],
        )?;
    }
    Ok(())
}

/// Replace a book's files of one kind, keeping the given order.
pub fn set_book_files(
    conn: &Connection,
    book_id: i64,
    kind: FileKind,
    filenames: &[String],
) -> Result<(), OperationError> {
    conn.execute(
        "DELETE FROM book_files WHERE book_id = ?1 AND kind = ?2",
        params![book_id, kind.as_str()],
    )?;
    for (position, filename) in filenames.iter().enumerate() {
        conn.execute(
            "INSERT INTO book_files (book_id, kind, filename, position) VALUES (?1, ?2, ?3, ?4)",
            params![book_id, kind.as_str(), filename, position as i64],
        )?;
    }
    Ok(())
}

// ── Relationship Operations ─────────────────────────────────────────────────

/// Whether an edge of the given type already exists from `source_id` to `target_id`.
pub fn relationship_exists(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    relationship_type: RelationshipType,
) -> Result<bool, OperationError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM book_relationships
             WHERE source_id = ?1 AND target_id = ?2 AND relationship_type = ?3)",
        params![source_id, target_id, relationship_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert a directed edge. Returns the generated ID.
pub fn insert_relationship(
    conn: &Connection,
    source_id: i64,
    target_id: i64,
    relationship_type: RelationshipType,
    notes: Option<&str>,
) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO book_relationships (source_id, target_id, relationship_type, notes)
         VALUES (?1, ?2, ?3, ?4)",
        params![source_id, target_id, relationship_type.as_str(), notes],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Delete every edge of one type. Returns the number deleted.
pub fn delete_relationships_of_type(
    conn: &Connection,
    relationship_type: RelationshipType,
) -> Result<usize, OperationError> {
    let deleted = conn.execute(
        "DELETE FROM book_relationships WHERE relationship_type = ?1",
        params![relationship_type.as_str()],
    )?;
    Ok(deleted)
}

// ── Import Run Operations ───────────────────────────────────────────────────

/// Start an import run. Returns the generated ID.
pub fn insert_import_run(
    conn: &Connection,
    source_filename: &str,
    mode: ImportMode,
) -> Result<i64, OperationError> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO import_runs (source_filename, mode, status, started_at)
         VALUES (?1, ?2, 'running', ?3)",
        params![source_filename, mode.as_str(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write the final counts and status of a run.
///
/// Only a run that is still `running` can be finalized.
pub fn finalize_import_run(conn: &Connection, run: &ImportRun) -> Result<(), OperationError> {
    let error_log = serde_json::to_string(&run.error_log)?;
    let changed = conn.execute(
        "UPDATE import_runs SET total_rows = ?2, processed = ?3, created = ?4, updated = ?5,
             skipped = ?6, failed = ?7, success_rate = ?8, error_log = ?9, status = ?10,
             finished_at = ?11
         WHERE id = ?1 AND status = 'running'",
        params![
            run.id,
            run.total_rows as i64,
            run.processed as i64,
            run.created as i64,
            run.updated as i64,
            run.skipped as i64,
            run.failed as i64,
            run.success_rate,
            error_log,
            run.status.as_str(),
            run.finished_at,
        ],
    )?;
    if changed == 0 {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM import_runs WHERE id = ?1)",
            params![run.id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(OperationError::RunFinalized(run.id));
        }
        return Err(OperationError::NotFound {
            entity_type: "import run".to_string(),
            id: run.id.to_string(),
        });
    }
    Ok(())
}

/// Record that a run created or updated a book.
pub fn link_run_book(
    conn: &Connection,
    run_id: i64,
    book_id: i64,
    action: RunAction,
) -> Result<(), OperationError> {
    // A book created earlier in the same run stays "created".
    conn.execute(
        "INSERT OR IGNORE INTO import_run_books (run_id, book_id, action) VALUES (?1, ?2, ?3)",
        params![run_id, book_id, action.as_str()],
    )?;
    Ok(())
}

// ── Quality Issue Operations ────────────────────────────────────────────────

/// Insert a quality issue. Returns the generated ID.
pub fn insert_quality_issue(
    conn: &Connection,
    book_id: i64,
    issue_type: &str,
    severity: Severity,
    message: &str,
) -> Result<i64, OperationError> {
    conn.execute(
        "INSERT INTO quality_issues (book_id, issue_type, severity, message)
         VALUES (?1, ?2, ?3, ?4)",
        params![book_id, issue_type, severity.as_str(), message],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Whether an identical unresolved issue is already recorded.
pub fn unresolved_issue_exists(
    conn: &Connection,
    book_id: i64,
    issue_type: &str,
    message: &str,
) -> Result<bool, OperationError> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM quality_issues
             WHERE book_id = ?1 AND issue_type = ?2 AND message = ?3 AND resolved = 0)",
        params![book_id, issue_type, message],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Delete unresolved issues of the given books. Returns the number deleted.
pub fn delete_unresolved_issues(conn: &Connection, book_ids: &[i64]) -> Result<usize, OperationError> {
    let mut stmt =
        conn.prepare_cached("DELETE FROM quality_issues WHERE book_id = ?1 AND resolved = 0")?;
    let mut deleted = 0;
    for book_id in book_ids {
        deleted += stmt.execute(params![book_id])?;
    }
    Ok(deleted)
}

/// Mark every unresolved issue of a type as resolved. Returns the number resolved.
pub fn resolve_issues_by_type(
    conn: &Connection,
    issue_type: &str,
    resolved_by: &str,
    notes: Option<&str>,
) -> Result<usize, OperationError> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE quality_issues
         SET resolved = 1, resolved_by = ?2, resolved_at = ?3, resolution_notes = ?4
         WHERE issue_type = ?1 AND resolved = 0",
        params![issue_type, resolved_by, now, notes],
    )?;
    Ok(changed)
}

// ── Seed Loading ────────────────────────────────────────────────────────────

/// Load all YAML reference data into the database.
///
/// Safe to call repeatedly (uses upsert).
pub fn seed_from_catalog(
    conn: &Connection,
    catalog_dir: &std::path::Path,
) -> Result<SeedStats, SeedError> {
    let seed = shelfmark_catalog::yaml::load_seed(catalog_dir)?;
    let mut stats = SeedStats::default();

    let tx = conn.unchecked_transaction().map_err(OperationError::from)?;
    for language in &seed.languages {
        upsert_language(&tx, language)?;
        stats.languages += 1;
    }
    for classification_type in &seed.classification_types {
        upsert_classification_type(&tx, classification_type)?;
        stats.classification_types += 1;
        stats.classification_values += classification_type.values.len();
    }
    tx.commit().map_err(OperationError::from)?;

    Ok(stats)
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Yaml(#[from] shelfmark_catalog::YamlError),
    #[error(transparent)]
    Db(#[from] OperationError),
}

/// Statistics from seeding the database.
#[derive(Debug, Default)]
pub struct SeedStats {
    pub languages: usize,
    pub classification_types: usize,
    pub classification_values: usize,
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn extra_to_json(extra: &BTreeMap<String, String>) -> Result<Option<String>, OperationError> {
    if extra.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(extra)?))
}

pub(crate) fn row_to_book(row: &rusqlite::Row<'_>) -> rusqlite::Result<Book> {
    let access_level: String = row.get(9)?;
    let extra: Option<String> = row.get(15)?;
    let extra_fields = match extra {
        Some(json) if !json.is_empty() => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(15, rusqlite::types::Type::Text, Box::new(e))
        })?,
        _ => BTreeMap::new(),
    };
    Ok(Book {
        id: row.get(0)?,
        internal_id: row.get(1)?,
        palm_code: row.get(2)?,
        title: row.get(3)?,
        subtitle: row.get(4)?,
        translated_title: row.get(5)?,
        description: row.get(6)?,
        publication_year: row.get(7)?,
        pages: row.get(8)?,
        access_level: AccessLevel::parse(&access_level).unwrap_or_default(),
        is_active: row.get(10)?,
        is_featured: row.get(11)?,
        sort_order: row.get(12)?,
        publisher_id: row.get(13)?,
        collection_id: row.get(14)?,
        extra_fields,
        created_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
