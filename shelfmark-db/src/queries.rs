//! Read queries for the catalog database.
//!
//! Provides import-run history, audit scoping, inference candidates, export
//! paging, issue listing and overall counts.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use shelfmark_catalog::options::ExportFilter;
use shelfmark_catalog::types::*;

use crate::operations::OperationError;

// ── Import Runs ─────────────────────────────────────────────────────────────

const RUN_COLUMNS: &str = "id, source_filename, mode, total_rows, processed, created, updated,
    skipped, failed, success_rate, error_log, status, started_at, finished_at";

/// Fetch one import run.
pub fn get_import_run(conn: &Connection, id: i64) -> Result<Option<ImportRun>, OperationError> {
    let run = conn
        .query_row(
            &format!("SELECT {RUN_COLUMNS} FROM import_runs WHERE id = ?1"),
            params![id],
            row_to_import_run,
        )
        .optional()?;
    Ok(run)
}

/// List import runs, most recent first.
pub fn list_import_runs(
    conn: &Connection,
    limit: Option<u32>,
) -> Result<Vec<ImportRun>, OperationError> {
    let limit = limit.unwrap_or(20);
    let mut stmt = conn.prepare(&format!(
        "SELECT {RUN_COLUMNS} FROM import_runs ORDER BY id DESC LIMIT {limit}"
    ))?;
    let rows = stmt.query_map([], row_to_import_run)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// IDs of the books an import run created or updated.
pub fn run_book_ids(conn: &Connection, run_id: i64) -> Result<Vec<i64>, OperationError> {
    let mut stmt =
        conn.prepare("SELECT book_id FROM import_run_books WHERE run_id = ?1 ORDER BY book_id")?;
    let rows = stmt.query_map(params![run_id], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Books ───────────────────────────────────────────────────────────────────

/// IDs of every book, in ID order.
pub fn all_book_ids(conn: &Connection) -> Result<Vec<i64>, OperationError> {
    let mut stmt = conn.prepare("SELECT id FROM books ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// An active book eligible for translation inference.
#[derive(Debug, Clone)]
pub struct TranslationCandidate {
    pub book_id: i64,
    pub translated_title: String,
    pub language_ids: Vec<i64>,
}

/// Active books with a non-blank translated title, with their languages.
pub fn translation_candidates(
    conn: &Connection,
) -> Result<Vec<TranslationCandidate>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT id, translated_title FROM books
         WHERE is_active = 1 AND translated_title IS NOT NULL AND TRIM(translated_title) != ''
         ORDER BY id",
    )?;
    let books = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut lang_stmt = conn.prepare_cached(
        "SELECT language_id FROM book_languages WHERE book_id = ?1 ORDER BY position",
    )?;
    let mut candidates = Vec::with_capacity(books.len());
    for (book_id, translated_title) in books {
        let language_ids = lang_stmt
            .query_map(params![book_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        candidates.push(TranslationCandidate {
            book_id,
            translated_title,
            language_ids,
        });
    }
    Ok(candidates)
}

/// External keys shared by more than one active book.
#[derive(Debug, Default)]
pub struct DuplicateKeys {
    pub internal_ids: HashMap<String, i64>,
    pub palm_codes: HashMap<String, i64>,
}

pub fn duplicate_key_counts(conn: &Connection) -> Result<DuplicateKeys, OperationError> {
    let collect = |column: &str| -> Result<HashMap<String, i64>, OperationError> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {column}, COUNT(*) FROM books
             WHERE is_active = 1 AND {column} IS NOT NULL AND {column} != ''
             GROUP BY {column} HAVING COUNT(*) > 1"
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<HashMap<_, _>, _>>().map_err(Into::into)
    };
    Ok(DuplicateKeys {
        internal_ids: collect("internal_id")?,
        palm_codes: collect("palm_code")?,
    })
}

/// An outgoing edge plus the state of its target.
#[derive(Debug, Clone)]
pub struct RelationshipRow {
    pub relationship: BookRelationship,
    /// `None` when the target no longer exists.
    pub target_active: Option<bool>,
}

/// Outgoing edges of a book.
pub fn relationships_from(
    conn: &Connection,
    book_id: i64,
) -> Result<Vec<RelationshipRow>, OperationError> {
    let mut stmt = conn.prepare_cached(
        "SELECT r.id, r.source_id, r.target_id, r.relationship_type, r.notes, r.created_at,
                b.is_active
         FROM book_relationships r LEFT JOIN books b ON b.id = r.target_id
         WHERE r.source_id = ?1 ORDER BY r.id",
    )?;
    let rows = stmt.query_map(params![book_id], |row| {
        Ok(RelationshipRow {
            relationship: row_to_relationship(row)?,
            target_active: row.get(6)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Every edge of one type, in ID order.
pub fn relationships_of_type(
    conn: &Connection,
    relationship_type: RelationshipType,
) -> Result<Vec<BookRelationship>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, target_id, relationship_type, notes, created_at
         FROM book_relationships WHERE relationship_type = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![relationship_type.as_str()], row_to_relationship)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Export Paging ───────────────────────────────────────────────────────────

fn filter_clause(filter: &ExportFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(collection) = &filter.collection {
        clauses.push("collection_id IN (SELECT id FROM collections WHERE name = ?)".to_string());
        values.push(Value::Text(collection.clone()));
    }
    if let Some(language) = &filter.language {
        clauses.push(
            "id IN (SELECT bl.book_id FROM book_languages bl
                    JOIN languages l ON l.id = bl.language_id
                    WHERE l.name = ? OR l.iso_code = ?)"
                .to_string(),
        );
        values.push(Value::Text(language.clone()));
        values.push(Value::Text(language.clone()));
    }
    if let Some(access_level) = filter.access_level {
        clauses.push("access_level = ?".to_string());
        values.push(Value::Text(access_level.as_str().to_string()));
    }
    if let Some(from) = filter.created_from {
        clauses.push("date(created_at) >= ?".to_string());
        values.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = filter.created_to {
        clauses.push("date(created_at) <= ?".to_string());
        values.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    if let Some(from) = filter.year_from {
        clauses.push("publication_year >= ?".to_string());
        values.push(Value::Integer(from.into()));
    }
    if let Some(to) = filter.year_to {
        clauses.push("publication_year <= ?".to_string());
        values.push(Value::Integer(to.into()));
    }
    if let Some(active) = filter.active {
        clauses.push("is_active = ?".to_string());
        values.push(Value::Integer(active.into()));
    }
    if let Some(featured) = filter.featured {
        clauses.push("is_featured = ?".to_string());
        values.push(Value::Integer(featured.into()));
    }

    if clauses.is_empty() {
        ("1 = 1".to_string(), values)
    } else {
        (clauses.join(" AND "), values)
    }
}

/// Number of books matching an export filter.
pub fn count_books(conn: &Connection, filter: &ExportFilter) -> Result<u64, OperationError> {
    let (clause, values) = filter_clause(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM books WHERE {clause}"),
        params_from_iter(values),
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// One keyset page of matching book IDs: IDs greater than `after_id`, in
/// ascending order, at most `limit` of them.
pub fn export_page(
    conn: &Connection,
    filter: &ExportFilter,
    after_id: i64,
    limit: usize,
) -> Result<Vec<i64>, OperationError> {
    let (clause, mut values) = filter_clause(filter);
    values.push(Value::Integer(after_id));
    values.push(Value::Integer(limit as i64));
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM books WHERE {clause} AND id > ? ORDER BY id LIMIT ?"
    ))?;
    let rows = stmt.query_map(params_from_iter(values), |row| row.get(0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// ── Quality Issues ──────────────────────────────────────────────────────────

/// Which issues `list_issues` returns.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    pub severity: Option<Severity>,
    pub issue_type: Option<String>,
    pub book_id: Option<i64>,
    pub include_resolved: bool,
    pub limit: Option<u32>,
}

/// List quality issues, most severe first.
pub fn list_issues(
    conn: &Connection,
    filter: &IssueFilter,
) -> Result<Vec<QualityIssue>, OperationError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    if !filter.include_resolved {
        clauses.push("resolved = 0");
    }
    if let Some(severity) = filter.severity {
        clauses.push("severity = ?");
        values.push(Value::Text(severity.as_str().to_string()));
    }
    if let Some(issue_type) = &filter.issue_type {
        clauses.push("issue_type = ?");
        values.push(Value::Text(issue_type.clone()));
    }
    if let Some(book_id) = filter.book_id {
        clauses.push("book_id = ?");
        values.push(Value::Integer(book_id));
    }
    let clause = if clauses.is_empty() {
        "1 = 1".to_string()
    } else {
        clauses.join(" AND ")
    };
    let limit = filter.limit.unwrap_or(100);

    let mut stmt = conn.prepare(&format!(
        "SELECT id, book_id, issue_type, severity, message, resolved, resolved_by,
                resolved_at, resolution_notes, created_at
         FROM quality_issues WHERE {clause}
         ORDER BY CASE severity WHEN 'critical' THEN 0 WHEN 'warning' THEN 1 ELSE 2 END,
                  book_id, id
         LIMIT {limit}"
    ))?;
    let rows = stmt.query_map(params_from_iter(values), row_to_issue)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Unresolved issue counts per severity.
pub fn unresolved_issue_counts(
    conn: &Connection,
) -> Result<Vec<(Severity, i64)>, OperationError> {
    let mut stmt = conn.prepare(
        "SELECT severity, COUNT(*) FROM quality_issues WHERE resolved = 0
         GROUP BY severity",
    )?;
    let rows = stmt.query_map([], |row| {
        let severity: String = row.get(0)?;
        Ok((Severity::from_str_loose(&severity), row.get(1)?))
    })?;
    let mut counts = rows.collect::<Result<Vec<_>, _>>()?;
    counts.sort_by_key(|(severity, _)| *severity);
    Ok(counts)
}

// ── Stats ───────────────────────────────────────────────────────────────────

/// Get summary statistics for the catalog.
pub fn catalog_stats(conn: &Connection) -> Result<CatalogStats, OperationError> {
    let count = |sql: &str| -> Result<i64, OperationError> {
        Ok(conn.query_row(sql, [], |r| r.get(0))?)
    };

    Ok(CatalogStats {
        books: count("SELECT COUNT(*) FROM books")?,
        active_books: count("SELECT COUNT(*) FROM books WHERE is_active = 1")?,
        publishers: count("SELECT COUNT(*) FROM publishers")?,
        creators: count("SELECT COUNT(*) FROM creators")?,
        languages: count("SELECT COUNT(*) FROM languages")?,
        relationships: count("SELECT COUNT(*) FROM book_relationships")?,
        import_runs: count("SELECT COUNT(*) FROM import_runs")?,
        unresolved_issues: count("SELECT COUNT(*) FROM quality_issues WHERE resolved = 0")?,
    })
}

#[derive(Debug)]
pub struct CatalogStats {
    pub books: i64,
    pub active_books: i64,
    pub publishers: i64,
    pub creators: i64,
    pub languages: i64,
    pub relationships: i64,
    pub import_runs: i64,
    pub unresolved_issues: i64,
}

// ── Row Mapping Helpers ─────────────────────────────────────────────────────

fn row_to_import_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImportRun> {
    let mode: String = row.get(2)?;
    let error_log: Option<String> = row.get(10)?;
    let status: String = row.get(11)?;
    let error_log = match error_log {
        Some(json) if !json.is_empty() => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?,
        _ => ErrorLog::default(),
    };
    Ok(ImportRun {
        id: row.get(0)?,
        source_filename: row.get(1)?,
        mode: mode.parse().unwrap_or_default(),
        total_rows: row.get::<_, i64>(3)? as u64,
        processed: row.get::<_, i64>(4)? as u64,
        created: row.get::<_, i64>(5)? as u64,
        updated: row.get::<_, i64>(6)? as u64,
        skipped: row.get::<_, i64>(7)? as u64,
        failed: row.get::<_, i64>(8)? as u64,
        success_rate: row.get(9)?,
        error_log,
        status: RunStatus::from_str_loose(&status),
        started_at: row.get(12)?,
        finished_at: row.get(13)?,
    })
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookRelationship> {
    let relationship_type: String = row.get(3)?;
    Ok(BookRelationship {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relationship_type: RelationshipType::from_str_loose(&relationship_type),
        notes: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_issue(row: &rusqlite::Row<'_>) -> rusqlite::Result<QualityIssue> {
    let severity: String = row.get(3)?;
    Ok(QualityIssue {
        id: row.get(0)?,
        book_id: row.get(1)?,
        issue_type: row.get(2)?,
        severity: Severity::from_str_loose(&severity),
        message: row.get(4)?,
        resolved: row.get(5)?,
        resolved_by: row.get(6)?,
        resolved_at: row.get(7)?,
        resolution_notes: row.get(8)?,
        created_at: row.get(9)?,
    })
}
