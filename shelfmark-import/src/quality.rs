//! Data quality auditing.
//!
//! A quality pass walks a set of books, runs every [`QualityRule`] over each
//! one and records the findings as quality issues. Catalog data is only read;
//! the pass writes nothing but issue rows. A rule that fails on a record is
//! reported as a `rule_failure` warning for that record and the sweep goes on.

use std::collections::BTreeMap;

use chrono::Datelike;
use rusqlite::Connection;
use shelfmark_catalog::options::{QualityOptions, QualityScope};
use shelfmark_catalog::types::{BookDetail, CreatorRole, FileKind, Severity};
use shelfmark_db::queries::{self, DuplicateKeys};
use shelfmark_db::operations::{self, OperationError};
use thiserror::Error;

use crate::files::FileStore;
use crate::progress::ImportProgress;

/// Earliest publication year accepted as plausible.
pub const EARLIEST_PLAUSIBLE_YEAR: i32 = 1450;

/// Issue type recorded when a rule itself fails.
pub const RULE_FAILURE: &str = "rule_failure";

#[derive(Debug, Error)]
pub enum QualityError {
    #[error("Database error: {0}")]
    Db(#[from] OperationError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("File store error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Import run {0} not found")]
    RunNotFound(i64),
}

/// One finding of a rule, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDraft {
    pub issue_type: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl IssueDraft {
    pub fn new(issue_type: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
        }
    }
}

/// Shared state for one quality pass.
pub struct RuleContext<'a> {
    pub conn: &'a Connection,
    /// Media storage. Without one, referenced files are not checked.
    pub files: Option<&'a dyn FileStore>,
    pub duplicates: &'a DuplicateKeys,
    pub current_year: i32,
}

/// A check over one book and its relations.
pub trait QualityRule {
    fn name(&self) -> &'static str;

    /// Inspect a book. Returns zero or more findings.
    fn check(&self, ctx: &RuleContext<'_>, book: &BookDetail)
    -> Result<Vec<IssueDraft>, QualityError>;
}

/// The standard rule set.
pub fn default_rules() -> Vec<Box<dyn QualityRule>> {
    vec![
        Box::new(RequiredFieldsRule),
        Box::new(DuplicateKeyRule),
        Box::new(MediaFilesRule),
        Box::new(OrphanRelationshipRule),
        Box::new(PublicationYearRule),
    ]
}

// ── Rules ───────────────────────────────────────────────────────────────────

/// Title, authors, language and publisher presence.
pub struct RequiredFieldsRule;

impl QualityRule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "required_fields"
    }

    fn check(
        &self,
        _ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        let mut issues = Vec::new();
        if book.book.title.trim().is_empty() {
            issues.push(IssueDraft::new(
                "missing_title",
                Severity::Critical,
                "Book has no title",
            ));
        }
        if book.creators_with_role(CreatorRole::Author).next().is_none() {
            issues.push(IssueDraft::new(
                "missing_authors",
                Severity::Warning,
                "Book has no authors",
            ));
        }
        if book.languages.is_empty() {
            issues.push(IssueDraft::new(
                "missing_language",
                Severity::Warning,
                "Book has no language",
            ));
        }
        if book.publisher.is_none() {
            issues.push(IssueDraft::new(
                "missing_publisher",
                Severity::Info,
                "Book has no publisher",
            ));
        }
        Ok(issues)
    }
}

/// External keys shared with other active books.
pub struct DuplicateKeyRule;

impl QualityRule for DuplicateKeyRule {
    fn name(&self) -> &'static str {
        "duplicate_keys"
    }

    fn check(
        &self,
        ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        let mut issues = Vec::new();
        if !book.book.is_active {
            return Ok(issues);
        }
        let internal = book.book.internal_id.as_ref();
        if let Some((key, count)) = internal.and_then(|k| ctx.duplicates.internal_ids.get_key_value(k)) {
            issues.push(IssueDraft::new(
                "duplicate_internal_id",
                Severity::Critical,
                format!("Internal ID '{key}' is shared by {count} active books"),
            ));
        }
        let palm = book.book.palm_code.as_ref();
        if let Some((key, count)) = palm.and_then(|k| ctx.duplicates.palm_codes.get_key_value(k)) {
            issues.push(IssueDraft::new(
                "duplicate_palm_code",
                Severity::Warning,
                format!("Palm code '{key}' is shared by {count} active books"),
            ));
        }
        Ok(issues)
    }
}

/// PDF and thumbnail presence, and referenced files missing from storage.
pub struct MediaFilesRule;

impl QualityRule for MediaFilesRule {
    fn name(&self) -> &'static str {
        "media_files"
    }

    fn check(
        &self,
        ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        let mut issues = Vec::new();
        if book.files_of_kind(FileKind::Pdf).next().is_none() {
            issues.push(IssueDraft::new(
                "no_pdf_file",
                Severity::Warning,
                "Book has no PDF file",
            ));
        }
        if book.files_of_kind(FileKind::Thumbnail).next().is_none() {
            issues.push(IssueDraft::new(
                "missing_thumbnail",
                Severity::Info,
                "Book has no thumbnail",
            ));
        }
        if let Some(store) = ctx.files {
            for file in &book.files {
                if !store.exists(&file.filename)? {
                    issues.push(IssueDraft::new(
                        "missing_file",
                        Severity::Critical,
                        format!("{} file '{}' not found in storage", file.kind.as_str(), file.filename),
                    ));
                }
            }
        }
        Ok(issues)
    }
}

/// Edges pointing at inactive or deleted books.
pub struct OrphanRelationshipRule;

impl QualityRule for OrphanRelationshipRule {
    fn name(&self) -> &'static str {
        "orphan_relationships"
    }

    fn check(
        &self,
        ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        let mut issues = Vec::new();
        for row in queries::relationships_from(ctx.conn, book.book.id)? {
            let state = match row.target_active {
                Some(true) => continue,
                Some(false) => "inactive",
                None => "missing",
            };
            issues.push(IssueDraft::new(
                "orphan_relationship",
                Severity::Warning,
                format!(
                    "{} relationship points to {} book {}",
                    row.relationship.relationship_type.as_str(),
                    state,
                    row.relationship.target_id
                ),
            ));
        }
        Ok(issues)
    }
}

/// Missing or out-of-range publication year.
pub struct PublicationYearRule;

impl QualityRule for PublicationYearRule {
    fn name(&self) -> &'static str {
        "publication_year"
    }

    fn check(
        &self,
        ctx: &RuleContext<'_>,
        book: &BookDetail,
    ) -> Result<Vec<IssueDraft>, QualityError> {
        let issue = match book.book.publication_year {
            None => IssueDraft::new(
                "missing_publication_year",
                Severity::Info,
                "Book has no publication year",
            ),
            Some(year) if year < EARLIEST_PLAUSIBLE_YEAR || year > ctx.current_year + 1 => {
                IssueDraft::new(
                    "implausible_year",
                    Severity::Warning,
                    format!("Publication year {year} is implausible"),
                )
            }
            Some(_) => return Ok(Vec::new()),
        };
        Ok(vec![issue])
    }
}

// ── Audit ───────────────────────────────────────────────────────────────────

/// Summary of a quality pass.
#[derive(Debug, Default, Clone)]
pub struct QualityReport {
    pub total_checked: usize,
    /// Findings of this pass, including ones already recorded.
    pub total_issues: usize,
    /// Findings stored by this pass.
    pub new_issues: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub rule_failures: usize,
    /// Requested books that no longer exist.
    pub skipped_records: usize,
    /// Unresolved issues deleted by `clear_existing`.
    pub cleared: usize,
}

impl QualityReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    pub fn has_critical(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    /// Add the issue counts of one book's audit.
    fn absorb(&mut self, other: QualityReport) {
        self.total_issues += other.total_issues;
        self.new_issues += other.new_issues;
        self.rule_failures += other.rule_failures;
        for (severity, count) in other.by_severity {
            *self.by_severity.entry(severity).or_default() += count;
        }
        for (issue_type, count) in other.by_type {
            *self.by_type.entry(issue_type).or_default() += count;
        }
    }
}

/// Book IDs covered by a scope.
pub fn scope_book_ids(conn: &Connection, scope: &QualityScope) -> Result<Vec<i64>, QualityError> {
    match scope {
        QualityScope::All => Ok(queries::all_book_ids(conn)?),
        QualityScope::Books(ids) => {
            let mut ids = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            Ok(ids)
        }
        QualityScope::ImportRun(run_id) => {
            if queries::get_import_run(conn, *run_id)?.is_none() {
                return Err(QualityError::RunNotFound(*run_id));
            }
            Ok(queries::run_book_ids(conn, *run_id)?)
        }
    }
}

/// Run the standard rules over a scope.
pub fn run_quality_checks(
    conn: &Connection,
    scope: &QualityScope,
    options: &QualityOptions,
    files: Option<&dyn FileStore>,
    progress: Option<&dyn ImportProgress>,
) -> Result<QualityReport, QualityError> {
    run_rules(conn, scope, options, files, &default_rules(), progress)
}

/// Run a given rule list over a scope.
pub fn run_rules(
    conn: &Connection,
    scope: &QualityScope,
    options: &QualityOptions,
    files: Option<&dyn FileStore>,
    rules: &[Box<dyn QualityRule>],
    progress: Option<&dyn ImportProgress>,
) -> Result<QualityReport, QualityError> {
    let book_ids = scope_book_ids(conn, scope)?;
    let duplicates = queries::duplicate_key_counts(conn)?;
    let ctx = RuleContext {
        conn,
        files,
        duplicates: &duplicates,
        current_year: chrono::Utc::now().year(),
    };

    if let Some(p) = progress {
        p.on_phase(&format!("Checking {} books", book_ids.len()));
    }

    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = audit_books(&ctx, &book_ids, options, rules, progress).and_then(|report| {
        conn.execute_batch("COMMIT")?;
        Ok(report)
    });
    match result {
        Ok(report) => {
            if let Some(p) = progress {
                p.on_complete(&format!(
                    "Quality check complete: {} books, {} issues",
                    report.total_checked, report.total_issues
                ));
            }
            Ok(report)
        }
        Err(e) => {
            // A failed COMMIT leaves the transaction open.
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

fn audit_books(
    ctx: &RuleContext<'_>,
    book_ids: &[i64],
    options: &QualityOptions,
    rules: &[Box<dyn QualityRule>],
    progress: Option<&dyn ImportProgress>,
) -> Result<QualityReport, QualityError> {
    let mut report = QualityReport::default();

    if options.clear_existing {
        report.cleared = operations::delete_unresolved_issues(ctx.conn, book_ids)?;
        log::debug!("Cleared {} unresolved issues", report.cleared);
    }

    for (i, &book_id) in book_ids.iter().enumerate() {
        ctx.conn.execute_batch("SAVEPOINT quality_book")?;
        let mut book_report = QualityReport::default();
        match audit_book(ctx, book_id, rules, &mut book_report) {
            Ok(found) => {
                ctx.conn.execute_batch("RELEASE quality_book")?;
                if found {
                    report.total_checked += 1;
                    report.absorb(book_report);
                } else {
                    log::warn!("Book {} not found, skipping", book_id);
                    report.skipped_records += 1;
                }
            }
            Err(e) => {
                ctx.conn
                    .execute_batch("ROLLBACK TO quality_book; RELEASE quality_book")?;
                log::warn!("Book {} could not be audited: {}", book_id, e);
                report.total_checked += 1;
                report.rule_failures += 1;
                let draft = IssueDraft::new(
                    RULE_FAILURE,
                    Severity::Warning,
                    format!("Record could not be audited: {e}"),
                );
                if let Err(e) = record(ctx.conn, &mut report, book_id, &draft) {
                    log::warn!("Could not record failure for book {}: {}", book_id, e);
                }
            }
        }

        if let Some(p) = progress {
            p.on_row(i + 1, book_ids.len());
        }
    }

    Ok(report)
}

/// Run every rule on one book. Returns `false` when the book does not exist.
fn audit_book(
    ctx: &RuleContext<'_>,
    book_id: i64,
    rules: &[Box<dyn QualityRule>],
    report: &mut QualityReport,
) -> Result<bool, QualityError> {
    let Some(detail) = operations::get_book_detail(ctx.conn, book_id)? else {
        return Ok(false);
    };

    for rule in rules {
        let drafts = match rule.check(ctx, &detail) {
            Ok(drafts) => drafts,
            Err(e) => {
                log::warn!("Rule '{}' failed on book {}: {}", rule.name(), book_id, e);
                report.rule_failures += 1;
                vec![IssueDraft::new(
                    RULE_FAILURE,
                    Severity::Warning,
                    format!("Rule '{}' failed: {}", rule.name(), e),
                )]
            }
        };
        for draft in drafts {
            record(ctx.conn, report, book_id, &draft)?;
        }
    }
    Ok(true)
}

fn record(
    conn: &Connection,
    report: &mut QualityReport,
    book_id: i64,
    draft: &IssueDraft,
) -> Result<(), QualityError> {
    report.total_issues += 1;
    *report.by_severity.entry(draft.severity).or_default() += 1;
    *report.by_type.entry(draft.issue_type.to_string()).or_default() += 1;
    if !operations::unresolved_issue_exists(conn, book_id, draft.issue_type, &draft.message)? {
        operations::insert_quality_issue(
            conn,
            book_id,
            draft.issue_type,
            draft.severity,
            &draft.message,
        )?;
        report.new_issues += 1;
    }
    Ok(())
}

/// Mark every unresolved issue of a type as resolved. Returns the count.
pub fn resolve_issues(
    conn: &Connection,
    issue_type: &str,
    resolved_by: &str,
    notes: Option<&str>,
) -> Result<usize, QualityError> {
    let resolved = operations::resolve_issues_by_type(conn, issue_type, resolved_by, notes)?;
    log::info!(
        "Resolved {} '{}' issues (by {})",
        resolved,
        issue_type,
        resolved_by
    );
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_default_to_zero() {
        let mut report = QualityReport::default();
        assert_eq!(report.count(Severity::Critical), 0);
        assert!(!report.has_critical());
        report.by_severity.insert(Severity::Critical, 2);
        assert!(report.has_critical());
    }

    #[test]
    fn standard_rules_have_distinct_names() {
        let rules = default_rules();
        let mut names: Vec<_> = rules.iter().map(|r| r.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }
}
