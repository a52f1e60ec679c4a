//! Batch execution of an import, and its dry-run preview.
//!
//! Rows are committed in chunks. Each row runs inside a savepoint so an
//! invalid row discards only its own writes; a storage failure rolls back the
//! whole chunk and marks every row in it failed. Every row ends as exactly one
//! of created, updated, skipped or failed.

use std::path::Path;

use rusqlite::Connection;
use shelfmark_catalog::options::{ImportOptions, OptionsError};
use shelfmark_catalog::types::*;
use shelfmark_db::operations::{self, OperationError};
use thiserror::Error;

use crate::normalize::{CandidateBook, HeaderMap, normalize_row};
use crate::plan::{
    FieldChange, ImportPlan, Matched, PlanAction, Planner, classification_key, creators_key,
    decide, files_key,
};
use crate::progress::ImportProgress;
use crate::resolve::{EntityResolver, ResolvedBook, ids};
use crate::validate::{self, ValidationReport};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),
    #[error("Database error: {0}")]
    Db(#[from] OperationError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("File failed structural validation: {}", .0.join("; "))]
    Structural(Vec<String>),
}

/// Up to this many sample creates and updates are kept in a preview.
pub const PREVIEW_SAMPLES: usize = 10;

// ── Row Planning ────────────────────────────────────────────────────────────

/// A row ready to execute.
struct RowPlan {
    plan: ImportPlan,
    candidate: CandidateBook,
    resolved: ResolvedBook,
    matched: Option<Matched>,
    warnings: Vec<RowIssue>,
}

enum RowResult {
    Ready(Box<RowPlan>),
    Invalid(Vec<RowIssue>),
}

/// Normalize, match, resolve and plan one row. Only storage failures are
/// returned as `Err`.
fn plan_row(
    conn: &Connection,
    planner: &Planner,
    resolver: &mut EntityResolver,
    headers: &HeaderMap,
    row: usize,
    record: &[String],
) -> Result<RowResult, OperationError> {
    let candidate = normalize_row(headers, row, record);
    if candidate.has_errors() {
        return Ok(RowResult::Invalid(candidate.issues));
    }
    if planner.mode() != ImportMode::CreateDuplicates && !candidate.has_key() {
        return Ok(RowResult::Invalid(vec![RowIssue::error(
            row,
            None,
            "row has neither an Internal ID nor a Palm Code",
        )]));
    }

    let matched = planner.find_match(conn, &candidate)?;
    let action = decide(planner.mode(), matched.is_some());

    // Skipped rows are not resolved, so they never create lookup entities.
    let resolved = if action == PlanAction::Skip {
        ResolvedBook::default()
    } else {
        if action == PlanAction::Create && candidate.title.is_none() {
            return Ok(RowResult::Invalid(vec![RowIssue::error(
                row,
                Some("Title"),
                "a title is required to create a record",
            )]));
        }
        let resolved = resolver.resolve_book(conn, &candidate)?;
        if resolved.has_errors() {
            let mut issues = candidate.issues.clone();
            issues.extend(resolved.issues);
            return Ok(RowResult::Invalid(issues));
        }
        resolved
    };

    let plan = planner.plan(&candidate, &resolved, matched.as_ref());
    let mut warnings = candidate.issues.clone();
    warnings.extend(resolved.issues.iter().cloned());
    Ok(RowResult::Ready(Box::new(RowPlan {
        plan,
        candidate,
        resolved,
        matched,
        warnings,
    })))
}

// ── Plan Execution ──────────────────────────────────────────────────────────

/// Apply one plan. Returns the book it touched, if any.
fn apply_plan(
    conn: &Connection,
    run_id: i64,
    row: &RowPlan,
) -> Result<Option<(i64, RunAction)>, OperationError> {
    let RowPlan {
        plan,
        candidate,
        resolved,
        matched,
        ..
    } = row;

    match plan.action {
        PlanAction::Skip => Ok(None),
        PlanAction::Create => {
            let mut fields = BookFields::new("");
            candidate.apply_scalars(&mut fields);
            fields.publisher_id = resolved.publisher.as_ref().and_then(|r| r.id);
            fields.collection_id = resolved.collection.as_ref().and_then(|r| r.id);
            let book_id = operations::insert_book(conn, &fields)?;
            write_relations(conn, book_id, candidate, resolved, None)?;
            operations::link_run_book(conn, run_id, book_id, RunAction::Created)?;
            Ok(Some((book_id, RunAction::Created)))
        }
        PlanAction::Update => {
            let detail = matched
                .as_ref()
                .and_then(|m| m.detail.as_ref())
                .ok_or_else(|| OperationError::NotFound {
                    entity_type: "book".to_string(),
                    id: format!("row {}", plan.row),
                })?;
            let book_id = detail.book.id;
            if !plan.changes.is_empty() {
                let mut fields = BookFields::from(&detail.book);
                candidate.apply_scalars(&mut fields);
                if let Some(publisher) = &resolved.publisher {
                    fields.publisher_id = publisher.id;
                }
                if let Some(collection) = &resolved.collection {
                    fields.collection_id = collection.id;
                }
                operations::update_book(conn, book_id, &fields)?;
                write_relations(conn, book_id, candidate, resolved, Some(plan.changes.as_slice()))?;
            }
            operations::link_run_book(conn, run_id, book_id, RunAction::Updated)?;
            Ok(Some((book_id, RunAction::Updated)))
        }
    }
}

/// Replace the relations a row provides. With `changes`, only relations
/// that appear in the diff are written.
fn write_relations(
    conn: &Connection,
    book_id: i64,
    candidate: &CandidateBook,
    resolved: &ResolvedBook,
    changes: Option<&[FieldChange]>,
) -> Result<(), OperationError> {
    let wanted = |key: &str| changes.is_none_or(|c| c.iter().any(|change| change.field == key));

    if !resolved.languages.is_empty() && wanted("languages") {
        operations::set_book_languages(conn, book_id, &ids(&resolved.languages))?;
    }
    for (role, refs) in &resolved.creators {
        if wanted(&creators_key(*role)) {
            operations::set_book_creators(conn, book_id, *role, &ids(refs))?;
        }
    }
    for (type_name, classification) in &resolved.classifications {
        if let Some(type_id) = classification.type_id {
            if wanted(&classification_key(type_name)) {
                operations::set_book_classifications(
                    conn,
                    book_id,
                    type_id,
                    &ids(&classification.values),
                )?;
            }
        }
    }
    if !resolved.locations.is_empty() && wanted("locations") {
        operations::set_book_locations(conn, book_id, &ids(&resolved.locations))?;
    }
    for (kind, names) in &candidate.files {
        if !names.is_empty() && wanted(&files_key(*kind)) {
            operations::set_book_files(conn, book_id, *kind, names)?;
        }
    }
    Ok(())
}

// ── Import ──────────────────────────────────────────────────────────────────

/// Counts and log entries of one chunk, merged into the run on commit.
#[derive(Debug, Default)]
struct ChunkTally {
    created: u64,
    updated: u64,
    skipped: u64,
    failed: u64,
    log: Vec<RowIssue>,
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Import a delimited file into the catalog.
///
/// The run is recorded in `import_runs` from start to finish. A file that
/// fails structural validation yields a `failed` run without touching any
/// record; that is returned as `Ok`, like every other finished run.
pub fn run_import(
    conn: &Connection,
    path: &Path,
    options: &ImportOptions,
    progress: Option<&dyn ImportProgress>,
) -> Result<ImportRun, ImportError> {
    options.validate()?;

    let filename = source_name(path);
    let run_id = operations::insert_import_run(conn, &filename, options.mode)?;
    let mut run = ImportRun {
        id: run_id,
        source_filename: filename.clone(),
        mode: options.mode,
        total_rows: 0,
        processed: 0,
        created: 0,
        updated: 0,
        skipped: 0,
        failed: 0,
        success_rate: 0.0,
        error_log: ErrorLog::default(),
        status: RunStatus::Running,
        started_at: chrono::Utc::now().to_rfc3339(),
        finished_at: None,
    };

    let file = match validate::inspect_file(path, options.delimiter) {
        Ok(file) => file,
        Err(report) => {
            log::warn!("{} failed structural validation", filename);
            for message in report.error_messages() {
                run.error_log.push(RowIssue::error(0, None, message));
            }
            finish_run(conn, &mut run, true, 0)?;
            return Ok(run);
        }
    };

    let rows: Vec<(usize, &[String])> = file.data_rows().collect();
    run.total_rows = rows.len() as u64;
    if let Some(p) = progress {
        p.on_phase(&format!(
            "Importing {} ({} rows, {} mode)",
            filename,
            rows.len(),
            options.mode
        ));
    }

    let planner = Planner::new(options.mode);
    let mut resolver =
        EntityResolver::new(options.create_missing_relations, options.skip_unresolved_fields);
    let mut done = 0usize;
    let mut aborted = false;
    let mut unattempted = 0u64;

    for chunk in rows.chunks(options.chunk_size) {
        let mut tally = ChunkTally::default();
        let mut stopped_at = None;

        let result = conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(OperationError::from)
            .and_then(|()| {
                run_chunk(
                    conn,
                    &planner,
                    &mut resolver,
                    &file.headers,
                    run_id,
                    chunk,
                    options,
                    &mut tally,
                    &mut stopped_at,
                )
            })
            .and_then(|()| conn.execute_batch("COMMIT").map_err(OperationError::from));

        match result {
            Ok(()) => {
                run.created += tally.created;
                run.updated += tally.updated;
                run.skipped += tally.skipped;
                run.failed += tally.failed;
                for issue in tally.log {
                    run.error_log.push(issue);
                }
            }
            Err(e) => {
                // A failed COMMIT leaves the transaction open.
                let _ = conn.execute_batch("ROLLBACK");
                resolver.invalidate();
                // Rows past a fail-fast stop were never attempted; they are
                // counted as skipped below.
                let attempted = stopped_at.map_or(chunk.len(), |index| index + 1);
                log::warn!(
                    "Chunk of {} rows starting at row {} rolled back: {}",
                    attempted,
                    chunk[0].0,
                    e
                );
                run.failed += attempted as u64;
                for (row, _) in &chunk[..attempted] {
                    run.error_log.push(RowIssue::error(
                        *row,
                        None,
                        format!("chunk rolled back after storage error: {e}"),
                    ));
                }
            }
        }

        if let Some(index) = stopped_at {
            // Rows after the aborting row are never attempted.
            let attempted = done + index + 1;
            let remaining = rows.len() - attempted;
            run.skipped += remaining as u64;
            unattempted = remaining as u64;
            let row = chunk[index].0;
            run.error_log.push(RowIssue::error(
                row,
                None,
                format!("import stopped at row {row}; {remaining} remaining rows not attempted"),
            ));
            aborted = true;
            break;
        }

        done += chunk.len();
        if let Some(p) = progress {
            p.on_row(done, rows.len());
        }
    }

    finish_run(conn, &mut run, aborted, unattempted)?;
    if let Some(p) = progress {
        p.on_complete(&format!(
            "Import {}: {} created, {} updated, {} skipped, {} failed",
            run.status.as_str(),
            run.created,
            run.updated,
            run.skipped,
            run.failed
        ));
    }
    Ok(run)
}

/// Process the rows of one chunk inside the open transaction.
///
/// Returns `Err` only for storage failures; the caller rolls the chunk back.
/// `stopped_at` is set to the chunk index of the row that aborted the run.
#[allow(clippy::too_many_arguments)]
fn run_chunk(
    conn: &Connection,
    planner: &Planner,
    resolver: &mut EntityResolver,
    headers: &HeaderMap,
    run_id: i64,
    chunk: &[(usize, &[String])],
    options: &ImportOptions,
    tally: &mut ChunkTally,
    stopped_at: &mut Option<usize>,
) -> Result<(), OperationError> {
    for (index, (row, record)) in chunk.iter().enumerate() {
        conn.execute_batch("SAVEPOINT import_row")?;

        let outcome = match plan_row(conn, planner, resolver, headers, *row, record)? {
            RowResult::Invalid(issues) => Err(issues),
            RowResult::Ready(row_plan) => {
                let applied = apply_plan(conn, run_id, &row_plan)?;
                Ok((row_plan, applied))
            }
        };

        match outcome {
            Ok((row_plan, applied)) => {
                conn.execute_batch("RELEASE import_row")?;
                tally.log.extend(row_plan.warnings);
                match (row_plan.plan.action, applied) {
                    (PlanAction::Create, Some((id, _))) => {
                        log::debug!("Row {}: created book {}", row, id);
                        tally.created += 1;
                    }
                    (PlanAction::Update, Some((id, _))) => {
                        log::debug!(
                            "Row {}: updated book {} ({} changes)",
                            row,
                            id,
                            row_plan.plan.changes.len()
                        );
                        tally.updated += 1;
                    }
                    _ => {
                        log::debug!(
                            "Row {}: skipped, {}",
                            row,
                            row_plan.plan.skip_reason.as_deref().unwrap_or("no action")
                        );
                        tally.skipped += 1;
                    }
                }
            }
            Err(issues) => {
                conn.execute_batch("ROLLBACK TO import_row; RELEASE import_row")?;
                resolver.invalidate();
                tally.failed += 1;
                for issue in &issues {
                    log::debug!("{}", issue);
                }
                tally.log.extend(issues);
                if !options.skip_invalid_rows {
                    *stopped_at = Some(index);
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Compute the final counts and status, and persist them.
///
/// `unattempted` rows are counted as skipped but not as processed.
fn finish_run(
    conn: &Connection,
    run: &mut ImportRun,
    aborted: bool,
    unattempted: u64,
) -> Result<(), ImportError> {
    run.processed = run.created + run.updated + run.skipped.saturating_sub(unattempted);
    run.success_rate = if run.total_rows == 0 {
        0.0
    } else {
        run.processed as f64 / run.total_rows as f64 * 100.0
    };
    let structural = run.total_rows == 0 && !run.error_log.is_empty();
    let nothing_processed = run.total_rows > 0 && run.processed == 0;
    run.status = if aborted || structural || nothing_processed {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };
    run.finished_at = Some(chrono::Utc::now().to_rfc3339());
    operations::finalize_import_run(conn, run)?;
    Ok(())
}

// ── Preview ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreviewStats {
    pub will_create: usize,
    pub will_update: usize,
    pub will_skip: usize,
    pub will_fail: usize,
    pub total: usize,
}

/// What an import would do, computed without writing.
#[derive(Debug, Default)]
pub struct PreviewReport {
    pub stats: PreviewStats,
    pub sample_updates: Vec<ImportPlan>,
    pub sample_creates: Vec<ImportPlan>,
    pub failures: Vec<RowIssue>,
    pub warnings: Vec<RowIssue>,
    /// Lookup entities the import would create.
    pub would_create: Vec<(LookupKind, String)>,
    pub validation: ValidationReport,
}

/// Plan every row of a file without touching storage.
pub fn preview_import(
    conn: &Connection,
    path: &Path,
    options: &ImportOptions,
) -> Result<PreviewReport, ImportError> {
    options.validate()?;
    let file = validate::inspect_file(path, options.delimiter)
        .map_err(|report| ImportError::Structural(report.error_messages()))?;

    let mut planner = Planner::for_preview(options.mode);
    let mut resolver =
        EntityResolver::dry_run(options.create_missing_relations, options.skip_unresolved_fields);
    let mut report = PreviewReport::default();

    for (row, record) in file.data_rows() {
        report.stats.total += 1;
        let row_plan = match plan_row(conn, &planner, &mut resolver, &file.headers, row, record)? {
            RowResult::Invalid(issues) => {
                report.stats.will_fail += 1;
                report.failures.extend(issues);
                continue;
            }
            RowResult::Ready(row_plan) => row_plan,
        };

        planner.remember(&row_plan.plan);
        report.warnings.extend(row_plan.warnings.iter().cloned());
        for pending in &row_plan.resolved.would_create {
            if !report.would_create.contains(pending) {
                report.would_create.push(pending.clone());
            }
        }
        match row_plan.plan.action {
            PlanAction::Create => {
                report.stats.will_create += 1;
                if report.sample_creates.len() < PREVIEW_SAMPLES {
                    report.sample_creates.push(row_plan.plan);
                }
            }
            PlanAction::Update => {
                report.stats.will_update += 1;
                if report.sample_updates.len() < PREVIEW_SAMPLES {
                    report.sample_updates.push(row_plan.plan);
                }
            }
            PlanAction::Skip => report.stats.will_skip += 1,
        }
    }

    report.validation = file.report;
    Ok(report)
}
