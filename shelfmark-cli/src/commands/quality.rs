use std::path::{Path, PathBuf};
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::{QualityOptions, QualityScope};
use shelfmark_catalog::types::Severity;
use shelfmark_db::IssueFilter;
use shelfmark_import::{DirectoryFileStore, FileStore, ReportSink};

use crate::CliError;

use super::{TerminalReport, open_catalog, open_existing_catalog, truncate_str};

/// Run the quality rules. Exit status 1 with `--fail-on-critical` when any
/// critical issue is present.
pub(crate) fn run_check(
    db_path: &Path,
    import_run: Option<i64>,
    books: Vec<i64>,
    clear_existing: bool,
    fail_on_critical: bool,
    media_dir: Option<PathBuf>,
) -> Result<ExitCode, CliError> {
    let conn = open_catalog(db_path)?;

    let scope = match (import_run, books.is_empty()) {
        (Some(run_id), _) => QualityScope::ImportRun(run_id),
        (None, false) => QualityScope::Books(books),
        (None, true) => QualityScope::All,
    };

    let store = match media_dir {
        Some(dir) if !dir.is_dir() => {
            return Err(CliError::argument(format!(
                "Media directory not found: {}",
                dir.display()
            )));
        }
        Some(dir) => Some(DirectoryFileStore::new(dir)),
        None => None,
    };

    let report = shelfmark_import::run_quality_checks(
        &conn,
        &scope,
        &QualityOptions { clear_existing },
        store.as_ref().map(|s| s as &dyn FileStore),
        None,
    )
    .map_err(|e| CliError::engine(format!("Quality check failed: {}", e)))?;

    TerminalReport.quality_finished(&report);
    if !report.by_type.is_empty() {
        crate::log_blank();
        for (issue_type, count) in &report.by_type {
            log::info!("    {:<26} {:>7}", issue_type, count);
        }
    }

    if fail_on_critical && report.has_critical() {
        log::error!(
            "{} {} critical issue(s) found",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
            report.count(Severity::Critical),
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// List unresolved issues, most severe first.
pub(crate) fn run_issues(
    db_path: &Path,
    severity: Option<Severity>,
    issue_type: Option<String>,
    limit: u32,
) -> Result<ExitCode, CliError> {
    let Some(conn) = open_existing_catalog(db_path)? else {
        return Ok(ExitCode::SUCCESS);
    };

    let issues = shelfmark_db::list_issues(
        &conn,
        &IssueFilter {
            severity,
            issue_type,
            limit: Some(limit),
            ..Default::default()
        },
    )
    .map_err(|e| CliError::database(format!("Failed to list issues: {}", e)))?;

    if issues.is_empty() {
        log::info!(
            "{} No unresolved issues.",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        );
        return Ok(ExitCode::SUCCESS);
    }

    for issue in &issues {
        let severity = match issue.severity {
            Severity::Critical => issue.severity.as_str().if_supports_color(Stdout, |t| t.red()).to_string(),
            Severity::Warning => issue.severity.as_str().if_supports_color(Stdout, |t| t.yellow()).to_string(),
            Severity::Info => issue.severity.as_str().if_supports_color(Stdout, |t| t.dimmed()).to_string(),
        };
        log::info!(
            "  {:<8} book {:>6}  {:<24} {}",
            severity,
            issue.book_id,
            issue.issue_type,
            truncate_str(&issue.message, 80),
        );
    }

    let counts = shelfmark_db::unresolved_issue_counts(&conn)
        .map_err(|e| CliError::database(format!("Failed to count issues: {}", e)))?;
    crate::log_blank();
    let summary: Vec<String> = counts
        .iter()
        .map(|(severity, count)| format!("{} {}", count, severity))
        .collect();
    log::info!("Unresolved: {}", summary.join(", "));

    Ok(ExitCode::SUCCESS)
}

/// Resolve every unresolved issue of a type.
pub(crate) fn run_resolve(
    db_path: &Path,
    issue_type: &str,
    resolved_by: &str,
    notes: Option<&str>,
) -> Result<ExitCode, CliError> {
    let Some(conn) = open_existing_catalog(db_path)? else {
        return Ok(ExitCode::SUCCESS);
    };

    let resolved = shelfmark_import::resolve_issues(&conn, issue_type, resolved_by, notes)
        .map_err(|e| CliError::database(format!("Failed to resolve issues: {}", e)))?;

    if resolved == 0 {
        log::warn!("No unresolved '{}' issues.", issue_type);
    } else {
        log::info!(
            "{} Resolved {} '{}' issue(s)",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            resolved,
            issue_type,
        );
    }
    Ok(ExitCode::SUCCESS)
}
