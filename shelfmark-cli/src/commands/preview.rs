use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::ImportOptions;
use shelfmark_import::{ImportError, ImportPlan};

use crate::CliError;

use super::{log_row_issue, open_catalog, truncate_str};

/// Plan a file against the catalog and print what an import would do.
pub(crate) fn run_preview(
    db_path: &Path,
    file: &Path,
    options: &ImportOptions,
) -> Result<ExitCode, CliError> {
    let conn = open_catalog(db_path)?;

    let report = match shelfmark_import::preview_import(&conn, file, options) {
        Ok(r) => r,
        Err(ImportError::Structural(errors)) => {
            for error in errors {
                log::error!(
                    "  {} {}",
                    "\u{2718}".if_supports_color(Stdout, |t| t.red()),
                    error,
                );
            }
            log::error!("File is not importable.");
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(CliError::engine(format!("Preview failed: {}", e))),
    };

    log::info!(
        "{}",
        format!("Preview of {} ({})", file.display(), options.mode)
            .if_supports_color(Stdout, |t| t.bold()),
    );
    for warning in &report.validation.warnings {
        log::warn!(
            "  {} {}",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            warning,
        );
    }
    crate::log_blank();

    let stats = &report.stats;
    log::info!("  Rows:          {:>8}", stats.total);
    log::info!(
        "  Will create:   {:>8}",
        stats.will_create.if_supports_color(Stdout, |t| t.green())
    );
    log::info!(
        "  Will update:   {:>8}",
        stats.will_update.if_supports_color(Stdout, |t| t.cyan())
    );
    log::info!("  Will skip:     {:>8}", stats.will_skip);
    log::info!(
        "  Will fail:     {:>8}",
        stats.will_fail.if_supports_color(Stdout, |t| t.red())
    );

    if !report.sample_updates.is_empty() {
        crate::log_blank();
        log::info!("{}", "Sample updates".if_supports_color(Stdout, |t| t.bold()));
        for plan in &report.sample_updates {
            log_plan(plan);
            if plan.changes.is_empty() {
                log::info!("      {}", "no changes".if_supports_color(Stdout, |t| t.dimmed()));
            }
            for change in &plan.changes {
                log::info!("      {}", truncate_str(&change.to_string(), 100));
            }
        }
    }

    if !report.sample_creates.is_empty() {
        crate::log_blank();
        log::info!("{}", "Sample creates".if_supports_color(Stdout, |t| t.bold()));
        for plan in &report.sample_creates {
            log_plan(plan);
        }
    }

    if !report.would_create.is_empty() {
        crate::log_blank();
        log::info!(
            "{}",
            "New lookup entities".if_supports_color(Stdout, |t| t.bold())
        );
        for (kind, name) in &report.would_create {
            log::info!("  {:<22} {}", kind.label(), name);
        }
        if !options.create_missing_relations {
            log::info!(
                "  {}",
                "(pass --create-missing to create them on import)"
                    .if_supports_color(Stdout, |t| t.dimmed())
            );
        }
    }

    if !report.failures.is_empty() || !report.warnings.is_empty() {
        crate::log_blank();
        for issue in report.failures.iter().chain(&report.warnings) {
            log_row_issue(issue);
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn log_plan(plan: &ImportPlan) {
    log::info!(
        "  {} {}",
        format!("row {:>5}", plan.row).if_supports_color(Stdout, |t| t.dimmed()),
        truncate_str(&plan.label, 60),
    );
}
