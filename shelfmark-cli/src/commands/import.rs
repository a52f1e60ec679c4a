use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::ImportOptions;
use shelfmark_catalog::types::RunStatus;
use shelfmark_import::ReportSink;

use crate::CliError;

use super::{BarProgress, TerminalReport, log_row_issue, open_catalog};

/// Import a file. Exit status 1 when the run failed.
pub(crate) fn run_import(
    db_path: &Path,
    file: &Path,
    options: &ImportOptions,
    quiet: bool,
) -> Result<ExitCode, CliError> {
    let conn = open_catalog(db_path)?;

    log::info!(
        "{}",
        format!(
            "Importing {} into {} ({})",
            file.display(),
            db_path.display(),
            options.mode
        )
        .if_supports_color(Stdout, |t| t.bold()),
    );

    let progress = BarProgress::new(quiet);
    let result = shelfmark_import::run_import(&conn, file, options, Some(&progress));
    progress.finish();
    let run = result.map_err(|e| CliError::engine(format!("Import failed: {}", e)))?;

    for issue in &run.error_log.entries {
        log_row_issue(issue);
    }
    if run.error_log.remaining > 0 {
        log::warn!("  ... and {} more", run.error_log.remaining);
    }
    crate::log_blank();
    TerminalReport.import_finished(&run);

    if run.status == RunStatus::Failed {
        return Ok(ExitCode::FAILURE);
    }
    if run.failed == 0 {
        log::info!(
            "Run 'shelfmark quality check --import-run {}' to audit the imported records.",
            run.id
        );
    }
    Ok(ExitCode::SUCCESS)
}
