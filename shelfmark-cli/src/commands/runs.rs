use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::types::RunStatus;

use crate::CliError;

use super::{open_existing_catalog, truncate_str};

/// List recent import runs, newest first.
pub(crate) fn run_runs(db_path: &Path, limit: u32) -> Result<ExitCode, CliError> {
    let Some(conn) = open_existing_catalog(db_path)? else {
        return Ok(ExitCode::SUCCESS);
    };

    let runs = shelfmark_db::list_import_runs(&conn, Some(limit))
        .map_err(|e| CliError::database(format!("Failed to list import runs: {}", e)))?;

    if runs.is_empty() {
        log::info!("No import runs recorded.");
        return Ok(ExitCode::SUCCESS);
    }

    log::info!(
        "{}",
        format!(
            "{:>5}  {:<19}  {:<30}  {:<17}  {:>6} {:>6} {:>6} {:>6} {:>6}  {:<9}",
            "ID", "Started", "File", "Mode", "Rows", "New", "Upd", "Skip", "Fail", "Status"
        )
        .if_supports_color(Stdout, |t| t.bold()),
    );
    for run in &runs {
        let status = match run.status {
            RunStatus::Completed => run.status.as_str().if_supports_color(Stdout, |t| t.green()).to_string(),
            RunStatus::Failed => run.status.as_str().if_supports_color(Stdout, |t| t.red()).to_string(),
            RunStatus::Running => run.status.as_str().if_supports_color(Stdout, |t| t.yellow()).to_string(),
        };
        log::info!(
            "{:>5}  {:<19}  {:<30}  {:<17}  {:>6} {:>6} {:>6} {:>6} {:>6}  {}",
            run.id,
            truncate_str(&run.started_at, 19),
            truncate_str(&run.source_filename, 30),
            run.mode.as_str(),
            run.total_rows,
            run.created,
            run.updated,
            run.skipped,
            run.failed,
            status,
        );
    }

    Ok(ExitCode::SUCCESS)
}
