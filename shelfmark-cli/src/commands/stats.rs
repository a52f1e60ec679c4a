use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use crate::CliError;

use super::open_existing_catalog;

pub(crate) fn run_stats(db_path: &Path) -> Result<ExitCode, CliError> {
    let Some(conn) = open_existing_catalog(db_path)? else {
        return Ok(ExitCode::SUCCESS);
    };

    let stats = shelfmark_db::catalog_stats(&conn)
        .map_err(|e| CliError::database(format!("Failed to query catalog stats: {}", e)))?;

    log::info!(
        "{}",
        "Catalog Database Statistics".if_supports_color(Stdout, |t| t.bold()),
    );
    log::info!("  Database: {}", db_path.display());
    crate::log_blank();
    log::info!("  Books:          {:>8}", stats.books);
    log::info!("  Active books:   {:>8}", stats.active_books);
    log::info!("  Publishers:     {:>8}", stats.publishers);
    log::info!("  Creators:       {:>8}", stats.creators);
    log::info!("  Languages:      {:>8}", stats.languages);
    log::info!("  Relationships:  {:>8}", stats.relationships);
    log::info!("  Import runs:    {:>8}", stats.import_runs);
    log::info!(
        "  Quality issues: {:>8} (unresolved)",
        stats.unresolved_issues,
    );

    Ok(ExitCode::SUCCESS)
}
