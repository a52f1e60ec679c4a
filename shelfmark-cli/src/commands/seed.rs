use std::path::{Path, PathBuf};
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use crate::CliError;

use super::{default_catalog_dir, open_catalog};

/// Load languages and classification types from YAML into the catalog.
pub(crate) fn run_seed(db_path: &Path, catalog_dir: Option<PathBuf>) -> Result<ExitCode, CliError> {
    let catalog_dir = catalog_dir.unwrap_or_else(default_catalog_dir);
    if !catalog_dir.is_dir() {
        return Err(CliError::argument(format!(
            "Catalog directory not found at {}",
            catalog_dir.display()
        )));
    }

    let conn = open_catalog(db_path)?;
    let stats = shelfmark_db::seed_from_catalog(&conn, &catalog_dir)
        .map_err(|e| CliError::database(format!("Failed to seed from catalog YAML: {}", e)))?;

    log::info!(
        "{} Seeded {} languages, {} classification types ({} values) from {}",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        stats.languages,
        stats.classification_types,
        stats.classification_values,
        catalog_dir.display(),
    );
    Ok(ExitCode::SUCCESS)
}
