use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::{ExportFilter, ExportOptions};

use crate::CliError;
use crate::cli_types::ExportFilterArgs;

use super::{BarProgress, open_existing_catalog};

impl From<ExportFilterArgs> for ExportFilter {
    fn from(args: ExportFilterArgs) -> Self {
        Self {
            collection: args.collection,
            language: args.language,
            access_level: args.access_level,
            created_from: args.created_from,
            created_to: args.created_to,
            year_from: args.year_from,
            year_to: args.year_to,
            // Inactive records are re-created on import, so they are opt-in.
            active: if args.include_inactive {
                None
            } else {
                Some(args.active.unwrap_or(true))
            },
            featured: args.featured,
        }
    }
}

/// Stream matching books to a file.
pub(crate) fn run_export(
    db_path: &Path,
    output: &Path,
    filter: ExportFilter,
    options: &ExportOptions,
    quiet: bool,
) -> Result<ExitCode, CliError> {
    let Some(conn) = open_existing_catalog(db_path)? else {
        return Ok(ExitCode::FAILURE);
    };

    let progress = BarProgress::new(quiet);
    let result = shelfmark_import::export_to_path(&conn, output, &filter, options, Some(&progress));
    progress.finish();
    let stats = result.map_err(|e| CliError::engine(format!("Export failed: {}", e)))?;

    log::info!(
        "{} Exported {} book(s) to {} ({} chunk(s))",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        stats.records,
        output.display().if_supports_color(Stdout, |t| t.bold()),
        stats.chunks,
    );
    Ok(ExitCode::SUCCESS)
}
