//! shelfmark CLI
//!
//! Command-line interface for bulk-reconciling a library catalog.

mod cli_types;
mod commands;
mod config;
mod error;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use cli_types::{Cli, Commands, QualityAction};
use config::Config;
pub(crate) use error::CliError;
pub(crate) use logging::log_blank;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.quiet, cli.verbose, cli.logfile.as_deref()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!(
                "{} {}",
                "\u{2718}".if_supports_color(Stderr, |t| t.red()),
                e
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let db_path = config.db_path(cli.db);
    log::debug!("Catalog database: {}", db_path.display());

    match cli.command {
        Commands::Seed { catalog_dir } => commands::seed::run_seed(&db_path, catalog_dir),
        Commands::Validate { file, delimiter } => {
            commands::validate::run_validate(&file, delimiter.unwrap_or(config.import.delimiter))
        }
        Commands::Preview { file, import } => {
            let options = commands::import_options(&config.import, &import);
            commands::preview::run_preview(&db_path, &file, &options)
        }
        Commands::Import {
            file,
            import,
            fail_fast,
            chunk_size,
        } => {
            let mut options = commands::import_options(&config.import, &import);
            if fail_fast {
                options.skip_invalid_rows = false;
            }
            if let Some(n) = chunk_size {
                options.chunk_size = n;
            }
            commands::import::run_import(&db_path, &file, &options, cli.quiet)
        }
        Commands::Translations {
            dry_run,
            clear_existing,
        } => commands::translations::run_translations(&db_path, dry_run, clear_existing),
        Commands::Quality { action } => match action {
            QualityAction::Check {
                import_run,
                book,
                clear_existing,
                fail_on_critical,
                media_dir,
            } => commands::quality::run_check(
                &db_path,
                import_run,
                book,
                clear_existing,
                fail_on_critical,
                media_dir,
            ),
            QualityAction::Issues {
                severity,
                issue_type,
                limit,
            } => commands::quality::run_issues(&db_path, severity, issue_type, limit),
            QualityAction::Resolve {
                issue_type,
                by,
                notes,
            } => commands::quality::run_resolve(&db_path, &issue_type, &by, notes.as_deref()),
        },
        Commands::Export {
            output,
            filter,
            delimiter,
            no_bom,
            no_mapping_row,
            chunk_size,
        } => {
            let mut options = config.export.clone();
            if let Some(d) = delimiter {
                options.delimiter = d;
            }
            if no_bom {
                options.include_bom = false;
            }
            if no_mapping_row {
                options.include_mapping_row = false;
            }
            if let Some(n) = chunk_size {
                options.chunk_size = n;
            }
            commands::export::run_export(&db_path, &output, filter.into(), &options, cli.quiet)
        }
        Commands::Runs { limit } => commands::runs::run_runs(&db_path, limit),
        Commands::Stats => commands::stats::run_stats(&db_path),
    }
}
