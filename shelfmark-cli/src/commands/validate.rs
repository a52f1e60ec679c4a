use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::Delimiter;

use crate::CliError;

/// Structural validation only. Exit status 1 when the file cannot be imported.
pub(crate) fn run_validate(file: &Path, delimiter: Delimiter) -> Result<ExitCode, CliError> {
    let report = shelfmark_import::validate_file(file, delimiter);

    log::info!(
        "{}",
        format!("Validating {}", file.display()).if_supports_color(Stdout, |t| t.bold()),
    );
    for message in &report.info {
        log::info!("  {}", message.if_supports_color(Stdout, |t| t.dimmed()));
    }
    for warning in &report.warnings {
        log::warn!(
            "  {} {}",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            warning,
        );
    }
    for error in report.error_messages() {
        log::error!(
            "  {} {}",
            "\u{2718}".if_supports_color(Stdout, |t| t.red()),
            error,
        );
    }

    if report.is_valid() {
        log::info!(
            "{} {} data row(s), ready to import",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            report.data_rows,
        );
        Ok(ExitCode::SUCCESS)
    } else {
        log::error!("File is not importable.");
        Ok(ExitCode::FAILURE)
    }
}
