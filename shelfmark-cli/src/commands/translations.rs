use std::path::Path;
use std::process::ExitCode;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::InferenceOptions;

use crate::CliError;

use super::{open_catalog, truncate_str};

/// Link books sharing a translated title.
pub(crate) fn run_translations(
    db_path: &Path,
    dry_run: bool,
    clear_existing: bool,
) -> Result<ExitCode, CliError> {
    let conn = open_catalog(db_path)?;
    let options = InferenceOptions {
        dry_run,
        clear_existing,
    };

    let result = shelfmark_import::infer_translations(&conn, &options)
        .map_err(|e| CliError::engine(format!("Translation inference failed: {}", e)))?;

    let heading = if dry_run {
        "Translation Inference (dry run)"
    } else {
        "Translation Inference"
    };
    log::info!("{}", heading.if_supports_color(Stdout, |t| t.bold()));

    for group in result.details.iter().filter(|g| g.created > 0) {
        let ids: Vec<String> = group.book_ids.iter().map(|id| id.to_string()).collect();
        log::info!(
            "  {} {} [{}] +{}",
            "\u{2714}".if_supports_color(Stdout, |t| t.green()),
            truncate_str(&group.title, 50).if_supports_color(Stdout, |t| t.bold()),
            ids.join(", "),
            group.created,
        );
    }
    crate::log_blank();

    let stats = &result.stats;
    log::info!("  Title groups:       {:>8}", stats.groups_processed);
    if clear_existing {
        log::info!("  Links cleared:      {:>8}", stats.cleared);
    }
    log::info!(
        "  Links {}:      {:>8}",
        if dry_run { "to create" } else { "created  " },
        stats.relationships_created.if_supports_color(Stdout, |t| t.green()),
    );
    log::info!("  Already linked:     {:>8}", stats.already_linked);
    log::info!("  Same language:      {:>8}", stats.skipped_same_language);
    if stats.failed_groups > 0 {
        log::warn!(
            "  {} {} group(s) failed and were rolled back",
            "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
            stats.failed_groups,
        );
    }

    Ok(ExitCode::SUCCESS)
}
