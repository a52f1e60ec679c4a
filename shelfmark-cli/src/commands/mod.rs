pub(crate) mod export;
pub(crate) mod import;
pub(crate) mod preview;
pub(crate) mod quality;
pub(crate) mod runs;
pub(crate) mod seed;
pub(crate) mod stats;
pub(crate) mod translations;
pub(crate) mod validate;

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use shelfmark_catalog::options::ImportOptions;
use shelfmark_catalog::types::{ImportRun, RowIssue, RunStatus};
use shelfmark_db::Connection;
use shelfmark_import::{ImportProgress, QualityReport, ReportSink};

use crate::CliError;
use crate::cli_types::ImportArgs;

/// Default path for YAML reference data.
pub(crate) fn default_catalog_dir() -> PathBuf {
    PathBuf::from("catalog")
}

/// Open (creating if needed) the catalog database.
pub(crate) fn open_catalog(db_path: &Path) -> Result<Connection, CliError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    shelfmark_db::open_database(db_path).map_err(|e| {
        CliError::database(format!(
            "Failed to open catalog database at {}: {}",
            db_path.display(),
            e
        ))
    })
}

/// Open an existing catalog database, or warn and return `None`.
pub(crate) fn open_existing_catalog(db_path: &Path) -> Result<Option<Connection>, CliError> {
    if !db_path.exists() {
        log::warn!("No catalog database found at {}", db_path.display());
        log::info!("Run 'shelfmark import <file>' or 'shelfmark seed' to create one.");
        return Ok(None);
    }
    open_catalog(db_path).map(Some)
}

/// Apply `preview`/`import` flags on top of configured options.
pub(crate) fn import_options(base: &ImportOptions, args: &ImportArgs) -> ImportOptions {
    let mut options = base.clone();
    if let Some(mode) = args.mode {
        options.mode = mode;
    }
    if args.create_missing {
        options.create_missing_relations = true;
    }
    if args.skip_unresolved {
        options.skip_unresolved_fields = true;
    }
    if let Some(delimiter) = args.delimiter {
        options.delimiter = delimiter;
    }
    options
}

/// Truncate a string to a maximum width in characters, appending "..." if needed.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else if max > 3 {
        let head: String = s.chars().take(max - 3).collect();
        format!("{head}...")
    } else {
        s.chars().take(max).collect()
    }
}

pub(crate) fn log_row_issue(issue: &RowIssue) {
    log::warn!(
        "  {} {}",
        "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
        issue,
    );
}

// ── Progress ────────────────────────────────────────────────────────────────

/// Progress bar for row-by-row passes. Hidden with `--quiet`.
pub(crate) struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub(crate) fn new(quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(0);
            pb.set_style(
                ProgressStyle::with_template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .expect("static pattern")
                    .progress_chars("=> "),
            );
            pb
        };
        Self { pb }
    }

    pub(crate) fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl ImportProgress for BarProgress {
    fn on_row(&self, current: usize, total: usize) {
        self.pb.set_length(total as u64);
        self.pb.set_position(current as u64);
    }

    fn on_phase(&self, message: &str) {
        self.pb.set_message(message.to_string());
        log::debug!("{}", message);
    }

    fn on_complete(&self, message: &str) {
        self.pb.finish_and_clear();
        log::debug!("{}", message);
    }
}

// ── Reports ─────────────────────────────────────────────────────────────────

/// Coloured summaries of finished runs.
pub(crate) struct TerminalReport;

impl ReportSink for TerminalReport {
    fn import_finished(&self, run: &ImportRun) {
        let (mark, status) = match run.status {
            RunStatus::Completed => (
                "\u{2714}".if_supports_color(Stdout, |t| t.green()).to_string(),
                run.status.as_str().if_supports_color(Stdout, |t| t.green()).to_string(),
            ),
            _ => (
                "\u{2718}".if_supports_color(Stdout, |t| t.red()).to_string(),
                run.status.as_str().if_supports_color(Stdout, |t| t.red()).to_string(),
            ),
        };
        log::info!(
            "{} Import run {} ({}) {}",
            mark,
            run.id,
            run.source_filename.if_supports_color(Stdout, |t| t.bold()),
            status,
        );
        log::info!("  Mode:           {:>8}", run.mode.as_str());
        log::info!("  Rows:           {:>8}", run.total_rows);
        log::info!(
            "  Created:        {:>8}",
            run.created.if_supports_color(Stdout, |t| t.green())
        );
        log::info!(
            "  Updated:        {:>8}",
            run.updated.if_supports_color(Stdout, |t| t.cyan())
        );
        log::info!("  Skipped:        {:>8}", run.skipped);
        log::info!(
            "  Failed:         {:>8}",
            run.failed.if_supports_color(Stdout, |t| t.red())
        );
        log::info!("  Success rate:   {:>7.1}%", run.success_rate);
    }

    fn quality_finished(&self, report: &QualityReport) {
        log::info!(
            "{}",
            "Quality Check".if_supports_color(Stdout, |t| t.bold())
        );
        log::info!("  Records checked: {:>7}", report.total_checked);
        if report.skipped_records > 0 {
            log::info!("  Missing records: {:>7}", report.skipped_records);
        }
        if report.cleared > 0 {
            log::info!("  Issues cleared:  {:>7}", report.cleared);
        }
        log::info!(
            "  Issues found:    {:>7} ({} new)",
            report.total_issues,
            report.new_issues
        );
        for (severity, count) in &report.by_severity {
            log::info!("    {:<13} {:>7}", severity.as_str(), count);
        }
        if report.rule_failures > 0 {
            log::warn!(
                "  {} {} rule failure(s)",
                "\u{26A0}".if_supports_color(Stdout, |t| t.yellow()),
                report.rule_failures,
            );
        }
    }
}
