//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use shelfmark_catalog::options::Delimiter;
use shelfmark_catalog::types::{AccessLevel, ImportMode, Severity};

#[derive(Parser)]
#[command(name = "shelfmark")]
#[command(about = "Bulk-reconcile a library catalog against CSV spreadsheets", long_about = None)]
pub(crate) struct Cli {
    /// Catalog database (overrides SHELFMARK_DB and the config file)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file (defaults to <config dir>/shelfmark/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write log output to a file (ANSI codes stripped)
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Load languages and classification types from YAML reference data
    Seed {
        /// Directory with languages/ and classification_types/ (default: ./catalog)
        #[arg(long)]
        catalog_dir: Option<PathBuf>,
    },

    /// Check a file's structure without touching the catalog
    Validate {
        file: PathBuf,

        /// Field delimiter: comma or tab
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<Delimiter>,
    },

    /// Show what an import would do, without writing
    Preview {
        file: PathBuf,

        #[command(flatten)]
        import: ImportArgs,
    },

    /// Reconcile a file into the catalog
    Import {
        file: PathBuf,

        #[command(flatten)]
        import: ImportArgs,

        /// Stop at the first invalid row
        #[arg(long)]
        fail_fast: bool,

        /// Rows committed per transaction
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Link books that share a translated title as translations of each other
    Translations {
        /// Report what would be linked without writing
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Remove existing translation links first
        #[arg(long)]
        clear_existing: bool,
    },

    /// Data quality checks and issue management
    Quality {
        #[command(subcommand)]
        action: QualityAction,
    },

    /// Stream the catalog to a CSV file in the import layout
    Export {
        output: PathBuf,

        #[command(flatten)]
        filter: ExportFilterArgs,

        /// Field delimiter: comma or tab
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<Delimiter>,

        /// Omit the UTF-8 byte-order mark
        #[arg(long)]
        no_bom: bool,

        /// Omit the machine field-name row
        #[arg(long)]
        no_mapping_row: bool,

        /// Records fetched per page
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// List recent import runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// Show catalog database statistics
    Stats,
}

/// Options shared by `preview` and `import`.
#[derive(Args, Clone)]
pub(crate) struct ImportArgs {
    /// create_only, update_only, upsert or create_duplicates
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<ImportMode>,

    /// Create publishers, creators, languages, etc. that do not exist yet
    #[arg(long)]
    pub create_missing: bool,

    /// Leave unresolvable references unset instead of failing the row
    #[arg(long)]
    pub skip_unresolved: bool,

    /// Field delimiter: comma or tab
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<Delimiter>,
}

#[derive(Subcommand)]
pub(crate) enum QualityAction {
    /// Run the quality rules and record new issues
    Check {
        /// Only check books touched by this import run
        #[arg(long, conflicts_with = "book")]
        import_run: Option<i64>,

        /// Only check these books (repeatable)
        #[arg(long)]
        book: Vec<i64>,

        /// Drop unresolved issues in scope before checking
        #[arg(long)]
        clear_existing: bool,

        /// Exit with status 1 when critical issues are present
        #[arg(long)]
        fail_on_critical: bool,

        /// Verify referenced files exist in this media directory
        #[arg(long)]
        media_dir: Option<PathBuf>,
    },

    /// List unresolved issues
    Issues {
        /// critical, warning or info
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,

        /// Issue type (e.g., missing_authors)
        #[arg(long = "type")]
        issue_type: Option<String>,

        /// Maximum number of issues to show
        #[arg(short, long, default_value_t = 50)]
        limit: u32,
    },

    /// Mark every unresolved issue of a type as resolved
    Resolve {
        issue_type: String,

        /// Who resolved the issues
        #[arg(long)]
        by: String,

        /// Resolution notes
        #[arg(long)]
        notes: Option<String>,
    },
}

/// Export filters. All given filters must match.
#[derive(Args, Clone, Default)]
pub(crate) struct ExportFilterArgs {
    /// Collection name
    #[arg(long)]
    pub collection: Option<String>,

    /// Language name or ISO code
    #[arg(long)]
    pub language: Option<String>,

    /// full, limited or unavailable
    #[arg(long, value_parser = parse_access_level)]
    pub access_level: Option<AccessLevel>,

    /// Created on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub created_from: Option<NaiveDate>,

    /// Created on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub created_to: Option<NaiveDate>,

    /// Publication year lower bound
    #[arg(long)]
    pub year_from: Option<i32>,

    /// Publication year upper bound
    #[arg(long)]
    pub year_to: Option<i32>,

    /// Only active (true) or inactive (false) records (default: true)
    #[arg(long)]
    pub active: Option<bool>,

    /// Export inactive records as well as active ones
    #[arg(long, conflicts_with = "active")]
    pub include_inactive: bool,

    /// Only featured (true) or non-featured (false) records
    #[arg(long)]
    pub featured: Option<bool>,
}

fn parse_delimiter(s: &str) -> Result<Delimiter, String> {
    s.parse()
}

fn parse_mode(s: &str) -> Result<ImportMode, String> {
    s.parse()
}

fn parse_access_level(s: &str) -> Result<AccessLevel, String> {
    AccessLevel::parse(s).ok_or_else(|| {
        format!("unknown access level '{s}' (expected full, limited or unavailable)")
    })
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    match s.to_lowercase().as_str() {
        "critical" | "warning" | "info" => Ok(Severity::from_str_loose(s)),
        _ => Err(format!("unknown severity '{s}' (expected critical, warning or info)")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_flags_parse() {
        let cli = Cli::try_parse_from([
            "shelfmark",
            "--db",
            "cat.db",
            "import",
            "books.csv",
            "--mode",
            "update-only",
            "--create-missing",
            "--fail-fast",
            "--chunk-size",
            "25",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("cat.db")));
        match cli.command {
            Commands::Import {
                file,
                import,
                fail_fast,
                chunk_size,
            } => {
                assert_eq!(file, PathBuf::from("books.csv"));
                assert_eq!(import.mode, Some(ImportMode::UpdateOnly));
                assert!(import.create_missing);
                assert!(fail_fast);
                assert_eq!(chunk_size, Some(25));
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn quality_scope_flags_conflict() {
        assert!(
            Cli::try_parse_from([
                "shelfmark",
                "quality",
                "check",
                "--import-run",
                "3",
                "--book",
                "1"
            ])
            .is_err()
        );
        let cli =
            Cli::try_parse_from(["shelfmark", "quality", "check", "--book", "1", "--book", "2"])
                .unwrap();
        match cli.command {
            Commands::Quality {
                action: QualityAction::Check { book, .. },
            } => assert_eq!(book, vec![1, 2]),
            _ => panic!("expected quality check"),
        }
    }

    #[test]
    fn export_filters_parse() {
        let cli = Cli::try_parse_from([
            "shelfmark",
            "export",
            "out.tsv",
            "--delimiter",
            "tab",
            "--access-level",
            "Limited",
            "--created-from",
            "2024-01-31",
            "--active",
            "true",
            "--no-bom",
        ])
        .unwrap();
        match cli.command {
            Commands::Export {
                filter,
                delimiter,
                no_bom,
                ..
            } => {
                assert_eq!(delimiter, Some(Delimiter::Tab));
                assert_eq!(filter.access_level, Some(AccessLevel::Limited));
                assert_eq!(filter.created_from, NaiveDate::from_ymd_opt(2024, 1, 31));
                assert_eq!(filter.active, Some(true));
                assert!(no_bom);
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn include_inactive_conflicts_with_active() {
        assert!(
            Cli::try_parse_from([
                "shelfmark",
                "export",
                "out.csv",
                "--active",
                "false",
                "--include-inactive"
            ])
            .is_err()
        );
        let cli =
            Cli::try_parse_from(["shelfmark", "export", "out.csv", "--include-inactive"]).unwrap();
        match cli.command {
            Commands::Export { filter, .. } => {
                assert!(filter.include_inactive);
                assert_eq!(filter.active, None);
            }
            _ => panic!("expected export"),
        }
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Cli::try_parse_from(["shelfmark", "preview", "a.csv", "--mode", "merge"]).is_err());
        assert!(
            Cli::try_parse_from(["shelfmark", "quality", "issues", "--severity", "fatal"]).is_err()
        );
    }
}
