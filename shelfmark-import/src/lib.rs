//! Bulk reconciliation of delimited catalog files with the book database.
//!
//! This crate owns the whole pipeline: structural validation, row
//! normalization, lookup resolution, planning and chunked execution of
//! imports, plus the post-import passes (translation linking, quality
//! auditing) and the streaming exporter that writes re-importable files.

pub mod execute;
pub mod export;
pub mod files;
pub mod normalize;
pub mod plan;
pub mod progress;
pub mod quality;
pub mod resolve;
pub mod source;
pub mod translations;
pub mod validate;

pub use execute::{ImportError, PreviewReport, PreviewStats, preview_import, run_import};
pub use export::{ExportError, ExportStats, export_catalog, export_to_path};
pub use files::{DirectoryFileStore, FileStore};
pub use plan::{FieldChange, ImportPlan, PlanAction};
pub use progress::{ImportProgress, ReportSink, SilentProgress};
pub use quality::{
    QualityError, QualityReport, QualityRule, default_rules, resolve_issues, run_quality_checks,
};
pub use resolve::EntityResolver;
pub use translations::{InferenceError, InferenceResult, InferenceStats, infer_translations};
pub use validate::{ValidationReport, validate_file};
