//! Progress reporting and run summaries.

use shelfmark_catalog::types::ImportRun;

use crate::quality::QualityReport;

/// Trait for receiving progress updates from long-running passes.
pub trait ImportProgress {
    /// Called after each row (import) or record (export, audit) is handled.
    fn on_row(&self, current: usize, total: usize);

    /// Called when a phase starts (e.g., "Importing books.csv").
    fn on_phase(&self, message: &str);

    /// Called when the pass is complete.
    fn on_complete(&self, message: &str);
}

/// A no-op progress reporter that discards all updates.
pub struct SilentProgress;

impl ImportProgress for SilentProgress {
    fn on_row(&self, _current: usize, _total: usize) {}
    fn on_phase(&self, _message: &str) {}
    fn on_complete(&self, _message: &str) {}
}

/// Receives finished import runs and quality reports for display.
pub trait ReportSink {
    fn import_finished(&self, run: &ImportRun);
    fn quality_finished(&self, report: &QualityReport);
}
