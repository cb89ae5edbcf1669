//! evalchart - Visualize model tag-evaluation reports
//!
//! A tagging model labels videos; reviewers then mark each produced tag as
//! correct or wrong and list the tags it missed. evalchart loads the
//! resulting evaluation report and renders it as charts.
//!
//! # Overview
//!
//! Two layers, strictly one-directional:
//!
//! 1. **Loading** ([`loader`]): a [`ReportLoader`] issues one fetch per mount
//!    (HTTP endpoint, report file, or raw evaluation records) and holds the
//!    outcome as an explicit [`LoadState`]: not loaded, loaded, or failed.
//!
//! 2. **Rendering** ([`view`], [`report`]): [`ReportView::from_report`] is a
//!    pure function from a report to the chart datasets: outcome
//!    distribution, overall accuracy, and tags ranked by accuracy. The
//!    [`report`] writers turn those into HTML, JSON or CSV.
//!
//! # Quick Start
//!
//! ```no_run
//! use evalchart::{LoaderConfig, ReportLoader, ReportSource, ReportView};
//!
//! # async fn run() {
//! let source = ReportSource::parse("http://localhost:3002/api/evaluation-report");
//! let mut loader = ReportLoader::mount(source, &LoaderConfig::default());
//!
//! if let Some(report) = loader.settled().await.report() {
//!     let view = ReportView::from_report(report);
//!     println!("Overall accuracy: {}", view.overall_accuracy_label);
//!     for bar in &view.ranking {
//!         println!("{:<20} {}", bar.tag, bar.accuracy_label);
//!     }
//! }
//! # }
//! ```
//!
//! # Division by zero
//!
//! No percentage is ever `NaN` or infinite. Ratios with a zero denominator
//! are [`Ratio::Undefined`] and display as "no data"; tags with no
//! occurrences are listed after the ranked tags.
//!
//! # Modules
//!
//! - [`evaluation`]: report data model and validation
//! - [`records`]: building a report from raw JSONL evaluation records
//! - [`view`]: derived chart datasets
//! - [`loader`]: fetch lifecycle
//! - [`report`]: output formatters (HTML, JSON, CSV)
//! - [`serve`]: interactive HTTP mode

pub mod config;
pub mod evaluation;
pub mod loader;
pub mod records;
pub mod report;
pub mod serve;
pub mod view;

pub use config::LoaderConfig;
pub use evaluation::{EvaluationReport, TagStatistics, TotalStatistics};
pub use loader::{FailureKind, LoadError, LoadState, ReportLoader, ReportSource};
pub use view::{BarDatum, Outcome, PieDatum, Ratio, ReportView};

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // PUBLIC API TESTS
    // ==========================================================================
    //
    // These tests verify the public API surface is correct and documented.
    // ==========================================================================

    #[test]
    fn test_public_exports() {
        // Verify core types are re-exported from crate root
        let _: LoadState = LoadState::NotLoaded;
        let _: Ratio = Ratio::Undefined;
        let _config = LoaderConfig::default();
        let _report = EvaluationReport::default();
    }

    #[test]
    fn test_view_accessible() {
        let view = ReportView::from_report(&EvaluationReport::default());
        assert_eq!(view.overall_accuracy, Ratio::Undefined);
    }

    #[test]
    fn test_outcome_variants() {
        // All slice kinds should be accessible, in chart order
        assert_eq!(Outcome::ALL, [Outcome::Correct, Outcome::Wrong, Outcome::Missed]);
    }
}
