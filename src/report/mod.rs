//! Report generation for evaluation results
//!
//! This module provides output formatters for a derived [`ReportView`]:
//!
//! - **HTML**: Interactive page with D3.js visualizations (donut, ranked bars)
//! - **JSON**: The derived chart datasets for programmatic consumption
//! - **CSV**: One row per tag, spreadsheet-compatible
//!
//! # Usage
//!
//! ```ignore
//! use evalchart::{report, ReportView};
//!
//! let view = ReportView::from_report(&evaluation);
//!
//! // Automatically picks format based on extension
//! report::generate("report.html", &view)?;  // HTML
//! report::generate("report.json", &view)?;  // JSON
//! report::generate("report.csv", &view)?;   // CSV
//! ```

pub mod csv;
pub mod html;
pub mod json;

use crate::evaluation::EvaluationReport;
use crate::view::ReportView;
use serde::Serialize;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, view: &ReportView) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "html" | "htm" => html::write(&mut file, view),
        "json" => json::write(&mut file, view),
        _ => csv::write(&mut file, view),
    }
}

/// The six counters of the summary panel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_videos: u64,
    pub total_tags: u64,
    pub correct_tags: u64,
    pub wrong_tags: u64,
    pub missed_tags: u64,
    pub distinct_tags: usize,
}

impl Summary {
    pub fn from_report(report: &EvaluationReport) -> Self {
        let totals = &report.total_statistics;
        Self {
            total_videos: totals.total_videos,
            total_tags: totals.total_tags,
            correct_tags: totals.correct_tags,
            wrong_tags: totals.wrong_tags,
            missed_tags: totals.missed_tags,
            distinct_tags: report.tag_count(),
        }
    }

    /// Label/value pairs in display order
    pub fn counters(&self) -> [(&'static str, String); 6] {
        [
            ("Videos", self.total_videos.to_string()),
            ("Tags", self.total_tags.to_string()),
            ("Correct", self.correct_tags.to_string()),
            ("Wrong", self.wrong_tags.to_string()),
            ("Missed", self.missed_tags.to_string()),
            ("Distinct tags", self.distinct_tags.to_string()),
        ]
    }
}
