//! Chart datasets derived from an evaluation report
//!
//! [`ReportView::from_report`] is a pure function of the report: it never
//! mutates its input and yields identical output for identical input. Every
//! division goes through [`Ratio`], so a zero denominator becomes an explicit
//! "no data" value instead of `NaN` or infinity.

use crate::evaluation::{EvaluationReport, TagStatistics};
use crate::report::Summary;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;

pub const NO_DATA: &str = "no data";

/// Result of a guarded division
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn of(numerator: u64, denominator: u64) -> Self {
        if denominator == 0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator as f64 / denominator as f64)
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    /// Percentage rounded to one decimal place
    pub fn percent(&self) -> Option<f64> {
        self.value().map(|v| round1(v * 100.0))
    }

    /// `"80.0%"`, or `"no data"` when undefined
    pub fn label(&self) -> String {
        match self.percent() {
            Some(p) => format!("{:.1}%", p),
            None => NO_DATA.to_string(),
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Ratio::Defined(_))
    }
}

/// Serialized as the rounded percentage, or `null`
impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.percent() {
            Some(p) => serializer.serialize_f64(p),
            None => serializer.serialize_none(),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Distribution chart slice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Correct,
    Wrong,
    Missed,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Correct, Outcome::Wrong, Outcome::Missed];

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Correct => "Correct",
            Outcome::Wrong => "Wrong",
            Outcome::Missed => "Missed",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Outcome::Correct => "#3fb950",
            Outcome::Wrong => "#f85149",
            Outcome::Missed => "#d29922",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieDatum {
    #[serde(rename = "type")]
    pub outcome: Outcome,
    /// Legend and hover name
    pub name: &'static str,
    pub value: u64,
    /// Share of the slice sum
    pub share: Ratio,
    pub label: String,
    pub color: &'static str,
}

/// Ranked bar chart entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarDatum {
    pub tag: String,
    pub accuracy: Ratio,
    pub accuracy_label: String,
    pub recall: Ratio,
    pub total: u64,
    pub correct: u64,
    pub wrong: u64,
    pub missed: u64,
    /// Hover rows in display order
    pub tooltip: [(&'static str, String); 6],
}

impl BarDatum {
    fn new(tag: &str, stats: &TagStatistics) -> Self {
        let accuracy = Ratio::of(stats.correct, stats.total);
        let recall = Ratio::of(stats.correct, stats.correct.saturating_add(stats.missed));
        let accuracy_label = accuracy.label();
        let tooltip = [
            ("Tag", tag.to_string()),
            ("Accuracy", accuracy_label.clone()),
            ("Total", stats.total.to_string()),
            ("Correct", stats.correct.to_string()),
            ("Wrong", stats.wrong.to_string()),
            ("Missed", stats.missed.to_string()),
        ];
        BarDatum {
            tag: tag.to_string(),
            accuracy,
            accuracy_label,
            recall,
            total: stats.total,
            correct: stats.correct,
            wrong: stats.wrong,
            missed: stats.missed,
            tooltip,
        }
    }
}

/// Everything the page needs to draw
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub summary: Summary,
    pub distribution: Vec<PieDatum>,
    pub overall_accuracy: Ratio,
    pub overall_accuracy_label: String,
    /// Tags with a defined accuracy, best first
    pub ranking: Vec<BarDatum>,
    /// Tags with zero occurrences; listed after the ranking, by name
    pub unranked: Vec<BarDatum>,
}

impl ReportView {
    pub fn from_report(report: &EvaluationReport) -> Self {
        let totals = &report.total_statistics;
        let overall_accuracy = Ratio::of(totals.correct_tags, totals.total_tags);

        let (ranking, unranked) = rank_tags(report);

        ReportView {
            summary: Summary::from_report(report),
            distribution: distribution(report),
            overall_accuracy,
            overall_accuracy_label: overall_accuracy.label(),
            ranking,
            unranked,
        }
    }

    /// Nothing to chart: no tags were evaluated
    pub fn is_empty(&self) -> bool {
        self.summary.total_tags == 0 && self.ranking.is_empty() && self.unranked.is_empty()
    }

    /// Ranked bars followed by the "no data" bars
    pub fn bars(&self) -> impl Iterator<Item = &BarDatum> {
        self.ranking.iter().chain(self.unranked.iter())
    }
}

fn distribution(report: &EvaluationReport) -> Vec<PieDatum> {
    let totals = &report.total_statistics;
    let values = [totals.correct_tags, totals.wrong_tags, totals.missed_tags];
    let sum = values.iter().fold(0u64, |acc, v| acc.saturating_add(*v));

    Outcome::ALL
        .iter()
        .zip(values)
        .map(|(&outcome, value)| {
            let share = Ratio::of(value, sum);
            PieDatum {
                outcome,
                name: outcome.label(),
                value,
                share,
                label: share.label(),
                color: outcome.color(),
            }
        })
        .collect()
}

/// Sort on the unrounded ratio; the rounded figure is for display only.
fn rank_tags(report: &EvaluationReport) -> (Vec<BarDatum>, Vec<BarDatum>) {
    let (mut ranking, mut unranked): (Vec<BarDatum>, Vec<BarDatum>) = report
        .tag_statistics
        .iter()
        .map(|(tag, stats)| BarDatum::new(tag, stats))
        .partition(|b| b.accuracy.is_defined());

    ranking.sort_by(|a, b| {
        let (x, y) = (a.accuracy.value().unwrap_or(0.0), b.accuracy.value().unwrap_or(0.0));
        y.partial_cmp(&x)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.tag.cmp(&b.tag))
    });
    unranked.sort_by(|a, b| a.tag.cmp(&b.tag));

    (ranking, unranked)
}
