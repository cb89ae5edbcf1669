//! Evaluation report data model
//!
//! An [`EvaluationReport`] is the precomputed result of a tagging evaluation:
//! aggregate counts over every evaluated video plus a per-tag breakdown.
//!
//! ```json
//! {
//!   "total_statistics": {"total_videos": 10, "total_tags": 100,
//!                        "correct_tags": 80, "wrong_tags": 15, "missed_tags": 5},
//!   "tag_statistics": {"cat": {"total": 10, "correct": 9, "wrong": 1, "missed": 0}}
//! }
//! ```
//!
//! Both sections are required. Individual counters inside a section default
//! to zero when absent, but a counter that is present must be a non-negative
//! whole number. `100` and `100.0` are both accepted; `2.5`, `-3` and
//! `"lots"` make the report malformed.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Aggregate counts over the whole evaluation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TotalStatistics {
    #[serde(deserialize_with = "count")]
    pub total_videos: u64,
    #[serde(deserialize_with = "count")]
    pub total_tags: u64,
    #[serde(deserialize_with = "count")]
    pub correct_tags: u64,
    #[serde(deserialize_with = "count")]
    pub wrong_tags: u64,
    #[serde(deserialize_with = "count")]
    pub missed_tags: u64,
}

impl TotalStatistics {
    /// `correct + wrong + missed == total`. Expected, never enforced.
    pub fn is_consistent(&self) -> bool {
        self.correct_tags
            .checked_add(self.wrong_tags)
            .and_then(|n| n.checked_add(self.missed_tags))
            == Some(self.total_tags)
    }
}

/// Per-tag outcome counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagStatistics {
    #[serde(deserialize_with = "count")]
    pub total: u64,
    #[serde(deserialize_with = "count")]
    pub correct: u64,
    #[serde(deserialize_with = "count")]
    pub wrong: u64,
    #[serde(deserialize_with = "count")]
    pub missed: u64,
}

/// Deserialize a counter: a non-negative integer, or a float with no
/// fractional part
pub(crate) fn count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    let n = serde_json::Number::deserialize(deserializer)?;
    if let Some(v) = n.as_u64() {
        return Ok(v);
    }
    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
        .map(|f| f as u64)
        .ok_or_else(|| D::Error::custom(format!("expected a non-negative whole count, got {}", n)))
}

impl TagStatistics {
    pub fn is_consistent(&self) -> bool {
        self.correct
            .checked_add(self.wrong)
            .and_then(|n| n.checked_add(self.missed))
            .map(|n| n <= self.total)
            .unwrap_or(false)
    }
}

/// Root payload served by the evaluation-report endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub total_statistics: TotalStatistics,
    pub tag_statistics: BTreeMap<String, TagStatistics>,
}

impl EvaluationReport {
    /// Parse and validate a report from a JSON body
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    /// Validate the shape of an already-parsed JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| ReportError::Malformed("report is not a JSON object".to_string()))?;

        for section in ["total_statistics", "tag_statistics"] {
            match root.get(section) {
                None | Some(Value::Null) => return Err(ReportError::MissingSection(section)),
                Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(ReportError::Malformed(format!("{} is not an object", section)))
                }
            }
        }

        let report: EvaluationReport =
            serde_json::from_value(value).map_err(|e| ReportError::Malformed(e.to_string()))?;

        if !report.total_statistics.is_consistent() {
            tracing::warn!(
                total = report.total_statistics.total_tags,
                correct = report.total_statistics.correct_tags,
                wrong = report.total_statistics.wrong_tags,
                missed = report.total_statistics.missed_tags,
                "total statistics do not add up"
            );
        }
        for (tag, stats) in &report.tag_statistics {
            if !stats.is_consistent() {
                tracing::debug!(tag = %tag, ?stats, "tag counts exceed tag total");
            }
        }

        Ok(report)
    }

    pub fn tag_count(&self) -> usize {
        self.tag_statistics.len()
    }
}

/// Error type for report parsing
#[derive(Debug)]
pub enum ReportError {
    /// Body is not JSON at all
    Json(serde_json::Error),
    MissingSection(&'static str),
    /// JSON, but not an evaluation report (wrong types, negative counts, ...)
    Malformed(String),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Json(e) => write!(f, "invalid JSON: {}", e),
            ReportError::MissingSection(s) => write!(f, "missing section: {}", s),
            ReportError::Malformed(msg) => write!(f, "malformed report: {}", msg),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<serde_json::Error> for ReportError {
    fn from(e: serde_json::Error) -> Self {
        ReportError::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
