//! Building an evaluation report from raw evaluation records
//!
//! The annotation tool appends one JSON object per evaluated video to a
//! `.jsonl` file. Each record holds the tags the model produced and the
//! reviewer's verdict on them:
//!
//! ```json
//! {"original_tags": ["cat", "sofa"],
//!  "evaluation_results": {"total_tags": 2, "correct_tags": 1,
//!                         "wrong_tags": [{"tag": "sofa", "index": 1}],
//!                         "missed_tags": ["dog"]}}
//! ```
//!
//! [`aggregate`] folds a batch of records into an [`EvaluationReport`];
//! [`analyze`] adds the per-tag analysis table on top.

use crate::evaluation::{count, EvaluationReport, TagStatistics, TotalStatistics};
use crate::view::Ratio;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single evaluated video
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationRecord {
    pub timestamp: Option<String>,
    pub original_tags: Option<Vec<Option<String>>>,
    pub evaluation_results: Option<EvaluationResults>,
}

/// Reviewer verdict for one video
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationResults {
    #[serde(deserialize_with = "count")]
    pub total_tags: u64,
    #[serde(deserialize_with = "count")]
    pub correct_tags: u64,
    pub wrong_tags: Option<Vec<TagRef>>,
    pub missed_tags: Option<Vec<TagRef>>,
}

/// Wrong and missed tags are stored either as bare names or as objects
/// carrying the name plus timing details.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagRef {
    Name(Option<String>),
    Detailed { tag: Option<String> },
    Other(serde_json::Value),
}

impl TagRef {
    pub fn name(&self) -> Option<&str> {
        match self {
            TagRef::Name(Some(name)) | TagRef::Detailed { tag: Some(name) } => {
                Some(name.as_str()).filter(|n| !n.is_empty())
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct TagAccumulator {
    model_tags: u64,
    total: u64,
    wrong: u64,
    missed: u64,
}

impl TagAccumulator {
    fn correct(&self) -> u64 {
        self.model_tags.saturating_sub(self.wrong)
    }
}

/// Per-tag row of the detailed analysis table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagAnalysis {
    /// Tag name with any `category: ` prefix removed
    pub tag: String,
    /// Recall denominator: correct plus missed
    pub sample_size: u64,
    pub accuracy: String,
    pub recall: String,
    pub correct: u64,
    pub wrong: u64,
    pub missed: u64,
}

/// Report plus the per-tag analysis table, as written by `evalchart build`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsReport {
    #[serde(flatten)]
    pub report: EvaluationReport,
    pub tag_analysis: Vec<TagAnalysis>,
}

fn accumulate(records: &[EvaluationRecord]) -> (TotalStatistics, BTreeMap<String, TagAccumulator>) {
    let mut totals = TotalStatistics {
        total_videos: records.len() as u64,
        ..Default::default()
    };
    let mut tags: BTreeMap<String, TagAccumulator> = BTreeMap::new();

    for record in records {
        let empty = EvaluationResults::default();
        let results = record.evaluation_results.as_ref().unwrap_or(&empty);
        let wrong = results.wrong_tags.as_deref().unwrap_or_default();
        let missed = results.missed_tags.as_deref().unwrap_or_default();

        // Counts come straight from the records and may be arbitrarily large
        totals.total_tags = totals.total_tags.saturating_add(results.total_tags);
        totals.correct_tags = totals.correct_tags.saturating_add(results.correct_tags);
        totals.wrong_tags = totals.wrong_tags.saturating_add(wrong.len() as u64);
        totals.missed_tags = totals.missed_tags.saturating_add(missed.len() as u64);

        let produced = record.original_tags.as_deref().unwrap_or_default();
        for tag in produced.iter().flatten().filter(|t| !t.is_empty()) {
            let acc = tags.entry(tag.clone()).or_default();
            acc.model_tags += 1;
            acc.total += 1;
        }
        for tag in wrong.iter().filter_map(TagRef::name) {
            tags.entry(tag.to_string()).or_default().wrong += 1;
        }
        for tag in missed.iter().filter_map(TagRef::name) {
            let acc = tags.entry(tag.to_string()).or_default();
            acc.missed += 1;
            acc.total += 1;
        }
    }

    (totals, tags)
}

fn tag_statistics(tags: &BTreeMap<String, TagAccumulator>) -> BTreeMap<String, TagStatistics> {
    tags.iter()
        .map(|(tag, acc)| {
            let stats = TagStatistics {
                total: acc.total,
                correct: acc.correct(),
                wrong: acc.wrong,
                missed: acc.missed,
            };
            (tag.clone(), stats)
        })
        .collect()
}

/// Fold records into a report
pub fn aggregate(records: &[EvaluationRecord]) -> EvaluationReport {
    let (total_statistics, tags) = accumulate(records);
    EvaluationReport {
        total_statistics,
        tag_statistics: tag_statistics(&tags),
    }
}

/// Fold records into a report and its per-tag analysis table, largest
/// sample first
pub fn analyze(records: &[EvaluationRecord]) -> StatisticsReport {
    let (total_statistics, tags) = accumulate(records);

    let mut tag_analysis: Vec<TagAnalysis> = tags
        .iter()
        .map(|(tag, acc)| {
            let correct = acc.correct();
            let sample_size = correct.saturating_add(acc.missed);
            TagAnalysis {
                tag: strip_tag_prefix(tag).to_string(),
                sample_size,
                accuracy: Ratio::of(correct, acc.model_tags).label(),
                recall: Ratio::of(correct, sample_size).label(),
                correct,
                wrong: acc.wrong,
                missed: acc.missed,
            }
        })
        .collect();
    tag_analysis.sort_by(|a, b| b.sample_size.cmp(&a.sample_size).then_with(|| a.tag.cmp(&b.tag)));

    StatisticsReport {
        report: EvaluationReport {
            total_statistics,
            tag_statistics: tag_statistics(&tags),
        },
        tag_analysis,
    }
}

/// `"object: cat"` -> `"cat"`
pub fn strip_tag_prefix(tag: &str) -> &str {
    tag.split(": ").nth(1).unwrap_or(tag)
}

/// Parse JSONL text. Blank lines are skipped.
pub fn parse_records(text: &str) -> Result<Vec<EvaluationRecord>> {
    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    lines
        .par_iter()
        .map(|(idx, line)| {
            serde_json::from_str::<EvaluationRecord>(line).map_err(|e| RecordsError::Parse {
                path: None,
                line: idx + 1,
                source: e,
            })
        })
        .collect()
}

/// Load every record under `path`: a single `.jsonl` file or a directory
/// searched recursively for them.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<EvaluationRecord>> {
    let path = path.as_ref();
    let files = record_files(path)?;

    let mut records = Vec::new();
    for file in files {
        let text = std::fs::read_to_string(&file).map_err(|e| RecordsError::Io(file.clone(), e))?;
        let parsed = parse_records(&text).map_err(|e| e.with_path(&file))?;
        tracing::debug!(file = %file.display(), count = parsed.len(), "loaded records");
        records.extend(parsed);
    }
    Ok(records)
}

/// Load and aggregate in one step
pub fn build_report<P: AsRef<Path>>(path: P) -> Result<EvaluationReport> {
    let records = load_records(path)?;
    if records.is_empty() {
        tracing::warn!("no evaluation records found");
    }
    Ok(aggregate(&records))
}

/// Load, aggregate and analyze in one step
pub fn build_statistics_report<P: AsRef<Path>>(path: P) -> Result<StatisticsReport> {
    let records = load_records(path)?;
    if records.is_empty() {
        tracing::warn!("no evaluation records found");
    }
    Ok(analyze(&records))
}

/// True when `path` should be treated as a record source rather than a report
pub fn is_record_source(path: &Path) -> bool {
    path.is_dir() || has_jsonl_extension(path)
}

fn has_jsonl_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jsonl"))
        .unwrap_or(false)
}

fn record_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && has_jsonl_extension(e.path()))
            .map(|e| e.path().to_path_buf())
            .collect();
        files.sort();
        Ok(files)
    } else if path.exists() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(RecordsError::NotFound(path.to_path_buf()))
    }
}

/// Error type for record loading
#[derive(Debug)]
pub enum RecordsError {
    NotFound(PathBuf),
    Io(PathBuf, std::io::Error),
    Parse {
        path: Option<PathBuf>,
        line: usize,
        source: serde_json::Error,
    },
}

impl RecordsError {
    fn with_path(self, file: &Path) -> Self {
        match self {
            RecordsError::Parse { line, source, .. } => RecordsError::Parse {
                path: Some(file.to_path_buf()),
                line,
                source,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for RecordsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordsError::NotFound(p) => write!(f, "no such file or directory: {}", p.display()),
            RecordsError::Io(p, e) => write!(f, "failed to read {}: {}", p.display(), e),
            RecordsError::Parse { path: Some(p), line, source } => {
                write!(f, "{}:{}: invalid record: {}", p.display(), line, source)
            }
            RecordsError::Parse { path: None, line, source } => {
                write!(f, "line {}: invalid record: {}", line, source)
            }
        }
    }
}

impl std::error::Error for RecordsError {}

pub type Result<T> = std::result::Result<T, RecordsError>;
