//! Offline cross-rank comparison of evaluation results.
//!
//! Discover `rank_<id>` directories → group their `eval_results_<pass>.txt`
//! files by pass → parse → compare each metric across ranks.

use super::metrics::MetricValue;
use super::report::{PassComparison, Report};
use super::results_file::{pass_id_from_file_name, read_results};
use crate::error::{DdpError, Result};
use ddp_rs_kernels::{Summary, summarize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Largest spread still considered the same number (exclusive).
pub const DEFAULT_TOLERANCE: f64 = 1e-5;

/// How a rank without a metric is rendered.
pub const MISSING_SENTINEL: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Consistent,
    Inconsistent,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Consistent => f.write_str("CONSISTENT"),
            Classification::Inconsistent => f.write_str("INCONSISTENT"),
        }
    }
}

/// The outcome for one metric key within one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub key: String,
    /// One entry per contributing rank, ascending; `None` is the missing sentinel.
    pub values: Vec<(usize, Option<MetricValue>)>,
    pub classification: Classification,
    /// Present for numeric metrics with at least one value.
    pub summary: Option<Summary>,
    pub has_missing: bool,
}

impl Verdict {
    pub fn is_numeric(&self) -> bool {
        self.values
            .iter()
            .filter_map(|(_, v)| v.as_ref())
            .all(|v| v.as_f64().is_some())
    }
}

/// Classifies one metric from its per-rank values.
///
/// Numeric when every present value is a float: CONSISTENT iff `max - min`
/// is strictly below `tolerance`. Otherwise categorical: CONSISTENT iff all
/// rendered values, the missing sentinel included, are identical.
pub fn compare_metric(
    key: &str,
    mut values: Vec<(usize, Option<MetricValue>)>,
    tolerance: f64,
) -> Verdict {
    values.sort_by_key(|(rank, _)| *rank);
    let has_missing = values.iter().any(|(_, v)| v.is_none());

    let present: Vec<&MetricValue> = values.iter().filter_map(|(_, v)| v.as_ref()).collect();
    let numbers: Option<Vec<f64>> = present.iter().map(|v| v.as_f64()).collect();

    let (classification, summary) = match numbers {
        Some(numbers) => {
            let summary = summarize(&numbers);
            let spread = summary.map_or(0.0, |s| s.max_diff());
            let classification = if spread < tolerance {
                Classification::Consistent
            } else {
                Classification::Inconsistent
            };
            (classification, summary)
        }
        None => {
            let distinct: BTreeSet<String> = values
                .iter()
                .map(|(_, v)| render_value(v.as_ref()))
                .collect();
            let classification = if distinct.len() == 1 {
                Classification::Consistent
            } else {
                Classification::Inconsistent
            };
            (classification, None)
        }
    };

    Verdict {
        key: key.to_string(),
        values,
        classification,
        summary,
        has_missing,
    }
}

pub fn render_value(value: Option<&MetricValue>) -> String {
    value.map_or_else(|| MISSING_SENTINEL.to_string(), |v| v.to_string())
}

/// Reads every rank's evaluation files under one root and compares them.
pub struct ConsistencyVerifier {
    root: PathBuf,
    tolerance: f64,
}

impl ConsistencyVerifier {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `rank_<id>` directories under the root, by ascending id. Two
    /// directories naming the same id are an error.
    pub fn discover_ranks(&self) -> Result<Vec<(usize, PathBuf)>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| DdpError::io(format!("listing {}", self.root.display()), e))?;

        let mut ranks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DdpError::io(format!("listing {}", self.root.display()), e))?;
            let name = entry.file_name();
            let Some(suffix) = name.to_str().and_then(|n| n.strip_prefix("rank_")) else {
                continue;
            };
            if !entry.path().is_dir() {
                continue;
            }
            match suffix.parse::<usize>() {
                Ok(id) => ranks.push((id, entry.path())),
                Err(_) => warn!(dir = %entry.path().display(), "skipping rank directory with a non-numeric id"),
            }
        }
        ranks.sort();
        // `rank_1` and `rank_01` parse to the same id.
        if let Some(pair) = ranks.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(DdpError::InvalidState(format!(
                "rank {} has two result directories: {} and {}",
                pair[0].0,
                pair[0].1.display(),
                pair[1].1.display()
            )));
        }
        Ok(ranks)
    }

    /// Result files per pass identifier, each list ascending by rank.
    pub fn group_by_pass(
        &self,
        ranks: &[(usize, PathBuf)],
    ) -> Result<BTreeMap<String, Vec<(usize, PathBuf)>>> {
        let mut passes: BTreeMap<String, Vec<(usize, PathBuf)>> = BTreeMap::new();
        for (rank, dir) in ranks {
            let entries = std::fs::read_dir(dir)
                .map_err(|e| DdpError::io(format!("listing {}", dir.display()), e))?;
            for entry in entries {
                let entry = entry.map_err(|e| DdpError::io(format!("listing {}", dir.display()), e))?;
                let name = entry.file_name();
                if let Some(pass) = name.to_str().and_then(pass_id_from_file_name) {
                    debug!(rank, pass, "found evaluation results");
                    passes
                        .entry(pass.to_string())
                        .or_default()
                        .push((*rank, entry.path()));
                }
            }
        }
        for files in passes.values_mut() {
            files.sort();
        }
        Ok(passes)
    }

    /// Compares one pass. `all_ranks` lists every discovered rank so that
    /// ranks without a file can be reported as absent.
    pub fn compare_pass(
        &self,
        pass_id: &str,
        files: &[(usize, PathBuf)],
        all_ranks: &[usize],
    ) -> Result<PassComparison> {
        let mut parsed = BTreeMap::new();
        for (rank, path) in files {
            parsed.insert(*rank, read_results(path)?);
        }

        let keys: BTreeSet<&String> = parsed.values().flat_map(|m| m.keys()).collect();
        let verdicts = keys
            .into_iter()
            .map(|key| {
                let values = parsed
                    .iter()
                    .map(|(rank, metrics)| (*rank, metrics.get(key).cloned()))
                    .collect();
                compare_metric(key, values, self.tolerance)
            })
            .collect();

        Ok(PassComparison {
            pass_id: pass_id.to_string(),
            ranks: parsed.keys().copied().collect(),
            absent_ranks: all_ranks
                .iter()
                .copied()
                .filter(|r| !parsed.contains_key(r))
                .collect(),
            verdicts,
        })
    }

    /// Runs the whole discover → group → parse → compare pipeline.
    ///
    /// Empty inputs produce a report saying so, not an error.
    pub fn run(&self) -> Result<Report> {
        let ranks = self.discover_ranks()?;
        if ranks.is_empty() {
            return Ok(Report::NoRankDirectories {
                root: self.root.clone(),
            });
        }

        let passes = self.group_by_pass(&ranks)?;
        if passes.is_empty() {
            return Ok(Report::NoResultFiles {
                root: self.root.clone(),
            });
        }

        let all_ranks: Vec<usize> = ranks.iter().map(|(id, _)| *id).collect();
        let passes = passes
            .iter()
            .map(|(pass, files)| self.compare_pass(pass, files, &all_ranks))
            .collect::<Result<Vec<_>>>()?;

        Ok(Report::Compared {
            root: self.root.clone(),
            ranks: all_ranks,
            passes,
        })
    }
}
