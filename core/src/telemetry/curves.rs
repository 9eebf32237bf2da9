//! Reading loss logs back as curves.
//!
//! Older logs only carry `step_loss` (or just `loss`); the running total and
//! average are derived for them.

use crate::error::{DdpError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Points skipped by the zoomed view; early losses dwarf the rest.
pub const DEFAULT_ZOOM_SKIP: usize = 5;

#[derive(Debug, Deserialize)]
struct LoggedStep {
    global_step: Option<usize>,
    step_loss: Option<f64>,
    loss: Option<f64>,
    total_loss: Option<f64>,
    avg_loss: Option<f64>,
}

impl LoggedStep {
    fn loss(&self) -> Option<f64> {
        self.step_loss.or(self.loss)
    }
}

/// Loss series of one rank.
#[derive(Debug, Clone, PartialEq)]
pub struct LossCurve {
    /// `None` for a single-process log.
    pub rank: Option<usize>,
    pub steps: Vec<usize>,
    pub total_losses: Vec<f64>,
    pub avg_losses: Vec<f64>,
}

impl LossCurve {
    /// Loads a loss log, deriving whatever series the document lacks.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DdpError::io(format!("reading loss log {}", path.display()), e))?;
        let entries: Vec<LoggedStep> = serde_json::from_str(&text)?;
        let rank = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(rank_from_file_name);
        Self::from_entries(rank, &entries).map_err(|reason| {
            DdpError::InvalidState(format!("{}: {reason}", path.display()))
        })
    }

    fn from_entries(rank: Option<usize>, entries: &[LoggedStep]) -> std::result::Result<Self, String> {
        let steps = entries
            .iter()
            .enumerate()
            .map(|(i, e)| e.global_step.unwrap_or(i))
            .collect();

        let has_totals = entries.iter().all(|e| e.total_loss.is_some());
        let has_avgs = entries.iter().all(|e| e.avg_loss.is_some());

        let mut running = Vec::with_capacity(entries.len());
        if !(has_totals && has_avgs) {
            let mut sum = 0.0;
            for (i, e) in entries.iter().enumerate() {
                sum += e
                    .loss()
                    .ok_or_else(|| format!("record {i} has neither step_loss nor loss"))?;
                running.push(sum);
            }
        }

        let total_losses = if has_totals {
            entries.iter().filter_map(|e| e.total_loss).collect()
        } else {
            running.clone()
        };
        let avg_losses = if has_avgs {
            entries.iter().filter_map(|e| e.avg_loss).collect()
        } else {
            running
                .iter()
                .enumerate()
                .map(|(i, total)| total / (i + 1) as f64)
                .collect()
        };

        Ok(Self {
            rank,
            steps,
            total_losses,
            avg_losses,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The curve without its first `skip` points.
    pub fn zoomed(&self, skip: usize) -> Self {
        let skip = skip.min(self.len());
        Self {
            rank: self.rank,
            steps: self.steps[skip..].to_vec(),
            total_losses: self.total_losses[skip..].to_vec(),
            avg_losses: self.avg_losses[skip..].to_vec(),
        }
    }
}

/// Y-axis bounds covering every curve's average loss, padded by 10% of the
/// spread and clamped at 0 from below.
pub fn avg_loss_range(curves: &[LossCurve]) -> Option<(f64, f64)> {
    let mut values = curves.iter().flat_map(|c| c.avg_losses.iter().copied());
    let first = values.next()?;
    let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let margin = (max - min) * 0.1;
    Some(((min - margin).max(0.0), max + margin))
}

fn rank_from_file_name(name: &str) -> Option<usize> {
    name.strip_prefix("loss_log_rank_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Loss logs in `dir`: every `loss_log_rank_<id>.json` by ascending id, or the
/// single-process `loss_log.json` when there are none.
pub fn discover_loss_logs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| DdpError::io(format!("listing {}", dir.display()), e))?;

    let mut ranked = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DdpError::io(format!("listing {}", dir.display()), e))?;
        let name = entry.file_name();
        if let Some(rank) = name.to_str().and_then(rank_from_file_name) {
            ranked.push((rank, entry.path()));
        }
    }
    ranked.sort();

    if ranked.is_empty() {
        let single = dir.join("loss_log.json");
        return Ok(if single.is_file() { vec![single] } else { Vec::new() });
    }
    Ok(ranked.into_iter().map(|(_, p)| p).collect())
}
