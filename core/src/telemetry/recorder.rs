use crate::config::Rank;
use crate::error::{DdpError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Records shown at info level when training starts.
const ECHO_FIRST: usize = 5;

/// One logged micro-step. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStepRecord {
    /// 1-based.
    pub epoch: usize,
    /// Position within the epoch.
    pub step: usize,
    pub global_step: usize,
    pub step_loss: f64,
    /// Sum of `step_loss` over this and every earlier record.
    pub total_loss: f64,
    /// `total_loss / (global_step + 1)`.
    pub avg_loss: f64,
    pub timestamp: String,
}

/// Per-rank, append-only loss log.
#[derive(Debug)]
pub struct StepTelemetryRecorder {
    rank: Rank,
    records: Vec<TrainingStepRecord>,
    total_loss: f64,
}

impl StepTelemetryRecorder {
    pub fn new(rank: Rank) -> Self {
        Self {
            rank,
            records: Vec::new(),
            total_loss: 0.0,
        }
    }

    /// Appends a record and returns it.
    pub fn record(
        &mut self,
        epoch: usize,
        step: usize,
        global_step: usize,
        step_loss: f64,
    ) -> &TrainingStepRecord {
        self.total_loss += step_loss;
        let record = TrainingStepRecord {
            epoch,
            step,
            global_step,
            step_loss,
            total_loss: self.total_loss,
            avg_loss: self.total_loss / (global_step + 1) as f64,
            timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        if self.records.len() < ECHO_FIRST {
            info!(
                rank = self.rank.id(),
                epoch,
                step,
                loss = step_loss,
                total_loss = self.total_loss,
                "step loss"
            );
        }
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[TrainingStepRecord] {
        &self.records
    }

    pub fn total_loss(&self) -> f64 {
        self.total_loss
    }

    /// `loss_log_rank_<id>.json` for distributed runs, `loss_log.json` otherwise.
    pub fn file_name(&self) -> String {
        if self.rank.is_distributed() {
            format!("loss_log_rank_{}.json", self.rank.id())
        } else {
            "loss_log.json".to_string()
        }
    }

    /// Writes all records as a pretty-printed JSON array, creating parent
    /// directories.
    pub fn flush(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DdpError::io(format!("creating {}", parent.display()), e))?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(path, json)
            .map_err(|e| DdpError::io(format!("writing loss log {}", path.display()), e))?;
        info!(path = %path.display(), records = self.records.len(), "loss log saved");
        Ok(())
    }

    /// [`flush`](Self::flush) to `dir/`[`file_name`](Self::file_name).
    pub fn flush_to_dir(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        self.flush(&path)?;
        Ok(path)
    }

    /// Logs the running total of every record.
    pub fn log_totals(&self) {
        for r in &self.records {
            info!(
                rank = self.rank.id(),
                "Epoch {}, Step {}, Global Step {}, Total Loss: {}",
                r.epoch,
                r.step,
                r.global_step,
                r.total_loss
            );
        }
    }
}
