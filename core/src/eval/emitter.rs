//! Rank-local evaluation passes and their result files.

use super::metrics::MetricMap;
use super::results_file::{results_file_name, write_results};
use crate::config::{Rank, RunConfig};
use crate::error::{DdpError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// One evaluation run inside a pass, with the root its files go under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTask {
    pub name: String,
    pub output_root: PathBuf,
}

/// MNLI is evaluated twice (matched and mismatched); the mismatched results go
/// under `<output_dir>-MM`. Other tasks are a single sub-task.
pub fn sub_tasks(task_name: &str, output_dir: &Path) -> Vec<SubTask> {
    if task_name == "mnli" {
        let mut mm = output_dir.as_os_str().to_os_string();
        mm.push("-MM");
        vec![
            SubTask {
                name: "mnli".to_string(),
                output_root: output_dir.to_path_buf(),
            },
            SubTask {
                name: "mnli-mm".to_string(),
                output_root: PathBuf::from(mm),
            },
        ]
    } else {
        vec![SubTask {
            name: task_name.to_string(),
            output_root: output_dir.to_path_buf(),
        }]
    }
}

/// Writes `<root>[/rank_<id>]/eval_results_<pass>.txt` for every sub-task.
pub struct EvaluationEmitter {
    rank: Rank,
    sub_tasks: Vec<SubTask>,
}

impl EvaluationEmitter {
    pub fn new(config: &RunConfig) -> Result<Self> {
        Ok(Self::for_rank(
            config.rank_info()?,
            &config.task_name.to_lowercase(),
            &config.output_dir,
        ))
    }

    pub fn for_rank(rank: Rank, task_name: &str, output_dir: &Path) -> Self {
        Self {
            rank,
            sub_tasks: sub_tasks(task_name, output_dir),
        }
    }

    pub fn sub_tasks(&self) -> &[SubTask] {
        &self.sub_tasks
    }

    /// Directory this rank writes `sub`'s files to.
    pub fn results_dir(&self, sub: &SubTask) -> PathBuf {
        self.rank.scoped_dir(&sub.output_root)
    }

    pub fn results_path(&self, sub: &SubTask, pass_id: &str) -> PathBuf {
        self.results_dir(sub).join(results_file_name(pass_id))
    }

    /// Runs `run` once per sub-task, persists each result and returns all of
    /// them merged (later sub-tasks win on key clashes). An empty `pass_id`
    /// writes `eval_results_.txt`.
    pub fn evaluate<F>(&self, pass_id: &str, mut run: F) -> Result<MetricMap>
    where
        F: FnMut(&SubTask) -> Result<MetricMap>,
    {
        if pass_id.contains(['/', '\\']) {
            return Err(DdpError::InvalidState(format!(
                "pass identifier {pass_id:?} cannot be used in a file name"
            )));
        }

        let mut merged = MetricMap::new();
        for sub in &self.sub_tasks {
            let dir = self.results_dir(sub);
            std::fs::create_dir_all(&dir)
                .map_err(|e| DdpError::io(format!("creating {}", dir.display()), e))?;

            info!(
                rank = self.rank.id(),
                task = %sub.name,
                pass = pass_id,
                "running evaluation"
            );
            let result = run(sub)?;

            let path = dir.join(results_file_name(pass_id));
            write_results(&path, &result)?;
            for (key, value) in &result {
                info!(rank = self.rank.id(), pass = pass_id, "  {key} = {value}");
            }
            merged.extend(result);
        }
        Ok(merged)
    }
}
