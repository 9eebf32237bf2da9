//! Run configuration and rank identity.
//!
//! A [`RunConfig`] is built once at startup (from flags or a JSON file),
//! validated once, and then handed by reference to every component.

use crate::error::{DdpError, Result};
use crate::models::ModelKind;
use crate::optim::OptimizerKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Identity of one participant in a run. Immutable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rank {
    id: usize,
    world_size: usize,
}

impl Rank {
    /// # Errors
    ///
    /// Returns `InvalidRank` unless `id < world_size`.
    pub fn new(id: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 || id >= world_size {
            return Err(DdpError::InvalidRank {
                rank: id,
                world_size,
            });
        }
        Ok(Self { id, world_size })
    }

    /// The rank of a single-process run.
    pub fn single() -> Self {
        Self {
            id: 0,
            world_size: 1,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    pub fn is_distributed(&self) -> bool {
        self.world_size > 1
    }

    /// `<base>/rank_<id>` for distributed runs, `<base>` otherwise.
    pub fn scoped_dir(&self, base: &Path) -> PathBuf {
        if self.is_distributed() {
            base.join(rank_dir_name(self.id))
        } else {
            base.to_path_buf()
        }
    }
}

/// Directory name that holds one rank's evaluation files.
pub fn rank_dir_name(id: usize) -> String {
    format!("rank_{id}")
}

/// Everything a rank needs to know about the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub rank: usize,
    pub world_size: usize,
    pub master_addr: Option<String>,
    pub master_port: Option<u16>,
    /// Seconds a non-root rank keeps retrying the rendezvous connection.
    pub rendezvous_timeout_secs: u64,

    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub task_name: String,
    pub model_kind: ModelKind,
    /// Fixed width of extracted feature vectors (the max sequence length).
    pub feature_width: usize,

    pub train_batch_size: usize,
    pub eval_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub learning_rate: f32,
    pub weight_decay: f32,
    pub adam_epsilon: f32,
    pub optimizer: OptimizerKind,
    pub max_grad_norm: f32,
    pub num_train_epochs: usize,
    /// When set, overrides `num_train_epochs`.
    pub max_steps: Option<usize>,
    pub warmup_steps: usize,
    pub seed: u64,

    pub overwrite_output_dir: bool,
    pub overwrite_cache: bool,
    pub do_train: bool,
    pub do_eval: bool,
    /// Rank that builds shared cache artifacts and saves the final model.
    pub builder_rank: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rank: 0,
            world_size: 1,
            master_addr: None,
            master_port: None,
            rendezvous_timeout_secs: 300,
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            task_name: "rte".to_string(),
            model_kind: ModelKind::SoftmaxClassifier,
            feature_width: 128,
            train_batch_size: 8,
            eval_batch_size: 8,
            gradient_accumulation_steps: 1,
            learning_rate: 5e-5,
            weight_decay: 0.0,
            adam_epsilon: 1e-8,
            optimizer: OptimizerKind::AdamW,
            max_grad_norm: 1.0,
            num_train_epochs: 3,
            max_steps: None,
            warmup_steps: 0,
            seed: 42,
            overwrite_output_dir: false,
            overwrite_cache: false,
            do_train: true,
            do_eval: true,
            builder_rank: 0,
        }
    }
}

impl RunConfig {
    /// Reads a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DdpError::io(format!("reading config {}", path.display()), e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Writes the config next to the saved model.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|e| DdpError::io(format!("writing config {}", path.display()), e))
    }

    /// Checks every invariant that must hold before a collective is opened.
    ///
    /// # Errors
    ///
    /// * `InvalidRank` if `rank >= world_size` or `world_size == 0`.
    /// * `MissingRendezvous` if `world_size > 1` without address and port.
    /// * `OutputDirNotEmpty` if training would clobber a populated directory.
    /// * `Config` for out-of-range hyperparameters.
    pub fn validate(&self) -> Result<()> {
        let rank = self.rank_info()?;
        if self.builder_rank >= self.world_size {
            return Err(DdpError::config(
                "builder_rank",
                format!(
                    "{} is not a rank of a world of size {}",
                    self.builder_rank, self.world_size
                ),
            ));
        }

        if rank.is_distributed() && self.rendezvous_address().is_none() {
            return Err(DdpError::MissingRendezvous {
                world_size: self.world_size,
            });
        }

        if self.gradient_accumulation_steps == 0 {
            return Err(DdpError::config(
                "gradient_accumulation_steps",
                "must be at least 1",
            ));
        }
        if self.train_batch_size == 0 || self.eval_batch_size == 0 {
            return Err(DdpError::config("batch_size", "must be at least 1"));
        }
        if self.feature_width == 0 {
            return Err(DdpError::config("feature_width", "must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate >= 0.0) {
            return Err(DdpError::config(
                "learning_rate",
                format!("{} is not a non-negative finite number", self.learning_rate),
            ));
        }
        if self.task_name.trim().is_empty() {
            return Err(DdpError::config("task_name", "must not be empty"));
        }

        if self.do_train && !self.overwrite_output_dir && dir_is_populated(&self.output_dir)? {
            return Err(DdpError::OutputDirNotEmpty(self.output_dir.clone()));
        }

        Ok(())
    }

    pub fn rank_info(&self) -> Result<Rank> {
        Rank::new(self.rank, self.world_size)
    }

    /// `host:port` when both halves are configured.
    pub fn rendezvous_address(&self) -> Option<String> {
        match (&self.master_addr, self.master_port) {
            (Some(addr), Some(port)) if !addr.is_empty() => Some(format!("{addr}:{port}")),
            _ => None,
        }
    }

    /// Examples in one optimizer step across all ranks.
    pub fn effective_batch_size(&self) -> usize {
        self.train_batch_size * self.gradient_accumulation_steps * self.world_size
    }
}

fn dir_is_populated(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DdpError::io(format!("listing {}", dir.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_config(dir: &Path) -> RunConfig {
        RunConfig {
            output_dir: dir.join("out"),
            ..Default::default()
        }
    }

    #[test]
    fn test_rank_bounds() {
        assert!(Rank::new(0, 1).is_ok());
        assert!(Rank::new(3, 4).is_ok());
        assert!(matches!(
            Rank::new(4, 4),
            Err(DdpError::InvalidRank {
                rank: 4,
                world_size: 4
            })
        ));
        assert!(Rank::new(0, 0).is_err());
    }

    #[test]
    fn test_scoped_dir() {
        let base = Path::new("/tmp/eval");
        assert_eq!(Rank::single().scoped_dir(base), PathBuf::from("/tmp/eval"));
        assert_eq!(
            Rank::new(2, 3).unwrap().scoped_dir(base),
            PathBuf::from("/tmp/eval/rank_2")
        );
    }

    #[test]
    fn test_validate_single_process() {
        let dir = tempfile::tempdir().unwrap();
        fresh_config(dir.path()).validate().unwrap();
    }

    #[test]
    fn test_validate_requires_rendezvous() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fresh_config(dir.path());
        config.world_size = 2;
        config.rank = 1;
        assert!(matches!(
            config.validate(),
            Err(DdpError::MissingRendezvous { world_size: 2 })
        ));

        config.master_addr = Some("127.0.0.1".into());
        assert!(config.validate().is_err());

        config.master_port = Some(29500);
        config.validate().unwrap();
        assert_eq!(config.rendezvous_address().unwrap(), "127.0.0.1:29500");
    }

    #[test]
    fn test_validate_rejects_populated_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fresh_config(dir.path());
        std::fs::create_dir_all(&config.output_dir).unwrap();
        std::fs::write(config.output_dir.join("stale.txt"), "x").unwrap();

        assert!(matches!(
            config.validate(),
            Err(DdpError::OutputDirNotEmpty(_))
        ));

        config.overwrite_output_dir = true;
        config.validate().unwrap();

        config.overwrite_output_dir = false;
        config.do_train = false;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_hyperparameters() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fresh_config(dir.path());
        config.gradient_accumulation_steps = 0;
        assert!(matches!(config.validate(), Err(DdpError::Config { .. })));

        let mut config = fresh_config(dir.path());
        config.builder_rank = 1;
        assert!(matches!(config.validate(), Err(DdpError::Config { .. })));
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, r#"{"task_name": "mnli", "world_size": 2}"#).unwrap();

        let config = RunConfig::from_json_file(&path).unwrap();
        assert_eq!(config.task_name, "mnli");
        assert_eq!(config.world_size, 2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.effective_batch_size(), 16);
    }
}
