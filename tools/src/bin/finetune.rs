//! Data-parallel fine-tuning launcher.
//!
//! Every rank runs this binary with the same flags apart from `--rank`:
//!
//! ```bash
//! # two processes on one host
//! finetune --task-name rte --data-dir data --output-dir out \
//!          --world-size 2 --rank 0 --master-addr 127.0.0.1 --master-port 29500 &
//! finetune --task-name rte --data-dir data --output-dir out \
//!          --world-size 2 --rank 1 --master-addr 127.0.0.1 --master-port 29500
//!
//! # the same world as threads of one process, on generated data
//! finetune --task-name rte --synthetic 256 --simulate-ranks 2 --output-dir out
//! ```
//!
//! Afterwards `verify_ranks --input-dir out` compares the ranks' results.

use anyhow::{Context, Result, bail, ensure};
use clap::Parser;
use ddp_rs::data::{synthetic, task_spec};
use ddp_rs::distributed::{CollectiveBackend, LocalBackend, ProcessGroup};
use ddp_rs::job::{self, JobOutcome};
use ddp_rs::models::ModelKind;
use ddp_rs::optim::OptimizerKind;
use ddp_rs::RunConfig;
use std::path::PathBuf;
use std::thread;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "finetune")]
#[command(about = "Fine-tune a classifier head on a sentence-pair task across ranks")]
#[command(version)]
struct Args {
    /// JSON run config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    rank: Option<usize>,
    #[arg(long)]
    world_size: Option<usize>,
    #[arg(long)]
    master_addr: Option<String>,
    #[arg(long)]
    master_port: Option<u16>,

    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    task_name: Option<String>,
    /// softmax-classifier or linear-regressor
    #[arg(long)]
    model_kind: Option<ModelKind>,
    #[arg(long)]
    feature_width: Option<usize>,
    /// adamw or sgd
    #[arg(long)]
    optimizer: Option<OptimizerKind>,

    #[arg(long)]
    train_batch_size: Option<usize>,
    #[arg(long)]
    eval_batch_size: Option<usize>,
    #[arg(long)]
    gradient_accumulation_steps: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f32>,
    #[arg(long)]
    weight_decay: Option<f32>,
    #[arg(long)]
    num_train_epochs: Option<usize>,
    /// Total optimizer steps; overrides --num-train-epochs
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    warmup_steps: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    overwrite_output_dir: bool,
    #[arg(long)]
    overwrite_cache: bool,
    /// Skip training
    #[arg(long)]
    no_train: bool,
    /// Skip evaluation
    #[arg(long)]
    no_eval: bool,

    /// Generate this many training examples (a quarter as many dev examples)
    /// into the data directory first
    #[arg(long)]
    synthetic: Option<usize>,
    /// Stop after generating data
    #[arg(long, requires = "synthetic")]
    prepare_only: bool,
    /// Run a world of N ranks as threads of this process
    #[arg(long)]
    simulate_ranks: Option<usize>,
}

impl Args {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RunConfig::default(),
        };

        let flags = self;
        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = flags.$field.clone() {
                    config.$field = v;
                })*
            };
        }
        set!(
            rank,
            world_size,
            data_dir,
            output_dir,
            task_name,
            model_kind,
            feature_width,
            optimizer,
            train_batch_size,
            eval_batch_size,
            gradient_accumulation_steps,
            learning_rate,
            weight_decay,
            num_train_epochs,
            warmup_steps,
            seed,
        );
        if self.master_addr.is_some() {
            config.master_addr = self.master_addr.clone();
        }
        if self.master_port.is_some() {
            config.master_port = self.master_port;
        }
        if self.max_steps.is_some() {
            config.max_steps = self.max_steps;
        }
        config.overwrite_output_dir |= self.overwrite_output_dir;
        config.overwrite_cache |= self.overwrite_cache;
        config.do_train &= !self.no_train;
        config.do_eval &= !self.no_eval;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let mut config = args.run_config()?;
    if let Some(ranks) = args.simulate_ranks {
        ensure!(ranks > 0, "--simulate-ranks must be at least 1");
        config.world_size = ranks;
        config.rank = 0;
    }

    if let Some(count) = args.synthetic {
        ensure!(
            config.world_size == 1 || args.simulate_ranks.is_some() || args.prepare_only,
            "generate data once with --prepare-only before launching a multi-process run"
        );
        let task = task_spec(&config.task_name)?;
        synthetic::write_task_files(&config.data_dir, &task, count, (count / 4).max(1), config.seed)
            .context("writing synthetic data")?;
        info!(task = task.name, dir = %config.data_dir.display(), count, "synthetic data written");
        if args.prepare_only {
            return Ok(());
        }
    }

    let outcomes = match args.simulate_ranks {
        Some(ranks) => simulate(&config, ranks)?,
        None => {
            config.validate()?;
            let mut group = ProcessGroup::init(&config)?;
            vec![job::run(&config, &mut group)?]
        }
    };

    for (rank, outcome) in outcomes.iter().enumerate() {
        if let Some(train) = &outcome.train {
            info!(rank, global_step = train.global_step, average_loss = train.average_loss, "train summary");
        }
        if let Some(metrics) = &outcome.final_metrics {
            for (key, value) in metrics {
                info!(rank, "final {key} = {value}");
            }
        }
    }
    Ok(())
}

/// Runs every rank of a `ranks`-sized world on its own thread.
fn simulate(config: &RunConfig, ranks: usize) -> Result<Vec<JobOutcome>> {
    // A threaded world needs no rendezvous; check the rest as a world of one.
    let mut single_rank = config.clone();
    single_rank.world_size = 1;
    single_rank.rank = 0;
    single_rank.builder_rank = 0;
    single_rank.validate()?;
    if config.builder_rank >= ranks {
        bail!("builder_rank {} is not a rank of a world of {ranks}", config.builder_rank);
    }

    let handles: Vec<_> = LocalBackend::create_world(ranks)
        .into_iter()
        .map(|backend| {
            let mut config = config.clone();
            thread::spawn(move || -> Result<JobOutcome> {
                config.rank = backend.rank();
                let mut group = ProcessGroup::from_backend(Box::new(backend))?;
                Ok(job::run(&config, &mut group)?)
            })
        })
        .collect();

    handles
        .into_iter()
        .enumerate()
        .map(|(rank, handle)| match handle.join() {
            Ok(outcome) => outcome.with_context(|| format!("rank {rank} failed")),
            Err(_) => bail!("rank {rank} panicked"),
        })
        .collect()
}
