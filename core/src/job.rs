//! One rank's full fine-tuning run: features, training, checkpoint, final
//! evaluation.

use crate::config::RunConfig;
use crate::data::{
    FeatureExtractor, FeatureSet, HashingExtractor, Split, cached_features_file, load_examples,
    task_spec,
};
use crate::distributed::{ProcessGroup, SharedCacheGate};
use crate::error::{DdpError, Result};
use crate::eval::{EvaluationEmitter, MetricMap, SubTask, evaluate_model};
use crate::models::{FineTuneModel, build_model};
use crate::train::{TrainOutcome, Trainer};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub const MODEL_FILE: &str = "model.safetensors";
pub const CONFIG_FILE: &str = "run_config.json";

/// Pass identifier of the evaluation after training.
pub const FINAL_PASS: &str = "final";

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub train: Option<TrainOutcome>,
    pub final_metrics: Option<MetricMap>,
    /// Set on the rank that saved the model.
    pub model_path: Option<PathBuf>,
}

/// Loads a split's features through the shared cache: the builder rank
/// extracts and writes them once, every rank reads the finished file.
pub fn load_features(
    config: &RunConfig,
    group: &ProcessGroup,
    extractor: &dyn FeatureExtractor,
    task_name: &str,
    split: Split,
) -> Result<Arc<FeatureSet>> {
    let task = task_spec(task_name)?;
    let path = cached_features_file(
        &config.data_dir,
        split,
        config.model_kind.as_str(),
        extractor.width(),
        task.name,
    );
    let gate = SharedCacheGate::new(group, config.builder_rank)?
        .with_overwrite(config.overwrite_cache);

    let set = gate.load_or_build(
        &path,
        |tmp| {
            let source = split.examples_file(&config.data_dir, task.name);
            let examples = load_examples(&source, split)?;
            info!(
                task = task.name,
                %split,
                examples = examples.len(),
                source = %source.display(),
                "creating features"
            );
            FeatureSet::from_examples(extractor, &task, &examples)?.save(tmp)
        },
        FeatureSet::load,
    )?;
    info!(rank = group.rank(), task = task.name, %split, rows = set.labels().len(), "features loaded");
    Ok(Arc::new(set))
}

/// Runs training and/or evaluation for this rank, then destroys `group`.
///
/// Every rank must call this with the same config apart from `rank`.
pub fn run(config: &RunConfig, group: &mut ProcessGroup) -> Result<JobOutcome> {
    let outcome = run_inner(config, group);
    if group.is_active() {
        group.destroy()?;
    }
    outcome
}

fn run_inner(config: &RunConfig, group: &ProcessGroup) -> Result<JobOutcome> {
    if config.rank != group.rank() || config.world_size != group.world_size() {
        return Err(DdpError::config(
            "rank",
            format!(
                "config says rank {}/{}, process group is rank {}/{}",
                config.rank,
                config.world_size,
                group.rank(),
                group.world_size()
            ),
        ));
    }
    let task = task_spec(&config.task_name)?;
    if task.output_mode != config.model_kind.output_mode() {
        return Err(DdpError::config(
            "model_kind",
            format!(
                "{} cannot be fine-tuned on {} ({:?} task)",
                config.model_kind, task.name, task.output_mode
            ),
        ));
    }
    info!(
        rank = group.rank(),
        world_size = group.world_size(),
        task = task.name,
        model = %config.model_kind,
        "starting fine-tuning run"
    );

    let extractor = HashingExtractor::new(config.feature_width)?;
    let mut model = build_model(
        config.model_kind,
        config.feature_width,
        task.num_labels(),
        config.seed,
    )?;

    let emitter = EvaluationEmitter::for_rank(
        group.rank_info(),
        task.name,
        &config.output_dir,
    );
    let mut eval_sets = BTreeMap::new();
    if config.do_eval {
        for sub in emitter.sub_tasks() {
            let set = load_features(config, group, &extractor, &sub.name, Split::Dev)?;
            eval_sets.insert(sub.name.clone(), set);
        }
    }
    let score = |model: &dyn FineTuneModel, sub: &SubTask| -> Result<MetricMap> {
        let set = eval_sets.get(&sub.name).ok_or_else(|| {
            DdpError::InvalidState(format!("no evaluation features for {}", sub.name))
        })?;
        evaluate_model(model, Arc::clone(set), config.eval_batch_size, &task_spec(&sub.name)?)
    };

    let mut train = None;
    let mut model_path = None;
    if config.do_train {
        let train_set = load_features(config, group, &extractor, task.name, Split::Train)?;
        let mut optimizer = config
            .optimizer
            .build(config.adam_epsilon, config.weight_decay);
        let mut trainer = Trainer::new(config, group)?;
        let outcome = trainer.train(model.as_mut(), optimizer.as_mut(), train_set, score)?;
        info!(
            global_step = outcome.global_step,
            average_loss = outcome.average_loss,
            "training done"
        );

        if group.rank() == config.builder_rank {
            std::fs::create_dir_all(&config.output_dir).map_err(|e| {
                DdpError::io(format!("creating {}", config.output_dir.display()), e)
            })?;
            let path = config.output_dir.join(MODEL_FILE);
            model.save(&path)?;
            config.save_json(&config.output_dir.join(CONFIG_FILE))?;
            info!(path = %path.display(), "saved model checkpoint");
            model_path = Some(path);
        }
        train = Some(outcome);
    } else {
        let path = config.output_dir.join(MODEL_FILE);
        if path.exists() {
            model.load(&path)?;
            info!(path = %path.display(), "loaded model checkpoint");
        } else {
            warn!(path = %path.display(), "no checkpoint found, evaluating initial weights");
        }
    }

    let mut final_metrics = None;
    if config.do_eval {
        group.barrier()?;
        final_metrics = Some(emitter.evaluate(FINAL_PASS, |sub| score(&*model, sub))?);
        group.barrier()?;
    }

    Ok(JobOutcome {
        train,
        final_metrics,
        model_path,
    })
}
