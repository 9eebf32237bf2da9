use ddp_rs::data::{FeatureSet, Split, cached_features_file, synthetic, task_spec};
use ddp_rs::distributed::{CollectiveBackend, LocalBackend, ProcessGroup};
use ddp_rs::eval::{ConsistencyVerifier, MetricValue, evaluate_model, read_results};
use ddp_rs::job::{self, JobOutcome, MODEL_FILE};
use ddp_rs::models::{ModelKind, build_model};
use ddp_rs::optim::OptimizerKind;
use ddp_rs::telemetry::LossCurve;
use ddp_rs::{DdpError, RunConfig};
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn base_config(root: &Path, task: &str) -> RunConfig {
    RunConfig {
        data_dir: root.join("data"),
        output_dir: root.join("out"),
        task_name: task.to_string(),
        feature_width: 32,
        train_batch_size: 4,
        eval_batch_size: 8,
        gradient_accumulation_steps: 2,
        learning_rate: 0.05,
        num_train_epochs: 2,
        seed: 7,
        ..Default::default()
    }
}

fn run_world(config: RunConfig) -> Vec<JobOutcome> {
    let handles: Vec<_> = LocalBackend::create_world(config.world_size)
        .into_iter()
        .map(|backend| {
            let mut config = config.clone();
            thread::spawn(move || {
                config.rank = backend.rank();
                let mut group = ProcessGroup::from_backend(Box::new(backend)).unwrap();
                let outcome = job::run(&config, &mut group).unwrap();
                assert!(!group.is_active());
                outcome
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_two_ranks_train_to_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), "sst-2");
    config.world_size = 2;
    let task = task_spec("sst-2").unwrap();
    synthetic::write_task_files(&config.data_dir, &task, 64, 24, 1).unwrap();

    let outcomes = run_world(config.clone());

    // 64 rows over 2 ranks, 4 per batch, 2 batches per update: 4 updates per epoch.
    for outcome in &outcomes {
        let train = outcome.train.as_ref().unwrap();
        assert_eq!(train.global_step, 8);
        assert!(train.average_loss.is_finite());
        assert_eq!(train.timing.epochs.len(), 2);
    }
    assert_eq!(
        outcomes[0].model_path.as_deref(),
        Some(config.output_dir.join(MODEL_FILE).as_path())
    );
    assert!(outcomes[1].model_path.is_none());
    assert!(config.output_dir.join("run_config.json").exists());
    assert_eq!(outcomes[0].final_metrics, outcomes[1].final_metrics);

    // Features were cached once by the builder.
    assert!(cached_features_file(&config.data_dir, Split::Train, "softmax-classifier", 32, "sst-2").exists());

    for rank in 0..2 {
        let log = config.output_dir.join(format!("loss_log_rank_{rank}.json"));
        let curve = LossCurve::load(&log).unwrap();
        assert_eq!(curve.len(), 16);
        assert_eq!(curve.rank, Some(rank));

        let final_results = config
            .output_dir
            .join(format!("rank_{rank}"))
            .join("eval_results_final.txt");
        let metrics = read_results(&final_results).unwrap();
        assert!(matches!(metrics.get("acc"), Some(MetricValue::Float(_))));
    }

    let report = ConsistencyVerifier::new(&config.output_dir).run().unwrap();
    let ids: Vec<&str> = report.passes().iter().map(|p| p.pass_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "final"]);
    assert_eq!(report.inconsistent_count(), 0);

    // The saved checkpoint restores the trained weights.
    let initial = build_model(ModelKind::SoftmaxClassifier, 32, 2, config.seed).unwrap();
    let mut restored = build_model(ModelKind::SoftmaxClassifier, 32, 2, config.seed).unwrap();
    restored.load(&config.output_dir.join(MODEL_FILE)).unwrap();
    let changed = initial
        .parameters()
        .iter()
        .zip(restored.parameters())
        .any(|(a, b)| a.value != b.value);
    assert!(changed);

    let dev = FeatureSet::load(&cached_features_file(
        &config.data_dir,
        Split::Dev,
        "softmax-classifier",
        32,
        "sst-2",
    ))
    .unwrap();
    let rescored = evaluate_model(restored.as_ref(), Arc::new(dev), config.eval_batch_size, &task).unwrap();
    assert_eq!(Some(rescored), outcomes[0].final_metrics);
}

#[test]
fn test_max_steps_stops_early_without_epoch_eval() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), "rte");
    config.world_size = 2;
    config.max_steps = Some(2);
    let task = task_spec("rte").unwrap();
    synthetic::write_task_files(&config.data_dir, &task, 64, 16, 2).unwrap();

    let outcomes = run_world(config.clone());
    for outcome in &outcomes {
        // Training stops once the step count passes the limit.
        assert_eq!(outcome.train.as_ref().unwrap().global_step, 3);
    }

    let report = ConsistencyVerifier::new(&config.output_dir).run().unwrap();
    let ids: Vec<&str> = report.passes().iter().map(|p| p.pass_id.as_str()).collect();
    assert_eq!(ids, vec!["final"]);
}

#[test]
fn test_single_process_mnli_writes_matched_and_mismatched() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), "mnli");
    config.num_train_epochs = 1;
    let task = task_spec("mnli").unwrap();
    synthetic::write_task_files(&config.data_dir, &task, 16, 8, 3).unwrap();

    let mut group = ProcessGroup::single();
    let outcome = job::run(&config, &mut group).unwrap();
    assert!(outcome.train.is_some());

    assert!(config.output_dir.join("eval_results_1.txt").exists());
    assert!(config.output_dir.join("eval_results_final.txt").exists());
    assert!(config.output_dir.join("loss_log.json").exists());
    let mm = dir.path().join("out-MM").join("eval_results_final.txt");
    assert!(mm.exists());
}

#[test]
fn test_eval_only_run_uses_saved_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), "sts-b");
    config.model_kind = ModelKind::LinearRegressor;
    let task = task_spec("sts-b").unwrap();
    synthetic::write_task_files(&config.data_dir, &task, 32, 16, 4).unwrap();

    let trained = job::run(&config, &mut ProcessGroup::single()).unwrap();
    let metrics = trained.final_metrics.unwrap();
    assert!(metrics.contains_key("pearson"));
    assert!(metrics.contains_key("spearmanr"));

    config.do_train = false;
    let evaluated = job::run(&config, &mut ProcessGroup::single()).unwrap();
    assert!(evaluated.train.is_none());
    assert_eq!(evaluated.final_metrics.unwrap(), metrics);
}

#[test]
fn test_sgd_run_records_its_optimizer() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = base_config(dir.path(), "rte");
    config.optimizer = OptimizerKind::Sgd;
    config.num_train_epochs = 1;
    let task = task_spec("rte").unwrap();
    synthetic::write_task_files(&config.data_dir, &task, 16, 8, 5).unwrap();

    let outcome = job::run(&config, &mut ProcessGroup::single()).unwrap();
    // 16 rows, 4 per batch, 2 batches per update.
    assert_eq!(outcome.train.unwrap().global_step, 2);

    let saved = RunConfig::from_json_file(&config.output_dir.join("run_config.json")).unwrap();
    assert_eq!(saved.optimizer, OptimizerKind::Sgd);
}

#[test]
fn test_model_must_match_task_output_mode() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path(), "sts-b");
    let err = job::run(&config, &mut ProcessGroup::single()).unwrap_err();
    assert!(matches!(err, DdpError::Config { .. }));
}
