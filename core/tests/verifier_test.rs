use ddp_rs::DdpError;
use ddp_rs::eval::{Classification, ConsistencyVerifier, MetricValue, Report};
use std::path::Path;

fn write_rank_file(root: &Path, rank: usize, pass: &str, body: &str) {
    let dir = root.join(format!("rank_{rank}"));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("eval_results_{pass}.txt")), body).unwrap();
}

#[test]
fn test_tiny_float_drift_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    for rank in 0..3 {
        write_rank_file(dir.path(), rank, "1", "acc = 0.9123\n");
    }
    write_rank_file(dir.path(), 3, "1", "acc = 0.91231\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let verdict = report.pass("1").unwrap().verdict("acc").unwrap();
    assert_eq!(verdict.classification, Classification::Consistent);
    assert!(!verdict.has_missing);
    let summary = verdict.summary.unwrap();
    assert!((summary.max_diff() - 1e-5).abs() < 1e-9);
    assert_eq!(report.inconsistent_count(), 0);
}

#[test]
fn test_spread_equal_to_tolerance_is_inconsistent() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "final", "loss = 0\n");
    write_rank_file(dir.path(), 1, "final", "loss = 0\n");
    write_rank_file(dir.path(), 2, "final", "loss = 0.00001\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let verdict = report.pass("final").unwrap().verdict("loss").unwrap();
    assert_eq!(verdict.classification, Classification::Inconsistent);
    assert_eq!(report.inconsistent_count(), 1);
}

#[test]
fn test_categorical_values_compare_exactly() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "1", "task_name = mnli\nacc = 0.8\n");
    write_rank_file(dir.path(), 1, "1", "task_name = mnli-mm\nacc = 0.8\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let pass = report.pass("1").unwrap();

    let task = pass.verdict("task_name").unwrap();
    assert!(!task.is_numeric());
    assert_eq!(task.classification, Classification::Inconsistent);
    assert!(task.summary.is_none());
    assert_eq!(
        task.values[1].1,
        Some(MetricValue::Text("mnli-mm".to_string()))
    );

    assert_eq!(
        pass.verdict("acc").unwrap().classification,
        Classification::Consistent
    );
}

#[test]
fn test_missing_key_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "2", "acc = 0.5\nf1 = 0.4\n");
    write_rank_file(dir.path(), 1, "2", "acc = 0.5\nf1 = 0.4\n");
    write_rank_file(dir.path(), 2, "2", "acc = 0.5\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let verdict = report.pass("2").unwrap().verdict("f1").unwrap();
    assert!(verdict.has_missing);
    assert_eq!(verdict.values[2], (2, None));
    // The missing rank does not widen the numeric spread.
    assert_eq!(verdict.classification, Classification::Consistent);

    let rendered = report.to_string();
    assert!(rendered.contains("Values across ranks: [0.4, 0.4, N/A]"));
    assert!(rendered.contains("Status: CONSISTENT (missing data)"));
}

#[test]
fn test_ranks_without_a_pass_file_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "1", "acc = 0.5\n");
    write_rank_file(dir.path(), 0, "2", "acc = 0.6\n");
    write_rank_file(dir.path(), 1, "1", "acc = 0.5\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let second = report.pass("2").unwrap();
    assert_eq!(second.ranks, vec![0]);
    assert_eq!(second.absent_ranks, vec![1]);
    assert!(report.to_string().contains("Ranks without results: [1]"));
}

#[test]
fn test_empty_inputs_are_reported_not_errors() {
    let dir = tempfile::tempdir().unwrap();
    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    assert!(matches!(report, Report::NoRankDirectories { .. }));

    std::fs::create_dir_all(dir.path().join("rank_0")).unwrap();
    std::fs::create_dir_all(dir.path().join("rank_1")).unwrap();
    std::fs::write(dir.path().join("rank_0").join("notes.txt"), "x").unwrap();
    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    assert!(matches!(report, Report::NoResultFiles { .. }));
    assert!(report.passes().is_empty());
}

#[test]
fn test_passes_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    for rank in 0..2 {
        write_rank_file(dir.path(), rank, "1", "acc = 0.7\n");
    }
    write_rank_file(dir.path(), 0, "final", "acc = 0.8\n");
    write_rank_file(dir.path(), 1, "final", "acc = 0.9\n");

    let report = ConsistencyVerifier::new(dir.path()).run().unwrap();
    let ids: Vec<&str> = report.passes().iter().map(|p| p.pass_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "final"]);
    assert_eq!(
        report.pass("1").unwrap().verdict("acc").unwrap().classification,
        Classification::Consistent
    );
    assert_eq!(
        report.pass("final").unwrap().verdict("acc").unwrap().classification,
        Classification::Inconsistent
    );
}

#[test]
fn test_looser_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "1", "acc = 0.80\n");
    write_rank_file(dir.path(), 1, "1", "acc = 0.81\n");

    let report = ConsistencyVerifier::new(dir.path())
        .with_tolerance(0.1)
        .run()
        .unwrap();
    assert_eq!(report.inconsistent_count(), 0);
}

#[test]
fn test_duplicate_rank_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_rank_file(dir.path(), 0, "1", "acc = 0.5\n");
    write_rank_file(dir.path(), 1, "1", "acc = 0.5\n");
    let padded = dir.path().join("rank_01");
    std::fs::create_dir_all(&padded).unwrap();
    std::fs::write(padded.join("eval_results_1.txt"), "acc = 0.9\n").unwrap();

    let err = ConsistencyVerifier::new(dir.path()).run().unwrap_err();
    let message = match err {
        DdpError::InvalidState(message) => message,
        other => panic!("expected InvalidState, got {other:?}"),
    };
    assert!(message.contains("rank_1"));
    assert!(message.contains("rank_01"));
}
