//! # Evaluation
//!
//! Producing per-rank evaluation results and checking them against each other
//! after the fact.
//!
//! * [`EvaluationEmitter`] runs an evaluation pass on one rank and writes
//!   `eval_results_<pass>.txt` into a rank-scoped directory.
//! * [`ConsistencyVerifier`] reads those files for all ranks and classifies
//!   every metric as CONSISTENT or INCONSISTENT.

pub mod emitter;
pub mod metrics;
pub mod report;
pub mod results_file;
pub mod runner;
pub mod verifier;

pub use emitter::{EvaluationEmitter, SubTask, sub_tasks};
pub use metrics::{MetricMap, MetricSet, MetricValue, OutputMode, compute_metrics};
pub use report::{PassComparison, Report};
pub use results_file::{parse_results, read_results, results_file_name, write_results};
pub use runner::evaluate_model;
pub use verifier::{
    Classification, ConsistencyVerifier, DEFAULT_TOLERANCE, MISSING_SENTINEL, Verdict,
    compare_metric,
};
