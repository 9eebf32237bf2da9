//! # ddp-rs
//!
//! `ddp-rs` runs data-parallel fine-tuning of small classifiers on sentence-pair
//! tasks and checks that every rank of the run agrees on the results.
//!
//! Each rank trains a replica on its shard of the data, averages gradients
//! with its peers at every optimizer step, logs its per-step loss, and writes
//! evaluation results into its own `rank_<id>` directory. After the run the
//! [`eval::ConsistencyVerifier`] compares those files across ranks.
//!
//! ## Modules
//!
//! - [`config`]: [`RunConfig`] and [`Rank`].
//! - [`distributed`]: process groups, collective backends, gradient averaging
//!   and the shared cache gate.
//! - [`data`]: task examples, feature extraction, samplers and the data loader.
//! - [`models`]: fine-tunable heads and their parameters.
//! - [`optim`]: AdamW, SGD and the linear warmup schedule.
//! - [`train`]: the training loop.
//! - [`telemetry`]: per-step loss logs, phase timing and loss curves.
//! - [`eval`]: metrics, result files and the cross-rank verifier.
//! - [`job`]: a complete run for one rank.
//!
//! ## Example
//!
//! ```rust
//! use ddp_rs::eval::{Classification, compare_metric, MetricValue, DEFAULT_TOLERANCE};
//!
//! let values = vec![
//!     (0, Some(MetricValue::Float(0.9123))),
//!     (1, Some(MetricValue::Float(0.9123))),
//!     (2, Some(MetricValue::Float(0.91231))),
//! ];
//! let verdict = compare_metric("acc", values, DEFAULT_TOLERANCE);
//! assert_eq!(verdict.classification, Classification::Consistent);
//! ```

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod distributed;
pub mod error;
pub mod eval;
pub mod job;
pub mod models;
pub mod optim;
pub mod telemetry;
pub mod train;

pub use config::{Rank, RunConfig};
pub use distributed::ProcessGroup;
pub use error::{DdpError, Result};
