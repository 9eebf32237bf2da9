//! Fine-tunable model heads.
//!
//! The training loop only sees the [`FineTuneModel`] capability. Concrete
//! heads are picked once at startup from a [`ModelKind`] tag through
//! [`build_model`].
//!
//! # Example
//!
//! ```rust
//! use ddp_rs::data::Batch;
//! use ddp_rs::models::{build_model, FineTuneModel, ModelKind};
//!
//! let mut model = build_model(ModelKind::SoftmaxClassifier, 4, 2, 42).unwrap();
//! let batch = Batch::new(vec![1.0, 0.0, 0.0, 1.0], 4, vec![1.0]).unwrap();
//!
//! let out = model.forward(&batch).unwrap();
//! assert_eq!(out.predictions.len(), 2);
//!
//! model.backward(&batch, 1.0).unwrap();
//! assert!(model.parameters()[0].grad.is_some());
//! ```

pub mod params;
pub mod regressor;
pub mod softmax;
pub mod traits;

pub use params::{Parameter, clip_grad_norm};
pub use regressor::LinearRegressor;
pub use softmax::SoftmaxClassifier;
pub use traits::{FineTuneModel, ForwardOutput};

use crate::error::{DdpError, Result};
use crate::eval::OutputMode;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry tag of a model head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    SoftmaxClassifier,
    LinearRegressor,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::SoftmaxClassifier, ModelKind::LinearRegressor];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::SoftmaxClassifier => "softmax-classifier",
            ModelKind::LinearRegressor => "linear-regressor",
        }
    }

    pub fn output_mode(&self) -> OutputMode {
        match self {
            ModelKind::SoftmaxClassifier => OutputMode::Classification,
            ModelKind::LinearRegressor => OutputMode::Regression,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = DdpError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                DdpError::config(
                    "model_kind",
                    format!("unknown model kind {s:?}, expected softmax-classifier or linear-regressor"),
                )
            })
    }
}

/// Builds a freshly initialized model. The same `seed` yields the same
/// initial weights on every rank.
pub fn build_model(
    kind: ModelKind,
    feature_width: usize,
    num_labels: usize,
    seed: u64,
) -> Result<Box<dyn FineTuneModel>> {
    if feature_width == 0 {
        return Err(DdpError::config("feature_width", "must be at least 1"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    match kind {
        ModelKind::SoftmaxClassifier => Ok(Box::new(SoftmaxClassifier::new(
            feature_width,
            num_labels,
            &mut rng,
        )?)),
        ModelKind::LinearRegressor => {
            if num_labels != 1 {
                return Err(DdpError::config(
                    "model_kind",
                    format!("linear-regressor predicts one value, task has {num_labels} labels"),
                ));
            }
            Ok(Box::new(LinearRegressor::new(feature_width, &mut rng)?))
        }
    }
}

/// Glorot uniform initialization for a `[fan_out, fan_in]` matrix.
pub(crate) fn xavier_uniform(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Vec<f32> {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    (0..fan_in * fan_out)
        .map(|_| rng.random_range(-bound..bound))
        .collect()
}
