//! Optimizers and learning-rate schedules.

pub mod adamw;
pub mod scheduler;
pub mod sgd;

pub use adamw::AdamW;
pub use scheduler::{LRScheduler, LinearWarmup};
pub use sgd::Sgd;

use crate::error::{DdpError, Result};
use crate::models::Parameter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Registry tag of an optimizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizerKind {
    #[default]
    AdamW,
    Sgd,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 2] = [OptimizerKind::AdamW, OptimizerKind::Sgd];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizerKind::AdamW => "adamw",
            OptimizerKind::Sgd => "sgd",
        }
    }

    /// Builds the optimizer; `epsilon` and `weight_decay` only apply to AdamW.
    pub fn build(&self, epsilon: f32, weight_decay: f32) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::AdamW => Box::new(
                AdamW::new()
                    .with_epsilon(epsilon)
                    .with_weight_decay(weight_decay),
            ),
            OptimizerKind::Sgd => Box::new(Sgd::new()),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizerKind {
    type Err = DdpError;

    fn from_str(s: &str) -> Result<Self> {
        OptimizerKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                DdpError::config("optimizer", format!("unknown optimizer {s:?}, expected adamw or sgd"))
            })
    }
}

/// A trait for optimizers (e.g., SGD, AdamW).
///
/// Optimizers are responsible for updating model parameters based on computed gradients.
pub trait Optimizer: Send {
    /// Performs a single optimization step with learning rate `lr`.
    ///
    /// Parameters that are frozen or have no gradient are skipped. Per-parameter
    /// state is keyed by position, so `params` must keep a stable order.
    ///
    /// # Errors
    ///
    /// Returns an error if a gradient's length differs from its parameter's.
    fn step(&mut self, params: &mut [Parameter], lr: f32) -> Result<()>;

    /// Zeroes every gradient.
    fn zero_grad(&self, params: &mut [Parameter]) {
        for p in params {
            p.zero_grad();
        }
    }
}

fn check_grad_len(param: &Parameter, grad: &[f32]) -> Result<()> {
    if param.value.len() != grad.len() {
        return Err(DdpError::ShapeMismatch {
            expected: param.shape.clone(),
            got: vec![grad.len()],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_kind_parse_and_display() {
        for kind in OptimizerKind::ALL {
            assert_eq!(kind.to_string().parse::<OptimizerKind>().unwrap(), kind);
        }
        assert_eq!(OptimizerKind::default(), OptimizerKind::AdamW);
        assert!("adam".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_built_optimizers_update_parameters() {
        for kind in OptimizerKind::ALL {
            let mut optimizer = kind.build(1e-8, 0.0);
            let mut param = Parameter::new("w", vec![2], vec![1.0, 1.0]).unwrap();
            param.grad = Some(vec![1.0, -1.0]);
            let mut params = vec![param];

            optimizer.step(&mut params, 0.1).unwrap();
            assert!(params[0].value[0] < 1.0, "{kind} did not descend");
            assert!(params[0].value[1] > 1.0, "{kind} did not descend");
        }
    }
}
