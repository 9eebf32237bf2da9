use super::params::Parameter;
use super::ModelKind;
use crate::checkpoint::{NamedTensor, load_checkpoint, save_checkpoint};
use crate::data::Batch;
use crate::error::{DdpError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// What one forward pass produces.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardOutput {
    /// Mean loss over the batch.
    pub loss: f32,
    /// Row-major `[batch, num_outputs]` scores (logits or regression values).
    pub predictions: Vec<f32>,
    pub num_outputs: usize,
}

impl ForwardOutput {
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.predictions.chunks(self.num_outputs.max(1))
    }
}

/// The capability every fine-tunable model exposes to the training loop.
///
/// `parameters()` must return parameters in the same structural order on every
/// rank and on every call: gradient synchronization pairs buffers by
/// position, not by name.
pub trait FineTuneModel: Send {
    fn kind(&self) -> ModelKind;

    /// Width of one prediction row.
    fn num_outputs(&self) -> usize;

    fn forward(&self, batch: &Batch) -> Result<ForwardOutput>;

    /// Accumulates `loss_scale * d(loss)/d(param)` into the gradient buffers.
    fn backward(&mut self, batch: &Batch, loss_scale: f32) -> Result<()>;

    fn parameters(&self) -> &[Parameter];

    fn parameters_mut(&mut self) -> &mut [Parameter];

    fn zero_grad(&mut self) {
        for p in self.parameters_mut() {
            p.zero_grad();
        }
    }

    /// Writes every parameter to a safetensors file, keyed by name.
    fn save(&self, path: &Path) -> Result<()> {
        let mut tensors = BTreeMap::new();
        for p in self.parameters() {
            tensors.insert(
                p.name.clone(),
                NamedTensor::new(p.shape.clone(), p.value.clone())?,
            );
        }
        let metadata = [("model_kind".to_string(), self.kind().to_string())]
            .into_iter()
            .collect();
        save_checkpoint(path, &tensors, Some(metadata))
    }

    /// Restores parameter values saved by [`save`](Self::save).
    fn load(&mut self, path: &Path) -> Result<()> {
        let mut tensors = load_checkpoint(path)?;
        for p in self.parameters_mut() {
            let tensor = tensors.remove(&p.name).ok_or_else(|| {
                DdpError::Checkpoint(format!(
                    "{} has no tensor named {}",
                    path.display(),
                    p.name
                ))
            })?;
            if tensor.shape != p.shape {
                return Err(DdpError::ShapeMismatch {
                    expected: p.shape.clone(),
                    got: tensor.shape,
                });
            }
            p.value = tensor.data;
        }
        Ok(())
    }
}
