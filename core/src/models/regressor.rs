//! Single-output linear regressor trained with mean squared error.

use super::params::Parameter;
use super::traits::{FineTuneModel, ForwardOutput};
use super::{ModelKind, xavier_uniform};
use crate::data::Batch;
use crate::error::{DdpError, Result};
use rand::rngs::StdRng;

pub struct LinearRegressor {
    width: usize,
    params: Vec<Parameter>,
}

impl LinearRegressor {
    pub fn new(width: usize, rng: &mut StdRng) -> Result<Self> {
        let weight = Parameter::new("regressor.weight", vec![1, width], xavier_uniform(width, 1, rng))?;
        let bias = Parameter::new("regressor.bias", vec![1], vec![0.0])?;
        Ok(Self {
            width,
            params: vec![weight, bias],
        })
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<f32>> {
        if batch.width != self.width {
            return Err(DdpError::ShapeMismatch {
                expected: vec![batch.len(), self.width],
                got: vec![batch.len(), batch.width],
            });
        }
        let weight = &self.params[0].value;
        let bias = self.params[1].value[0];
        Ok(batch
            .rows()
            .map(|x| bias + weight.iter().zip(x).map(|(w, v)| w * v).sum::<f32>())
            .collect())
    }
}

impl FineTuneModel for LinearRegressor {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearRegressor
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn forward(&self, batch: &Batch) -> Result<ForwardOutput> {
        let predictions = self.predict(batch)?;
        let sq: f32 = predictions
            .iter()
            .zip(&batch.labels)
            .map(|(y, t)| (y - t) * (y - t))
            .sum();
        let loss = if batch.is_empty() {
            0.0
        } else {
            sq / batch.len() as f32
        };
        Ok(ForwardOutput {
            loss,
            predictions,
            num_outputs: 1,
        })
    }

    fn backward(&mut self, batch: &Batch, loss_scale: f32) -> Result<()> {
        let predictions = self.predict(batch)?;
        if batch.is_empty() {
            return Ok(());
        }
        let scale = 2.0 * loss_scale / batch.len() as f32;
        let residuals: Vec<f32> = predictions
            .iter()
            .zip(&batch.labels)
            .map(|(y, t)| scale * (y - t))
            .collect();

        let grad_w = self.params[0].grad_mut();
        for (r, x) in residuals.iter().zip(batch.rows()) {
            grad_w.iter_mut().zip(x).for_each(|(g, v)| *g += r * v);
        }
        self.params[1].grad_mut()[0] += residuals.iter().sum::<f32>();
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_mse_and_gradient() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut model = LinearRegressor::new(2, &mut rng).unwrap();
        model.params[0].value = vec![1.0, 2.0];
        model.params[1].value = vec![0.5];

        // predictions: 1.5 and 2.5; targets 1.0 and 3.0
        let batch = Batch::new(vec![1.0, 0.0, 0.0, 1.0], 2, vec![1.0, 3.0]).unwrap();
        let out = model.forward(&batch).unwrap();
        assert_eq!(out.predictions, vec![1.5, 2.5]);
        assert!((out.loss - 0.25).abs() < 1e-6);

        model.backward(&batch, 1.0).unwrap();
        // d/dy = 2 (y - t) / n = [0.5, -0.5]
        assert_eq!(model.params[0].grad, Some(vec![0.5, -0.5]));
        assert_eq!(model.params[1].grad, Some(vec![0.0]));
    }
}
