use super::{Optimizer, check_grad_len};
use crate::error::Result;
use crate::models::Parameter;
use rayon::prelude::*;
use std::collections::HashMap;

/// AdamW optimizer.
///
/// Implements Adam algorithm with Weight Decay fix as described in [Decoupled Weight Decay Regularization](https://arxiv.org/abs/1711.05101).
///
/// # Formula
///
/// $$
/// \begin{aligned}
/// & m_t = \beta_1 m_{t-1} + (1 - \beta_1) g_t \\
/// & v_t = \beta_2 v_{t-1} + (1 - \beta_2) g_t^2 \\
/// & \hat{m}_t = m_t / (1 - \beta_1^t) \\
/// & \hat{v}_t = v_t / (1 - \beta_2^t) \\
/// & \theta_t = \theta_{t-1} - \eta (\hat{m}_t / (\sqrt{\hat{v}_t} + \epsilon) + \lambda \theta_{t-1})
/// \end{aligned}
/// $$
///
/// Biases (parameter names ending in `bias`) are never decayed.
pub struct AdamW {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub weight_decay: f32,
    /// State: parameter index -> (m, v, step)
    state: HashMap<usize, (Vec<f32>, Vec<f32>, i32)>,
}

impl Default for AdamW {
    fn default() -> Self {
        Self::new()
    }
}

impl AdamW {
    /// Creates a new AdamW optimizer.
    ///
    /// Defaults: `beta1 = 0.9`, `beta2 = 0.999`, `epsilon = 1e-8`,
    /// `weight_decay = 0.0`.
    pub fn new() -> Self {
        Self {
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            weight_decay: 0.0,
            state: HashMap::new(),
        }
    }

    pub fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl Optimizer for AdamW {
    fn step(&mut self, params: &mut [Parameter], lr: f32) -> Result<()> {
        for (key, param) in params.iter_mut().enumerate() {
            if !param.requires_grad {
                continue;
            }
            let Some(grad) = param.grad.as_ref() else {
                continue;
            };
            check_grad_len(param, grad)?;

            let size = param.value.len();
            let (m, v, step) = self
                .state
                .entry(key)
                .or_insert_with(|| (vec![0.0; size], vec![0.0; size], 0));
            *step += 1;

            let b1 = self.beta1;
            let b2 = self.beta2;
            let eps = self.epsilon;
            let lambda = if param.name.ends_with("bias") {
                0.0
            } else {
                self.weight_decay
            };

            // Bias correction terms
            let bias_correction1 = 1.0 - b1.powi(*step);
            let bias_correction2 = 1.0 - b2.powi(*step);

            param
                .value
                .par_iter_mut()
                .zip(grad.par_iter())
                .zip(m.par_iter_mut())
                .zip(v.par_iter_mut())
                .for_each(|(((p, g), m_elem), v_elem)| {
                    *m_elem = b1 * *m_elem + (1.0 - b1) * *g;
                    *v_elem = b2 * *v_elem + (1.0 - b2) * *g * *g;

                    let m_hat = *m_elem / bias_correction1;
                    let v_hat = *v_elem / bias_correction2;

                    *p -= lr * (m_hat / (v_hat.sqrt() + eps) + lambda * *p);
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adamw_new() {
        let adam = AdamW::new().with_weight_decay(0.01);
        assert_eq!(adam.beta1, 0.9);
        assert_eq!(adam.weight_decay, 0.01);
    }

    #[test]
    fn test_adamw_update() {
        let mut adam = AdamW::new();
        let mut param = Parameter::new("w", vec![1], vec![1.0]).unwrap();
        param.grad = Some(vec![0.1]);
        let mut params = vec![param];

        // Step 1
        adam.step(&mut params, 0.1).unwrap();

        // m_hat = 0.1, v_hat = 0.01
        // p = 1.0 - 0.1 * (0.1 / 0.1) = 0.9
        let p = params[0].value[0];
        assert!((p - 0.9).abs() < 1e-5, "Step 1 failed: p={}", p);

        // Step 2: constant gradient keeps m_hat / sqrt(v_hat) at 1.
        adam.step(&mut params, 0.1).unwrap();
        assert!((params[0].value[0] - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_bias_is_not_decayed() {
        let mut adam = AdamW::new().with_weight_decay(0.5);
        let mut w = Parameter::new("head.weight", vec![1], vec![1.0]).unwrap();
        w.grad = Some(vec![0.0]);
        let mut b = Parameter::new("head.bias", vec![1], vec![1.0]).unwrap();
        b.grad = Some(vec![0.0]);
        let mut params = vec![w, b];

        adam.step(&mut params, 0.1).unwrap();
        assert!((params[0].value[0] - 0.95).abs() < 1e-6);
        assert_eq!(params[1].value[0], 1.0);
    }
}
