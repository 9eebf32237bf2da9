use super::{Optimizer, check_grad_len};
use crate::error::Result;
use crate::models::Parameter;
use rayon::prelude::*;

/// Stochastic Gradient Descent (SGD) optimizer.
///
/// Updates parameters using the rule:
/// `param = param - lr * grad`
#[derive(Debug, Default, Clone, Copy)]
pub struct Sgd;

impl Sgd {
    pub fn new() -> Self {
        Self
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [Parameter], lr: f32) -> Result<()> {
        for param in params.iter_mut().filter(|p| p.requires_grad) {
            let Some(grad) = param.grad.as_ref() else {
                continue;
            };
            check_grad_len(param, grad)?;
            param
                .value
                .par_iter_mut()
                .zip(grad.par_iter())
                .for_each(|(p, g)| {
                    *p -= lr * *g;
                });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_update() {
        let mut sgd = Sgd::new();
        let mut param = Parameter::new("w", vec![2], vec![1.0, 2.0]).unwrap();
        param.grad = Some(vec![0.5, -0.5]);
        let mut frozen = Parameter::new("f", vec![1], vec![3.0]).unwrap();
        frozen.grad = Some(vec![1.0]);
        frozen.requires_grad = false;
        let no_grad = Parameter::new("n", vec![1], vec![4.0]).unwrap();
        let mut params = vec![param, frozen, no_grad];

        sgd.step(&mut params, 0.1).unwrap();

        // [1.0, 2.0] - 0.1 * [0.5, -0.5]
        assert!((params[0].value[0] - 0.95).abs() < 1e-6);
        assert!((params[0].value[1] - 2.05).abs() < 1e-6);
        assert_eq!(params[1].value, vec![3.0]);
        assert_eq!(params[2].value, vec![4.0]);

        sgd.zero_grad(&mut params);
        assert_eq!(params[0].grad, Some(vec![0.0, 0.0]));
    }
}
