//! Trainable parameters and global gradient-norm clipping.

use crate::error::{DdpError, Result};

/// One named, flat parameter buffer with its (lazily allocated) gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub value: Vec<f32>,
    /// `None` until the first backward pass touches this parameter.
    pub grad: Option<Vec<f32>>,
    pub requires_grad: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, value: Vec<f32>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != value.len() {
            return Err(DdpError::ShapeMismatch {
                expected: shape,
                got: vec![value.len()],
            });
        }
        Ok(Self {
            name: name.into(),
            shape,
            value,
            grad: None,
            requires_grad: true,
        })
    }

    pub fn numel(&self) -> usize {
        self.value.len()
    }

    /// The gradient buffer, allocated as zeros on first use.
    pub fn grad_mut(&mut self) -> &mut Vec<f32> {
        let len = self.value.len();
        self.grad.get_or_insert_with(|| vec![0.0; len])
    }

    /// Resets an allocated gradient to zero; an absent one stays absent.
    pub fn zero_grad(&mut self) {
        if let Some(grad) = self.grad.as_mut() {
            grad.iter_mut().for_each(|g| *g = 0.0);
        }
    }
}

/// Scales all gradients so their joint L2 norm is at most `max_norm`.
///
/// Returns the norm measured before clipping. Parameters without a gradient
/// are ignored.
pub fn clip_grad_norm(params: &mut [Parameter], max_norm: f32) -> f32 {
    let total_sq: f64 = params
        .iter()
        .filter_map(|p| p.grad.as_ref())
        .flat_map(|g| g.iter())
        .map(|&g| f64::from(g) * f64::from(g))
        .sum();
    let total_norm = total_sq.sqrt() as f32;

    let clip_coef = max_norm / (total_norm + 1e-6);
    if clip_coef < 1.0 {
        for grad in params.iter_mut().filter_map(|p| p.grad.as_mut()) {
            grad.iter_mut().for_each(|g| *g *= clip_coef);
        }
    }
    total_norm
}
