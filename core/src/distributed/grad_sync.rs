use super::process_group::ProcessGroup;
use crate::error::Result;
use crate::models::Parameter;
use ddp_rs_kernels::cpu_div_scalar;
use tracing::debug;

/// Averages gradients across ranks at each optimizer-update boundary.
///
/// Parameters are reduced one `all_reduce_sum` call at a time, in the order
/// the model returns them. That order is the only thing pairing buffers
/// across ranks, so every rank must pass the same parameter list.
pub struct GradientSynchronizer<'a> {
    group: &'a ProcessGroup,
}

impl<'a> GradientSynchronizer<'a> {
    pub fn new(group: &'a ProcessGroup) -> Self {
        Self { group }
    }

    /// Replaces every trainable gradient with its cross-rank mean, then waits
    /// at one barrier. A world of one is left untouched.
    ///
    /// A trainable parameter whose gradient was never allocated contributes
    /// zeros, so all ranks issue the same number of reductions.
    ///
    /// Returns the number of reduced elements.
    pub fn synchronize(&self, params: &mut [Parameter]) -> Result<usize> {
        let world_size = self.group.world_size();
        if world_size <= 1 {
            return Ok(0);
        }

        let mut reduced = 0;
        for param in params.iter_mut().filter(|p| p.requires_grad) {
            let grad = param.grad_mut();
            self.group.all_reduce_sum(grad)?;
            cpu_div_scalar(grad, world_size as f32)?;
            reduced += grad.len();
        }
        self.group.barrier()?;

        debug!(rank = self.group.rank(), elements = reduced, "gradients averaged");
        Ok(reduced)
    }
}
