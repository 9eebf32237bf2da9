use crate::{KernelElem, KernelError, Result};
use rayon::prelude::*;

/// Buffers shorter than this are reduced on the calling thread.
///
/// Gradient buffers of small heads are a few hundred elements; spinning up
/// the rayon pool for those costs more than the adds.
pub const PAR_THRESHOLD: usize = 1 << 14;

/// Element-wise `dst[i] += src[i]`.
///
/// Each element is touched by exactly one addition, so the result does not
/// depend on how rayon splits the work.
pub fn cpu_add_assign<T: KernelElem>(dst: &mut [T], src: &[T]) -> Result<()> {
    if dst.len() != src.len() {
        return Err(KernelError::LengthMismatch {
            expected: dst.len(),
            got: src.len(),
        });
    }

    if dst.len() >= PAR_THRESHOLD {
        dst.par_iter_mut()
            .zip(src.par_iter())
            .for_each(|(d, &s)| *d += s);
    } else {
        dst.iter_mut().zip(src).for_each(|(d, &s)| *d += s);
    }
    Ok(())
}

/// Element-wise `buf[i] /= divisor`.
///
/// This divides rather than multiplying by a reciprocal: `x / n` and
/// `x * (1 / n)` differ in the last bit for many `n`, and callers rely on the
/// quotient matching what every peer computes.
pub fn cpu_div_scalar<T: KernelElem>(buf: &mut [T], divisor: T) -> Result<()> {
    if divisor == T::zero() {
        return Err(KernelError::DivisionByZero);
    }

    if buf.len() >= PAR_THRESHOLD {
        buf.par_iter_mut().for_each(|x| *x /= divisor);
    } else {
        buf.iter_mut().for_each(|x| *x /= divisor);
    }
    Ok(())
}
