//! Buffer kernels shared by the ddp-rs collectives and the offline verifier.
//!
//! Everything here works on flat slices so the callers (gradient buffers,
//! wire frames, parsed metric columns) never need a tensor type.

use num_traits::{FromPrimitive, Num, NumAssign, ToPrimitive};
use std::fmt::Debug;
use thiserror::Error;

pub mod cpu_reduce;
pub mod stats;

pub use cpu_reduce::{cpu_add_assign, cpu_div_scalar};
pub use stats::{Summary, summarize};

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("Length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("Division by zero")]
    DivisionByZero,
}

pub type Result<T> = std::result::Result<T, KernelError>;

/// Trait bound for elements that can be processed by kernels.
pub trait KernelElem:
    Num + NumAssign + Copy + Clone + Debug + Send + Sync + FromPrimitive + ToPrimitive + PartialOrd
{
}

impl<T> KernelElem for T where
    T: Num
        + NumAssign
        + Copy
        + Clone
        + Debug
        + Send
        + Sync
        + FromPrimitive
        + ToPrimitive
        + PartialOrd
{
}
