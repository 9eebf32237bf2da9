//! Data loading and processing utilities.
//!
//! This module provides primitives for loading, sampling, and batching data for training.
//!
//! # Components
//!
//! - **Dataset**: A trait for accessing individual data items.
//! - **Sampler**: A trait for determining the order of data access, including
//!   the rank-sharding [`DistributedSampler`].
//! - **DataLoader**: An iterator that batches and collates data from a Dataset.
//! - **Features**: raw examples, fixed-width feature extraction and the
//!   on-disk feature cache.

pub mod examples;
pub mod features;
pub mod loader;
pub mod sampler;
pub mod synthetic;
pub mod tasks;

pub use examples::{InputExample, Split, load_examples, write_examples};
pub use features::{FeatureExtractor, FeatureRow, FeatureSet, HashingExtractor, cached_features_file};
pub use loader::{BatchCollate, DataLoader};
pub use sampler::{DistributedSampler, RandomSampler, Sampler, SequentialSampler};
pub use tasks::{TaskSpec, task_spec};

use crate::error::{DdpError, Result};

/// A trait for accessing data items.
///
/// A `Dataset` represents a collection of data items (e.g., feature rows)
/// that can be accessed by index.
///
/// # Type Parameters
///
/// * `T`: The type of the data item returned by `get`.
pub trait Dataset<T>: Send + Sync {
    /// Returns the total number of items in the dataset.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the item at the given index.
    ///
    /// # Panics
    ///
    /// May panic if `index` is out of bounds.
    fn get(&self, index: usize) -> T;
}

// Implement Dataset for Vec<T>
impl<T: Clone + Send + Sync> Dataset<T> for Vec<T> {
    fn len(&self) -> usize {
        self.len()
    }

    fn get(&self, index: usize) -> T {
        self[index].clone()
    }
}

/// A collated mini-batch: `inputs` is row-major `[len, width]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub inputs: Vec<f32>,
    pub width: usize,
    pub labels: Vec<f32>,
}

impl Batch {
    pub fn new(inputs: Vec<f32>, width: usize, labels: Vec<f32>) -> Result<Self> {
        if width == 0 || inputs.len() != width * labels.len() {
            return Err(DdpError::ShapeMismatch {
                expected: vec![labels.len(), width],
                got: vec![inputs.len()],
            });
        }
        Ok(Self {
            inputs,
            width,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.inputs.chunks(self.width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_shape() {
        let batch = Batch::new(vec![1.0, 2.0, 3.0, 4.0], 2, vec![0.0, 1.0]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows().nth(1), Some(&[3.0, 4.0][..]));
        assert!(Batch::new(vec![1.0, 2.0, 3.0], 2, vec![0.0, 1.0]).is_err());
        assert!(Batch::new(vec![], 0, vec![]).is_err());
    }
}
