//! DataLoader implementation.

use super::features::FeatureRow;
use super::{Batch, Dataset, Sampler, SequentialSampler};
use crate::error::Result;
use std::sync::Arc;

/// Trait for collating a list of items into a batch.
pub trait Collate<T> {
    /// The type of the batched output.
    type Output;

    /// Collates a vector of items into a single batch.
    fn collate(batch: Vec<T>) -> Self::Output;
}

/// Stacks feature rows into a row-major [`Batch`].
pub struct BatchCollate;

impl Collate<FeatureRow> for BatchCollate {
    type Output = Result<Batch>;

    fn collate(batch: Vec<FeatureRow>) -> Self::Output {
        let width = batch.first().map_or(0, |row| row.features.len());
        let mut inputs = Vec::with_capacity(width * batch.len());
        let mut labels = Vec::with_capacity(batch.len());
        for row in batch {
            inputs.extend_from_slice(&row.features);
            labels.push(row.label);
        }
        Batch::new(inputs, width, labels)
    }
}

/// Data loader.
///
/// Combines a dataset and a sampler, and provides an iterable over the given dataset.
/// Iterating twice without changing the sampler epoch yields the same batches.
///
/// # Type Parameters
///
/// * `D`: The dataset type.
/// * `T`: The item type returned by the dataset.
/// * `C`: The collator type (defaults to `BatchCollate`).
pub struct DataLoader<D, T = FeatureRow, C = BatchCollate>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    batch_size: usize,
    sampler: Box<dyn Sampler>,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T, C> DataLoader<D, T, C>
where
    D: Dataset<T> + 'static,
    C: Collate<T>,
{
    /// Creates a new sequential DataLoader. A `batch_size` of 0 is treated as 1.
    pub fn new(dataset: D, batch_size: usize) -> Self {
        Self::from_shared(Arc::new(dataset), batch_size)
    }

    /// Like [`new`](Self::new) for a dataset shared with other loaders.
    pub fn from_shared(dataset: Arc<D>, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            sampler: Box::new(SequentialSampler),
            drop_last: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Sets the sampler to use.
    pub fn with_sampler(mut self, sampler: impl Sampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Sets whether to drop the last incomplete batch.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Forwards the epoch to the sampler so shuffling changes between epochs.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.sampler.set_epoch(epoch);
    }

    /// Items visited per epoch.
    pub fn num_samples(&self) -> usize {
        self.sampler.sample(self.dataset.len()).len()
    }

    /// Batches per epoch.
    pub fn len(&self) -> usize {
        let samples = self.num_samples();
        if self.drop_last {
            samples / self.batch_size
        } else {
            samples.div_ceil(self.batch_size)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over the dataset.
    pub fn iter(&self) -> DataLoaderIter<D, T, C> {
        let indices = self.sampler.sample(self.dataset.len());
        DataLoaderIter {
            dataset: self.dataset.clone(),
            indices,
            batch_size: self.batch_size,
            current_idx: 0,
            drop_last: self.drop_last,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Iterator for DataLoader.
pub struct DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    dataset: Arc<D>,
    indices: Vec<usize>,
    batch_size: usize,
    current_idx: usize,
    drop_last: bool,
    _marker: std::marker::PhantomData<(T, C)>,
}

impl<D, T, C> Iterator for DataLoaderIter<D, T, C>
where
    D: Dataset<T>,
    C: Collate<T>,
{
    type Item = C::Output;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let remaining = self.indices.len() - self.current_idx;
        if self.drop_last && remaining < self.batch_size {
            return None;
        }

        let take = remaining.min(self.batch_size);
        let batch_indices = &self.indices[self.current_idx..self.current_idx + take];
        self.current_idx += take;

        let batch: Vec<T> = batch_indices
            .iter()
            .map(|&idx| self.dataset.get(idx))
            .collect();

        Some(C::collate(batch))
    }
}
