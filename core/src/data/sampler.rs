//! Strategies for sampling indices from a dataset.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// A trait for determining the order of data access.
///
/// Samplers are deterministic for a given `(seed, epoch)` so that an epoch can
/// be iterated again and every rank agrees on the permutation.
pub trait Sampler: Send + Sync {
    /// Returns the indices to visit, in order.
    ///
    /// # Arguments
    ///
    /// * `len`: The length of the dataset.
    fn sample(&self, len: usize) -> Vec<usize>;

    /// Reseeds epoch-dependent shuffling. No-op for order-free samplers.
    fn set_epoch(&mut self, _epoch: u64) {}
}

/// Samples elements sequentially, always in the same order.
pub struct SequentialSampler;

impl Sampler for SequentialSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        (0..len).collect()
    }
}

/// Samples elements randomly (without replacement), seeded per epoch.
pub struct RandomSampler {
    seed: u64,
    epoch: u64,
}

impl RandomSampler {
    pub fn new(seed: u64) -> Self {
        Self { seed, epoch: 0 }
    }
}

impl Sampler for RandomSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
        indices.shuffle(&mut rng);
        indices
    }

    fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }
}

/// Restricts sampling to this rank's shard of the dataset.
///
/// All ranks draw the same permutation, pad it by wrapping around until its
/// length divides `world_size`, and then take every `world_size`-th index
/// starting at their own rank. Shards are therefore disjoint (up to the
/// padding) and equally sized, so every rank runs the same number of steps.
pub struct DistributedSampler {
    rank: usize,
    world_size: usize,
    shuffle: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedSampler {
    pub fn new(rank: usize, world_size: usize, seed: u64) -> Self {
        Self {
            rank,
            world_size: world_size.max(1),
            shuffle: true,
            seed,
            epoch: 0,
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Indices this rank visits for a dataset of `len` items.
    pub fn num_samples(&self, len: usize) -> usize {
        len.div_ceil(self.world_size)
    }
}

impl Sampler for DistributedSampler {
    fn sample(&self, len: usize) -> Vec<usize> {
        if len == 0 {
            return Vec::new();
        }
        let mut indices: Vec<usize> = (0..len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
            indices.shuffle(&mut rng);
        }

        let total = self.num_samples(len) * self.world_size;
        let mut padded = indices.clone();
        while padded.len() < total {
            let missing = total - padded.len();
            padded.extend(indices.iter().take(missing));
        }

        padded
            .into_iter()
            .skip(self.rank)
            .step_by(self.world_size)
            .collect()
    }

    fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_sampler_is_seeded() {
        let mut a = RandomSampler::new(3);
        let b = RandomSampler::new(3);
        assert_eq!(a.sample(20), b.sample(20));

        a.set_epoch(1);
        let shuffled = a.sample(20);
        assert_ne!(shuffled, b.sample(20));
        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_distributed_shards_cover_dataset() {
        let world_size = 3;
        let shards: Vec<Vec<usize>> = (0..world_size)
            .map(|r| DistributedSampler::new(r, world_size, 9).sample(10))
            .collect();

        // 10 items over 3 ranks: 4 each, two indices repeated as padding.
        assert!(shards.iter().all(|s| s.len() == 4));
        let mut all: Vec<usize> = shards.concat();
        all.sort();
        all.dedup();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_distributed_unshuffled_is_strided() {
        let sampler = DistributedSampler::new(1, 2, 0).shuffle(false);
        assert_eq!(sampler.sample(5), vec![1, 3, 0]);
        assert!(sampler.sample(0).is_empty());
    }
}
