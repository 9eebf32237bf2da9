use super::backend::CollectiveBackend;
use crate::error::{DdpError, Result};
use crossbeam::channel::{Receiver, Sender, unbounded};
use ddp_rs_kernels::cpu_add_assign;
use std::sync::{Arc, Barrier};

/// In-process collective backend: one instance per rank, ranks are threads.
///
/// All-reduce is a **Ring All-Reduce** over `crossbeam` channels. Rank `r`
/// receives from `r - 1` and sends to `r + 1`. The buffer is cut into
/// `world_size` chunks; after the scatter-reduce phase each chunk is fully
/// summed on exactly one rank, and the all-gather phase copies that value to
/// everybody, so all ranks end with bit-identical buffers.
pub struct LocalBackend {
    rank: usize,
    world_size: usize,
    left_rx: Receiver<Vec<f32>>,
    right_tx: Sender<Vec<f32>>,
    barrier: Arc<Barrier>,
}

impl LocalBackend {
    pub fn new(
        rank: usize,
        world_size: usize,
        left_rx: Receiver<Vec<f32>>,
        right_tx: Sender<Vec<f32>>,
        barrier: Arc<Barrier>,
    ) -> Self {
        Self {
            rank,
            world_size,
            left_rx,
            right_tx,
            barrier,
        }
    }

    /// Wires a ring of `world_size` backends. Element `i` belongs to rank `i`.
    ///
    /// Channel `i` connects rank `i` to rank `i + 1`: rank `i` sends on it and
    /// rank `i + 1` receives from it.
    pub fn create_world(world_size: usize) -> Vec<LocalBackend> {
        let mut txs = Vec::with_capacity(world_size);
        let mut rxs = Vec::with_capacity(world_size);
        for _ in 0..world_size {
            let (tx, rx) = unbounded();
            txs.push(tx);
            rxs.push(rx);
        }

        let barrier = Arc::new(Barrier::new(world_size.max(1)));

        (0..world_size)
            .map(|rank| {
                let right_tx = txs[rank].clone();
                let left_rx = rxs[(rank + world_size - 1) % world_size].clone();
                LocalBackend::new(rank, world_size, left_rx, right_tx, barrier.clone())
            })
            .collect()
    }

    fn chunk_bounds(&self, chunk_idx: usize, chunk_size: usize, len: usize) -> (usize, usize) {
        let start = (chunk_idx * chunk_size).min(len);
        let end = (start + chunk_size).min(len);
        (start, end)
    }

    fn ring_index(&self, offset: isize) -> usize {
        (self.rank as isize + offset).rem_euclid(self.world_size as isize) as usize
    }

    fn send_right(&self, chunk: &[f32]) -> Result<()> {
        self.right_tx
            .send(chunk.to_vec())
            .map_err(|_| DdpError::Collective(format!("rank {}: right neighbour hung up", self.rank)))
    }

    fn recv_left(&self, expected_len: usize) -> Result<Vec<f32>> {
        let chunk = self.left_rx.recv().map_err(|_| {
            DdpError::Collective(format!("rank {}: left neighbour hung up", self.rank))
        })?;
        if chunk.len() != expected_len {
            return Err(DdpError::ShapeMismatch {
                expected: vec![expected_len],
                got: vec![chunk.len()],
            });
        }
        Ok(chunk)
    }
}

impl CollectiveBackend for LocalBackend {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn barrier(&self) -> Result<()> {
        self.barrier.wait();
        Ok(())
    }

    fn all_reduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        if self.world_size <= 1 {
            return Ok(());
        }

        let total_elements = buf.len();
        let chunk_size = total_elements.div_ceil(self.world_size);

        // --- Phase 1: Scatter-Reduce ---
        // At step s, rank r sends chunk (r - s) and adds the incoming chunk (r - s - 1).
        for step in 0..self.world_size - 1 {
            let send_idx = self.ring_index(-(step as isize));
            let recv_idx = self.ring_index(-(step as isize) - 1);

            let (start, end) = self.chunk_bounds(send_idx, chunk_size, total_elements);
            self.send_right(&buf[start..end])?;

            let (recv_start, recv_end) = self.chunk_bounds(recv_idx, chunk_size, total_elements);
            let incoming = self.recv_left(recv_end - recv_start)?;
            cpu_add_assign(&mut buf[recv_start..recv_end], &incoming)?;
        }

        // --- Phase 2: All-Gather ---
        // Rank r now owns the finished chunk (r + 1); pass finished chunks around the ring.
        for step in 0..self.world_size - 1 {
            let send_idx = self.ring_index(1 - step as isize);
            let recv_idx = self.ring_index(-(step as isize));

            let (start, end) = self.chunk_bounds(send_idx, chunk_size, total_elements);
            self.send_right(&buf[start..end])?;

            let (recv_start, recv_end) = self.chunk_bounds(recv_idx, chunk_size, total_elements);
            let incoming = self.recv_left(recv_end - recv_start)?;
            buf[recv_start..recv_end].copy_from_slice(&incoming);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn run_world<F>(world_size: usize, f: F) -> Vec<Vec<f32>>
    where
        F: Fn(&LocalBackend) -> Vec<f32> + Send + Sync + Copy + 'static,
    {
        let handles: Vec<_> = LocalBackend::create_world(world_size)
            .into_iter()
            .map(|backend| thread::spawn(move || f(&backend)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_backend_properties() {
        let world = LocalBackend::create_world(4);
        assert_eq!(world.len(), 4);
        assert_eq!(world[2].rank(), 2);
        assert_eq!(world[2].world_size(), 4);
    }

    #[test]
    fn test_single_rank_world_is_identity() {
        let world = LocalBackend::create_world(1);
        let mut buf = vec![3.0f32, 4.0];
        world[0].all_reduce_sum(&mut buf).unwrap();
        world[0].barrier().unwrap();
        assert_eq!(buf, vec![3.0, 4.0]);
    }

    #[test]
    fn test_ring_all_reduce_uneven_chunks() {
        // 7 elements over 3 ranks: chunks of 3, 3, 1.
        let results = run_world(3, |backend| {
            let mut buf: Vec<f32> = (0..7).map(|i| (i + backend.rank() * 10) as f32).collect();
            backend.all_reduce_sum(&mut buf).unwrap();
            buf
        });

        let expected: Vec<f32> = (0..7).map(|i| (3 * i + 30) as f32).collect();
        for buf in results {
            assert_eq!(buf, expected);
        }
    }

    #[test]
    fn test_ring_all_reduce_shorter_than_world() {
        // Fewer elements than ranks leaves some chunks empty.
        let results = run_world(4, |backend| {
            let mut buf = vec![1.0f32, (backend.rank() + 1) as f32];
            backend.all_reduce_sum(&mut buf).unwrap();
            buf
        });
        for buf in results {
            assert_eq!(buf, vec![4.0, 10.0]);
        }
    }

    #[test]
    fn test_ring_all_reduce_empty_buffer() {
        let results = run_world(2, |backend| {
            let mut buf: Vec<f32> = Vec::new();
            backend.all_reduce_sum(&mut buf).unwrap();
            buf
        });
        assert!(results.iter().all(|b| b.is_empty()));
    }
}
