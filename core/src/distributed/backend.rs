use crate::error::Result;

/// The two collectives the coordination core needs.
///
/// Implementations:
/// - [`SingleProcessBackend`]: world size 1, every call returns immediately.
/// - [`LocalBackend`](super::local_backend::LocalBackend): ranks are threads
///   of one process, used by tests and the in-process launcher.
/// - [`TcpBackend`](super::tcp_backend::TcpBackend): ranks are separate
///   processes meeting at a rendezvous address.
///
/// Both calls block with no timeout. Every rank must issue the same
/// sequence of calls; a rank that skips one (or passes a buffer of a
/// different length) deadlocks or corrupts the group.
pub trait CollectiveBackend: Send + Sync {
    /// Returns the rank of the current process/thread.
    fn rank(&self) -> usize;

    /// Returns the total number of processes/threads.
    fn world_size(&self) -> usize;

    /// Blocks until every rank has reached the matching `barrier` call.
    fn barrier(&self) -> Result<()>;

    /// Replaces `buf` with the element-wise sum of every rank's `buf`.
    ///
    /// On return every rank holds bit-identical contents. The primitive only
    /// sums; callers that want a mean divide by `world_size` themselves.
    fn all_reduce_sum(&self, buf: &mut [f32]) -> Result<()>;
}

/// Backend for a run with exactly one rank.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcessBackend;

impl CollectiveBackend for SingleProcessBackend {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<()> {
        Ok(())
    }

    fn all_reduce_sum(&self, _buf: &mut [f32]) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_process_is_identity() {
        let backend = SingleProcessBackend;
        let mut buf = vec![1.5f32, -2.0];
        backend.barrier().unwrap();
        backend.all_reduce_sum(&mut buf).unwrap();
        assert_eq!(buf, vec![1.5, -2.0]);
        assert_eq!(backend.rank(), 0);
        assert_eq!(backend.world_size(), 1);
    }
}
