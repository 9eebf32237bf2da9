use super::backend::{CollectiveBackend, SingleProcessBackend};
use super::tcp_backend::TcpBackend;
use crate::config::{Rank, RunConfig};
use crate::error::{DdpError, Result};
use std::time::Duration;
use tracing::info;

/// The collective domain of one rank.
///
/// Lifecycle: `init` → active → `destroy`. After `destroy` every collective
/// returns [`DdpError::GroupDestroyed`]; rank identity stays readable.
pub struct ProcessGroup {
    rank: Rank,
    backend: Option<Box<dyn CollectiveBackend>>,
}

impl ProcessGroup {
    /// Opens the group described by `config`.
    ///
    /// A single-process run gets a no-op backend and needs no rendezvous.
    /// Otherwise ranks meet over TCP at `master_addr:master_port`.
    ///
    /// # Errors
    ///
    /// Fails before touching the network when `world_size > 1` and no
    /// rendezvous address is configured, or when the rank is out of range.
    pub fn init(config: &RunConfig) -> Result<Self> {
        let rank = config.rank_info()?;
        if !rank.is_distributed() {
            return Ok(Self::single());
        }

        let addr = config
            .rendezvous_address()
            .ok_or(DdpError::MissingRendezvous {
                world_size: rank.world_size(),
            })?;
        let backend = TcpBackend::connect(
            &addr,
            rank.id(),
            rank.world_size(),
            Duration::from_secs(config.rendezvous_timeout_secs),
        )?;
        info!(
            rank = rank.id(),
            world_size = rank.world_size(),
            %addr,
            "initialized process group"
        );
        Ok(Self {
            rank,
            backend: Some(Box::new(backend)),
        })
    }

    /// Wraps an existing backend (in-process worlds, tests).
    pub fn from_backend(backend: Box<dyn CollectiveBackend>) -> Result<Self> {
        let rank = Rank::new(backend.rank(), backend.world_size())?;
        Ok(Self {
            rank,
            backend: Some(backend),
        })
    }

    /// A world of one.
    pub fn single() -> Self {
        Self {
            rank: Rank::single(),
            backend: Some(Box::new(SingleProcessBackend)),
        }
    }

    pub fn rank(&self) -> usize {
        self.rank.id()
    }

    pub fn world_size(&self) -> usize {
        self.rank.world_size()
    }

    pub fn rank_info(&self) -> Rank {
        self.rank
    }

    pub fn is_main(&self) -> bool {
        self.rank.id() == 0
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self, op: &'static str) -> Result<&dyn CollectiveBackend> {
        self.backend
            .as_deref()
            .ok_or(DdpError::GroupDestroyed { op })
    }

    /// Blocks until every rank of the group reaches its matching barrier.
    pub fn barrier(&self) -> Result<()> {
        self.backend("barrier")?.barrier()
    }

    /// Element-wise sum of `buf` across ranks, visible identically on every rank.
    pub fn all_reduce_sum(&self, buf: &mut [f32]) -> Result<()> {
        self.backend("all_reduce_sum")?.all_reduce_sum(buf)
    }

    /// Releases the collective domain.
    pub fn destroy(&mut self) -> Result<()> {
        if self.backend.take().is_none() {
            return Err(DdpError::GroupDestroyed { op: "destroy" });
        }
        info!(rank = self.rank.id(), "process group destroyed");
        Ok(())
    }
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("rank", &self.rank)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::local_backend::LocalBackend;

    #[test]
    fn test_init_single_process() {
        let config = RunConfig::default();
        let group = ProcessGroup::init(&config).unwrap();
        assert_eq!(group.rank(), 0);
        assert_eq!(group.world_size(), 1);
        assert!(group.is_main());
        group.barrier().unwrap();
    }

    #[test]
    fn test_init_without_rendezvous_fails_fast() {
        let config = RunConfig {
            rank: 1,
            world_size: 2,
            ..Default::default()
        };
        assert!(matches!(
            ProcessGroup::init(&config),
            Err(DdpError::MissingRendezvous { world_size: 2 })
        ));
    }

    #[test]
    fn test_ops_fail_after_destroy() {
        let mut group = ProcessGroup::single();
        group.destroy().unwrap();
        assert!(!group.is_active());

        assert!(matches!(
            group.barrier(),
            Err(DdpError::GroupDestroyed { op: "barrier" })
        ));
        let mut buf = [1.0f32];
        assert!(matches!(
            group.all_reduce_sum(&mut buf),
            Err(DdpError::GroupDestroyed {
                op: "all_reduce_sum"
            })
        ));
        assert!(group.destroy().is_err());
        assert_eq!(group.rank(), 0);
    }

    #[test]
    fn test_from_backend_takes_rank_identity() {
        let mut world = LocalBackend::create_world(3);
        let backend = world.remove(2);
        let group = ProcessGroup::from_backend(Box::new(backend)).unwrap();
        assert_eq!(group.rank(), 2);
        assert_eq!(group.world_size(), 3);
        assert!(!group.is_main());
        assert!(group.rank_info().is_distributed());
    }
}
