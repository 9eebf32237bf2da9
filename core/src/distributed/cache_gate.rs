//! One rank builds a shared artifact, every rank reads it.
//!
//! The exchange is two-phase:
//!
//! 1. Non-builders go straight to the barrier.
//! 2. The builder writes the artifact if it is absent (or `overwrite` is
//!    set), then enters the barrier. It enters the barrier even when nothing
//!    was built, so every rank issues the same collective sequence.
//! 3. Past the barrier the artifact is complete and everybody loads it.
//!
//! The builder writes to a `.partial` sibling and renames it into place, so
//! the final path only ever names a complete file.

use super::process_group::ProcessGroup;
use crate::error::{DdpError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What this rank did for the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// This rank is the builder and wrote the artifact.
    Built,
    /// This rank is the builder and found the artifact already present.
    Reused,
    /// This rank waited for the builder.
    Waited,
}

pub struct SharedCacheGate<'a> {
    group: &'a ProcessGroup,
    builder_rank: usize,
    overwrite: bool,
}

impl<'a> SharedCacheGate<'a> {
    pub fn new(group: &'a ProcessGroup, builder_rank: usize) -> Result<Self> {
        if builder_rank >= group.world_size() {
            return Err(DdpError::InvalidRank {
                rank: builder_rank,
                world_size: group.world_size(),
            });
        }
        Ok(Self {
            group,
            builder_rank,
            overwrite: false,
        })
    }

    /// Rebuild even when the artifact exists.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn is_builder(&self) -> bool {
        self.group.rank() == self.builder_rank
    }

    /// Makes sure `path` holds a complete artifact on return, on every rank.
    ///
    /// `build` is called on the builder only, with the temporary path it must
    /// write to.
    pub fn ensure<B>(&self, path: &Path, build: B) -> Result<CacheOutcome>
    where
        B: FnOnce(&Path) -> Result<()>,
    {
        let outcome = if self.is_builder() {
            let outcome = if self.overwrite || !path.exists() {
                info!(path = %path.display(), "building shared artifact");
                let partial = partial_path(path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DdpError::io(format!("creating {}", parent.display()), e)
                    })?;
                }
                build(&partial)?;
                std::fs::rename(&partial, path).map_err(|e| {
                    DdpError::io(format!("publishing {}", path.display()), e)
                })?;
                CacheOutcome::Built
            } else {
                info!(path = %path.display(), "reusing shared artifact");
                CacheOutcome::Reused
            };
            self.group.barrier()?;
            outcome
        } else {
            debug!(
                rank = self.group.rank(),
                builder = self.builder_rank,
                "waiting for shared artifact"
            );
            self.group.barrier()?;
            CacheOutcome::Waited
        };

        if !path.exists() {
            return Err(DdpError::InvalidState(format!(
                "artifact {} missing after the builder's barrier",
                path.display()
            )));
        }
        Ok(outcome)
    }

    /// [`ensure`](Self::ensure) followed by `load` on every rank.
    pub fn load_or_build<T, B, L>(&self, path: &Path, build: B, load: L) -> Result<T>
    where
        B: FnOnce(&Path) -> Result<()>,
        L: FnOnce(&Path) -> Result<T>,
    {
        self.ensure(path, build)?;
        load(path)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/cached_train_x_128_rte")),
            PathBuf::from("/data/cached_train_x_128_rte.partial")
        );
    }

    #[test]
    fn test_single_rank_builds_then_reuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("features.bin");
        let group = ProcessGroup::single();
        let gate = SharedCacheGate::new(&group, 0).unwrap();
        assert!(gate.is_builder());

        let outcome = gate
            .ensure(&path, |tmp| {
                std::fs::write(tmp, b"abc").map_err(|e| DdpError::io("write", e))
            })
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Built);
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
        assert!(!partial_path(&path).exists());

        let outcome = gate
            .ensure(&path, |_| panic!("must not rebuild an existing artifact"))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Reused);
    }

    #[test]
    fn test_overwrite_forces_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        std::fs::write(&path, b"old").unwrap();

        let group = ProcessGroup::single();
        let gate = SharedCacheGate::new(&group, 0).unwrap().with_overwrite(true);
        let loaded = gate
            .load_or_build(
                &path,
                |tmp| std::fs::write(tmp, b"new").map_err(|e| DdpError::io("write", e)),
                |p| std::fs::read(p).map_err(|e| DdpError::io("read", e)),
            )
            .unwrap();
        assert_eq!(loaded, b"new");
    }

    #[test]
    fn test_builder_rank_out_of_range() {
        let group = ProcessGroup::single();
        assert!(matches!(
            SharedCacheGate::new(&group, 1),
            Err(DdpError::InvalidRank { .. })
        ));
    }

    #[test]
    fn test_build_that_writes_nothing_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("features.bin");
        let group = ProcessGroup::single();
        let gate = SharedCacheGate::new(&group, 0).unwrap();
        let err = gate.ensure(&path, |_| Ok(()));
        assert!(matches!(err, Err(DdpError::Io { .. })));
    }
}
