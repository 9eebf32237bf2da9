//! # Distributed Coordination
//!
//! Everything ranks do together lives here.
//!
//! ## Data Parallelism
//!
//! Every rank holds a full copy of the model and trains on its own shard of
//! the data. After each accumulation window the gradients are averaged with
//! an **All-Reduce** so every replica takes the same optimizer step.
//!
//! ## Module Contents
//!
//! *   [`CollectiveBackend`]: the two collectives (`barrier`, `all_reduce_sum`).
//!     *   [`SingleProcessBackend`]: world size 1, no-ops.
//!     *   [`LocalBackend`]: ranks as threads, Ring All-Reduce over channels.
//!     *   [`TcpBackend`]: ranks as processes, star around rank 0.
//! *   [`ProcessGroup`]: rank identity plus a backend, with an explicit
//!     `destroy`.
//! *   [`SharedCacheGate`]: one rank builds a shared file while the others wait.
//! *   [`GradientSynchronizer`]: reduce, average, barrier.
//!
//! ## Quick Start
//!
//! ```rust
//! use ddp_rs::distributed::{LocalBackend, ProcessGroup};
//! use std::thread;
//!
//! let handles: Vec<_> = LocalBackend::create_world(2)
//!     .into_iter()
//!     .map(|backend| {
//!         thread::spawn(move || {
//!             let group = ProcessGroup::from_backend(Box::new(backend)).unwrap();
//!             let mut buf = vec![group.rank() as f32 + 1.0];
//!             group.all_reduce_sum(&mut buf).unwrap();
//!             buf[0]
//!         })
//!     })
//!     .collect();
//!
//! for h in handles {
//!     assert_eq!(h.join().unwrap(), 3.0);
//! }
//! ```

pub mod backend;
pub mod cache_gate;
pub mod grad_sync;
pub mod local_backend;
pub mod process_group;
pub mod tcp_backend;

pub use backend::{CollectiveBackend, SingleProcessBackend};
pub use cache_gate::{CacheOutcome, SharedCacheGate};
pub use grad_sync::GradientSynchronizer;
pub use local_backend::LocalBackend;
pub use process_group::ProcessGroup;
pub use tcp_backend::TcpBackend;
