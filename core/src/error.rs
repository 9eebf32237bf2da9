//! Error type shared by every ddp-rs component.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by configuration, collectives, telemetry and evaluation.
#[derive(Error, Debug)]
pub enum DdpError {
    /// A configuration value is out of range or inconsistent with another.
    #[error("Invalid configuration value for '{field}': {message}")]
    Config { field: String, message: String },

    /// Training would write into a populated directory without `overwrite_output_dir`.
    #[error("Output directory ({0}) already exists and is not empty; set overwrite_output_dir to reuse it")]
    OutputDirNotEmpty(PathBuf),

    /// `world_size > 1` but no master address/port was given.
    #[error("Distributed run with world_size {world_size} requires master_addr and master_port")]
    MissingRendezvous { world_size: usize },

    /// A rank id outside `0..world_size`.
    #[error("Rank {rank} is out of range for world_size {world_size}")]
    InvalidRank { rank: usize, world_size: usize },

    /// A collective was called after `ProcessGroup::destroy`.
    #[error("Process group already destroyed; cannot call {op}")]
    GroupDestroyed { op: &'static str },

    /// A peer failed during a collective (disconnect, channel closed).
    #[error("Collective failed: {0}")]
    Collective(String),

    /// A peer sent a frame that does not match the expected exchange.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Buffer or tensor shapes disagree.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    /// An operation was called in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Filesystem or socket error with context.
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A safetensors file could not be written or read back.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Kernel error: {0}")]
    Kernel(#[from] ddp_rs_kernels::KernelError),
}

impl DdpError {
    /// Wraps an IO error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Configuration problems are caught before any collective is opened.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::OutputDirNotEmpty(_)
                | Self::MissingRendezvous { .. }
                | Self::InvalidRank { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DdpError>;
