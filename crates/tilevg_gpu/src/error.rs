//! GPU error types

use thiserror::Error;

use crate::mem::{GpuAddr, MemoryKind};

/// Errors raised by memory pools, command recording and devices
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    #[error("{pool:?} memory exhausted: requested {requested} bytes, {available} available")]
    OutOfMemory {
        pool: MemoryKind,
        requested: usize,
        available: usize,
    },

    #[error("command memory exhausted: {used} of {capacity} bytes recorded")]
    CommandMemoryExhausted { used: usize, capacity: usize },

    #[error("shader not found: {0}")]
    ShaderNotFound(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("address {addr:?} (+{len} bytes) is not backed by a live allocation")]
    InvalidAddress { addr: GpuAddr, len: usize },

    #[error("renderer used before create()")]
    NotInitialized,

    #[error("device error: {0}")]
    Device(String),
}

impl GpuError {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Caller mistakes that are reported as a `false`/`None` result rather
    /// than through the error handler
    pub fn is_usage_error(&self) -> bool {
        matches!(self, GpuError::InvalidImage(_))
    }
}

pub type GpuResult<T> = std::result::Result<T, GpuError>;
