//! wgpu backend errors

use thiserror::Error;
use tilevg_gpu::GpuError;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("no suitable GPU adapter found")]
    AdapterNotFound,

    #[error("failed to request GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    #[error(transparent)]
    Gpu(#[from] GpuError),
}

impl From<BackendError> for GpuError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Gpu(err) => err,
            other => GpuError::device(other.to_string()),
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;
