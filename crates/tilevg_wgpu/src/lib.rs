//! tilevg wgpu device
//!
//! [`WgpuDevice`] implements [`tilevg_gpu::Device`] on top of wgpu. Command
//! lists are replayed on the host at submission time: bound state becomes a
//! cached render pipeline, uniform and vertex memory is snapshotted into
//! per-submission buffers, and every draw of a list lands in one render pass
//! over an RGBA8 color target with an 8-bit stencil attachment.
//!
//! ```ignore
//! let pools = Pools::new(1 << 20, 4 << 10, 2 << 20);
//! let device = WgpuDevice::new(width, height, pools.memory_map())?;
//! let mut renderer = Renderer::new(device, pools, RendererConfig::new(width, height))?;
//! renderer.create()?;
//! ```

pub mod device;
pub mod error;
pub mod pipeline;
pub mod shaders;

pub use device::WgpuDevice;
pub use error::{BackendError, BackendResult};
