//! tilevg GPU command translator
//!
//! Turns the calls collected in a [`tilevg_core::FrameBuffers`] into device
//! commands: stencil-then-cover fills, convex fills, strokes and textured
//! triangles.
//!
//! # Layers
//!
//! - **Memory**: host-created pools addressed through [`GpuAddr`]s
//! - **Commands**: [`CmdBuf`] records [`Command`]s into bounded command memory
//! - **Device**: the [`Device`] trait submits command lists and waits on fences
//! - **Resources**: textures, the 4096-entry image descriptor table and the
//!   16 precomputed samplers
//! - **Translator**: [`Renderer`] ties the above together
//!
//! With the `headless` feature (on by default) [`headless::HeadlessDevice`]
//! executes command lists on the CPU, which is what the test-suite renders
//! against.

pub mod cmd;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod mem;
pub mod renderer;
pub mod replay;
pub mod ring;
pub mod sampler;
pub mod texture;
pub mod uniforms;

#[cfg(feature = "headless")]
pub mod headless;

pub use cmd::{CmdBuf, CmdList, Command, ShaderStage};
pub use config::{abort_on_error, ErrorHandler, RendererConfig, SubmitPolicy};
pub use descriptor::{DescriptorAllocator, MAX_IMAGES};
pub use device::{Device, DeviceLimits, Fence, ImageLayout, Shader, ShaderId};
pub use error::{GpuError, GpuResult};
pub use mem::{GpuAddr, MemHandle, MemPool, MemoryKind, MemoryMap};
pub use renderer::{Pools, Renderer, DYNAMIC_CMD_SIZE, NUM_FRAMEBUFFERS};
pub use replay::{Action, PipelineState, Replayer};
pub use sampler::{SamplerTable, SAMPLER_COUNT};
pub use texture::{Texture, TextureRegistry};
pub use uniforms::UniformStager;
