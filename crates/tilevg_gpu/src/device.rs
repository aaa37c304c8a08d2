//! Device contract
//!
//! The renderer only talks to the GPU through [`Device`]: it records
//! [`CmdList`]s against memory from host-created [`MemPool`]s, submits them
//! and waits on the returned [`Fence`]s.

use tilevg_core::TextureFormat;

use crate::cmd::{CmdList, ShaderStage};
use crate::error::GpuResult;
use crate::mem::{MemHandle, MemPool};

/// Completion marker of one submission
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fence(pub u64);

/// Device-side shader identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderId(pub u32);

/// A loaded shader; its code stays resident while the value lives
#[derive(Debug)]
pub struct Shader {
    pub id: ShaderId,
    pub stage: ShaderStage,
    pub name: String,
    pub code: MemHandle,
}

/// Alignment requirements and sizes reported by a device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Uniform buffer base alignment
    pub uniform_buffer_alignment: usize,
    /// Staging row pitch and offset alignment for buffer to image copies
    pub linear_stride_alignment: usize,
    pub cmd_mem_alignment: usize,
    pub image_alignment: usize,
    pub max_image_dimension: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            uniform_buffer_alignment: 0x100,
            linear_stride_alignment: 32,
            cmd_mem_alignment: 4,
            image_alignment: 0x200,
            max_image_dimension: 16384,
        }
    }
}

/// Storage requirements of a 2D image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageLayout {
    pub size: usize,
    pub alignment: usize,
    pub row_pitch: usize,
}

pub trait Device {
    fn limits(&self) -> DeviceLimits;

    /// Layout of a `width` x `height` image; linear rows by default
    fn image_layout(&self, format: TextureFormat, width: u32, height: u32) -> ImageLayout {
        let row_pitch = width as usize * format.bytes_per_pixel();
        ImageLayout {
            size: row_pitch * height as usize,
            alignment: self.limits().image_alignment,
            row_pitch,
        }
    }

    /// Load the named shader into code memory
    fn load_shader(&mut self, code: &MemPool, name: &str) -> GpuResult<Shader>;

    /// Queue a command list for execution
    fn submit(&mut self, list: CmdList) -> GpuResult<Fence>;

    /// Block until the submission behind `fence` has completed
    fn wait(&mut self, fence: Fence) -> GpuResult<()>;

    /// Block until every submission has completed
    fn wait_idle(&mut self) -> GpuResult<()>;
}
