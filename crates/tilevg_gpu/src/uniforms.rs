//! Uniform staging
//!
//! The vertex stage reads the view size and the fragment stage reads one
//! [`FragUniforms`] record. Both live in small uniform buffers that are
//! rewritten through push constants, so every draw sees the values recorded
//! right before it.

use tilevg_core::FragUniforms;

use crate::cmd::{CmdBuf, ShaderStage};
use crate::device::DeviceLimits;
use crate::error::GpuResult;
use crate::mem::{MemHandle, MemPool};

/// Bytes of the vertex uniform block (`vec2<f32>` view size)
pub const VIEW_UNIFORM_SIZE: usize = 8;

pub struct UniformStager {
    view: MemHandle,
    frag: MemHandle,
}

impl UniformStager {
    pub fn new(pool: &MemPool, limits: &DeviceLimits) -> GpuResult<Self> {
        let align = limits.uniform_buffer_alignment;
        Ok(Self {
            view: pool.allocate(VIEW_UNIFORM_SIZE, align)?,
            frag: pool.allocate(FragUniforms::SIZE, align)?,
        })
    }

    /// Upload the view size and bind it for the vertex stage
    pub fn push_view(&self, cmd: &mut CmdBuf, view: [f32; 2]) {
        let addr = self.view.gpu_addr();
        cmd.push_constants(addr, VIEW_UNIFORM_SIZE, 0, bytemuck::cast_slice(&view));
        cmd.bind_uniform_buffer(ShaderStage::Vertex, 0, addr, VIEW_UNIFORM_SIZE);
    }

    /// Upload one fragment record and bind it for the fragment stage
    pub fn push_frag(&self, cmd: &mut CmdBuf, record: &[u8]) {
        let addr = self.frag.gpu_addr();
        let len = record.len().min(FragUniforms::SIZE);
        cmd.push_constants(addr, FragUniforms::SIZE, 0, &record[..len]);
        cmd.bind_uniform_buffer(ShaderStage::Fragment, 0, addr, FragUniforms::SIZE);
    }
}
