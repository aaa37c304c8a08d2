//! Software device
//!
//! [`HeadlessDevice`] executes command lists on the CPU against a
//! [`RenderTarget`] with an 8-bit stencil buffer. Submissions are queued and
//! only run when a fence covering them is waited on, like a real queue.

mod raster;
mod shader;

use std::collections::VecDeque;
use std::path::Path;

use tilevg_core::{FragUniforms, ShaderType};

use crate::cmd::{CmdList, ShaderStage};
use crate::device::{Device, DeviceLimits, Fence, Shader, ShaderId};
use crate::error::{GpuError, GpuResult};
use crate::mem::{MemPool, MemoryMap};
use crate::replay::{copy_buffer_to_image, Action, DrawCall, Replayer};
use crate::uniforms::VIEW_UNIFORM_SIZE;

pub use raster::{assemble, RenderTarget};
pub use shader::Program;

use raster::{draw_triangle, ClipVertex};
use shader::{fill_fragment, fill_vertex, TextureSampler, Varyings};

/// Work counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Command lists submitted
    pub submissions: u64,
    /// Command lists executed
    pub executed: u64,
    pub draws: u64,
}

pub struct HeadlessDevice {
    memory: MemoryMap,
    limits: DeviceLimits,
    target: RenderTarget,
    replayer: Replayer,
    programs: Vec<Program>,
    queue: VecDeque<(Fence, CmdList)>,
    next_fence: u64,
    completed: Fence,
    stats: DeviceStats,
}

impl HeadlessDevice {
    /// A device rendering into a `width` x `height` target, reading `memory`
    pub fn new(width: u32, height: u32, memory: MemoryMap) -> Self {
        Self {
            memory,
            limits: DeviceLimits::default(),
            target: RenderTarget::new(width, height),
            replayer: Replayer::new(),
            programs: Vec::new(),
            queue: VecDeque::new(),
            next_fence: 0,
            completed: Fence(0),
            stats: DeviceStats::default(),
        }
    }

    pub fn with_limits(mut self, limits: DeviceLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn stats(&self) -> DeviceStats {
        self.stats
    }

    /// Submissions not yet executed
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Clear color to `color` and stencil to zero
    pub fn clear(&mut self, color: [f32; 4]) {
        self.target.clear(color);
    }

    /// Write the color attachment as a PNG file
    pub fn save_png(&self, path: impl AsRef<Path>) -> GpuResult<()> {
        self.target
            .to_image()
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| GpuError::device(format!("failed to save target: {e}")))
    }

    fn execute(&mut self, list: CmdList) -> GpuResult<()> {
        for command in list.commands() {
            match self.replayer.apply(&self.memory, command)? {
                Some(Action::Draw(call)) => self.draw(call)?,
                Some(Action::Copy {
                    src,
                    src_row_pitch,
                    dst,
                    region,
                }) => copy_buffer_to_image(&self.memory, src, src_row_pitch, &dst, region)?,
                None => {}
            }
        }
        self.stats.executed += 1;
        Ok(())
    }

    fn run_until(&mut self, fence: Fence) -> GpuResult<()> {
        while let Some((next, _)) = self.queue.front() {
            if *next > fence {
                break;
            }
            let Some((next, list)) = self.queue.pop_front() else {
                break;
            };
            self.completed = next;
            self.execute(list)?;
        }
        Ok(())
    }

    fn program(&self, id: ShaderId) -> GpuResult<Program> {
        self.programs
            .get(id.0 as usize)
            .copied()
            .ok_or_else(|| GpuError::device(format!("unknown shader {}", id.0)))
    }

    fn uniforms(&self, stage: ShaderStage, size: usize) -> GpuResult<Vec<u8>> {
        match self.replayer.uniform_bytes(&self.memory, stage)? {
            Some(bytes) if bytes.len() >= size => Ok(bytes),
            _ => Err(GpuError::device(format!("no {stage:?} uniform buffer of {size} bytes bound"))),
        }
    }

    fn draw(&mut self, call: DrawCall) -> GpuResult<()> {
        let state = self.replayer.state().clone();
        let Some((vertex, fragment)) = state.shaders else {
            return Err(GpuError::device("draw without bound shaders"));
        };
        let antialias = match (self.program(vertex)?, self.program(fragment)?) {
            (Program::FillVertex, Program::FillFragment { antialias }) => antialias,
            programs => return Err(GpuError::device(format!("cannot draw with {programs:?}"))),
        };
        let Some(layout) = &state.vertex_layout else {
            return Err(GpuError::device("draw without a vertex layout"));
        };

        let view: [f32; 2] =
            bytemuck::pod_read_unaligned(&self.uniforms(ShaderStage::Vertex, VIEW_UNIFORM_SIZE)?[..VIEW_UNIFORM_SIZE]);
        let frag: FragUniforms =
            bytemuck::pod_read_unaligned(&self.uniforms(ShaderStage::Fragment, FragUniforms::SIZE)?[..FragUniforms::SIZE]);
        let texture = match frag.shader() {
            ShaderType::FillImage | ShaderType::Image => self
                .replayer
                .bound_texture()
                .map(|bound| TextureSampler::load(&self.memory, bound))
                .transpose()?,
            ShaderType::FillGradient | ShaderType::Simple => None,
        };

        let mut buffers = Vec::with_capacity(layout.strides.len());
        for slot in 0..layout.strides.len() {
            let binding = state.vertex_buffers.get(slot).copied().flatten().ok_or_else(|| {
                GpuError::device(format!("vertex buffer {slot} not bound"))
            })?;
            buffers.push((binding.addr, self.memory.read(binding.addr, binding.size)?));
        }

        let first = call.first_vertex as usize;
        let mut vertices = Vec::with_capacity(call.vertex_count as usize);
        for index in first..first + call.vertex_count as usize {
            let mut attribs = [[0.0f32; 2]; 2];
            for (attrib, out) in layout.attribs.iter().zip(attribs.iter_mut()) {
                let (addr, bytes) = &buffers[attrib.buffer as usize];
                let stride = layout.strides[attrib.buffer as usize] as usize;
                let at = index * stride + attrib.offset as usize;
                *out = bytes
                    .get(at..at + 8)
                    .map(bytemuck::pod_read_unaligned)
                    .ok_or(GpuError::InvalidAddress { addr: addr.add(at), len: 8 })?;
            }
            vertices.push(ClipVertex {
                ndc: fill_vertex(view, attribs[0]),
                varyings: Varyings {
                    pos: attribs[0],
                    tcoord: attribs[1],
                },
            });
        }

        let mut shade = |input| fill_fragment(&frag, texture.as_ref(), antialias, input);
        for tri in assemble(call.primitive, vertices.len()) {
            draw_triangle(&mut self.target, &state, tri.map(|i| vertices[i]), &mut shade);
        }
        self.stats.draws += 1;
        Ok(())
    }
}

impl Device for HeadlessDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn load_shader(&mut self, code: &MemPool, name: &str) -> GpuResult<Shader> {
        let program = Program::from_name(name).ok_or_else(|| GpuError::ShaderNotFound(name.to_string()))?;
        let memory = code.allocate(name.len(), self.limits.cmd_mem_alignment)?;
        memory.write(0, name.as_bytes())?;
        let id = ShaderId(self.programs.len() as u32);
        self.programs.push(program);
        Ok(Shader {
            id,
            stage: program.stage(),
            name: name.to_string(),
            code: memory,
        })
    }

    fn submit(&mut self, list: CmdList) -> GpuResult<Fence> {
        self.next_fence += 1;
        let fence = Fence(self.next_fence);
        self.queue.push_back((fence, list));
        self.stats.submissions += 1;
        Ok(fence)
    }

    fn wait(&mut self, fence: Fence) -> GpuResult<()> {
        if fence <= self.completed {
            return Ok(());
        }
        self.run_until(fence)
    }

    fn wait_idle(&mut self) -> GpuResult<()> {
        self.run_until(Fence(self.next_fence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CmdBuf, Primitive};
    use crate::mem::MemoryKind;

    #[test]
    fn test_submissions_run_on_wait() {
        let pool = MemPool::new(MemoryKind::Data, 1024);
        let mut device = HeadlessDevice::new(4, 4, MemoryMap::new([pool]));
        let mut cmd = CmdBuf::new();

        cmd.barrier(false);
        let first = device.submit(cmd.finish().unwrap()).unwrap();
        cmd.barrier(false);
        device.submit(cmd.finish().unwrap()).unwrap();
        assert_eq!(device.pending(), 2);

        device.wait(first).unwrap();
        assert_eq!(device.pending(), 1);
        device.wait_idle().unwrap();
        assert_eq!(device.stats().executed, 2);
    }

    #[test]
    fn test_unknown_shader() {
        let code = MemPool::new(MemoryKind::Code, 256);
        let mut device = HeadlessDevice::new(1, 1, MemoryMap::new([code.clone()]));
        assert!(matches!(
            device.load_shader(&code, "blur_fsh"),
            Err(GpuError::ShaderNotFound(_))
        ));
        let shader = device.load_shader(&code, "fill_vsh").unwrap();
        assert_eq!(shader.stage, ShaderStage::Vertex);
        assert_eq!(shader.code.read().unwrap(), b"fill_vsh");
    }

    #[test]
    fn test_draw_without_shaders_fails() {
        let mut device = HeadlessDevice::new(1, 1, MemoryMap::default());
        let mut cmd = CmdBuf::new();
        cmd.draw(Primitive::Triangles, 3, 0);
        device.submit(cmd.finish().unwrap()).unwrap();
        assert!(device.wait_idle().is_err());
    }
}
