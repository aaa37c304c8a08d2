//! Device-side command interpretation
//!
//! A [`Replayer`] holds the state a device keeps between command lists:
//! bound pipeline state, uniform and vertex buffers, descriptor sets and the
//! descriptor cache. Devices feed it every command in submission order and
//! execute the [`Action`]s it hands back.

use rustc_hash::FxHashMap;

use crate::cmd::{
    BlendState, ColorState, ColorWriteState, Command, CopyRegion, DepthStencilState, Descriptor,
    ImageView, Primitive, RasterizerState, SamplerDesc, ShaderStage, TextureHandle, VertexLayout,
};
use crate::device::ShaderId;
use crate::error::{GpuError, GpuResult};
use crate::mem::{GpuAddr, MemoryMap};

const MAX_VERTEX_BUFFERS: usize = 4;

/// Stencil reference and masks of one face
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilMasks {
    pub write_mask: u8,
    pub reference: u8,
    pub compare_mask: u8,
}

impl Default for StencilMasks {
    fn default() -> Self {
        Self {
            write_mask: 0xff,
            reference: 0,
            compare_mask: 0xff,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    pub addr: GpuAddr,
    pub size: usize,
}

/// Everything bound at the time of a draw
#[derive(Clone, Debug, Default)]
pub struct PipelineState {
    pub color: ColorState,
    pub blend: BlendState,
    pub color_write: ColorWriteState,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub stencil_front: StencilMasks,
    pub stencil_back: StencilMasks,
    pub shaders: Option<(ShaderId, ShaderId)>,
    pub vertex_layout: Option<VertexLayout>,
    pub vertex_buffers: [Option<BufferBinding>; MAX_VERTEX_BUFFERS],
    /// Indexed by [`ShaderStage::index`]
    pub uniform_buffers: [Option<BufferBinding>; 2],
    pub texture: Option<TextureHandle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub primitive: Primitive,
    pub vertex_count: u32,
    pub first_vertex: u32,
}

/// Image and sampler resolved from the bound texture handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundTexture {
    pub image: ImageView,
    pub sampler: SamplerDesc,
}

/// Work a device must perform for a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Draw(DrawCall),
    Copy {
        src: GpuAddr,
        src_row_pitch: usize,
        dst: ImageView,
        region: CopyRegion,
    },
}

#[derive(Debug, Default)]
pub struct Replayer {
    state: PipelineState,
    image_set: Option<(GpuAddr, u32)>,
    sampler_set: Option<(GpuAddr, u32)>,
    /// Descriptor memory as written by updates
    written: FxHashMap<(GpuAddr, u32), Descriptor>,
    /// Descriptors visible to draws, refreshed by invalidating barriers
    visible: FxHashMap<(GpuAddr, u32), Descriptor>,
}

impl Replayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Apply one command, returning the work it requires
    pub fn apply(&mut self, memory: &MemoryMap, command: &Command) -> GpuResult<Option<Action>> {
        let state = &mut self.state;
        match command {
            Command::BindColorState(s) => state.color = *s,
            Command::BindBlendState(s) => state.blend = *s,
            Command::BindColorWriteState(s) => state.color_write = *s,
            Command::BindRasterizerState(s) => state.rasterizer = *s,
            Command::BindDepthStencilState(s) => state.depth_stencil = *s,
            Command::SetStencil {
                face,
                write_mask,
                reference,
                compare_mask,
            } => {
                let masks = StencilMasks {
                    write_mask: *write_mask,
                    reference: *reference,
                    compare_mask: *compare_mask,
                };
                if face.includes_front() {
                    state.stencil_front = masks;
                }
                if face.includes_back() {
                    state.stencil_back = masks;
                }
            }
            Command::BindShaders { vertex, fragment } => state.shaders = Some((*vertex, *fragment)),
            Command::BindVertexLayout(layout) => state.vertex_layout = Some(layout.clone()),
            Command::BindVertexBuffer { slot, addr, size } => {
                let binding = state
                    .vertex_buffers
                    .get_mut(*slot as usize)
                    .ok_or_else(|| GpuError::device(format!("vertex buffer slot {slot} out of range")))?;
                *binding = Some(BufferBinding {
                    addr: *addr,
                    size: *size,
                });
            }
            Command::PushConstants {
                addr,
                size,
                offset,
                data,
            } => {
                if offset + data.len() > *size {
                    return Err(GpuError::InvalidAddress {
                        addr: addr.add(*offset),
                        len: data.len(),
                    });
                }
                memory.write(addr.add(*offset), data)?;
            }
            Command::BindUniformBuffer {
                stage, addr, size, ..
            } => {
                state.uniform_buffers[stage.index()] = Some(BufferBinding {
                    addr: *addr,
                    size: *size,
                });
            }
            Command::UpdateDescriptor {
                set,
                index,
                descriptor,
            } => {
                self.written.insert((*set, *index), *descriptor);
            }
            Command::BindImageDescriptorSet { set, count } => self.image_set = Some((*set, *count)),
            Command::BindSamplerDescriptorSet { set, count } => {
                self.sampler_set = Some((*set, *count))
            }
            Command::Barrier {
                invalidate_descriptors,
            } => {
                if *invalidate_descriptors {
                    self.visible.clone_from(&self.written);
                }
            }
            Command::BindTexture { handle, .. } => state.texture = Some(*handle),
            Command::CopyBufferToImage {
                src,
                src_row_pitch,
                dst,
                region,
            } => {
                return Ok(Some(Action::Copy {
                    src: *src,
                    src_row_pitch: *src_row_pitch,
                    dst: *dst,
                    region: *region,
                }));
            }
            Command::Draw {
                primitive,
                vertex_count,
                first_vertex,
            } => {
                return Ok(Some(Action::Draw(DrawCall {
                    primitive: *primitive,
                    vertex_count: *vertex_count,
                    first_vertex: *first_vertex,
                })));
            }
        }
        Ok(None)
    }

    /// Resolve the bound texture handle through the visible descriptors
    pub fn bound_texture(&self) -> Option<BoundTexture> {
        let handle = self.state.texture?;
        let (image_set, image_count) = self.image_set?;
        let (sampler_set, sampler_count) = self.sampler_set?;
        if handle.image >= image_count || handle.sampler >= sampler_count {
            return None;
        }
        let image = match self.visible.get(&(image_set, handle.image))? {
            Descriptor::Image(view) => *view,
            Descriptor::Sampler(_) => return None,
        };
        let sampler = match self.visible.get(&(sampler_set, handle.sampler))? {
            Descriptor::Sampler(desc) => *desc,
            Descriptor::Image(_) => return None,
        };
        Some(BoundTexture { image, sampler })
    }

    /// Bytes of the uniform buffer bound to `stage`
    pub fn uniform_bytes(&self, memory: &MemoryMap, stage: ShaderStage) -> GpuResult<Option<Vec<u8>>> {
        match self.state.uniform_buffers[stage.index()] {
            Some(binding) => memory.read(binding.addr, binding.size).map(Some),
            None => Ok(None),
        }
    }
}

/// Copy rows of a linear buffer into image memory
pub fn copy_buffer_to_image(
    memory: &MemoryMap,
    src: GpuAddr,
    src_row_pitch: usize,
    dst: &ImageView,
    region: CopyRegion,
) -> GpuResult<()> {
    if region.x + region.width > dst.width || region.y + region.height > dst.height {
        return Err(GpuError::device(format!(
            "copy region {region:?} exceeds {}x{} image",
            dst.width, dst.height
        )));
    }
    let bpp = dst.format.bytes_per_pixel();
    let row = region.width as usize * bpp;
    for r in 0..region.height as usize {
        let bytes = memory.read(src.add(r * src_row_pitch), row)?;
        let at = (region.y as usize + r) * dst.row_pitch + region.x as usize * bpp;
        memory.write(dst.addr.add(at), &bytes)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CmdBuf, Face};
    use crate::mem::{MemPool, MemoryKind};
    use tilevg_core::TextureFormat;

    fn run(replayer: &mut Replayer, memory: &MemoryMap, cmd: &mut CmdBuf) -> Vec<Action> {
        let list = cmd.finish().unwrap();
        list.commands()
            .iter()
            .filter_map(|c| replayer.apply(memory, c).unwrap())
            .collect()
    }

    fn view() -> ImageView {
        ImageView {
            addr: GpuAddr::new(9, 0),
            width: 2,
            height: 2,
            format: TextureFormat::Rgba,
            row_pitch: 8,
        }
    }

    #[test]
    fn test_descriptors_need_barrier() {
        let pool = MemPool::new(MemoryKind::Data, 1024);
        let memory = MemoryMap::new([pool.clone()]);
        let images = GpuAddr::new(pool.id(), 0);
        let samplers = GpuAddr::new(pool.id(), 512);
        let mut replayer = Replayer::new();
        let mut cmd = CmdBuf::new();

        cmd.update_descriptor(samplers, 0, Descriptor::Sampler(SamplerDesc::default()));
        cmd.update_descriptor(images, 3, Descriptor::Image(view()));
        cmd.bind_image_descriptor_set(images, 16);
        cmd.bind_sampler_descriptor_set(samplers, 16);
        cmd.bind_texture(ShaderStage::Fragment, 0, TextureHandle { image: 3, sampler: 0 });
        run(&mut replayer, &memory, &mut cmd);
        assert_eq!(replayer.bound_texture(), None);

        cmd.barrier(true);
        run(&mut replayer, &memory, &mut cmd);
        assert_eq!(replayer.bound_texture().map(|t| t.image), Some(view()));
    }

    #[test]
    fn test_push_constants_write_memory() {
        let pool = MemPool::new(MemoryKind::Data, 256);
        let ubo = pool.allocate(16, 16).unwrap();
        let memory = MemoryMap::new([pool.clone()]);
        let mut replayer = Replayer::new();
        let mut cmd = CmdBuf::new();

        cmd.push_constants(ubo.gpu_addr(), 16, 4, &[7, 7, 7, 7]);
        cmd.bind_uniform_buffer(ShaderStage::Vertex, 0, ubo.gpu_addr(), 16);
        run(&mut replayer, &memory, &mut cmd);

        let bytes = replayer
            .uniform_bytes(&memory, ShaderStage::Vertex)
            .unwrap()
            .unwrap();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 7, 7, 7, 7]);

        cmd.push_constants(ubo.gpu_addr(), 16, 14, &[1, 2, 3, 4]);
        let list = cmd.finish().unwrap();
        assert!(replayer.apply(&memory, &list.commands()[0]).is_err());
    }

    #[test]
    fn test_copy_respects_pitches() {
        let pool = MemPool::new(MemoryKind::Data, 256);
        let staging = pool.allocate(64, 32).unwrap();
        let image = pool.allocate(16, 16).unwrap();
        let memory = MemoryMap::new([pool.clone()]);
        staging.write(0, &[1, 2, 3, 4]).unwrap();
        staging.write(32, &[5, 6, 7, 8]).unwrap();

        let dst = ImageView {
            addr: image.gpu_addr(),
            width: 1,
            height: 4,
            format: TextureFormat::Rgba,
            row_pitch: 4,
        };
        let region = CopyRegion {
            x: 0,
            y: 1,
            width: 1,
            height: 2,
        };
        copy_buffer_to_image(&memory, staging.gpu_addr(), 32, &dst, region).unwrap();
        assert_eq!(image.read().unwrap(), [0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0]);

        let outside = CopyRegion { y: 3, ..region };
        assert!(copy_buffer_to_image(&memory, staging.gpu_addr(), 32, &dst, outside).is_err());
    }

    #[test]
    fn test_stencil_faces() {
        let memory = MemoryMap::default();
        let mut replayer = Replayer::new();
        let mut cmd = CmdBuf::new();
        cmd.set_stencil(Face::Front, 0x0f, 3, 0xf0);
        cmd.draw(Primitive::TriangleStrip, 4, 8);
        let actions = run(&mut replayer, &memory, &mut cmd);

        assert_eq!(replayer.state().stencil_front.reference, 3);
        assert_eq!(replayer.state().stencil_back, StencilMasks::default());
        assert_eq!(
            actions,
            vec![Action::Draw(DrawCall {
                primitive: Primitive::TriangleStrip,
                vertex_count: 4,
                first_vertex: 8,
            })]
        );
    }
}
