//! Command translator
//!
//! [`Renderer::flush`] walks the calls of a [`FrameBuffers`] in order and
//! records the device commands for each of them:
//!
//! - **Fill**: winding counts are accumulated in the stencil buffer with a
//!   two-sided increment/decrement pass, optional antialiasing fringes are
//!   drawn where the stencil is clear, and a cover quad shades every pixel
//!   with a non-zero count while resetting it.
//! - **ConvexFill**: fans and fringes drawn directly.
//! - **Stroke**: strips drawn directly, or through the stencil buffer so that
//!   overlapping segments blend once.
//! - **Triangles**: a plain textured triangle list.
//!
//! The stencil buffer is zero again after every call.

use tilevg_core::{
    uniform_stride, Call, CallKind, CreateFlags, FrameBuffers, ImageFlags, PaintImage, Span,
    TextureDescriptor, TextureFormat, TextureId,
};

use crate::cmd::{
    AttribFormat, CmdBuf, ColorState, ColorWriteState, CompareOp, DepthStencilState, Face,
    Primitive, RasterizerState, ShaderStage, StencilFace, StencilOp, TextureHandle, VertexAttrib,
    VertexLayout,
};
use crate::config::{abort_on_error, ErrorHandler, RendererConfig, SubmitPolicy};
use crate::descriptor::DescriptorAllocator;
use crate::device::{Device, Shader};
use crate::error::{GpuError, GpuResult};
use crate::mem::{MemHandle, MemPool, MemoryKind, MemoryMap};
use crate::ring::CmdMemRing;
use crate::sampler::SamplerTable;
use crate::texture::{Texture, TextureRegistry, UploadPools};
use crate::uniforms::UniformStager;

/// Command memory slots in flight
pub const NUM_FRAMEBUFFERS: usize = 2;
/// Bytes of command memory per slot
pub const DYNAMIC_CMD_SIZE: usize = 0x20000;

const INIT_CMD_SIZE: usize = 0x1000;
const VERTEX_BUFFER_ALIGN: usize = 16;

/// Memory pools backing a renderer
#[derive(Clone, Debug)]
pub struct Pools {
    pub image: MemPool,
    pub code: MemPool,
    pub data: MemPool,
}

impl Default for Pools {
    fn default() -> Self {
        Self::new(32 << 20, 64 << 10, 4 << 20)
    }
}

impl Pools {
    pub fn new(image: usize, code: usize, data: usize) -> Self {
        Self {
            image: MemPool::new(MemoryKind::Image, image),
            code: MemPool::new(MemoryKind::Code, code),
            data: MemPool::new(MemoryKind::Data, data),
        }
    }

    /// Address resolver a device uses to read these pools
    pub fn memory_map(&self) -> MemoryMap {
        MemoryMap::new([self.image.clone(), self.code.clone(), self.data.clone()])
    }
}

struct Shaders {
    vertex: Shader,
    fragment: Shader,
}

fn fill_vertex_layout() -> VertexLayout {
    VertexLayout {
        attribs: smallvec::smallvec![
            VertexAttrib {
                buffer: 0,
                offset: 0,
                format: AttribFormat::Float2,
            },
            VertexAttrib {
                buffer: 0,
                offset: 8,
                format: AttribFormat::Float2,
            },
        ],
        strides: smallvec::smallvec![std::mem::size_of::<tilevg_core::Vertex>() as u32],
    }
}

pub struct Renderer<D: Device> {
    config: RendererConfig,
    device: D,
    pools: Pools,
    cmd: CmdBuf,
    ring: CmdMemRing<NUM_FRAMEBUFFERS>,
    /// Vertex buffer of the frame recorded in each ring slot
    vertex_buffers: [Option<MemHandle>; NUM_FRAMEBUFFERS],
    shaders: Option<Shaders>,
    uniforms: UniformStager,
    textures: TextureRegistry,
    descriptors: DescriptorAllocator,
    samplers: SamplerTable,
    on_error: ErrorHandler,
}

impl<D: Device> Renderer<D> {
    /// Set up descriptor tables, samplers and command memory
    pub fn new(mut device: D, pools: Pools, config: RendererConfig) -> GpuResult<Self> {
        let limits = device.limits();
        let ring = CmdMemRing::allocate(&pools.data, config.cmd_memory_size, limits.cmd_mem_alignment)?;
        let descriptors = DescriptorAllocator::new(&pools.data)?;
        let uniforms = UniformStager::new(&pools.data, &limits)?;

        let init_memory = pools.data.allocate(INIT_CMD_SIZE, limits.cmd_mem_alignment)?;
        let mut init = CmdBuf::with_memory(&init_memory);
        let samplers = SamplerTable::new(&pools.data, &mut init)?;
        init.barrier(true);
        samplers.bind(&mut init);
        descriptors.set().bind_for_images(&mut init);
        device.submit(init.finish()?)?;
        device.wait_idle()?;

        tracing::debug!(
            view = ?config.view_size,
            flags = ?config.flags,
            policy = ?config.submit_policy,
            "renderer initialized"
        );

        Ok(Self {
            config,
            device,
            pools,
            cmd: CmdBuf::new(),
            ring,
            vertex_buffers: std::array::from_fn(|_| None),
            shaders: None,
            uniforms,
            textures: TextureRegistry::new(),
            descriptors,
            samplers,
            on_error: abort_on_error(),
        })
    }

    /// Load the fill shaders and return the uniform stride for frame buffers
    pub fn create(&mut self) -> GpuResult<usize> {
        let fragment = if self.config.flags.contains(CreateFlags::ANTIALIAS) {
            "fill_aa_fsh"
        } else {
            "fill_fsh"
        };
        let vertex = self.device.load_shader(&self.pools.code, "fill_vsh")?;
        let fragment = self.device.load_shader(&self.pools.code, fragment)?;
        tracing::debug!(vertex = %vertex.name, fragment = %fragment.name, "loaded shaders");
        self.shaders = Some(Shaders { vertex, fragment });
        Ok(self.uniform_stride())
    }

    pub fn uniform_stride(&self) -> usize {
        uniform_stride(self.device.limits().uniform_buffer_alignment)
    }

    /// Empty frame buffers matching this renderer's stride and flags
    pub fn new_frame(&self) -> FrameBuffers {
        FrameBuffers::new(self.uniform_stride(), self.config.flags)
    }

    /// Replace the handler receiving unrecoverable device errors
    pub fn set_error_handler(&mut self, handler: impl FnMut(&GpuError) + 'static) {
        self.on_error = Box::new(handler);
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn pools(&self) -> &Pools {
        &self.pools
    }

    pub fn descriptors(&self) -> &DescriptorAllocator {
        &self.descriptors
    }

    #[doc(hidden)]
    pub fn descriptors_mut(&mut self) -> &mut DescriptorAllocator {
        &mut self.descriptors
    }

    pub fn samplers(&self) -> &SamplerTable {
        &self.samplers
    }

    pub fn create_texture(
        &mut self,
        format: TextureFormat,
        width: u32,
        height: u32,
        flags: ImageFlags,
        data: Option<&[u8]>,
    ) -> Option<TextureId> {
        let pools = UploadPools {
            image: &self.pools.image,
            data: &self.pools.data,
        };
        let result = self
            .textures
            .create(&mut self.device, pools, format, width, height, flags, data);
        match result {
            Ok(id) => Some(id),
            Err(err) => {
                self.report(err);
                None
            }
        }
    }

    pub fn delete_texture(&mut self, id: TextureId) -> bool {
        if self.textures.find(id).is_none() {
            return false;
        }
        self.wait_pending();
        let removed = self.textures.delete(id);
        self.descriptors.free(id);
        tracing::debug!(texture = id.get(), removed, "deleted texture");
        true
    }

    /// Rewrite full-width rows `y..y + height`; `x` and `width` are ignored
    pub fn update_texture(
        &mut self,
        id: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> bool {
        if self.textures.find(id).is_none() {
            return false;
        }
        self.wait_pending();
        let result = self
            .textures
            .update(&mut self.device, &self.pools.data, id, x, y, width, height, data);
        match result {
            Ok(updated) => updated,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.size(id)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.find(id)
    }

    pub fn texture_descriptor(&self, id: TextureId) -> Option<&TextureDescriptor> {
        self.textures.descriptor(id)
    }

    /// Paint reference for an image pattern over texture `id`
    pub fn paint_image(&self, id: TextureId) -> Option<PaintImage> {
        self.textures.descriptor(id).map(|desc| PaintImage::new(id, desc))
    }

    /// Execute and reset the frame
    pub fn flush(&mut self, frame: &mut FrameBuffers) {
        if !frame.calls.is_empty() {
            if let Err(err) = self.render(frame) {
                self.cmd.clear();
                self.ring.cancel();
                self.descriptors.rollback();
                self.report(err);
            }
        }
        frame.clear();
    }

    fn report(&mut self, err: GpuError) {
        if err.is_usage_error() {
            tracing::warn!(%err, "request rejected");
        } else {
            (self.on_error)(&err);
        }
    }

    fn wait_pending(&mut self) {
        if self.ring.has_pending() {
            if let Err(err) = self.ring.wait_all(&mut self.device) {
                self.report(err);
            }
        }
    }

    fn render(&mut self, frame: &FrameBuffers) -> GpuResult<()> {
        let (vertex, fragment) = match &self.shaders {
            Some(shaders) => (shaders.vertex.id, shaders.fragment.id),
            None => return Err(GpuError::NotInitialized),
        };

        self.ring.begin(&mut self.device, &mut self.cmd)?;
        let slot = self.ring.current();
        self.vertex_buffers[slot] = None;
        let verts: &[u8] = bytemuck::cast_slice(&frame.verts);
        let buffer = self.pools.data.allocate(verts.len(), VERTEX_BUFFER_ALIGN)?;
        buffer.write(0, verts)?;
        let (addr, size) = (buffer.gpu_addr(), buffer.size());
        self.vertex_buffers[slot] = Some(buffer);

        self.cmd.bind_color_state(ColorState { blend_enable: true });
        self.cmd.bind_color_write_state(ColorWriteState::ALL);
        self.cmd.bind_rasterizer_state(RasterizerState::default());
        self.cmd.bind_depth_stencil_state(DepthStencilState::default());
        self.cmd.bind_shaders(vertex, fragment);
        self.cmd.bind_vertex_layout(fill_vertex_layout());
        self.cmd.bind_vertex_buffer(0, addr, size);
        self.uniforms.push_view(&mut self.cmd, self.config.view_size);

        let validate = self.config.flags.contains(CreateFlags::DEBUG);
        let per_call = self.config.submit_policy == SubmitPolicy::PerCall;
        for (index, call) in frame.calls.iter().enumerate() {
            if validate {
                if let Err(msg) = frame.validate(call) {
                    tracing::error!(index, %msg, "skipping invalid call");
                    continue;
                }
            }

            self.ring.begin(&mut self.device, &mut self.cmd)?;
            self.cmd.bind_blend_state(call.blend.into());
            match call.kind {
                CallKind::Fill { paths, cover } => self.draw_fill(frame, call, paths, cover),
                CallKind::ConvexFill { paths } => self.draw_convex_fill(frame, call, paths),
                CallKind::Stroke { paths } => self.draw_stroke(frame, call, paths),
                CallKind::Triangles { triangles } => self.draw_triangles(frame, call, triangles),
            }
            if per_call {
                self.submit()?;
            }
        }

        if self.ring.is_recording() {
            self.submit()?;
        }
        tracing::trace!(
            calls = frame.calls.len(),
            verts = frame.verts.len(),
            "flushed frame"
        );
        Ok(())
    }

    fn submit(&mut self) -> GpuResult<()> {
        let list = self.ring.end(&mut self.cmd)?;
        let slot = list.ring_slot();
        let fence = self.device.submit(list)?;
        self.descriptors.commit();
        match (self.config.submit_policy, slot) {
            (SubmitPolicy::PerCall, _) => self.device.wait(fence),
            (SubmitPolicy::PerFrame, Some(slot)) => {
                self.ring.track(slot, fence);
                Ok(())
            }
            (SubmitPolicy::PerFrame, None) => Ok(()),
        }
    }

    /// Upload a uniform record and bind the call's texture, if any
    fn set_uniforms(&mut self, frame: &FrameBuffers, offset: usize, image: Option<TextureId>) {
        match frame.uniform_bytes(offset) {
            Some(record) => self.uniforms.push_frag(&mut self.cmd, record),
            None => tracing::warn!(offset, "uniform record out of range"),
        }

        let Some(id) = image else {
            return;
        };
        let Some(texture) = self.textures.find(id) else {
            tracing::debug!(texture = id.get(), "texture not found, drawing without it");
            return;
        };
        let Some(slot) = self.descriptors.acquire(&mut self.cmd, id, texture.view()) else {
            return;
        };
        let handle = TextureHandle {
            image: slot,
            sampler: SamplerTable::select(texture.flags()),
        };
        self.cmd.bind_texture(ShaderStage::Fragment, 0, handle);
    }

    fn call_paths<'f>(frame: &'f FrameBuffers, paths: Span) -> &'f [tilevg_core::Path] {
        match frame.paths.get(paths.start()..paths.end()) {
            Some(paths) => paths,
            None => {
                tracing::warn!(?paths, "path range out of bounds");
                &[]
            }
        }
    }

    fn draw_fill(&mut self, frame: &FrameBuffers, call: &Call, paths: Span, cover: Span) {
        let paths = Self::call_paths(frame, paths);
        let offset = call.uniform_offset as usize;

        // accumulate winding counts
        self.cmd.bind_color_write_state(ColorWriteState::NONE);
        self.cmd
            .bind_rasterizer_state(RasterizerState::default().with_cull(Face::None));
        self.cmd.bind_depth_stencil_state(DepthStencilState::stencil(
            StencilFace::on_pass(StencilOp::IncrWrap, CompareOp::Always),
            StencilFace::on_pass(StencilOp::DecrWrap, CompareOp::Always),
        ));
        self.cmd.set_stencil(Face::FrontAndBack, 0xff, 0, 0xff);
        self.set_uniforms(frame, offset, None);
        for path in paths {
            self.cmd
                .draw(Primitive::TriangleFan, path.fill.count, path.fill.offset);
        }
        self.cmd.bind_rasterizer_state(RasterizerState::default());
        self.cmd.bind_color_write_state(ColorWriteState::ALL);

        self.set_uniforms(frame, offset + frame.uniform_stride(), call.image);

        if self.config.flags.contains(CreateFlags::ANTIALIAS) {
            // fringes outside the filled area
            let keep = StencilFace::on_pass(StencilOp::Keep, CompareOp::Equal);
            self.cmd
                .bind_depth_stencil_state(DepthStencilState::stencil(keep, keep));
            for path in paths.iter().filter(|p| !p.stroke.is_empty()) {
                self.cmd
                    .draw(Primitive::TriangleStrip, path.stroke.count, path.stroke.offset);
            }
        }

        // shade non-zero winding and reset the stencil
        let zero = StencilFace::all(StencilOp::Zero, CompareOp::NotEqual);
        self.cmd
            .bind_depth_stencil_state(DepthStencilState::stencil(zero, zero));
        self.cmd
            .draw(Primitive::TriangleStrip, cover.count, cover.offset);
        self.cmd.bind_depth_stencil_state(DepthStencilState::default());
    }

    fn draw_convex_fill(&mut self, frame: &FrameBuffers, call: &Call, paths: Span) {
        let paths = Self::call_paths(frame, paths);
        self.set_uniforms(frame, call.uniform_offset as usize, call.image);
        for path in paths {
            self.cmd
                .draw(Primitive::TriangleFan, path.fill.count, path.fill.offset);
            if !path.stroke.is_empty() {
                self.cmd
                    .draw(Primitive::TriangleStrip, path.stroke.count, path.stroke.offset);
            }
        }
    }

    fn draw_strokes(&mut self, paths: &[tilevg_core::Path]) {
        for path in paths {
            self.cmd
                .draw(Primitive::TriangleStrip, path.stroke.count, path.stroke.offset);
        }
    }

    fn draw_stroke(&mut self, frame: &FrameBuffers, call: &Call, paths: Span) {
        let paths = Self::call_paths(frame, paths);
        let offset = call.uniform_offset as usize;

        if !self.config.flags.contains(CreateFlags::STENCIL_STROKES) {
            self.set_uniforms(frame, offset, call.image);
            self.draw_strokes(paths);
            return;
        }

        // solid interior, each pixel at most once
        self.cmd.bind_depth_stencil_state(DepthStencilState::stencil(
            StencilFace::on_pass(StencilOp::Incr, CompareOp::Equal),
            StencilFace::default(),
        ));
        self.cmd.set_stencil(Face::Front, 0xff, 0, 0xff);
        self.set_uniforms(frame, offset + frame.uniform_stride(), call.image);
        self.draw_strokes(paths);

        // antialiased edges where the interior did not land
        self.set_uniforms(frame, offset, call.image);
        self.cmd.bind_depth_stencil_state(DepthStencilState::stencil(
            StencilFace::on_pass(StencilOp::Keep, CompareOp::Equal),
            StencilFace::default(),
        ));
        self.draw_strokes(paths);

        // reset the stencil
        self.cmd.bind_color_write_state(ColorWriteState::NONE);
        self.cmd.bind_depth_stencil_state(DepthStencilState::stencil(
            StencilFace::all(StencilOp::Zero, CompareOp::Always),
            StencilFace::default(),
        ));
        self.draw_strokes(paths);
        self.cmd.bind_color_write_state(ColorWriteState::ALL);
        self.cmd.bind_depth_stencil_state(DepthStencilState::default());
    }

    fn draw_triangles(&mut self, frame: &FrameBuffers, call: &Call, triangles: Span) {
        self.set_uniforms(frame, call.uniform_offset as usize, call.image);
        self.cmd
            .draw(Primitive::Triangles, triangles.count, triangles.offset);
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            tracing::warn!(%err, "device did not drain before shutdown");
        }
    }
}
