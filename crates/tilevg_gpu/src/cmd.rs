//! Command recording
//!
//! A [`CmdBuf`] records [`Command`]s into a bounded slice of command memory.
//! Finishing it yields a [`CmdList`] that a [`crate::Device`] executes in
//! order. Pipeline state set by one list stays bound for later lists on the
//! same device.

use smallvec::SmallVec;
use tilevg_core::{BlendFactor, BlendFunc, TextureFormat};

use crate::device::ShaderId;
use crate::error::{GpuError, GpuResult};
use crate::mem::{GpuAddr, MemHandle};

/// Size of one image or sampler descriptor in descriptor memory
pub const DESCRIPTOR_SIZE: usize = 32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Primitive {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

impl CompareOp {
    /// Evaluate `reference OP stored`
    pub fn test(self, reference: u8, stored: u8) -> bool {
        match self {
            CompareOp::Never => false,
            CompareOp::Less => reference < stored,
            CompareOp::Equal => reference == stored,
            CompareOp::LessEqual => reference <= stored,
            CompareOp::Greater => reference > stored,
            CompareOp::NotEqual => reference != stored,
            CompareOp::GreaterEqual => reference >= stored,
            CompareOp::Always => true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    /// Increment and clamp
    Incr,
    /// Decrement and clamp
    Decr,
    Invert,
    IncrWrap,
    DecrWrap,
}

impl StencilOp {
    pub fn apply(self, stored: u8, reference: u8) -> u8 {
        match self {
            StencilOp::Keep => stored,
            StencilOp::Zero => 0,
            StencilOp::Replace => reference,
            StencilOp::Incr => stored.saturating_add(1),
            StencilOp::Decr => stored.saturating_sub(1),
            StencilOp::Invert => !stored,
            StencilOp::IncrWrap => stored.wrapping_add(1),
            StencilOp::DecrWrap => stored.wrapping_sub(1),
        }
    }
}

/// Stencil behaviour of one face
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilFace {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub compare: CompareOp,
}

impl StencilFace {
    /// Same op for fail, depth-fail and pass
    pub const fn all(op: StencilOp, compare: CompareOp) -> Self {
        Self {
            fail: op,
            depth_fail: op,
            pass: op,
            compare,
        }
    }

    /// Only the pass op differs from `Keep`
    pub const fn on_pass(pass: StencilOp, compare: CompareOp) -> Self {
        Self {
            fail: StencilOp::Keep,
            depth_fail: StencilOp::Keep,
            pass,
            compare,
        }
    }
}

/// Depth/stencil state; depth testing is never used
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub stencil_test: bool,
    pub front: StencilFace,
    pub back: StencilFace,
}

impl DepthStencilState {
    /// Stencil test enabled with the given per-face behaviour
    pub const fn stencil(front: StencilFace, back: StencilFace) -> Self {
        Self {
            stencil_test: true,
            front,
            back,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Face {
    None,
    Front,
    #[default]
    Back,
    FrontAndBack,
}

impl Face {
    pub fn includes_front(self) -> bool {
        matches!(self, Face::Front | Face::FrontAndBack)
    }

    pub fn includes_back(self) -> bool {
        matches!(self, Face::Back | Face::FrontAndBack)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RasterizerState {
    pub cull: Face,
    pub front_face: FrontFace,
}

impl RasterizerState {
    pub fn with_cull(mut self, cull: Face) -> Self {
        self.cull = cull;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorState {
    pub blend_enable: bool,
}

/// Per-channel color write mask
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorWriteState(pub u8);

impl Default for ColorWriteState {
    fn default() -> Self {
        Self::ALL
    }
}

impl ColorWriteState {
    pub const NONE: ColorWriteState = ColorWriteState(0);
    pub const ALL: ColorWriteState = ColorWriteState(0b1111);

    pub fn writes(self, channel: usize) -> bool {
        self.0 & (1 << channel) != 0
    }
}

/// Blend factors with additive blend equations
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
        }
    }
}

impl From<BlendFunc> for BlendState {
    fn from(func: BlendFunc) -> Self {
        Self {
            src_color: func.src_rgb,
            dst_color: func.dst_rgb,
            src_alpha: func.src_alpha,
            dst_alpha: func.dst_alpha,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Fragment => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttribFormat {
    Float2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttrib {
    pub buffer: u32,
    pub offset: u32,
    pub format: AttribFormat,
}

/// Vertex attribute and buffer layout
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub attribs: SmallVec<[VertexAttrib; 4]>,
    pub strides: SmallVec<[u32; 2]>,
}

/// Combined image and sampler slot indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub image: u32,
    pub sampler: u32,
}

/// Where and how an image lives in image memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageView {
    pub addr: GpuAddr,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub row_pitch: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MipFilter {
    #[default]
    None,
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: MipFilter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Descriptor {
    Image(ImageView),
    Sampler(SamplerDesc),
}

/// Region of an image touched by a copy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CopyRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    BindColorState(ColorState),
    BindBlendState(BlendState),
    BindColorWriteState(ColorWriteState),
    BindRasterizerState(RasterizerState),
    BindDepthStencilState(DepthStencilState),
    SetStencil {
        face: Face,
        write_mask: u8,
        reference: u8,
        compare_mask: u8,
    },
    BindShaders {
        vertex: ShaderId,
        fragment: ShaderId,
    },
    BindVertexLayout(VertexLayout),
    BindVertexBuffer {
        slot: u32,
        addr: GpuAddr,
        size: usize,
    },
    /// Write `data` into a uniform buffer at `offset` in command order
    PushConstants {
        addr: GpuAddr,
        size: usize,
        offset: usize,
        data: Vec<u8>,
    },
    BindUniformBuffer {
        stage: ShaderStage,
        slot: u32,
        addr: GpuAddr,
        size: usize,
    },
    /// Write a descriptor into descriptor memory; visible to draws only after
    /// a barrier that invalidates the descriptor cache
    UpdateDescriptor {
        set: GpuAddr,
        index: u32,
        descriptor: Descriptor,
    },
    BindImageDescriptorSet {
        set: GpuAddr,
        count: u32,
    },
    BindSamplerDescriptorSet {
        set: GpuAddr,
        count: u32,
    },
    Barrier {
        invalidate_descriptors: bool,
    },
    BindTexture {
        stage: ShaderStage,
        slot: u32,
        handle: TextureHandle,
    },
    CopyBufferToImage {
        src: GpuAddr,
        src_row_pitch: usize,
        dst: ImageView,
        region: CopyRegion,
    },
    Draw {
        primitive: Primitive,
        vertex_count: u32,
        first_vertex: u32,
    },
}

impl Command {
    /// Bytes the command occupies in command memory
    pub fn encoded_size(&self) -> usize {
        const WORD: usize = 8;
        match self {
            Command::PushConstants { data, .. } => 3 * WORD + data.len().div_ceil(4) * 4,
            Command::UpdateDescriptor { .. } => 2 * WORD + DESCRIPTOR_SIZE,
            Command::BindVertexLayout(layout) => WORD * (1 + layout.attribs.len() + layout.strides.len()),
            Command::CopyBufferToImage { .. } => 6 * WORD,
            Command::Draw { .. } | Command::SetStencil { .. } | Command::BindVertexBuffer { .. } => 2 * WORD,
            Command::BindUniformBuffer { .. } => 2 * WORD,
            _ => WORD,
        }
    }
}

/// Commands ready for submission
#[derive(Clone, Debug, Default)]
pub struct CmdList {
    commands: Vec<Command>,
    ring_slot: Option<usize>,
}

impl CmdList {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Ring slot whose command memory holds this list, if any
    pub fn ring_slot(&self) -> Option<usize> {
        self.ring_slot
    }

    pub(crate) fn set_ring_slot(&mut self, slot: usize) {
        self.ring_slot = Some(slot);
    }
}

/// Command recorder bounded by its attached command memory
#[derive(Debug, Default)]
pub struct CmdBuf {
    commands: Vec<Command>,
    memory: Option<(GpuAddr, usize)>,
    used: usize,
}

impl CmdBuf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorder using the whole of `memory`
    pub fn with_memory(memory: &MemHandle) -> Self {
        let mut cmd = Self::new();
        cmd.attach_memory(memory.gpu_addr(), memory.size());
        cmd
    }

    /// Point the recorder at a new command memory region
    pub fn attach_memory(&mut self, addr: GpuAddr, size: usize) {
        self.memory = Some((addr, size));
        self.used = 0;
    }

    /// Bytes of attached command memory; unbounded while detached
    pub fn capacity(&self) -> usize {
        self.memory.map_or(usize::MAX, |(_, size)| size)
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn push(&mut self, command: Command) {
        self.used += command.encoded_size();
        self.commands.push(command);
    }

    /// Close the recording, failing if it outgrew its command memory
    pub fn finish(&mut self) -> GpuResult<CmdList> {
        let capacity = self.capacity();
        let used = std::mem::take(&mut self.used);
        let commands = std::mem::take(&mut self.commands);
        if used > capacity {
            return Err(GpuError::CommandMemoryExhausted { used, capacity });
        }
        Ok(CmdList {
            commands,
            ring_slot: None,
        })
    }

    /// Drop everything recorded since the last finish
    pub fn clear(&mut self) {
        self.commands.clear();
        self.used = 0;
    }

    pub fn bind_color_state(&mut self, state: ColorState) {
        self.push(Command::BindColorState(state));
    }

    pub fn bind_blend_state(&mut self, state: BlendState) {
        self.push(Command::BindBlendState(state));
    }

    pub fn bind_color_write_state(&mut self, state: ColorWriteState) {
        self.push(Command::BindColorWriteState(state));
    }

    pub fn bind_rasterizer_state(&mut self, state: RasterizerState) {
        self.push(Command::BindRasterizerState(state));
    }

    pub fn bind_depth_stencil_state(&mut self, state: DepthStencilState) {
        self.push(Command::BindDepthStencilState(state));
    }

    pub fn set_stencil(&mut self, face: Face, write_mask: u8, reference: u8, compare_mask: u8) {
        self.push(Command::SetStencil {
            face,
            write_mask,
            reference,
            compare_mask,
        });
    }

    pub fn bind_shaders(&mut self, vertex: ShaderId, fragment: ShaderId) {
        self.push(Command::BindShaders { vertex, fragment });
    }

    pub fn bind_vertex_layout(&mut self, layout: VertexLayout) {
        self.push(Command::BindVertexLayout(layout));
    }

    pub fn bind_vertex_buffer(&mut self, slot: u32, addr: GpuAddr, size: usize) {
        self.push(Command::BindVertexBuffer { slot, addr, size });
    }

    pub fn push_constants(&mut self, addr: GpuAddr, size: usize, offset: usize, data: &[u8]) {
        self.push(Command::PushConstants {
            addr,
            size,
            offset,
            data: data.to_vec(),
        });
    }

    pub fn bind_uniform_buffer(&mut self, stage: ShaderStage, slot: u32, addr: GpuAddr, size: usize) {
        self.push(Command::BindUniformBuffer {
            stage,
            slot,
            addr,
            size,
        });
    }

    pub fn update_descriptor(&mut self, set: GpuAddr, index: u32, descriptor: Descriptor) {
        self.push(Command::UpdateDescriptor {
            set,
            index,
            descriptor,
        });
    }

    pub fn bind_image_descriptor_set(&mut self, set: GpuAddr, count: u32) {
        self.push(Command::BindImageDescriptorSet { set, count });
    }

    pub fn bind_sampler_descriptor_set(&mut self, set: GpuAddr, count: u32) {
        self.push(Command::BindSamplerDescriptorSet { set, count });
    }

    pub fn barrier(&mut self, invalidate_descriptors: bool) {
        self.push(Command::Barrier {
            invalidate_descriptors,
        });
    }

    pub fn bind_texture(&mut self, stage: ShaderStage, slot: u32, handle: TextureHandle) {
        self.push(Command::BindTexture {
            stage,
            slot,
            handle,
        });
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: GpuAddr,
        src_row_pitch: usize,
        dst: ImageView,
        region: CopyRegion,
    ) {
        self.push(Command::CopyBufferToImage {
            src,
            src_row_pitch,
            dst,
            region,
        });
    }

    pub fn draw(&mut self, primitive: Primitive, vertex_count: u32, first_vertex: u32) {
        self.push(Command::Draw {
            primitive,
            vertex_count,
            first_vertex,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemPool, MemoryKind};

    #[test]
    fn test_finish_within_budget() {
        let pool = MemPool::new(MemoryKind::Data, 1024);
        let memory = pool.allocate(64, 8).unwrap();
        let mut cmd = CmdBuf::with_memory(&memory);
        cmd.draw(Primitive::Triangles, 3, 0);
        cmd.barrier(true);
        assert_eq!(cmd.used(), 24);

        let list = cmd.finish().unwrap();
        assert_eq!(list.len(), 2);
        assert!(cmd.is_empty());
        assert_eq!(cmd.used(), 0);
    }

    #[test]
    fn test_finish_over_budget() {
        let pool = MemPool::new(MemoryKind::Data, 1024);
        let memory = pool.allocate(16, 8).unwrap();
        let mut cmd = CmdBuf::with_memory(&memory);
        cmd.push_constants(memory.gpu_addr(), 16, 0, &[0; 64]);
        assert_eq!(
            cmd.finish().unwrap_err(),
            GpuError::CommandMemoryExhausted {
                used: 88,
                capacity: 16
            }
        );
        // the failed recording is discarded
        assert!(cmd.is_empty());
    }

    #[test]
    fn test_stencil_ops() {
        assert_eq!(StencilOp::IncrWrap.apply(255, 0), 0);
        assert_eq!(StencilOp::DecrWrap.apply(0, 0), 255);
        assert_eq!(StencilOp::Incr.apply(255, 0), 255);
        assert_eq!(StencilOp::Decr.apply(0, 0), 0);
        assert_eq!(StencilOp::Replace.apply(9, 3), 3);
        assert_eq!(StencilOp::Zero.apply(9, 3), 0);
    }

    #[test]
    fn test_compare_reference_first() {
        assert!(CompareOp::Equal.test(0, 0));
        assert!(CompareOp::NotEqual.test(0, 1));
        assert!(CompareOp::Less.test(0, 1));
        assert!(!CompareOp::Greater.test(0, 1));
    }

    #[test]
    fn test_blend_state_from_func() {
        let state = BlendState::from(BlendFunc::uniform(BlendFactor::One, BlendFactor::OneMinusSrcAlpha));
        assert_eq!(state.dst_alpha, BlendFactor::OneMinusSrcAlpha);
    }
}
