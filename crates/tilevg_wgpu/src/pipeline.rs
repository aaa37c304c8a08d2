//! Render pipelines for bound command state
//!
//! wgpu bakes blend, stencil, cull and topology state into pipelines, so
//! every distinct combination recorded by the translator maps to one cached
//! [`wgpu::RenderPipeline`].

use tilevg_core::BlendFactor;
use tilevg_gpu::cmd::{
    AttribFormat, BlendState, ColorWriteState, CompareOp, DepthStencilState, Face, FrontFace,
    Primitive, StencilFace, StencilOp, VertexLayout,
};
use tilevg_gpu::PipelineState;

use crate::shaders::{FRAGMENT_AA_ENTRY, FRAGMENT_ENTRY, VERTEX_ENTRY};

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const STENCIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Stencil8;

/// Everything that selects a pipeline
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub topology: Topology,
    pub blend: Option<BlendState>,
    pub color_write: ColorWriteState,
    pub cull: Face,
    pub front_face: FrontFace,
    pub depth_stencil: DepthStencilState,
    pub read_mask: u8,
    pub write_mask: u8,
    pub layout: VertexLayout,
    pub antialias: bool,
}

/// Primitive topology after fan expansion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    List,
    Strip,
}

impl Topology {
    pub fn of(primitive: Primitive) -> Self {
        match primitive {
            Primitive::Triangles | Primitive::TriangleFan => Topology::List,
            Primitive::TriangleStrip => Topology::Strip,
        }
    }
}

impl PipelineKey {
    pub fn new(state: &PipelineState, layout: VertexLayout, primitive: Primitive, antialias: bool) -> Self {
        Self {
            topology: Topology::of(primitive),
            blend: state.color.blend_enable.then_some(state.blend),
            color_write: state.color_write,
            cull: state.rasterizer.cull,
            front_face: state.rasterizer.front_face,
            depth_stencil: state.depth_stencil,
            read_mask: state.stencil_front.compare_mask,
            write_mask: state.stencil_front.write_mask,
            layout,
            antialias,
        }
    }
}

/// Triangle list indices for a fan of `count` vertices starting at `first`
pub fn fan_indices(first: u32, count: u32) -> Vec<u32> {
    if count < 3 {
        return Vec::new();
    }
    (1..count - 1)
        .flat_map(|i| [first, first + i, first + i + 1])
        .collect()
}

pub fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcAlphaSaturate => wgpu::BlendFactor::SrcAlphaSaturated,
    }
}

pub fn blend_state(state: BlendState) -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_color),
            dst_factor: blend_factor(state.dst_color),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: blend_factor(state.src_alpha),
            dst_factor: blend_factor(state.dst_alpha),
            operation: wgpu::BlendOperation::Add,
        },
    }
}

pub fn compare(op: CompareOp) -> wgpu::CompareFunction {
    match op {
        CompareOp::Never => wgpu::CompareFunction::Never,
        CompareOp::Less => wgpu::CompareFunction::Less,
        CompareOp::Equal => wgpu::CompareFunction::Equal,
        CompareOp::LessEqual => wgpu::CompareFunction::LessEqual,
        CompareOp::Greater => wgpu::CompareFunction::Greater,
        CompareOp::NotEqual => wgpu::CompareFunction::NotEqual,
        CompareOp::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        CompareOp::Always => wgpu::CompareFunction::Always,
    }
}

pub fn stencil_op(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Incr => wgpu::StencilOperation::IncrementClamp,
        StencilOp::Decr => wgpu::StencilOperation::DecrementClamp,
        StencilOp::Invert => wgpu::StencilOperation::Invert,
        StencilOp::IncrWrap => wgpu::StencilOperation::IncrementWrap,
        StencilOp::DecrWrap => wgpu::StencilOperation::DecrementWrap,
    }
}

fn stencil_face(face: StencilFace) -> wgpu::StencilFaceState {
    wgpu::StencilFaceState {
        compare: compare(face.compare),
        fail_op: stencil_op(face.fail),
        depth_fail_op: stencil_op(face.depth_fail),
        pass_op: stencil_op(face.pass),
    }
}

/// `None` when both faces are culled; such draws are skipped
pub fn cull_mode(cull: Face) -> Option<Option<wgpu::Face>> {
    match cull {
        Face::None => Some(None),
        Face::Front => Some(Some(wgpu::Face::Front)),
        Face::Back => Some(Some(wgpu::Face::Back)),
        Face::FrontAndBack => None,
    }
}

pub fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<Vec<wgpu::VertexAttribute>> = (0..key.layout.strides.len())
        .map(|slot| {
            key.layout
                .attribs
                .iter()
                .enumerate()
                .filter(|(_, attrib)| attrib.buffer as usize == slot)
                .map(|(location, attrib)| wgpu::VertexAttribute {
                    format: match attrib.format {
                        AttribFormat::Float2 => wgpu::VertexFormat::Float32x2,
                    },
                    offset: attrib.offset as u64,
                    shader_location: location as u32,
                })
                .collect()
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout<'_>> = key
        .layout
        .strides
        .iter()
        .zip(&attributes)
        .map(|(stride, attributes)| wgpu::VertexBufferLayout {
            array_stride: *stride as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        })
        .collect();

    let stencil = if key.depth_stencil.stencil_test {
        wgpu::StencilState {
            front: stencil_face(key.depth_stencil.front),
            back: stencil_face(key.depth_stencil.back),
            read_mask: key.read_mask as u32,
            write_mask: key.write_mask as u32,
        }
    } else {
        wgpu::StencilState {
            front: wgpu::StencilFaceState::IGNORE,
            back: wgpu::StencilFaceState::IGNORE,
            read_mask: 0,
            write_mask: 0,
        }
    };

    let fragment_entry = if key.antialias {
        FRAGMENT_AA_ENTRY
    } else {
        FRAGMENT_ENTRY
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("tilevg fill pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(VERTEX_ENTRY),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: key.blend.map(blend_state),
                write_mask: wgpu::ColorWrites::from_bits_truncate(key.color_write.0 as u32),
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: match key.topology {
                Topology::List => wgpu::PrimitiveTopology::TriangleList,
                Topology::Strip => wgpu::PrimitiveTopology::TriangleStrip,
            },
            front_face: match key.front_face {
                FrontFace::Ccw => wgpu::FrontFace::Ccw,
                FrontFace::Cw => wgpu::FrontFace::Cw,
            },
            cull_mode: cull_mode(key.cull).flatten(),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: STENCIL_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil,
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
