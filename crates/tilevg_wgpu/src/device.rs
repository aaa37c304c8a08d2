//! wgpu implementation of the device contract

use std::num::NonZeroU64;
use std::ops::Range;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tilevg_core::{FragUniforms, ShaderType, TextureFormat};
use tilevg_gpu::cmd::{
    CmdList, Filter, ImageView, MipFilter, Primitive, SamplerDesc, ShaderStage, WrapMode,
};
use tilevg_gpu::replay::{copy_buffer_to_image, BoundTexture, DrawCall};
use tilevg_gpu::uniforms::VIEW_UNIFORM_SIZE;
use tilevg_gpu::{
    Action, Device, DeviceLimits, Fence, GpuError, GpuResult, MemPool, MemoryMap, Replayer, Shader,
    ShaderId,
};
use wgpu::util::DeviceExt;

use crate::error::{BackendError, BackendResult};
use crate::pipeline::{create_pipeline, cull_mode, fan_indices, PipelineKey, COLOR_FORMAT, STENCIL_FORMAT};
use crate::shaders::FILL_SHADER;

/// Bound size of the view record; WGSL rounds the struct up to 16 bytes
const VIEW_BINDING_SIZE: u64 = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Program {
    Vertex,
    Fragment { antialias: bool },
}

impl Program {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "fill_vsh" => Some(Program::Vertex),
            "fill_fsh" => Some(Program::Fragment { antialias: false }),
            "fill_aa_fsh" => Some(Program::Fragment { antialias: true }),
            _ => None,
        }
    }

    fn stage(self) -> ShaderStage {
        match self {
            Program::Vertex => ShaderStage::Vertex,
            Program::Fragment { .. } => ShaderStage::Fragment,
        }
    }
}

/// One draw with everything it reads snapshotted
struct PreparedDraw {
    key: PipelineKey,
    reference: u32,
    view_offset: u32,
    frag_offset: u32,
    textures: Arc<wgpu::BindGroup>,
    vertex_ranges: Vec<Range<u64>>,
    vertex_count: u32,
}

/// Per-submission uniform and vertex arenas
#[derive(Default)]
struct PreparedList {
    draws: Vec<PreparedDraw>,
    uniforms: Vec<u8>,
    vertices: Vec<u8>,
}

impl PreparedList {
    fn push_uniform(&mut self, bytes: &[u8], alignment: usize) -> u32 {
        let offset = self.uniforms.len().next_multiple_of(alignment);
        self.uniforms.resize(offset + alignment.max(bytes.len()), 0);
        self.uniforms[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset as u32
    }
}

/// Executes command lists with wgpu into an offscreen RGBA8 target
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    memory: MemoryMap,
    width: u32,
    height: u32,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    // owned for the lifetime of their views
    _stencil: wgpu::Texture,
    _empty: wgpu::Texture,
    stencil_view: wgpu::TextureView,
    shader: wgpu::ShaderModule,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
    images: FxHashMap<ImageView, (wgpu::Texture, wgpu::TextureView)>,
    samplers: FxHashMap<SamplerDesc, wgpu::Sampler>,
    texture_groups: FxHashMap<(ImageView, SamplerDesc), Arc<wgpu::BindGroup>>,
    empty_textures: Arc<wgpu::BindGroup>,
    replayer: Replayer,
    programs: Vec<Program>,
    next_fence: u64,
    in_flight: FxHashMap<u64, wgpu::SubmissionIndex>,
}

impl WgpuDevice {
    /// Request an adapter and device and render into a `width` x `height` target
    pub fn new(width: u32, height: u32, memory: MemoryMap) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(width, height, memory))
    }

    pub async fn new_async(width: u32, height: u32, memory: MemoryMap) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(BackendError::AdapterNotFound)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tilevg device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await?;

        tracing::info!(adapter = ?adapter.get_info().name, width, height, "created wgpu device");
        Ok(Self::from_device(device, queue, width, height, memory))
    }

    /// Wrap an existing device and queue
    pub fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        memory: MemoryMap,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilevg color target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let stencil = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilevg stencil"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: STENCIL_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let stencil_view = stencil.create_view(&wgpu::TextureViewDescriptor::default());

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tilevg fill shader"),
            source: wgpu::ShaderSource::Wgsl(FILL_SHADER.into()),
        });

        let uniform_entry = |binding, visibility, size| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: NonZeroU64::new(size),
            },
            count: None,
        };
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tilevg uniform layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX, VIEW_BINDING_SIZE),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT, FragUniforms::SIZE as u64),
            ],
        });
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tilevg texture layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("tilevg pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Draws without a texture still need group 1 bound
        let empty = device.create_texture_with_data(
            &queue,
            &wgpu::TextureDescriptor {
                label: Some("tilevg empty texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255; 4],
        );
        let empty_view = empty.create_view(&wgpu::TextureViewDescriptor::default());
        let empty_sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());
        let empty_textures = Arc::new(texture_group(&device, &texture_layout, &empty_view, &empty_sampler));

        Self {
            device,
            queue,
            memory,
            width: size.width,
            height: size.height,
            color,
            color_view,
            _stencil: stencil,
            _empty: empty,
            stencil_view,
            shader,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            pipelines: FxHashMap::default(),
            images: FxHashMap::default(),
            samplers: FxHashMap::default(),
            texture_groups: FxHashMap::default(),
            empty_textures,
            replayer: Replayer::new(),
            programs: Vec::new(),
            next_fence: 0,
            in_flight: FxHashMap::default(),
        }
    }

    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The color attachment every command list renders into
    pub fn color_texture(&self) -> &wgpu::Texture {
        &self.color
    }

    /// Number of distinct pipelines built so far
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Clear color to `color` and stencil to zero
    pub fn clear(&mut self, color: [f32; 4]) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilevg clear"),
        });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilevg clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color[0] as f64,
                            g: color[1] as f64,
                            b: color[2] as f64,
                            a: color[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.stencil_view,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read the color target back as tightly packed RGBA8 rows
    pub fn read_pixels(&self) -> BackendResult<Vec<u8>> {
        let row = self.width * 4;
        let padded = row.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tilevg readback"),
            size: (padded * self.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilevg readback copy"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| GpuError::device("readback callback dropped"))??;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row * self.height) as usize);
        for y in 0..self.height as usize {
            let start = y * padded as usize;
            pixels.extend_from_slice(&data[start..start + row as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
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

    fn execute(&mut self, list: &CmdList) -> GpuResult<wgpu::SubmissionIndex> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = self.prepare(list).map(|prepared| self.encode(&prepared));
        let scope = pollster::block_on(self.device.pop_error_scope());
        let index = result?;
        match scope {
            Some(err) => Err(GpuError::device(err.to_string())),
            None => Ok(index),
        }
    }

    fn prepare(&mut self, list: &CmdList) -> GpuResult<PreparedList> {
        let mut prepared = PreparedList::default();
        for command in list.commands() {
            match self.replayer.apply(&self.memory, command)? {
                Some(Action::Draw(call)) => self.prepare_draw(call, &mut prepared)?,
                Some(Action::Copy {
                    src,
                    src_row_pitch,
                    dst,
                    region,
                }) => {
                    copy_buffer_to_image(&self.memory, src, src_row_pitch, &dst, region)?;
                    // draws already prepared keep their bind groups and the old contents
                    self.images.remove(&dst);
                    self.texture_groups.retain(|(image, _), _| *image != dst);
                }
                None => {}
            }
        }
        Ok(prepared)
    }

    fn prepare_draw(&mut self, call: DrawCall, prepared: &mut PreparedList) -> GpuResult<()> {
        let state = self.replayer.state().clone();
        if call.vertex_count == 0 || cull_mode(state.rasterizer.cull).is_none() {
            return Ok(());
        }
        let Some((vertex, fragment)) = state.shaders else {
            return Err(GpuError::device("draw without bound shaders"));
        };
        let antialias = match (self.program(vertex)?, self.program(fragment)?) {
            (Program::Vertex, Program::Fragment { antialias }) => antialias,
            programs => return Err(GpuError::device(format!("cannot draw with {programs:?}"))),
        };
        let Some(layout) = state.vertex_layout.clone() else {
            return Err(GpuError::device("draw without a vertex layout"));
        };

        let view = self.uniforms(ShaderStage::Vertex, VIEW_UNIFORM_SIZE)?;
        let frag_bytes = self.uniforms(ShaderStage::Fragment, FragUniforms::SIZE)?;
        let frag: FragUniforms = bytemuck::pod_read_unaligned(&frag_bytes[..FragUniforms::SIZE]);
        let textures = match (frag.shader(), self.replayer.bound_texture()) {
            (ShaderType::FillImage | ShaderType::Image, Some(bound)) => self.texture_group(bound)?,
            _ => Arc::clone(&self.empty_textures),
        };

        let order: Vec<u32> = match call.primitive {
            Primitive::TriangleFan => fan_indices(call.first_vertex, call.vertex_count),
            Primitive::Triangles | Primitive::TriangleStrip => {
                (call.first_vertex..call.first_vertex + call.vertex_count).collect()
            }
        };
        if order.is_empty() {
            return Ok(());
        }

        let mut vertex_ranges = Vec::with_capacity(layout.strides.len());
        for (slot, &stride) in layout.strides.iter().enumerate() {
            let binding = state.vertex_buffers.get(slot).copied().flatten().ok_or_else(|| {
                GpuError::device(format!("vertex buffer {slot} not bound"))
            })?;
            let stride = stride as usize;
            let start = prepared.vertices.len() as u64;
            self.memory.with_bytes(binding.addr, binding.size, |bytes| {
                for &index in &order {
                    let at = index as usize * stride;
                    let vertex = bytes.get(at..at + stride).ok_or(GpuError::InvalidAddress {
                        addr: binding.addr.add(at),
                        len: stride,
                    })?;
                    prepared.vertices.extend_from_slice(vertex);
                }
                Ok::<_, GpuError>(())
            })??;
            vertex_ranges.push(start..prepared.vertices.len() as u64);
        }

        let key = PipelineKey::new(&state, layout, call.primitive, antialias);
        if !self.pipelines.contains_key(&key) {
            let pipeline = create_pipeline(&self.device, &self.pipeline_layout, &self.shader, &key);
            self.pipelines.insert(key.clone(), pipeline);
            tracing::debug!(pipelines = self.pipelines.len(), "created render pipeline");
        }

        let alignment = self.device.limits().min_uniform_buffer_offset_alignment as usize;
        let view_offset = prepared.push_uniform(&view[..VIEW_UNIFORM_SIZE], alignment);
        let frag_offset = prepared.push_uniform(&frag_bytes[..FragUniforms::SIZE], alignment);
        prepared.draws.push(PreparedDraw {
            key,
            reference: state.stencil_front.reference as u32,
            view_offset,
            frag_offset,
            textures,
            vertex_ranges,
            vertex_count: order.len() as u32,
        });
        Ok(())
    }

    fn texture_group(&mut self, bound: BoundTexture) -> GpuResult<Arc<wgpu::BindGroup>> {
        let key = (bound.image, bound.sampler);
        if let Some(group) = self.texture_groups.get(&key) {
            return Ok(Arc::clone(group));
        }
        if !self.images.contains_key(&bound.image) {
            let uploaded = self.upload(&bound.image)?;
            self.images.insert(bound.image, uploaded);
        }
        let device = &self.device;
        self.samplers
            .entry(bound.sampler)
            .or_insert_with(|| device.create_sampler(&sampler_descriptor(&bound.sampler)));

        let (Some((_, view)), Some(sampler)) = (self.images.get(&bound.image), self.samplers.get(&bound.sampler))
        else {
            return Err(GpuError::device("texture cache miss"));
        };
        let group = Arc::new(texture_group(&self.device, &self.texture_layout, view, sampler));
        self.texture_groups.insert(key, Arc::clone(&group));
        Ok(group)
    }

    fn upload(&self, image: &ImageView) -> GpuResult<(wgpu::Texture, wgpu::TextureView)> {
        let format = match image.format {
            TextureFormat::Alpha => wgpu::TextureFormat::R8Unorm,
            TextureFormat::Rgba => wgpu::TextureFormat::Rgba8Unorm,
        };
        let size = wgpu::Extent3d {
            width: image.width,
            height: image.height,
            depth_or_array_layers: 1,
        };
        let data = self.memory.read(image.addr, image.row_pitch * image.height as usize)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tilevg image"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.row_pitch as u32),
                rows_per_image: Some(image.height),
            },
            size,
        );
        tracing::trace!(width = image.width, height = image.height, "uploaded image");
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok((texture, view))
    }

    fn encode(&self, prepared: &PreparedList) -> wgpu::SubmissionIndex {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tilevg command list"),
        });

        if !prepared.draws.is_empty() {
            let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tilevg uniforms"),
                contents: &prepared.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("tilevg vertices"),
                contents: &prepared.vertices,
                usage: wgpu::BufferUsages::VERTEX,
            });
            let buffer = &uniform_buffer;
            let uniform_entry = move |binding, size| wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: NonZeroU64::new(size),
                }),
            };
            let uniforms = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("tilevg uniform group"),
                layout: &self.uniform_layout,
                entries: &[
                    uniform_entry(0, VIEW_BINDING_SIZE),
                    uniform_entry(1, FragUniforms::SIZE as u64),
                ],
            });

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tilevg render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.stencil_view,
                    depth_ops: None,
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &prepared.draws {
                let Some(pipeline) = self.pipelines.get(&draw.key) else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_stencil_reference(draw.reference);
                pass.set_bind_group(0, &uniforms, &[draw.view_offset, draw.frag_offset]);
                pass.set_bind_group(1, &*draw.textures, &[]);
                for (slot, range) in draw.vertex_ranges.iter().enumerate() {
                    pass.set_vertex_buffer(slot as u32, vertex_buffer.slice(range.clone()));
                }
                pass.draw(0..draw.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()))
    }
}

fn texture_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("tilevg texture group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn sampler_descriptor(desc: &SamplerDesc) -> wgpu::SamplerDescriptor<'static> {
    let filter = |filter| match filter {
        Filter::Nearest => wgpu::FilterMode::Nearest,
        Filter::Linear => wgpu::FilterMode::Linear,
    };
    let address = |wrap| match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    };
    wgpu::SamplerDescriptor {
        label: Some("tilevg sampler"),
        address_mode_u: address(desc.wrap_u),
        address_mode_v: address(desc.wrap_v),
        mag_filter: filter(desc.mag_filter),
        min_filter: filter(desc.min_filter),
        mipmap_filter: match desc.mip_filter {
            MipFilter::Linear => wgpu::FilterMode::Linear,
            MipFilter::None | MipFilter::Nearest => wgpu::FilterMode::Nearest,
        },
        ..Default::default()
    }
}

impl Device for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        let limits = self.device.limits();
        DeviceLimits {
            uniform_buffer_alignment: limits.min_uniform_buffer_offset_alignment as usize,
            max_image_dimension: limits.max_texture_dimension_2d,
            ..DeviceLimits::default()
        }
    }

    fn load_shader(&mut self, code: &MemPool, name: &str) -> GpuResult<Shader> {
        let program = Program::from_name(name).ok_or_else(|| GpuError::ShaderNotFound(name.to_string()))?;
        let memory = code.allocate(name.len(), self.limits().cmd_mem_alignment)?;
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
        let index = self.execute(&list)?;
        self.next_fence += 1;
        self.in_flight.insert(self.next_fence, index);
        Ok(Fence(self.next_fence))
    }

    fn wait(&mut self, fence: Fence) -> GpuResult<()> {
        let Some(index) = self.in_flight.get(&fence.0).cloned() else {
            return Ok(());
        };
        self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        self.in_flight.retain(|&pending, _| pending > fence.0);
        Ok(())
    }

    fn wait_idle(&mut self) -> GpuResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        self.in_flight.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_names() {
        assert_eq!(Program::from_name("fill_vsh"), Some(Program::Vertex));
        assert_eq!(
            Program::from_name("fill_aa_fsh").map(Program::stage),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(Program::from_name("blit_fsh"), None);
    }

    #[test]
    fn test_uniform_records_aligned() {
        let mut prepared = PreparedList::default();
        assert_eq!(prepared.push_uniform(&[1; 8], 256), 0);
        assert_eq!(prepared.push_uniform(&[2; 176], 256), 256);
        assert_eq!(prepared.uniforms.len(), 512);
        assert_eq!(prepared.uniforms[256], 2);
        assert_eq!(prepared.uniforms[8], 0);
    }

    #[test]
    fn test_sampler_mapping() {
        let desc = SamplerDesc {
            min_filter: Filter::Nearest,
            wrap_u: WrapMode::Repeat,
            ..Default::default()
        };
        let sampler = sampler_descriptor(&desc);
        assert_eq!(sampler.min_filter, wgpu::FilterMode::Nearest);
        assert_eq!(sampler.mag_filter, wgpu::FilterMode::Linear);
        assert_eq!(sampler.address_mode_u, wgpu::AddressMode::Repeat);
        assert_eq!(sampler.address_mode_v, wgpu::AddressMode::ClampToEdge);
    }
}
