//! Per-frame draw data
//!
//! The front end tessellates paths into vertices and packs them into
//! [`FrameBuffers`] through [`FrameBuffers::fill`], [`FrameBuffers::stroke`]
//! and [`FrameBuffers::triangles`]. The renderer consumes the buffers on
//! flush and clears them afterwards.

use crate::flags::CreateFlags;
use crate::paint::{BlendFunc, CompositeOperation, Paint, Scissor};
use crate::uniforms::{uniform_stride, FragUniforms, ShaderType};
use crate::TextureId;

/// Vertex as consumed by the fill vertex shader
///
/// Memory layout:
/// - position: `vec2<f32>` (8 bytes)
/// - tcoord:   `vec2<f32>` (8 bytes)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, u, v }
    }
}

/// Contiguous range of elements in one of the frame arrays
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub offset: u32,
    pub count: u32,
}

impl Span {
    pub const EMPTY: Span = Span {
        offset: 0,
        count: 0,
    };

    pub const fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn start(&self) -> usize {
        self.offset as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.count as usize
    }

    /// Whether the span lies within `0..len`
    pub fn fits(&self, len: usize) -> bool {
        (self.offset as u64 + self.count as u64) <= len as u64
    }
}

/// Vertex ranges of one tessellated path
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Path {
    /// Interior, drawn as a triangle fan
    pub fill: Span,
    /// Antialiasing fringe or stroke outline, drawn as a triangle strip
    pub stroke: Span,
}

/// What a call draws and which ranges it uses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    /// Arbitrary (possibly concave or self intersecting) fill using the
    /// stencil buffer; `cover` is the 4-vertex bounding quad strip
    Fill { paths: Span, cover: Span },
    /// Single convex path drawn directly
    ConvexFill { paths: Span },
    Stroke { paths: Span },
    /// Plain triangle list
    Triangles { triangles: Span },
}

/// One draw call of a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Call {
    pub kind: CallKind,
    pub image: Option<TextureId>,
    /// Byte offset of the first uniform record
    pub uniform_offset: u32,
    pub blend: BlendFunc,
}

/// Geometry of one path handed to [`FrameBuffers::fill`] or
/// [`FrameBuffers::stroke`]
#[derive(Clone, Copy, Debug, Default)]
pub struct PathGeometry<'a> {
    pub fill: &'a [Vertex],
    pub stroke: &'a [Vertex],
    pub convex: bool,
}

/// Calls, paths, vertices and uniform records of the frame being built
#[derive(Clone, Debug, Default)]
pub struct FrameBuffers {
    pub calls: Vec<Call>,
    pub paths: Vec<Path>,
    pub verts: Vec<Vertex>,
    pub uniforms: Vec<u8>,
    stride: usize,
    flags: CreateFlags,
}

impl FrameBuffers {
    /// `stride` is the value returned by the renderer's `create`
    pub fn new(stride: usize, flags: CreateFlags) -> Self {
        Self {
            stride: stride.max(uniform_stride(0)),
            flags,
            ..Self::default()
        }
    }

    pub fn uniform_stride(&self) -> usize {
        self.stride
    }

    pub fn flags(&self) -> CreateFlags {
        self.flags
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Reset all counts, keeping allocations
    pub fn clear(&mut self) {
        self.calls.clear();
        self.paths.clear();
        self.verts.clear();
        self.uniforms.clear();
    }

    /// Uniform record starting at `offset`
    pub fn uniform_bytes(&self, offset: usize) -> Option<&[u8]> {
        self.uniforms.get(offset..offset.checked_add(FragUniforms::SIZE)?)
    }

    /// Decoded uniform record starting at `offset`
    pub fn uniform(&self, offset: usize) -> Option<FragUniforms> {
        self.uniform_bytes(offset).map(bytemuck::pod_read_unaligned)
    }

    /// Append records at the configured stride, returning the first offset
    pub fn push_uniforms(&mut self, records: &[FragUniforms]) -> u32 {
        let offset = self.uniforms.len();
        for record in records {
            let start = self.uniforms.len();
            self.uniforms.extend_from_slice(bytemuck::bytes_of(record));
            self.uniforms.resize(start + self.stride, 0);
        }
        offset as u32
    }

    fn push_verts(&mut self, verts: &[Vertex]) -> Span {
        let span = Span::new(self.verts.len() as u32, verts.len() as u32);
        self.verts.extend_from_slice(verts);
        span
    }

    /// Queue a fill of one or more paths
    ///
    /// `bounds` is `[minx, miny, maxx, maxy]` of all paths.
    pub fn fill(
        &mut self,
        paint: &Paint,
        op: CompositeOperation,
        scissor: &Scissor,
        fringe: f32,
        bounds: [f32; 4],
        paths: &[PathGeometry<'_>],
    ) {
        let path_span = Span::new(self.paths.len() as u32, paths.len() as u32);
        for path in paths {
            let fill = self.push_verts(path.fill);
            let stroke = self.push_verts(path.stroke);
            self.paths.push(Path { fill, stroke });
        }

        if paths.len() == 1 && paths[0].convex {
            let uniform_offset = self.push_uniforms(&[FragUniforms::from_paint(
                paint, scissor, fringe, fringe, -1.0,
            )]);
            self.calls.push(Call {
                kind: CallKind::ConvexFill { paths: path_span },
                image: paint.image.map(|image| image.id),
                uniform_offset,
                blend: op.blend_func(),
            });
            return;
        }

        let [minx, miny, maxx, maxy] = bounds;
        let cover = self.push_verts(&[
            Vertex::new(maxx, maxy, 0.5, 1.0),
            Vertex::new(maxx, miny, 0.5, 1.0),
            Vertex::new(minx, maxy, 0.5, 1.0),
            Vertex::new(minx, miny, 0.5, 1.0),
        ]);

        let uniform_offset = self.push_uniforms(&[
            FragUniforms::simple(),
            FragUniforms::from_paint(paint, scissor, fringe, fringe, -1.0),
        ]);
        self.calls.push(Call {
            kind: CallKind::Fill {
                paths: path_span,
                cover,
            },
            image: paint.image.map(|image| image.id),
            uniform_offset,
            blend: op.blend_func(),
        });
    }

    /// Queue a stroke of one or more paths (only their stroke ranges are used)
    pub fn stroke(
        &mut self,
        paint: &Paint,
        op: CompositeOperation,
        scissor: &Scissor,
        fringe: f32,
        stroke_width: f32,
        paths: &[PathGeometry<'_>],
    ) {
        let path_span = Span::new(self.paths.len() as u32, paths.len() as u32);
        for path in paths {
            let stroke = self.push_verts(path.stroke);
            self.paths.push(Path {
                fill: Span::EMPTY,
                stroke,
            });
        }

        let uniform_offset = if self.flags.contains(CreateFlags::STENCIL_STROKES) {
            self.push_uniforms(&[
                FragUniforms::from_paint(paint, scissor, stroke_width, fringe, -1.0),
                FragUniforms::from_paint(paint, scissor, stroke_width, fringe, 1.0 - 0.5 / 255.0),
            ])
        } else {
            self.push_uniforms(&[FragUniforms::from_paint(
                paint,
                scissor,
                stroke_width,
                fringe,
                -1.0,
            )])
        };

        self.calls.push(Call {
            kind: CallKind::Stroke { paths: path_span },
            image: paint.image.map(|image| image.id),
            uniform_offset,
            blend: op.blend_func(),
        });
    }

    /// Queue a textured triangle list
    pub fn triangles(
        &mut self,
        paint: &Paint,
        op: CompositeOperation,
        scissor: &Scissor,
        fringe: f32,
        verts: &[Vertex],
    ) {
        let triangles = self.push_verts(verts);
        let mut frag = FragUniforms::from_paint(paint, scissor, 1.0, fringe, -1.0);
        frag.shader_type = ShaderType::Image as i32;
        let uniform_offset = self.push_uniforms(&[frag]);

        self.calls.push(Call {
            kind: CallKind::Triangles { triangles },
            image: paint.image.map(|image| image.id),
            uniform_offset,
            blend: op.blend_func(),
        });
    }

    /// Check that every range referenced by `call` lies inside the buffers
    pub fn validate(&self, call: &Call) -> Result<(), String> {
        let records = match call.kind {
            CallKind::Fill { .. } => 2,
            CallKind::Stroke { .. } if self.flags.contains(CreateFlags::STENCIL_STROKES) => 2,
            _ => 1,
        };
        let uniform_end = call.uniform_offset as usize + (records - 1) * self.stride + FragUniforms::SIZE;
        if uniform_end > self.uniforms.len() {
            return Err(format!(
                "uniform records end at byte {uniform_end}, buffer holds {}",
                self.uniforms.len()
            ));
        }

        let (paths, triangles) = match call.kind {
            CallKind::Fill { paths, cover } => (paths, Some(cover)),
            CallKind::ConvexFill { paths } | CallKind::Stroke { paths } => (paths, None),
            CallKind::Triangles { triangles } => (Span::EMPTY, Some(triangles)),
        };
        if let Some(tris) = triangles {
            if !tris.fits(self.verts.len()) {
                return Err(format!("triangle range {tris:?} exceeds {} vertices", self.verts.len()));
            }
        }
        let Some(paths) = self.paths.get(paths.start()..paths.end()) else {
            return Err(format!("path range {paths:?} exceeds {} paths", self.paths.len()));
        };
        for path in paths {
            for span in [path.fill, path.stroke] {
                if !span.fits(self.verts.len()) {
                    return Err(format!("vertex range {span:?} exceeds {} vertices", self.verts.len()));
                }
            }
        }
        Ok(())
    }
}
