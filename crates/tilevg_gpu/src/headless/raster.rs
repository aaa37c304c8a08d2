//! Triangle rasterization, stencil testing and blending

use tilevg_core::BlendFactor;

use crate::cmd::{Face, FrontFace, Primitive};
use crate::replay::PipelineState;

use super::shader::Varyings;

/// Color and stencil attachments
#[derive(Clone, Debug)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    /// Premultiplied RGBA
    color: Vec<[f32; 4]>,
    stencil: Vec<u8>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![[0.0; 4]; len],
            stencil: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn clear(&mut self, color: [f32; 4]) {
        self.color.fill(color);
        self.stencil.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        self.color[self.index(x, y)]
    }

    pub fn pixel_rgba8(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixel(x, y)
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    pub fn stencil(&self, x: u32, y: u32) -> u8 {
        self.stencil[self.index(x, y)]
    }

    pub fn stencil_is_clear(&self) -> bool {
        self.stencil.iter().all(|&s| s == 0)
    }

    pub fn to_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.height, |x, y| image::Rgba(self.pixel_rgba8(x, y)))
    }
}

/// Split a primitive of `count` vertices into triangles
///
/// Odd strip triangles swap their last two vertices so every triangle keeps
/// the strip's winding.
pub fn assemble(primitive: Primitive, count: usize) -> Vec<[usize; 3]> {
    match primitive {
        Primitive::Triangles => (0..count / 3).map(|i| [i * 3, i * 3 + 1, i * 3 + 2]).collect(),
        Primitive::TriangleStrip if count >= 3 => (0..count - 2)
            .map(|i| if i % 2 == 0 { [i, i + 1, i + 2] } else { [i + 1, i, i + 2] })
            .collect(),
        Primitive::TriangleFan if count >= 3 => (1..count - 1).map(|i| [0, i, i + 1]).collect(),
        _ => Vec::new(),
    }
}

/// A vertex after the vertex stage
#[derive(Clone, Copy, Debug)]
pub struct ClipVertex {
    pub ndc: [f32; 2],
    pub varyings: Varyings,
}

fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Top and left edges own the pixels centered exactly on them
fn is_top_left(a: [f32; 2], b: [f32; 2]) -> bool {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

fn is_front_facing(tri: &[ClipVertex; 3], front_face: FrontFace) -> bool {
    let area = edge(tri[0].ndc, tri[1].ndc, tri[2].ndc);
    match front_face {
        FrontFace::Ccw => area > 0.0,
        FrontFace::Cw => area < 0.0,
    }
}

fn culled(front: bool, cull: Face) -> bool {
    match cull {
        Face::None => false,
        Face::Front => front,
        Face::Back => !front,
        Face::FrontAndBack => true,
    }
}

fn blend_factor(factor: BlendFactor, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    match factor {
        BlendFactor::Zero => [0.0; 4],
        BlendFactor::One => [1.0; 4],
        BlendFactor::SrcColor => src,
        BlendFactor::OneMinusSrcColor => src.map(|c| 1.0 - c),
        BlendFactor::DstColor => dst,
        BlendFactor::OneMinusDstColor => dst.map(|c| 1.0 - c),
        BlendFactor::SrcAlpha => [src[3]; 4],
        BlendFactor::OneMinusSrcAlpha => [1.0 - src[3]; 4],
        BlendFactor::DstAlpha => [dst[3]; 4],
        BlendFactor::OneMinusDstAlpha => [1.0 - dst[3]; 4],
        BlendFactor::SrcAlphaSaturate => {
            let f = src[3].min(1.0 - dst[3]);
            [f, f, f, 1.0]
        }
    }
}

fn blend(state: &PipelineState, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    if !state.color.blend_enable {
        return src;
    }
    let b = &state.blend;
    let sc = blend_factor(b.src_color, src, dst);
    let dc = blend_factor(b.dst_color, src, dst);
    let sa = blend_factor(b.src_alpha, src, dst);
    let da = blend_factor(b.dst_alpha, src, dst);
    let mut out = [0.0; 4];
    for i in 0..3 {
        out[i] = (src[i] * sc[i] + dst[i] * dc[i]).clamp(0.0, 1.0);
    }
    out[3] = (src[3] * sa[3] + dst[3] * da[3]).clamp(0.0, 1.0);
    out
}

/// Per-pixel stencil test and color write for one shaded fragment
fn write_fragment(target: &mut RenderTarget, state: &PipelineState, front: bool, x: u32, y: u32, src: [f32; 4]) {
    let index = target.index(x, y);
    let ds = &state.depth_stencil;
    if ds.stencil_test {
        let (face, masks) = if front {
            (ds.front, state.stencil_front)
        } else {
            (ds.back, state.stencil_back)
        };
        let stored = target.stencil[index];
        let passed = face
            .compare
            .test(masks.reference & masks.compare_mask, stored & masks.compare_mask);
        let op = if passed { face.pass } else { face.fail };
        let updated = op.apply(stored, masks.reference);
        target.stencil[index] = (stored & !masks.write_mask) | (updated & masks.write_mask);
        if !passed {
            return;
        }
    }

    let dst = target.color[index];
    let blended = blend(state, src, dst);
    let out = &mut target.color[index];
    for (channel, value) in out.iter_mut().enumerate() {
        if state.color_write.writes(channel) {
            *value = blended[channel];
        }
    }
}

/// Rasterize one triangle, sampling at pixel centers
///
/// `shade` runs the fragment program and returns `None` for discarded
/// fragments, which leave both color and stencil untouched.
pub fn draw_triangle(
    target: &mut RenderTarget,
    state: &PipelineState,
    tri: [ClipVertex; 3],
    shade: &mut impl FnMut(Varyings) -> Option<[f32; 4]>,
) {
    let front = is_front_facing(&tri, state.rasterizer.front_face);
    if culled(front, state.rasterizer.cull) {
        return;
    }

    let (w, h) = (target.width as f32, target.height as f32);
    let to_screen = |v: &ClipVertex| [(v.ndc[0] + 1.0) * 0.5 * w, (1.0 - v.ndc[1]) * 0.5 * h];
    let mut p = [to_screen(&tri[0]), to_screen(&tri[1]), to_screen(&tri[2])];
    let mut vary = [&tri[0].varyings, &tri[1].varyings, &tri[2].varyings];

    let mut area = edge(p[0], p[1], p[2]);
    if area == 0.0 {
        return;
    }
    if area < 0.0 {
        p.swap(1, 2);
        vary.swap(1, 2);
        area = -area;
    }

    let min_x = p.iter().map(|v| v[0]).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let min_y = p.iter().map(|v| v[1]).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let max_x = (p.iter().map(|v| v[0]).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(target.width);
    let max_y = (p.iter().map(|v| v[1]).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(target.height);

    let edges = [(p[1], p[2]), (p[2], p[0]), (p[0], p[1])];
    let owns = edges.map(|(a, b)| is_top_left(a, b));

    for y in min_y..max_y {
        for x in min_x..max_x {
            let center = [x as f32 + 0.5, y as f32 + 0.5];
            let weights = edges.map(|(a, b)| edge(a, b, center));
            let inside = weights
                .iter()
                .zip(owns)
                .all(|(&wt, own)| wt > 0.0 || (wt == 0.0 && own));
            if !inside {
                continue;
            }
            let bary = weights.map(|wt| wt / area);
            if let Some(color) = shade(Varyings::interpolate(vary, bary)) {
                write_fragment(target, state, front, x, y, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::{CompareOp, DepthStencilState, RasterizerState, StencilFace, StencilOp};

    fn vertex(x: f32, y: f32, size: f32) -> ClipVertex {
        ClipVertex {
            ndc: [2.0 * x / size - 1.0, 1.0 - 2.0 * y / size],
            varyings: Varyings {
                pos: [x, y],
                tcoord: [0.5, 1.0],
            },
        }
    }

    fn counting_state() -> PipelineState {
        let incr = StencilFace::on_pass(StencilOp::IncrWrap, CompareOp::Always);
        PipelineState {
            rasterizer: RasterizerState::default().with_cull(Face::None),
            depth_stencil: DepthStencilState::stencil(incr, incr),
            ..PipelineState::default()
        }
    }

    #[test]
    fn test_assemble() {
        assert_eq!(assemble(Primitive::Triangles, 7), vec![[0, 1, 2], [3, 4, 5]]);
        assert_eq!(assemble(Primitive::TriangleStrip, 4), vec![[0, 1, 2], [2, 1, 3]]);
        assert_eq!(assemble(Primitive::TriangleFan, 5), vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
        assert!(assemble(Primitive::TriangleFan, 2).is_empty());
    }

    #[test]
    fn test_shared_edge_covered_once() {
        let mut target = RenderTarget::new(8, 8);
        let state = counting_state();
        let quad = [
            vertex(1.0, 1.0, 8.0),
            vertex(1.0, 7.0, 8.0),
            vertex(7.0, 7.0, 8.0),
            vertex(7.0, 1.0, 8.0),
        ];
        for tri in assemble(Primitive::TriangleFan, 4) {
            let tri = tri.map(|i| quad[i]);
            draw_triangle(&mut target, &state, tri, &mut |_| Some([1.0; 4]));
        }
        for y in 0..8 {
            for x in 0..8 {
                let inside = (1..7).contains(&x) && (1..7).contains(&y);
                assert_eq!(target.stencil(x, y), inside as u8, "pixel {x},{y}");
            }
        }
    }

    #[test]
    fn test_back_faces_culled_by_default() {
        let mut target = RenderTarget::new(4, 4);
        let state = PipelineState::default();
        // counter-clockwise on screen
        let front = [vertex(0.0, 0.0, 4.0), vertex(0.0, 4.0, 4.0), vertex(4.0, 0.0, 4.0)];
        let back = [front[0], front[2], front[1]];

        draw_triangle(&mut target, &state, back, &mut |_| Some([1.0; 4]));
        assert_eq!(target.pixel(0, 0), [0.0; 4]);
        draw_triangle(&mut target, &state, front, &mut |_| Some([1.0; 4]));
        assert_eq!(target.pixel(0, 0), [1.0; 4]);
    }

    #[test]
    fn test_discard_leaves_stencil() {
        let mut target = RenderTarget::new(4, 4);
        let state = counting_state();
        let tri = [vertex(0.0, 0.0, 4.0), vertex(0.0, 4.0, 4.0), vertex(4.0, 0.0, 4.0)];
        draw_triangle(&mut target, &state, tri, &mut |_| None);
        assert!(target.stencil_is_clear());
    }

    #[test]
    fn test_source_over_blend() {
        let mut state = PipelineState::default();
        state.color.blend_enable = true;
        state.blend = tilevg_core::CompositeOperation::SourceOver.blend_func().into();
        let out = blend(&state, [0.5, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out, [0.5, 0.0, 0.5, 1.0]);
    }
}
