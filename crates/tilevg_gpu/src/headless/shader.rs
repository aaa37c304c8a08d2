//! CPU implementations of the fill programs

use tilevg_core::{FragUniforms, ShaderType, TexType, TextureFormat};

use crate::cmd::{Filter, ImageView, SamplerDesc, ShaderStage, WrapMode};
use crate::error::GpuResult;
use crate::mem::MemoryMap;
use crate::replay::BoundTexture;

/// Programs the headless device can run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    FillVertex,
    FillFragment { antialias: bool },
}

impl Program {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "fill_vsh" => Some(Program::FillVertex),
            "fill_fsh" => Some(Program::FillFragment { antialias: false }),
            "fill_aa_fsh" => Some(Program::FillFragment { antialias: true }),
            _ => None,
        }
    }

    pub fn stage(self) -> ShaderStage {
        match self {
            Program::FillVertex => ShaderStage::Vertex,
            Program::FillFragment { .. } => ShaderStage::Fragment,
        }
    }
}

/// Interpolated fragment inputs
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Varyings {
    pub pos: [f32; 2],
    pub tcoord: [f32; 2],
}

impl Varyings {
    pub fn interpolate(v: [&Varyings; 3], w: [f32; 3]) -> Self {
        let mix = |f: fn(&Varyings) -> [f32; 2]| {
            let (a, b, c) = (f(v[0]), f(v[1]), f(v[2]));
            [
                a[0] * w[0] + b[0] * w[1] + c[0] * w[2],
                a[1] * w[0] + b[1] * w[1] + c[1] * w[2],
            ]
        };
        Self {
            pos: mix(|v| v.pos),
            tcoord: mix(|v| v.tcoord),
        }
    }
}

/// Vertex stage: view-space position to normalized device coordinates
pub fn fill_vertex(view: [f32; 2], pos: [f32; 2]) -> [f32; 2] {
    [2.0 * pos[0] / view[0] - 1.0, 1.0 - 2.0 * pos[1] / view[1]]
}

/// Texture contents fetched for one draw
pub struct TextureSampler {
    texels: Vec<u8>,
    image: ImageView,
    desc: SamplerDesc,
}

impl TextureSampler {
    pub fn load(memory: &MemoryMap, bound: BoundTexture) -> GpuResult<Self> {
        let len = bound.image.row_pitch * bound.image.height as usize;
        Ok(Self {
            texels: memory.read(bound.image.addr, len)?,
            image: bound.image,
            desc: bound.sampler,
        })
    }

    fn wrap(coord: i64, size: u32, mode: WrapMode) -> usize {
        let size = size as i64;
        match mode {
            WrapMode::Repeat => coord.rem_euclid(size) as usize,
            WrapMode::ClampToEdge => coord.clamp(0, size - 1) as usize,
        }
    }

    fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let x = Self::wrap(x, self.image.width, self.desc.wrap_u);
        let y = Self::wrap(y, self.image.height, self.desc.wrap_v);
        let bpp = self.image.format.bytes_per_pixel();
        let at = y * self.image.row_pitch + x * bpp;
        let norm = |b: u8| b as f32 / 255.0;
        match self.image.format {
            TextureFormat::Alpha => [norm(self.texels[at]), 0.0, 0.0, 1.0],
            TextureFormat::Rgba => {
                let px = &self.texels[at..at + 4];
                [norm(px[0]), norm(px[1]), norm(px[2]), norm(px[3])]
            }
        }
    }

    /// Sample at normalized coordinates
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        let u = uv[0] * self.image.width as f32;
        let v = uv[1] * self.image.height as f32;
        if self.desc.mag_filter == Filter::Nearest {
            return self.texel(u.floor() as i64, v.floor() as i64);
        }

        let (tx, ty) = (u - 0.5, v - 0.5);
        let (x0, y0) = (tx.floor(), ty.floor());
        let (fx, fy) = (tx - x0, ty - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let t00 = self.texel(x0, y0);
        let t10 = self.texel(x0 + 1, y0);
        let t01 = self.texel(x0, y0 + 1);
        let t11 = self.texel(x0 + 1, y0 + 1);
        std::array::from_fn(|i| {
            let top = t00[i] + (t10[i] - t00[i]) * fx;
            let bottom = t01[i] + (t11[i] - t01[i]) * fx;
            top + (bottom - top) * fy
        })
    }
}

fn transform(m: &[f32; 12], p: [f32; 2]) -> [f32; 2] {
    [
        m[0] * p[0] + m[4] * p[1] + m[8],
        m[1] * p[0] + m[5] * p[1] + m[9],
    ]
}

fn scissor_mask(frag: &FragUniforms, p: [f32; 2]) -> f32 {
    let q = transform(&frag.scissor_mat, p);
    let sx = 0.5 - (q[0].abs() - frag.scissor_ext[0]) * frag.scissor_scale[0];
    let sy = 0.5 - (q[1].abs() - frag.scissor_ext[1]) * frag.scissor_scale[1];
    sx.clamp(0.0, 1.0) * sy.clamp(0.0, 1.0)
}

fn stroke_mask(frag: &FragUniforms, tcoord: [f32; 2]) -> f32 {
    ((1.0 - (tcoord[0] * 2.0 - 1.0).abs()) * frag.stroke_mult).min(1.0) * tcoord[1].min(1.0)
}

fn sd_round_rect(pt: [f32; 2], ext: [f32; 2], rad: f32) -> f32 {
    let dx = pt[0].abs() - (ext[0] - rad);
    let dy = pt[1].abs() - (ext[1] - rad);
    let outside = (dx.max(0.0).powi(2) + dy.max(0.0).powi(2)).sqrt();
    dx.max(dy).min(0.0) + outside - rad
}

fn scale(c: [f32; 4], s: f32) -> [f32; 4] {
    c.map(|v| v * s)
}

fn modulate(a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    std::array::from_fn(|i| a[i] * b[i])
}

fn apply_tex_type(color: [f32; 4], tex_type: TexType) -> [f32; 4] {
    match tex_type {
        TexType::PremultipliedRgba => color,
        TexType::Rgba => [color[0] * color[3], color[1] * color[3], color[2] * color[3], color[3]],
        TexType::Alpha => [color[0]; 4],
    }
}

/// Fragment stage; `None` discards the fragment
pub fn fill_fragment(
    frag: &FragUniforms,
    texture: Option<&TextureSampler>,
    antialias: bool,
    input: Varyings,
) -> Option<[f32; 4]> {
    let stroke_alpha = if antialias {
        let alpha = stroke_mask(frag, input.tcoord);
        if alpha < frag.stroke_thr {
            return None;
        }
        alpha
    } else {
        1.0
    };
    let sample = |uv| texture.map_or([0.0; 4], |t| t.sample(uv));

    let scissor = scissor_mask(frag, input.pos);
    let color = match frag.shader() {
        ShaderType::FillGradient => {
            let pt = transform(&frag.paint_mat, input.pos);
            let d = ((sd_round_rect(pt, frag.extent, frag.radius) + frag.feather * 0.5) / frag.feather)
                .clamp(0.0, 1.0);
            let mixed = std::array::from_fn(|i| frag.inner_col[i] * (1.0 - d) + frag.outer_col[i] * d);
            scale(mixed, stroke_alpha * scissor)
        }
        ShaderType::FillImage => {
            let pt = transform(&frag.paint_mat, input.pos);
            let uv = [pt[0] / frag.extent[0], pt[1] / frag.extent[1]];
            let texel = apply_tex_type(sample(uv), frag.texture_type());
            scale(modulate(texel, frag.inner_col), stroke_alpha * scissor)
        }
        ShaderType::Simple => [1.0; 4],
        ShaderType::Image => {
            let texel = apply_tex_type(sample(input.tcoord), frag.texture_type());
            modulate(scale(texel, scissor), frag.inner_col)
        }
    };
    Some(color)
}
