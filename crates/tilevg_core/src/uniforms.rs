//! Fragment uniform record
//!
//! One record per shading pass. A call owns one or two consecutive records in
//! [`crate::FrameBuffers::uniforms`]; the second one lives at
//! `uniform_offset + stride`.
//!
//! Memory layout (11 x `vec4<f32>`, 176 bytes):
//! - scissor_mat:   3 x `vec4`  inverse scissor transform, column major
//! - paint_mat:     3 x `vec4`  inverse paint transform, column major
//! - inner_col:     `vec4`      premultiplied
//! - outer_col:     `vec4`      premultiplied
//! - scissor_ext, scissor_scale
//! - extent, radius, feather
//! - stroke_mult, stroke_thr, tex_type, shader_type

use crate::flags::{ImageFlags, TextureFormat};
use crate::paint::{Paint, Scissor, Transform};

/// Shading mode selected by the fragment program
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShaderType {
    /// Box gradient between inner and outer color
    #[default]
    FillGradient = 0,
    /// Image pattern addressed through the paint transform
    FillImage = 1,
    /// Constant output, used while writing the stencil
    Simple = 2,
    /// Textured triangles addressed through vertex texture coordinates
    Image = 3,
}

/// How sampled texels are turned into premultiplied color
#[repr(i32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TexType {
    #[default]
    PremultipliedRgba = 0,
    Rgba = 1,
    Alpha = 2,
}

impl TexType {
    pub fn for_image(format: TextureFormat, flags: ImageFlags) -> Self {
        match format {
            TextureFormat::Rgba if flags.contains(ImageFlags::PREMULTIPLIED) => {
                TexType::PremultipliedRgba
            }
            TextureFormat::Rgba => TexType::Rgba,
            TextureFormat::Alpha => TexType::Alpha,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FragUniforms {
    pub scissor_mat: [f32; 12],
    pub paint_mat: [f32; 12],
    pub inner_col: [f32; 4],
    pub outer_col: [f32; 4],
    pub scissor_ext: [f32; 2],
    pub scissor_scale: [f32; 2],
    pub extent: [f32; 2],
    pub radius: f32,
    pub feather: f32,
    pub stroke_mult: f32,
    pub stroke_thr: f32,
    pub tex_type: i32,
    pub shader_type: i32,
}

impl FragUniforms {
    pub const SIZE: usize = std::mem::size_of::<FragUniforms>();

    /// Record used by the stencil-writing pass of a fill
    pub fn simple() -> Self {
        Self {
            stroke_thr: -1.0,
            shader_type: ShaderType::Simple as i32,
            ..Self::default()
        }
    }

    /// Convert a paint into a uniform record
    ///
    /// `width` is the stroke width (use `fringe` for fills), `stroke_thr` is
    /// the discard threshold of the antialiased program (`-1.0` disables it).
    pub fn from_paint(
        paint: &Paint,
        scissor: &Scissor,
        width: f32,
        fringe: f32,
        stroke_thr: f32,
    ) -> Self {
        let mut frag = Self {
            inner_col: paint.inner_color.premultiplied(),
            outer_col: paint.outer_color.premultiplied(),
            extent: paint.extent,
            stroke_mult: (width * 0.5 + fringe * 0.5) / fringe,
            stroke_thr,
            ..Self::default()
        };

        if scissor.is_disabled() {
            frag.scissor_ext = [1.0, 1.0];
            frag.scissor_scale = [1.0, 1.0];
        } else {
            let x = scissor.xform.0;
            frag.scissor_mat = scissor.xform.inverse().to_mat3x4();
            frag.scissor_ext = scissor.extent;
            frag.scissor_scale = [
                (x[0] * x[0] + x[2] * x[2]).sqrt() / fringe,
                (x[1] * x[1] + x[3] * x[3]).sqrt() / fringe,
            ];
        }

        let inverse = match paint.image {
            Some(image) => {
                frag.shader_type = ShaderType::FillImage as i32;
                frag.tex_type = TexType::for_image(image.format, image.flags) as i32;
                if image.flags.contains(ImageFlags::FLIP_Y) {
                    let half = frag.extent[1] * 0.5;
                    Transform::translate(0.0, -half)
                        .then(Transform::scale(1.0, -1.0))
                        .then(Transform::translate(0.0, half))
                        .then(paint.xform)
                        .inverse()
                } else {
                    paint.xform.inverse()
                }
            }
            None => {
                frag.shader_type = ShaderType::FillGradient as i32;
                frag.radius = paint.radius;
                frag.feather = paint.feather;
                paint.xform.inverse()
            }
        };
        frag.paint_mat = inverse.to_mat3x4();
        frag
    }

    pub fn shader(&self) -> ShaderType {
        match self.shader_type {
            1 => ShaderType::FillImage,
            2 => ShaderType::Simple,
            3 => ShaderType::Image,
            _ => ShaderType::FillGradient,
        }
    }

    pub fn texture_type(&self) -> TexType {
        match self.tex_type {
            1 => TexType::Rgba,
            2 => TexType::Alpha,
            _ => TexType::PremultipliedRgba,
        }
    }
}

/// Byte distance between consecutive uniform records
///
/// The record size rounded up to the larger of 4 bytes and the device's
/// uniform buffer alignment.
pub fn uniform_stride(alignment: usize) -> usize {
    let align = alignment.max(4);
    FragUniforms::SIZE.div_ceil(align) * align
}
