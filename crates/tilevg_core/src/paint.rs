//! Paints, transforms and blending
//!
//! The types here describe *what* a call draws with. Converting them into a
//! GPU record happens in [`crate::uniforms::FragUniforms::from_paint`].

use crate::flags::{ImageFlags, TextureFormat};
use crate::{TextureDescriptor, TextureId};

/// Straight-alpha RGBA color with components in `0.0..=1.0`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Color = Color::rgba(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Color = Color::rgba(1.0, 1.0, 1.0, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Build from 8-bit channels
    pub fn rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::rgba(
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        )
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    /// Color channels multiplied by alpha, as `[r, g, b, a]`
    pub fn premultiplied(self) -> [f32; 4] {
        [self.r * self.a, self.g * self.a, self.b * self.a, self.a]
    }
}

/// 2D affine transform stored as `[a, b, c, d, e, f]`
///
/// A point maps as `x' = a*x + c*y + e`, `y' = b*x + d*y + f`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform(pub [f32; 6]);

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn translate(tx: f32, ty: f32) -> Self {
        Transform([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Transform([sx, 0.0, 0.0, sy, 0.0, 0.0])
    }

    pub fn rotate(angle: f32) -> Self {
        let (sn, cs) = angle.sin_cos();
        Transform([cs, sn, -sn, cs, 0.0, 0.0])
    }

    /// Apply `self` first, then `other`
    pub fn then(self, other: Transform) -> Self {
        let t = self.0;
        let s = other.0;
        Transform([
            t[0] * s[0] + t[1] * s[2],
            t[0] * s[1] + t[1] * s[3],
            t[2] * s[0] + t[3] * s[2],
            t[2] * s[1] + t[3] * s[3],
            t[4] * s[0] + t[5] * s[2] + s[4],
            t[4] * s[1] + t[5] * s[3] + s[5],
        ])
    }

    /// Inverse transform, or identity when the matrix is singular
    pub fn inverse(self) -> Self {
        let t = self.0;
        let det = t[0] as f64 * t[3] as f64 - t[2] as f64 * t[1] as f64;
        if det > -1e-6 && det < 1e-6 {
            return Self::IDENTITY;
        }
        let inv_det = 1.0 / det;
        let t: [f64; 6] = t.map(f64::from);
        Transform([
            (t[3] * inv_det) as f32,
            (-t[1] * inv_det) as f32,
            (-t[2] * inv_det) as f32,
            (t[0] * inv_det) as f32,
            ((t[2] * t[5] - t[3] * t[4]) * inv_det) as f32,
            ((t[1] * t[4] - t[0] * t[5]) * inv_det) as f32,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let t = self.0;
        (t[0] * x + t[2] * y + t[4], t[1] * x + t[3] * y + t[5])
    }

    /// Column-major 3x4 matrix as laid out in the uniform record
    pub fn to_mat3x4(self) -> [f32; 12] {
        let t = self.0;
        [
            t[0], t[1], 0.0, 0.0, //
            t[2], t[3], 0.0, 0.0, //
            t[4], t[5], 1.0, 0.0,
        ]
    }
}

/// Texture reference carried by an image paint
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PaintImage {
    pub id: TextureId,
    pub format: TextureFormat,
    pub flags: ImageFlags,
}

impl PaintImage {
    pub fn new(id: TextureId, descriptor: &TextureDescriptor) -> Self {
        Self {
            id,
            format: descriptor.format,
            flags: descriptor.flags,
        }
    }
}

/// Fill or stroke style: a solid color, a gradient or an image pattern
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Paint {
    pub xform: Transform,
    pub extent: [f32; 2],
    pub radius: f32,
    pub feather: f32,
    pub inner_color: Color,
    pub outer_color: Color,
    pub image: Option<PaintImage>,
}

impl Default for Paint {
    fn default() -> Self {
        Self::color(Color::BLACK)
    }
}

impl Paint {
    /// Solid color paint
    pub fn color(color: Color) -> Self {
        Self {
            xform: Transform::IDENTITY,
            extent: [0.0, 0.0],
            radius: 0.0,
            feather: 1.0,
            inner_color: color,
            outer_color: color,
            image: None,
        }
    }

    /// Linear gradient from `(sx, sy)` to `(ex, ey)`
    pub fn linear_gradient(sx: f32, sy: f32, ex: f32, ey: f32, inner: Color, outer: Color) -> Self {
        const LARGE: f32 = 1e5;
        let mut dx = ex - sx;
        let mut dy = ey - sy;
        let d = (dx * dx + dy * dy).sqrt();
        if d > 0.0001 {
            dx /= d;
            dy /= d;
        } else {
            dx = 0.0;
            dy = 1.0;
        }
        Self {
            xform: Transform([dy, -dx, dx, dy, sx - dx * LARGE, sy - dy * LARGE]),
            extent: [LARGE, LARGE + d * 0.5],
            radius: 0.0,
            feather: d.max(1.0),
            inner_color: inner,
            outer_color: outer,
            image: None,
        }
    }

    /// Radial gradient around `(cx, cy)` between `inr` and `outr`
    pub fn radial_gradient(cx: f32, cy: f32, inr: f32, outr: f32, inner: Color, outer: Color) -> Self {
        let r = (inr + outr) * 0.5;
        let f = outr - inr;
        Self {
            xform: Transform::translate(cx, cy),
            extent: [r, r],
            radius: r,
            feather: f.max(1.0),
            inner_color: inner,
            outer_color: outer,
            image: None,
        }
    }

    /// Image pattern whose top-left corner sits at `(ox, oy)`
    pub fn image_pattern(ox: f32, oy: f32, w: f32, h: f32, angle: f32, image: PaintImage, alpha: f32) -> Self {
        let xform = Transform::rotate(angle).then(Transform::translate(ox, oy));
        let tint = Color::rgba(1.0, 1.0, 1.0, alpha);
        Self {
            xform,
            extent: [w, h],
            radius: 0.0,
            feather: 0.0,
            inner_color: tint,
            outer_color: tint,
            image: Some(image),
        }
    }
}

/// Scissor rectangle in its own transform space
///
/// A negative extent disables scissoring.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scissor {
    pub xform: Transform,
    pub extent: [f32; 2],
}

impl Default for Scissor {
    fn default() -> Self {
        Self::NONE
    }
}

impl Scissor {
    pub const NONE: Scissor = Scissor {
        xform: Transform::IDENTITY,
        extent: [-1.0, -1.0],
    };

    /// Axis aligned scissor rectangle
    pub fn rect(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            xform: Transform::translate(x + w * 0.5, y + h * 0.5),
            extent: [w * 0.5, h * 0.5],
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.extent[0] < -0.5 || self.extent[1] < -0.5
    }
}

/// Blend factor applied to the source or destination color
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero = 0,
    #[default]
    One = 1,
    SrcColor = 2,
    OneMinusSrcColor = 3,
    DstColor = 4,
    OneMinusDstColor = 5,
    SrcAlpha = 6,
    OneMinusSrcAlpha = 7,
    DstAlpha = 8,
    OneMinusDstAlpha = 9,
    SrcAlphaSaturate = 10,
}

/// Separate color and alpha blend factors of a call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src_rgb: BlendFactor,
    pub dst_rgb: BlendFactor,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
}

impl Default for BlendFunc {
    fn default() -> Self {
        CompositeOperation::SourceOver.blend_func()
    }
}

impl BlendFunc {
    /// Same factors for color and alpha
    pub const fn uniform(src: BlendFactor, dst: BlendFactor) -> Self {
        Self {
            src_rgb: src,
            dst_rgb: dst,
            src_alpha: src,
            dst_alpha: dst,
        }
    }
}

/// Porter-Duff composite operations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompositeOperation {
    #[default]
    SourceOver,
    SourceIn,
    SourceOut,
    Atop,
    DestinationOver,
    DestinationIn,
    DestinationOut,
    DestinationAtop,
    Lighter,
    Copy,
    Xor,
}

impl CompositeOperation {
    pub fn blend_func(self) -> BlendFunc {
        use BlendFactor::*;
        let (src, dst) = match self {
            CompositeOperation::SourceOver => (One, OneMinusSrcAlpha),
            CompositeOperation::SourceIn => (DstAlpha, Zero),
            CompositeOperation::SourceOut => (OneMinusDstAlpha, Zero),
            CompositeOperation::Atop => (DstAlpha, OneMinusSrcAlpha),
            CompositeOperation::DestinationOver => (OneMinusDstAlpha, One),
            CompositeOperation::DestinationIn => (Zero, SrcAlpha),
            CompositeOperation::DestinationOut => (Zero, OneMinusSrcAlpha),
            CompositeOperation::DestinationAtop => (OneMinusDstAlpha, SrcAlpha),
            CompositeOperation::Lighter => (One, One),
            CompositeOperation::Copy => (One, Zero),
            CompositeOperation::Xor => (OneMinusDstAlpha, OneMinusSrcAlpha),
        };
        BlendFunc::uniform(src, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: (f32, f32), b: (f32, f32)) -> bool {
        (a.0 - b.0).abs() < 1e-4 && (a.1 - b.1).abs() < 1e-4
    }

    #[test]
    fn test_transform_inverse_roundtrip() {
        let t = Transform::rotate(0.3)
            .then(Transform::scale(2.0, 3.0))
            .then(Transform::translate(5.0, -7.0));
        let p = t.apply(1.5, 2.5);
        assert!(approx(t.inverse().apply(p.0, p.1), (1.5, 2.5)));
    }

    #[test]
    fn test_singular_inverse_is_identity() {
        assert_eq!(Transform::scale(0.0, 1.0).inverse(), Transform::IDENTITY);
    }

    #[test]
    fn test_then_order() {
        let t = Transform::scale(2.0, 2.0).then(Transform::translate(10.0, 0.0));
        assert!(approx(t.apply(1.0, 1.0), (12.0, 2.0)));
    }

    #[test]
    fn test_premultiplied() {
        let c = Color::rgba(1.0, 0.5, 0.0, 0.5);
        assert_eq!(c.premultiplied(), [0.5, 0.25, 0.0, 0.5]);
    }

    #[test]
    fn test_composite_table() {
        assert_eq!(
            CompositeOperation::SourceOver.blend_func(),
            BlendFunc::uniform(BlendFactor::One, BlendFactor::OneMinusSrcAlpha)
        );
        let xor = CompositeOperation::Xor.blend_func();
        assert_eq!(xor.src_alpha, BlendFactor::OneMinusDstAlpha);
        assert_eq!(xor.dst_alpha, BlendFactor::OneMinusSrcAlpha);
        assert_eq!(BlendFunc::default(), CompositeOperation::SourceOver.blend_func());
    }

    #[test]
    fn test_scissor_none() {
        assert!(Scissor::NONE.is_disabled());
        assert!(!Scissor::rect(0.0, 0.0, 10.0, 10.0).is_disabled());
    }
}
