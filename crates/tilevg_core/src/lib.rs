//! tilevg Core
//!
//! Backend-independent data shared between a vector front end and the GPU
//! command translator.
//!
//! # Contents
//!
//! - **Flags**: renderer creation flags and per-image flags
//! - **Paint**: colors, affine transforms, paints, scissors and blending
//! - **Uniforms**: the fragment uniform record consumed by the fill shader
//! - **Frame**: vertices, paths, draw calls and the per-frame buffers the
//!   front end fills before every flush

pub mod flags;
pub mod frame;
pub mod paint;
pub mod uniforms;

pub use flags::{CreateFlags, ImageFlags, TextureFormat};
pub use frame::{Call, CallKind, FrameBuffers, Path, PathGeometry, Span, Vertex};
pub use paint::{
    BlendFactor, BlendFunc, Color, CompositeOperation, Paint, PaintImage, Scissor, Transform,
};
pub use uniforms::{uniform_stride, FragUniforms, ShaderType, TexType};

use std::num::NonZeroU32;

/// Identifier of a live texture
///
/// Ids start at 1 and are never reused, so the zero value of the C-style
/// interface is represented as `Option::<TextureId>::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    /// Wrap a raw id, returning `None` for zero
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw numeric value (always >= 1)
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// Public description of a texture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub flags: ImageFlags,
}

impl TextureDescriptor {
    /// Size in bytes of the tightly packed pixel data
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}
