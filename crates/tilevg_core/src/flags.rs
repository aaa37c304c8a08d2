//! Renderer and image flags

use bitflags::bitflags;

bitflags! {
    /// Flags fixed at renderer creation
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {
        /// Geometry based anti-aliasing (fringe strips and stroke masks)
        const ANTIALIAS = 1 << 0;
        /// Draw strokes through the stencil buffer so overlapping segments
        /// blend only once
        const STENCIL_STROKES = 1 << 1;
        /// Validate call ranges before recording
        const DEBUG = 1 << 2;
    }
}

bitflags! {
    /// Per-image creation flags
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ImageFlags: u32 {
        const GENERATE_MIPMAPS = 1 << 0;
        const REPEAT_X = 1 << 1;
        const REPEAT_Y = 1 << 2;
        /// Image rows are stored bottom-up
        const FLIP_Y = 1 << 3;
        /// Color channels are already multiplied by alpha
        const PREMULTIPLIED = 1 << 4;
        /// Nearest neighbour filtering instead of linear
        const NEAREST = 1 << 5;
    }
}

/// Pixel format of a texture
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// Single 8-bit coverage channel
    Alpha = 1,
    /// Four 8-bit unorm channels
    #[default]
    Rgba = 2,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            TextureFormat::Alpha => 1,
            TextureFormat::Rgba => 4,
        }
    }
}
