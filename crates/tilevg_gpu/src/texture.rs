//! Texture registry
//!
//! Owns every live texture together with its image memory. Uploads go
//! through a staging allocation in data memory and a blocking copy.

use tilevg_core::{ImageFlags, TextureDescriptor, TextureFormat, TextureId};

use crate::cmd::{CmdBuf, CopyRegion, ImageView};
use crate::device::Device;
use crate::error::{GpuError, GpuResult};
use crate::mem::{MemHandle, MemPool};

/// A live texture
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    descriptor: TextureDescriptor,
    view: ImageView,
    _memory: MemHandle,
}

impl Texture {
    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn flags(&self) -> ImageFlags {
        self.descriptor.flags
    }

    pub fn view(&self) -> &ImageView {
        &self.view
    }
}

/// Memory pools used for texture storage and uploads
#[derive(Clone, Copy)]
pub struct UploadPools<'a> {
    pub image: &'a MemPool,
    pub data: &'a MemPool,
}

#[derive(Debug)]
pub struct TextureRegistry {
    textures: Vec<Texture>,
    last_id: u32,
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureRegistry {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            last_id: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Create a texture and upload `data` if given
    ///
    /// `data` holds tightly packed rows of `width * bytes_per_pixel` bytes.
    #[allow(clippy::too_many_arguments)]
    pub fn create<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        pools: UploadPools<'_>,
        format: TextureFormat,
        width: u32,
        height: u32,
        flags: ImageFlags,
        data: Option<&[u8]>,
    ) -> GpuResult<TextureId> {
        let limits = device.limits();
        if width == 0 || height == 0 {
            return Err(GpuError::invalid_image(format!("empty image {width}x{height}")));
        }
        if width > limits.max_image_dimension || height > limits.max_image_dimension {
            return Err(GpuError::invalid_image(format!(
                "image {width}x{height} exceeds {}",
                limits.max_image_dimension
            )));
        }
        let descriptor = TextureDescriptor {
            width,
            height,
            format,
            flags,
        };
        if let Some(data) = data {
            if data.len() < descriptor.byte_size() {
                return Err(GpuError::invalid_image(format!(
                    "{} bytes supplied for a {width}x{height} {format:?} image",
                    data.len()
                )));
            }
        }

        let layout = device.image_layout(format, width, height);
        let memory = pools.image.allocate(layout.size, layout.alignment)?;
        let view = ImageView {
            addr: memory.gpu_addr(),
            width,
            height,
            format,
            row_pitch: layout.row_pitch,
        };

        if let Some(data) = data {
            let region = CopyRegion {
                x: 0,
                y: 0,
                width,
                height,
            };
            upload(device, pools.data, &view, region, data)?;
        }

        let id = TextureId::new(self.last_id + 1)
            .ok_or_else(|| GpuError::device("texture ids exhausted"))?;
        self.last_id = id.get();
        tracing::debug!(texture = id.get(), width, height, ?format, ?flags, "created texture");
        self.textures.push(Texture {
            id,
            descriptor,
            view,
            _memory: memory,
        });
        Ok(id)
    }

    /// Rewrite rows `y..y + height` of a texture
    ///
    /// `data` addresses the whole image; the rows are read starting `y` full
    /// rows into it. Updates always cover full rows, so `_x` and `_width` are
    /// ignored. Returns `Ok(false)` for unknown ids.
    #[allow(clippy::too_many_arguments)]
    pub fn update<D: Device + ?Sized>(
        &mut self,
        device: &mut D,
        data_pool: &MemPool,
        id: TextureId,
        _x: u32,
        y: u32,
        _width: u32,
        height: u32,
        data: &[u8],
    ) -> GpuResult<bool> {
        let Some(texture) = self.find(id) else {
            return Ok(false);
        };
        let desc = texture.descriptor;
        if y >= desc.height || height == 0 {
            return Ok(true);
        }
        let height = height.min(desc.height - y);
        let row = desc.width as usize * desc.format.bytes_per_pixel();
        let start = y as usize * row;
        let end = start + height as usize * row;
        let Some(rows) = data.get(start..end) else {
            return Err(GpuError::invalid_image(format!(
                "update of rows {y}..{} needs {end} bytes, got {}",
                y + height,
                data.len()
            )));
        };

        let region = CopyRegion {
            x: 0,
            y,
            width: desc.width,
            height,
        };
        upload(device, data_pool, &texture.view, region, rows)?;
        Ok(true)
    }

    /// Remove every texture carrying `id`, returning how many were removed
    pub fn delete(&mut self, id: TextureId) -> usize {
        let before = self.textures.len();
        self.textures.retain(|t| t.id != id);
        before - self.textures.len()
    }

    pub fn find(&self, id: TextureId) -> Option<&Texture> {
        self.textures.iter().find(|t| t.id == id)
    }

    pub fn descriptor(&self, id: TextureId) -> Option<&TextureDescriptor> {
        self.find(id).map(Texture::descriptor)
    }

    pub fn size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.descriptor(id).map(|d| (d.width, d.height))
    }
}

/// Copy tightly packed `data` into `region` of `image` and wait for it
fn upload<D: Device + ?Sized>(
    device: &mut D,
    data_pool: &MemPool,
    image: &ImageView,
    region: CopyRegion,
    data: &[u8],
) -> GpuResult<()> {
    let limits = device.limits();
    let row = region.width as usize * image.format.bytes_per_pixel();
    let pitch = row.div_ceil(limits.linear_stride_alignment) * limits.linear_stride_alignment;

    let staging = data_pool.allocate(pitch * region.height as usize, limits.linear_stride_alignment)?;
    for (index, src) in data.chunks_exact(row).take(region.height as usize).enumerate() {
        staging.write(index * pitch, src)?;
    }

    let cmd_memory = data_pool.allocate(256, limits.cmd_mem_alignment)?;
    let mut cmd = CmdBuf::with_memory(&cmd_memory);
    cmd.copy_buffer_to_image(staging.gpu_addr(), pitch, *image, region);
    let list = cmd.finish()?;
    device.submit(list)?;
    device.wait_idle()?;
    tracing::trace!(?region, bytes = data.len(), "uploaded image data");
    Ok(())
}
