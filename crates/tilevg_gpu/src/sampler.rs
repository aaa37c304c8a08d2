//! Precomputed sampler table
//!
//! Sixteen samplers indexed by a 4-bit key:
//! - bit 0: mipmap filtering
//! - bit 1: nearest filtering
//! - bit 2: repeat horizontally
//! - bit 3: repeat vertically

use tilevg_core::ImageFlags;

use crate::cmd::{CmdBuf, Descriptor, Filter, MipFilter, SamplerDesc, WrapMode};
use crate::descriptor::DescriptorSet;
use crate::error::GpuResult;
use crate::mem::MemPool;

pub const SAMPLER_COUNT: usize = 16;

const KEY_MIPMAP: u32 = 1 << 0;
const KEY_NEAREST: u32 = 1 << 1;
const KEY_REPEAT_X: u32 = 1 << 2;
const KEY_REPEAT_Y: u32 = 1 << 3;

pub struct SamplerTable {
    descriptors: [SamplerDesc; SAMPLER_COUNT],
    set: DescriptorSet<SAMPLER_COUNT>,
}

impl SamplerTable {
    /// Build the table and record its upload into `cmd`
    pub fn new(pool: &MemPool, cmd: &mut CmdBuf) -> GpuResult<Self> {
        let set = DescriptorSet::allocate(pool)?;
        let descriptors = std::array::from_fn(|key| Self::descriptor_for_key(key as u32));
        for (index, desc) in descriptors.iter().enumerate() {
            set.update(cmd, index as u32, Descriptor::Sampler(*desc));
        }
        Ok(Self { descriptors, set })
    }

    /// Sampler index for an image's flags
    pub fn select(flags: ImageFlags) -> u32 {
        let mut key = 0;
        if flags.contains(ImageFlags::GENERATE_MIPMAPS) {
            key |= KEY_MIPMAP;
        }
        if flags.contains(ImageFlags::NEAREST) {
            key |= KEY_NEAREST;
        }
        if flags.contains(ImageFlags::REPEAT_X) {
            key |= KEY_REPEAT_X;
        }
        if flags.contains(ImageFlags::REPEAT_Y) {
            key |= KEY_REPEAT_Y;
        }
        key
    }

    pub fn descriptor_for_key(key: u32) -> SamplerDesc {
        let nearest = key & KEY_NEAREST != 0;
        let filter = if nearest { Filter::Nearest } else { Filter::Linear };
        let mip_filter = match (key & KEY_MIPMAP != 0, nearest) {
            (false, _) => MipFilter::None,
            (true, true) => MipFilter::Nearest,
            (true, false) => MipFilter::Linear,
        };
        let wrap = |bit| {
            if key & bit != 0 {
                WrapMode::Repeat
            } else {
                WrapMode::ClampToEdge
            }
        };
        SamplerDesc {
            min_filter: filter,
            mag_filter: filter,
            mip_filter,
            wrap_u: wrap(KEY_REPEAT_X),
            wrap_v: wrap(KEY_REPEAT_Y),
        }
    }

    pub fn descriptor(&self, index: u32) -> Option<&SamplerDesc> {
        self.descriptors.get(index as usize)
    }

    pub fn bind(&self, cmd: &mut CmdBuf) {
        self.set.bind_for_samplers(cmd);
    }
}
