//! Descriptor sets and the image slot allocator

use tilevg_core::TextureId;

use crate::cmd::{CmdBuf, Descriptor, ImageView, DESCRIPTOR_SIZE};
use crate::error::GpuResult;
use crate::mem::{GpuAddr, MemHandle, MemPool};

/// Number of image descriptor slots
pub const MAX_IMAGES: usize = 0x1000;

/// `N` descriptors in data memory
#[derive(Debug)]
pub struct DescriptorSet<const N: usize> {
    memory: MemHandle,
}

impl<const N: usize> DescriptorSet<N> {
    pub fn allocate(pool: &MemPool) -> GpuResult<Self> {
        Ok(Self {
            memory: pool.allocate(N * DESCRIPTOR_SIZE, DESCRIPTOR_SIZE)?,
        })
    }

    pub fn addr(&self) -> GpuAddr {
        self.memory.gpu_addr()
    }

    pub fn update(&self, cmd: &mut CmdBuf, index: u32, descriptor: Descriptor) {
        cmd.update_descriptor(self.addr(), index, descriptor);
    }

    pub fn bind_for_images(&self, cmd: &mut CmdBuf) {
        cmd.bind_image_descriptor_set(self.addr(), N as u32);
    }

    pub fn bind_for_samplers(&self, cmd: &mut CmdBuf) {
        cmd.bind_sampler_descriptor_set(self.addr(), N as u32);
    }
}

/// Maps live textures onto the fixed image descriptor table
///
/// Slots are scanned only up to the high-water mark, which never decreases,
/// so freed slots below it are found again before the table grows.
///
/// A mapping written by `acquire` stays pending until the list carrying its
/// descriptor update is submitted; `rollback` forgets pending mappings when
/// that list is dropped instead.
pub struct DescriptorAllocator {
    set: DescriptorSet<MAX_IMAGES>,
    mappings: Box<[Option<TextureId>]>,
    high_water: usize,
    pending: Vec<(usize, TextureId)>,
}

impl DescriptorAllocator {
    pub fn new(pool: &MemPool) -> GpuResult<Self> {
        Ok(Self {
            set: DescriptorSet::allocate(pool)?,
            mappings: vec![None; MAX_IMAGES].into_boxed_slice(),
            high_water: 0,
            pending: Vec::new(),
        })
    }

    pub fn set(&self) -> &DescriptorSet<MAX_IMAGES> {
        &self.set
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Slot currently mapped to `id`
    pub fn slot_of(&self, id: TextureId) -> Option<usize> {
        self.mappings[..=self.high_water]
            .iter()
            .position(|m| *m == Some(id))
    }

    /// Number of occupied slots
    pub fn occupied(&self) -> usize {
        self.mappings.iter().filter(|m| m.is_some()).count()
    }

    /// Slot holding `id`, writing its descriptor first if it has none yet
    ///
    /// Returns `None` when every slot is taken.
    pub fn acquire(&mut self, cmd: &mut CmdBuf, id: TextureId, image: &ImageView) -> Option<u32> {
        let mut free_slot = None;
        for (slot, mapping) in self.mappings[..=self.high_water].iter().enumerate() {
            match mapping {
                Some(mapped) if *mapped == id => return Some(slot as u32),
                None if free_slot.is_none() => free_slot = Some(slot),
                _ => {}
            }
        }

        let slot = free_slot.unwrap_or(self.high_water + 1);
        if slot >= MAX_IMAGES {
            tracing::warn!(texture = id.get(), "image descriptor table full");
            return None;
        }

        self.set.update(cmd, slot as u32, Descriptor::Image(*image));
        cmd.barrier(true);
        self.mappings[slot] = Some(id);
        self.high_water = self.high_water.max(slot);
        self.pending.push((slot, id));
        tracing::trace!(texture = id.get(), slot, "bound image descriptor");
        Some(slot as u32)
    }

    /// Mappings written since the last commit or rollback
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// The recorded descriptor updates reached the device
    pub fn commit(&mut self) {
        self.pending.clear();
    }

    /// The recorded descriptor updates were discarded; unmap their slots
    pub fn rollback(&mut self) {
        for (slot, id) in self.pending.drain(..) {
            if self.mappings[slot] == Some(id) {
                tracing::debug!(texture = id.get(), slot, "dropped unsubmitted descriptor");
                self.mappings[slot] = None;
            }
        }
    }

    /// Release every slot mapped to `id`
    pub fn free(&mut self, id: TextureId) {
        for (slot, mapping) in self.mappings[..=self.high_water].iter_mut().enumerate() {
            if *mapping == Some(id) {
                tracing::debug!(texture = id.get(), slot, "freed image descriptor");
                *mapping = None;
            }
        }
    }
}
