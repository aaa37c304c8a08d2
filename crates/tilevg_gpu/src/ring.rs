//! Command memory ring
//!
//! `N` fixed slices of command memory used round robin. A slice is handed to
//! the recorder again only after the fence of its previous submission has
//! signalled.

use crate::cmd::{CmdBuf, CmdList};
use crate::device::{Device, Fence};
use crate::error::GpuResult;
use crate::mem::{MemHandle, MemPool};

pub struct CmdMemRing<const N: usize> {
    slots: Vec<MemHandle>,
    fences: [Option<Fence>; N],
    current: usize,
    in_use: bool,
}

impl<const N: usize> CmdMemRing<N> {
    pub fn allocate(pool: &MemPool, slot_size: usize, align: usize) -> GpuResult<Self> {
        let slots = (0..N)
            .map(|_| pool.allocate(slot_size, align))
            .collect::<GpuResult<Vec<_>>>()?;
        Ok(Self {
            slots,
            fences: [None; N],
            current: 0,
            in_use: false,
        })
    }

    /// Slot the next `begin` hands out
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn slot_size(&self) -> usize {
        self.slots.first().map_or(0, MemHandle::size)
    }

    /// Whether any slot still waits on a submission
    pub fn has_pending(&self) -> bool {
        self.fences.iter().any(Option::is_some)
    }

    /// Attach the current slot to `cmd`, waiting for its last use first
    pub fn begin<D: Device + ?Sized>(&mut self, device: &mut D, cmd: &mut CmdBuf) -> GpuResult<()> {
        if self.in_use {
            return Ok(());
        }
        if let Some(fence) = self.fences[self.current].take() {
            tracing::trace!(slot = self.current, ?fence, "waiting for command memory");
            device.wait(fence)?;
        }
        let slot = &self.slots[self.current];
        cmd.attach_memory(slot.gpu_addr(), slot.size());
        self.in_use = true;
        Ok(())
    }

    /// Close the recording in the current slot and advance the ring
    pub fn end(&mut self, cmd: &mut CmdBuf) -> GpuResult<CmdList> {
        let slot = self.current;
        self.in_use = false;
        self.current = (self.current + 1) % N;
        let mut list = cmd.finish()?;
        list.set_ring_slot(slot);
        Ok(list)
    }

    /// Whether a recording is open in the current slot
    pub fn is_recording(&self) -> bool {
        self.in_use
    }

    /// Abandon the open recording; the slot is handed out again next time
    pub fn cancel(&mut self) {
        self.in_use = false;
    }

    /// Remember the fence guarding `slot`
    pub fn track(&mut self, slot: usize, fence: Fence) {
        self.fences[slot] = Some(fence);
    }

    /// Wait for every tracked submission
    pub fn wait_all<D: Device + ?Sized>(&mut self, device: &mut D) -> GpuResult<()> {
        for fence in self.fences.iter_mut() {
            if let Some(fence) = fence.take() {
                device.wait(fence)?;
            }
        }
        Ok(())
    }
}
