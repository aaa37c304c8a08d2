//! GPU memory pools
//!
//! A [`MemPool`] models one device memory block (image, code or data memory).
//! Allocations are first-fit with explicit alignment and are returned as
//! [`MemHandle`]s that release their region when dropped. Every allocation
//! has a [`GpuAddr`] that command buffers reference and devices resolve
//! through a [`MemoryMap`].

use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicU16, Ordering};

use crate::error::{GpuError, GpuResult};

/// What a pool holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    /// Image storage
    Image,
    /// Shader code
    Code,
    /// Vertex data, uniforms, descriptors, staging and command memory
    Data,
}

/// Device address: pool id in the high bits, byte offset in the low bits
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuAddr(u64);

impl GpuAddr {
    const OFFSET_BITS: u32 = 40;
    const OFFSET_MASK: u64 = (1 << Self::OFFSET_BITS) - 1;

    pub fn new(pool: u16, offset: usize) -> Self {
        Self(((pool as u64) << Self::OFFSET_BITS) | (offset as u64 & Self::OFFSET_MASK))
    }

    pub fn pool(self) -> u16 {
        (self.0 >> Self::OFFSET_BITS) as u16
    }

    pub fn offset(self) -> usize {
        (self.0 & Self::OFFSET_MASK) as usize
    }

    pub fn add(self, bytes: usize) -> Self {
        Self::new(self.pool(), self.offset() + bytes)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr({}:{:#x})", self.pool(), self.offset())
    }
}

static NEXT_POOL_ID: AtomicU16 = AtomicU16::new(1);

struct PoolState {
    id: u16,
    kind: MemoryKind,
    storage: Vec<u8>,
    /// Sorted, non-overlapping, coalesced
    free: Vec<Range<usize>>,
    used: usize,
}

impl PoolState {
    fn allocate(&mut self, size: usize, align: usize) -> Option<usize> {
        let align = align.max(1);
        let (index, start) = self.free.iter().enumerate().find_map(|(i, range)| {
            let start = range.start.div_ceil(align) * align;
            (start + size <= range.end).then_some((i, start))
        })?;

        let range = self.free.remove(index);
        let mut insert = index;
        if start > range.start {
            self.free.insert(insert, range.start..start);
            insert += 1;
        }
        if start + size < range.end {
            self.free.insert(insert, start + size..range.end);
        }
        self.used += size;
        Some(start)
    }

    fn release(&mut self, offset: usize, size: usize) {
        let index = self.free.partition_point(|r| r.start < offset);
        self.free.insert(index, offset..offset + size);
        self.used -= size;

        // merge with the following range, then with the preceding one
        if index + 1 < self.free.len() && self.free[index].end == self.free[index + 1].start {
            let next = self.free.remove(index + 1);
            self.free[index].end = next.end;
        }
        if index > 0 && self.free[index - 1].end == self.free[index].start {
            let cur = self.free.remove(index);
            self.free[index - 1].end = cur.end;
        }
    }

    fn largest_free(&self) -> usize {
        self.free.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    fn range(&self, addr: GpuAddr, len: usize) -> GpuResult<Range<usize>> {
        let start = addr.offset();
        let end = start.checked_add(len);
        match end {
            Some(end) if addr.pool() == self.id && end <= self.storage.len() => Ok(start..end),
            _ => Err(GpuError::InvalidAddress { addr, len }),
        }
    }
}

/// Shared handle to a memory pool
#[derive(Clone)]
pub struct MemPool {
    inner: Rc<RefCell<PoolState>>,
}

impl fmt::Debug for MemPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("MemPool")
            .field("id", &state.id)
            .field("kind", &state.kind)
            .field("capacity", &state.storage.len())
            .field("used", &state.used)
            .finish()
    }
}

impl MemPool {
    pub fn new(kind: MemoryKind, capacity: usize) -> Self {
        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Rc::new(RefCell::new(PoolState {
                id,
                kind,
                storage: vec![0; capacity],
                free: if capacity > 0 { vec![0..capacity] } else { Vec::new() },
                used: 0,
            })),
        }
    }

    pub fn id(&self) -> u16 {
        self.inner.borrow().id
    }

    pub fn kind(&self) -> MemoryKind {
        self.inner.borrow().kind
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().storage.len()
    }

    /// Bytes currently handed out
    pub fn used(&self) -> usize {
        self.inner.borrow().used
    }

    /// Allocate `size` bytes (at least one) aligned to `align`
    pub fn allocate(&self, size: usize, align: usize) -> GpuResult<MemHandle> {
        let size = size.max(1);
        let mut state = self.inner.borrow_mut();
        match state.allocate(size, align) {
            Some(offset) => {
                tracing::trace!(kind = ?state.kind, offset, size, "pool allocation");
                Ok(MemHandle {
                    pool: self.clone(),
                    addr: GpuAddr::new(state.id, offset),
                    size,
                })
            }
            None => Err(GpuError::OutOfMemory {
                pool: state.kind,
                requested: size,
                available: state.largest_free(),
            }),
        }
    }

    /// Run `f` over `len` bytes at `addr`
    pub fn with_bytes<R>(&self, addr: GpuAddr, len: usize, f: impl FnOnce(&[u8]) -> R) -> GpuResult<R> {
        let state = self.inner.borrow();
        let range = state.range(addr, len)?;
        Ok(f(&state.storage[range]))
    }

    pub fn read(&self, addr: GpuAddr, len: usize) -> GpuResult<Vec<u8>> {
        self.with_bytes(addr, len, <[u8]>::to_vec)
    }

    pub fn write(&self, addr: GpuAddr, data: &[u8]) -> GpuResult<()> {
        let mut state = self.inner.borrow_mut();
        let range = state.range(addr, data.len())?;
        state.storage[range].copy_from_slice(data);
        Ok(())
    }

    fn release(&self, addr: GpuAddr, size: usize) {
        let mut state = self.inner.borrow_mut();
        tracing::trace!(kind = ?state.kind, offset = addr.offset(), size, "pool release");
        state.release(addr.offset(), size);
    }
}

/// Owned region of a pool, released on drop
pub struct MemHandle {
    pool: MemPool,
    addr: GpuAddr,
    size: usize,
}

impl fmt::Debug for MemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemHandle")
            .field("addr", &self.addr)
            .field("size", &self.size)
            .finish()
    }
}

impl MemHandle {
    pub fn gpu_addr(&self) -> GpuAddr {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pool(&self) -> &MemPool {
        &self.pool
    }

    /// Write `data` at `offset` bytes into the region
    pub fn write(&self, offset: usize, data: &[u8]) -> GpuResult<()> {
        if offset + data.len() > self.size {
            return Err(GpuError::InvalidAddress {
                addr: self.addr.add(offset),
                len: data.len(),
            });
        }
        self.pool.write(self.addr.add(offset), data)
    }

    pub fn read(&self) -> GpuResult<Vec<u8>> {
        self.pool.read(self.addr, self.size)
    }
}

impl Drop for MemHandle {
    fn drop(&mut self) {
        self.pool.release(self.addr, self.size);
    }
}

/// Address resolver over the pools a device can see
#[derive(Clone, Debug, Default)]
pub struct MemoryMap {
    pools: Vec<MemPool>,
}

impl MemoryMap {
    pub fn new(pools: impl IntoIterator<Item = MemPool>) -> Self {
        Self {
            pools: pools.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, pool: MemPool) {
        if !self.pools.iter().any(|p| p.id() == pool.id()) {
            self.pools.push(pool);
        }
    }

    pub fn pool(&self, addr: GpuAddr) -> GpuResult<&MemPool> {
        self.pools
            .iter()
            .find(|p| p.id() == addr.pool())
            .ok_or(GpuError::InvalidAddress { addr, len: 0 })
    }

    pub fn with_bytes<R>(&self, addr: GpuAddr, len: usize, f: impl FnOnce(&[u8]) -> R) -> GpuResult<R> {
        self.pool(addr)?.with_bytes(addr, len, f)
    }

    pub fn read(&self, addr: GpuAddr, len: usize) -> GpuResult<Vec<u8>> {
        self.pool(addr)?.read(addr, len)
    }

    pub fn write(&self, addr: GpuAddr, data: &[u8]) -> GpuResult<()> {
        self.pool(addr)?.write(addr, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let pool = MemPool::new(MemoryKind::Data, 4096);
        let a = pool.allocate(10, 1).unwrap();
        let b = pool.allocate(16, 256).unwrap();
        assert_eq!(a.gpu_addr().offset(), 0);
        assert_eq!(b.gpu_addr().offset(), 256);
        // the gap before `b` is still usable
        let c = pool.allocate(100, 4).unwrap();
        assert_eq!(c.gpu_addr().offset(), 12);
    }

    #[test]
    fn test_release_on_drop_coalesces() {
        let pool = MemPool::new(MemoryKind::Image, 1024);
        let a = pool.allocate(512, 1).unwrap();
        let b = pool.allocate(512, 1).unwrap();
        assert!(pool.allocate(1, 1).is_err());
        drop(a);
        drop(b);
        assert_eq!(pool.used(), 0);
        let whole = pool.allocate(1024, 1).unwrap();
        assert_eq!(whole.gpu_addr().offset(), 0);
    }

    #[test]
    fn test_out_of_memory() {
        let pool = MemPool::new(MemoryKind::Code, 64);
        let _held = pool.allocate(48, 1).unwrap();
        match pool.allocate(32, 1) {
            Err(GpuError::OutOfMemory {
                pool,
                requested,
                available,
            }) => {
                assert_eq!(pool, MemoryKind::Code);
                assert_eq!(requested, 32);
                assert_eq!(available, 16);
            }
            other => panic!("expected OutOfMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_write_and_resolve() {
        let pool = MemPool::new(MemoryKind::Data, 256);
        let handle = pool.allocate(8, 4).unwrap();
        handle.write(4, &[1, 2, 3, 4]).unwrap();
        assert!(handle.write(6, &[0; 4]).is_err());

        let map = MemoryMap::new([pool.clone()]);
        assert_eq!(map.read(handle.gpu_addr().add(4), 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(map.read(GpuAddr::new(u16::MAX, 0), 1).is_err());
    }

    #[test]
    fn test_addr_packing() {
        let addr = GpuAddr::new(7, 0x1234);
        assert_eq!(addr.pool(), 7);
        assert_eq!(addr.offset(), 0x1234);
        assert_eq!(addr.add(4).offset(), 0x1238);
    }
}
