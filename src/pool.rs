//! Fixed packet buffer pool
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use log::trace;

use crate::error::Error;
use crate::packet::PacketBuffer;
use crate::ComponentId;

/// Number of buffers in the pool
pub const POOL_LEN: usize = 10;

/// Move-only handle to a live pool entry.
///
/// Handles cannot be cloned or copied: passing one to a neighbouring
/// layer moves it, so the previous owner can no longer touch the buffer.
/// A generation tag detects handles that outlive their slot.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle {
    index: u8,
    generation: u16,
}

struct Slot {
    in_use: bool,
    generation: u16,
    buf: PacketBuffer,
}

impl Slot {
    fn new() -> Self {
        Self {
            in_use: false,
            generation: 0,
            buf: PacketBuffer::default(),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolStats {
    pub alloc_fail: u32,
    pub free_fail: u32,
}

/// Fixed-capacity store of packet buffers.
///
/// Buffers are allocated by linear scan and returned explicitly; there is
/// no reference counting, a buffer has exactly one logical owner and only
/// that owner frees it. Allocation never blocks and never touches the
/// heap; an empty pool is an expected steady-state condition under load,
/// reported to the caller as [`Error::Exhausted`].
pub struct Pool {
    slots: [Slot; POOL_LEN],
    stats: PoolStats,
}

impl Pool {
    pub fn new() -> Self {
        Self {
            slots: [(); POOL_LEN].map(|_| Slot::new()),
            stats: PoolStats::default(),
        }
    }

    /// Allocate a free buffer, stamping `creator` and `owner`.
    ///
    /// Returns [`Error::Exhausted`] when no slot is free, leaving the pool
    /// unchanged.
    pub fn alloc(&mut self, creator: ComponentId) -> Result<Handle, Error> {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.in_use {
                continue;
            }

            slot.in_use = true;
            slot.buf.reset();
            slot.buf.creator = creator;
            slot.buf.owner = creator;

            trace!("Allocated slot {} for {:?}", index, creator);

            return Ok(Handle {
                index: index as u8,
                generation: slot.generation,
            });
        }

        self.stats.alloc_fail = self.stats.alloc_fail.saturating_add(1);

        Err(Error::Exhausted)
    }

    /// Return a buffer to the pool, consuming the handle.
    ///
    /// A stale or out-of-range handle is rejected with
    /// [`Error::BadHandle`] without touching pool state.
    pub fn free(&mut self, pkt: Handle) -> Result<(), Error> {
        let slot = match self.slots.get_mut(pkt.index as usize) {
            Some(s) if s.in_use && s.generation == pkt.generation => s,
            _ => {
                self.stats.free_fail = self.stats.free_fail.saturating_add(1);
                return Err(Error::BadHandle);
            }
        };

        slot.in_use = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.buf.reset();

        trace!("Freed slot {}", pkt.index);

        Ok(())
    }

    /// Access the buffer behind a live handle
    pub fn buf(&self, pkt: &Handle) -> &PacketBuffer {
        let slot = &self.slots[pkt.index as usize];
        debug_assert!(slot.in_use && slot.generation == pkt.generation);
        &slot.buf
    }

    /// Mutable access to the buffer behind a live handle
    pub fn buf_mut(&mut self, pkt: &Handle) -> &mut PacketBuffer {
        let slot = &mut self.slots[pkt.index as usize];
        debug_assert!(slot.in_use && slot.generation == pkt.generation);
        &mut slot.buf
    }

    /// Number of buffers currently allocated
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    /// Fetch pool statistics
    pub fn stats(&self) -> PoolStats {
        self.stats.clone()
    }
}
