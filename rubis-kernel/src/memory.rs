// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Unified guest memory.
//!
//! A single contiguous arena backs the console's 8 GiB of unified memory.
//! Virtual addresses at or above `USER_BASE` are rebased, then masked into
//! the arena; there is no page table and no per-page protection — the guest
//! code paths this emulator runs cannot observe either. The arena is an
//! anonymous mapping, so untouched pages cost nothing until first write.

use log::{info, warn};
use memmap2::MmapMut;
use thiserror::Error;

use rubis_common::{FALLBACK_MEMORY_SIZE, MEMORY_SIZE, USER_BASE, VAddr};
use rubis_cpu::memory::{MemoryAccess, MemoryFault};

/// Guest memory setup error.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to allocate guest arena: {0}")]
    AllocationFailed(#[from] std::io::Error),
}

/// The guest memory arena.
pub struct GuestMemory {
    arena: MmapMut,
    size: u64,
}

impl GuestMemory {
    /// Allocate the full 8 GiB arena, falling back to 512 MiB if the host
    /// refuses the large mapping.
    pub fn new() -> Result<Self, MemoryError> {
        match MmapMut::map_anon(MEMORY_SIZE as usize) {
            Ok(arena) => {
                info!("guest memory: 8 GiB arena reserved");
                Ok(Self {
                    arena,
                    size: MEMORY_SIZE,
                })
            }
            Err(e) => {
                warn!(
                    "guest memory: 8 GiB allocation failed ({}), \
                     falling back to 512 MiB degraded arena",
                    e
                );
                let arena = MmapMut::map_anon(FALLBACK_MEMORY_SIZE as usize)?;
                Ok(Self {
                    arena,
                    size: FALLBACK_MEMORY_SIZE,
                })
            }
        }
    }

    /// Allocate a reduced arena. `size` must be a power of two; intended for
    /// tests that do not want to reserve the full address range.
    pub fn with_size(size: u64) -> Result<Self, MemoryError> {
        debug_assert!(size.is_power_of_two());
        let arena = MmapMut::map_anon(size as usize)?;
        Ok(Self { arena, size })
    }

    /// Arena size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Translate a guest virtual address to an arena offset.
    ///
    /// Addresses at or above `USER_BASE` are rebased first; everything wraps
    /// into the arena via the size mask.
    #[inline]
    pub fn translate(&self, vaddr: VAddr) -> u64 {
        let offset = if vaddr >= USER_BASE {
            vaddr - USER_BASE
        } else {
            vaddr
        };
        offset & (self.size - 1)
    }

    /// Whether `size` bytes at `vaddr` fit inside the arena after translation.
    pub fn is_valid(&self, vaddr: VAddr, size: usize) -> bool {
        let offset = self.translate(vaddr);
        offset.checked_add(size as u64).is_some_and(|end| end <= self.size)
    }

    #[inline]
    fn range(&self, vaddr: VAddr, len: usize) -> Result<&[u8], MemoryFault> {
        let offset = self.translate(vaddr) as usize;
        self.arena
            .get(offset..offset + len)
            .ok_or(MemoryFault::OutOfBounds {
                addr: vaddr,
                size: len,
            })
    }

    #[inline]
    fn range_mut(&mut self, vaddr: VAddr, len: usize) -> Result<&mut [u8], MemoryFault> {
        let offset = self.translate(vaddr) as usize;
        self.arena
            .get_mut(offset..offset + len)
            .ok_or(MemoryFault::OutOfBounds {
                addr: vaddr,
                size: len,
            })
    }

    // -- Float accessors used by HLE handlers -------------------------------

    pub fn read_f32(&self, vaddr: VAddr) -> Result<f32, MemoryFault> {
        Ok(f32::from_bits(self.read_u32(vaddr)?))
    }

    pub fn write_f32(&mut self, vaddr: VAddr, val: f32) -> Result<(), MemoryFault> {
        self.write_u32(vaddr, val.to_bits())
    }

    pub fn read_f64(&self, vaddr: VAddr) -> Result<f64, MemoryFault> {
        Ok(f64::from_bits(self.read_u64(vaddr)?))
    }

    pub fn write_f64(&mut self, vaddr: VAddr, val: f64) -> Result<(), MemoryFault> {
        self.write_u64(vaddr, val.to_bits())
    }

    /// Fill `len` bytes with `value`. Zero-length is a no-op.
    pub fn fill(&mut self, vaddr: VAddr, value: u8, len: usize) -> Result<(), MemoryFault> {
        if len == 0 {
            return Ok(());
        }
        self.range_mut(vaddr, len)?.fill(value);
        Ok(())
    }

    /// Zero `len` bytes.
    pub fn zero(&mut self, vaddr: VAddr, len: usize) -> Result<(), MemoryFault> {
        self.fill(vaddr, 0, len)
    }
}

impl MemoryAccess for GuestMemory {
    fn read_u8(&self, addr: u64) -> Result<u8, MemoryFault> {
        Ok(self.range(addr, 1)?[0])
    }

    fn read_u16(&self, addr: u64) -> Result<u16, MemoryFault> {
        let mut b = [0u8; 2];
        b.copy_from_slice(self.range(addr, 2)?);
        Ok(u16::from_le_bytes(b))
    }

    fn read_u32(&self, addr: u64) -> Result<u32, MemoryFault> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.range(addr, 4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, MemoryFault> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.range(addr, 8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn write_u8(&mut self, addr: u64, val: u8) -> Result<(), MemoryFault> {
        self.range_mut(addr, 1)?[0] = val;
        Ok(())
    }

    fn write_u16(&mut self, addr: u64, val: u16) -> Result<(), MemoryFault> {
        self.range_mut(addr, 2)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn write_u32(&mut self, addr: u64, val: u32) -> Result<(), MemoryFault> {
        self.range_mut(addr, 4)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn write_u64(&mut self, addr: u64, val: u64) -> Result<(), MemoryFault> {
        self.range_mut(addr, 8)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }

    fn read_block(&self, addr: u64, dst: &mut [u8]) -> Result<(), MemoryFault> {
        if dst.is_empty() {
            return Ok(());
        }
        dst.copy_from_slice(self.range(addr, dst.len())?);
        Ok(())
    }

    fn write_block(&mut self, addr: u64, src: &[u8]) -> Result<(), MemoryFault> {
        if src.is_empty() {
            return Ok(());
        }
        self.range_mut(addr, src.len())?.copy_from_slice(src);
        Ok(())
    }
}
