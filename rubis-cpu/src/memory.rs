// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Memory access trait for the CPU interpreter and syscall handlers.
//!
//! This trait abstracts guest memory so the interpreter and the HLE layer can
//! read/write it without depending on the kernel crate directly. All
//! multi-byte accesses are little-endian.

use thiserror::Error;

/// Guest memory access error.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFault {
    #[error("out of bounds access at 0x{addr:016X} (size {size})")]
    OutOfBounds { addr: u64, size: usize },
}

/// Trait for guest memory access.
///
/// Implementations handle address translation and bounds checks. The block
/// and string helpers have default implementations on top of the typed ops;
/// concrete arenas are expected to override the block ops with slice copies.
pub trait MemoryAccess {
    fn read_u8(&self, addr: u64) -> Result<u8, MemoryFault>;
    fn read_u16(&self, addr: u64) -> Result<u16, MemoryFault>;
    fn read_u32(&self, addr: u64) -> Result<u32, MemoryFault>;
    fn read_u64(&self, addr: u64) -> Result<u64, MemoryFault>;
    fn write_u8(&mut self, addr: u64, val: u8) -> Result<(), MemoryFault>;
    fn write_u16(&mut self, addr: u64, val: u16) -> Result<(), MemoryFault>;
    fn write_u32(&mut self, addr: u64, val: u32) -> Result<(), MemoryFault>;
    fn write_u64(&mut self, addr: u64, val: u64) -> Result<(), MemoryFault>;

    /// Copy `dst.len()` bytes out of guest memory. Zero-length is a no-op.
    fn read_block(&self, addr: u64, dst: &mut [u8]) -> Result<(), MemoryFault> {
        for (i, byte) in dst.iter_mut().enumerate() {
            *byte = self.read_u8(addr + i as u64)?;
        }
        Ok(())
    }

    /// Copy `src.len()` bytes into guest memory. Zero-length is a no-op.
    fn write_block(&mut self, addr: u64, src: &[u8]) -> Result<(), MemoryFault> {
        for (i, byte) in src.iter().enumerate() {
            self.write_u8(addr + i as u64, *byte)?;
        }
        Ok(())
    }

    /// Read a NUL-terminated string, stopping at `max_len` bytes.
    /// Invalid UTF-8 is replaced lossily.
    fn read_cstring(&self, addr: u64, max_len: usize) -> Result<String, MemoryFault> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let b = self.read_u8(addr + i as u64)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
