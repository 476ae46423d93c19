// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! ELF64 validation and loading.
//!
//! Validates the header (64-bit, little-endian, x86-64, executable or shared
//! object; OS-ABI mismatches only warn) and maps every PT_LOAD segment into
//! guest memory, zero-filling the BSS tail. PS-specific segment types are
//! logged by name but not interpreted.

use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};
use std::io::{Cursor, Seek, SeekFrom};
use thiserror::Error;

use rubis_common::VAddr;
use rubis_cpu::memory::MemoryAccess;
use rubis_kernel::GuestMemory;

// ---------------------------------------------------------------------------
// ELF64 constants
// ---------------------------------------------------------------------------

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub const CLASS_64: u8 = 2;
pub const DATA_LSB: u8 = 1;
/// PS4 executables carry the FreeBSD OS ABI.
pub const OSABI_FREEBSD: u8 = 9;

pub const ET_EXEC: u16 = 2;
pub const ET_DYN: u16 = 3;
pub const EM_X86_64: u16 = 62;

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;
pub const PT_PHDR: u32 = 6;
pub const PT_TLS: u32 = 7;
pub const PT_SCE_DYNLIBDATA: u32 = 0x6100_0000;
pub const PT_SCE_PROCPARAM: u32 = 0x6100_0001;
pub const PT_SCE_MODULEPARAM: u32 = 0x6100_0002;
pub const PT_SCE_RELRO: u32 = 0x6100_0010;

pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;

/// Segment type name for diagnostics.
pub fn segment_type_name(p_type: u32) -> String {
    match p_type {
        PT_NULL => "NULL".into(),
        PT_LOAD => "LOAD".into(),
        PT_DYNAMIC => "DYNAMIC".into(),
        PT_INTERP => "INTERP".into(),
        PT_NOTE => "NOTE".into(),
        PT_PHDR => "PHDR".into(),
        PT_TLS => "TLS".into(),
        PT_SCE_DYNLIBDATA => "SCE_DYNLIBDATA".into(),
        PT_SCE_PROCPARAM => "SCE_PROCPARAM".into(),
        PT_SCE_MODULEPARAM => "SCE_MODULEPARAM".into(),
        PT_SCE_RELRO => "SCE_RELRO".into(),
        other => format!("UNKNOWN(0x{:08X})", other),
    }
}

/// "rwx"-style permission string.
pub fn segment_flags_string(flags: u32) -> String {
    let mut s = String::with_capacity(3);
    s.push(if flags & PF_R != 0 { 'r' } else { '-' });
    s.push(if flags & PF_W != 0 { 'w' } else { '-' });
    s.push(if flags & PF_X != 0 { 'x' } else { '-' });
    s
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// ELF validation/loading error.
#[derive(Debug, Error)]
pub enum ElfError {
    #[error("file too small to contain an ELF header ({0} bytes)")]
    TooSmall(usize),

    #[error("invalid ELF magic")]
    InvalidMagic,

    #[error("not a 64-bit ELF (class {0})")]
    NotClass64(u8),

    #[error("not little-endian (data encoding {0})")]
    NotLittleEndian(u8),

    #[error("unsupported architecture: machine type {0} (expected x86-64)")]
    UnsupportedMachine(u16),

    #[error("not an executable or shared object (type {0})")]
    UnsupportedType(u16),

    #[error("invalid program header table (offset 0x{offset:X}, {count} entries, file {file_size} bytes)")]
    InvalidProgramHeaders {
        offset: u64,
        count: u16,
        file_size: usize,
    },

    #[error("no loadable segments found")]
    NoLoadableSegments,

    #[error("segment write to guest memory failed at 0x{0:X}")]
    GuestWriteFailed(u64),

    #[error("I/O error reading ELF: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsed structures
// ---------------------------------------------------------------------------

/// The ELF64 header fields the loader uses.
#[derive(Debug, Clone)]
pub struct ElfHeader {
    pub ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_phnum: u16,
}

/// One program header.
#[derive(Debug, Clone, Copy)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

/// Record of one mapped segment.
#[derive(Debug, Clone)]
pub struct LoadedSegment {
    pub virtual_address: VAddr,
    pub memory_size: u64,
    pub file_size: u64,
    pub flags: u32,
    pub description: String,
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct ElfLoadResult {
    pub entry_point: VAddr,
    pub base_address: VAddr,
    pub top_address: VAddr,
    pub elf_type: &'static str,
    pub segments: Vec<LoadedSegment>,
}

impl ElfLoadResult {
    pub fn is_valid(&self) -> bool {
        !self.segments.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn parse_header(data: &[u8]) -> Result<ElfHeader, ElfError> {
    if data.len() < EHDR_SIZE {
        return Err(ElfError::TooSmall(data.len()));
    }

    let mut ident = [0u8; 16];
    ident.copy_from_slice(&data[..16]);

    let mut cur = Cursor::new(data);
    cur.seek(SeekFrom::Start(16))?;
    let e_type = cur.read_u16::<LittleEndian>()?;
    let e_machine = cur.read_u16::<LittleEndian>()?;
    let _e_version = cur.read_u32::<LittleEndian>()?;
    let e_entry = cur.read_u64::<LittleEndian>()?;
    let e_phoff = cur.read_u64::<LittleEndian>()?;
    let _e_shoff = cur.read_u64::<LittleEndian>()?;
    let _e_flags = cur.read_u32::<LittleEndian>()?;
    let _e_ehsize = cur.read_u16::<LittleEndian>()?;
    let _e_phentsize = cur.read_u16::<LittleEndian>()?;
    let e_phnum = cur.read_u16::<LittleEndian>()?;

    Ok(ElfHeader {
        ident,
        e_type,
        e_machine,
        e_entry,
        e_phoff,
        e_phnum,
    })
}

fn parse_phdr(data: &[u8], offset: usize) -> Result<ProgramHeader, ElfError> {
    let mut cur = Cursor::new(&data[offset..offset + PHDR_SIZE]);
    let p_type = cur.read_u32::<LittleEndian>()?;
    let p_flags = cur.read_u32::<LittleEndian>()?;
    let p_offset = cur.read_u64::<LittleEndian>()?;
    let p_vaddr = cur.read_u64::<LittleEndian>()?;
    let _p_paddr = cur.read_u64::<LittleEndian>()?;
    let p_filesz = cur.read_u64::<LittleEndian>()?;
    let p_memsz = cur.read_u64::<LittleEndian>()?;

    Ok(ProgramHeader {
        p_type,
        p_flags,
        p_offset,
        p_vaddr,
        p_filesz,
        p_memsz,
    })
}

/// Validate the identification and machine fields.
pub fn validate_header(header: &ElfHeader) -> Result<(), ElfError> {
    if header.ident[..4] != ELF_MAGIC {
        return Err(ElfError::InvalidMagic);
    }
    if header.ident[4] != CLASS_64 {
        return Err(ElfError::NotClass64(header.ident[4]));
    }
    if header.ident[5] != DATA_LSB {
        return Err(ElfError::NotLittleEndian(header.ident[5]));
    }
    if header.e_machine != EM_X86_64 {
        return Err(ElfError::UnsupportedMachine(header.e_machine));
    }
    if header.e_type != ET_EXEC && header.e_type != ET_DYN {
        return Err(ElfError::UnsupportedType(header.e_type));
    }

    let osabi = header.ident[7];
    if osabi != OSABI_FREEBSD && osabi != 0 {
        warn!("OS ABI is {} (expected FreeBSD/9), continuing", osabi);
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Map an in-memory ELF image into guest memory.
///
/// PT_LOAD segments whose file ranges or guest ranges do not fit are skipped
/// with a warning; if none load at all the result is an error.
pub fn load_elf(data: &[u8], memory: &mut GuestMemory) -> Result<ElfLoadResult, ElfError> {
    let header = parse_header(data)?;
    validate_header(&header)?;

    let elf_type = if header.e_type == ET_EXEC {
        "Executable"
    } else {
        "Shared Object"
    };

    info!(
        "ELF: {} entry=0x{:X}, {} program headers",
        elf_type, header.e_entry, header.e_phnum
    );

    let table_end = header
        .e_phoff
        .checked_add(header.e_phnum as u64 * PHDR_SIZE as u64)
        .unwrap_or(u64::MAX);
    if table_end > data.len() as u64 {
        return Err(ElfError::InvalidProgramHeaders {
            offset: header.e_phoff,
            count: header.e_phnum,
            file_size: data.len(),
        });
    }

    let mut segments = Vec::new();
    let mut lowest = u64::MAX;
    let mut highest = 0u64;

    for i in 0..header.e_phnum {
        let phdr = parse_phdr(data, header.e_phoff as usize + i as usize * PHDR_SIZE)?;

        debug!(
            "segment {}: {} {} vaddr=0x{:X} filesz=0x{:X} memsz=0x{:X}",
            i,
            segment_type_name(phdr.p_type),
            segment_flags_string(phdr.p_flags),
            phdr.p_vaddr,
            phdr.p_filesz,
            phdr.p_memsz
        );

        if phdr.p_type != PT_LOAD {
            continue;
        }

        let file_end = phdr.p_offset.checked_add(phdr.p_filesz).unwrap_or(u64::MAX);
        if file_end > data.len() as u64 {
            warn!("segment {} extends beyond the file, skipping", i);
            continue;
        }

        if !memory.is_valid(phdr.p_vaddr, phdr.p_memsz as usize) {
            warn!("segment {} exceeds guest memory bounds, skipping", i);
            continue;
        }

        // Copy file-backed bytes, then zero the BSS tail.
        if phdr.p_filesz > 0 {
            let src = &data[phdr.p_offset as usize..(phdr.p_offset + phdr.p_filesz) as usize];
            memory
                .write_block(phdr.p_vaddr, src)
                .map_err(|_| ElfError::GuestWriteFailed(phdr.p_vaddr))?;
        }
        if phdr.p_memsz > phdr.p_filesz {
            let bss_start = phdr.p_vaddr + phdr.p_filesz;
            let bss_len = (phdr.p_memsz - phdr.p_filesz) as usize;
            memory
                .zero(bss_start, bss_len)
                .map_err(|_| ElfError::GuestWriteFailed(bss_start))?;
        }

        segments.push(LoadedSegment {
            virtual_address: phdr.p_vaddr,
            memory_size: phdr.p_memsz,
            file_size: phdr.p_filesz,
            flags: phdr.p_flags,
            description: format!(
                "{} {} at 0x{:016X}",
                segment_type_name(phdr.p_type),
                segment_flags_string(phdr.p_flags),
                phdr.p_vaddr
            ),
        });

        lowest = lowest.min(phdr.p_vaddr);
        highest = highest.max(phdr.p_vaddr + phdr.p_memsz);

        debug!("loaded 0x{:X} bytes at 0x{:X}", phdr.p_filesz, phdr.p_vaddr);
    }

    if segments.is_empty() {
        return Err(ElfError::NoLoadableSegments);
    }

    info!(
        "loaded {} segments, base=0x{:X}, top=0x{:X}, entry=0x{:X}",
        segments.len(),
        lowest,
        highest,
        header.e_entry
    );

    Ok(ElfLoadResult {
        entry_point: header.e_entry,
        base_address: lowest,
        top_address: highest,
        elf_type,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubis_common::USER_BASE;

    fn test_mem() -> GuestMemory {
        GuestMemory::with_size(1 << 24).expect("test arena")
    }

    struct SegSpec {
        p_type: u32,
        flags: u32,
        offset: u64,
        vaddr: u64,
        filesz: u64,
        memsz: u64,
    }

    /// Build an ELF64 image of `file_size` bytes with the given program
    /// headers. Segment data regions keep whatever bytes the caller put in.
    fn build_elf(file_size: usize, entry: u64, e_type: u16, machine: u16, segs: &[SegSpec]) -> Vec<u8> {
        let mut buf = vec![0u8; file_size];

        buf[..4].copy_from_slice(&ELF_MAGIC);
        buf[4] = CLASS_64;
        buf[5] = DATA_LSB;
        buf[6] = 1; // EV_CURRENT
        buf[7] = OSABI_FREEBSD;

        let put_u16 = |buf: &mut Vec<u8>, off: usize, v: u16| {
            buf[off..off + 2].copy_from_slice(&v.to_le_bytes());
        };
        let put_u32 = |buf: &mut Vec<u8>, off: usize, v: u32| {
            buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
        };
        let put_u64 = |buf: &mut Vec<u8>, off: usize, v: u64| {
            buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
        };

        put_u16(&mut buf, 16, e_type);
        put_u16(&mut buf, 18, machine);
        put_u32(&mut buf, 20, 1); // version
        put_u64(&mut buf, 24, entry);
        put_u64(&mut buf, 32, EHDR_SIZE as u64); // phoff right after the header
        put_u16(&mut buf, 54, PHDR_SIZE as u16);
        put_u16(&mut buf, 56, segs.len() as u16);

        for (i, seg) in segs.iter().enumerate() {
            let p = EHDR_SIZE + i * PHDR_SIZE;
            put_u32(&mut buf, p, seg.p_type);
            put_u32(&mut buf, p + 4, seg.flags);
            put_u64(&mut buf, p + 8, seg.offset);
            put_u64(&mut buf, p + 16, seg.vaddr);
            put_u64(&mut buf, p + 24, seg.vaddr); // paddr
            put_u64(&mut buf, p + 32, seg.filesz);
            put_u64(&mut buf, p + 40, seg.memsz);
            put_u64(&mut buf, p + 48, 0x1000); // align
        }

        buf
    }

    #[test]
    fn test_load_single_segment() {
        let mut data = build_elf(
            0x2000,
            USER_BASE,
            ET_EXEC,
            EM_X86_64,
            &[SegSpec {
                p_type: PT_LOAD,
                flags: PF_R | PF_X,
                offset: 0x1000,
                vaddr: USER_BASE,
                filesz: 0x1000,
                memsz: 0x1000,
            }],
        );
        data[0x1000..0x1004].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let mut mem = test_mem();
        let result = load_elf(&data, &mut mem).expect("load");

        assert_eq!(result.entry_point, USER_BASE);
        assert_eq!(result.base_address, USER_BASE);
        assert_eq!(result.top_address, USER_BASE + 0x1000);
        assert_eq!(result.segments.len(), 1);
        assert!(result.is_valid());

        // First mapped word matches the file at offset 0x1000.
        assert_eq!(mem.read_u32(USER_BASE).unwrap(), 0xEFBE_ADDE);
        // One byte past the segment was never written.
        assert_eq!(mem.read_u8(USER_BASE + 0x1000).unwrap(), 0);
    }

    #[test]
    fn test_bss_is_zeroed() {
        let mut data = build_elf(
            0x2000,
            USER_BASE,
            ET_EXEC,
            EM_X86_64,
            &[SegSpec {
                p_type: PT_LOAD,
                flags: PF_R | PF_W,
                offset: 0x1000,
                vaddr: USER_BASE,
                filesz: 0x100,
                memsz: 0x1000,
            }],
        );
        data[0x1000..0x1100].fill(0x77);

        let mut mem = test_mem();
        // Dirty the BSS range first to prove the loader actively zeroes it.
        mem.fill(USER_BASE + 0x100, 0xFF, 0xF00).unwrap();

        load_elf(&data, &mut mem).expect("load");

        assert_eq!(mem.read_u8(USER_BASE + 0xFF).unwrap(), 0x77);
        assert_eq!(mem.read_u8(USER_BASE + 0x100).unwrap(), 0);
        assert_eq!(mem.read_u8(USER_BASE + 0xFFF).unwrap(), 0);
    }

    #[test]
    fn test_non_load_segments_skipped() {
        let data = build_elf(
            0x2000,
            USER_BASE,
            ET_DYN,
            EM_X86_64,
            &[
                SegSpec {
                    p_type: PT_SCE_PROCPARAM,
                    flags: PF_R,
                    offset: 0x1800,
                    vaddr: USER_BASE + 0x8000,
                    filesz: 0x10,
                    memsz: 0x10,
                },
                SegSpec {
                    p_type: PT_LOAD,
                    flags: PF_R | PF_X,
                    offset: 0x1000,
                    vaddr: USER_BASE,
                    filesz: 0x100,
                    memsz: 0x100,
                },
            ],
        );

        let mut mem = test_mem();
        let result = load_elf(&data, &mut mem).expect("load");
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.elf_type, "Shared Object");
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = build_elf(0x1000, 0, ET_EXEC, EM_X86_64, &[]);
        data[0] = 0;
        let mut mem = test_mem();
        assert!(matches!(load_elf(&data, &mut mem), Err(ElfError::InvalidMagic)));
    }

    #[test]
    fn test_wrong_class_rejected() {
        let mut data = build_elf(0x1000, 0, ET_EXEC, EM_X86_64, &[]);
        data[4] = 1; // 32-bit
        let mut mem = test_mem();
        assert!(matches!(load_elf(&data, &mut mem), Err(ElfError::NotClass64(1))));
    }

    #[test]
    fn test_wrong_machine_rejected() {
        let data = build_elf(0x1000, 0, ET_EXEC, 0xB7, &[]); // AArch64
        let mut mem = test_mem();
        assert!(matches!(
            load_elf(&data, &mut mem),
            Err(ElfError::UnsupportedMachine(0xB7))
        ));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let data = build_elf(0x1000, 0, 1 /* ET_REL */, EM_X86_64, &[]);
        let mut mem = test_mem();
        assert!(matches!(
            load_elf(&data, &mut mem),
            Err(ElfError::UnsupportedType(1))
        ));
    }

    #[test]
    fn test_truncated_phdr_table_rejected() {
        let mut data = build_elf(0x1000, 0, ET_EXEC, EM_X86_64, &[]);
        // Claim 100 program headers that cannot fit.
        data[56..58].copy_from_slice(&100u16.to_le_bytes());
        let mut mem = test_mem();
        assert!(matches!(
            load_elf(&data, &mut mem),
            Err(ElfError::InvalidProgramHeaders { .. })
        ));
    }

    #[test]
    fn test_segment_beyond_file_skipped() {
        let data = build_elf(
            0x2000,
            USER_BASE,
            ET_EXEC,
            EM_X86_64,
            &[SegSpec {
                p_type: PT_LOAD,
                flags: PF_R,
                offset: 0x1F00,
                vaddr: USER_BASE,
                filesz: 0x1000, // extends past the 0x2000-byte file
                memsz: 0x1000,
            }],
        );
        let mut mem = test_mem();
        assert!(matches!(
            load_elf(&data, &mut mem),
            Err(ElfError::NoLoadableSegments)
        ));
    }

    #[test]
    fn test_too_small_file() {
        let mut mem = test_mem();
        assert!(matches!(
            load_elf(&[0x7F, b'E'], &mut mem),
            Err(ElfError::TooSmall(2))
        ));
    }
}
