// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! PS4 package container parsing.
//!
//! Packages are big-endian: every multi-byte header and entry field is
//! byte-swapped on read. The loader extracts the main executable (entry id
//! 0x1000); when that entry is absent or unusable it falls back to the
//! largest entry whose data actually fits inside the file. Encrypted
//! content is not decrypted — a payload that is not a valid ELF will be
//! rejected downstream.

use byteorder::{BigEndian, ReadBytesExt};
use log::{info, warn};
use std::io::{Cursor, Read, Seek, SeekFrom};
use thiserror::Error;

/// Package magic: 0x7F "CNT", stored big-endian.
pub const PKG_MAGIC: u32 = 0x7F43_4E54;

/// Entry id of the main executable (eboot.bin).
pub const ENTRY_ID_EBOOT: u32 = 0x1000;
/// Entry id of param.sfo.
pub const ENTRY_ID_PARAM_SFO: u32 = 0x1001;

/// On-disk size of the package header.
const PKG_HEADER_SIZE: usize = 0xEC;
/// On-disk size of one entry table record.
const PKG_ENTRY_SIZE: usize = 0x20;

/// Entries claiming more than this are treated as corruption.
const MAX_ENTRY_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Package parsing/extraction error.
#[derive(Debug, Error)]
pub enum PkgError {
    #[error("file too small for a package header: {0} bytes")]
    TooSmall(usize),

    #[error("invalid package magic: 0x{actual:08X} (expected 0x{expected:08X})")]
    InvalidMagic { actual: u32, expected: u32 },

    #[error("entry table at 0x{offset:X} ({count} entries) exceeds file size {file_size}")]
    EntryTableOutOfBounds {
        offset: u32,
        count: u32,
        file_size: usize,
    },

    #[error("entry 0x{0:04X} not found")]
    EntryNotFound(u32),

    #[error("entry 0x{0:04X} has zero size")]
    ZeroSize(u32),

    #[error("entry 0x{id:04X} offset {offset} is beyond file size {file_size}")]
    OffsetBeyondFile { id: u32, offset: u32, file_size: usize },

    #[error("entry 0x{id:04X} size {size} MB exceeds 2 GiB (possible corruption)")]
    AbsurdSize { id: u32, size: u64 },

    #[error("no valid entries in package (all offsets invalid)")]
    NoValidEntries,

    #[error("I/O error reading package: {0}")]
    Io(#[from] std::io::Error),
}

/// Parsed package header (the fields the loader uses).
#[derive(Debug, Clone)]
pub struct PkgHeader {
    pub magic: u32,
    pub revision: u32,
    pub pkg_type: u16,
    pub flags: u16,
    pub entry_count: u32,
    pub table_offset: u32,
    pub entry_data_size: u32,
    pub body_offset: u64,
    pub body_size: u64,
    pub content_offset: u64,
    pub content_size: u64,
    pub content_id: String,
    pub drm_type: u32,
    pub content_type: u32,
}

/// One entry table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PkgEntry {
    pub id: u32,
    pub filename_offset: u32,
    pub flags1: u32,
    pub flags2: u32,
    pub data_offset: u32,
    pub data_size: u32,
}

/// A fully parsed package: header plus entry table.
#[derive(Debug, Clone)]
pub struct ParsedPkg {
    pub header: PkgHeader,
    pub entries: Vec<PkgEntry>,
}

fn read_entry(cur: &mut Cursor<&[u8]>) -> Result<PkgEntry, PkgError> {
    let entry = PkgEntry {
        id: cur.read_u32::<BigEndian>()?,
        filename_offset: cur.read_u32::<BigEndian>()?,
        flags1: cur.read_u32::<BigEndian>()?,
        flags2: cur.read_u32::<BigEndian>()?,
        data_offset: cur.read_u32::<BigEndian>()?,
        data_size: cur.read_u32::<BigEndian>()?,
    };
    // Trailing 8 bytes of padding.
    cur.seek(SeekFrom::Current(8))?;
    Ok(entry)
}

/// Parse the header and entry table from an in-memory package image.
pub fn parse_package(data: &[u8]) -> Result<ParsedPkg, PkgError> {
    if data.len() < PKG_HEADER_SIZE {
        return Err(PkgError::TooSmall(data.len()));
    }

    let mut cur = Cursor::new(data);

    let magic = cur.read_u32::<BigEndian>()?;
    if magic != PKG_MAGIC {
        return Err(PkgError::InvalidMagic {
            actual: magic,
            expected: PKG_MAGIC,
        });
    }

    let revision = cur.read_u32::<BigEndian>()?;
    let pkg_type = cur.read_u16::<BigEndian>()?;
    let flags = cur.read_u16::<BigEndian>()?;
    let entry_count = cur.read_u32::<BigEndian>()?;
    let _sc_entry_count = cur.read_u16::<BigEndian>()?;
    let _entry_count2 = cur.read_u16::<BigEndian>()?;
    let table_offset = cur.read_u32::<BigEndian>()?;
    let entry_data_size = cur.read_u32::<BigEndian>()?;
    let body_offset = cur.read_u64::<BigEndian>()?;
    let body_size = cur.read_u64::<BigEndian>()?;
    let content_offset = cur.read_u64::<BigEndian>()?;
    let content_size = cur.read_u64::<BigEndian>()?;

    let mut content_id_raw = [0u8; 36];
    cur.read_exact(&mut content_id_raw)?;
    let content_id = String::from_utf8_lossy(&content_id_raw)
        .trim_end_matches('\0')
        .to_string();

    cur.seek(SeekFrom::Current(12))?; // reserved
    let drm_type = cur.read_u32::<BigEndian>()?;
    let content_type = cur.read_u32::<BigEndian>()?;
    // content_flags, promote_size, version_date, version_hash, iro_tag,
    // ekc_version, and the reserved tail are not needed by the loader.

    let header = PkgHeader {
        magic,
        revision,
        pkg_type,
        flags,
        entry_count,
        table_offset,
        entry_data_size,
        body_offset,
        body_size,
        content_offset,
        content_size,
        content_id,
        drm_type,
        content_type,
    };

    info!(
        "package: rev={}, type={}, {} entries, table at 0x{:X}, content id '{}'",
        header.revision, header.pkg_type, header.entry_count, header.table_offset, header.content_id
    );

    // The whole entry table must lie inside the file; a truncated table is an
    // error rather than a short read.
    let table_end = header.table_offset as u64 + header.entry_count as u64 * PKG_ENTRY_SIZE as u64;
    if table_end > data.len() as u64 {
        return Err(PkgError::EntryTableOutOfBounds {
            offset: header.table_offset,
            count: header.entry_count,
            file_size: data.len(),
        });
    }

    let mut cur = Cursor::new(data);
    cur.seek(SeekFrom::Start(header.table_offset as u64))?;
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        entries.push(read_entry(&mut cur)?);
    }

    Ok(ParsedPkg { header, entries })
}

impl ParsedPkg {
    pub fn find_entry(&self, id: u32) -> Option<&PkgEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// Extract one entry's bytes, validating offset before size so a bogus
/// offset can never underflow the readable-length computation. Oversized
/// claims are sanitized down to what the file actually holds.
pub fn extract_entry(data: &[u8], pkg: &ParsedPkg, id: u32) -> Result<Vec<u8>, PkgError> {
    let entry = pkg.find_entry(id).ok_or(PkgError::EntryNotFound(id))?;

    if entry.data_offset as usize >= data.len() {
        return Err(PkgError::OffsetBeyondFile {
            id,
            offset: entry.data_offset,
            file_size: data.len(),
        });
    }

    if entry.data_size == 0 {
        return Err(PkgError::ZeroSize(id));
    }

    let max_readable = (data.len() - entry.data_offset as usize) as u64;
    let mut size = entry.data_size as u64;
    if size > max_readable {
        warn!(
            "entry 0x{:04X}: claimed size {} exceeds readable {} bytes, sanitizing",
            id, size, max_readable
        );
        size = max_readable;
    }

    if size > MAX_ENTRY_SIZE {
        return Err(PkgError::AbsurdSize {
            id,
            size: size / 1024 / 1024,
        });
    }

    let start = entry.data_offset as usize;
    Ok(data[start..start + size as usize].to_vec())
}

/// Extract the main executable: entry 0x1000, or — when absent or invalid —
/// the largest entry whose data actually lies inside the file.
pub fn extract_main_executable(data: &[u8]) -> Result<Vec<u8>, PkgError> {
    let pkg = parse_package(data)?;

    match extract_entry(data, &pkg, ENTRY_ID_EBOOT) {
        Ok(payload) => {
            info!("extracted eboot entry 0x{:04X}: {} bytes", ENTRY_ID_EBOOT, payload.len());
            return Ok(payload);
        }
        Err(e) => {
            warn!("eboot entry 0x1000 unusable ({}), scanning for largest entry", e);
        }
    }

    // Fallback: pick the entry with the largest effective (in-file) size.
    let mut best: Option<(u32, u64)> = None;
    for entry in &pkg.entries {
        if entry.data_offset as usize >= data.len() {
            warn!(
                "skipping entry 0x{:08X}: offset {} >= file size {}",
                entry.id,
                entry.data_offset,
                data.len()
            );
            continue;
        }
        let max_readable = (data.len() - entry.data_offset as usize) as u64;
        let effective = (entry.data_size as u64).min(max_readable);
        if effective > 0 && best.map_or(true, |(_, s)| effective > s) {
            best = Some((entry.id, effective));
        }
    }

    let (id, effective) = best.ok_or(PkgError::NoValidEntries)?;
    if effective > MAX_ENTRY_SIZE {
        return Err(PkgError::AbsurdSize {
            id,
            size: effective / 1024 / 1024,
        });
    }

    warn!(
        "fallback: extracting largest valid entry 0x{:08X} ({} bytes)",
        id, effective
    );
    extract_entry(data, &pkg, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal package image with the given entries. Each entry is
    /// `(id, data_offset, claimed_size, fill_byte)`; data regions are only
    /// written when they fit inside `file_size`.
    fn build_pkg(file_size: usize, entries: &[(u32, u32, u32, u8)]) -> Vec<u8> {
        let table_offset = PKG_HEADER_SIZE as u32;
        let mut buf = vec![0u8; file_size];

        let put_u32 = |buf: &mut Vec<u8>, off: usize, v: u32| {
            buf[off..off + 4].copy_from_slice(&v.to_be_bytes());
        };
        let put_u16 = |buf: &mut Vec<u8>, off: usize, v: u16| {
            buf[off..off + 2].copy_from_slice(&v.to_be_bytes());
        };

        put_u32(&mut buf, 0x00, PKG_MAGIC);
        put_u32(&mut buf, 0x04, 1); // revision
        put_u16(&mut buf, 0x08, 1); // type
        put_u16(&mut buf, 0x0A, 0); // flags
        put_u32(&mut buf, 0x0C, entries.len() as u32);
        put_u32(&mut buf, 0x14, table_offset);

        // Content id.
        let cid = b"UP0000-TEST00000_00-0000000000000000";
        buf[0x40..0x40 + cid.len()].copy_from_slice(cid);

        for (i, &(id, offset, size, fill)) in entries.iter().enumerate() {
            let e = table_offset as usize + i * PKG_ENTRY_SIZE;
            put_u32(&mut buf, e, id);
            put_u32(&mut buf, e + 0x10, offset);
            put_u32(&mut buf, e + 0x14, size);

            let start = offset as usize;
            if start < file_size {
                let end = (start + size as usize).min(file_size);
                for b in &mut buf[start..end] {
                    *b = fill;
                }
            }
        }

        buf
    }

    #[test]
    fn test_parse_header_and_entries() {
        let data = build_pkg(0x1000, &[(ENTRY_ID_EBOOT, 0x800, 0x100, 0xAB)]);
        let pkg = parse_package(&data).expect("parse");
        assert_eq!(pkg.header.magic, PKG_MAGIC);
        assert_eq!(pkg.header.entry_count, 1);
        assert_eq!(pkg.header.content_id, "UP0000-TEST00000_00-0000000000000000");
        assert_eq!(pkg.entries[0].id, ENTRY_ID_EBOOT);
        assert_eq!(pkg.entries[0].data_offset, 0x800);
        assert_eq!(pkg.entries[0].data_size, 0x100);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut data = build_pkg(0x1000, &[]);
        data[0] = 0x00;
        assert!(matches!(
            parse_package(&data),
            Err(PkgError::InvalidMagic { .. })
        ));
    }

    #[test]
    fn test_too_small_rejected() {
        assert!(matches!(
            parse_package(&[0u8; 16]),
            Err(PkgError::TooSmall(16))
        ));
    }

    #[test]
    fn test_truncated_entry_table_rejected() {
        let mut data = build_pkg(0x1000, &[(ENTRY_ID_EBOOT, 0x800, 0x100, 0xAB)]);
        // Claim far more entries than the file can hold.
        data[0x0C..0x10].copy_from_slice(&10_000u32.to_be_bytes());
        assert!(matches!(
            parse_package(&data),
            Err(PkgError::EntryTableOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_extract_eboot_directly() {
        let data = build_pkg(0x1000, &[(ENTRY_ID_EBOOT, 0x800, 0x100, 0xAB)]);
        let payload = extract_main_executable(&data).expect("extract");
        assert_eq!(payload.len(), 0x100);
        assert!(payload.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_largest_entry_fallback() {
        // Three entries, no 0x1000; sizes 10 / 4096 / 128 — the 4096-byte
        // entry must win.
        let data = build_pkg(
            0x4000,
            &[
                (0x1002, 0x200, 10, 0x11),
                (0x1003, 0x300, 4096, 0x22),
                (0x1004, 0x1400, 128, 0x33),
            ],
        );
        let payload = extract_main_executable(&data).expect("fallback extract");
        assert_eq!(payload.len(), 4096);
        assert!(payload.iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_fallback_skips_invalid_offsets() {
        let data = build_pkg(
            0x1000,
            &[
                (0x1002, 0xFFFF_0000, 4096, 0x11), // offset beyond file
                (0x1003, 0x400, 64, 0x22),
            ],
        );
        let payload = extract_main_executable(&data).expect("fallback extract");
        assert_eq!(payload.len(), 64);
        assert!(payload.iter().all(|&b| b == 0x22));
    }

    #[test]
    fn test_oversized_claim_is_sanitized() {
        // Entry claims 0x10000 bytes but only 0x200 remain past its offset.
        let data = build_pkg(0x1000, &[(ENTRY_ID_EBOOT, 0xE00, 0x10000, 0x44)]);
        let payload = extract_main_executable(&data).expect("sanitized extract");
        assert_eq!(payload.len(), 0x200);
    }

    #[test]
    fn test_zero_size_entry_fails_direct_extract() {
        let data = build_pkg(0x1000, &[(ENTRY_ID_EBOOT, 0x800, 0, 0)]);
        let pkg = parse_package(&data).unwrap();
        assert!(matches!(
            extract_entry(&data, &pkg, ENTRY_ID_EBOOT),
            Err(PkgError::ZeroSize(_))
        ));
    }

    #[test]
    fn test_all_entries_invalid_is_error() {
        let data = build_pkg(
            0x1000,
            &[(0x1002, 0xFFFF_0000, 64, 0), (0x1003, 0xEEEE_0000, 64, 0)],
        );
        assert!(matches!(
            extract_main_executable(&data),
            Err(PkgError::NoValidEntries)
        ));
    }

    #[test]
    fn test_missing_entry_lookup() {
        let data = build_pkg(0x1000, &[(0x1001, 0x800, 16, 0x55)]);
        let pkg = parse_package(&data).unwrap();
        assert!(pkg.find_entry(ENTRY_ID_EBOOT).is_none());
        assert!(matches!(
            extract_entry(&data, &pkg, ENTRY_ID_EBOOT),
            Err(PkgError::EntryNotFound(ENTRY_ID_EBOOT))
        ));
    }
}
