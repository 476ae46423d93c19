// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Filesystem syscalls over the VFS.
//!
//! Writes to descriptors 1 and 2 are routed to the console sink instead of a
//! file; all other descriptors go through the mount-backed file table.

use std::sync::Arc;

use log::debug;

use rubis_common::error::{EFAULT, EINVAL, SCE_KERNEL_ERROR_EINVAL};
use rubis_cpu::memory::MemoryAccess;
use rubis_kernel::syscall::{nr, SyscallDispatcher, SyscallResult, MAX_PATH_LEN, MAX_WRITE_LEN};

use crate::fs::{FileStat, Vfs};

/// Receives guest console output (fd, text). The emulator core wires this to
/// its log callback so boot messages surface to the user.
pub type ConsoleSink = Arc<dyn Fn(i32, &str) + Send + Sync>;

/// Per-call ceiling on file I/O transfers.
const MAX_IO_CHUNK: usize = 16 * 1024 * 1024;

/// Serialize a stat record into the guest's packed layout.
pub fn write_stat(mem: &mut dyn MemoryAccess, ptr: u64, stat: &FileStat) -> Result<(), ()> {
    let r = (|| {
        mem.write_u32(ptr, stat.st_dev)?;
        mem.write_u32(ptr + 4, stat.st_ino)?;
        mem.write_u16(ptr + 8, stat.st_mode)?;
        mem.write_u16(ptr + 10, stat.st_nlink)?;
        mem.write_u32(ptr + 12, stat.st_uid)?;
        mem.write_u32(ptr + 16, stat.st_gid)?;
        mem.write_u32(ptr + 20, stat.st_rdev)?;
        mem.write_u64(ptr + 24, stat.st_size as u64)?;
        mem.write_u64(ptr + 32, stat.st_atime as u64)?;
        mem.write_u64(ptr + 40, stat.st_mtime as u64)?;
        mem.write_u64(ptr + 48, stat.st_ctime as u64)?;
        mem.write_u64(ptr + 56, stat.st_blksize as u64)?;
        mem.write_u64(ptr + 64, stat.st_blocks as u64)?;
        Ok::<(), rubis_cpu::memory::MemoryFault>(())
    })();
    r.map_err(|_| ())
}

/// Register the filesystem handlers.
pub fn register_libfs(dispatcher: &mut SyscallDispatcher, vfs: Arc<Vfs>, console: ConsoleSink) {
    let v = vfs.clone();
    dispatcher.register(nr::SYS_READ, "sys_read", move |_ctx, mem, args| {
        let fd = args[0] as i32;
        let buf_ptr = args[1];
        let count = (args[2] as usize).min(MAX_IO_CHUNK);

        if fd >= 0 && fd < 10 {
            // Standard input and friends: nothing to read.
            return SyscallResult::ok(0);
        }
        if buf_ptr == 0 {
            return SyscallResult::err(-EINVAL, "null read buffer");
        }

        let mut buf = vec![0u8; count];
        let n = v.read(fd, &mut buf);
        if n < 0 {
            return SyscallResult::err(n, format!("read(fd={}) failed", fd));
        }
        match mem.write_block(buf_ptr, &buf[..n as usize]) {
            Ok(()) => SyscallResult::ok(n),
            Err(_) => SyscallResult::err(-EFAULT, "bad read buffer"),
        }
    });

    let v = vfs.clone();
    let sink = console.clone();
    dispatcher.register(nr::SYS_WRITE, "sys_write", move |_ctx, mem, args| {
        let fd = args[0] as i32;
        let buf_ptr = args[1];
        let count = args[2] as usize;

        if fd == 1 || fd == 2 {
            // Console output: decode up to the first NUL or the declared
            // byte count, capped.
            let mut text = String::new();
            for i in 0..count.min(MAX_WRITE_LEN) {
                match mem.read_u8(buf_ptr + i as u64) {
                    Ok(0) => break,
                    Ok(b) => text.push(b as char),
                    Err(_) => return SyscallResult::err(-EFAULT, "bad write buffer"),
                }
            }
            sink(fd, &text);
            return SyscallResult::ok(text.len() as i64);
        }

        let count = count.min(MAX_IO_CHUNK);
        let mut buf = vec![0u8; count];
        if mem.read_block(buf_ptr, &mut buf).is_err() {
            return SyscallResult::err(-EFAULT, "bad write buffer");
        }
        let n = v.write(fd, &buf);
        if n < 0 {
            return SyscallResult::err(n, format!("write(fd={}) failed", fd));
        }
        SyscallResult::ok(n)
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_OPEN, "sys_open", move |_ctx, mem, args| {
        if args[0] == 0 {
            return SyscallResult::err(SCE_KERNEL_ERROR_EINVAL as i64, "null path");
        }
        let path = match mem.read_cstring(args[0], MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return SyscallResult::err(-EFAULT, "bad path pointer"),
        };
        let fd = v.open(&path, args[1] as u32, args[2] as u32);
        if fd < 0 {
            return SyscallResult::err(fd as i64, format!("open('{}') failed", path));
        }
        debug!("sys_open('{}') -> fd={}", path, fd);
        SyscallResult::ok(fd as i64)
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_CLOSE, "sys_close", move |_ctx, _mem, args| {
        let result = v.close(args[0] as i32);
        if result < 0 {
            return SyscallResult::err(result as i64, format!("close(fd={}) failed", args[0]));
        }
        SyscallResult::ok(0)
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_UNLINK, "sys_unlink", move |_ctx, mem, args| {
        if args[0] == 0 {
            return SyscallResult::err(SCE_KERNEL_ERROR_EINVAL as i64, "null path");
        }
        let path = match mem.read_cstring(args[0], MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return SyscallResult::err(-EFAULT, "bad path pointer"),
        };
        let result = v.unlink(&path);
        if result < 0 {
            return SyscallResult::err(result as i64, format!("unlink('{}') failed", path));
        }
        SyscallResult::ok(0)
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_STAT, "sys_stat", move |_ctx, mem, args| {
        if args[0] == 0 || args[1] == 0 {
            return SyscallResult::err(SCE_KERNEL_ERROR_EINVAL as i64, "null argument");
        }
        let path = match mem.read_cstring(args[0], MAX_PATH_LEN) {
            Ok(p) => p,
            Err(_) => return SyscallResult::err(-EFAULT, "bad path pointer"),
        };
        match v.stat_path(&path) {
            Ok(stat) => match write_stat(mem, args[1], &stat) {
                Ok(()) => SyscallResult::ok(0),
                Err(()) => SyscallResult::err(-EFAULT, "bad stat buffer"),
            },
            Err(e) => SyscallResult::err(e as i64, format!("stat('{}') failed", path)),
        }
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_FSTAT, "sys_fstat", move |_ctx, mem, args| {
        if args[1] == 0 {
            return SyscallResult::err(SCE_KERNEL_ERROR_EINVAL as i64, "null stat buffer");
        }
        match v.stat_fd(args[0] as i32) {
            Ok(stat) => match write_stat(mem, args[1], &stat) {
                Ok(()) => SyscallResult::ok(0),
                Err(()) => SyscallResult::err(-EFAULT, "bad stat buffer"),
            },
            Err(e) => SyscallResult::err(e as i64, format!("fstat(fd={}) failed", args[0])),
        }
    });

    let v = vfs.clone();
    dispatcher.register(nr::SYS_GETDENTS, "sys_getdents", move |_ctx, mem, args| {
        if args[1] == 0 {
            return SyscallResult::err(SCE_KERNEL_ERROR_EINVAL as i64, "null dirent buffer");
        }
        let max_bytes = (args[2] as usize).min(MAX_IO_CHUNK);
        match v.read_dirents(args[0] as i32, max_bytes) {
            Ok(bytes) => match mem.write_block(args[1], &bytes) {
                Ok(()) => SyscallResult::ok(bytes.len() as i64),
                Err(_) => SyscallResult::err(-EFAULT, "bad dirent buffer"),
            },
            Err(e) => SyscallResult::err(e as i64, format!("getdents(fd={}) failed", args[0])),
        }
    });

    let v = vfs;
    dispatcher.register(nr::SYS_LSEEK, "sys_lseek", move |_ctx, _mem, args| {
        let pos = v.seek(args[0] as i32, args[1] as i64, args[2] as u32);
        if pos < 0 {
            return SyscallResult::err(pos, format!("lseek(fd={}) failed", args[0]));
        }
        SyscallResult::ok(pos)
    });
}
