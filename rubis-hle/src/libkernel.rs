// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Kernel-miscellaneous syscalls: process identity, memory mapping stubs,
//! sleeping, module loading, and console self-identification calls.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use rubis_common::error::{EFAULT, EINVAL};
use rubis_common::HEAP_BASE;
use rubis_kernel::syscall::{nr, SyscallDispatcher, SyscallResult, MAX_DEBUG_LEN, MAX_PATH_LEN};

/// Fake process id handed to the guest.
const GUEST_PID: i64 = 1000;
/// Reported CPU temperature in degrees Celsius.
const CPU_TEMPERATURE: u32 = 45;
/// First module handle returned by sceKernelLoadStartModule.
const FIRST_MODULE_HANDLE: i32 = 100;
/// Longest nanosleep actually honored, to keep the CPU thread responsive.
const MAX_SLEEP: Duration = Duration::from_secs(1);

/// Register the kernel-misc handlers. `exit_requested` is raised by
/// sys_exit; the emulator core's CPU thread observes it and performs the
/// actual stop — the dispatcher never halts the interpreter itself.
pub fn register_libkernel(dispatcher: &mut SyscallDispatcher, exit_requested: Arc<AtomicBool>) {
    dispatcher.register(nr::SYS_EXIT, "sys_exit", move |_ctx, _mem, args| {
        info!("sys_exit(status={})", args[0] as i32);
        exit_requested.store(true, Ordering::Release);
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SYS_GETPID, "sys_getpid", |_ctx, _mem, _args| {
        SyscallResult::ok(GUEST_PID)
    });

    dispatcher.register(nr::SYS_GETUID, "sys_getuid", |_ctx, _mem, _args| {
        // Root, as on the real console.
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SYS_IOCTL, "sys_ioctl", |_ctx, _mem, args| {
        debug!("sys_ioctl(fd={}, request=0x{:X})", args[0], args[1]);
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SYS_MUNMAP, "sys_munmap", |_ctx, _mem, args| {
        debug!("sys_munmap(addr=0x{:X}, len={})", args[0], args[1]);
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SYS_MPROTECT, "sys_mprotect", |_ctx, _mem, args| {
        debug!(
            "sys_mprotect(addr=0x{:X}, len={}, prot=0x{:X})",
            args[0], args[1], args[2]
        );
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SYS_NANOSLEEP, "sys_nanosleep", |_ctx, mem, args| {
        if args[0] == 0 {
            return SyscallResult::err(-EINVAL, "null timespec");
        }
        let secs = match mem.read_u64(args[0]) {
            Ok(v) => v,
            Err(_) => return SyscallResult::err(-EFAULT, "bad timespec pointer"),
        };
        let nanos = mem.read_u64(args[0] + 8).unwrap_or(0);
        let requested = Duration::new(secs, (nanos as u32).min(999_999_999));
        std::thread::sleep(requested.min(MAX_SLEEP));
        SyscallResult::ok(0)
    });

    // Trivial bump allocator over the heap region; nothing is ever released
    // (munmap is a stub), which the guests we run never notice.
    let next_alloc = AtomicU64::new(HEAP_BASE);
    dispatcher.register(nr::SYS_MMAP, "sys_mmap", move |_ctx, _mem, args| {
        let addr = args[0];
        let length = args[1];
        let aligned = (length + 0xFFF) & !0xFFF;
        let alloc = if addr != 0 {
            addr
        } else {
            next_alloc.fetch_add(aligned, Ordering::Relaxed)
        };
        debug!("sys_mmap(addr=0x{:X}, len={}) -> 0x{:X}", addr, length, alloc);
        SyscallResult::ok(alloc as i64)
    });

    let next_module = AtomicI32::new(FIRST_MODULE_HANDLE);
    dispatcher.register(
        nr::SCE_KERNEL_LOAD_START_MODULE,
        "sceKernelLoadStartModule",
        move |_ctx, mem, args| {
            if args[0] == 0 {
                return SyscallResult::err(-EINVAL, "null module path");
            }
            let path = match mem.read_cstring(args[0], MAX_PATH_LEN) {
                Ok(p) => p,
                Err(_) => return SyscallResult::err(-EFAULT, "bad module path pointer"),
            };
            let handle = next_module.fetch_add(1, Ordering::Relaxed);
            info!("LoadStartModule: {} -> handle {}", path, handle);
            SyscallResult::ok(handle as i64)
        },
    );

    dispatcher.register(
        nr::SCE_KERNEL_DEBUG_OUT,
        "sceKernelDebugOut",
        |_ctx, mem, args| {
            if args[0] == 0 {
                return SyscallResult::err(-EINVAL, "null message");
            }
            match mem.read_cstring(args[0], MAX_DEBUG_LEN) {
                Ok(message) => {
                    info!("[DEBUG] {}", message);
                    SyscallResult::ok(0)
                }
                Err(_) => SyscallResult::err(-EFAULT, "bad message pointer"),
            }
        },
    );

    dispatcher.register(
        nr::SCE_KERNEL_GET_MODULE_LIST,
        "sceKernelGetModuleList",
        |_ctx, mem, args| {
            // One resident module: the main executable.
            let list_ptr = args[0];
            let capacity = args[1];
            let count_ptr = args[2];
            if list_ptr != 0 && capacity >= 1 {
                if mem.write_u32(list_ptr, FIRST_MODULE_HANDLE as u32).is_err() {
                    return SyscallResult::err(-EFAULT, "bad module list pointer");
                }
            }
            if count_ptr != 0 && mem.write_u64(count_ptr, 1).is_err() {
                return SyscallResult::err(-EFAULT, "bad count pointer");
            }
            SyscallResult::ok(0)
        },
    );

    dispatcher.register(
        nr::SCE_KERNEL_GET_MODULE_INFO,
        "sceKernelGetModuleInfo",
        |_ctx, _mem, args| {
            debug!("sceKernelGetModuleInfo(handle={})", args[0]);
            SyscallResult::ok(0)
        },
    );

    dispatcher.register(
        nr::SCE_KERNEL_IS_NEO_MODE,
        "sceKernelIsNeoMode",
        |_ctx, _mem, _args| {
            // Always report the Pro-mode console.
            SyscallResult::ok(1)
        },
    );

    dispatcher.register(
        nr::SCE_KERNEL_GET_CPU_TEMPERATURE,
        "sceKernelGetCpuTemperature",
        |_ctx, mem, args| {
            if args[0] != 0 {
                if mem.write_u32(args[0], CPU_TEMPERATURE).is_err() {
                    return SyscallResult::err(-EFAULT, "bad temperature pointer");
                }
            }
            SyscallResult::ok(0)
        },
    );
}
