// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! High-level syscall dispatch.
//!
//! The guest enters through SYSCALL with the number in RAX and arguments in
//! RDI, RSI, RDX, R10, R8, R9 (System V AMD64 syscall convention — R10
//! stands in for RCX). Handlers are boxed closures keyed by number; the
//! handler's result value is marshalled back into RAX. Unregistered numbers
//! are logged once, counted, and answered with 0 so loose guest code keeps
//! running.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use rubis_cpu::context::CpuContext;
use rubis_cpu::memory::MemoryAccess;
use rubis_cpu::SyscallHook;

/// Maximum guest string lengths per argument class.
pub const MAX_PATH_LEN: usize = 256;
pub const MAX_DEBUG_LEN: usize = 1024;
pub const MAX_WRITE_LEN: usize = 4096;

/// Well-known syscall numbers (FreeBSD base + console extensions).
pub mod nr {
    pub const SYS_EXIT: u64 = 1;
    pub const SYS_READ: u64 = 3;
    pub const SYS_WRITE: u64 = 4;
    pub const SYS_OPEN: u64 = 5;
    pub const SYS_CLOSE: u64 = 6;
    pub const SYS_UNLINK: u64 = 10;
    pub const SYS_GETPID: u64 = 20;
    pub const SYS_GETUID: u64 = 24;
    pub const SYS_IOCTL: u64 = 54;
    pub const SYS_MUNMAP: u64 = 73;
    pub const SYS_MPROTECT: u64 = 74;
    pub const SYS_STAT: u64 = 188;
    pub const SYS_FSTAT: u64 = 189;
    pub const SYS_NANOSLEEP: u64 = 240;
    pub const SYS_GETDENTS: u64 = 272;
    pub const SYS_MMAP: u64 = 477;
    pub const SYS_LSEEK: u64 = 478;

    pub const SCE_AUDIO_OUT_INIT: u64 = 495;
    pub const SCE_AUDIO_OUT_OPEN: u64 = 496;
    pub const SCE_AUDIO_OUT_CLOSE: u64 = 497;
    pub const SCE_AUDIO_OUT_OUTPUT: u64 = 498;
    pub const SCE_AUDIO_OUT_OUTPUTS: u64 = 499;
    pub const SCE_AUDIO_OUT_SET_VOLUME: u64 = 500;
    pub const SCE_AUDIO_OUT_GET_PORT_STATE: u64 = 501;
    pub const SCE_AUDIO_OUT_GET_SYSTEM_STATE: u64 = 502;

    pub const SCE_PAD_READ: u64 = 570;
    pub const SCE_PAD_READ_STATE: u64 = 571;
    pub const SCE_PAD_OPEN: u64 = 572;
    pub const SCE_PAD_CLOSE: u64 = 573;
    pub const SCE_PAD_SET_VIBRATION: u64 = 575;

    pub const SCE_GNM_SUBMIT_COMMAND_BUFFERS: u64 = 591;
    pub const SCE_KERNEL_LOAD_START_MODULE: u64 = 594;
    pub const SCE_KERNEL_DEBUG_OUT: u64 = 602;
    pub const SCE_KERNEL_GET_MODULE_LIST: u64 = 611;
    pub const SCE_KERNEL_GET_MODULE_INFO: u64 = 612;
    pub const SCE_GNM_SUBMIT_DONE: u64 = 614;
    pub const SCE_KERNEL_IS_NEO_MODE: u64 = 618;
    pub const SCE_KERNEL_GET_CPU_TEMPERATURE: u64 = 621;
    pub const SCE_GNM_GET_GPU_CORE_CLOCK_FREQUENCY: u64 = 626;
}

/// Result of one HLE handler invocation.
///
/// `value` is written to RAX verbatim; a negative errno-style value is the
/// conventional failure shape. `error` is logged when `success` is false.
pub struct SyscallResult {
    pub value: i64,
    pub success: bool,
    pub error: String,
}

impl SyscallResult {
    pub fn ok(value: i64) -> Self {
        Self {
            value,
            success: true,
            error: String::new(),
        }
    }

    pub fn err(value: i64, error: impl Into<String>) -> Self {
        Self {
            value,
            success: false,
            error: error.into(),
        }
    }
}

/// Handler signature: context, guest memory, six raw arguments.
pub type SyscallFn =
    dyn Fn(&mut CpuContext, &mut dyn MemoryAccess, [u64; 6]) -> SyscallResult + Send + Sync;

struct SyscallEntry {
    name: &'static str,
    handler: Box<SyscallFn>,
}

/// Number-keyed handler table.
pub struct SyscallDispatcher {
    handlers: HashMap<u64, SyscallEntry>,
    unimplemented_logged: Mutex<HashSet<u64>>,
    total_calls: AtomicU64,
    unimplemented_calls: AtomicU64,
}

impl SyscallDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            unimplemented_logged: Mutex::new(HashSet::new()),
            total_calls: AtomicU64::new(0),
            unimplemented_calls: AtomicU64::new(0),
        }
    }

    /// Register a handler. Re-registering a number replaces the previous
    /// handler.
    pub fn register<F>(&mut self, number: u64, name: &'static str, handler: F)
    where
        F: Fn(&mut CpuContext, &mut dyn MemoryAccess, [u64; 6]) -> SyscallResult
            + Send
            + Sync
            + 'static,
    {
        if self.handlers.contains_key(&number) {
            debug!("syscall {} ({}) re-registered", name, number);
        }
        self.handlers.insert(
            number,
            SyscallEntry {
                name,
                handler: Box::new(handler),
            },
        );
    }

    pub fn is_registered(&self, number: u64) -> bool {
        self.handlers.contains_key(&number)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn unimplemented_calls(&self) -> u64 {
        self.unimplemented_calls.load(Ordering::Relaxed)
    }

    /// Name of a syscall number for log lines.
    pub fn syscall_name(&self, number: u64) -> String {
        match self.handlers.get(&number) {
            Some(entry) => entry.name.to_string(),
            None => format!("syscall_{}", number),
        }
    }

    fn dispatch_inner(&self, ctx: &mut CpuContext, mem: &mut dyn MemoryAccess) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);

        let number = ctx.rax();
        let args = ctx.syscall_args();

        match self.handlers.get(&number) {
            Some(entry) => {
                let result = (entry.handler)(ctx, mem, args);
                ctx.set_rax(result.value as u64);
                if result.success {
                    debug!("{}({}) -> {}", entry.name, number, result.value);
                } else {
                    warn!("{}: {}", entry.name, result.error);
                }
            }
            None => {
                self.unimplemented_calls.fetch_add(1, Ordering::Relaxed);
                if self.unimplemented_logged.lock().insert(number) {
                    warn!("unimplemented syscall {} ({})", self.syscall_name(number), number);
                }
                // Permissive default keeps loose guest code alive.
                ctx.set_rax(0);
            }
        }
    }
}

impl SyscallHook for SyscallDispatcher {
    fn dispatch(&self, ctx: &mut CpuContext, mem: &mut dyn MemoryAccess) {
        self.dispatch_inner(ctx, mem);
    }
}

impl Default for SyscallDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
