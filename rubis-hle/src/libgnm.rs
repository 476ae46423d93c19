// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GNM graphics syscalls: command-buffer submission into the PM4 parser.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use rubis_common::error::EFAULT;
use rubis_cpu::memory::MemoryAccess;
use rubis_gpu::{GnmProcessor, RenderQueue};
use rubis_kernel::syscall::{nr, SyscallDispatcher, SyscallResult};

/// Reported GPU core clock in MHz (Pro-model silicon).
const GPU_CORE_CLOCK_MHZ: i64 = 911;

/// Register the sceGnm handlers.
pub fn register_libgnm(
    dispatcher: &mut SyscallDispatcher,
    gnm: Arc<Mutex<GnmProcessor>>,
    queue: Arc<RenderQueue>,
) {
    let processor = gnm;
    dispatcher.register(
        nr::SCE_GNM_SUBMIT_COMMAND_BUFFERS,
        "sceGnmSubmitCommandBuffers",
        move |_ctx, mem, args| {
            let count = args[0] as u32;
            let buffers_ptr = args[1];
            let sizes_ptr = args[2];

            debug!("sceGnmSubmitCommandBuffers: count={}", count);

            let mem_ro: &dyn MemoryAccess = &*mem;
            let read_words = |addr: u64, out: &mut [u32]| -> bool {
                for (i, word) in out.iter_mut().enumerate() {
                    match mem_ro.read_u32(addr + i as u64 * 4) {
                        Ok(v) => *word = v,
                        Err(_) => return false,
                    }
                }
                true
            };

            let mut parser = processor.lock();
            for i in 0..count as u64 {
                let buffer_addr = match mem_ro.read_u64(buffers_ptr + i * 8) {
                    Ok(v) => v,
                    Err(_) => return SyscallResult::err(-EFAULT, "bad command buffer array"),
                };
                let size_bytes = match mem_ro.read_u32(sizes_ptr + i * 4) {
                    Ok(v) => v,
                    Err(_) => return SyscallResult::err(-EFAULT, "bad size array"),
                };
                let size_dwords = size_bytes / 4;

                debug!(
                    "  buffer[{}]: addr=0x{:X}, {} dwords",
                    i, buffer_addr, size_dwords
                );
                parser.process_command_buffer(&read_words, buffer_addr, size_dwords);
            }

            SyscallResult::ok(0)
        },
    );

    let q = queue;
    dispatcher.register(nr::SCE_GNM_SUBMIT_DONE, "sceGnmSubmitDone", move |_ctx, _mem, _args| {
        debug!("sceGnmSubmitDone");
        q.end_frame();
        SyscallResult::ok(0)
    });

    dispatcher.register(
        nr::SCE_GNM_GET_GPU_CORE_CLOCK_FREQUENCY,
        "sceGnmGetGpuCoreClockFrequency",
        |_ctx, _mem, _args| SyscallResult::ok(GPU_CORE_CLOCK_MHZ),
    );
}
