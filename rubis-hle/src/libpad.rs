// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Controller syscalls over the input registry.

use std::sync::Arc;

use log::debug;

use rubis_common::error::EFAULT;
use rubis_kernel::syscall::{nr, SyscallDispatcher, SyscallResult};

use crate::pad::{write_pad_data, InputManager};

/// Register the scePad handlers. scePadRead and scePadReadState share one
/// implementation; only a single controller is modeled.
pub fn register_libpad(dispatcher: &mut SyscallDispatcher, input: Arc<InputManager>) {
    let read_state = move |input: &InputManager,
                           mem: &mut dyn rubis_cpu::memory::MemoryAccess,
                           args: [u64; 6]| {
        let out_ptr = args[1];
        if out_ptr == 0 {
            return SyscallResult::err(-1, "null pad buffer");
        }
        let state = input.snapshot();
        let timestamp = input.timestamp_micros();
        match write_pad_data(mem, out_ptr, &state, timestamp) {
            Ok(()) => SyscallResult::ok(0),
            Err(_) => SyscallResult::err(-EFAULT, "bad pad buffer"),
        }
    };

    let i = input.clone();
    let rs = read_state;
    dispatcher.register(nr::SCE_PAD_READ_STATE, "scePadReadState", move |_ctx, mem, args| {
        rs(&i, mem, args)
    });

    let i = input.clone();
    dispatcher.register(nr::SCE_PAD_READ, "scePadRead", move |_ctx, mem, args| {
        read_state(&i, mem, args)
    });

    dispatcher.register(nr::SCE_PAD_OPEN, "scePadOpen", |_ctx, _mem, args| {
        debug!(
            "scePadOpen(user={}, type={}, index={})",
            args[0], args[1], args[2]
        );
        // Single controller: handle 0.
        SyscallResult::ok(0)
    });

    dispatcher.register(nr::SCE_PAD_CLOSE, "scePadClose", |_ctx, _mem, args| {
        debug!("scePadClose(handle={})", args[0]);
        SyscallResult::ok(0)
    });

    dispatcher.register(
        nr::SCE_PAD_SET_VIBRATION,
        "scePadSetVibration",
        |_ctx, _mem, args| {
            if args[1] > 0 || args[2] > 0 {
                debug!("scePadSetVibration: L={}, R={}", args[1], args[2]);
            }
            SyscallResult::ok(0)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pad::{HostKey, PadButton};
    use rubis_common::settings::InputLayout;
    use rubis_common::USER_BASE;
    use rubis_cpu::context::{reg, CpuContext};
    use rubis_cpu::memory::MemoryAccess;
    use rubis_cpu::SyscallHook;
    use rubis_kernel::GuestMemory;

    fn setup() -> (SyscallDispatcher, Arc<InputManager>, CpuContext, GuestMemory) {
        let mut d = SyscallDispatcher::new();
        let input = Arc::new(InputManager::new(InputLayout::Ijkl));
        register_libpad(&mut d, input.clone());
        (
            d,
            input,
            CpuContext::new(),
            GuestMemory::with_size(1 << 20).expect("test arena"),
        )
    }

    fn call(
        d: &SyscallDispatcher,
        ctx: &mut CpuContext,
        mem: &mut GuestMemory,
        num: u64,
        args: [u64; 6],
    ) -> i64 {
        ctx.set_rax(num);
        ctx.gpr[reg::RDI] = args[0];
        ctx.gpr[reg::RSI] = args[1];
        ctx.gpr[reg::RDX] = args[2];
        ctx.gpr[reg::R10] = args[3];
        ctx.gpr[reg::R8] = args[4];
        ctx.gpr[reg::R9] = args[5];
        d.dispatch(ctx, mem);
        ctx.rax() as i64
    }

    #[test]
    fn test_read_state_default_snapshot() {
        let (d, _input, mut ctx, mut mem) = setup();
        let buf = USER_BASE + 0x300;

        let r = call(&d, &mut ctx, &mut mem, nr::SCE_PAD_READ_STATE, [0, buf, 0, 0, 0, 0]);
        assert_eq!(r, 0);

        // No input events yet: zero buttons, all sticks centered (S5).
        assert_eq!(mem.read_u32(buf).unwrap(), 0);
        assert_eq!(mem.read_u8(buf + 0x04).unwrap(), 128);
        assert_eq!(mem.read_u8(buf + 0x05).unwrap(), 128);
        assert_eq!(mem.read_u8(buf + 0x06).unwrap(), 128);
        assert_eq!(mem.read_u8(buf + 0x07).unwrap(), 128);
        assert_eq!(mem.read_u8(buf + 0x4C).unwrap(), 1); // connected
    }

    #[test]
    fn test_read_state_reflects_input() {
        let (d, input, mut ctx, mut mem) = setup();
        input.handle_key(HostKey::K, true); // cross
        input.handle_key(HostKey::W, true); // stick up

        let buf = USER_BASE + 0x300;
        call(&d, &mut ctx, &mut mem, nr::SCE_PAD_READ_STATE, [0, buf, 0, 0, 0, 0]);

        assert_eq!(mem.read_u32(buf).unwrap(), PadButton::CROSS.bits());
        assert_eq!(mem.read_u8(buf + 0x05).unwrap(), 0); // ly pushed up
    }

    #[test]
    fn test_read_alias_behaves_identically() {
        let (d, _input, mut ctx, mut mem) = setup();
        let buf = USER_BASE + 0x300;
        assert_eq!(
            call(&d, &mut ctx, &mut mem, nr::SCE_PAD_READ, [0, buf, 0, 0, 0, 0]),
            0
        );
        assert_eq!(mem.read_u8(buf + 0x04).unwrap(), 128);
    }

    #[test]
    fn test_null_buffer_rejected() {
        let (d, _input, mut ctx, mut mem) = setup();
        assert_eq!(
            call(&d, &mut ctx, &mut mem, nr::SCE_PAD_READ_STATE, [0; 6]),
            -1
        );
    }

    #[test]
    fn test_open_close_vibration_are_stubs() {
        let (d, _input, mut ctx, mut mem) = setup();
        assert_eq!(call(&d, &mut ctx, &mut mem, nr::SCE_PAD_OPEN, [0; 6]), 0);
        assert_eq!(call(&d, &mut ctx, &mut mem, nr::SCE_PAD_CLOSE, [0; 6]), 0);
        assert_eq!(
            call(&d, &mut ctx, &mut mem, nr::SCE_PAD_SET_VIBRATION, [0, 128, 128, 0, 0, 0]),
            0
        );
    }
}
