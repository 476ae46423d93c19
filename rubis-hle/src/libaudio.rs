// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio output syscalls over the port registry.

use std::sync::Arc;

use log::debug;

use rubis_common::error::EFAULT;
use rubis_kernel::syscall::{nr, SyscallDispatcher, SyscallResult};

use crate::audio::{AudioOutManager, DEFAULT_GRAIN, FRAME_SIZE};

/// Register the sceAudioOut handlers.
pub fn register_libaudio(dispatcher: &mut SyscallDispatcher, audio: Arc<AudioOutManager>) {
    let a = audio.clone();
    dispatcher.register(nr::SCE_AUDIO_OUT_INIT, "sceAudioOutInit", move |_ctx, _mem, _args| {
        debug!("sceAudioOutInit");
        if a.init() {
            SyscallResult::ok(0)
        } else {
            SyscallResult::err(-1, "audio init failed")
        }
    });

    let a = audio.clone();
    dispatcher.register(nr::SCE_AUDIO_OUT_OPEN, "sceAudioOutOpen", move |_ctx, _mem, args| {
        // (userId, type, index, len, freq, param)
        let port_type = args[1] as i32;
        let sample_count = args[3] as u32;
        let freq = args[4] as u32;
        let handle = a.open_port(port_type, sample_count, freq);
        debug!(
            "sceAudioOutOpen: type={}, len={}, freq={} -> handle={}",
            port_type, sample_count, freq, handle
        );
        if handle >= 0 {
            SyscallResult::ok(handle as i64)
        } else {
            SyscallResult::err(handle as i64, "audio port open failed")
        }
    });

    let a = audio.clone();
    dispatcher.register(nr::SCE_AUDIO_OUT_CLOSE, "sceAudioOutClose", move |_ctx, _mem, args| {
        let result = a.close_port(args[0] as i32);
        if result == 0 {
            SyscallResult::ok(0)
        } else {
            SyscallResult::err(result as i64, format!("bad audio handle {}", args[0]))
        }
    });

    let a = audio.clone();
    let output_handler = move |mem: &mut dyn rubis_cpu::memory::MemoryAccess, args: [u64; 6]| {
        let handle = args[0] as i32;
        let ptr = args[1];
        if ptr == 0 {
            return SyscallResult::err(-1, "null PCM pointer");
        }

        let sample_count = a.port_sample_count(handle).unwrap_or(DEFAULT_GRAIN);
        let data_size = sample_count as usize * FRAME_SIZE;

        let mut pcm = vec![0u8; data_size];
        if mem.read_block(ptr, &mut pcm).is_err() {
            return SyscallResult::err(-EFAULT, "bad PCM pointer");
        }

        let result = a.output(handle, &pcm);
        if result == 0 {
            SyscallResult::ok(0)
        } else {
            SyscallResult::err(result as i64, format!("audio output failed on {}", handle))
        }
    };

    let out = output_handler.clone();
    dispatcher.register(nr::SCE_AUDIO_OUT_OUTPUT, "sceAudioOutOutput", move |_ctx, mem, args| {
        out(mem, args)
    });

    // Multi-port submit is treated as a single-port submit.
    dispatcher.register(
        nr::SCE_AUDIO_OUT_OUTPUTS,
        "sceAudioOutOutputs",
        move |_ctx, mem, args| output_handler(mem, args),
    );

    let a = audio.clone();
    dispatcher.register(
        nr::SCE_AUDIO_OUT_SET_VOLUME,
        "sceAudioOutSetVolume",
        move |_ctx, mem, args| {
            // (handle, flags, volume_ptr); guest volume range is 0..32767.
            let mut volume = 1.0f32;
            if args[2] != 0 {
                match mem.read_u32(args[2]) {
                    Ok(raw) => volume = raw as i32 as f32 / 32767.0,
                    Err(_) => return SyscallResult::err(-EFAULT, "bad volume pointer"),
                }
            }
            let result = a.set_volume(args[0] as i32, volume);
            if result == 0 {
                SyscallResult::ok(0)
            } else {
                SyscallResult::err(result as i64, format!("bad audio handle {}", args[0]))
            }
        },
    );

    dispatcher.register(
        nr::SCE_AUDIO_OUT_GET_PORT_STATE,
        "sceAudioOutGetPortState",
        |_ctx, mem, args| {
            if args[1] != 0 {
                // state = active, no error.
                if mem.write_u32(args[1], 1).is_err() || mem.write_u32(args[1] + 4, 0).is_err() {
                    return SyscallResult::err(-EFAULT, "bad port state pointer");
                }
            }
            SyscallResult::ok(0)
        },
    );

    dispatcher.register(
        nr::SCE_AUDIO_OUT_GET_SYSTEM_STATE,
        "sceAudioOutGetSystemState",
        |_ctx, mem, args| {
            if args[0] != 0 && mem.write_u32(args[0], 1).is_err() {
                return SyscallResult::err(-EFAULT, "bad system state pointer");
            }
            SyscallResult::ok(0)
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubis_common::USER_BASE;
    use rubis_cpu::context::{reg, CpuContext};
    use rubis_cpu::memory::MemoryAccess;
    use rubis_cpu::SyscallHook;
    use rubis_kernel::GuestMemory;

    fn setup() -> (SyscallDispatcher, Arc<AudioOutManager>, CpuContext, GuestMemory) {
        let mut d = SyscallDispatcher::new();
        let audio = Arc::new(AudioOutManager::new());
        register_libaudio(&mut d, audio.clone());
        (
            d,
            audio,
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
    fn test_init_open_output_close_flow() {
        let (d, audio, mut ctx, mut mem) = setup();

        assert_eq!(call(&d, &mut ctx, &mut mem, nr::SCE_AUDIO_OUT_INIT, [0; 6]), 0);
        assert!(audio.is_initialized());

        // Open: user 0, type MAIN, index 0, 64 samples, 48 kHz.
        let handle = call(
            &d,
            &mut ctx,
            &mut mem,
            nr::SCE_AUDIO_OUT_OPEN,
            [0, 0, 0, 64, 48_000, 0],
        );
        assert_eq!(handle, 1);

        let n = call(
            &d,
            &mut ctx,
            &mut mem,
            nr::SCE_AUDIO_OUT_OUTPUT,
            [handle as u64, USER_BASE, 0, 0, 0, 0],
        );
        assert_eq!(n, 0);
        assert_eq!(audio.frames_output(1), Some(64));

        assert_eq!(
            call(
                &d,
                &mut ctx,
                &mut mem,
                nr::SCE_AUDIO_OUT_CLOSE,
                [handle as u64, 0, 0, 0, 0, 0]
            ),
            0
        );
        assert_eq!(audio.port_count(), 0);
    }

    #[test]
    fn test_output_null_pointer_fails() {
        let (d, _audio, mut ctx, mut mem) = setup();
        let r = call(&d, &mut ctx, &mut mem, nr::SCE_AUDIO_OUT_OUTPUT, [1, 0, 0, 0, 0, 0]);
        assert_eq!(r, -1);
    }

    #[test]
    fn test_set_volume_reads_guest_value() {
        let (d, _audio, mut ctx, mut mem) = setup();
        let handle = call(
            &d,
            &mut ctx,
            &mut mem,
            nr::SCE_AUDIO_OUT_OPEN,
            [0, 0, 0, 16, 48_000, 0],
        );
        let vol_ptr = USER_BASE + 0x10;
        mem.write_u32(vol_ptr, 16384).unwrap();
        assert_eq!(
            call(
                &d,
                &mut ctx,
                &mut mem,
                nr::SCE_AUDIO_OUT_SET_VOLUME,
                [handle as u64, 0, vol_ptr, 0, 0, 0]
            ),
            0
        );
    }

    #[test]
    fn test_port_and_system_state() {
        let (d, _audio, mut ctx, mut mem) = setup();
        let state_ptr = USER_BASE + 0x20;
        assert_eq!(
            call(
                &d,
                &mut ctx,
                &mut mem,
                nr::SCE_AUDIO_OUT_GET_PORT_STATE,
                [1, state_ptr, 0, 0, 0, 0]
            ),
            0
        );
        assert_eq!(mem.read_u32(state_ptr).unwrap(), 1);
        assert_eq!(mem.read_u32(state_ptr + 4).unwrap(), 0);

        let sys_ptr = USER_BASE + 0x40;
        assert_eq!(
            call(
                &d,
                &mut ctx,
                &mut mem,
                nr::SCE_AUDIO_OUT_GET_SYSTEM_STATE,
                [sys_ptr, 0, 0, 0, 0, 0]
            ),
            0
        );
        assert_eq!(mem.read_u32(sys_ptr).unwrap(), 1);
    }
}
