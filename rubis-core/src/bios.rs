// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Internal BIOS: a synthetic guest payload for booting without a game file.
//!
//! The program prints a banner through sys_write, initializes the audio
//! subsystem, then idles in a pad-read loop. The byte sequence matches the
//! instruction forms the interpreter implements (REX.W C7 /0 immediate
//! moves, REX.W B8+r 64-bit moves, SYSCALL, PAUSE, JMP rel32).

use rubis_common::{STACK_TOP, USER_BASE, VAddr};
use rubis_cpu::context::CpuContext;
use rubis_cpu::memory::{MemoryAccess, MemoryFault};
use rubis_kernel::syscall::nr;
use rubis_kernel::GuestMemory;

/// Guest address the BIOS is written to (and its entry point).
pub const BIOS_ENTRY: VAddr = USER_BASE;
/// Guest address of the banner string.
const STRING_ADDR: VAddr = USER_BASE + 0x200;
/// Guest scratch buffer the idle loop reads pad state into.
const PAD_BUFFER_ADDR: VAddr = USER_BASE + 0x300;

/// The banner the boot program prints.
pub const BOOT_MESSAGE: &str = "WeaR-emu Internal BIOS v1.0\n";

/// MOV r64, imm32 (sign-extended): REX.W C7 /0 with a register-direct ModRM.
fn emit_mov_imm32(code: &mut Vec<u8>, modrm: u8, value: u32) {
    code.extend_from_slice(&[0x48, 0xC7, modrm]);
    code.extend_from_slice(&value.to_le_bytes());
}

/// MOV RSI, imm64: REX.W B8+6.
fn emit_mov_rsi_imm64(code: &mut Vec<u8>, value: u64) {
    code.extend_from_slice(&[0x48, 0xBE]);
    code.extend_from_slice(&value.to_le_bytes());
}

fn emit_syscall(code: &mut Vec<u8>) {
    code.extend_from_slice(&[0x0F, 0x05]);
}

/// Assemble the boot program.
fn assemble() -> Vec<u8> {
    const MODRM_RAX: u8 = 0xC0;
    const MODRM_RDX: u8 = 0xC2;
    const MODRM_RDI: u8 = 0xC7;

    let mut code = Vec::new();

    // sys_write(1, BOOT_MESSAGE, len)
    emit_mov_imm32(&mut code, MODRM_RAX, nr::SYS_WRITE as u32);
    emit_mov_imm32(&mut code, MODRM_RDI, 1);
    emit_mov_rsi_imm64(&mut code, STRING_ADDR);
    emit_mov_imm32(&mut code, MODRM_RDX, BOOT_MESSAGE.len() as u32);
    emit_syscall(&mut code);

    // sceAudioOutInit()
    emit_mov_imm32(&mut code, MODRM_RAX, nr::SCE_AUDIO_OUT_INIT as u32);
    emit_syscall(&mut code);

    // Idle loop: scePadReadState(0, PAD_BUFFER_ADDR); PAUSE; repeat.
    let loop_start = code.len();
    emit_mov_imm32(&mut code, MODRM_RAX, nr::SCE_PAD_READ_STATE as u32);
    emit_mov_imm32(&mut code, MODRM_RDI, 0);
    emit_mov_rsi_imm64(&mut code, PAD_BUFFER_ADDR);
    emit_syscall(&mut code);
    code.extend_from_slice(&[0xF3, 0x90]); // PAUSE

    // JMP rel32 back to the loop head.
    let offset = loop_start as i64 - (code.len() as i64 + 5);
    code.push(0xE9);
    code.extend_from_slice(&(offset as i32).to_le_bytes());

    code
}

/// Write the BIOS into guest memory and prime the CPU context.
/// Returns the entry point.
pub fn load(memory: &mut GuestMemory, ctx: &mut CpuContext) -> Result<VAddr, MemoryFault> {
    let mut banner = BOOT_MESSAGE.as_bytes().to_vec();
    banner.push(0);
    memory.write_block(STRING_ADDR, &banner)?;

    memory.write_block(BIOS_ENTRY, &assemble())?;

    ctx.reset();
    ctx.rip = BIOS_ENTRY;
    ctx.set_rsp(STACK_TOP - 0x1000);
    ctx.set_rbp(STACK_TOP - 0x1000);

    Ok(BIOS_ENTRY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_writes_expected_prologue() {
        let mut mem = GuestMemory::with_size(1 << 24).unwrap();
        let mut ctx = CpuContext::new();
        let entry = load(&mut mem, &mut ctx).expect("bios load");
        assert_eq!(entry, 0x40_0000);

        // MOV RAX, 4 (sys_write) is the first instruction.
        let mut head = [0u8; 7];
        mem.read_block(entry, &mut head).unwrap();
        assert_eq!(head, [0x48, 0xC7, 0xC0, 0x04, 0x00, 0x00, 0x00]);

        // Banner string present and NUL-terminated.
        let text = mem.read_cstring(0x40_0200, 64).unwrap();
        assert_eq!(text, BOOT_MESSAGE);
    }

    #[test]
    fn test_context_primed() {
        let mut mem = GuestMemory::with_size(1 << 24).unwrap();
        let mut ctx = CpuContext::new();
        load(&mut mem, &mut ctx).unwrap();
        assert_eq!(ctx.rip, 0x40_0000);
        assert_eq!(ctx.rsp(), STACK_TOP - 0x1000);
        assert_eq!(ctx.gpr[rubis_cpu::context::reg::RBP], STACK_TOP - 0x1000);
        assert_eq!(ctx.rflags, 0x202);
    }

    #[test]
    fn test_loop_jump_targets_loop_head() {
        let code = assemble();
        // The last 5 bytes are the JMP rel32.
        let jmp_at = code.len() - 5;
        assert_eq!(code[jmp_at], 0xE9);
        let rel = i32::from_le_bytes(code[jmp_at + 1..].try_into().unwrap());
        let next_rip = code.len() as i64;
        let target = next_rip + rel as i64;
        // The loop head is the MOV RAX, 571 after the audio-init SYSCALL.
        assert_eq!(
            &code[target as usize..target as usize + 3],
            &[0x48, 0xC7, 0xC0]
        );
        assert_eq!(
            u32::from_le_bytes(code[target as usize + 3..target as usize + 7].try_into().unwrap()),
            571
        );
    }
}
