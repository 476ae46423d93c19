// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fetch-decode-execute interpreter for the guest x86-64 CPU.
//!
//! The instruction subset covers what the boot payloads and smoke-test guests
//! exercise: immediate moves, stack ops, relative control flow, HLT, and
//! SYSCALL. Unknown opcodes are logged once and skipped so loose guest code
//! keeps running; memory faults stop execution with a `Faulted` state.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::context::CpuContext;
use crate::memory::{MemoryAccess, MemoryFault};

/// Sleep granularity while paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecState {
    Stopped = 0,
    Running = 1,
    Paused = 2,
    Halted = 3,
    Faulted = 4,
}

impl ExecState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Halted,
            4 => Self::Faulted,
            _ => Self::Stopped,
        }
    }
}

/// Shared, lock-free control block for the interpreter.
///
/// `pause`, `resume`, and `request_stop` may be called from any thread; the
/// run loop observes them between instructions only.
pub struct CpuControl {
    state: AtomicU8,
    should_stop: AtomicBool,
    instructions_retired: AtomicU64,
}

impl CpuControl {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ExecState::Stopped as u8),
            should_stop: AtomicBool::new(false),
            instructions_retired: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ExecState {
        ExecState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ExecState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Request a pause; takes effect between instructions.
    pub fn pause(&self) {
        let _ = self.state.compare_exchange(
            ExecState::Running as u8,
            ExecState::Paused as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Resume from a pause.
    pub fn resume(&self) {
        let _ = self.state.compare_exchange(
            ExecState::Paused as u8,
            ExecState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Ask the run loop to exit; the state becomes Stopped once it does.
    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    pub fn instructions_retired(&self) -> u64 {
        self.instructions_retired.load(Ordering::Relaxed)
    }

    /// Return to the Stopped state and clear the stop flag and counters.
    pub fn reset(&self) {
        self.should_stop.store(false, Ordering::Release);
        self.instructions_retired.store(0, Ordering::Relaxed);
        self.set_state(ExecState::Stopped);
    }
}

impl Default for CpuControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked when the guest executes SYSCALL (0F 05).
///
/// Handlers receive the live context and memory by mutable reference; they
/// must not re-enter the interpreter.
pub trait SyscallHook: Send + Sync {
    fn dispatch(&self, ctx: &mut CpuContext, mem: &mut dyn MemoryAccess);
}

/// The interpreter core.
///
/// The context lives behind a mutex so other threads can take by-value
/// snapshots between steps; the lock is held for the duration of one
/// instruction and never across a sleep.
pub struct Cpu {
    context: Arc<Mutex<CpuContext>>,
    control: Arc<CpuControl>,
    last_opcode: u8,
    unknown_seen: [bool; 256],
    unknown_0f_seen: [bool; 256],
    unsupported_mov_logged: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Self::with_shared(
            Arc::new(Mutex::new(CpuContext::new())),
            Arc::new(CpuControl::new()),
        )
    }

    /// Build an interpreter around externally shared context/control blocks.
    pub fn with_shared(context: Arc<Mutex<CpuContext>>, control: Arc<CpuControl>) -> Self {
        Self {
            context,
            control,
            last_opcode: 0,
            unknown_seen: [false; 256],
            unknown_0f_seen: [false; 256],
            unsupported_mov_logged: false,
        }
    }

    pub fn context_handle(&self) -> Arc<Mutex<CpuContext>> {
        self.context.clone()
    }

    pub fn control_handle(&self) -> Arc<CpuControl> {
        self.control.clone()
    }

    /// By-value copy of the register file.
    pub fn context_snapshot(&self) -> CpuContext {
        self.context.lock().clone()
    }

    pub fn last_opcode(&self) -> u8 {
        self.last_opcode
    }

    /// Reset context and control to the initial state.
    pub fn reset(&mut self) {
        self.context.lock().reset();
        self.control.reset();
        self.last_opcode = 0;
        debug!("CPU reset complete");
    }

    /// Execute one instruction. Returns the cycles consumed, or 0 on halt or
    /// fault (after which the state is Halted or Faulted respectively).
    pub fn step(&mut self, mem: &mut dyn MemoryAccess, hook: &dyn SyscallHook) -> u32 {
        let ctx = self.context.clone();
        let mut ctx = ctx.lock();
        match self.step_locked(&mut ctx, mem, hook) {
            Ok(cycles) => {
                if cycles > 0 {
                    self.control
                        .instructions_retired
                        .fetch_add(1, Ordering::Relaxed);
                }
                cycles
            }
            Err(fault) => {
                error!("memory fault at RIP=0x{:016X}: {}", ctx.rip, fault);
                self.control.set_state(ExecState::Faulted);
                0
            }
        }
    }

    /// Run until a stop is requested or `step` returns 0.
    ///
    /// Refuses to start unless the CPU is currently Stopped or Paused. While
    /// paused the loop idles in coarse sleeps; no suspension happens
    /// mid-instruction.
    pub fn run_loop(&mut self, mem: &mut dyn MemoryAccess, hook: &dyn SyscallHook) {
        match self.control.state() {
            ExecState::Stopped | ExecState::Paused => {}
            state => {
                warn!("run_loop refused: CPU is {:?}", state);
                return;
            }
        }

        info!(
            "starting execution at RIP=0x{:016X}",
            self.context.lock().rip
        );
        self.control.should_stop.store(false, Ordering::Release);
        self.control.set_state(ExecState::Running);

        loop {
            if self.control.stop_requested() {
                break;
            }
            if self.control.state() == ExecState::Paused {
                std::thread::sleep(PAUSE_POLL);
                continue;
            }
            if self.step(mem, hook) == 0 {
                break;
            }
        }

        info!(
            "execution stopped, instructions retired: {}",
            self.control.instructions_retired()
        );
        match self.control.state() {
            ExecState::Halted | ExecState::Faulted => {}
            _ => self.control.set_state(ExecState::Stopped),
        }
    }

    // -- Decode ------------------------------------------------------------

    fn step_locked(
        &mut self,
        ctx: &mut CpuContext,
        mem: &mut dyn MemoryAccess,
        hook: &dyn SyscallHook,
    ) -> Result<u32, MemoryFault> {
        let mut opcode = fetch_u8(ctx, mem)?;

        // REP/REPNE prefix: only meaningful here as F3 90 (PAUSE).
        if opcode == 0xF3 {
            opcode = fetch_u8(ctx, mem)?;
            if opcode == 0x90 {
                return Ok(1);
            }
        }

        // REX prefix (0x40-0x4F): extract W and B, then fetch the real opcode.
        let mut rex_w = false;
        let mut rex_b = false;
        if opcode & 0xF0 == 0x40 {
            rex_w = opcode & 0x08 != 0;
            rex_b = opcode & 0x01 != 0;
            opcode = fetch_u8(ctx, mem)?;
        }
        self.last_opcode = opcode;

        match opcode {
            // NOP
            0x90 => Ok(1),

            // RET: pop the return address.
            0xC3 => {
                let ret = mem.read_u64(ctx.rsp())?;
                ctx.set_rsp(ctx.rsp().wrapping_add(8));
                ctx.rip = ret;
                Ok(1)
            }

            // JMP rel32
            0xE9 => {
                let offset = fetch_u32(ctx, mem)? as i32;
                ctx.rip = ctx.rip.wrapping_add(offset as i64 as u64);
                Ok(1)
            }

            // CALL rel32: push the post-displacement RIP, then jump.
            0xE8 => {
                let offset = fetch_u32(ctx, mem)? as i32;
                ctx.set_rsp(ctx.rsp().wrapping_sub(8));
                mem.write_u64(ctx.rsp(), ctx.rip)?;
                ctx.rip = ctx.rip.wrapping_add(offset as i64 as u64);
                Ok(1)
            }

            // HLT
            0xF4 => {
                info!("HLT at RIP=0x{:016X}", ctx.rip.wrapping_sub(1));
                self.control.set_state(ExecState::Halted);
                Ok(0)
            }

            // PUSH r64
            0x50..=0x57 => {
                let r = (opcode - 0x50) as usize + if rex_b { 8 } else { 0 };
                ctx.set_rsp(ctx.rsp().wrapping_sub(8));
                mem.write_u64(ctx.rsp(), ctx.gpr[r])?;
                Ok(1)
            }

            // POP r64
            0x58..=0x5F => {
                let r = (opcode - 0x58) as usize + if rex_b { 8 } else { 0 };
                ctx.gpr[r] = mem.read_u64(ctx.rsp())?;
                ctx.set_rsp(ctx.rsp().wrapping_add(8));
                Ok(1)
            }

            // MOV r64, imm64 (REX.W) / MOV r32, imm32 zero-extended.
            0xB8..=0xBF => {
                let r = (opcode - 0xB8) as usize + if rex_b { 8 } else { 0 };
                if rex_w {
                    ctx.gpr[r] = fetch_u64(ctx, mem)?;
                } else {
                    ctx.gpr[r] = fetch_u32(ctx, mem)? as u64;
                }
                Ok(1)
            }

            // MOV r/m, imm32 — register-direct form only.
            0xC7 => {
                let modrm = fetch_u8(ctx, mem)?;
                if modrm >> 6 == 0b11 {
                    let r = (modrm & 0x07) as usize + if rex_b { 8 } else { 0 };
                    let imm = fetch_u32(ctx, mem)?;
                    // REX.W sign-extends the 32-bit immediate to 64 bits.
                    ctx.gpr[r] = if rex_w {
                        imm as i32 as i64 as u64
                    } else {
                        imm as u64
                    };
                } else if !self.unsupported_mov_logged {
                    self.unsupported_mov_logged = true;
                    warn!(
                        "MOV r/m, imm32 with memory operand (modrm=0x{:02X}) at \
                         RIP=0x{:016X} is not supported, skipping",
                        modrm, ctx.rip
                    );
                }
                Ok(1)
            }

            // Two-byte opcodes.
            0x0F => {
                let opcode2 = fetch_u8(ctx, mem)?;
                match opcode2 {
                    // SYSCALL
                    0x05 => {
                        hook.dispatch(ctx, mem);
                        Ok(1)
                    }
                    _ => {
                        if !self.unknown_0f_seen[opcode2 as usize] {
                            self.unknown_0f_seen[opcode2 as usize] = true;
                            warn!(
                                "unknown two-byte opcode 0F {:02X} at RIP=0x{:016X}",
                                opcode2,
                                ctx.rip.wrapping_sub(2)
                            );
                        }
                        Ok(1)
                    }
                }
            }

            _ => {
                if !self.unknown_seen[opcode as usize] {
                    self.unknown_seen[opcode as usize] = true;
                    warn!(
                        "unknown opcode 0x{:02X} at RIP=0x{:016X}, skipping",
                        opcode,
                        ctx.rip.wrapping_sub(1)
                    );
                }
                Ok(1)
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

// -- Fetch helpers: advance RIP as bytes are consumed -----------------------

#[inline]
fn fetch_u8(ctx: &mut CpuContext, mem: &dyn MemoryAccess) -> Result<u8, MemoryFault> {
    let v = mem.read_u8(ctx.rip)?;
    ctx.rip = ctx.rip.wrapping_add(1);
    Ok(v)
}

#[inline]
fn fetch_u32(ctx: &mut CpuContext, mem: &dyn MemoryAccess) -> Result<u32, MemoryFault> {
    let v = mem.read_u32(ctx.rip)?;
    ctx.rip = ctx.rip.wrapping_add(4);
    Ok(v)
}

#[inline]
fn fetch_u64(ctx: &mut CpuContext, mem: &dyn MemoryAccess) -> Result<u64, MemoryFault> {
    let v = mem.read_u64(ctx.rip)?;
    ctx.rip = ctx.rip.wrapping_add(8);
    Ok(v)
}
