// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! GNM command-buffer processor.
//!
//! Walks a guest command buffer as a sequence of 32-bit words, interprets
//! PM4 Type-3 packets, tracks the minimal pipeline state the draw packets
//! need, and emits abstract commands to the render queue.
//!
//! Guest memory is reached through a word-read closure so this crate stays
//! independent of the memory arena; the GNM submit handler supplies one.

use std::sync::Arc;

use log::{debug, trace, warn};

use crate::pm4::{opcode, opcode_name, PacketHeader};
use crate::render_queue::{RenderCommand, RenderQueue};

/// Recursion cap for nested indirect buffers.
const MAX_INDIRECT_DEPTH: u32 = 16;

// SH register offsets (relative to the 0x2C00 SH base) for shader program
// address updates the tracker cares about.
const SH_REG_BASE: u32 = 0x2C00;
const SPI_SHADER_PGM_LO_PS: u32 = 0x2C08;
const SPI_SHADER_PGM_HI_PS: u32 = 0x2C09;
const SPI_SHADER_PGM_LO_VS: u32 = 0x2C48;
const SPI_SHADER_PGM_HI_VS: u32 = 0x2C49;
const COMPUTE_PGM_LO: u32 = 0x2E0C;
const COMPUTE_PGM_HI: u32 = 0x2E0D;

/// Reads `out.len()` consecutive 32-bit words from a guest address.
/// Returns false when the range is not readable.
pub type ReadWords<'a> = &'a dyn Fn(u64, &mut [u32]) -> bool;

/// Pipeline state tracked between packets.
///
/// Mutated only by the parser; snapshotted into emitted commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedState {
    pub index_buffer_addr: u64,
    /// 0 = 16-bit indices, 1 = 32-bit.
    pub index_type: u32,
    pub instance_count: u32,
    pub primitive_type: u32,
    pub vs_shader_addr: u64,
    pub ps_shader_addr: u64,
    pub cs_shader_addr: u64,
}

impl Default for TrackedState {
    fn default() -> Self {
        Self {
            index_buffer_addr: 0,
            index_type: 0,
            instance_count: 1,
            primitive_type: 4,
            vs_shader_addr: 0,
            ps_shader_addr: 0,
            cs_shader_addr: 0,
        }
    }
}

/// PM4 Type-3 packet walker.
pub struct GnmProcessor {
    queue: Arc<RenderQueue>,
    state: TrackedState,
    packets_processed: u64,
    draw_calls: u64,
}

impl GnmProcessor {
    pub fn new(queue: Arc<RenderQueue>) -> Self {
        Self {
            queue,
            state: TrackedState::default(),
            packets_processed: 0,
            draw_calls: 0,
        }
    }

    pub fn tracked_state(&self) -> &TrackedState {
        &self.state
    }

    pub fn packets_processed(&self) -> u64 {
        self.packets_processed
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Reset tracked state between buffer groups.
    pub fn reset_state(&mut self) {
        self.state = TrackedState::default();
    }

    /// Parse one command buffer of `size_dw` 32-bit words at `addr`.
    pub fn process_command_buffer(&mut self, read: ReadWords, addr: u64, size_dw: u32) {
        self.process_at_depth(read, addr, size_dw, 0);
    }

    fn process_at_depth(&mut self, read: ReadWords, addr: u64, size_dw: u32, depth: u32) {
        if depth > MAX_INDIRECT_DEPTH {
            warn!(
                "indirect buffer nesting exceeds {} levels at 0x{:X}, aborting",
                MAX_INDIRECT_DEPTH, addr
            );
            return;
        }

        let mut offset: u32 = 0;
        while offset < size_dw {
            let mut word = [0u32; 1];
            if !read(addr + offset as u64 * 4, &mut word) {
                warn!("command buffer read failed at 0x{:X}", addr + offset as u64 * 4);
                return;
            }
            let header = PacketHeader(word[0]);
            offset += 1;

            if !header.is_type3() {
                trace!(
                    "skipping non-Type3 packet (type={}) at word {}",
                    header.packet_type(),
                    offset - 1
                );
                continue;
            }

            let payload_len = header.payload_len();
            if offset + payload_len > size_dw {
                warn!(
                    "packet {} overflows buffer at word {} (payload {} of {} words left)",
                    opcode_name(header.opcode()),
                    offset - 1,
                    payload_len,
                    size_dw - offset
                );
                return;
            }

            let mut payload = vec![0u32; payload_len as usize];
            if !read(addr + offset as u64 * 4, &mut payload) {
                warn!("payload read failed at 0x{:X}", addr + offset as u64 * 4);
                return;
            }

            self.handle_packet(read, header.opcode(), &payload, depth);

            offset += payload_len;
            self.packets_processed += 1;
        }
    }

    fn handle_packet(&mut self, read: ReadWords, op: u8, payload: &[u32], depth: u32) {
        match op {
            // Timing/alignment filler.
            opcode::IT_NOP => {}

            // Pipeline context reset markers; state is not modeled.
            opcode::IT_CONTEXT_CONTROL | opcode::IT_CLEAR_STATE => {}

            opcode::IT_INDEX_TYPE => {
                if let Some(&v) = payload.first() {
                    self.state.index_type = v & 0x3;
                }
            }

            opcode::IT_NUM_INSTANCES => {
                if let Some(&v) = payload.first() {
                    self.state.instance_count = v;
                }
            }

            opcode::IT_DRAW_INDEX_AUTO => {
                if payload.len() < 2 {
                    return;
                }
                let vertex_count = payload[0];
                debug!(
                    "DRAW_INDEX_AUTO: vertices={}, instances={}",
                    vertex_count, self.state.instance_count
                );
                self.queue.push(RenderCommand::Draw {
                    vertex_count,
                    instance_count: self.state.instance_count,
                    first_vertex: 0,
                    first_instance: 0,
                });
                self.draw_calls += 1;
            }

            opcode::IT_DRAW_INDEX_2 => {
                if payload.len() < 4 {
                    return;
                }
                let index_buffer_addr = payload[1] as u64 | ((payload[2] as u64) << 32);
                let index_count = payload[3];
                self.state.index_buffer_addr = index_buffer_addr;
                debug!(
                    "DRAW_INDEX_2: indices={}, buffer=0x{:X}",
                    index_count, index_buffer_addr
                );
                self.queue.push(RenderCommand::DrawIndexed {
                    index_count,
                    instance_count: self.state.instance_count,
                    first_index: 0,
                    vertex_offset: 0,
                    index_type: self.state.index_type,
                    index_buffer_address: index_buffer_addr,
                });
                self.draw_calls += 1;
            }

            opcode::IT_DISPATCH_DIRECT => {
                if payload.len() < 3 {
                    return;
                }
                debug!(
                    "DISPATCH_DIRECT: groups={}x{}x{}",
                    payload[0], payload[1], payload[2]
                );
                self.queue.push(RenderCommand::ComputeDispatch {
                    x: payload[0],
                    y: payload[1],
                    z: payload[2],
                });
            }

            opcode::IT_INDIRECT_BUFFER => {
                if payload.len() < 3 {
                    return;
                }
                let nested_addr = payload[0] as u64 | (((payload[1] & 0xFFFF) as u64) << 32);
                let nested_size = payload[2] & 0xF_FFFF;
                debug!(
                    "INDIRECT_BUFFER: addr=0x{:X}, size={} words",
                    nested_addr, nested_size
                );
                self.process_at_depth(read, nested_addr, nested_size, depth + 1);
            }

            // Barrier-class packets: accepted, nothing to synchronize against.
            opcode::IT_EVENT_WRITE
            | opcode::IT_EVENT_WRITE_EOP
            | opcode::IT_ACQUIRE_MEM
            | opcode::IT_RELEASE_MEM => {}

            opcode::IT_SET_SH_REG => {
                self.handle_set_sh_reg(payload);
            }

            opcode::IT_SET_CONTEXT_REG | opcode::IT_SET_UCONFIG_REG => {
                if let Some(&reg) = payload.first() {
                    trace!(
                        "{}: reg base 0x{:04X}, {} values",
                        opcode_name(op),
                        reg & 0xFFFF,
                        payload.len().saturating_sub(1)
                    );
                }
            }

            _ => {
                debug!("ignoring PM4 opcode 0x{:02X} ({})", op, opcode_name(op));
            }
        }
    }

    /// SH register writes carry shader program addresses; the low/high
    /// register pairs are folded into the tracked per-stage addresses
    /// (the hardware stores them shifted right by 8).
    fn handle_set_sh_reg(&mut self, payload: &[u32]) {
        if payload.len() < 2 {
            return;
        }
        let base = SH_REG_BASE + (payload[0] & 0xFFFF);
        for (i, &value) in payload[1..].iter().enumerate() {
            let reg = base + i as u32;
            match reg {
                SPI_SHADER_PGM_LO_PS => set_addr_lo(&mut self.state.ps_shader_addr, value),
                SPI_SHADER_PGM_HI_PS => set_addr_hi(&mut self.state.ps_shader_addr, value),
                SPI_SHADER_PGM_LO_VS => set_addr_lo(&mut self.state.vs_shader_addr, value),
                SPI_SHADER_PGM_HI_VS => set_addr_hi(&mut self.state.vs_shader_addr, value),
                COMPUTE_PGM_LO => set_addr_lo(&mut self.state.cs_shader_addr, value),
                COMPUTE_PGM_HI => set_addr_hi(&mut self.state.cs_shader_addr, value),
                _ => trace!("SET_SH_REG[0x{:04X}] = 0x{:08X}", reg, value),
            }
        }
    }
}

#[inline]
fn set_addr_lo(addr: &mut u64, value: u32) {
    *addr = (*addr & !0xFFFF_FFFF_u64) | ((value as u64) << 8);
}

#[inline]
fn set_addr_hi(addr: &mut u64, value: u32) {
    *addr = (*addr & 0xFF_FFFF_FFFF) | (((value as u64) & 0xFF) << 40);
}
