// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Controller state registry.
//!
//! Host keyboard events and gamepad polls funnel into one process-wide
//! controller snapshot; the pad-read syscall serializes it into the guest's
//! fixed 104-byte pad structure. Two action-button layouts exist: the
//! default I/J/K/L cluster and the alternative Z/X/C/V cluster.

use std::time::Instant;

use bitflags::bitflags;
use log::debug;
use parking_lot::Mutex;

use rubis_common::settings::InputLayout;
use rubis_cpu::memory::{MemoryAccess, MemoryFault};

bitflags! {
    /// Pad button bits as the guest sees them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PadButton: u32 {
        const SHARE    = 0x0000_0001;
        const L3       = 0x0000_0002;
        const R3       = 0x0000_0004;
        const OPTIONS  = 0x0000_0008;
        const UP       = 0x0000_0010;
        const RIGHT    = 0x0000_0020;
        const DOWN     = 0x0000_0040;
        const LEFT     = 0x0000_0080;
        const L2       = 0x0000_0100;
        const R2       = 0x0000_0200;
        const L1       = 0x0000_0400;
        const R1       = 0x0000_0800;
        const TRIANGLE = 0x0000_1000;
        const CIRCLE   = 0x0000_2000;
        const CROSS    = 0x0000_4000;
        const SQUARE   = 0x0000_8000;
        const TOUCHPAD = 0x0010_0000;
    }
}

/// Stick center value.
pub const STICK_CENTER: u8 = 128;

/// Deadzone for gamepad sticks (signed 16-bit space).
pub const STICK_DEADZONE: i16 = 8000;
/// Deadzone for gamepad triggers.
pub const TRIGGER_DEADZONE: i16 = 30;

/// Host keys the default mapping understands. The frontend translates its
/// windowing-library keycodes into these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKey {
    Up,
    Down,
    Left,
    Right,
    W,
    A,
    S,
    D,
    I,
    J,
    K,
    L,
    Z,
    X,
    C,
    V,
    Q,
    E,
    Num1,
    Num3,
    Return,
    Backspace,
    T,
    F,
    G,
}

/// One controller snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerState {
    pub buttons: u32,
    pub left_stick_x: u8,
    pub left_stick_y: u8,
    pub right_stick_x: u8,
    pub right_stick_y: u8,
    pub l2_analog: u8,
    pub r2_analog: u8,
    pub accel: [f32; 3],
    pub gyro: [f32; 3],
    pub connected: bool,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            buttons: 0,
            left_stick_x: STICK_CENTER,
            left_stick_y: STICK_CENTER,
            right_stick_x: STICK_CENTER,
            right_stick_y: STICK_CENTER,
            l2_analog: 0,
            r2_analog: 0,
            accel: [0.0; 3],
            gyro: [0.0; 3],
            connected: true,
        }
    }
}

#[derive(Default)]
struct StickKeys {
    w: bool,
    a: bool,
    s: bool,
    d: bool,
}

struct InputInner {
    state: ControllerState,
    stick_keys: StickKeys,
}

/// Process-wide input registry.
pub struct InputManager {
    inner: Mutex<InputInner>,
    layout: InputLayout,
    epoch: Instant,
}

impl InputManager {
    pub fn new(layout: InputLayout) -> Self {
        Self {
            inner: Mutex::new(InputInner {
                state: ControllerState::default(),
                stick_keys: StickKeys::default(),
            }),
            layout,
            epoch: Instant::now(),
        }
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }

    /// Clear all buttons and recentre the sticks.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = ControllerState::default();
        inner.stick_keys = StickKeys::default();
    }

    /// By-value copy of the current state.
    pub fn snapshot(&self) -> ControllerState {
        self.inner.lock().state
    }

    /// Microseconds since the registry was created (pad timestamp field).
    pub fn timestamp_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    /// Apply a host key press or release through the keyboard mapping.
    pub fn handle_key(&self, key: HostKey, pressed: bool) {
        use HostKey::*;

        // Left stick: W/A/S/D drive the axes, opposing keys cancel out.
        if matches!(key, W | A | S | D) {
            let mut inner = self.inner.lock();
            match key {
                W => inner.stick_keys.w = pressed,
                A => inner.stick_keys.a = pressed,
                S => inner.stick_keys.s = pressed,
                D => inner.stick_keys.d = pressed,
                _ => unreachable!(),
            }
            let keys = &inner.stick_keys;
            let ly = axis_from_keys(keys.w, keys.s);
            let lx = axis_from_keys(keys.a, keys.d);
            inner.state.left_stick_x = lx;
            inner.state.left_stick_y = ly;
            return;
        }

        let button = match (key, self.layout) {
            // Action cluster, both documented layouts.
            (K, InputLayout::Ijkl) | (Z, InputLayout::Zxcv) => Some(PadButton::CROSS),
            (L, InputLayout::Ijkl) | (X, InputLayout::Zxcv) => Some(PadButton::CIRCLE),
            (J, InputLayout::Ijkl) | (C, InputLayout::Zxcv) => Some(PadButton::SQUARE),
            (I, InputLayout::Ijkl) | (V, InputLayout::Zxcv) => Some(PadButton::TRIANGLE),

            // Directional pad.
            (Up, _) => Some(PadButton::UP),
            (Down, _) => Some(PadButton::DOWN),
            (Left, _) => Some(PadButton::LEFT),
            (Right, _) => Some(PadButton::RIGHT),

            // Shoulders.
            (Q, _) => Some(PadButton::L1),
            (E, _) => Some(PadButton::R1),
            (Num1, _) => Some(PadButton::L2),
            (Num3, _) => Some(PadButton::R2),

            // System.
            (Return, _) => Some(PadButton::OPTIONS),
            (Backspace, _) => Some(PadButton::SHARE),
            (T, _) => Some(PadButton::TOUCHPAD),
            (F, _) => Some(PadButton::L3),
            (G, _) => Some(PadButton::R3),

            _ => None,
        };

        let mut inner = self.inner.lock();

        if let Some(button) = button {
            if pressed {
                inner.state.buttons |= button.bits();
            } else {
                inner.state.buttons &= !button.bits();
            }
        }

        // Digital shoulder triggers also drive the analog values.
        match key {
            Num1 => inner.state.l2_analog = if pressed { 255 } else { 0 },
            Num3 => inner.state.r2_analog = if pressed { 255 } else { 0 },
            _ => {}
        }
    }

    // -- Gamepad path --------------------------------------------------------

    pub fn set_button(&self, button: PadButton, pressed: bool) {
        let mut inner = self.inner.lock();
        if pressed {
            inner.state.buttons |= button.bits();
        } else {
            inner.state.buttons &= !button.bits();
        }
    }

    pub fn set_left_stick(&self, x: u8, y: u8) {
        let mut inner = self.inner.lock();
        inner.state.left_stick_x = x;
        inner.state.left_stick_y = y;
    }

    pub fn set_right_stick(&self, x: u8, y: u8) {
        let mut inner = self.inner.lock();
        inner.state.right_stick_x = x;
        inner.state.right_stick_y = y;
    }

    pub fn set_triggers(&self, l2: u8, r2: u8) {
        let mut inner = self.inner.lock();
        inner.state.l2_analog = l2;
        inner.state.r2_analog = r2;
        if l2 > 0 {
            inner.state.buttons |= PadButton::L2.bits();
        } else {
            inner.state.buttons &= !PadButton::L2.bits();
        }
        if r2 > 0 {
            inner.state.buttons |= PadButton::R2.bits();
        } else {
            inner.state.buttons &= !PadButton::R2.bits();
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let mut inner = self.inner.lock();
        if inner.state.connected != connected {
            debug!("pad {}", if connected { "connected" } else { "disconnected" });
        }
        inner.state.connected = connected;
    }
}

#[inline]
fn axis_from_keys(negative: bool, positive: bool) -> u8 {
    match (negative, positive) {
        (true, false) => 0,
        (false, true) => 255,
        _ => STICK_CENTER,
    }
}

/// Rescale a signed 16-bit gamepad stick axis to the pad's unsigned 8-bit
/// range, applying the deadzone. Pass `invert` for Y axes, whose host sign
/// convention is opposite the console's.
pub fn stick_to_u8(value: i16, invert: bool) -> u8 {
    let v = if invert {
        (value as i32).saturating_neg()
    } else {
        value as i32
    };
    if v.abs() < STICK_DEADZONE as i32 {
        return STICK_CENTER;
    }
    (((v + 32768).clamp(0, 65535)) / 257) as u8
}

/// Rescale a signed 16-bit trigger value to 0..255 with the trigger deadzone.
pub fn trigger_to_u8(value: i16) -> u8 {
    if value <= TRIGGER_DEADZONE {
        return 0;
    }
    ((value as i32 * 255) / 32767) as u8
}

// ---------------------------------------------------------------------------
// Guest serialization
// ---------------------------------------------------------------------------

/// Size of the guest pad structure.
pub const PAD_DATA_SIZE: usize = 0x68;

/// Serialize a controller snapshot into the guest's packed pad structure:
///
/// | Offset | Field                              |
/// |--------|------------------------------------|
/// | 0x00   | buttons (u32)                      |
/// | 0x04   | lx, ly, rx, ry (u8 each)           |
/// | 0x08   | analog L2, R2 (u8 each) + padding  |
/// | 0x0C   | orientation quaternion (4 x f32)   |
/// | 0x1C   | accelerometer (3 x f32)            |
/// | 0x28   | gyro (3 x f32)                     |
/// | 0x34   | touch data (24 bytes)              |
/// | 0x4C   | connected (u8) + padding           |
/// | 0x50   | timestamp (u64, microseconds)      |
/// | 0x58   | extension (12 bytes)               |
/// | 0x64   | connected count (u8) + padding     |
pub fn write_pad_data(
    mem: &mut dyn MemoryAccess,
    ptr: u64,
    state: &ControllerState,
    timestamp: u64,
) -> Result<(), MemoryFault> {
    mem.write_block(ptr, &[0u8; PAD_DATA_SIZE])?;

    mem.write_u32(ptr, state.buttons)?;
    mem.write_u8(ptr + 0x04, state.left_stick_x)?;
    mem.write_u8(ptr + 0x05, state.left_stick_y)?;
    mem.write_u8(ptr + 0x06, state.right_stick_x)?;
    mem.write_u8(ptr + 0x07, state.right_stick_y)?;
    mem.write_u8(ptr + 0x08, state.l2_analog)?;
    mem.write_u8(ptr + 0x09, state.r2_analog)?;

    // Orientation: identity quaternion.
    mem.write_u32(ptr + 0x0C, 0f32.to_bits())?;
    mem.write_u32(ptr + 0x10, 0f32.to_bits())?;
    mem.write_u32(ptr + 0x14, 0f32.to_bits())?;
    mem.write_u32(ptr + 0x18, 1f32.to_bits())?;

    for (i, v) in state.accel.iter().enumerate() {
        mem.write_u32(ptr + 0x1C + i as u64 * 4, v.to_bits())?;
    }
    for (i, v) in state.gyro.iter().enumerate() {
        mem.write_u32(ptr + 0x28 + i as u64 * 4, v.to_bits())?;
    }

    mem.write_u8(ptr + 0x4C, u8::from(state.connected))?;
    mem.write_u64(ptr + 0x50, timestamp)?;
    mem.write_u8(ptr + 0x64, u8::from(state.connected))?;

    Ok(())
}
