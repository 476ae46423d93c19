// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod bios;
pub mod emulator;

pub use emulator::{EmuState, Emulator};
