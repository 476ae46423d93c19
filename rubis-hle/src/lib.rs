// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod audio;
pub mod fs;
pub mod libaudio;
pub mod libfs;
pub mod libgnm;
pub mod libkernel;
pub mod libpad;
pub mod pad;

pub use audio::{AudioOutManager, AudioSink};
pub use fs::Vfs;
pub use pad::{ControllerState, HostKey, InputManager, PadButton};
