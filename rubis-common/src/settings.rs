// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Global emulator settings, populated from the config INI.
#[derive(Debug, Clone)]
pub struct Settings {
    // Input
    pub input_layout: InputLayout,

    // Core
    pub force_small_memory: bool,

    // Debug
    pub verbose_gpu: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_layout: InputLayout::Ijkl,
            force_small_memory: false,
            verbose_gpu: false,
        }
    }
}

/// Which keyboard cluster drives the four action buttons.
///
/// `Ijkl` is the default: K = cross, L = circle, J = square, I = triangle,
/// leaving W/A/S/D free for the left stick. `Zxcv` maps Z/X/C/V to
/// cross/circle/square/triangle instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    Ijkl,
    Zxcv,
}

impl InputLayout {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "zxcv" => Self::Zxcv,
            _ => Self::Ijkl,
        }
    }
}
