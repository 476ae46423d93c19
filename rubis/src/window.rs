// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! SDL2 window shell: event pump, keyboard-to-pad mapping, and the game
//! controller path with deadzone rescaling and disconnect rescans.

use anyhow::{Context, Result};
use log::{debug, info};
use sdl2::controller::{Axis, Button, GameController};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

use rubis_core::{EmuState, Emulator};
use rubis_hle::pad::{stick_to_u8, trigger_to_u8, HostKey, PadButton};
use rubis_hle::InputManager;

use crate::presenter::NullPresenter;

/// Default window dimensions (1080p scaled down to a desktop-friendly 720p).
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Translate an SDL keycode into the pad mapping's host key.
fn map_keycode(keycode: Keycode) -> Option<HostKey> {
    match keycode {
        Keycode::Up => Some(HostKey::Up),
        Keycode::Down => Some(HostKey::Down),
        Keycode::Left => Some(HostKey::Left),
        Keycode::Right => Some(HostKey::Right),
        Keycode::W => Some(HostKey::W),
        Keycode::A => Some(HostKey::A),
        Keycode::S => Some(HostKey::S),
        Keycode::D => Some(HostKey::D),
        Keycode::I => Some(HostKey::I),
        Keycode::J => Some(HostKey::J),
        Keycode::K => Some(HostKey::K),
        Keycode::L => Some(HostKey::L),
        Keycode::Z => Some(HostKey::Z),
        Keycode::X => Some(HostKey::X),
        Keycode::C => Some(HostKey::C),
        Keycode::V => Some(HostKey::V),
        Keycode::Q => Some(HostKey::Q),
        Keycode::E => Some(HostKey::E),
        Keycode::Num1 => Some(HostKey::Num1),
        Keycode::Num3 => Some(HostKey::Num3),
        Keycode::Return => Some(HostKey::Return),
        Keycode::Backspace => Some(HostKey::Backspace),
        Keycode::T => Some(HostKey::T),
        Keycode::F => Some(HostKey::F),
        Keycode::G => Some(HostKey::G),
        _ => None,
    }
}

/// Open the first attached game controller, if any.
fn open_controller(
    subsystem: &sdl2::GameControllerSubsystem,
) -> Option<GameController> {
    let count = subsystem.num_joysticks().ok()?;
    for index in 0..count {
        if subsystem.is_game_controller(index) {
            match subsystem.open(index) {
                Ok(controller) => {
                    info!("game controller connected: {}", controller.name());
                    return Some(controller);
                }
                Err(e) => debug!("controller {} open failed: {}", index, e),
            }
        }
    }
    None
}

/// Poll one controller into the input registry: digital buttons map 1:1,
/// sticks and triggers are rescaled from signed 16-bit with deadzones, and
/// the Y axes are inverted to match pad semantics.
fn apply_controller(controller: &GameController, input: &InputManager) {
    const BUTTONS: &[(Button, PadButton)] = &[
        (Button::A, PadButton::CROSS),
        (Button::B, PadButton::CIRCLE),
        (Button::X, PadButton::SQUARE),
        (Button::Y, PadButton::TRIANGLE),
        (Button::DPadUp, PadButton::UP),
        (Button::DPadDown, PadButton::DOWN),
        (Button::DPadLeft, PadButton::LEFT),
        (Button::DPadRight, PadButton::RIGHT),
        (Button::LeftShoulder, PadButton::L1),
        (Button::RightShoulder, PadButton::R1),
        (Button::LeftStick, PadButton::L3),
        (Button::RightStick, PadButton::R3),
        (Button::Start, PadButton::OPTIONS),
        (Button::Back, PadButton::SHARE),
        (Button::Guide, PadButton::TOUCHPAD),
    ];

    for (host, guest) in BUTTONS {
        input.set_button(*guest, controller.button(*host));
    }

    input.set_left_stick(
        stick_to_u8(controller.axis(Axis::LeftX), false),
        stick_to_u8(controller.axis(Axis::LeftY), true),
    );
    input.set_right_stick(
        stick_to_u8(controller.axis(Axis::RightX), false),
        stick_to_u8(controller.axis(Axis::RightY), true),
    );
    input.set_triggers(
        trigger_to_u8(controller.axis(Axis::TriggerLeft)),
        trigger_to_u8(controller.axis(Axis::TriggerRight)),
    );
}

/// Main windowed loop: pump events, feed input, drain the render queue.
pub fn run_with_window(emulator: &mut Emulator) -> Result<()> {
    let sdl_context = sdl2::init().map_err(|e| anyhow::anyhow!("SDL2 init failed: {}", e))?;
    let video = sdl_context
        .video()
        .map_err(|e| anyhow::anyhow!("SDL2 video init failed: {}", e))?;
    let controller_subsystem = sdl_context
        .game_controller()
        .map_err(|e| anyhow::anyhow!("SDL2 controller init failed: {}", e))?;

    let _window = video
        .window("rubis - PlayStation 4 Emulator", DEFAULT_WIDTH, DEFAULT_HEIGHT)
        .position_centered()
        .resizable()
        .build()
        .context("failed to create SDL2 window")?;

    let mut event_pump = sdl_context
        .event_pump()
        .map_err(|e| anyhow::anyhow!("SDL2 event pump failed: {}", e))?;

    info!("window created, entering main loop (ESC to exit, P to pause)");

    let input = emulator.input();
    let queue = emulator.render_queue();
    let mut presenter = NullPresenter::new();
    let mut controller = open_controller(&controller_subsystem);

    'main: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => break 'main,
                Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'main,
                Event::KeyDown {
                    keycode: Some(Keycode::P),
                    repeat: false,
                    ..
                } => {
                    emulator.toggle_pause();
                }
                Event::KeyDown {
                    keycode: Some(key),
                    repeat: false,
                    ..
                } => {
                    if let Some(host_key) = map_keycode(key) {
                        input.handle_key(host_key, true);
                    }
                }
                Event::KeyUp {
                    keycode: Some(key), ..
                } => {
                    if let Some(host_key) = map_keycode(key) {
                        input.handle_key(host_key, false);
                    }
                }
                Event::ControllerDeviceAdded { .. } | Event::ControllerDeviceRemoved { .. } => {
                    controller = None;
                }
                _ => {}
            }
        }

        // Gamepad path: poll-time disconnect detection triggers a rescan.
        match controller.as_ref().map(|pad| pad.attached()) {
            Some(true) => {
                if let Some(pad) = controller.as_ref() {
                    apply_controller(pad, &input);
                }
            }
            Some(false) => {
                info!("controller disconnected, rescanning");
                input.set_connected(false);
                controller = None;
            }
            None => {
                controller = open_controller(&controller_subsystem);
                if controller.is_some() {
                    input.set_connected(true);
                }
            }
        }

        presenter.consume(queue.pop_all());

        if emulator.state() == EmuState::Error {
            break;
        }

        std::thread::sleep(std::time::Duration::from_millis(16));
    }

    info!("window closed after {} frames", presenter.frames());
    Ok(())
}
