// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

mod config;
mod presenter;
mod window;

use anyhow::Result;
use clap::Parser;
use log::info;
use std::path::PathBuf;

use presenter::NullPresenter;
use rubis_core::Emulator;

/// rubis - PlayStation 4 Emulator
#[derive(Parser, Debug)]
#[command(name = "rubis", version, about = "PlayStation 4 emulator written in Rust")]
struct Args {
    /// Path to the game file (PKG or ELF). If omitted, boots the internal BIOS.
    #[arg(short, long)]
    game: Option<PathBuf>,

    /// Boot the internal BIOS even when a game path is given
    #[arg(long)]
    bios: bool,

    /// Path to the config file (default: auto-detect)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run without a window (no input; render commands are drained to the log)
    #[arg(long)]
    headless: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("rubis - PlayStation 4 Emulator");
    info!("==============================");

    let settings = config::load_config(args.config.as_ref());
    info!("input layout: {:?}", settings.input_layout);

    let mut emulator = Emulator::new(settings);
    if !emulator.initialize() {
        anyhow::bail!("emulator initialization failed");
    }

    let entry = match (&args.game, args.bios) {
        (Some(path), false) => emulator.load_game(path),
        (Some(_), true) | (None, _) => emulator.load_internal_bios(),
    };
    if entry == 0 {
        anyhow::bail!("failed to load a bootable image");
    }
    info!("entry point: 0x{:X}", entry);

    if !emulator.run() {
        anyhow::bail!("emulator refused to start");
    }

    if args.headless {
        run_headless(&mut emulator);
    } else {
        window::run_with_window(&mut emulator)?;
    }

    emulator.stop();
    emulator.shutdown();
    info!("emulation finished");
    Ok(())
}

/// Headless loop: drain the render queue until the guest CPU stops.
fn run_headless(emulator: &mut Emulator) {
    info!("running headless (Ctrl-C to abort)");

    let queue = emulator.render_queue();
    let mut presenter = NullPresenter::new();

    while emulator.cpu_active() {
        queue.wait_for_commands(100);
        presenter.consume(queue.pop_all());
    }
    presenter.consume(queue.pop_all());

    info!(
        "guest CPU stopped after {} instructions, {} frames presented",
        emulator.instructions_retired(),
        presenter.frames()
    );
}
