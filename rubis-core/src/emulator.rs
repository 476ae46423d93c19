// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Emulator core: owns every subsystem and the lifecycle state machine.
//!
//! Initialization order is memory, CPU, syscall dispatcher, HLE modules,
//! audio, input. The guest CPU runs on its own thread; control calls
//! (run/pause/stop) arrive from the UI thread and are serviced through the
//! interpreter's atomic control block. Nothing here is process-global — the
//! core is the ownership root and hands out `Arc`s to collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;

use rubis_common::{Settings, FALLBACK_MEMORY_SIZE, STACK_TOP};
use rubis_cpu::{Cpu, CpuContext, CpuControl, ExecState};
use rubis_gpu::{GnmProcessor, RenderQueue};
use rubis_hle::libaudio::register_libaudio;
use rubis_hle::libfs::{register_libfs, ConsoleSink};
use rubis_hle::libgnm::register_libgnm;
use rubis_hle::libkernel::register_libkernel;
use rubis_hle::libpad::register_libpad;
use rubis_hle::{AudioOutManager, InputManager, Vfs};
use rubis_kernel::{GuestMemory, SyscallDispatcher};
use rubis_loader::{elf, pkg, GameFormat};

use crate::bios;

/// Sleep granularity of the CPU thread while the emulator is paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Emulator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EmuState {
    Idle = 0,
    Booting = 1,
    Running = 2,
    Paused = 3,
    Stopping = 4,
    Error = 5,
}

impl EmuState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Booting,
            2 => Self::Running,
            3 => Self::Paused,
            4 => Self::Stopping,
            5 => Self::Error,
            _ => Self::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Booting => "BOOTING",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Stopping => "STOPPING",
            Self::Error => "ERROR",
        }
    }
}

/// Callback fired on every state transition.
pub type StateCallback = Box<dyn Fn(EmuState) + Send + Sync>;
/// Callback fired for every core log line (including guest console output).
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// State and callbacks shared with the CPU thread.
struct Shared {
    state: AtomicU8,
    state_callback: Mutex<Option<StateCallback>>,
    log_callback: Mutex<Option<LogCallback>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EmuState::Idle as u8),
            state_callback: Mutex::new(None),
            log_callback: Mutex::new(None),
        }
    }

    fn state(&self) -> EmuState {
        EmuState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, new_state: EmuState) {
        self.state.store(new_state as u8, Ordering::Release);
        if let Some(cb) = self.state_callback.lock().as_ref() {
            cb(new_state);
        }
    }

    fn log(&self, message: &str) {
        info!("{}", message);
        if let Some(cb) = self.log_callback.lock().as_ref() {
            cb(message);
        }
    }
}

/// The emulator: ownership root of all guest-execution subsystems.
pub struct Emulator {
    shared: Arc<Shared>,
    settings: Settings,
    initialized: bool,

    memory: Option<Arc<Mutex<GuestMemory>>>,
    dispatcher: Option<Arc<SyscallDispatcher>>,
    cpu_context: Arc<Mutex<CpuContext>>,
    cpu_control: Arc<CpuControl>,

    queue: Arc<RenderQueue>,
    vfs: Arc<Vfs>,
    audio: Arc<AudioOutManager>,
    input: Arc<InputManager>,
    gnm: Arc<Mutex<GnmProcessor>>,
    exit_requested: Arc<AtomicBool>,

    cpu_running: Arc<AtomicBool>,
    cpu_thread: Option<JoinHandle<()>>,

    game_loaded: bool,
    entry_point: u64,
    game_path: String,
}

impl Emulator {
    pub fn new(settings: Settings) -> Self {
        let queue = Arc::new(RenderQueue::new());
        let input_layout = settings.input_layout;
        Self {
            shared: Arc::new(Shared::new()),
            settings,
            initialized: false,
            memory: None,
            dispatcher: None,
            cpu_context: Arc::new(Mutex::new(CpuContext::new())),
            cpu_control: Arc::new(CpuControl::new()),
            gnm: Arc::new(Mutex::new(GnmProcessor::new(queue.clone()))),
            queue,
            vfs: Arc::new(Vfs::new()),
            audio: Arc::new(AudioOutManager::new()),
            input: Arc::new(InputManager::new(input_layout)),
            exit_requested: Arc::new(AtomicBool::new(false)),
            cpu_running: Arc::new(AtomicBool::new(false)),
            cpu_thread: None,
            game_loaded: false,
            entry_point: 0,
            game_path: String::new(),
        }
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Bring up all subsystems. Idempotent; returns false on failure.
    pub fn initialize(&mut self) -> bool {
        if self.initialized {
            return true;
        }

        self.shared.log("initializing emulator core");
        self.shared.set_state(EmuState::Booting);

        let memory = if self.settings.force_small_memory {
            GuestMemory::with_size(FALLBACK_MEMORY_SIZE)
        } else {
            GuestMemory::new()
        };
        let memory = match memory {
            Ok(m) => m,
            Err(e) => {
                self.shared.log(&format!("guest memory allocation failed: {}", e));
                self.shared.set_state(EmuState::Error);
                return false;
            }
        };

        let mut dispatcher = SyscallDispatcher::new();
        register_libkernel(&mut dispatcher, self.exit_requested.clone());

        let console_shared = self.shared.clone();
        let console: ConsoleSink = Arc::new(move |fd, text: &str| {
            console_shared.log(&format!("[fd{}] {}", fd, text));
        });
        register_libfs(&mut dispatcher, self.vfs.clone(), console);
        register_libaudio(&mut dispatcher, self.audio.clone());
        register_libpad(&mut dispatcher, self.input.clone());
        register_libgnm(&mut dispatcher, self.gnm.clone(), self.queue.clone());

        self.shared.log(&format!(
            "{} syscall handlers registered",
            dispatcher.handler_count()
        ));

        self.memory = Some(Arc::new(Mutex::new(memory)));
        self.dispatcher = Some(Arc::new(dispatcher));

        self.audio.init();
        self.input.reset();

        self.initialized = true;
        self.shared.set_state(EmuState::Idle);
        self.shared.log("emulator core initialized");
        true
    }

    /// Tear everything down.
    pub fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }
        self.shared.log("shutting down emulator core");
        self.stop();
        self.audio.shutdown();
        self.vfs.clear_mounts();
        self.queue.clear();
        self.memory = None;
        self.dispatcher = None;
        self.initialized = false;
        self.game_loaded = false;
        self.entry_point = 0;
        self.game_path.clear();
        self.shared.set_state(EmuState::Idle);
        self.shared.log("shutdown complete");
    }

    // -- Loading -------------------------------------------------------------

    /// Load a game container (package or plain ELF). Returns the entry point
    /// or 0 on failure (with the state moved to Error).
    pub fn load_game(&mut self, path: &Path) -> u64 {
        match self.try_load_game(path) {
            Ok(entry) => entry,
            Err(message) => {
                self.shared.log(&format!("failed to load game: {}", message));
                self.shared.set_state(EmuState::Error);
                0
            }
        }
    }

    fn try_load_game(&mut self, path: &Path) -> Result<u64, String> {
        if !self.initialized {
            return Err("core not initialized".into());
        }
        if self.shared.state() != EmuState::Idle {
            return Err(format!("not idle (state {})", self.shared.state().name()));
        }

        self.shared.set_state(EmuState::Booting);
        self.shared.log(&format!("loading game: {}", path.display()));

        let data = std::fs::read(path).map_err(|e| format!("cannot read file: {}", e))?;
        let format = GameFormat::detect(&data).ok_or("unrecognized container format")?;
        self.shared.log(&format!("container format: {}", format.label()));

        // The container's directory becomes the app mount.
        if let Some(parent) = path.parent() {
            self.vfs.mount("/app0", parent);
            self.vfs.mount("/hostapp", parent);
        }

        let image = match format {
            GameFormat::Pkg => {
                pkg::extract_main_executable(&data).map_err(|e| e.to_string())?
            }
            GameFormat::Elf => data,
        };

        let memory = self.memory.clone().ok_or("core not initialized")?;
        let result = {
            let mut mem = memory.lock();
            elf::load_elf(&image, &mut mem).map_err(|e| e.to_string())?
        };

        {
            let mut ctx = self.cpu_context.lock();
            ctx.reset();
            ctx.rip = result.entry_point;
            ctx.set_rsp(STACK_TOP - 0x1000);
            ctx.set_rbp(STACK_TOP - 0x1000);
        }

        self.entry_point = result.entry_point;
        self.game_path = path.display().to_string();
        self.game_loaded = true;

        self.shared.log(&format!(
            "game loaded: {} segments, entry 0x{:X}",
            result.segments.len(),
            result.entry_point
        ));
        self.shared.set_state(EmuState::Idle);
        Ok(result.entry_point)
    }

    /// Write the internal BIOS into guest memory and prime the CPU.
    /// Returns the entry point or 0 on failure.
    pub fn load_internal_bios(&mut self) -> u64 {
        if !self.initialized {
            self.shared.log("cannot load BIOS: core not initialized");
            return 0;
        }

        self.shared.log("loading internal BIOS");
        self.shared.set_state(EmuState::Booting);

        let memory = match self.memory.clone() {
            Some(memory) => memory,
            None => {
                self.shared.set_state(EmuState::Error);
                return 0;
            }
        };
        let entry = {
            let mut mem = memory.lock();
            let mut ctx = self.cpu_context.lock();
            match bios::load(&mut mem, &mut ctx) {
                Ok(entry) => entry,
                Err(e) => {
                    self.shared.log(&format!("BIOS load failed: {}", e));
                    self.shared.set_state(EmuState::Error);
                    return 0;
                }
            }
        };

        self.entry_point = entry;
        self.game_path = "[Internal BIOS]".into();
        self.game_loaded = true;

        self.shared.log(&format!("internal BIOS loaded, entry 0x{:X}", entry));
        self.shared.set_state(EmuState::Idle);
        entry
    }

    // -- Execution control ---------------------------------------------------

    /// Start or resume execution. Spawns the guest CPU thread on first run.
    pub fn run(&mut self) -> bool {
        let current = self.shared.state();
        if current != EmuState::Idle && current != EmuState::Paused {
            return false;
        }
        if !self.game_loaded {
            self.shared.log("cannot run: no game loaded");
            return false;
        }
        let (memory, dispatcher) = match (self.memory.clone(), self.dispatcher.clone()) {
            (Some(memory), Some(dispatcher)) => (memory, dispatcher),
            _ => {
                self.shared.log("cannot run: core not initialized");
                return false;
            }
        };

        self.shared.log("starting emulation");

        if self.cpu_running.load(Ordering::Acquire) {
            // A live, paused CPU thread: just resume it.
            self.cpu_control.resume();
            self.shared.set_state(EmuState::Running);
            return true;
        }

        // Reap a previous thread that exited on its own (halt or guest exit).
        if let Some(handle) = self.cpu_thread.take() {
            let _ = handle.join();
        }

        self.cpu_control.reset();
        self.cpu_control.set_state(ExecState::Running);
        self.exit_requested.store(false, Ordering::Release);
        self.cpu_running.store(true, Ordering::Release);
        self.shared.set_state(EmuState::Running);

        let shared = self.shared.clone();
        let context = self.cpu_context.clone();
        let control = self.cpu_control.clone();
        let exit_requested = self.exit_requested.clone();
        let cpu_running = self.cpu_running.clone();

        self.cpu_thread = Some(std::thread::spawn(move || {
            shared.log("CPU thread started");
            let mut cpu = Cpu::with_shared(context, control.clone());

            loop {
                if !cpu_running.load(Ordering::Acquire) || control.stop_requested() {
                    break;
                }
                if exit_requested.load(Ordering::Acquire) {
                    shared.log("guest requested exit");
                    break;
                }
                if control.state() == ExecState::Paused {
                    std::thread::sleep(PAUSE_POLL);
                    continue;
                }

                let mut mem = memory.lock();
                if cpu.step(&mut *mem, &*dispatcher) == 0 {
                    break;
                }
            }

            cpu_running.store(false, Ordering::Release);

            match control.state() {
                ExecState::Faulted => {
                    shared.log("CPU faulted");
                    shared.set_state(EmuState::Error);
                }
                _ => {
                    // Clean halt or guest exit: back to Idle unless a stop()
                    // is mid-flight and owns the transition.
                    if shared.state() == EmuState::Running {
                        shared.set_state(EmuState::Idle);
                    }
                }
            }

            shared.log(&format!(
                "CPU thread exiting after {} instructions",
                control.instructions_retired()
            ));
        }));

        true
    }

    /// Pause a running guest; the CPU thread idles between instructions.
    pub fn pause(&mut self) -> bool {
        if self.shared.state() != EmuState::Running {
            return false;
        }
        self.shared.log("pausing emulation");
        self.cpu_control.pause();
        self.shared.set_state(EmuState::Paused);
        true
    }

    /// Stop execution, join the CPU thread, and clear the loaded game.
    pub fn stop(&mut self) -> bool {
        let current = self.shared.state();
        if current == EmuState::Idle || current == EmuState::Stopping {
            return false;
        }

        self.shared.log("stopping emulation");
        self.shared.set_state(EmuState::Stopping);

        self.cpu_running.store(false, Ordering::Release);
        self.cpu_control.request_stop();
        // A paused thread wakes from its sleep and observes the flags.
        self.cpu_control.resume();

        if let Some(handle) = self.cpu_thread.take() {
            if handle.join().is_err() {
                warn!("CPU thread panicked during shutdown");
            }
        }

        self.cpu_control.reset();
        self.cpu_context.lock().reset();
        self.input.reset();
        self.exit_requested.store(false, Ordering::Release);
        self.queue.clear();

        self.game_loaded = false;
        self.entry_point = 0;
        self.game_path.clear();

        self.shared.set_state(EmuState::Idle);
        self.shared.log("emulation stopped");
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.shared.state() {
            EmuState::Running => self.pause(),
            EmuState::Paused => self.run(),
            _ => false,
        }
    }

    // -- Introspection -------------------------------------------------------

    pub fn state(&self) -> EmuState {
        self.shared.state()
    }

    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.shared.state_callback.lock() = Some(callback);
    }

    pub fn set_log_callback(&self, callback: LogCallback) {
        *self.shared.log_callback.lock() = Some(callback);
    }

    /// By-value CPU register snapshot.
    pub fn cpu_snapshot(&self) -> CpuContext {
        self.cpu_context.lock().clone()
    }

    pub fn instructions_retired(&self) -> u64 {
        self.cpu_control.instructions_retired()
    }

    /// Whether the guest CPU thread is currently alive.
    pub fn cpu_active(&self) -> bool {
        self.cpu_running.load(Ordering::Acquire)
    }

    pub fn is_game_loaded(&self) -> bool {
        self.game_loaded
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    pub fn game_path(&self) -> &str {
        &self.game_path
    }

    pub fn render_queue(&self) -> Arc<RenderQueue> {
        self.queue.clone()
    }

    pub fn input(&self) -> Arc<InputManager> {
        self.input.clone()
    }

    pub fn audio(&self) -> Arc<AudioOutManager> {
        self.audio.clone()
    }

    pub fn vfs(&self) -> Arc<Vfs> {
        self.vfs.clone()
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rubis_common::USER_BASE;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU32;

    fn test_settings() -> Settings {
        Settings {
            force_small_memory: true,
            ..Settings::default()
        }
    }

    fn capture_log(emu: &Emulator) -> Arc<Mutex<Vec<String>>> {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        emu.set_log_callback(Box::new(move |msg| {
            sink.lock().push(msg.to_string());
        }));
        lines
    }

    fn wait_for_line(lines: &Arc<Mutex<Vec<String>>>, needle: &str, timeout_ms: u64) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_millis(timeout_ms);
        while std::time::Instant::now() < deadline {
            if lines.lock().iter().any(|l| l.contains(needle)) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_initialize_transitions_to_idle() {
        let mut emu = Emulator::new(test_settings());
        assert_eq!(emu.state(), EmuState::Idle);
        assert!(emu.initialize());
        assert_eq!(emu.state(), EmuState::Idle);
        // Idempotent.
        assert!(emu.initialize());
    }

    #[test]
    fn test_run_refuses_without_game() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        assert!(!emu.run());
        assert_eq!(emu.state(), EmuState::Idle);
    }

    #[test]
    fn test_stop_refuses_when_idle() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        assert!(!emu.stop());
    }

    #[test]
    fn test_load_internal_bios_entry_point() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        let entry = emu.load_internal_bios();
        assert_eq!(entry, 0x40_0000);
        assert!(emu.is_game_loaded());
        assert_eq!(emu.game_path(), "[Internal BIOS]");

        let ctx = emu.cpu_snapshot();
        assert_eq!(ctx.rip, 0x40_0000);
        assert_eq!(ctx.rsp(), STACK_TOP - 0x1000);
    }

    #[test]
    fn test_bios_banner_reaches_log_inline() {
        // Drive the interpreter on the calling thread: the banner must
        // appear after the first write syscall (five instructions in).
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        let lines = capture_log(&emu);
        emu.load_internal_bios();

        let memory = emu.memory.as_ref().unwrap().clone();
        let dispatcher = emu.dispatcher.as_ref().unwrap().clone();
        let mut cpu = Cpu::with_shared(emu.cpu_context.clone(), emu.cpu_control.clone());
        emu.cpu_control.set_state(ExecState::Running);

        for _ in 0..6 {
            let mut mem = memory.lock();
            assert!(cpu.step(&mut *mem, &*dispatcher) > 0);
        }

        assert!(lines
            .lock()
            .iter()
            .any(|l| l.contains("WeaR-emu Internal BIOS v1.0")));
    }

    #[test]
    fn test_bios_boot_threaded() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        let lines = capture_log(&emu);

        assert_eq!(emu.load_internal_bios(), 0x40_0000);
        assert!(emu.run());
        assert_eq!(emu.state(), EmuState::Running);

        assert!(
            wait_for_line(&lines, "WeaR-emu Internal BIOS v1.0", 2000),
            "boot banner never appeared; log: {:?}",
            lines.lock()
        );

        assert!(emu.stop());
        assert_eq!(emu.state(), EmuState::Idle);
        assert!(!emu.is_game_loaded());
        assert!(!emu.cpu_active());
    }

    #[test]
    fn test_pause_resume_cycle() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        emu.load_internal_bios();
        assert!(emu.run());

        assert!(emu.pause());
        assert_eq!(emu.state(), EmuState::Paused);
        let frozen = emu.instructions_retired();
        std::thread::sleep(Duration::from_millis(50));
        // A few instructions may retire between the pause request and the
        // CPU thread observing it, but the count must settle.
        let settled = emu.instructions_retired();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(emu.instructions_retired(), settled);
        assert!(settled >= frozen);

        assert!(emu.toggle_pause());
        assert_eq!(emu.state(), EmuState::Running);

        assert!(emu.stop());
    }

    #[test]
    fn test_load_game_missing_file_sets_error() {
        let mut emu = Emulator::new(test_settings());
        emu.initialize();
        let entry = emu.load_game(Path::new("/nonexistent/game.elf"));
        assert_eq!(entry, 0);
        assert_eq!(emu.state(), EmuState::Error);
    }

    // -- ELF-on-disk loading -------------------------------------------------

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    struct ScratchDir {
        path: PathBuf,
    }

    impl ScratchDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "rubis-core-test-{}-{}",
                std::process::id(),
                DIR_SEQ.fetch_add(1, Ordering::Relaxed)
            ));
            std::fs::create_dir_all(&path).expect("create scratch dir");
            Self { path }
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    /// Minimal ELF: one LOAD segment at USER_BASE whose first bytes are a
    /// HLT instruction.
    fn build_tiny_elf() -> Vec<u8> {
        let mut buf = vec![0u8; 0x1100];
        buf[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        buf[4] = 2; // 64-bit
        buf[5] = 1; // little-endian
        buf[6] = 1;
        buf[7] = 9; // FreeBSD

        let put_u16 = |b: &mut Vec<u8>, o: usize, v: u16| b[o..o + 2].copy_from_slice(&v.to_le_bytes());
        let put_u64 = |b: &mut Vec<u8>, o: usize, v: u64| b[o..o + 8].copy_from_slice(&v.to_le_bytes());

        put_u16(&mut buf, 16, 2); // ET_EXEC
        put_u16(&mut buf, 18, 62); // EM_X86_64
        put_u64(&mut buf, 24, USER_BASE); // entry
        put_u64(&mut buf, 32, 64); // phoff
        put_u16(&mut buf, 56, 1); // phnum

        // Program header at 64: PT_LOAD, offset 0x1000, vaddr USER_BASE.
        let p = 64;
        buf[p..p + 4].copy_from_slice(&1u32.to_le_bytes());
        buf[p + 4..p + 8].copy_from_slice(&5u32.to_le_bytes()); // R+X
        put_u64(&mut buf, p + 8, 0x1000); // offset
        put_u64(&mut buf, p + 16, USER_BASE); // vaddr
        put_u64(&mut buf, p + 24, USER_BASE); // paddr
        put_u64(&mut buf, p + 32, 0x100); // filesz
        put_u64(&mut buf, p + 40, 0x100); // memsz

        buf[0x1000] = 0xF4; // HLT
        buf
    }

    #[test]
    fn test_load_game_elf_and_run_to_halt() {
        let dir = ScratchDir::new();
        let game = dir.path.join("eboot.elf");
        std::fs::write(&game, build_tiny_elf()).unwrap();

        let mut emu = Emulator::new(test_settings());
        emu.initialize();

        let entry = emu.load_game(&game);
        assert_eq!(entry, USER_BASE);
        assert_eq!(emu.state(), EmuState::Idle);
        // Both app mounts point at the game directory.
        assert!(emu.vfs().exists("/app0/eboot.elf"));
        assert!(emu.vfs().exists("/hostapp/eboot.elf"));

        let ctx = emu.cpu_snapshot();
        assert_eq!(ctx.rip, USER_BASE);

        // The single HLT instruction ends execution almost immediately.
        assert!(emu.run());
        let deadline = std::time::Instant::now() + Duration::from_millis(2000);
        while emu.cpu_active() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!emu.cpu_active(), "CPU thread should have halted");
        assert_eq!(emu.state(), EmuState::Idle);
    }
}
