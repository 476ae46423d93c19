// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Audio output port registry.
//!
//! Ports are handle-indexed (from 1) and carry the guest's chosen grain.
//! Output is paced: each submit sleeps for roughly 80 % of the buffer's
//! playback duration so the guest cannot outrun real time. The host device
//! itself sits behind the [`AudioSink`] trait; without a sink factory the
//! registry is a black hole that still paces correctly.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;

/// Output sample rate (console standard).
pub const SAMPLE_RATE: u32 = 48_000;
/// Stereo output.
pub const CHANNELS: usize = 2;
/// 16-bit signed PCM.
pub const BYTES_PER_SAMPLE: usize = 2;
/// Bytes per interleaved frame.
pub const FRAME_SIZE: usize = CHANNELS * BYTES_PER_SAMPLE;

/// Grain used when the guest opens a port with a zero sample count.
pub const DEFAULT_GRAIN: u32 = 256;

/// Port types the guest may request.
pub const PORT_TYPE_MAIN: i32 = 0;
pub const PORT_TYPE_BGM: i32 = 1;
pub const PORT_TYPE_VOICE: i32 = 2;
pub const PORT_TYPE_PERSONAL: i32 = 3;
pub const PORT_TYPE_PADSPK: i32 = 4;

/// Host-side PCM consumer. The real device glue lives outside this crate.
pub trait AudioSink: Send {
    fn write(&mut self, pcm: &[u8]);
    fn set_volume(&mut self, volume: f32);
    fn stop(&mut self);
}

/// Builds a sink for a newly opened port, given its sample count.
pub type SinkFactory = Box<dyn Fn(u32) -> Option<Box<dyn AudioSink>> + Send + Sync>;

/// One open output port.
pub struct AudioPort {
    pub handle: i32,
    pub port_type: i32,
    pub sample_count: u32,
    pub grain: u32,
    pub muted: bool,
    pub volume: f32,
    pub frames_output: u64,
    sink: Option<Box<dyn AudioSink>>,
}

struct AudioInner {
    initialized: bool,
    ports: HashMap<i32, AudioPort>,
    next_handle: i32,
    sink_factory: Option<SinkFactory>,
}

/// The audio port table, mutex-guarded.
pub struct AudioOutManager {
    inner: Mutex<AudioInner>,
}

impl AudioOutManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AudioInner {
                initialized: false,
                ports: HashMap::new(),
                next_handle: 1,
                sink_factory: None,
            }),
        }
    }

    /// Install the host sink factory (frontend-provided).
    pub fn set_sink_factory(&self, factory: SinkFactory) {
        self.inner.lock().sink_factory = Some(factory);
    }

    /// Initialize the subsystem. Idempotent.
    pub fn init(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.initialized {
            info!("audio: initialized ({} Hz, {} channels)", SAMPLE_RATE, CHANNELS);
            inner.initialized = true;
        }
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().initialized
    }

    /// Open a port; returns the new handle (>= 1) or -1.
    pub fn open_port(&self, port_type: i32, sample_count: u32, freq: u32) -> i32 {
        if freq != 0 && freq != SAMPLE_RATE {
            warn!("audio: unsupported sample rate {} (using {})", freq, SAMPLE_RATE);
        }

        let mut inner = self.inner.lock();
        let handle = inner.next_handle;
        inner.next_handle += 1;

        let grain = if sample_count > 0 {
            sample_count
        } else {
            DEFAULT_GRAIN
        };
        let sink = inner
            .sink_factory
            .as_ref()
            .and_then(|factory| factory(grain));

        debug!(
            "audio: opened port handle={} type={} samples={} grain={} sink={}",
            handle,
            port_type,
            sample_count,
            grain,
            sink.is_some()
        );

        inner.ports.insert(
            handle,
            AudioPort {
                handle,
                port_type,
                sample_count: grain,
                grain,
                muted: false,
                volume: 1.0,
                frames_output: 0,
                sink,
            },
        );

        handle
    }

    /// Close a port; 0 on success, -1 when the handle is unknown.
    pub fn close_port(&self, handle: i32) -> i32 {
        match self.inner.lock().ports.remove(&handle) {
            Some(mut port) => {
                if let Some(sink) = port.sink.as_mut() {
                    sink.stop();
                }
                debug!("audio: closed port {}", handle);
                0
            }
            None => -1,
        }
    }

    /// Sample count of an open port (the per-submit buffer length).
    pub fn port_sample_count(&self, handle: i32) -> Option<u32> {
        self.inner.lock().ports.get(&handle).map(|p| p.sample_count)
    }

    pub fn port_count(&self) -> usize {
        self.inner.lock().ports.len()
    }

    pub fn frames_output(&self, handle: i32) -> Option<u64> {
        self.inner.lock().ports.get(&handle).map(|p| p.frames_output)
    }

    /// Submit one buffer of interleaved PCM. Blocks for ~80 % of the
    /// buffer's playback time. Returns 0 or -1.
    pub fn output(&self, handle: i32, pcm: &[u8]) -> i32 {
        let pace = {
            let mut inner = self.inner.lock();
            let port = match inner.ports.get_mut(&handle) {
                Some(p) => p,
                None => return -1,
            };

            if !port.muted {
                if let Some(sink) = port.sink.as_mut() {
                    sink.write(pcm);
                }
            }
            port.frames_output += (pcm.len() / FRAME_SIZE) as u64;

            // 80 % of sample_count / 48000 seconds, in microseconds.
            (port.sample_count as u64 * 800_000) / SAMPLE_RATE as u64
        };

        // Sleep outside the lock so other ports are not stalled.
        std::thread::sleep(Duration::from_micros(pace));
        0
    }

    /// Set port volume in [0, 1]; multiplies through to the sink.
    pub fn set_volume(&self, handle: i32, volume: f32) -> i32 {
        let mut inner = self.inner.lock();
        let port = match inner.ports.get_mut(&handle) {
            Some(p) => p,
            None => return -1,
        };
        port.volume = volume.clamp(0.0, 1.0);
        let v = port.volume;
        if let Some(sink) = port.sink.as_mut() {
            sink.set_volume(v);
        }
        0
    }

    pub fn set_muted(&self, handle: i32, muted: bool) -> i32 {
        match self.inner.lock().ports.get_mut(&handle) {
            Some(port) => {
                port.muted = muted;
                0
            }
            None => -1,
        }
    }

    /// Stop all sinks and drop every port.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        for (_, port) in inner.ports.iter_mut() {
            if let Some(sink) = port.sink.as_mut() {
                sink.stop();
            }
        }
        inner.ports.clear();
        inner.initialized = false;
        info!("audio: shut down");
    }
}

impl Default for AudioOutManager {
    fn default() -> Self {
        Self::new()
    }
}
