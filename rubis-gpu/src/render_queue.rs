// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Thread-safe render command queue.
//!
//! Bridges the guest CPU thread (producer, via the GNM submit handler) and
//! the host render thread (consumer). FIFO order is preserved across
//! `pop_all`; push operations wake a single waiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Pipeline configuration snapshot carried by `SetPipeline`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineState {
    pub vs_shader_addr: u64,
    pub ps_shader_addr: u64,
    pub cs_shader_addr: u64,
    /// 4 = triangle list.
    pub primitive_type: u32,
    pub cull_mode: u32,
    pub front_face: u32,
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub blend_enable: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            vs_shader_addr: 0,
            ps_shader_addr: 0,
            cs_shader_addr: 0,
            primitive_type: 4,
            cull_mode: 0,
            front_face: 0,
            depth_test_enable: true,
            depth_write_enable: true,
            blend_enable: false,
        }
    }
}

/// One abstract command for the host renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Clear {
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    },
    SetPipeline {
        state: PipelineState,
    },
    BindVertexBuffer {
        address: u64,
        stride: u32,
    },
    BindIndexBuffer {
        address: u64,
        index_type: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        /// 0 = 16-bit indices, 1 = 32-bit.
        index_type: u32,
        index_buffer_address: u64,
    },
    ComputeDispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    EndFrame,
}

/// Mutex + condvar FIFO with telemetry counters.
pub struct RenderQueue {
    queue: Mutex<VecDeque<RenderCommand>>,
    available: Condvar,
    total_pushed: AtomicU64,
    total_popped: AtomicU64,
    frame_count: AtomicU64,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            total_pushed: AtomicU64::new(0),
            total_popped: AtomicU64::new(0),
            frame_count: AtomicU64::new(0),
        }
    }

    pub fn push(&self, cmd: RenderCommand) {
        {
            let mut q = self.queue.lock();
            q.push_back(cmd);
            self.total_pushed.fetch_add(1, Ordering::Relaxed);
        }
        self.available.notify_one();
    }

    pub fn push_many(&self, cmds: Vec<RenderCommand>) {
        if cmds.is_empty() {
            return;
        }
        {
            let mut q = self.queue.lock();
            self.total_pushed.fetch_add(cmds.len() as u64, Ordering::Relaxed);
            q.extend(cmds);
        }
        self.available.notify_one();
    }

    /// Push the frame terminator and bump the frame counter.
    pub fn end_frame(&self) {
        self.push(RenderCommand::EndFrame);
        self.frame_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drain the whole queue atomically; non-blocking.
    pub fn pop_all(&self) -> Vec<RenderCommand> {
        let mut q = self.queue.lock();
        let drained: Vec<RenderCommand> = q.drain(..).collect();
        self.total_popped
            .fetch_add(drained.len() as u64, Ordering::Relaxed);
        drained
    }

    /// Block until the queue is non-empty or the timeout expires.
    /// Returns whether commands are available.
    pub fn wait_for_commands(&self, timeout_ms: u64) -> bool {
        let mut q = self.queue.lock();
        if !q.is_empty() {
            return true;
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while q.is_empty() {
            if self.available.wait_until(&mut q, deadline).timed_out() {
                return !q.is_empty();
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }

    pub fn total_pushed(&self) -> u64 {
        self.total_pushed.load(Ordering::Relaxed)
    }

    pub fn total_popped(&self) -> u64 {
        self.total_popped.load(Ordering::Relaxed)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order_preserved() {
        let q = RenderQueue::new();
        q.push(RenderCommand::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
        q.push(RenderCommand::ComputeDispatch { x: 1, y: 1, z: 1 });
        q.push(RenderCommand::EndFrame);

        let cmds = q.pop_all();
        assert_eq!(cmds.len(), 3);
        assert!(matches!(cmds[0], RenderCommand::Draw { vertex_count: 3, .. }));
        assert!(matches!(cmds[1], RenderCommand::ComputeDispatch { .. }));
        assert!(matches!(cmds[2], RenderCommand::EndFrame));
        assert!(q.is_empty());
    }

    #[test]
    fn test_end_frame_marks_sequence() {
        let q = RenderQueue::new();
        q.push(RenderCommand::Draw {
            vertex_count: 6,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        });
        q.end_frame();

        let cmds = q.pop_all();
        assert_eq!(cmds.last(), Some(&RenderCommand::EndFrame));
        assert_eq!(q.frame_count(), 1);
    }

    #[test]
    fn test_push_many_counts() {
        let q = RenderQueue::new();
        q.push_many(vec![
            RenderCommand::EndFrame,
            RenderCommand::EndFrame,
            RenderCommand::EndFrame,
        ]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.total_pushed(), 3);
        q.pop_all();
        assert_eq!(q.total_popped(), 3);
    }

    #[test]
    fn test_wait_times_out_when_empty() {
        let q = RenderQueue::new();
        assert!(!q.wait_for_commands(10));
    }

    #[test]
    fn test_wait_returns_immediately_when_nonempty() {
        let q = RenderQueue::new();
        q.push(RenderCommand::EndFrame);
        assert!(q.wait_for_commands(0));
    }

    #[test]
    fn test_wait_wakes_on_cross_thread_push() {
        let q = Arc::new(RenderQueue::new());
        let producer = q.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            producer.push(RenderCommand::EndFrame);
        });
        assert!(q.wait_for_commands(2000));
        handle.join().unwrap();
        assert_eq!(q.pop_all().len(), 1);
    }

    #[test]
    fn test_clear_discards_pending() {
        let q = RenderQueue::new();
        q.push(RenderCommand::EndFrame);
        q.clear();
        assert!(q.is_empty());
        assert!(q.pop_all().is_empty());
    }
}
