// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Null presenter: drains render commands and reports frame statistics.
//!
//! Stands in for the Vulkan backend while the GPU parser is brought up —
//! every command is accounted for but nothing is drawn.

use log::{debug, trace};
use rubis_gpu::RenderCommand;

#[derive(Default)]
pub struct NullPresenter {
    frames: u64,
    draw_calls: u32,
    dispatches: u32,
    vertices: u64,
}

impl NullPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Consume one batch of commands from the render queue.
    pub fn consume(&mut self, commands: Vec<RenderCommand>) {
        for cmd in commands {
            match cmd {
                RenderCommand::Draw {
                    vertex_count,
                    instance_count,
                    ..
                } => {
                    self.draw_calls += 1;
                    self.vertices += vertex_count as u64 * instance_count.max(1) as u64;
                }
                RenderCommand::DrawIndexed {
                    index_count,
                    instance_count,
                    ..
                } => {
                    self.draw_calls += 1;
                    self.vertices += index_count as u64 * instance_count.max(1) as u64;
                }
                RenderCommand::ComputeDispatch { x, y, z } => {
                    self.dispatches += 1;
                    trace!("dispatch {}x{}x{}", x, y, z);
                }
                RenderCommand::EndFrame => {
                    self.frames += 1;
                    debug!(
                        "frame {}: {} draws, {} dispatches, {} vertices",
                        self.frames, self.draw_calls, self.dispatches, self.vertices
                    );
                    self.draw_calls = 0;
                    self.dispatches = 0;
                    self.vertices = 0;
                }
                other => {
                    trace!("render command: {:?}", other);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_counting() {
        let mut p = NullPresenter::new();
        p.consume(vec![
            RenderCommand::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            },
            RenderCommand::EndFrame,
            RenderCommand::EndFrame,
        ]);
        assert_eq!(p.frames(), 2);
    }
}
