// SPDX-FileCopyrightText: 2025 rubis contributors
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod command_processor;
pub mod pm4;
pub mod render_queue;

pub use command_processor::GnmProcessor;
pub use render_queue::{PipelineState, RenderCommand, RenderQueue};
