use std::ops::Range;

use super::uniforms::{DepthUniforms, MainUniforms, ObjectUniforms};
use super::{DepthTargetId, MeshId, ProgramId, TextureId};

/// Size of the drawable area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Render target of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    DepthTarget(DepthTargetId),
    Surface,
}

/// Buffers cleared when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clear {
    pub color: Option<wgpu::Color>,
    pub depth: Option<f32>,
}

impl Clear {
    pub fn depth_only(depth: f32) -> Self {
        Self {
            color: None,
            depth: Some(depth),
        }
    }

    pub fn color_and_depth(color: wgpu::Color, depth: f32) -> Self {
        Self {
            color: Some(color),
            depth: Some(depth),
        }
    }

    pub fn is_depth_only(&self) -> bool {
        self.color.is_none() && self.depth.is_some()
    }
}

/// Per-pass uniform block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PassUniforms {
    Depth(DepthUniforms),
    Main(MainUniforms),
}

/// One mesh drawn in a pass. Each index range becomes its own draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub mesh: MeshId,
    pub texture: Option<TextureId>,
    pub object: ObjectUniforms,
    pub index_ranges: Vec<Range<u32>>,
}

/// Everything a device needs to encode one render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassPlan {
    pub label: &'static str,
    pub target: PassTarget,
    pub viewport: Viewport,
    pub clear: Clear,
    pub cull: wgpu::Face,
    pub program: ProgramId,
    pub uniforms: PassUniforms,
    /// Depth target bound for sampling while this pass runs.
    pub sampled: Option<DepthTargetId>,
    pub draws: Vec<DrawCall>,
}

/// Ordered passes making up one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePlan {
    pub passes: Vec<PassPlan>,
}

impl FramePlan {
    pub fn draw_count(&self) -> usize {
        self.passes.iter().map(|pass| pass.draws.len()).sum()
    }
}
