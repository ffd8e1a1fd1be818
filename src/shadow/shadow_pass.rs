use crate::mesh::MeshInstance;
use crate::render::{Clear, DepthUniforms, PassPlan, PassTarget, PassUniforms, ProgramId};

use super::draw::{draw_all, DrawPass};
use super::{DepthTarget, LightSpace};

/// Renders shadow casters from the light into the depth target.
#[derive(Debug, Clone, Copy)]
pub struct ShadowPass {
    program: ProgramId,
}

impl ShadowPass {
    pub const LABEL: &'static str = "shadow-pass";

    pub fn new(program: ProgramId) -> Self {
        Self { program }
    }

    /// Depth-only pass over the full target with front faces culled.
    pub fn record(
        &self,
        target: &DepthTarget,
        light_space: &LightSpace,
        meshes: &[MeshInstance],
    ) -> PassPlan {
        PassPlan {
            label: Self::LABEL,
            target: PassTarget::DepthTarget(target.id()),
            viewport: target.viewport(),
            clear: Clear::depth_only(1.0),
            cull: wgpu::Face::Front,
            program: self.program,
            uniforms: PassUniforms::Depth(DepthUniforms::new(light_space.view_proj)),
            sampled: None,
            draws: draw_all(DrawPass::Shadow, meshes, &light_space.view),
        }
    }
}
