use crate::config::{LightingConfig, ShadowConfig, ShadowFilter};
use crate::mesh::MeshInstance;
use crate::render::{
    Camera, Clear, Light, MainUniforms, PassPlan, PassTarget, PassUniforms, ProgramId, Viewport,
};

use super::draw::{draw_all, DrawPass};
use super::{DepthTarget, LightSpace};

/// Renders the scene from the camera, attenuated by the shadow map.
#[derive(Debug, Clone, Copy)]
pub struct MainPass {
    program: ProgramId,
    lighting: LightingConfig,
    filter: ShadowFilter,
    clear_color: wgpu::Color,
}

impl MainPass {
    pub const LABEL: &'static str = "main-pass";

    pub fn new(program: ProgramId, config: &ShadowConfig) -> Self {
        let [r, g, b, a] = config.clear_color.map(f64::from);
        Self {
            program,
            lighting: config.lighting,
            filter: config.filter,
            clear_color: wgpu::Color { r, g, b, a },
        }
    }

    pub fn set_filter(&mut self, filter: ShadowFilter) {
        self.filter = filter;
    }

    /// Colour and depth pass into the surface with back faces culled.
    pub fn record(
        &self,
        camera: &Camera,
        light: &Light,
        light_space: &LightSpace,
        viewport: Viewport,
        shadow_map: &DepthTarget,
        meshes: &[MeshInstance],
    ) -> PassPlan {
        let uniforms = MainUniforms::new(
            camera.projection,
            light_space.view_proj,
            light.view_position(camera),
            light.color,
            &self.lighting,
            &self.filter,
        );
        PassPlan {
            label: Self::LABEL,
            target: PassTarget::Surface,
            viewport,
            clear: Clear::color_and_depth(self.clear_color, 1.0),
            cull: wgpu::Face::Back,
            program: self.program,
            uniforms: PassUniforms::Main(uniforms),
            sampled: Some(shadow_map.id()),
            draws: draw_all(DrawPass::Main, meshes, &camera.view),
        }
    }
}
