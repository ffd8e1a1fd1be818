use log::{debug, info, warn};

use crate::config::{FrustumFit, ShadowConfig, ShadowFilter};
use crate::error::Result;
use crate::mesh::{Aabb, MeshInstance};
use crate::render::{Camera, FramePlan, Light, ProgramDesc, ProgramId, RenderDevice, Viewport};

use super::{DepthTarget, DepthTargetDesc, LightSpace, MainPass, ShadowPass, ShadowSampler};
use super::SHADOW_MAP_FORMAT;

/// Draw counts of a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub shadow_draws: usize,
    pub main_draws: usize,
    /// Meshes left out of the main pass because they had no geometry.
    pub skipped_meshes: usize,
}

/// Shadow-mapping renderer: two programs and one depth target.
///
/// Created with [`ShadowRenderer::setup`], driven once per frame with
/// [`ShadowRenderer::render_frame`] and released with
/// [`ShadowRenderer::cleanup`].
#[derive(Debug)]
pub struct ShadowRenderer {
    config: ShadowConfig,
    depth_program: ProgramId,
    main_program: ProgramId,
    shadow_map: DepthTarget,
    shadow_pass: ShadowPass,
    main_pass: MainPass,
}

impl ShadowRenderer {
    /// Links both programs and allocates the shadow map.
    ///
    /// Any failure is fatal; resources created before it are released.
    pub fn setup<D: RenderDevice + ?Sized>(device: &mut D, config: ShadowConfig) -> Result<Self> {
        config.validate()?;

        let depth_program = device.create_program(&ProgramDesc::depth(SHADOW_MAP_FORMAT))?;
        let main_program = match device.create_program(&ProgramDesc::main(config.comparison_sampling)) {
            Ok(id) => id,
            Err(err) => {
                device.destroy_program(depth_program);
                return Err(err);
            }
        };
        let map_desc = DepthTargetDesc::new(config.resolution).with_comparison(config.comparison_sampling);
        let shadow_map = match DepthTarget::create(device, map_desc) {
            Ok(target) => target,
            Err(err) => {
                device.destroy_program(main_program);
                device.destroy_program(depth_program);
                return Err(err);
            }
        };

        info!(
            "shadow renderer ready: {}x{} map, {}",
            config.resolution, config.resolution, config.filter
        );
        Ok(Self {
            shadow_pass: ShadowPass::new(depth_program),
            main_pass: MainPass::new(main_program, &config),
            config,
            depth_program,
            main_program,
            shadow_map,
        })
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    pub fn shadow_map(&self) -> &DepthTarget {
        &self.shadow_map
    }

    /// CPU sampler matching the filter the main program uses.
    pub fn sampler(&self) -> ShadowSampler {
        ShadowSampler::new(self.config.filter)
    }

    /// Switches the shadow filter from the next frame on.
    pub fn set_filter(&mut self, filter: ShadowFilter) {
        self.config.filter = filter;
        self.main_pass.set_filter(filter);
        debug!("shadow filter set to {filter}");
    }

    /// Light transform for this frame.
    pub fn light_space(&self, light: &Light, meshes: &[MeshInstance]) -> LightSpace {
        match self.config.frustum {
            FrustumFit::Fixed(bounds) => LightSpace::new(light.position, &bounds),
            FrustumFit::Scene { padding } => {
                let scene = meshes
                    .iter()
                    .filter(|instance| !instance.mesh.is_empty())
                    .fold(Aabb::EMPTY, |bounds, instance| {
                        bounds.union(&instance.world_bounds())
                    });
                LightSpace::fitted(light.position, &scene, padding)
            }
        }
    }

    /// Shadow pass followed by the main pass that samples it.
    pub fn plan_frame(
        &self,
        camera: &Camera,
        light: &Light,
        viewport: Viewport,
        meshes: &[MeshInstance],
    ) -> FramePlan {
        let light_space = self.light_space(light, meshes);
        let shadow = self.shadow_pass.record(&self.shadow_map, &light_space, meshes);
        let main = self.main_pass.record(
            camera,
            light,
            &light_space,
            viewport,
            &self.shadow_map,
            meshes,
        );
        FramePlan {
            passes: vec![shadow, main],
        }
    }

    pub fn render_frame<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        camera: &Camera,
        light: &Light,
        viewport: Viewport,
        meshes: &[MeshInstance],
    ) -> Result<FrameStats> {
        let plan = self.plan_frame(camera, light, viewport, meshes);
        device.execute(&plan)?;
        let shadow_draws = plan.passes[0].draws.len();
        let main_draws = plan.passes[1].draws.len();
        Ok(FrameStats {
            shadow_draws,
            main_draws,
            skipped_meshes: meshes.len() - main_draws,
        })
    }

    /// Replaces the shadow map with one of a new resolution.
    ///
    /// The old map stays in use if the new one cannot be created.
    pub fn resize_shadow_map<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        resolution: u32,
    ) -> Result<()> {
        if resolution == self.shadow_map.resolution() {
            return Ok(());
        }
        let desc = DepthTargetDesc::new(resolution).with_comparison(self.config.comparison_sampling);
        let replacement = DepthTarget::create(device, desc)
            .inspect_err(|err| warn!("keeping the current shadow map: {err}"))?;
        let previous = std::mem::replace(&mut self.shadow_map, replacement);
        previous.destroy(device);
        self.config.resolution = resolution;
        info!("shadow map resized to {resolution}x{resolution}");
        Ok(())
    }

    /// Releases the programs and the shadow map.
    pub fn cleanup<D: RenderDevice + ?Sized>(self, device: &mut D) {
        self.shadow_map.destroy(device);
        device.destroy_program(self.main_program);
        device.destroy_program(self.depth_program);
        debug!("shadow renderer released");
    }
}
