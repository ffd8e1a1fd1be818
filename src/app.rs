//! Application glue shared by the interactive window and the headless runner.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glam::Vec3;
use log::{info, warn};

use crate::config::ShadowConfig;
use crate::mesh::{MeshData, MeshHandle, MeshInstance};
use crate::obj::{load_obj, ObjOptions};
use crate::render::{Camera, Coverage, Light, RenderDevice, SoftwareDevice, TextureId, Viewport};
use crate::scene::{ObjectKind, Scene};
use crate::shadow::{FrameStats, ShadowRenderer};
use crate::texture::TextureData;

/// Floor with a raised box and a pillar, lit from above and to the side.
pub const DEFAULT_SCENE: &str = r#"
<scene>
    <camera>
        <eye>0 12 18</eye>
        <target>0 0 0</target>
        <fov>45</fov>
    </camera>
    <light>
        <position>12 24 8</position>
        <color>255 255 255</color>
    </light>
    <object>
        <name>floor</name>
        <kind>floor</kind>
        <scale>10 1 10</scale>
        <texture>checker</texture>
        <casts-shadow>false</casts-shadow>
    </object>
    <object>
        <name>crate</name>
        <kind>box</kind>
        <position>0 2 0</position>
        <scale>3 1 3</scale>
        <color>200 120 60</color>
    </object>
    <object>
        <name>pillar</name>
        <kind>box</kind>
        <position>-5 2 -3</position>
        <scale>1 4 1</scale>
        <color>90 140 220</color>
    </object>
</scene>
"#;

/// Loads the scene at `path`, or the built-in scene when `path` is `None`.
///
/// Returns the scene and the directory OBJ paths are resolved against.
pub fn load_scene(path: Option<&Path>) -> Result<(Scene, PathBuf)> {
    match path {
        Some(path) => {
            let xml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read scene {}", path.display()))?;
            let scene = Scene::from_xml(&xml)
                .with_context(|| format!("failed to parse scene {}", path.display()))?;
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            Ok((scene, base))
        }
        None => Ok((
            Scene::from_xml(DEFAULT_SCENE).context("failed to parse the built-in scene")?,
            PathBuf::new(),
        )),
    }
}

pub fn camera_for(scene: &Scene, viewport: Viewport) -> Camera {
    Camera::look_at(
        scene.camera.eye,
        scene.camera.target,
        scene.camera.fov,
        viewport.aspect(),
    )
}

pub fn light_for(scene: &Scene) -> Light {
    Light::new(scene.light.position, scene.light.color)
}

/// Uploads every object of `scene` and returns the mesh list in scene order.
///
/// Built-in shapes and OBJ files are uploaded once and shared between
/// objects. Unknown texture names are ignored with a warning.
pub fn upload_scene<D: RenderDevice + ?Sized>(
    device: &mut D,
    scene: &Scene,
    base_dir: &Path,
) -> Result<Vec<MeshInstance>> {
    let mut meshes: HashMap<MeshKey, MeshHandle> = HashMap::new();
    let mut checker: Option<TextureId> = None;
    let mut instances = Vec::with_capacity(scene.objects.len());

    for object in &scene.objects {
        let key = match object.kind {
            ObjectKind::Floor => MeshKey::Floor,
            ObjectKind::Box => MeshKey::Box,
            ObjectKind::Obj => MeshKey::Obj(base_dir.join(object.mesh.clone().unwrap_or_default())),
        };
        let mesh = match meshes.get(&key) {
            Some(handle) => *handle,
            None => {
                let data = match &key {
                    MeshKey::Floor => MeshData::plane(1.0),
                    MeshKey::Box => MeshData::cuboid(Vec3::splat(0.5)),
                    MeshKey::Obj(path) => load_obj(path, ObjOptions::default())?,
                };
                let handle = device
                    .upload_mesh(&data, &object.name)
                    .with_context(|| format!("failed to upload mesh for `{}`", object.name))?;
                meshes.insert(key, handle);
                handle
            }
        };

        let texture = match object.texture.as_deref() {
            None => None,
            Some("checker") => match checker {
                Some(id) => Some(id),
                None => {
                    let data = TextureData::checker(256, 8, [235, 235, 235], [60, 60, 60]);
                    let id = device
                        .upload_texture(&data, "checker")
                        .context("failed to upload checker texture")?;
                    checker = Some(id);
                    checker
                }
            },
            Some(other) => {
                warn!("`{}` uses unknown texture `{other}`; drawing it untextured", object.name);
                None
            }
        };

        instances.push(
            MeshInstance::new(mesh, object.model_matrix())
                .with_color(object.color)
                .with_texture(texture)
                .with_opacity(object.opacity)
                .with_shadow(object.casts_shadow),
        );
    }
    Ok(instances)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MeshKey {
    Floor,
    Box,
    Obj(PathBuf),
}

/// Result of a headless run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessSummary {
    pub frames: u32,
    pub viewport: Viewport,
    pub resolution: u32,
    pub last_frame: FrameStats,
    pub coverage: Coverage,
}

impl fmt::Display for HeadlessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Rendered {} frame(s) at {}x{} with a {}x{} shadow map",
            self.frames,
            self.viewport.width,
            self.viewport.height,
            self.resolution,
            self.resolution
        )?;
        writeln!(
            f,
            "Draws per frame: {} shadow, {} main ({} skipped)",
            self.last_frame.shadow_draws, self.last_frame.main_draws, self.last_frame.skipped_meshes
        )?;
        let percent = if self.coverage.covered == 0 {
            0.0
        } else {
            100.0 * self.coverage.shadowed as f64 / self.coverage.covered as f64
        };
        write!(
            f,
            "Shadowed pixels: {} of {} ({percent:.1}%)",
            self.coverage.shadowed, self.coverage.covered
        )
    }
}

/// Renders `frames` frames of `scene` on the software device.
pub fn run_headless(
    scene: &Scene,
    base_dir: &Path,
    config: ShadowConfig,
    frames: u32,
    viewport: Viewport,
) -> Result<HeadlessSummary> {
    let mut device = SoftwareDevice::new();
    let renderer = ShadowRenderer::setup(&mut device, config)?;
    let meshes = upload_scene(&mut device, scene, base_dir)?;
    let camera = camera_for(scene, viewport);
    let light = light_for(scene);

    let mut last_frame = FrameStats::default();
    for frame in 0..frames {
        last_frame = renderer
            .render_frame(&mut device, &camera, &light, viewport, &meshes)
            .with_context(|| format!("frame {frame} failed"))?;
    }
    let summary = HeadlessSummary {
        frames,
        viewport,
        resolution: renderer.shadow_map().resolution(),
        last_frame,
        coverage: device.coverage(),
    };
    renderer.cleanup(&mut device);
    info!("headless run finished: {:?}", summary.coverage);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scene_loads() {
        let (scene, base) = load_scene(None).unwrap();
        assert_eq!(scene.objects.len(), 3);
        assert_eq!(base, PathBuf::new());
        assert_eq!(light_for(&scene).position, Vec3::new(12.0, 24.0, 8.0));
    }

    #[test]
    fn shared_shapes_are_uploaded_once() {
        let (scene, base) = load_scene(None).unwrap();
        let mut device = SoftwareDevice::new();
        let instances = upload_scene(&mut device, &scene, &base).unwrap();
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[1].mesh.id, instances[2].mesh.id);
        assert!(instances[0].texture.is_some());
        assert!(!instances[0].casts_shadow);
        // floor, box and checker texture
        assert_eq!(device.live_resources(), 3);
    }

    #[test]
    fn missing_obj_is_an_error() {
        let xml = "<scene><object><name>ghost</name><kind>obj</kind><mesh>missing.obj</mesh></object></scene>";
        let scene = Scene::from_xml(xml).unwrap();
        let mut device = SoftwareDevice::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(upload_scene(&mut device, &scene, dir.path()).is_err());
    }

    #[test]
    fn headless_run_reports_shadow() {
        let (scene, base) = load_scene(None).unwrap();
        let config = ShadowConfig {
            resolution: 256,
            ..scene.shadow.clone()
        };
        let summary = run_headless(&scene, &base, config, 2, Viewport::new(96, 64)).unwrap();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.last_frame.shadow_draws, 2);
        assert_eq!(summary.last_frame.main_draws, 3);
        assert!(summary.coverage.shadowed > 0);
        assert!(summary.coverage.shadowed < summary.coverage.covered);
        assert!(summary.to_string().contains("Shadowed pixels:"));
    }
}
