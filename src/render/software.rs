//! CPU implementation of [`RenderDevice`].
//!
//! Rasterizes the shadow pass into a [`DepthMap`] and evaluates the main pass
//! per pixel with [`ShadowSampler`], so shadow behaviour can be checked
//! without a GPU. Every pass and draw is also appended to an event log.

use std::collections::HashMap;
use std::ops::Range;

use glam::{Mat3, Vec2, Vec3, Vec4};
use log::{debug, warn};

use crate::config::IntensityPolicy;
use crate::error::{RenderError, Result};
use crate::mesh::{MeshData, MeshHandle, Vertex};
use crate::shadow::{DepthMap, DepthTargetDesc, ShadowSampler};
use crate::texture::TextureData;

use super::shared::validate_wgsl;
use super::{
    Clear, DepthTargetId, FramePlan, MainUniforms, MeshId, ObjectUniforms, PassPlan, PassTarget,
    PassUniforms, ProgramDesc, ProgramId, ProgramKind, RenderDevice, TextureId, Viewport,
};
use super::sampling_mismatch;

/// Entry in the device's command log.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    BeginPass {
        label: &'static str,
        target: PassTarget,
        clear: Clear,
        cull: wgpu::Face,
        sampled: Option<DepthTargetId>,
    },
    Draw {
        pass: &'static str,
        mesh: MeshId,
        indices: Range<u32>,
    },
    EndPass {
        label: &'static str,
    },
    Present,
}

/// Pixel counts of the last presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coverage {
    /// Pixels covered by geometry.
    pub covered: usize,
    /// Covered pixels with visibility below one.
    pub shadowed: usize,
}

struct SoftwareMesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

struct SoftwareTarget {
    desc: DepthTargetDesc,
    map: DepthMap,
}

#[derive(Default)]
struct Surface {
    width: u32,
    height: u32,
    depth: Vec<f32>,
    color: Vec<Vec3>,
    visibility: Vec<Option<f32>>,
}

impl Surface {
    fn prepare(&mut self, viewport: Viewport, clear: &Clear) {
        let len = viewport.width as usize * viewport.height as usize;
        if self.width != viewport.width || self.height != viewport.height {
            self.width = viewport.width;
            self.height = viewport.height;
            self.depth = vec![1.0; len];
            self.color = vec![Vec3::ZERO; len];
            self.visibility = vec![None; len];
        }
        if let Some(depth) = clear.depth {
            self.depth.fill(depth);
            self.visibility.fill(None);
        }
        if let Some(color) = clear.color {
            self.color
                .fill(Vec3::new(color.r as f32, color.g as f32, color.b as f32));
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }
}

/// Software rasterizer used for tests and the headless summary.
pub struct SoftwareDevice {
    max_dimension: u32,
    next_id: u32,
    programs: HashMap<ProgramId, ProgramKind>,
    depth_targets: HashMap<DepthTargetId, SoftwareTarget>,
    meshes: HashMap<MeshId, SoftwareMesh>,
    textures: HashMap<TextureId, TextureData>,
    surface: Surface,
    events: Vec<DeviceEvent>,
    frames: u64,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    /// Texture limit of the software device unless configured otherwise.
    pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

    pub fn new() -> Self {
        Self::with_max_texture_dimension(Self::DEFAULT_MAX_DIMENSION)
    }

    pub fn with_max_texture_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension,
            next_id: 0,
            programs: HashMap::new(),
            depth_targets: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            surface: Surface::default(),
            events: Vec::new(),
            frames: 0,
        }
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    /// Programs, depth targets, meshes and textures still alive.
    pub fn live_resources(&self) -> usize {
        self.programs.len() + self.depth_targets.len() + self.meshes.len() + self.textures.len()
    }

    pub fn has_program(&self, id: ProgramId) -> bool {
        self.programs.contains_key(&id)
    }

    pub fn has_depth_target(&self, id: DepthTargetId) -> bool {
        self.depth_targets.contains_key(&id)
    }

    pub fn depth_map(&self, id: DepthTargetId) -> Option<&DepthMap> {
        self.depth_targets.get(&id).map(|target| &target.map)
    }

    pub fn frame_size(&self) -> Viewport {
        Viewport::new(self.surface.width, self.surface.height)
    }

    /// Shadow visibility of the visible fragment at a pixel, if any.
    pub fn visibility_at(&self, x: u32, y: u32) -> Option<f32> {
        self.surface
            .index(x, y)
            .and_then(|index| self.surface.visibility[index])
    }

    pub fn color_at(&self, x: u32, y: u32) -> Option<Vec3> {
        self.surface.index(x, y).map(|index| self.surface.color[index])
    }

    pub fn coverage(&self) -> Coverage {
        self.surface
            .visibility
            .iter()
            .flatten()
            .fold(Coverage::default(), |mut coverage, &visibility| {
                coverage.covered += 1;
                if visibility < 1.0 {
                    coverage.shadowed += 1;
                }
                coverage
            })
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn run_pass(&mut self, pass: &PassPlan) -> Result<()> {
        let kind = *self
            .programs
            .get(&pass.program)
            .ok_or_else(|| unknown(ProgramId::KIND, pass.program.0))?;
        self.events.push(DeviceEvent::BeginPass {
            label: pass.label,
            target: pass.target,
            clear: pass.clear,
            cull: pass.cull,
            sampled: pass.sampled,
        });

        match (pass.target, &pass.uniforms, kind) {
            (PassTarget::DepthTarget(id), PassUniforms::Depth(uniforms), ProgramKind::Depth { .. }) => {
                if pass.sampled == Some(id) {
                    return Err(RenderError::Device(format!(
                        "pass `{}` samples the depth target it renders into",
                        pass.label
                    )));
                }
                self.run_depth_pass(pass, id, uniforms.depth_vp())?
            }
            (PassTarget::Surface, PassUniforms::Main(uniforms), ProgramKind::Main { comparison }) => {
                self.run_main_pass(pass, uniforms, comparison)?
            }
            _ => {
                return Err(RenderError::Device(format!(
                    "pass `{}` mixes incompatible target, uniforms and program",
                    pass.label
                )))
            }
        }

        self.events.push(DeviceEvent::EndPass { label: pass.label });
        Ok(())
    }

    fn run_depth_pass(&mut self, pass: &PassPlan, id: DepthTargetId, depth_vp: glam::Mat4) -> Result<()> {
        let target = self
            .depth_targets
            .get_mut(&id)
            .ok_or_else(|| unknown(DepthTargetId::KIND, id.0))?;
        if let Some(depth) = pass.clear.depth {
            target.map.clear(depth);
        }
        let size = target.map.size();

        for draw in &pass.draws {
            let mesh = self
                .meshes
                .get(&draw.mesh)
                .ok_or_else(|| unknown(MeshId::KIND, draw.mesh.0))?;
            let transform = depth_vp * draw.object.model();
            let clip: Vec<Vec4> = mesh
                .vertices
                .iter()
                .map(|vertex| transform * vertex.position().extend(1.0))
                .collect();

            for range in &draw.index_ranges {
                self.events.push(DeviceEvent::Draw {
                    pass: pass.label,
                    mesh: draw.mesh,
                    indices: range.clone(),
                });
                for triangle in triangles(&mesh.indices, range) {
                    let corners = triangle.map(|index| clip[index as usize]);
                    rasterize(corners, size, size, pass.cull, |fragment| {
                        target.map.write_nearest(fragment.x, fragment.y, fragment.depth);
                    });
                }
            }
        }
        Ok(())
    }

    fn run_main_pass(&mut self, pass: &PassPlan, uniforms: &MainUniforms, comparison: bool) -> Result<()> {
        let map = match pass.sampled {
            Some(id) => {
                let target = self
                    .depth_targets
                    .get(&id)
                    .ok_or_else(|| unknown(DepthTargetId::KIND, id.0))?;
                if target.desc.comparison != comparison {
                    return Err(sampling_mismatch(pass.label, id, target.desc.comparison));
                }
                Some(&target.map)
            }
            None => None,
        };
        let sampler = ShadowSampler::new(uniforms.filter());
        let shading = Shading::new(uniforms);
        let surface = &mut self.surface;
        surface.prepare(pass.viewport, &pass.clear);
        let (width, height) = (surface.width, surface.height);

        for draw in &pass.draws {
            let mesh = self
                .meshes
                .get(&draw.mesh)
                .ok_or_else(|| unknown(MeshId::KIND, draw.mesh.0))?;
            let texture = match draw.texture {
                Some(id) if draw.object.uses_texture() => {
                    let texture = self.textures.get(&id);
                    if texture.is_none() {
                        warn!("texture {id} is missing; drawing {} untextured", draw.mesh);
                    }
                    texture
                }
                _ => None,
            };
            let varyings: Vec<Varyings> = mesh
                .vertices
                .iter()
                .map(|vertex| Varyings::new(vertex, &draw.object, uniforms))
                .collect();

            for range in &draw.index_ranges {
                self.events.push(DeviceEvent::Draw {
                    pass: pass.label,
                    mesh: draw.mesh,
                    indices: range.clone(),
                });
                for triangle in triangles(&mesh.indices, range) {
                    let corners = triangle.map(|index| &varyings[index as usize]);
                    let face_normal = (corners[1].view_position - corners[0].view_position)
                        .cross(corners[2].view_position - corners[0].view_position);
                    let clip = corners.map(|varying| varying.clip);

                    rasterize(clip, width, height, pass.cull, |fragment| {
                        let Some(index) = surface.index(fragment.x, fragment.y) else {
                            return;
                        };
                        if fragment.depth >= surface.depth[index] {
                            return;
                        }
                        let varying = Varyings::blend(&corners, fragment.weights);
                        let texel = texture.map(|texture| texture.sample(varying.uv));
                        let frag = Vec2::new(fragment.x as f32 + 0.5, fragment.y as f32 + 0.5);
                        let visibility = map
                            .map(|map| sampler.visibility(map, varying.light_clip, frag))
                            .unwrap_or(1.0);
                        let Some(rgb) = shading.shade(
                            &draw.object,
                            &varying,
                            face_normal,
                            fragment.front_facing,
                            texel,
                            visibility,
                        ) else {
                            return;
                        };
                        // Source-over blending with the object's opacity.
                        let alpha = draw.object.opacity();
                        surface.depth[index] = fragment.depth;
                        surface.color[index] = rgb * alpha + surface.color[index] * (1.0 - alpha);
                        surface.visibility[index] = Some(visibility);
                    });
                }
            }
        }
        Ok(())
    }
}

impl RenderDevice for SoftwareDevice {
    fn max_texture_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        let module = validate_wgsl(&desc.label, &desc.source)?;
        let required: &[&str] = match desc.kind {
            ProgramKind::Depth { .. } => &["vs_depth"],
            ProgramKind::Main { .. } => &["vs_main", "fs_main"],
        };
        for name in required {
            if !module.entry_points.iter().any(|ep| ep.name == *name) {
                return Err(RenderError::ShaderCompile {
                    label: desc.label.clone(),
                    message: format!("missing entry point `{name}`"),
                });
            }
        }
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, desc.kind);
        debug!("linked program `{}` as {id}", desc.label);
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn create_depth_target(&mut self, desc: &DepthTargetDesc) -> Result<DepthTargetId> {
        desc.check(self.max_dimension)?;
        let id = DepthTargetId(self.allocate_id());
        self.depth_targets.insert(
            id,
            SoftwareTarget {
                desc: *desc,
                map: DepthMap::new(desc.resolution),
            },
        );
        Ok(id)
    }

    fn destroy_depth_target(&mut self, id: DepthTargetId) {
        if let Some(target) = self.depth_targets.remove(&id) {
            debug!("released {}x{} depth target", target.desc.resolution, target.desc.resolution);
        }
    }

    fn upload_mesh(&mut self, mesh: &MeshData, label: &str) -> Result<MeshHandle> {
        if !mesh.indices_in_range() {
            return Err(RenderError::Device(format!(
                "mesh `{label}` indexes past its {} vertices",
                mesh.vertices.len()
            )));
        }
        let id = MeshId(self.allocate_id());
        self.meshes.insert(
            id,
            SoftwareMesh {
                vertices: mesh.vertices.clone(),
                indices: mesh.index_data(),
            },
        );
        Ok(MeshHandle {
            id,
            triangles: mesh.triangles.len() as u32,
            quads: mesh.quads.len() as u32,
            bounds: mesh.bounds(),
        })
    }

    fn upload_texture(&mut self, texture: &TextureData, label: &str) -> Result<TextureId> {
        if !texture.is_valid() {
            return Err(RenderError::Device(format!(
                "texture `{label}` has {} bytes for {}x{} texels",
                texture.rgba.len(),
                texture.width,
                texture.height
            )));
        }
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, texture.clone());
        Ok(id)
    }

    fn execute(&mut self, plan: &FramePlan) -> Result<()> {
        for pass in &plan.passes {
            self.run_pass(pass)?;
        }
        self.events.push(DeviceEvent::Present);
        self.frames += 1;
        Ok(())
    }
}

fn unknown(kind: &'static str, id: u32) -> RenderError {
    RenderError::UnknownResource { kind, id }
}

fn triangles<'a>(indices: &'a [u32], range: &Range<u32>) -> impl Iterator<Item = [u32; 3]> + 'a {
    let start = (range.start as usize).min(indices.len());
    let end = (range.end as usize).min(indices.len());
    indices[start..end]
        .chunks_exact(3)
        .map(|triangle| [triangle[0], triangle[1], triangle[2]])
}

/// Per-vertex outputs of the main program.
#[derive(Debug, Clone, Copy)]
struct Varyings {
    clip: Vec4,
    view_position: Vec3,
    normal: Vec3,
    uv: Vec2,
    light_clip: Vec4,
}

impl Varyings {
    fn new(vertex: &Vertex, object: &ObjectUniforms, uniforms: &MainUniforms) -> Self {
        let local = vertex.position().extend(1.0);
        let view = object.model_view() * local;
        let normal_matrix = Mat3::from_cols(
            Vec4::from_array(object.normal[0]).truncate(),
            Vec4::from_array(object.normal[1]).truncate(),
            Vec4::from_array(object.normal[2]).truncate(),
        );
        Self {
            clip: uniforms.persp() * view,
            view_position: view.truncate(),
            normal: normal_matrix * Vec3::from_array(vertex.normal),
            uv: Vec2::from_array(vertex.uv),
            light_clip: uniforms.depth_vp() * object.model() * local,
        }
    }

    fn blend(corners: &[&Varyings; 3], weights: Vec3) -> Self {
        let [a, b, c] = corners;
        Self {
            clip: a.clip * weights.x + b.clip * weights.y + c.clip * weights.z,
            view_position: a.view_position * weights.x
                + b.view_position * weights.y
                + c.view_position * weights.z,
            normal: a.normal * weights.x + b.normal * weights.y + c.normal * weights.z,
            uv: a.uv * weights.x + b.uv * weights.y + c.uv * weights.z,
            light_clip: a.light_clip * weights.x
                + b.light_clip * weights.y
                + c.light_clip * weights.z,
        }
    }
}

/// Fragment stage of the main program.
struct Shading {
    light_position: Vec3,
    light_color: Vec3,
    ambient: f32,
    diffuse: f32,
    specular: f32,
    shininess: f32,
    faceted: bool,
    forward_facing_only: bool,
    policy: IntensityPolicy,
}

impl Shading {
    fn new(uniforms: &MainUniforms) -> Self {
        let [ambient, diffuse, specular, shininess] = uniforms.material;
        Self {
            light_position: Vec4::from_array(uniforms.light_position).truncate(),
            light_color: Vec4::from_array(uniforms.light_color).truncate(),
            ambient,
            diffuse,
            specular,
            shininess,
            faceted: uniforms.flags[1] != 0,
            forward_facing_only: uniforms.flags[2] != 0,
            policy: if uniforms.flags[3] == 0 {
                IntensityPolicy::Always
            } else {
                IntensityPolicy::MatchFacing
            },
        }
    }

    /// Lit colour, or `None` when the fragment is discarded.
    fn shade(
        &self,
        object: &ObjectUniforms,
        varying: &Varyings,
        face_normal: Vec3,
        front_facing: bool,
        texel: Option<Vec3>,
        visibility: f32,
    ) -> Option<Vec3> {
        let n = if self.faceted {
            face_normal.normalize_or_zero()
        } else {
            varying.normal.normalize_or_zero()
        };
        if self.forward_facing_only && n.z < 0.0 {
            return None;
        }
        let e = varying.view_position.normalize_or_zero();
        let l = (self.light_position - varying.view_position).normalize_or_zero();
        let dd = l.dot(n);
        let (mut d, mut s) = (0.0, 0.0);
        if self.policy == IntensityPolicy::Always || (dd > 0.0) == front_facing {
            d = dd.abs();
            let r = l - 2.0 * n.dot(l) * n;
            s = r.dot(e).max(0.0).powf(self.shininess);
        }
        let ds = self.diffuse * d + self.specular * s;
        let tint = Vec4::from_array(object.color).truncate();
        let base = texel.map_or(tint, |texel| texel * tint);
        Some(base * visibility * (Vec3::splat(self.ambient) + ds * self.light_color))
    }
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    x: u32,
    y: u32,
    depth: f32,
    /// Perspective-correct weights of the original triangle's corners.
    weights: Vec3,
    front_facing: bool,
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    clip: Vec4,
    weights: Vec3,
}

impl ClipVertex {
    fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            clip: self.clip.lerp(other.clip, t),
            weights: self.weights.lerp(other.weights, t),
        }
    }
}

// Clips against the near plane (z >= 0), then scan-converts each piece of the
// resulting fan with counter-clockwise-in-NDC as the front face.
fn rasterize(clip: [Vec4; 3], width: u32, height: u32, cull: wgpu::Face, mut emit: impl FnMut(Fragment)) {
    let corners = [
        ClipVertex { clip: clip[0], weights: Vec3::X },
        ClipVertex { clip: clip[1], weights: Vec3::Y },
        ClipVertex { clip: clip[2], weights: Vec3::Z },
    ];
    let polygon = clip_near(&corners);
    if polygon.len() < 3 || polygon.iter().any(|vertex| vertex.clip.w <= 1e-6) {
        return;
    }
    for i in 1..polygon.len() - 1 {
        rasterize_piece([polygon[0], polygon[i], polygon[i + 1]], width, height, cull, &mut emit);
    }
}

fn clip_near(corners: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    let mut polygon = Vec::with_capacity(4);
    for i in 0..3 {
        let a = corners[i];
        let b = corners[(i + 1) % 3];
        let (da, db) = (a.clip.z, b.clip.z);
        if da >= 0.0 {
            polygon.push(a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            polygon.push(a.lerp(&b, da / (da - db)));
        }
    }
    polygon
}

fn rasterize_piece(
    piece: [ClipVertex; 3],
    width: u32,
    height: u32,
    cull: wgpu::Face,
    emit: &mut impl FnMut(Fragment),
) {
    let screen = piece.map(|vertex| {
        let ndc = vertex.clip.truncate() / vertex.clip.w;
        Vec3::new(
            (ndc.x * 0.5 + 0.5) * width as f32,
            (0.5 - ndc.y * 0.5) * height as f32,
            ndc.z,
        )
    });
    let [a, b, c] = screen;
    let area = edge(a, b, c);
    if area.abs() <= f32::EPSILON {
        return;
    }
    // Screen y points down, so a counter-clockwise NDC triangle has negative area here.
    let front_facing = area < 0.0;
    let culled = match cull {
        wgpu::Face::Front => front_facing,
        wgpu::Face::Back => !front_facing,
    };
    if culled {
        return;
    }

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil().max(0.0) as u32).min(width);
    let max_y = (a.y.max(b.y).max(c.y).ceil().max(0.0) as u32).min(height);
    let inverse_w = piece.map(|vertex| 1.0 / vertex.clip.w);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
            let l0 = edge(b, c, p) / area;
            let l1 = edge(c, a, p) / area;
            let l2 = edge(a, b, p) / area;
            if l0 < 0.0 || l1 < 0.0 || l2 < 0.0 {
                continue;
            }
            let depth = l0 * a.z + l1 * b.z + l2 * c.z;
            if !(0.0..=1.0).contains(&depth) {
                continue;
            }
            let p0 = l0 * inverse_w[0];
            let p1 = l1 * inverse_w[1];
            let p2 = l2 * inverse_w[2];
            let weights = (piece[0].weights * p0 + piece[1].weights * p1 + piece[2].weights * p2)
                / (p0 + p1 + p2);
            emit(Fragment {
                x,
                y,
                depth,
                weights,
                front_facing,
            });
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}
