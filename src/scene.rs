use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec3};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::config::{FrustumFit, IntensityPolicy, OrthoBounds, ShadowConfig, ShadowFilter};

/// Scene description: camera, light, shadow settings and objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Scene {
    pub camera: CameraDesc,
    pub light: LightDesc,
    pub shadow: ShadowConfig,
    pub objects: Vec<SceneObject>,
}

impl Scene {
    /// Parses scene XML. Settings missing from `<shadow>` keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        let mut scene = Scene::default();

        if let Some(node) = child(&root, "camera") {
            let camera = &mut scene.camera;
            camera.eye = parse_vec3(optional_text(&node, "eye"), camera.eye)?;
            camera.target = parse_vec3(optional_text(&node, "target"), camera.target)?;
            camera.fov = parse_f32(optional_text(&node, "fov"), camera.fov)?;
        }
        if let Some(node) = child(&root, "light") {
            let light = &mut scene.light;
            light.position = parse_vec3(optional_text(&node, "position"), light.position)?;
            light.color = parse_color(optional_text(&node, "color"), light.color)?;
        }
        if let Some(node) = child(&root, "shadow") {
            apply_shadow(&node, &mut scene.shadow).context("invalid <shadow> settings")?;
        }

        for node in root.children().filter(|n| n.has_tag_name("object")) {
            let mut object = SceneObject::default();
            object.name = required_text(&node, "name")?;
            object.kind = match optional_text(&node, "kind") {
                Some(kind) => kind.parse()?,
                None => object.kind,
            };
            object.mesh = optional_text(&node, "mesh").map(PathBuf::from);
            if object.kind == ObjectKind::Obj && object.mesh.is_none() {
                return Err(anyhow!("object `{}` has kind obj but no <mesh>", object.name));
            }
            object.color = parse_color(optional_text(&node, "color"), object.color)?;
            object.position = parse_vec3(optional_text(&node, "position"), object.position)?;
            object.rotation = parse_vec3(optional_text(&node, "rotation"), object.rotation)?;
            object.scale = parse_vec3(optional_text(&node, "scale"), object.scale)?;
            object.texture = optional_text(&node, "texture");
            object.casts_shadow =
                parse_bool(optional_text(&node, "casts-shadow"), object.casts_shadow)?;
            object.opacity = parse_f32(optional_text(&node, "opacity"), object.opacity)?;
            if !(0.0..=1.0).contains(&object.opacity) {
                return Err(anyhow!(
                    "object `{}` has opacity {}, expected a value in [0, 1]",
                    object.name,
                    object.opacity
                ));
            }
            scene.objects.push(object);
        }

        scene.shadow.validate()?;
        Ok(scene)
    }
}

fn apply_shadow(node: &Node<'_, '_>, shadow: &mut ShadowConfig) -> Result<()> {
    if let Some(resolution) = optional_text(node, "resolution") {
        shadow.resolution = resolution
            .parse()
            .with_context(|| format!("invalid resolution `{resolution}`"))?;
    }
    if let Some(filter) = optional_text(node, "filter") {
        shadow.filter = filter.parse::<ShadowFilter>()?;
    }
    match &mut shadow.filter {
        ShadowFilter::StochasticEdge { edge_samples } => {
            if let Some(samples) = optional_text(node, "edge-samples") {
                *edge_samples = samples
                    .parse()
                    .with_context(|| format!("invalid edge sample count `{samples}`"))?;
            }
        }
        ShadowFilter::Pcf { bias } => *bias = parse_f32(optional_text(node, "bias"), *bias)?,
        ShadowFilter::Binary => {}
    }
    match optional_text(node, "frustum").as_deref() {
        None => {}
        Some("fixed") => {
            let half = parse_f32(optional_text(node, "extent"), 10.0)?;
            let near = parse_f32(optional_text(node, "near"), -20.0)?;
            let far = parse_f32(optional_text(node, "far"), 100.0)?;
            shadow.frustum = FrustumFit::Fixed(OrthoBounds::symmetric(half, near, far));
        }
        Some("scene") => {
            shadow.frustum = FrustumFit::Scene {
                padding: parse_f32(optional_text(node, "padding"), 1.0)?,
            };
        }
        Some(other) => return Err(anyhow!("unknown frustum fit `{other}`")),
    }
    shadow.comparison_sampling =
        parse_bool(optional_text(node, "comparison"), shadow.comparison_sampling)?;

    let lighting = &mut shadow.lighting;
    lighting.ambient = parse_f32(optional_text(node, "ambient"), lighting.ambient)?;
    lighting.diffuse = parse_f32(optional_text(node, "diffuse"), lighting.diffuse)?;
    lighting.specular = parse_f32(optional_text(node, "specular"), lighting.specular)?;
    lighting.shininess = parse_f32(optional_text(node, "shininess"), lighting.shininess)?;
    lighting.faceted_shading =
        parse_bool(optional_text(node, "faceted"), lighting.faceted_shading)?;
    lighting.forward_facing_only = parse_bool(
        optional_text(node, "forward-facing-only"),
        lighting.forward_facing_only,
    )?;
    match optional_text(node, "intensity").as_deref() {
        None => {}
        Some("always") => lighting.intensity_policy = IntensityPolicy::Always,
        Some("match-facing") => lighting.intensity_policy = IntensityPolicy::MatchFacing,
        Some(other) => return Err(anyhow!("unknown intensity policy `{other}`")),
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraDesc {
    pub eye: Vec3,
    pub target: Vec3,
    pub fov: f32,
}

impl Default for CameraDesc {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 12.0, 18.0),
            target: Vec3::ZERO,
            fov: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightDesc {
    pub position: Vec3,
    pub color: Vec3,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            position: Vec3::new(20.0, 30.0, 20.0),
            color: Vec3::ONE,
        }
    }
}

/// Built-in geometry of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Unit floor plane, sized by `scale`.
    Floor,
    /// Unit cube, sized by `scale`.
    Box,
    /// Mesh loaded from `mesh`.
    Obj,
}

impl std::str::FromStr for ObjectKind {
    type Err = anyhow::Error;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "floor" => Ok(Self::Floor),
            "box" => Ok(Self::Box),
            "obj" => Ok(Self::Obj),
            other => Err(anyhow!("unknown object kind `{other}`")),
        }
    }
}

/// Object placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub kind: ObjectKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh: Option<PathBuf>,
    #[serde(default = "default_color")]
    pub color: Vec3,
    #[serde(default)]
    pub position: Vec3,
    /// Euler angles in degrees.
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    /// Procedural texture name; only `checker` is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default = "default_casts_shadow")]
    pub casts_shadow: bool,
    /// 1.0 is opaque; lower values blend over what is drawn before.
    #[serde(default = "default_opacity")]
    pub opacity: f32,
}

impl Default for SceneObject {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: ObjectKind::Box,
            mesh: None,
            color: default_color(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: default_scale(),
            texture: None,
            casts_shadow: default_casts_shadow(),
            opacity: default_opacity(),
        }
    }
}

impl SceneObject {
    pub fn model_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        let scale = Mat4::from_scale(self.scale);
        translation * rotation * scale
    }
}

fn default_color() -> Vec3 {
    Vec3::ONE
}

fn default_scale() -> Vec3 {
    Vec3::ONE
}

fn default_casts_shadow() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|child| child.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_components(value: &str, what: &str) -> Result<Vec3> {
    let mut numbers = value
        .split_whitespace()
        .filter_map(|component| component.parse::<f32>().ok());
    let mut next = || numbers.next().ok_or_else(|| anyhow!("{what} is missing components"));
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => parse_components(&value, "vector"),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(value) => Ok(parse_components(&value, "color")? / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float `{value}`: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true" | "yes" | "1") => Ok(true),
        Some("false" | "no" | "0") => Ok(false),
        Some(other) => Err(anyhow!("expected true or false, got `{other}`")),
    }
}
