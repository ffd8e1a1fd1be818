use std::fmt::Write as _;

use naga::valid::{Capabilities, ValidationFlags, Validator};

use crate::error::{RenderError, Result};
use crate::shadow::EDGE_SAMPLE_OFFSETS;

/// Parses and validates WGSL, reporting problems as `ShaderCompile`.
pub fn validate_wgsl(label: &str, source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| RenderError::ShaderCompile {
        label: label.to_string(),
        message: err.emit_to_string(source),
    })?;
    Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| RenderError::ShaderCompile {
            label: label.to_string(),
            message: err.emit_to_string(source),
        })?;
    if module.entry_points.is_empty() {
        return Err(RenderError::ShaderCompile {
            label: label.to_string(),
            message: "program has no entry points".to_string(),
        });
    }
    Ok(module)
}

const COMPARE_LOOKUP: &str = r#"
fn shadow_lit(uv: vec2<f32>, reference: f32) -> bool {
    return textureSampleCompareLevel(shadow_map, shadow_sampler, uv, reference) > 0.5;
}
"#;

const LOAD_LOOKUP: &str = r#"
fn shadow_lit(uv: vec2<f32>, reference: f32) -> bool {
    let size = textureDimensions(shadow_map);
    let texel = min(vec2<u32>(uv * vec2<f32>(size)), size - vec2<u32>(1u, 1u));
    return reference <= textureLoad(shadow_map, texel, 0);
}
"#;

/// Main program source with the edge offset table and the shadow map lookup
/// filled in.
pub(crate) fn main_shader_source(comparison: bool) -> String {
    let mut table = String::new();
    for (index, [x, y]) in EDGE_SAMPLE_OFFSETS.iter().enumerate() {
        if index > 0 {
            table.push_str(",\n    ");
        }
        let _ = write!(table, "vec2<f32>({x:?}, {y:?})");
    }
    let lookup = if comparison { COMPARE_LOOKUP } else { LOAD_LOOKUP };
    MAIN_SHADER
        .replace("EDGE_OFFSET_TABLE", &table)
        .replace("SHADOW_LOOKUP", lookup)
}

pub const DEPTH_SHADER: &str = r#"
struct DepthUniforms {
    depth_vp: mat4x4<f32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    model_view: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    flags: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> light_view: DepthUniforms;

@group(1) @binding(0)
var<uniform> object: ObjectUniforms;

@vertex
fn vs_depth(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return light_view.depth_vp * object.model * vec4<f32>(position, 1.0);
}
"#;

pub const MAIN_SHADER: &str = r#"
struct Globals {
    persp: mat4x4<f32>,
    depth_vp: mat4x4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    material: vec4<f32>,
    shadow: vec4<f32>,
    flags: vec4<u32>,
}

struct ObjectUniforms {
    model: mat4x4<f32>,
    model_view: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
    flags: vec4<u32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;
@group(0) @binding(1)
var shadow_map: texture_depth_2d;
@group(0) @binding(2)
var shadow_sampler: sampler_comparison;

@group(1) @binding(0)
var<uniform> object: ObjectUniforms;

@group(2) @binding(0)
var base_texture: texture_2d<f32>;
@group(2) @binding(1)
var base_sampler: sampler;

var<private> edge_offsets: array<vec2<f32>, 32> = array<vec2<f32>, 32>(
    EDGE_OFFSET_TABLE
);

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) view_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
    @location(3) light_clip: vec4<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let model_position = vec4<f32>(input.position, 1.0);
    let view_position = object.model_view * model_position;
    out.clip_position = globals.persp * view_position;
    out.view_position = view_position.xyz;
    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normal_matrix * input.normal;
    out.uv = input.uv;
    out.light_clip = globals.depth_vp * object.model * model_position;
    return out;
}

fn rand(seed: vec4<f32>) -> f32 {
    let d = dot(seed, vec4<f32>(12.9898, 78.233, 45.164, 94.673));
    return fract(sin(d) * 43758.5453);
}

fn shadow_coord(light_clip: vec4<f32>) -> vec3<f32> {
    let ndc = light_clip.xyz / light_clip.w;
    return vec3<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5, ndc.z);
}

SHADOW_LOOKUP
fn classify(coord: vec3<f32>, offset: vec2<f32>) -> f32 {
    let uv = coord.xy + offset;
    if (uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || coord.z > 1.0) {
        return 1.0;
    }
    return select(globals.shadow.z, 1.0, shadow_lit(uv, coord.z));
}

fn texel_size() -> vec2<f32> {
    return 1.0 / vec2<f32>(textureDimensions(shadow_map));
}

fn stochastic_visibility(coord: vec3<f32>, frag: vec2<f32>) -> f32 {
    let texel = texel_size();
    let center = classify(coord, vec2<f32>(0.0, 0.0));
    let d0 = classify(coord, vec2<f32>(-texel.x, -texel.y));
    let d1 = classify(coord, vec2<f32>(-texel.x, texel.y));
    let d2 = classify(coord, vec2<f32>(texel.x, -texel.y));
    let d3 = classify(coord, vec2<f32>(texel.x, texel.y));
    if (d0 == center && d1 == center && d2 == center && d3 == center) {
        if (center >= 1.0) {
            return 1.0;
        }
        return center / 5.0;
    }
    let samples = max(u32(globals.shadow.x), 1u);
    let n = f32(samples);
    var sum = center;
    for (var i = 0u; i < samples; i = i + 1u) {
        let r = rand(vec4<f32>(frag.x, frag.y, frag.y, f32(i)));
        let index = u32(floor(n * r)) % samples;
        sum = sum + classify(coord, edge_offsets[index] * texel);
    }
    return sum / (n + 5.0);
}

fn pcf_visibility(coord: vec3<f32>) -> f32 {
    if (coord.z > 1.0) {
        return 1.0;
    }
    let texel = texel_size();
    let biased = vec3<f32>(coord.xy, coord.z - globals.shadow.y);
    var sum = 0.0;
    for (var x = -1; x <= 1; x = x + 1) {
        for (var y = -1; y <= 1; y = y + 1) {
            sum = sum + classify(biased, vec2<f32>(f32(x), f32(y)) * texel);
        }
    }
    return sum / 9.0;
}

fn visibility(light_clip: vec4<f32>, frag: vec2<f32>) -> f32 {
    let coord = shadow_coord(light_clip);
    let mode = globals.flags.x;
    if (mode == 0u) {
        return classify(coord, vec2<f32>(0.0, 0.0));
    }
    if (mode == 1u) {
        return pcf_visibility(coord);
    }
    return stochastic_visibility(coord, frag);
}

@fragment
fn fs_main(input: VertexOutput, @builtin(front_facing) front_facing: bool) -> @location(0) vec4<f32> {
    // Derivatives and implicit-lod sampling need uniform control flow.
    let faceted = cross(dpdy(input.view_position), dpdx(input.view_position));
    let texel_color = textureSample(base_texture, base_sampler, input.uv).rgb;

    var n = normalize(input.normal);
    if (globals.flags.y != 0u) {
        n = normalize(faceted);
    }
    if (globals.flags.z != 0u && n.z < 0.0) {
        discard;
    }

    let e = normalize(input.view_position);
    let l = normalize(globals.light_position.xyz - input.view_position);
    let dd = dot(l, n);
    var d = 0.0;
    var s = 0.0;
    if (globals.flags.w == 0u || (dd > 0.0) == front_facing) {
        d = abs(dd);
        let r = reflect(l, n);
        s = pow(max(0.0, dot(r, e)), globals.material.w);
    }
    let ds = globals.material.y * d + globals.material.z * s;

    var base = object.color.rgb;
    if (object.flags.x != 0u) {
        base = texel_color * object.color.rgb;
    }

    let vis = visibility(input.light_clip, input.clip_position.xy);
    let rgb = base * vis * (globals.material.x + ds * globals.light_color.rgb);
    return vec4<f32>(rgb, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_program_validates() {
        let module = validate_wgsl("depth", DEPTH_SHADER).unwrap();
        assert!(module.entry_points.iter().any(|ep| ep.name == "vs_depth"));
        assert!(module
            .entry_points
            .iter()
            .all(|ep| ep.stage == naga::ShaderStage::Vertex));
    }

    #[test]
    fn main_program_validates() {
        for comparison in [true, false] {
            let source = main_shader_source(comparison);
            assert!(!source.contains("EDGE_OFFSET_TABLE"));
            assert!(!source.contains("SHADOW_LOOKUP"));
            let module = validate_wgsl("main", &source).unwrap();
            let mut names: Vec<_> = module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
            names.sort_unstable();
            assert_eq!(names, vec!["fs_main", "vs_main"]);
        }
    }

    #[test]
    fn lookup_follows_the_sampling_mode() {
        let compare = main_shader_source(true);
        assert!(compare.contains("textureSampleCompareLevel"));
        assert!(!compare.contains("textureLoad"));
        let load = main_shader_source(false);
        assert!(load.contains("textureLoad"));
        assert!(!load.contains("textureSampleCompareLevel"));
    }

    #[test]
    fn edge_table_has_every_offset() {
        let source = main_shader_source(true);
        let table = source
            .split("array<vec2<f32>, 32>(")
            .nth(1)
            .and_then(|rest| rest.split(");").next())
            .unwrap();
        assert_eq!(table.matches("vec2<f32>(").count(), 32);
    }

    #[test]
    fn broken_source_reports_label() {
        let err = validate_wgsl("broken", "fn main( {").unwrap_err();
        match err {
            RenderError::ShaderCompile { label, .. } => assert_eq!(label, "broken"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
