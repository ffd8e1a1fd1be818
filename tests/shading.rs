use glam::{Mat4, Vec3};

use penumbra::render::TextureId;
use penumbra::{
    Camera, IntensityPolicy, Light, LightingConfig, MeshData, MeshInstance, RenderDevice,
    ShadowConfig, ShadowRenderer, SoftwareDevice, TextureData, Viewport,
};

const SIZE: u32 = 64;
const CENTRE: (u32, u32) = (SIZE / 2, SIZE / 2);

/// Diffuse-only lighting, so a floor facing the light reads `base * 0.8`
/// and one edge-on to it reads `base * 0.1`.
fn diffuse_only() -> LightingConfig {
    LightingConfig {
        specular: 0.0,
        ..LightingConfig::default()
    }
}

/// Renders one floor quad seen from straight above, lit from straight above.
/// Returns the colour at the centre pixel, or `None` if nothing was drawn.
fn shade_floor(
    lighting: LightingConfig,
    normal: Vec3,
    build: impl FnOnce(&mut SoftwareDevice, MeshInstance) -> MeshInstance,
) -> Option<Vec3> {
    let mut device = SoftwareDevice::new();
    let config = ShadowConfig {
        resolution: 64,
        lighting,
        ..ShadowConfig::default()
    };
    let renderer = ShadowRenderer::setup(&mut device, config).expect("setup");
    let mut floor = MeshData::plane(2.0);
    for vertex in &mut floor.vertices {
        vertex.normal = normal.into();
    }
    let floor = device.upload_mesh(&floor, "floor").unwrap();
    let instance = build(&mut device, MeshInstance::new(floor, Mat4::IDENTITY));

    let camera = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 45.0, 1.0);
    let light = Light::new(Vec3::new(0.0, 20.0, 0.0), Vec3::ONE);
    renderer
        .render_frame(&mut device, &camera, &light, Viewport::square(SIZE), &[instance])
        .expect("frame renders");

    let (x, y) = CENTRE;
    device.visibility_at(x, y)?;
    device.color_at(x, y)
}

fn assert_close(actual: Option<Vec3>, expected: Vec3) {
    let actual = actual.expect("floor covers the centre pixel");
    assert!(
        actual.abs_diff_eq(expected, 1e-2),
        "expected {expected}, got {actual}"
    );
}

#[test]
fn flat_colour_is_lit_by_ambient_and_diffuse() {
    let base = Vec3::new(1.0, 0.5, 0.25);
    let colour = shade_floor(diffuse_only(), Vec3::Y, |_, floor| floor.with_color(base));
    assert_close(colour, base * 0.8);
}

#[test]
fn texture_modulates_the_tint() {
    let colour = shade_floor(diffuse_only(), Vec3::Y, |device, floor| {
        let red = TextureData::checker(8, 2, [255, 0, 0], [255, 0, 0]);
        let red = device.upload_texture(&red, "red").unwrap();
        floor.with_texture(Some(red)).with_color(Vec3::new(1.0, 1.0, 0.5))
    });
    assert_close(colour, Vec3::new(0.8, 0.0, 0.0));
}

#[test]
fn missing_texture_falls_back_to_the_tint() {
    let base = Vec3::new(0.25, 0.5, 1.0);
    let colour = shade_floor(diffuse_only(), Vec3::Y, |_, floor| {
        floor.with_texture(Some(TextureId(999))).with_color(base)
    });
    assert_close(colour, base * 0.8);
}

#[test]
fn back_facing_normals_are_discarded_only_when_asked() {
    let forward_only = LightingConfig {
        forward_facing_only: true,
        ..diffuse_only()
    };
    assert_eq!(shade_floor(forward_only, Vec3::NEG_Y, |_, floor| floor), None);
    assert!(shade_floor(forward_only, Vec3::Y, |_, floor| floor).is_some());
    assert!(shade_floor(diffuse_only(), Vec3::NEG_Y, |_, floor| floor).is_some());
}

#[test]
fn faceted_shading_ignores_vertex_normals() {
    // Vertex normals lie in the floor, edge-on to the light.
    let smooth = shade_floor(diffuse_only(), Vec3::X, |_, floor| floor);
    assert_close(smooth, Vec3::splat(0.1));

    let faceted = LightingConfig {
        faceted_shading: true,
        ..diffuse_only()
    };
    let colour = shade_floor(faceted, Vec3::X, |_, floor| floor);
    assert_close(colour, Vec3::splat(0.8));
}

#[test]
fn match_facing_drops_light_behind_the_normal() {
    let always = shade_floor(diffuse_only(), Vec3::NEG_Y, |_, floor| floor);
    assert_close(always, Vec3::splat(0.8));

    let match_facing = LightingConfig {
        intensity_policy: IntensityPolicy::MatchFacing,
        ..diffuse_only()
    };
    let colour = shade_floor(match_facing, Vec3::NEG_Y, |_, floor| floor);
    assert_close(colour, Vec3::splat(0.1));

    // Light and viewer on the same side still get the diffuse term.
    let facing = shade_floor(match_facing, Vec3::Y, |_, floor| floor);
    assert_close(facing, Vec3::splat(0.8));
}

#[test]
fn translucent_objects_blend_over_the_background() {
    // Default clear colour is 0.5 grey.
    let colour = shade_floor(diffuse_only(), Vec3::Y, |_, floor| floor.with_opacity(0.5));
    assert_close(colour, Vec3::splat(0.8 * 0.5 + 0.5 * 0.5));

    let opaque = shade_floor(diffuse_only(), Vec3::Y, |_, floor| floor.with_opacity(1.0));
    assert_close(opaque, Vec3::splat(0.8));
}
