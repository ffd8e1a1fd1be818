use glam::{Mat4, Vec3};

use penumbra::render::{DeviceEvent, PassTarget};
use penumbra::shadow::{DepthTargetDesc, FramebufferStatus, SHADOWED};
use penumbra::{
    Camera, DepthTarget, FrustumFit, Light, LightingConfig, MeshData, MeshInstance, RenderDevice,
    RenderError, ShadowConfig, ShadowFilter, ShadowRenderer, SoftwareDevice, Viewport,
};

const VIEWPORT: Viewport = Viewport {
    width: 160,
    height: 120,
};

struct Fixture {
    device: SoftwareDevice,
    renderer: ShadowRenderer,
    meshes: Vec<MeshInstance>,
    camera: Camera,
    light: Light,
}

/// Floor with a box raised above it, lit from above and to the side.
fn floor_and_box(filter: ShadowFilter, box_casts: bool) -> Fixture {
    let config = ShadowConfig {
        resolution: 512,
        filter,
        ..ShadowConfig::default()
    };
    floor_and_box_with(config, box_casts)
}

fn floor_and_box_with(config: ShadowConfig, box_casts: bool) -> Fixture {
    let mut device = SoftwareDevice::new();
    let renderer = ShadowRenderer::setup(&mut device, config).expect("setup");
    let floor = device.upload_mesh(&MeshData::plane(6.0), "floor").unwrap();
    let cube = device
        .upload_mesh(&MeshData::cuboid(Vec3::ONE), "box")
        .unwrap();
    let meshes = vec![
        MeshInstance::new(floor, Mat4::IDENTITY).with_color(Vec3::splat(0.8)),
        // Spans y in [2, 3] and x, z in [-1, 1].
        MeshInstance::new(
            cube,
            Mat4::from_translation(Vec3::new(0.0, 2.5, 0.0))
                * Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0)),
        )
        .with_shadow(box_casts),
    ];
    Fixture {
        device,
        renderer,
        meshes,
        camera: Camera::look_at(Vec3::new(0.0, 15.0, 12.0), Vec3::ZERO, 45.0, VIEWPORT.aspect()),
        light: Light::new(Vec3::new(10.0, 20.0, 0.0), Vec3::ONE),
    }
}

impl Fixture {
    fn render(&mut self) {
        self.renderer
            .render_frame(&mut self.device, &self.camera, &self.light, VIEWPORT, &self.meshes)
            .expect("frame renders");
    }

    fn pixel_of(&self, world: Vec3) -> (u32, u32) {
        let clip = self.camera.view_proj() * world.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x * 0.5 + 0.5) * VIEWPORT.width as f32;
        let y = (0.5 - ndc.y * 0.5) * VIEWPORT.height as f32;
        (x as u32, y as u32)
    }

    fn color(&self, world: Vec3) -> Vec3 {
        let (x, y) = self.pixel_of(world);
        self.device.color_at(x, y).expect("pixel inside the frame")
    }

    fn visibility(&self, world: Vec3) -> f32 {
        let (x, y) = self.pixel_of(world);
        self.device
            .visibility_at(x, y)
            .unwrap_or_else(|| panic!("nothing drawn at {world} ({x}, {y})"))
    }
}

fn small_config() -> ShadowConfig {
    ShadowConfig {
        resolution: 64,
        ..ShadowConfig::default()
    }
}

// Floor points below the box along the light direction, and far from it.
const UNDER_BOX: Vec3 = Vec3::new(-1.25, 0.0, 0.0);
const OPEN_FLOOR: Vec3 = Vec3::new(4.0, 0.0, 3.0);

#[test]
fn box_shadows_the_floor_beneath_it() {
    let mut fixture = floor_and_box(ShadowFilter::default(), true);
    fixture.render();
    let shadowed = fixture.visibility(UNDER_BOX);
    assert!(shadowed < 1.0, "visibility under the box was {shadowed}");
    assert!((shadowed - SHADOWED / 5.0).abs() < 1e-6);
    assert_eq!(fixture.visibility(OPEN_FLOOR), 1.0);
}

#[test]
fn every_filter_darkens_the_shadow() {
    for (filter, expected) in [
        (ShadowFilter::Binary, SHADOWED),
        (ShadowFilter::Pcf { bias: ShadowFilter::DEFAULT_BIAS }, SHADOWED),
        (ShadowFilter::StochasticEdge { edge_samples: 4 }, SHADOWED / 5.0),
    ] {
        let mut fixture = floor_and_box(filter, true);
        fixture.render();
        let shadowed = fixture.visibility(UNDER_BOX);
        assert!((shadowed - expected).abs() < 1e-5, "{filter}: {shadowed}");
        assert_eq!(fixture.visibility(OPEN_FLOOR), 1.0, "{filter}");
    }
}

#[test]
fn shadow_darkens_the_ambient_term_too() {
    let config = ShadowConfig {
        resolution: 512,
        lighting: LightingConfig {
            ambient: 0.1,
            diffuse: 0.0,
            specular: 0.0,
            ..LightingConfig::default()
        },
        ..ShadowConfig::default()
    };
    let mut fixture = floor_and_box_with(config, true);
    fixture.render();

    // Floor colour 0.8 under ambient light only, scaled by visibility.
    let shadowed = fixture.color(UNDER_BOX);
    let expected = 0.8 * (SHADOWED / 5.0) * 0.1;
    assert!(shadowed.abs_diff_eq(Vec3::splat(expected), 1e-5), "{shadowed}");
    let lit = fixture.color(OPEN_FLOOR);
    assert!(lit.abs_diff_eq(Vec3::splat(0.08), 1e-5), "{lit}");
}

#[test]
fn raw_depth_lookup_matches_comparison_sampling() {
    let config = ShadowConfig {
        resolution: 512,
        comparison_sampling: false,
        ..ShadowConfig::default()
    };
    let mut fixture = floor_and_box_with(config, true);
    assert!(!fixture.renderer.shadow_map().desc().comparison);
    fixture.render();
    assert!((fixture.visibility(UNDER_BOX) - SHADOWED / 5.0).abs() < 1e-6);
    assert_eq!(fixture.visibility(OPEN_FLOOR), 1.0);

    fixture
        .renderer
        .resize_shadow_map(&mut fixture.device, 256)
        .unwrap();
    assert!(!fixture.renderer.shadow_map().desc().comparison);
}

#[test]
fn main_pass_rejects_a_map_with_the_other_sampling_mode() {
    let mut fixture = floor_and_box(ShadowFilter::default(), true);
    assert!(fixture.renderer.shadow_map().desc().comparison);
    let raw = DepthTarget::create(
        &mut fixture.device,
        DepthTargetDesc::new(64).with_comparison(false),
    )
    .unwrap();

    let mut plan = fixture.renderer.plan_frame(
        &fixture.camera,
        &fixture.light,
        VIEWPORT,
        &fixture.meshes,
    );
    plan.passes[1].sampled = Some(raw.id());
    let err = fixture.device.execute(&plan).unwrap_err();
    assert!(matches!(err, RenderError::Device(_)));
    assert!(err.to_string().contains("comparison"), "{err}");
}

#[test]
fn scene_fit_covers_receivers_that_cast_nothing() {
    let mut fixture = floor_and_box(ShadowFilter::default(), true);
    let far = fixture
        .device
        .upload_mesh(&MeshData::plane(2.0), "far-floor")
        .unwrap();
    // Well outside the default fixed bounds.
    let receiver =
        MeshInstance::new(far, Mat4::from_translation(Vec3::new(30.0, 0.0, 30.0))).with_shadow(false);
    fixture.meshes.push(receiver);

    let fixed = fixture.renderer.light_space(&fixture.light, &fixture.meshes);
    let outside = receiver
        .world_bounds()
        .corners()
        .iter()
        .any(|&corner| fixed.project(corner).truncate().abs().max_element() > 1.0);
    assert!(outside);

    let config = ShadowConfig {
        frustum: FrustumFit::Scene { padding: 0.5 },
        ..ShadowConfig::default()
    };
    let fitted = ShadowRenderer::setup(&mut fixture.device, config).unwrap();
    let space = fitted.light_space(&fixture.light, &fixture.meshes);
    for corner in receiver.world_bounds().corners() {
        let clip = space.project(corner);
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0, "{corner} lands at {clip}");
        assert!((0.0..=1.0).contains(&clip.z), "{corner} lands at depth {}", clip.z);
    }
}

#[test]
fn non_casters_leave_no_shadow() {
    let mut fixture = floor_and_box(ShadowFilter::default(), false);
    fixture.render();
    assert_eq!(fixture.visibility(UNDER_BOX), 1.0);
}

#[test]
fn shadow_pass_runs_before_the_main_pass_every_frame() {
    let mut fixture = floor_and_box(ShadowFilter::default(), true);
    let shadow_map = fixture.renderer.shadow_map().id();
    for _ in 0..3 {
        fixture.render();
    }

    let events = fixture.device.take_events();
    let frames: Vec<&[DeviceEvent]> = events
        .split_inclusive(|event| *event == DeviceEvent::Present)
        .collect();
    assert_eq!(frames.len(), 3);

    for frame in frames {
        let begins: Vec<_> = frame
            .iter()
            .enumerate()
            .filter_map(|(index, event)| match event {
                DeviceEvent::BeginPass {
                    target,
                    clear,
                    cull,
                    sampled,
                    ..
                } => Some((index, *target, *clear, *cull, *sampled)),
                _ => None,
            })
            .collect();
        assert_eq!(begins.len(), 2);

        let (shadow_begin, target, clear, cull, sampled) = begins[0];
        assert_eq!(target, PassTarget::DepthTarget(shadow_map));
        assert!(clear.is_depth_only());
        assert_eq!(clear.depth, Some(1.0));
        assert_eq!(cull, wgpu::Face::Front);
        assert_eq!(sampled, None);

        let (main_begin, target, clear, cull, sampled) = begins[1];
        assert_eq!(target, PassTarget::Surface);
        assert!(clear.color.is_some());
        assert_eq!(cull, wgpu::Face::Back);
        assert_eq!(sampled, Some(shadow_map));

        let shadow_end = frame
            .iter()
            .position(|event| matches!(event, DeviceEvent::EndPass { label } if *label == "shadow-pass"))
            .expect("shadow pass ends");
        assert!(shadow_begin < shadow_end && shadow_end < main_begin);

        // Only the box casts a shadow; the floor and the box both reach the main pass.
        let draws_in = |label: &str| {
            frame
                .iter()
                .filter(|event| matches!(event, DeviceEvent::Draw { pass, .. } if *pass == label))
                .count()
        };
        assert_eq!(draws_in("shadow-pass"), 2);
        assert_eq!(draws_in("main-pass"), 2);
        assert_eq!(frame.last(), Some(&DeviceEvent::Present));
    }
}

#[test]
fn quads_and_triangles_are_separate_draws() {
    let mut device = SoftwareDevice::new();
    let renderer = ShadowRenderer::setup(&mut device, small_config()).unwrap();
    let mut mixed = MeshData::cuboid(Vec3::ONE);
    mixed.triangles.push([0, 1, 2]);
    let mixed = device.upload_mesh(&mixed, "mixed").unwrap();
    let meshes = [MeshInstance::new(mixed, Mat4::IDENTITY)];
    let camera = Camera::look_at(Vec3::new(0.0, 5.0, 5.0), Vec3::ZERO, 45.0, 1.0);

    renderer
        .render_frame(&mut device, &camera, &Light::default(), Viewport::square(32), &meshes)
        .unwrap();
    let ranges: Vec<_> = device
        .events()
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::Draw { pass: "main-pass", indices, .. } => Some(indices.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(ranges, vec![0..3, 3..39]);
}

#[test]
fn empty_meshes_are_skipped() {
    let mut device = SoftwareDevice::new();
    let renderer = ShadowRenderer::setup(&mut device, small_config()).unwrap();
    let empty = device.upload_mesh(&MeshData::default(), "empty").unwrap();
    let floor = device.upload_mesh(&MeshData::plane(2.0), "floor").unwrap();
    let meshes = [
        MeshInstance::new(empty, Mat4::IDENTITY),
        MeshInstance::new(floor, Mat4::IDENTITY),
    ];
    let camera = Camera::look_at(Vec3::new(0.0, 5.0, 5.0), Vec3::ZERO, 45.0, 1.0);
    let stats = renderer
        .render_frame(&mut device, &camera, &Light::default(), Viewport::square(32), &meshes)
        .unwrap();
    assert_eq!(stats.main_draws, 1);
    assert_eq!(stats.skipped_meshes, 1);
}

#[test]
fn zero_resolution_aborts_setup() {
    let mut device = SoftwareDevice::new();
    let config = ShadowConfig {
        resolution: 0,
        ..ShadowConfig::default()
    };
    let err = ShadowRenderer::setup(&mut device, config).unwrap_err();
    assert!(matches!(
        err,
        RenderError::FramebufferIncomplete(FramebufferStatus::ZeroDimensions)
    ));
    assert_eq!(device.live_resources(), 0);
}

#[test]
fn oversized_shadow_map_aborts_setup() {
    let mut device = SoftwareDevice::with_max_texture_dimension(1024);
    let err = ShadowRenderer::setup(&mut device, ShadowConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        RenderError::FramebufferIncomplete(FramebufferStatus::ExceedsDeviceLimit {
            requested: 2048,
            max: 1024
        })
    ));
    assert_eq!(device.live_resources(), 0);
}

#[test]
fn color_target_is_not_a_depth_attachment() {
    let mut device = SoftwareDevice::new();
    let desc = DepthTargetDesc {
        format: wgpu::TextureFormat::Rgba8Unorm,
        ..DepthTargetDesc::new(512)
    };
    let err = DepthTarget::create(&mut device, desc).unwrap_err();
    assert!(matches!(
        err,
        RenderError::FramebufferIncomplete(FramebufferStatus::MissingDepthAttachment(_))
    ));
    assert!(err.to_string().contains("framebuffer incomplete"));
}

#[test]
fn invalid_config_is_rejected_before_allocation() {
    let mut device = SoftwareDevice::new();
    let config = ShadowConfig {
        filter: ShadowFilter::Pcf { bias: -0.5 },
        ..ShadowConfig::default()
    };
    assert!(matches!(
        ShadowRenderer::setup(&mut device, config),
        Err(RenderError::InvalidConfig(_))
    ));
    assert_eq!(device.live_resources(), 0);
}

#[test]
fn resizing_swaps_the_shadow_map() {
    let mut fixture = floor_and_box(ShadowFilter::default(), true);
    let original = fixture.renderer.shadow_map().id();

    assert!(fixture.renderer.resize_shadow_map(&mut fixture.device, 0).is_err());
    assert_eq!(fixture.renderer.shadow_map().id(), original);

    fixture
        .renderer
        .resize_shadow_map(&mut fixture.device, 256)
        .unwrap();
    let resized = fixture.renderer.shadow_map().id();
    assert_ne!(resized, original);
    assert!(!fixture.device.has_depth_target(original));
    assert_eq!(fixture.device.depth_map(resized).map(|map| map.size()), Some(256));
    assert_eq!(fixture.renderer.config().resolution, 256);

    fixture.render();
    assert!(fixture.visibility(UNDER_BOX) < 1.0);
}

#[test]
fn cleanup_releases_programs_and_shadow_map() {
    let fixture = floor_and_box(ShadowFilter::default(), true);
    let Fixture {
        mut device,
        renderer,
        ..
    } = fixture;
    let shadow_map = renderer.shadow_map().id();
    renderer.cleanup(&mut device);
    assert!(!device.has_depth_target(shadow_map));
    // Only the two uploaded meshes remain.
    assert_eq!(device.live_resources(), 2);
}
