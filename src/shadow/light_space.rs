use glam::{Mat4, Vec3, Vec4};

use crate::config::OrthoBounds;
use crate::mesh::Aabb;

/// Light's view and orthographic projection for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSpace {
    pub view: Mat4,
    pub projection: Mat4,
    /// `projection * view`, the matrix both passes agree on.
    pub view_proj: Mat4,
    pub bounds: OrthoBounds,
}

impl LightSpace {
    /// Light at `light_position` looking at the origin through fixed bounds.
    pub fn new(light_position: Vec3, bounds: &OrthoBounds) -> Self {
        Self::from_view(light_view(light_position), *bounds)
    }

    /// Bounds fitted around `scene` as seen from the light, grown by `padding`.
    ///
    /// An empty scene falls back to the default bounds.
    pub fn fitted(light_position: Vec3, scene: &Aabb, padding: f32) -> Self {
        let view = light_view(light_position);
        if scene.is_empty() {
            return Self::from_view(view, OrthoBounds::default());
        }
        let local = scene.transformed(&view);
        // Right-handed view space looks down -Z, so depth grows as z falls.
        let bounds = OrthoBounds {
            left: local.min.x - padding,
            right: local.max.x + padding,
            bottom: local.min.y - padding,
            top: local.max.y + padding,
            near: -local.max.z - padding,
            far: -local.min.z + padding,
        };
        Self::from_view(view, widen_degenerate(bounds))
    }

    fn from_view(view: Mat4, bounds: OrthoBounds) -> Self {
        let projection = Mat4::orthographic_rh(
            bounds.left,
            bounds.right,
            bounds.bottom,
            bounds.top,
            bounds.near,
            bounds.far,
        );
        Self {
            view,
            projection,
            view_proj: projection * view,
            bounds,
        }
    }

    /// Light clip-space position of a world point.
    pub fn project(&self, world: Vec3) -> Vec4 {
        self.view_proj * world.extend(1.0)
    }
}

fn light_view(light_position: Vec3) -> Mat4 {
    let eye = if light_position.length_squared() < 1e-8 {
        Vec3::Y
    } else {
        light_position
    };
    let forward = (-eye).normalize();
    let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    Mat4::look_at_rh(eye, Vec3::ZERO, up)
}

fn widen_degenerate(mut bounds: OrthoBounds) -> OrthoBounds {
    const MIN_EXTENT: f32 = 1e-3;
    if bounds.right - bounds.left < MIN_EXTENT {
        bounds.left -= MIN_EXTENT;
        bounds.right += MIN_EXTENT;
    }
    if bounds.top - bounds.bottom < MIN_EXTENT {
        bounds.bottom -= MIN_EXTENT;
        bounds.top += MIN_EXTENT;
    }
    if bounds.far - bounds.near < MIN_EXTENT {
        bounds.near -= MIN_EXTENT;
        bounds.far += MIN_EXTENT;
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::ShadowCoord;

    #[test]
    fn origin_projects_to_map_centre() {
        let space = LightSpace::new(Vec3::new(20.0, 30.0, 20.0), &OrthoBounds::default());
        let coord = ShadowCoord::from_clip(space.project(Vec3::ZERO));
        assert!((coord.uv.x - 0.5).abs() < 1e-5);
        assert!((coord.uv.y - 0.5).abs() < 1e-5);
        assert!(coord.depth > 0.0 && coord.depth < 1.0);
    }

    #[test]
    fn nearer_points_have_smaller_depth() {
        let light = Vec3::new(0.0, 30.0, 5.0);
        let space = LightSpace::new(light, &OrthoBounds::default());
        let low = space.project(Vec3::ZERO).z;
        let high = space.project(Vec3::new(0.0, 2.0, 0.0)).z;
        assert!(high < low);
    }

    #[test]
    fn overhead_light_has_a_valid_basis() {
        let space = LightSpace::new(Vec3::new(0.0, 10.0, 0.0), &OrthoBounds::default());
        assert!(space.view_proj.is_finite());
        let space = LightSpace::new(Vec3::ZERO, &OrthoBounds::default());
        assert!(space.view_proj.is_finite());
    }

    #[test]
    fn fitted_bounds_contain_the_scene() {
        let scene = Aabb {
            min: Vec3::new(-4.0, 0.0, -4.0),
            max: Vec3::new(4.0, 3.0, 4.0),
        };
        let space = LightSpace::fitted(Vec3::new(10.0, 20.0, 5.0), &scene, 0.5);
        for corner in scene.corners() {
            let coord = ShadowCoord::from_clip(space.project(corner));
            assert!((0.0..=1.0).contains(&coord.uv.x), "{coord:?}");
            assert!((0.0..=1.0).contains(&coord.uv.y), "{coord:?}");
            assert!((0.0..=1.0).contains(&coord.depth), "{coord:?}");
        }
    }

    #[test]
    fn empty_scene_uses_default_bounds() {
        let space = LightSpace::fitted(Vec3::new(1.0, 5.0, 1.0), &Aabb::EMPTY, 1.0);
        assert_eq!(space.bounds, OrthoBounds::default());
    }
}
