use glam::{Mat4, Vec3};

/// Camera matrices owned by the application and read by the main pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Camera {
    /// Perspective camera looking from `eye` to `target` with +Y up.
    pub fn look_at(eye: Vec3, target: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        let mut up = Vec3::Y;
        if (target - eye).normalize_or_zero().cross(up).length_squared() < 1e-6 {
            up = Vec3::Z;
        }
        Self {
            view: Mat4::look_at_rh(eye, target, up),
            projection: Mat4::perspective_rh(
                fov_y_degrees.clamp(1.0, 179.0).to_radians(),
                aspect.max(0.01),
                0.1,
                200.0,
            ),
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }

    /// World-space eye position.
    pub fn position(&self) -> Vec3 {
        self.view.inverse().transform_point3(Vec3::ZERO)
    }
}

/// Single pseudo-directional light aimed at the world origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: Vec3,
}

impl Light {
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }

    /// Light position in the camera's view space.
    pub fn view_position(&self, camera: &Camera) -> Vec3 {
        camera.view.transform_point3(self.position)
    }
}

impl Default for Light {
    fn default() -> Self {
        Self {
            position: Vec3::new(20.0, 30.0, 20.0),
            color: Vec3::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_position_round_trips_through_view() {
        let eye = Vec3::new(3.0, 4.0, 5.0);
        let camera = Camera::look_at(eye, Vec3::ZERO, 60.0, 1.5);
        assert!(camera.position().abs_diff_eq(eye, 1e-4));
    }

    #[test]
    fn vertical_camera_picks_another_up_axis() {
        let camera = Camera::look_at(Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO, 60.0, 1.0);
        assert!(camera.view.is_finite());
    }

    #[test]
    fn light_moves_into_view_space() {
        let camera = Camera::look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 60.0, 1.0);
        let light = Light::new(Vec3::ZERO, Vec3::ONE);
        assert!(light
            .view_position(&camera)
            .abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }
}
