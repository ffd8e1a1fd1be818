use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

use crate::config::{LightingConfig, ShadowFilter};
use crate::shadow::SHADOWED;

/// Uniforms of the depth program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DepthUniforms {
    pub depth_vp: [[f32; 4]; 4],
}

impl DepthUniforms {
    pub fn new(depth_vp: Mat4) -> Self {
        Self {
            depth_vp: depth_vp.to_cols_array_2d(),
        }
    }

    pub fn depth_vp(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.depth_vp)
    }
}

/// Per-frame uniforms of the main program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MainUniforms {
    pub persp: [[f32; 4]; 4],
    pub depth_vp: [[f32; 4]; 4],
    /// Light position in view space.
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
    /// ambient, diffuse, specular, shininess
    pub material: [f32; 4],
    /// edge samples, pcf bias, shadowed value, unused
    pub shadow: [f32; 4],
    /// filter mode, faceted shading, forward facing only, intensity policy
    pub flags: [u32; 4],
}

impl MainUniforms {
    pub fn new(
        persp: Mat4,
        depth_vp: Mat4,
        light_view_position: Vec3,
        light_color: Vec3,
        lighting: &LightingConfig,
        filter: &ShadowFilter,
    ) -> Self {
        Self {
            persp: persp.to_cols_array_2d(),
            depth_vp: depth_vp.to_cols_array_2d(),
            light_position: light_view_position.extend(1.0).into(),
            light_color: light_color.extend(1.0).into(),
            material: [
                lighting.ambient,
                lighting.diffuse,
                lighting.specular,
                lighting.shininess,
            ],
            shadow: [filter.edge_samples() as f32, filter.bias(), SHADOWED, 0.0],
            flags: [
                filter.mode_index(),
                lighting.faceted_shading as u32,
                lighting.forward_facing_only as u32,
                lighting.intensity_policy.flag(),
            ],
        }
    }

    pub fn persp(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.persp)
    }

    pub fn depth_vp(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.depth_vp)
    }

    /// Filter encoded in the flags, as the shader reads it.
    pub fn filter(&self) -> ShadowFilter {
        match self.flags[0] {
            0 => ShadowFilter::Binary,
            1 => ShadowFilter::Pcf {
                bias: self.shadow[1],
            },
            _ => ShadowFilter::StochasticEdge {
                edge_samples: self.shadow[0] as u32,
            },
        }
    }
}

/// Per-draw uniforms shared by both programs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    pub model_view: [[f32; 4]; 4],
    /// Inverse transpose of the model-view rotation, padded to vec4 columns.
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
    /// use texture, unused x3
    pub flags: [u32; 4],
}

impl ObjectUniforms {
    pub fn new(model: Mat4, view: Mat4, color: Vec3, opacity: f32, use_texture: bool) -> Self {
        let model_view = view * model;
        Self {
            model: model.to_cols_array_2d(),
            model_view: model_view.to_cols_array_2d(),
            normal: mat3_to_3x4(normal_matrix(model_view)),
            color: color.extend(opacity.clamp(0.0, 1.0)).into(),
            flags: [use_texture as u32, 0, 0, 0],
        }
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }

    pub fn model_view(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model_view)
    }

    pub fn uses_texture(&self) -> bool {
        self.flags[0] != 0
    }

    pub fn opacity(&self) -> f32 {
        self.color[3]
    }
}

/// Inverse transpose of the linear part, or the linear part itself when it
/// is singular (a zero scale axis), which keeps normals finite.
fn normal_matrix(model_view: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(model_view);
    if linear.determinant().abs() > f32::EPSILON {
        linear.inverse().transpose()
    } else {
        linear
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}
