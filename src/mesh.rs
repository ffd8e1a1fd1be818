use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};

use crate::render::{MeshId, TextureId};

/// Interleaved vertex shared by the depth and main programs.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, uv: Vec2) -> Self {
        Self {
            position: position.into(),
            normal: normal.into(),
            uv: uv.into(),
        }
    }

    /// Full layout: position (0), normal (1), uv (2).
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: 24,
                shader_location: 2,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };

    /// Same buffer seen by the depth program, which only reads the position.
    pub const POSITION_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    };

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        points.into_iter().fold(Self::EMPTY, |bounds, point| Self {
            min: bounds.min.min(point),
            max: bounds.max.max(point),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after an affine transform.
    pub fn transformed(&self, transform: &Mat4) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(
            self.corners()
                .into_iter()
                .map(|corner| transform.transform_point3(corner)),
        )
    }
}

/// CPU-side geometry: triangles plus optional quads drawn as a second range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
    pub quads: Vec<[u32; 4]>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty() && self.quads.is_empty()
    }

    /// Index buffer contents: triangles first, then each quad split along its
    /// first diagonal.
    pub fn index_data(&self) -> Vec<u32> {
        let mut indices = Vec::with_capacity(self.triangles.len() * 3 + self.quads.len() * 6);
        for triangle in &self.triangles {
            indices.extend_from_slice(triangle);
        }
        for &[a, b, c, d] in &self.quads {
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
        indices
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(Vertex::position))
    }

    /// Checks that every index refers to an existing vertex.
    pub fn indices_in_range(&self) -> bool {
        let count = self.vertices.len() as u32;
        self.triangles.iter().flatten().all(|&index| index < count)
            && self.quads.iter().flatten().all(|&index| index < count)
    }

    /// Square floor of half-size `half_extent` in the XZ plane, facing +Y.
    pub fn plane(half_extent: f32) -> Self {
        let mut mesh = Self::default();
        mesh.push_face(Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec3::new(half_extent, 0.0, half_extent));
        mesh
    }

    /// Box centred on the origin, one quad per face.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let mut mesh = Self::default();
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];
        for (normal, u, v) in faces {
            mesh.push_face(normal, u, v, half_extents);
        }
        mesh
    }

    // Corners wind counter-clockwise seen from the side `normal` points to,
    // which holds as long as `u x v == normal`.
    fn push_face(&mut self, normal: Vec3, u: Vec3, v: Vec3, half_extents: Vec3) {
        let base = self.vertices.len() as u32;
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (su, sv) in corners {
            let position = (normal + u * su + v * sv) * half_extents;
            let uv = Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5);
            self.vertices.push(Vertex::new(position, normal, uv));
        }
        self.quads.push([base, base + 1, base + 2, base + 3]);
    }
}

/// Device-side mesh returned by [`crate::render::RenderDevice::upload_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshHandle {
    pub id: MeshId,
    pub triangles: u32,
    pub quads: u32,
    pub bounds: Aabb,
}

impl MeshHandle {
    pub fn is_empty(&self) -> bool {
        self.triangles == 0 && self.quads == 0
    }

    pub fn triangle_range(&self) -> Range<u32> {
        0..self.triangles * 3
    }

    pub fn quad_range(&self) -> Range<u32> {
        let start = self.triangles * 3;
        start..start + self.quads * 6
    }
}

/// One entry of the scene's mesh list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInstance {
    pub mesh: MeshHandle,
    pub transform: Mat4,
    pub texture: Option<TextureId>,
    pub color: Vec3,
    /// Alpha of the main pass output, blended over what is already drawn.
    pub opacity: f32,
    pub casts_shadow: bool,
}

impl MeshInstance {
    pub fn new(mesh: MeshHandle, transform: Mat4) -> Self {
        Self {
            mesh,
            transform,
            texture: None,
            color: Vec3::ONE,
            opacity: 1.0,
            casts_shadow: true,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = opacity;
        self
    }

    pub fn with_texture(mut self, texture: Option<TextureId>) -> Self {
        self.texture = texture;
        self
    }

    pub fn with_shadow(mut self, casts_shadow: bool) -> Self {
        self.casts_shadow = casts_shadow;
        self
    }

    /// World-space bounds of the instance.
    pub fn world_bounds(&self) -> Aabb {
        self.mesh.bounds.transformed(&self.transform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::LAYOUT.array_stride, 32);
        assert_eq!(Vertex::POSITION_LAYOUT.attributes.len(), 1);
    }

    #[test]
    fn quads_follow_triangles_in_index_data() {
        let mesh = MeshData {
            vertices: vec![Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO); 5],
            triangles: vec![[0, 1, 2]],
            quads: vec![[1, 2, 3, 4]],
        };
        assert_eq!(mesh.index_data(), vec![0, 1, 2, 1, 2, 3, 1, 3, 4]);
        assert!(mesh.indices_in_range());
    }

    #[test]
    fn handle_ranges_split_triangles_and_quads() {
        let handle = MeshHandle {
            id: MeshId(0),
            triangles: 2,
            quads: 3,
            bounds: Aabb::EMPTY,
        };
        assert_eq!(handle.triangle_range(), 0..6);
        assert_eq!(handle.quad_range(), 6..24);
    }

    #[test]
    fn cuboid_faces_wind_outward() {
        let mesh = MeshData::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(mesh.quads.len(), 6);
        for quad in &mesh.quads {
            let [a, b, c, _] = quad.map(|index| mesh.vertices[index as usize]);
            let winding = (b.position() - a.position()).cross(c.position() - a.position());
            let normal = Vec3::from_array(a.normal);
            assert!(winding.dot(normal) > 0.0);
            assert!(a.position().dot(normal) > 0.0);
        }
        let bounds = mesh.bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn plane_faces_up() {
        let mesh = MeshData::plane(5.0);
        let [a, b, c, _] = mesh.quads[0].map(|index| mesh.vertices[index as usize]);
        let winding = (b.position() - a.position()).cross(c.position() - a.position());
        assert!(winding.y > 0.0);
        assert_eq!(mesh.bounds().max, Vec3::new(5.0, 0.0, 5.0));
    }

    #[test]
    fn transformed_bounds_follow_translation() {
        let bounds = MeshData::cuboid(Vec3::ONE).bounds();
        let moved = bounds.transformed(&Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0)));
        assert_eq!(moved.min, Vec3::new(-1.0, 1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(1.0, 3.0, 1.0));
        assert!(Aabb::EMPTY.is_empty());
    }
}
