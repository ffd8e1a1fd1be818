use glam::Mat4;
use log::{trace, warn};

use crate::mesh::MeshInstance;
use crate::render::{DrawCall, ObjectUniforms};

/// Pass a draw list is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawPass {
    /// Depth from the light; only shadow casters, never textured.
    Shadow,
    /// Lit and shadowed view from the camera.
    Main,
}

/// Turns the mesh list into draws for one pass.
///
/// Meshes without geometry are skipped with a warning. Each instance yields
/// one draw with a triangle range and, when it has quads, a second range.
pub fn draw_all(pass: DrawPass, meshes: &[MeshInstance], view: &Mat4) -> Vec<DrawCall> {
    let mut draws = Vec::with_capacity(meshes.len());
    for (index, instance) in meshes.iter().enumerate() {
        if instance.mesh.is_empty() {
            warn!("skipping mesh {} at slot {index}: no triangles or quads", instance.mesh.id);
            continue;
        }
        if pass == DrawPass::Shadow && !instance.casts_shadow {
            trace!("mesh {} does not cast shadows", instance.mesh.id);
            continue;
        }

        let texture = match pass {
            DrawPass::Shadow => None,
            DrawPass::Main => instance.texture,
        };
        let mut index_ranges = Vec::with_capacity(2);
        if instance.mesh.triangles > 0 {
            index_ranges.push(instance.mesh.triangle_range());
        }
        if instance.mesh.quads > 0 {
            index_ranges.push(instance.mesh.quad_range());
        }

        draws.push(DrawCall {
            mesh: instance.mesh.id,
            texture,
            object: ObjectUniforms::new(
                instance.transform,
                *view,
                instance.color,
                instance.opacity,
                texture.is_some(),
            ),
            index_ranges,
        });
    }
    draws
}
