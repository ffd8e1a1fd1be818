use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::mesh::{MeshData, Vertex};

/// How an OBJ file is turned into [`MeshData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjOptions {
    /// Split quads into triangles instead of keeping a separate quad list.
    pub force_triangles: bool,
    /// Centre the mesh on the origin and scale its largest half extent to 1.
    pub standardize: bool,
}

impl Default for ObjOptions {
    fn default() -> Self {
        Self {
            force_triangles: false,
            standardize: true,
        }
    }
}

pub fn load_obj(path: &Path, options: ObjOptions) -> Result<MeshData> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    load_obj_from_str(&data, options).with_context(|| format!("failed to parse OBJ mesh {}", path.display()))
}

/// Parses an OBJ file from memory.
///
/// Faces with four corners stay quads unless `force_triangles` is set; larger
/// polygons are fanned into triangles.
pub fn load_obj_from_str(data: &str, options: ObjOptions) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut polygons: Vec<Vec<FaceIndex>> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "f" => polygons.push(
                parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?,
            ),
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }
    if options.standardize {
        standardize(&mut positions);
    }

    let mut builder = MeshBuilder::new(&positions, &normals, &uvs);
    for polygon in &polygons {
        if polygon.len() == 4 && !options.force_triangles {
            let quad = [
                builder.index(polygon[0])?,
                builder.index(polygon[1])?,
                builder.index(polygon[2])?,
                builder.index(polygon[3])?,
            ];
            builder.mesh.quads.push(quad);
        } else {
            for i in 1..(polygon.len() - 1) {
                let triangle = [
                    builder.index(polygon[0])?,
                    builder.index(polygon[i])?,
                    builder.index(polygon[i + 1])?,
                ];
                builder.mesh.triangles.push(triangle);
            }
        }
    }

    let mut mesh = builder.mesh;
    if builder.missing_normals {
        compute_normals(&mut mesh);
    }
    Ok(mesh)
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = parts
        .next()
        .ok_or_else(|| anyhow!("missing texture coordinate"))?
        .parse::<f32>()?;
    let v = match parts.next() {
        Some(v) => v.parse::<f32>()?,
        None => 0.0,
    };
    Ok(Vec2::new(u, v))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let mut optional = || -> Result<i32> {
            match segments.next() {
                Some(s) if !s.is_empty() => Ok(s.parse::<i32>()?),
                _ => Ok(0),
            }
        };
        let vt = optional()?;
        let vn = optional()?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

/// Deduplicates `v/vt/vn` triples into shared vertices.
struct MeshBuilder<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    uvs: &'a [Vec2],
    lookup: HashMap<Key, u32>,
    mesh: MeshData,
    missing_normals: bool,
}

impl<'a> MeshBuilder<'a> {
    fn new(positions: &'a [Vec3], normals: &'a [Vec3], uvs: &'a [Vec2]) -> Self {
        Self {
            positions,
            normals,
            uvs,
            lookup: HashMap::new(),
            mesh: MeshData::default(),
            missing_normals: false,
        }
    }

    fn index(&mut self, idx: FaceIndex) -> Result<u32> {
        let key = Key {
            position: fix_index(idx.v, self.positions.len())
                .ok_or_else(|| anyhow!("invalid vertex index {}", idx.v))?,
            uv: fix_index(idx.vt, self.uvs.len()),
            normal: fix_index(idx.vn, self.normals.len()),
        };
        if let Some(&index) = self.lookup.get(&key) {
            return Ok(index);
        }
        let normal = key.normal.map(|i| self.normals[i]);
        self.missing_normals |= normal.is_none();
        let index = self.mesh.vertices.len() as u32;
        self.mesh.vertices.push(Vertex::new(
            self.positions[key.position],
            normal.unwrap_or(Vec3::ZERO),
            key.uv.map(|i| self.uvs[i]).unwrap_or(Vec2::ZERO),
        ));
        self.lookup.insert(key, index);
        Ok(index)
    }
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn standardize(positions: &mut [Vec3]) {
    let (min, max) = positions
        .iter()
        .fold((Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)), |(min, max), p| {
            (min.min(*p), max.max(*p))
        });
    let center = (min + max) * 0.5;
    let half = ((max - min) * 0.5).max_element();
    let scale = if half > f32::EPSILON { 1.0 / half } else { 1.0 };
    for position in positions {
        *position = (*position - center) * scale;
    }
}

// Area-weighted face normals accumulated on every vertex lacking one.
fn compute_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertices.len()];
    let faces = mesh
        .triangles
        .iter()
        .copied()
        .chain(mesh.quads.iter().flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]]));

    for [i0, i1, i2] in faces {
        let (i0, i1, i2) = (i0 as usize, i1 as usize, i2 as usize);
        let p0 = mesh.vertices[i0].position();
        let p1 = mesh.vertices[i1].position();
        let p2 = mesh.vertices[i2].position();
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(accum) {
        if vertex.normal == [0.0; 3] {
            vertex.normal = normal.normalize_or_zero().into();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: ObjOptions = ObjOptions {
        force_triangles: false,
        standardize: false,
    };

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj, RAW).unwrap();
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);
        assert_eq!(mesh.vertices.len(), 3);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj, RAW).unwrap();
        for vertex in &mesh.vertices {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn quads_are_kept_unless_forced() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 1\nf 1/1 2/1 3/2 4/2\n";
        let mesh = load_obj_from_str(obj, RAW).unwrap();
        assert_eq!(mesh.quads.len(), 1);
        assert!(mesh.triangles.is_empty());
        assert_eq!(mesh.vertices[2].uv, [1.0, 1.0]);

        let forced = ObjOptions {
            force_triangles: true,
            ..RAW
        };
        let mesh = load_obj_from_str(obj, forced).unwrap();
        assert!(mesh.quads.is_empty());
        assert_eq!(mesh.triangles.len(), 2);
    }

    #[test]
    fn standardize_fits_unit_cube() {
        let obj = "v 2 2 2\nv 6 2 2\nv 2 4 2\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj, ObjOptions::default()).unwrap();
        let bounds = mesh.bounds();
        assert_eq!(bounds.min.x, -1.0);
        assert_eq!(bounds.max.x, 1.0);
        assert!((bounds.max.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn negative_indices_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj, RAW).unwrap();
        assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn reports_bad_lines() {
        let err = load_obj_from_str("v 0 0\n", RAW).unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
        assert!(load_obj_from_str("# nothing\n", RAW).is_err());
        assert!(load_obj_from_str("v 0 0 0\nf 1 2 9\n", RAW).is_err());
    }
}
