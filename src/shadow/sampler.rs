//! CPU twin of the shadow lookup in the main fragment program.

use glam::{Vec2, Vec4};

use crate::config::ShadowFilter;

/// Visibility of a fragment the light reaches.
pub const LIT: f32 = 1.0;
/// Visibility of a single occluded sample.
pub const SHADOWED: f32 = 0.4;

/// Unit-disc offsets, in texels, used for the extra taps on shadow edges.
pub const EDGE_SAMPLE_OFFSETS: [[f32; 2]; 32] = [
    [0.49338352, -0.58302237],
    [-0.39376479, 0.12189280],
    [-0.38876976, 0.39560871],
    [-0.82853213, 0.29121478],
    [-0.62251564, 0.27426500],
    [0.44906493, 0.72971920],
    [0.99295605, 0.02762058],
    [-0.61054051, -0.74474791],
    [-0.49073490, 0.09812672],
    [0.64145907, -0.23052487],
    [-0.47168601, 0.81892203],
    [0.95110052, 0.97483373],
    [0.84048903, 0.82753596],
    [-0.94147225, 0.42333745],
    [-0.97706586, 0.22633662],
    [0.00977269, 0.02378330],
    [-0.21250551, 0.39536213],
    [0.46426639, 0.17288661],
    [-0.44197788, 0.33506576],
    [0.80805167, -0.29359674],
    [-0.66379370, 0.04307460],
    [0.26607188, 0.79704354],
    [0.20652568, 0.81991369],
    [0.64959186, -0.64564514],
    [0.93534138, 0.83045920],
    [0.31952140, 0.95451090],
    [-0.85996893, 0.29045370],
    [-0.33230688, -0.34582716],
    [0.87055498, 0.64248681],
    [-0.19631182, -0.83353633],
    [0.70041707, 0.58055892],
    [0.78863981, -0.50693407],
];

const DIAGONALS: [[f32; 2]; 4] = [[-1.0, -1.0], [-1.0, 1.0], [1.0, -1.0], [1.0, 1.0]];

/// Square grid of light-space depths, cleared to the far plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    size: u32,
    depths: Vec<f32>,
}

impl DepthMap {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            depths: vec![1.0; (size as usize) * (size as usize)],
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn texel_size(&self) -> f32 {
        1.0 / self.size.max(1) as f32
    }

    pub fn clear(&mut self, depth: f32) {
        self.depths.fill(depth);
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.depths[(y * self.size + x) as usize]
    }

    /// Keeps the nearer of the stored and incoming depth.
    pub fn write_nearest(&mut self, x: u32, y: u32, depth: f32) -> bool {
        let slot = &mut self.depths[(y * self.size + x) as usize];
        if depth <= *slot {
            *slot = depth;
            true
        } else {
            false
        }
    }

    /// Nearest-texel lookup; `uv` must lie in [0, 1].
    pub fn sample_nearest(&self, uv: Vec2) -> f32 {
        let last = self.size.saturating_sub(1);
        let x = ((uv.x * self.size as f32) as u32).min(last);
        let y = ((uv.y * self.size as f32) as u32).min(last);
        self.get(x, y)
    }
}

/// Position of a fragment inside the shadow map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowCoord {
    /// Texture coordinates with the origin at the top-left texel.
    pub uv: Vec2,
    /// Light-space depth in [0, 1] for points inside the frustum.
    pub depth: f32,
}

impl ShadowCoord {
    /// Perspective divide, then clip x/y from [-1, 1] to texture space.
    pub fn from_clip(clip: Vec4) -> Self {
        let ndc = clip.truncate() / clip.w;
        Self {
            uv: Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5),
            depth: ndc.z,
        }
    }
}

/// Depth comparison of one tap: [`LIT`] when `depth <= stored`, else [`SHADOWED`].
///
/// Taps outside the map or beyond the far plane count as lit.
pub fn classify(map: &DepthMap, coord: ShadowCoord, offset: Vec2) -> f32 {
    let uv = coord.uv + offset;
    let outside = uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0;
    if outside || coord.depth > 1.0 || coord.depth.is_nan() {
        return LIT;
    }
    if coord.depth <= map.sample_nearest(uv) {
        LIT
    } else {
        SHADOWED
    }
}

/// Hash of a 4-component seed into [0, 1).
pub fn rand(seed: Vec4) -> f32 {
    let d = seed.dot(Vec4::new(12.9898, 78.233, 45.164, 94.673));
    let x = d.sin() * 43758.5453;
    x - x.floor()
}

/// Offset table index for tap `i` of `samples`, keyed on the fragment position.
pub fn edge_sample_index(frag: Vec2, i: u32, samples: u32) -> usize {
    let samples = samples.max(1);
    let r = rand(Vec4::new(frag.x, frag.y, frag.y, i as f32));
    ((samples as f32 * r).floor() as u32 % samples) as usize
}

/// Visibility lookup with a fixed filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowSampler {
    filter: ShadowFilter,
}

impl ShadowSampler {
    pub fn new(filter: ShadowFilter) -> Self {
        Self { filter }
    }

    pub fn filter(&self) -> ShadowFilter {
        self.filter
    }

    /// Visibility in [0, 1] of a fragment at `light_clip`, where `frag` is the
    /// window position of the fragment's pixel centre.
    pub fn visibility(&self, map: &DepthMap, light_clip: Vec4, frag: Vec2) -> f32 {
        let coord = ShadowCoord::from_clip(light_clip);
        match self.filter {
            ShadowFilter::Binary => classify(map, coord, Vec2::ZERO),
            ShadowFilter::Pcf { bias } => pcf(map, coord, bias),
            ShadowFilter::StochasticEdge { .. } => {
                stochastic_edge(map, coord, frag, self.filter.edge_samples())
            }
        }
    }
}

fn stochastic_edge(map: &DepthMap, coord: ShadowCoord, frag: Vec2, samples: u32) -> f32 {
    let texel = map.texel_size();
    let center = classify(map, coord, Vec2::ZERO);
    let on_edge = DIAGONALS
        .iter()
        .any(|&[x, y]| classify(map, coord, Vec2::new(x, y) * texel) != center);
    if !on_edge {
        return if center == LIT { LIT } else { center / 5.0 };
    }
    // Diagonals only decide the branch; the average is over centre and edge taps.
    let mut sum = center;
    for i in 0..samples {
        let [x, y] = EDGE_SAMPLE_OFFSETS[edge_sample_index(frag, i, samples)];
        sum += classify(map, coord, Vec2::new(x, y) * texel);
    }
    sum / (samples as f32 + 5.0)
}

fn pcf(map: &DepthMap, coord: ShadowCoord, bias: f32) -> f32 {
    if coord.depth > 1.0 {
        return LIT;
    }
    let texel = map.texel_size();
    let biased = ShadowCoord {
        depth: coord.depth - bias,
        ..coord
    };
    let mut sum = 0.0;
    for x in -1..=1 {
        for y in -1..=1 {
            sum += classify(map, biased, Vec2::new(x as f32, y as f32) * texel);
        }
    }
    sum / 9.0
}
