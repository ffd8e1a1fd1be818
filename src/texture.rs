use glam::{Vec2, Vec3};

/// RGBA8 image uploaded with [`crate::render::RenderDevice::upload_texture`].
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureData {
    /// Single white texel; sampling it leaves the tint unchanged.
    pub fn white() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        }
    }

    /// Two-tone checkerboard with `cells` squares along each side.
    pub fn checker(size: u32, cells: u32, light: [u8; 3], dark: [u8; 3]) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let mut rgba = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let [r, g, b] = if (x / cell + y / cell) % 2 == 0 {
                    light
                } else {
                    dark
                };
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
        }
        Self {
            width: size,
            height: size,
            rgba,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() == (self.width as usize) * (self.height as usize) * 4
    }

    /// Nearest-neighbour lookup with repeat addressing.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        if !self.is_valid() {
            return Vec3::ONE;
        }
        let u = uv.x - uv.x.floor();
        let v = uv.y - uv.y.floor();
        let x = ((u * self.width as f32) as u32).min(self.width - 1);
        let y = ((v * self.height as f32) as u32).min(self.height - 1);
        let offset = ((y * self.width + x) * 4) as usize;
        Vec3::new(
            self.rgba[offset] as f32,
            self.rgba[offset + 1] as f32,
            self.rgba[offset + 2] as f32,
        ) / 255.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checker_alternates_cells() {
        let texture = TextureData::checker(4, 2, [255, 255, 255], [0, 0, 0]);
        assert!(texture.is_valid());
        assert_eq!(texture.sample(Vec2::new(0.1, 0.1)), Vec3::ONE);
        assert_eq!(texture.sample(Vec2::new(0.9, 0.1)), Vec3::ZERO);
        assert_eq!(texture.sample(Vec2::new(0.9, 0.9)), Vec3::ONE);
    }

    #[test]
    fn sampling_wraps() {
        let texture = TextureData::checker(4, 2, [255, 255, 255], [0, 0, 0]);
        assert_eq!(
            texture.sample(Vec2::new(1.1, 0.1)),
            texture.sample(Vec2::new(0.1, 0.1))
        );
    }
}
