use std::collections::HashSet;

use glam::Vec3;
use winit::keyboard::KeyCode;

use crate::config::ShadowFilter;
use crate::render::Light;

/// Keyboard state that moves the light between frames.
///
/// Arrow keys slide the light over the XZ plane, Page Up and Page Down raise
/// and lower it. The renderer only ever reads the resulting [`Light`].
#[derive(Debug, Clone)]
pub struct LightControls {
    keys: HashSet<KeyCode>,
    /// World units per second.
    speed: f32,
}

impl Default for LightControls {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl LightControls {
    pub fn new(speed: f32) -> Self {
        Self {
            keys: HashSet::new(),
            speed,
        }
    }

    pub fn set_key_down(&mut self, key: KeyCode) {
        self.keys.insert(key);
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    pub fn direction(&self) -> Vec3 {
        const BINDINGS: [(KeyCode, Vec3); 6] = [
            (KeyCode::ArrowLeft, Vec3::NEG_X),
            (KeyCode::ArrowRight, Vec3::X),
            (KeyCode::ArrowUp, Vec3::NEG_Z),
            (KeyCode::ArrowDown, Vec3::Z),
            (KeyCode::PageUp, Vec3::Y),
            (KeyCode::PageDown, Vec3::NEG_Y),
        ];
        BINDINGS
            .iter()
            .filter(|(key, _)| self.is_key_down(*key))
            .map(|(_, direction)| *direction)
            .sum()
    }

    /// Moves `light` for `dt` seconds of held keys. Returns whether it moved.
    pub fn apply(&self, light: &mut Light, dt: f32) -> bool {
        let direction = self.direction();
        if direction == Vec3::ZERO {
            return false;
        }
        light.position += direction * self.speed * dt;
        true
    }
}

/// Next filter in the binary, PCF, stochastic edge rotation.
pub fn cycle_filter(filter: ShadowFilter) -> ShadowFilter {
    match filter {
        ShadowFilter::Binary => ShadowFilter::Pcf {
            bias: ShadowFilter::DEFAULT_BIAS,
        },
        ShadowFilter::Pcf { .. } => ShadowFilter::default(),
        ShadowFilter::StochasticEdge { .. } => ShadowFilter::Binary,
    }
}
