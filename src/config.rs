use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};

/// Largest number of stochastic edge samples; the offset table has this many entries.
pub const MAX_EDGE_SAMPLES: u32 = 32;

/// Tunables for the shadow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Width and height of the square shadow map in texels.
    pub resolution: u32,
    pub filter: ShadowFilter,
    pub frustum: FrustumFit,
    pub lighting: LightingConfig,
    /// Read the shadow map through a `LessEqual` comparison sampler. When
    /// false the main program loads raw depths and compares them itself.
    pub comparison_sampling: bool,
    /// Background color of the main pass (linear RGBA).
    pub clear_color: [f32; 4],
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            resolution: 2048,
            filter: ShadowFilter::default(),
            frustum: FrustumFit::default(),
            lighting: LightingConfig::default(),
            comparison_sampling: true,
            clear_color: [0.5, 0.5, 0.5, 1.0],
        }
    }
}

impl ShadowConfig {
    /// Checks the values that cannot be repaired by clamping.
    ///
    /// The shadow map resolution is checked later, against the device, when
    /// the depth target is created.
    pub fn validate(&self) -> Result<()> {
        if let ShadowFilter::Pcf { bias } = self.filter {
            if !bias.is_finite() || bias < 0.0 {
                return Err(RenderError::InvalidConfig(format!(
                    "pcf bias must be a non-negative number, got {bias}"
                )));
            }
        }
        match self.frustum {
            FrustumFit::Fixed(bounds) => bounds.validate()?,
            FrustumFit::Scene { padding } => {
                if !padding.is_finite() || padding < 0.0 {
                    return Err(RenderError::InvalidConfig(format!(
                        "frustum padding must be a non-negative number, got {padding}"
                    )));
                }
            }
        }
        self.lighting.validate()
    }
}

/// Shadow filtering strategy used by the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ShadowFilter {
    /// Single comparison: 0.4 in shadow, 1.0 lit.
    Binary,
    /// Unconditional 3x3 percentage-closer filter with a constant depth bias.
    Pcf { bias: f32 },
    /// Diagonal-neighbour early out, then randomized taps on shadow edges.
    StochasticEdge { edge_samples: u32 },
}

impl Default for ShadowFilter {
    fn default() -> Self {
        Self::StochasticEdge { edge_samples: 16 }
    }
}

impl ShadowFilter {
    pub const DEFAULT_BIAS: f32 = 0.0025;

    /// Edge sample count clamped to the size of the offset table.
    pub fn edge_samples(&self) -> u32 {
        match self {
            Self::StochasticEdge { edge_samples } => (*edge_samples).clamp(1, MAX_EDGE_SAMPLES),
            _ => 0,
        }
    }

    pub fn bias(&self) -> f32 {
        match self {
            Self::Pcf { bias } => *bias,
            _ => 0.0,
        }
    }

    /// Index written into the shader's filter-mode flag.
    pub fn mode_index(&self) -> u32 {
        match self {
            Self::Binary => 0,
            Self::Pcf { .. } => 1,
            Self::StochasticEdge { .. } => 2,
        }
    }
}

impl fmt::Display for ShadowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary => f.write_str("binary"),
            Self::Pcf { bias } => write!(f, "pcf 3x3, bias {bias}"),
            Self::StochasticEdge { .. } => {
                write!(f, "stochastic edge, {} samples", self.edge_samples())
            }
        }
    }
}

impl FromStr for ShadowFilter {
    type Err = RenderError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "pcf" => Ok(Self::Pcf {
                bias: Self::DEFAULT_BIAS,
            }),
            "stochastic" | "stochastic-edge" | "edge" => Ok(Self::default()),
            other => Err(RenderError::InvalidConfig(format!(
                "unknown shadow filter `{other}` (expected binary, pcf or stochastic)"
            ))),
        }
    }
}

/// Orthographic extent of the light's view volume, in light view space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrthoBounds {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl OrthoBounds {
    /// Square bounds of `±half_extent` with the given depth range.
    pub fn symmetric(half_extent: f32, near: f32, far: f32) -> Self {
        Self {
            left: -half_extent,
            right: half_extent,
            bottom: -half_extent,
            top: half_extent,
            near,
            far,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let values = [
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return Err(RenderError::InvalidConfig(
                "frustum bounds must be finite".to_string(),
            ));
        }
        if self.left >= self.right || self.bottom >= self.top || self.near >= self.far {
            return Err(RenderError::InvalidConfig(format!(
                "frustum bounds are inverted or empty: {self:?}"
            )));
        }
        Ok(())
    }
}

impl Default for OrthoBounds {
    fn default() -> Self {
        Self::symmetric(10.0, -20.0, 100.0)
    }
}

/// How the light's orthographic frustum is chosen each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrustumFit {
    Fixed(OrthoBounds),
    /// Fit the bounds of every shadow caster and receiver, grown by `padding`.
    Scene { padding: f32 },
}

impl Default for FrustumFit {
    fn default() -> Self {
        Self::Fixed(OrthoBounds::default())
    }
}

/// When a light contributes diffuse and specular terms to a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityPolicy {
    /// Accumulate regardless of which side of the surface the light is on.
    #[default]
    Always,
    /// Only when the light and the viewer are on the same side of the surface.
    MatchFacing,
}

impl IntensityPolicy {
    pub fn flag(&self) -> u32 {
        match self {
            Self::Always => 0,
            Self::MatchFacing => 1,
        }
    }
}

/// Phong-style shading terms for the main pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingConfig {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
    pub intensity_policy: IntensityPolicy,
    /// Use screen-space derivative normals instead of vertex normals.
    pub faceted_shading: bool,
    /// Discard fragments whose normal points away from the viewer.
    pub forward_facing_only: bool,
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient: 0.1,
            diffuse: 0.7,
            specular: 0.7,
            shininess: 50.0,
            intensity_policy: IntensityPolicy::Always,
            faceted_shading: false,
            forward_facing_only: false,
        }
    }
}

impl LightingConfig {
    fn validate(&self) -> Result<()> {
        let terms = [
            ("ambient", self.ambient),
            ("diffuse", self.diffuse),
            ("specular", self.specular),
            ("shininess", self.shininess),
        ];
        for (name, value) in terms {
            if !value.is_finite() || value < 0.0 {
                return Err(RenderError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ShadowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.filter.edge_samples(), 16);
        assert_eq!(config.frustum, FrustumFit::Fixed(OrthoBounds::default()));
    }

    #[test]
    fn edge_samples_are_clamped_to_table() {
        let none = ShadowFilter::StochasticEdge { edge_samples: 0 };
        let many = ShadowFilter::StochasticEdge { edge_samples: 500 };
        assert_eq!(none.edge_samples(), 1);
        assert_eq!(many.edge_samples(), MAX_EDGE_SAMPLES);
        assert_eq!(ShadowFilter::Binary.edge_samples(), 0);
    }

    #[test]
    fn parses_filter_names() {
        assert_eq!("binary".parse::<ShadowFilter>().unwrap(), ShadowFilter::Binary);
        assert_eq!(
            "PCF".parse::<ShadowFilter>().unwrap(),
            ShadowFilter::Pcf { bias: 0.0025 }
        );
        assert!(matches!(
            "stochastic".parse::<ShadowFilter>().unwrap(),
            ShadowFilter::StochasticEdge { .. }
        ));
        assert!("blurry".parse::<ShadowFilter>().is_err());
    }

    #[test]
    fn rejects_inverted_frustum() {
        let mut config = ShadowConfig::default();
        config.frustum = FrustumFit::Fixed(OrthoBounds {
            near: 50.0,
            far: 10.0,
            ..OrthoBounds::default()
        });
        assert!(matches!(
            config.validate(),
            Err(RenderError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_negative_bias() {
        let config = ShadowConfig {
            filter: ShadowFilter::Pcf { bias: -1.0 },
            ..ShadowConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
