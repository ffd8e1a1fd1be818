use std::fmt;

use log::debug;

use crate::error::{RenderError, Result};
use crate::render::{DepthTargetId, RenderDevice, Viewport};

/// Texture format of the shadow map.
pub const SHADOW_MAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Completeness of a depth-only render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    ZeroDimensions,
    MissingDepthAttachment(wgpu::TextureFormat),
    ExceedsDeviceLimit { requested: u32, max: u32 },
}

impl fmt::Display for FramebufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => f.write_str("complete"),
            Self::ZeroDimensions => f.write_str("shadow map resolution is zero"),
            Self::MissingDepthAttachment(format) => {
                write!(f, "format {format:?} has no depth attachment")
            }
            Self::ExceedsDeviceLimit { requested, max } => write!(
                f,
                "shadow map resolution {requested} exceeds the device limit of {max}"
            ),
        }
    }
}

/// Parameters of a square shadow map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTargetDesc {
    pub resolution: u32,
    pub format: wgpu::TextureFormat,
    /// Whether the main program reads this map through a comparison
    /// sampler. Programs and targets must agree on it.
    pub comparison: bool,
}

impl DepthTargetDesc {
    pub fn new(resolution: u32) -> Self {
        Self {
            resolution,
            format: SHADOW_MAP_FORMAT,
            comparison: true,
        }
    }

    pub fn with_comparison(mut self, comparison: bool) -> Self {
        self.comparison = comparison;
        self
    }

    /// Status a target built from this description would have on a device
    /// limited to `max_dimension` texels per side.
    pub fn status(&self, max_dimension: u32) -> FramebufferStatus {
        if self.resolution == 0 {
            FramebufferStatus::ZeroDimensions
        } else if !self.format.has_depth_aspect() {
            FramebufferStatus::MissingDepthAttachment(self.format)
        } else if self.resolution > max_dimension {
            FramebufferStatus::ExceedsDeviceLimit {
                requested: self.resolution,
                max: max_dimension,
            }
        } else {
            FramebufferStatus::Complete
        }
    }

    pub fn check(&self, max_dimension: u32) -> Result<()> {
        match self.status(max_dimension) {
            FramebufferStatus::Complete => Ok(()),
            status => Err(RenderError::FramebufferIncomplete(status)),
        }
    }
}

/// Shadow map owned by the renderer for its whole lifetime.
#[derive(Debug, PartialEq, Eq)]
pub struct DepthTarget {
    id: DepthTargetId,
    desc: DepthTargetDesc,
}

impl DepthTarget {
    /// Validates `desc` against the device and allocates the texture.
    pub fn create<D: RenderDevice + ?Sized>(device: &mut D, desc: DepthTargetDesc) -> Result<Self> {
        desc.check(device.max_texture_dimension())?;
        let id = device.create_depth_target(&desc)?;
        debug!(
            "created {}x{} shadow map {id} ({:?})",
            desc.resolution, desc.resolution, desc.format
        );
        Ok(Self { id, desc })
    }

    pub fn id(&self) -> DepthTargetId {
        self.id
    }

    pub fn resolution(&self) -> u32 {
        self.desc.resolution
    }

    pub fn desc(&self) -> &DepthTargetDesc {
        &self.desc
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::square(self.desc.resolution)
    }

    /// Releases the texture. The target cannot be used afterwards.
    pub fn destroy<D: RenderDevice + ?Sized>(self, device: &mut D) {
        debug!("destroying shadow map {}", self.id);
        device.destroy_depth_target(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_resolution_is_incomplete() {
        let desc = DepthTargetDesc::new(0);
        assert_eq!(desc.status(8192), FramebufferStatus::ZeroDimensions);
        assert!(matches!(
            desc.check(8192),
            Err(RenderError::FramebufferIncomplete(FramebufferStatus::ZeroDimensions))
        ));
    }

    #[test]
    fn color_format_has_no_depth_attachment() {
        let desc = DepthTargetDesc {
            format: wgpu::TextureFormat::Rgba8Unorm,
            ..DepthTargetDesc::new(1024)
        };
        assert_eq!(
            desc.status(8192),
            FramebufferStatus::MissingDepthAttachment(wgpu::TextureFormat::Rgba8Unorm)
        );
    }

    #[test]
    fn oversized_maps_report_the_limit() {
        let desc = DepthTargetDesc::new(16384);
        assert_eq!(
            desc.status(8192),
            FramebufferStatus::ExceedsDeviceLimit {
                requested: 16384,
                max: 8192
            }
        );
        assert_eq!(desc.status(16384), FramebufferStatus::Complete);
    }

    #[test]
    fn status_messages_are_readable() {
        let message = RenderError::FramebufferIncomplete(FramebufferStatus::ZeroDimensions)
            .to_string();
        assert_eq!(
            message,
            "shadow framebuffer incomplete: shadow map resolution is zero"
        );
    }
}
