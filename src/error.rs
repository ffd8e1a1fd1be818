use thiserror::Error;

use crate::shadow::FramebufferStatus;

/// Failures reported by the shadow renderer and its devices.
///
/// Setup errors (`ShaderCompile`, `FramebufferIncomplete`, `InvalidConfig`)
/// are fatal for the session. Per-frame problems such as empty meshes are
/// logged and skipped instead of surfacing here.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to compile program `{label}`: {message}")]
    ShaderCompile { label: String, message: String },

    #[error("shadow framebuffer incomplete: {0}")]
    FramebufferIncomplete(FramebufferStatus),

    #[error("invalid shadow configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown {kind} handle {id}")]
    UnknownResource { kind: &'static str, id: u32 },

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("graphics device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
