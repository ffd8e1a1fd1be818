mod common;
mod frame;
pub mod native;
pub(crate) mod shared;
pub mod software;
mod uniforms;

use std::fmt;

use crate::error::{RenderError, Result};
use crate::mesh::{MeshData, MeshHandle};
use crate::shadow::DepthTargetDesc;
use crate::texture::TextureData;

pub use common::{Camera, Light};
pub use frame::{Clear, DrawCall, FramePlan, PassPlan, PassTarget, PassUniforms, Viewport};
pub use native::NativeDevice;
pub use shared::{validate_wgsl, DEPTH_SHADER, MAIN_SHADER};
pub use software::{Coverage, DeviceEvent, SoftwareDevice};
pub use uniforms::{DepthUniforms, MainUniforms, ObjectUniforms};

macro_rules! resource_id {
    ($name:ident, $kind:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const KIND: &'static str = $kind;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

resource_id!(ProgramId, "program");
resource_id!(DepthTargetId, "depth target");
resource_id!(MeshId, "mesh");
resource_id!(TextureId, "texture");

/// Which pipeline a program feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    /// Vertex-only program writing light-space depth into a target of `format`.
    Depth { format: wgpu::TextureFormat },
    /// Lit, shadowed program drawing into the presentation surface. With
    /// `comparison` it samples the shadow map through a comparison sampler,
    /// otherwise it loads depths and compares them in the shader.
    Main { comparison: bool },
}

/// Source and role of a GPU program.
#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub label: String,
    pub kind: ProgramKind,
    pub source: String,
}

impl ProgramDesc {
    pub fn depth(format: wgpu::TextureFormat) -> Self {
        Self {
            label: "shadow-depth".to_string(),
            kind: ProgramKind::Depth { format },
            source: DEPTH_SHADER.to_string(),
        }
    }

    pub fn main(comparison: bool) -> Self {
        Self {
            label: "shadow-main".to_string(),
            kind: ProgramKind::Main { comparison },
            source: shared::main_shader_source(comparison),
        }
    }
}

/// Graphics backend used by the shadow renderer.
///
/// Passes inside one [`FramePlan`] must be executed in order, so that the
/// main pass observes the depth written by the shadow pass of the same frame.
pub trait RenderDevice {
    /// Largest width or height a 2D texture may have.
    fn max_texture_dimension(&self) -> u32;

    /// Compiles and links a program. Failures are `RenderError::ShaderCompile`.
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId>;

    fn destroy_program(&mut self, id: ProgramId);

    fn create_depth_target(&mut self, desc: &DepthTargetDesc) -> Result<DepthTargetId>;

    fn destroy_depth_target(&mut self, id: DepthTargetId);

    fn upload_mesh(&mut self, mesh: &MeshData, label: &str) -> Result<MeshHandle>;

    fn upload_texture(&mut self, texture: &TextureData, label: &str) -> Result<TextureId>;

    /// Runs every pass of the plan in order and presents the result.
    fn execute(&mut self, plan: &FramePlan) -> Result<()>;
}

/// Error for a main pass whose program and sampled target disagree on comparison sampling.
pub(crate) fn sampling_mismatch(
    label: &str,
    id: DepthTargetId,
    target_compares: bool,
) -> RenderError {
    let (target, program) = if target_compares {
        ("comparison", "raw depth")
    } else {
        ("raw depth", "comparison")
    };
    RenderError::Device(format!(
        "pass `{label}` reads {id} with {target} sampling but its program expects {program} sampling"
    ))
}
