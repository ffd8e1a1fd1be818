mod depth_target;
mod draw;
mod light_space;
mod main_pass;
mod renderer;
mod sampler;
mod shadow_pass;

pub use depth_target::{DepthTarget, DepthTargetDesc, FramebufferStatus, SHADOW_MAP_FORMAT};
pub use draw::{draw_all, DrawPass};
pub use light_space::LightSpace;
pub use main_pass::MainPass;
pub use renderer::{FrameStats, ShadowRenderer};
pub use sampler::{
    classify, edge_sample_index, rand, DepthMap, ShadowCoord, ShadowSampler,
    EDGE_SAMPLE_OFFSETS, LIT, SHADOWED,
};
pub use shadow_pass::ShadowPass;
