//! Single-light shadow mapping on wgpu.
//!
//! Each frame renders shadow casters from the light into a depth-only target,
//! then renders the scene from the camera while sampling that target to
//! attenuate lighting. Shadow edges are softened by a stochastic edge filter,
//! with PCF and binary comparison available as alternatives.
//!
//! The renderer talks to the GPU through the [`render::RenderDevice`] trait.
//! [`render::NativeDevice`] drives wgpu and a winit window;
//! [`render::SoftwareDevice`] rasterizes on the CPU so frames can be checked
//! in headless tools and tests.

pub mod app;
pub mod config;
pub mod error;
pub mod input;
pub mod mesh;
pub mod obj;
pub mod render;
pub mod scene;
pub mod shadow;
pub mod texture;

pub use config::{FrustumFit, IntensityPolicy, LightingConfig, OrthoBounds, ShadowConfig, ShadowFilter};
pub use error::{RenderError, Result};
pub use mesh::{Aabb, MeshData, MeshHandle, MeshInstance, Vertex};
pub use obj::{load_obj, load_obj_from_str, ObjOptions};
pub use render::{Camera, Light, RenderDevice, SoftwareDevice, Viewport};
pub use scene::{Scene, SceneObject};
pub use shadow::{DepthTarget, FrameStats, ShadowRenderer, ShadowSampler};
pub use texture::TextureData;
