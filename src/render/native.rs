use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use bytemuck::bytes_of;
use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::error::{RenderError, Result};
use crate::mesh::{MeshData, MeshHandle, Vertex};
use crate::shadow::DepthTargetDesc;
use crate::texture::TextureData;

use super::shared::validate_wgsl;
use super::sampling_mismatch;
use super::uniforms::{DepthUniforms, MainUniforms, ObjectUniforms};
use super::{
    DepthTargetId, FramePlan, MeshId, PassPlan, PassTarget, PassUniforms, ProgramDesc, ProgramId,
    ProgramKind, RenderDevice, TextureId,
};

/// wgpu device presenting into a window.
pub struct NativeDevice {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    layouts: Layouts,
    shadow_sampler: wgpu::Sampler,
    base_sampler: wgpu::Sampler,
    white_texture: NativeTexture,
    unshadowed: NativeDepthTarget,
    programs: HashMap<ProgramId, NativeProgram>,
    depth_targets: HashMap<DepthTargetId, NativeDepthTarget>,
    meshes: HashMap<MeshId, MeshBuffers>,
    textures: HashMap<TextureId, NativeTexture>,
    next_id: u32,
}

impl NativeDevice {
    /// Initializes the GPU device for the provided window.
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance.create_surface(Arc::clone(&window))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("penumbra-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .context("surface reports no texture formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);
        let layouts = Layouts::new(&device);

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let base_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("base-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let white_texture = NativeTexture::create(
            &device,
            &queue,
            &layouts.texture,
            &base_sampler,
            &TextureData::white(),
            "white",
        );
        let unshadowed =
            NativeDepthTarget::create(&device, &DepthTargetDesc::new(1), "unshadowed-map");
        unshadowed.clear(&device, &queue);

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            layouts,
            shadow_sampler,
            base_sampler,
            white_texture,
            unshadowed,
            programs: HashMap::new(),
            depth_targets: HashMap::new(),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            next_id: 0,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// Resizes the swap chain to match the new dimensions.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Runs `f` inside a validation error scope.
    fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(RenderError::Device(err.to_string())),
            None => Ok(value),
        }
    }

    fn build_program(&self, desc: &ProgramDesc) -> Result<NativeProgram> {
        let label = desc.label.as_str();
        let (module, shader_error) = {
            self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(desc.source.as_str().into()),
            });
            (module, pollster::block_on(self.device.pop_error_scope()))
        };
        if let Some(err) = shader_error {
            return Err(RenderError::ShaderCompile {
                label: desc.label.clone(),
                message: err.to_string(),
            });
        }

        let pipelines = match desc.kind {
            ProgramKind::Depth { format } => {
                let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("depth-pipeline-layout"),
                    bind_group_layouts: &[&self.layouts.depth_pass, &self.layouts.object],
                    push_constant_ranges: &[],
                });
                CullPipelines::build(|face| {
                    self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(label),
                        layout: Some(&layout),
                        vertex: wgpu::VertexState {
                            module: &module,
                            entry_point: Some("vs_depth"),
                            compilation_options: Default::default(),
                            buffers: &[Vertex::POSITION_LAYOUT],
                        },
                        primitive: primitive(face),
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format,
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::LessEqual,
                            stencil: Default::default(),
                            bias: Default::default(),
                        }),
                        multisample: wgpu::MultisampleState::default(),
                        fragment: None,
                        multiview: None,
                        cache: None,
                    })
                })
            }
            ProgramKind::Main { .. } => {
                let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("main-pipeline-layout"),
                    bind_group_layouts: &[
                        &self.layouts.globals,
                        &self.layouts.object,
                        &self.layouts.texture,
                    ],
                    push_constant_ranges: &[],
                });
                CullPipelines::build(|face| {
                    self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                        label: Some(label),
                        layout: Some(&layout),
                        vertex: wgpu::VertexState {
                            module: &module,
                            entry_point: Some("vs_main"),
                            compilation_options: Default::default(),
                            buffers: &[Vertex::LAYOUT],
                        },
                        primitive: primitive(face),
                        depth_stencil: Some(wgpu::DepthStencilState {
                            format: DepthBuffer::FORMAT,
                            depth_write_enabled: true,
                            depth_compare: wgpu::CompareFunction::Less,
                            stencil: Default::default(),
                            bias: Default::default(),
                        }),
                        multisample: wgpu::MultisampleState::default(),
                        fragment: Some(wgpu::FragmentState {
                            module: &module,
                            entry_point: Some("fs_main"),
                            compilation_options: Default::default(),
                            targets: &[Some(wgpu::ColorTargetState {
                                format: self.config.format,
                                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                                write_mask: wgpu::ColorWrites::ALL,
                            })],
                        }),
                        multiview: None,
                        cache: None,
                    })
                })
            }
        };
        Ok(NativeProgram {
            kind: desc.kind,
            pipelines,
        })
    }

    fn pass_bind_group(&self, pass: &PassPlan) -> Result<wgpu::BindGroup> {
        let bind_group = match &pass.uniforms {
            PassUniforms::Depth(uniforms) => {
                let buffer = self.uniform_buffer("depth-uniforms", bytes_of::<DepthUniforms>(uniforms));
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("depth-pass-bind-group"),
                    layout: &self.layouts.depth_pass,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            }
            PassUniforms::Main(uniforms) => {
                let shadow_map = match pass.sampled {
                    Some(id) => self
                        .depth_targets
                        .get(&id)
                        .ok_or(RenderError::UnknownResource {
                            kind: DepthTargetId::KIND,
                            id: id.0,
                        })?,
                    None => &self.unshadowed,
                };
                let buffer = self.uniform_buffer("main-uniforms", bytes_of::<MainUniforms>(uniforms));
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("main-pass-bind-group"),
                    layout: &self.layouts.globals,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(&shadow_map.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                        },
                    ],
                })
            }
        };
        Ok(bind_group)
    }

    fn uniform_buffer(&self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassPlan,
        frame: &wgpu::TextureView,
    ) -> Result<()> {
        let program = self
            .programs
            .get(&pass.program)
            .ok_or(RenderError::UnknownResource {
                kind: ProgramId::KIND,
                id: pass.program.0,
            })?;
        let compatible = matches!(
            (program.kind, pass.target, &pass.uniforms),
            (ProgramKind::Depth { .. }, PassTarget::DepthTarget(_), PassUniforms::Depth(_))
                | (ProgramKind::Main { .. }, PassTarget::Surface, PassUniforms::Main(_))
        );
        if !compatible {
            return Err(RenderError::Device(format!(
                "pass `{}` mixes incompatible target, uniforms and program",
                pass.label
            )));
        }
        if let (ProgramKind::Main { comparison }, Some(id)) = (program.kind, pass.sampled) {
            let target = self.depth_targets.get(&id).ok_or(RenderError::UnknownResource {
                kind: DepthTargetId::KIND,
                id: id.0,
            })?;
            if target.desc.comparison != comparison {
                return Err(sampling_mismatch(pass.label, id, target.desc.comparison));
            }
        }
        let pass_bind_group = self.pass_bind_group(pass)?;

        let mut draws = Vec::with_capacity(pass.draws.len());
        for draw in &pass.draws {
            let mesh = self.meshes.get(&draw.mesh).ok_or(RenderError::UnknownResource {
                kind: MeshId::KIND,
                id: draw.mesh.0,
            })?;
            let buffer = self.uniform_buffer("object-uniforms", bytes_of::<ObjectUniforms>(&draw.object));
            let object = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object-bind-group"),
                layout: &self.layouts.object,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            let texture = match draw.texture {
                Some(id) => self.textures.get(&id).unwrap_or_else(|| {
                    warn!("texture {id} is missing; drawing {} untextured", draw.mesh);
                    &self.white_texture
                }),
                None => &self.white_texture,
            };
            draws.push((mesh, object, texture, &draw.index_ranges));
        }

        let (color_attachment, depth_view, width, height) = match pass.target {
            PassTarget::DepthTarget(id) => {
                let target = self.depth_targets.get(&id).ok_or(RenderError::UnknownResource {
                    kind: DepthTargetId::KIND,
                    id: id.0,
                })?;
                (None, &target.view, target.desc.resolution, target.desc.resolution)
            }
            PassTarget::Surface => {
                let load = pass
                    .clear
                    .color
                    .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);
                let attachment = wgpu::RenderPassColorAttachment {
                    view: frame,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                };
                (Some(attachment), &self.depth.view, self.config.width, self.config.height)
            }
        };
        let depth_load = pass
            .clear
            .depth
            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear);

        let color_attachments: &[Option<wgpu::RenderPassColorAttachment>] =
            if color_attachment.is_some() {
                std::slice::from_ref(&color_attachment)
            } else {
                &[]
            };
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(pass.label),
            color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_viewport(
            0.0,
            0.0,
            pass.viewport.width.min(width) as f32,
            pass.viewport.height.min(height) as f32,
            0.0,
            1.0,
        );
        render_pass.set_pipeline(program.pipelines.for_face(pass.cull));
        render_pass.set_bind_group(0, &pass_bind_group, &[]);

        for (mesh, object, texture, ranges) in &draws {
            render_pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            render_pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.set_bind_group(1, object, &[]);
            if matches!(program.kind, ProgramKind::Main { .. }) {
                render_pass.set_bind_group(2, &texture.bind_group, &[]);
            }
            for range in ranges.iter() {
                let end = range.end.min(mesh.index_count);
                if range.start < end {
                    render_pass.draw_indexed(range.start..end, 0, 0..1);
                }
            }
        }
        Ok(())
    }
}

impl RenderDevice for NativeDevice {
    fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramId> {
        validate_wgsl(&desc.label, &desc.source)?;
        let program = self.build_program(desc)?;
        let id = ProgramId(self.allocate_id());
        self.programs.insert(id, program);
        debug!("linked program `{}` as {id}", desc.label);
        Ok(id)
    }

    fn destroy_program(&mut self, id: ProgramId) {
        self.programs.remove(&id);
    }

    fn create_depth_target(&mut self, desc: &DepthTargetDesc) -> Result<DepthTargetId> {
        desc.check(self.max_texture_dimension())?;
        let target = self.scoped(|device| NativeDepthTarget::create(device, desc, "shadow-map"))?;
        let id = DepthTargetId(self.allocate_id());
        self.depth_targets.insert(id, target);
        Ok(id)
    }

    fn destroy_depth_target(&mut self, id: DepthTargetId) {
        if let Some(target) = self.depth_targets.remove(&id) {
            target.texture.destroy();
        }
    }

    fn upload_mesh(&mut self, mesh: &MeshData, label: &str) -> Result<MeshHandle> {
        if !mesh.indices_in_range() {
            return Err(RenderError::Device(format!(
                "mesh `{label}` indexes past its {} vertices",
                mesh.vertices.len()
            )));
        }
        let buffers = MeshBuffers::from_mesh(&self.device, mesh, label);
        let id = MeshId(self.allocate_id());
        self.meshes.insert(id, buffers);
        Ok(MeshHandle {
            id,
            triangles: mesh.triangles.len() as u32,
            quads: mesh.quads.len() as u32,
            bounds: mesh.bounds(),
        })
    }

    fn upload_texture(&mut self, texture: &TextureData, label: &str) -> Result<TextureId> {
        if !texture.is_valid() {
            return Err(RenderError::Device(format!(
                "texture `{label}` has {} bytes for {}x{} texels",
                texture.rgba.len(),
                texture.width,
                texture.height
            )));
        }
        let native = NativeTexture::create(
            &self.device,
            &self.queue,
            &self.layouts.texture,
            &self.base_sampler,
            texture,
            label,
        );
        let id = TextureId(self.allocate_id());
        self.textures.insert(id, native);
        Ok(id)
    }

    fn execute(&mut self, plan: &FramePlan) -> Result<()> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        for pass in &plan.passes {
            self.encode_pass(&mut encoder, pass, &view)?;
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

fn primitive(cull: wgpu::Face) -> wgpu::PrimitiveState {
    wgpu::PrimitiveState {
        topology: wgpu::PrimitiveTopology::TriangleList,
        front_face: wgpu::FrontFace::Ccw,
        cull_mode: Some(cull),
        polygon_mode: wgpu::PolygonMode::Fill,
        ..Default::default()
    }
}

struct NativeProgram {
    kind: ProgramKind,
    pipelines: CullPipelines,
}

/// One pipeline per culled face, picked by the pass plan.
struct CullPipelines {
    cull_front: wgpu::RenderPipeline,
    cull_back: wgpu::RenderPipeline,
}

impl CullPipelines {
    fn build(mut create: impl FnMut(wgpu::Face) -> wgpu::RenderPipeline) -> Self {
        Self {
            cull_front: create(wgpu::Face::Front),
            cull_back: create(wgpu::Face::Back),
        }
    }

    fn for_face(&self, face: wgpu::Face) -> &wgpu::RenderPipeline {
        match face {
            wgpu::Face::Front => &self.cull_front,
            wgpu::Face::Back => &self.cull_back,
        }
    }
}

struct Layouts {
    depth_pass: wgpu::BindGroupLayout,
    globals: wgpu::BindGroupLayout,
    object: wgpu::BindGroupLayout,
    texture: wgpu::BindGroupLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        let depth_pass = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth-pass-layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX, size_of_uniform::<DepthUniforms>())],
        });
        let globals = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("globals-layout"),
            entries: &[
                uniform_entry(
                    0,
                    wgpu::ShaderStages::VERTEX_FRAGMENT,
                    size_of_uniform::<MainUniforms>(),
                ),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });
        // Per-object uniform layout
        let object = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                size_of_uniform::<ObjectUniforms>(),
            )],
        });
        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("texture-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        Self {
            depth_pass,
            globals,
            object,
            texture,
        }
    }
}

fn size_of_uniform<T>() -> Option<wgpu::BufferSize> {
    wgpu::BufferSize::new(std::mem::size_of::<T>() as u64)
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    min_binding_size: Option<wgpu::BufferSize>,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size,
        },
        count: None,
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let indices = mesh.index_data();
        // Zero-sized buffers are not bindable; empty meshes are never drawn anyway.
        let vertices: &[u8] = if mesh.vertices.is_empty() {
            &[0; std::mem::size_of::<Vertex>()]
        } else {
            bytemuck::cast_slice(&mesh.vertices)
        };
        let index_bytes: &[u8] = if indices.is_empty() {
            &[0; 4]
        } else {
            bytemuck::cast_slice(&indices)
        };
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-vertices")),
            contents: vertices,
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-indices")),
            contents: index_bytes,
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        }
    }
}

struct NativeDepthTarget {
    desc: DepthTargetDesc,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl NativeDepthTarget {
    fn create(device: &wgpu::Device, desc: &DepthTargetDesc, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.resolution,
                height: desc.resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            desc: *desc,
            texture,
            view,
        }
    }

    /// Fills the target with the far plane.
    fn clear(&self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("depth-clear-encoder"),
        });
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("depth-clear"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        queue.submit(std::iter::once(encoder.finish()));
    }
}

struct NativeTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

impl NativeTexture {
    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        data: &TextureData,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: data.width,
            height: data.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("texture-bind-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self {
            _texture: texture,
            bind_group,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
