//! A headless [`RenderBackend`] on top of wgpu.
//!
//! Renders into offscreen targets: a colour texture with a depth buffer for
//! the camera pass, and a depth-only shadow map for the shadow pass. Every
//! layer mesh owns its own vertex buffer, index buffer and a small uniform
//! holding the layer's world origin and quantization extent.
//!
//! Draws are collected between `begin_pass` and `end_pass` and encoded into a
//! single render pass on submit. Buffer creation runs inside wgpu error
//! scopes, so an allocation failure surfaces as an error from the call that
//! caused it.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use cgmath::{Matrix4, Point3};
use log::{info, trace};
use wgpu::util::DeviceExt;

use super::{texture::Texture, vertex::CompressedVertex, vertex::LayerExtent};
use crate::engine_state::{
    buffer_state::{BufferAnalytics, DrawPhase, MeshHandle, PassKind, RenderBackend},
    camera_state::CameraUniform,
    rendering::meshing::mesh::MeshData,
};

const SHADER_SOURCE: &str = include_str!("shaders/terrain.wgsl");

/// Per-mesh shader data.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LayerUniform {
    origin: [f32; 4],
    extent: [f32; 4],
}

struct GpuBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
    _uniform: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    analytics: BufferAnalytics,
}

struct PendingPass {
    kind: PassKind,
    draws: Vec<(MeshHandle, DrawPhase)>,
}

/// Headless wgpu renderer.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_target: Texture,
    depth_texture: Texture,
    shadow_map: Texture,
    pass_buffer: wgpu::Buffer,
    pass_bind_group: wgpu::BindGroup,
    mesh_layout: wgpu::BindGroupLayout,
    opaque_pipeline: wgpu::RenderPipeline,
    alpha_pipeline: wgpu::RenderPipeline,
    shadow_pipeline: wgpu::RenderPipeline,
    meshes: HashMap<MeshHandle, GpuBuffers>,
    next_handle: u64,
    current_pass: Option<PendingPass>,
}

impl WgpuBackend {
    /// Creates a backend on the default adapter.
    ///
    /// # Arguments
    /// * `width` - Width of the colour target
    /// * `height` - Height of the colour target
    /// * `shadow_resolution` - Side length of the square shadow map
    ///
    /// # Errors
    /// Fails if no adapter or device is available.
    pub fn new(width: u32, height: u32, shadow_resolution: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("no suitable GPU adapter")?;
        info!("Using GPU adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("terrain device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .context("failed to open GPU device")?;

        Ok(Self::with_device(device, queue, width, height, shadow_resolution))
    }

    fn with_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
        shadow_resolution: u32,
    ) -> Self {
        let color_target = Texture::create_color_target(&device, width, height, "COLOR TARGET");
        let depth_texture = Texture::create_depth_texture(&device, width, height, "DEPTH TEXTURE");
        let shadow_map =
            Texture::create_depth_texture(&device, shadow_resolution, shadow_resolution, "SHADOW MAP");

        let uniform_layout = |label: &str| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            })
        };
        let pass_layout = uniform_layout("pass bind group layout");
        let mesh_layout = uniform_layout("layer bind group layout");

        let pass_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("pass uniform"),
            contents: bytemuck::cast_slice(&[CameraUniform::new()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let pass_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass bind group"),
            layout: &pass_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: pass_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Terrain Shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER_SOURCE.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Terrain Pipeline Layout"),
            bind_group_layouts: &[&pass_layout, &mesh_layout],
            push_constant_ranges: &[],
        });

        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        };
        let depth_stencil = |write: bool, bias: wgpu::DepthBiasState| wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias,
        };
        let color_pipeline = |label: &str, entry_point: &str, blend: wgpu::BlendState, write_depth: bool| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[CompressedVertex::desc()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(entry_point),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Texture::COLOR_FORMAT,
                        blend: Some(blend),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive,
                depth_stencil: Some(depth_stencil(write_depth, wgpu::DepthBiasState::default())),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        };

        let opaque_pipeline =
            color_pipeline("Opaque Terrain Pipeline", "fs_opaque", wgpu::BlendState::REPLACE, true);
        let alpha_pipeline = color_pipeline(
            "Alpha Terrain Pipeline",
            "fs_alpha",
            wgpu::BlendState::ALPHA_BLENDING,
            false,
        );
        let shadow_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Shadow Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_shadow"),
                compilation_options: Default::default(),
                buffers: &[CompressedVertex::desc()],
            },
            fragment: None,
            primitive,
            depth_stencil: Some(depth_stencil(
                true,
                wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            )),
            multisample: Default::default(),
            multiview: None,
            cache: None,
        });

        WgpuBackend {
            device,
            queue,
            color_target,
            depth_texture,
            shadow_map,
            pass_buffer,
            pass_bind_group,
            mesh_layout,
            opaque_pipeline,
            alpha_pipeline,
            shadow_pipeline,
            meshes: HashMap::new(),
            next_handle: 0,
            current_pass: None,
        }
    }

    /// Runs `f` inside out-of-memory and validation error scopes.
    fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = out_of_memory.or(validation) {
            bail!("GPU error during {}: {}", what, error);
        }
        Ok(value)
    }

    fn create_buffers(&self, label: &str, mesh: &MeshData) -> Result<(wgpu::Buffer, wgpu::Buffer)> {
        self.scoped(label, |device| {
            let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
            let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            });
            (vertex, index)
        })
    }

    pub fn get_total_allocated_memory(&self) -> u64 {
        self.meshes
            .values()
            .fold(0, |acc, mesh| acc + mesh.analytics.allocated_memory)
    }

    pub fn get_total_used_memory(&self) -> u64 {
        self.meshes
            .values()
            .fold(0, |acc, mesh| acc + mesh.analytics.used_memory)
    }

    pub fn color_target(&self) -> &Texture {
        &self.color_target
    }

    pub fn shadow_map(&self) -> &Texture {
        &self.shadow_map
    }
}

impl RenderBackend for WgpuBackend {
    fn create_mesh(
        &mut self,
        label: &str,
        origin: Point3<f32>,
        extent: LayerExtent,
        mesh: &MeshData,
    ) -> Result<MeshHandle> {
        let (vertex, index) = self.create_buffers(label, mesh)?;
        let uniform = LayerUniform {
            origin: [origin.x, origin.y, origin.z, 0.0],
            extent: [extent.0.x, extent.0.y, extent.0.z, 0.0],
        };
        let layout = &self.mesh_layout;
        let (uniform_buffer, bind_group) = self.scoped(label, |device| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            (buffer, bind_group)
        })?;

        let size = mesh.byte_size() as u64;
        let handle = MeshHandle(self.next_handle);
        self.next_handle += 1;
        self.meshes.insert(
            handle,
            GpuBuffers {
                vertex,
                index,
                index_count: mesh.index_count(),
                _uniform: uniform_buffer,
                bind_group,
                analytics: BufferAnalytics {
                    allocated_memory: size,
                    used_memory: size,
                    times_written: 1,
                },
            },
        );
        trace!("Created GPU mesh {:?} '{}' ({} bytes)", handle, label, size);
        Ok(handle)
    }

    fn update_mesh(&mut self, handle: MeshHandle, mesh: &MeshData) -> Result<()> {
        let Some(buffers) = self.meshes.get(&handle) else {
            bail!("update of unknown mesh {:?}", handle);
        };
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&mesh.vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&mesh.indices);
        let fits = vertex_bytes.len() as u64 <= buffers.vertex.size()
            && index_bytes.len() as u64 <= buffers.index.size();

        let replacement = if fits {
            None
        } else {
            Some(self.create_buffers(&format!("{:?}", handle), mesh)?)
        };

        let Some(buffers) = self.meshes.get_mut(&handle) else {
            bail!("update of unknown mesh {:?}", handle);
        };
        match replacement {
            Some((vertex, index)) => {
                buffers.vertex.destroy();
                buffers.index.destroy();
                buffers.vertex = vertex;
                buffers.index = index;
                buffers.analytics.allocated_memory = mesh.byte_size() as u64;
            }
            None => {
                self.queue.write_buffer(&buffers.vertex, 0, vertex_bytes);
                self.queue.write_buffer(&buffers.index, 0, index_bytes);
            }
        }
        buffers.index_count = mesh.index_count();
        buffers.analytics.used_memory = mesh.byte_size() as u64;
        buffers.analytics.times_written += 1;
        Ok(())
    }

    fn destroy_mesh(&mut self, handle: MeshHandle) {
        if let Some(buffers) = self.meshes.remove(&handle) {
            buffers.vertex.destroy();
            buffers.index.destroy();
        }
    }

    fn begin_pass(&mut self, kind: PassKind, eye: Point3<f32>, view_projection: Matrix4<f32>) -> Result<()> {
        if self.current_pass.is_some() {
            bail!("a pass is already being recorded");
        }
        let mut uniform = CameraUniform::new();
        uniform.update(eye, view_projection);
        self.queue
            .write_buffer(&self.pass_buffer, 0, bytemuck::cast_slice(&[uniform]));
        self.current_pass = Some(PendingPass {
            kind,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn draw(&mut self, handle: MeshHandle, phase: DrawPhase) -> Result<()> {
        if !self.meshes.contains_key(&handle) {
            bail!("draw of unknown mesh {:?}", handle);
        }
        match self.current_pass.as_mut() {
            Some(pass) => pass.draws.push((handle, phase)),
            None => bail!("draw outside of a pass"),
        }
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        let Some(pass) = self.current_pass.take() else {
            bail!("no pass is being recorded");
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("terrain pass encoder"),
            });
        {
            let depth_view = match pass.kind {
                PassKind::Camera => &self.depth_texture.view,
                PassKind::Shadow => &self.shadow_map.view,
            };
            let color_attachments = match pass.kind {
                PassKind::Camera => vec![Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.6,
                            g: 0.75,
                            b: 0.9,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                PassKind::Shadow => Vec::new(),
            };

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("terrain pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_bind_group(0, &self.pass_bind_group, &[]);

            let mut bound_phase = None;
            for (handle, phase) in &pass.draws {
                let Some(buffers) = self.meshes.get(handle) else {
                    continue;
                };
                if bound_phase != Some(*phase) {
                    let pipeline = match (pass.kind, phase) {
                        (PassKind::Shadow, _) => &self.shadow_pipeline,
                        (PassKind::Camera, DrawPhase::Opaque) => &self.opaque_pipeline,
                        (PassKind::Camera, DrawPhase::Alpha) => &self.alpha_pipeline,
                    };
                    render_pass.set_pipeline(pipeline);
                    bound_phase = Some(*phase);
                }
                render_pass.set_bind_group(1, &buffers.bind_group, &[]);
                render_pass.set_vertex_buffer(0, buffers.vertex.slice(..));
                render_pass.set_index_buffer(buffers.index.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..buffers.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        trace!("Submitted {:?} pass with {} draws", pass.kind, pass.draws.len());
        Ok(())
    }

    fn allocated_memory(&self) -> u64 {
        self.get_total_allocated_memory()
    }
}
