use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use super::{BufferUsage, GeometryBinding, GraphicsDevice, PolygonMode, VertexLayout};
use crate::shader::{ProgramId, ShaderProgram, ShaderStage, UNIFORM_BINDING};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

/// wgpu-backed device rendering into a window surface.
pub struct WgpuDevice {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    supports_line_mode: bool,
    warned_line_mode: bool,
    programs: HashMap<ProgramId, GpuProgram>,
    current_program: Option<ProgramId>,
    polygon_mode: PolygonMode,
    frame: Option<Frame>,
}

impl WgpuDevice {
    /// Initializes the device for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
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

        let supports_line_mode = adapter
            .features()
            .contains(wgpu::Features::POLYGON_MODE_LINE);
        let required_features = if supports_line_mode {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            wgpu::Features::empty()
        };

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("sphere-device"),
            required_features,
            required_limits: wgpu::Limits::default(),
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
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .context("surface reports no supported formats")?;

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
        info!(
            "GPU device ready ({:?}, line polygon mode: {supports_line_mode})",
            adapter.get_info().backend
        );

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            supports_line_mode,
            warned_line_mode: false,
            programs: HashMap::new(),
            current_program: None,
            polygon_mode: PolygonMode::Fill,
            frame: None,
        })
    }

    /// Returns the identifier of the window owned by the device.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn aspect(&self) -> f32 {
        if self.size.height == 0 {
            1.0
        } else {
            self.size.width as f32 / self.size.height as f32
        }
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

    /// Acquires the next surface texture; draws are recorded until [`end_frame`].
    ///
    /// [`end_frame`]: Self::end_frame
    pub fn begin_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        self.frame = Some(Frame {
            output,
            view,
            encoder,
            cleared: false,
        });
        Ok(())
    }

    /// Submits the recorded draws and presents the frame.
    pub fn end_frame(&mut self) {
        let Some(mut frame) = self.frame.take() else {
            return;
        };
        if !frame.cleared {
            // Nothing was drawn; still clear so the window does not show garbage.
            drop(begin_pass(&mut frame, &self.depth.view));
        }
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.output.present();
    }

    fn effective_polygon_mode(&mut self) -> PolygonMode {
        if self.polygon_mode == PolygonMode::Line && !self.supports_line_mode {
            if !self.warned_line_mode {
                warn!("adapter lacks POLYGON_MODE_LINE; wireframe falls back to filled triangles");
                self.warned_line_mode = true;
            }
            return PolygonMode::Fill;
        }
        self.polygon_mode
    }
}

impl GraphicsDevice for WgpuDevice {
    type Buffer = wgpu::Buffer;

    fn create_buffer(&mut self, label: &str, usage: BufferUsage, size: u64) -> wgpu::Buffer {
        let usage = match usage {
            BufferUsage::Vertex => wgpu::BufferUsages::VERTEX,
            BufferUsage::Index => wgpu::BufferUsages::INDEX,
        };
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write_buffer(&mut self, buffer: &wgpu::Buffer, offset: u64, data: &[u8]) {
        self.queue.write_buffer(buffer, offset, data);
    }

    fn bind_program(&mut self, program: &ShaderProgram) {
        if !program.is_linked() {
            error!("{}: shader is not properly linked", program.label());
            self.current_program = None;
            return;
        }
        if !self.programs.contains_key(&program.id()) {
            let Some(gpu) = GpuProgram::create(&self.device, program) else {
                self.current_program = None;
                return;
            };
            self.programs.insert(program.id(), gpu);
        }
        if let Some(uniforms) = self
            .programs
            .get(&program.id())
            .and_then(|gpu| gpu.uniforms.as_ref())
        {
            self.queue
                .write_buffer(&uniforms.buffer, 0, program.uniform_data());
        }
        self.current_program = Some(program.id());
    }

    fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.polygon_mode = mode;
    }

    fn draw_indexed(&mut self, geometry: GeometryBinding<'_, wgpu::Buffer>, index_count: u32) {
        let Some(program_id) = self.current_program else {
            warn!("draw issued without a usable program; skipping");
            return;
        };
        if self.frame.is_none() {
            warn!("draw issued outside of a frame; skipping");
            return;
        }
        let key = PipelineKey {
            polygon_mode: self.effective_polygon_mode(),
            locations: geometry.layout.locations(),
        };
        let surface_format = self.config.format;
        let Some(gpu) = self.programs.get_mut(&program_id) else {
            return;
        };
        gpu.ensure_pipeline(&self.device, surface_format, &key, geometry.layout);

        let (Some(frame), Some(pipeline)) = (self.frame.as_mut(), gpu.pipelines.get(&key)) else {
            return;
        };
        {
            let mut pass = begin_pass(frame, &self.depth.view);
            pass.set_pipeline(pipeline);
            if let Some(uniforms) = &gpu.uniforms {
                pass.set_bind_group(0, &uniforms.bind_group, &[]);
            }
            for (slot, attribute) in geometry.layout.attributes().iter().enumerate() {
                pass.set_vertex_buffer(slot as u32, geometry.vertices.slice(attribute.offset..));
            }
            pass.set_index_buffer(geometry.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..index_count, 0, 0..1);
        }
    }
}

struct Frame {
    output: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    cleared: bool,
}

/// Opens a pass over the frame, clearing color and depth on the first pass.
fn begin_pass<'f>(frame: &'f mut Frame, depth: &'f wgpu::TextureView) -> wgpu::RenderPass<'f> {
    let (load, depth_load) = if frame.cleared {
        (wgpu::LoadOp::Load, wgpu::LoadOp::Load)
    } else {
        (wgpu::LoadOp::Clear(CLEAR_COLOR), wgpu::LoadOp::Clear(1.0))
    };
    frame.cleared = true;
    frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("sphere-pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &frame.view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: depth,
            depth_ops: Some(wgpu::Operations {
                load: depth_load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    polygon_mode: PolygonMode,
    locations: Vec<u32>,
}

struct GpuUniforms {
    buffer: wgpu::Buffer,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

/// GPU objects backing one linked [`ShaderProgram`].
struct GpuProgram {
    label: String,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    uniforms: Option<GpuUniforms>,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl GpuProgram {
    fn create(device: &wgpu::Device, program: &ShaderProgram) -> Option<Self> {
        let (Some(vertex_stage), Some(fragment_stage)) = (
            program.stage(ShaderStage::Vertex),
            program.stage(ShaderStage::Fragment),
        ) else {
            error!("{}: linked program lacks a render stage", program.label());
            return None;
        };

        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(vertex_stage.name()),
            source: wgpu::ShaderSource::Wgsl(vertex_stage.source().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(fragment_stage.name()),
            source: wgpu::ShaderSource::Wgsl(fragment_stage.source().into()),
        });

        let block_size = program.uniform_block().size as u64;
        let uniforms = (block_size > 0).then(|| {
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("material-bind-layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_BINDING,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("material-uniform"),
                size: block_size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("material-bind-group"),
                layout: &layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: UNIFORM_BINDING,
                    resource: buffer.as_entire_binding(),
                }],
            });
            GpuUniforms {
                buffer,
                layout,
                bind_group,
            }
        });

        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> =
            uniforms.iter().map(|uniforms| &uniforms.layout).collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("material-pipeline-layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        Some(Self {
            label: program.label().to_string(),
            vertex,
            vertex_entry: vertex_stage.entry_point().to_string(),
            fragment,
            fragment_entry: fragment_stage.entry_point().to_string(),
            uniforms,
            pipeline_layout,
            pipelines: HashMap::new(),
        })
    }

    fn ensure_pipeline(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        key: &PipelineKey,
        layout: &VertexLayout,
    ) {
        if self.pipelines.contains_key(key) {
            return;
        }

        // Each attribute block lives in its own slice of the vertex buffer.
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = layout
            .attributes()
            .iter()
            .map(|binding| {
                [wgpu::VertexAttribute {
                    format: wgpu::VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: binding.location,
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = attributes
            .iter()
            .map(|attributes| wgpu::VertexBufferLayout {
                array_stride: VertexLayout::STRIDE,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        let polygon_mode = match key.polygon_mode {
            PolygonMode::Fill => wgpu::PolygonMode::Fill,
            PolygonMode::Line => wgpu::PolygonMode::Line,
        };

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{}-pipeline", self.label)),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex,
                entry_point: Some(self.vertex_entry.as_str()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment,
                entry_point: Some(self.fragment_entry.as_str()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });
        self.pipelines.insert(key.clone(), pipeline);
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
