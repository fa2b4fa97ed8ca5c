use std::sync::Arc;

use bytemuck::bytes_of;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use wgpu::util::DeviceExt;

use crate::camera::{Camera, CameraUniform};
use crate::error::{RenderError, Result};
use crate::mesh::Mesh;
use crate::raster::ColorTarget;
use crate::settings::RenderSettings;
use crate::shader::{FRAGMENT_ENTRY, POLYGON_WGSL, VERTEX_ENTRY};
use crate::vertex::PolygonVertex;

/// Device and queue shared by any number of renderers.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Acquires an adapter and device without a surface.
    ///
    /// `WGPU_BACKEND` narrows the backends that are tried.
    pub async fn new() -> Result<Self> {
        let backends = wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all());
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        let adapter_info = adapter.get_info();
        info!(
            "using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("polygon-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }
}

/// Offscreen wgpu host for the polygon shader.
///
/// Meshes are queued with [`prep_polygon`](Self::prep_polygon) and uploaded
/// together by [`finish_prep`](Self::finish_prep); [`render`](Self::render)
/// draws every uploaded mesh and reads the attachment back.
pub struct PolygonRenderer {
    context: Arc<GpuContext>,
    settings: RenderSettings,
    pipeline: wgpu::RenderPipeline,
    camera: RwLock<Camera>,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    target: OffscreenTarget,
    frame: Mutex<()>,
    meshes: Vec<MeshBuffers>,
    to_prep: Vec<Mesh>,
}

impl PolygonRenderer {
    pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(context: Arc<GpuContext>, settings: RenderSettings) -> Result<Self> {
        let device = &context.device;
        check_target_size(
            settings.width,
            settings.height,
            device.limits().max_texture_dimension_2d,
        )?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("polygon-shader"),
            source: wgpu::ShaderSource::Wgsl(POLYGON_WGSL.into()),
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(CameraUniform::SIZE),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("polygon-pipeline-layout"),
            bind_group_layouts: &[&camera_layout],
            push_constant_ranges: &[],
        });

        let camera = Camera::identity();
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("camera-uniform"),
            contents: bytes_of(&camera.to_uniform()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera-bind-group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("polygon-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[PolygonVertex::layout()],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: Self::TARGET_FORMAT,
                    blend: Some(settings.blend.to_wgpu()),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let target = OffscreenTarget::create(device, settings.width, settings.height);

        Ok(Self {
            context,
            settings,
            pipeline,
            camera: RwLock::new(camera),
            camera_buffer,
            camera_bind_group,
            target,
            frame: Mutex::new(()),
            meshes: Vec::new(),
            to_prep: Vec::new(),
        })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn camera(&self) -> Camera {
        *self.camera.read()
    }

    /// Replaces the camera used by the next draw.
    ///
    /// Draws snapshot the camera under the read lock, so an update never
    /// lands halfway through one.
    pub fn update_camera(&self, camera: Camera) -> Result<()> {
        camera.validate()?;
        *self.camera.write() = camera;
        Ok(())
    }

    #[inline]
    pub fn prep_polygon(&mut self, mesh: Mesh) {
        self.to_prep.push(mesh);
    }

    /// Validates and uploads every queued mesh, replacing the previous set.
    ///
    /// On a validation error nothing is uploaded and the queue is kept.
    pub fn finish_prep(&mut self) -> Result<()> {
        for mesh in &self.to_prep {
            mesh.validate()?;
        }

        self.meshes = self
            .to_prep
            .iter()
            .enumerate()
            .filter(|(_, mesh)| mesh.triangle_count() > 0)
            .map(|(index, mesh)| MeshBuffers::from_mesh(&self.context.device, mesh, index))
            .collect();
        debug!(
            "uploaded {} of {} queued polygon meshes",
            self.meshes.len(),
            self.to_prep.len()
        );
        self.to_prep.clear();
        Ok(())
    }

    /// Clears the target, draws the uploaded meshes and reads the pixels back.
    ///
    /// Concurrent calls are serialized; they share one readback buffer.
    pub fn render(&self) -> Result<ColorTarget> {
        let _frame = self.frame.lock();
        let camera = *self.camera.read();
        self.context
            .queue
            .write_buffer(&self.camera_buffer, 0, bytes_of(&camera.to_uniform()));

        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("polygon-encoder"),
        });

        let clear = self.settings.clear_color.as_dvec4();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("polygon-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: clear.x,
                            g: clear.y,
                            b: clear.z,
                            a: clear.w,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.camera_bind_group, &[]);
            for mesh in &self.meshes {
                pass.set_vertex_buffer(0, mesh.vertex.slice(..));
                match &mesh.index {
                    Some((index, count)) => {
                        pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint16);
                        pass.draw_indexed(0..*count, 0, 0..1);
                    }
                    None => pass.draw(0..mesh.vertex_count, 0..1),
                }
            }
        }

        self.target.copy_to_readback(&mut encoder);
        self.context.queue.submit(std::iter::once(encoder.finish()));
        self.target.read(device)
    }
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    vertex_count: u32,
    index: Option<(wgpu::Buffer, u32)>,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &Mesh, slot: usize) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("polygon-{slot}-vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = mesh.indices.as_ref().map(|indices| {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("polygon-{slot}-indices")),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            (buffer, indices.len() as u32)
        });
        Self {
            vertex,
            vertex_count: mesh.vertices.len() as u32,
            index,
        }
    }
}

/// Color attachment plus the buffer its pixels are copied into.
struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
}

impl OffscreenTarget {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("polygon-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PolygonRenderer::TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_row = padded_bytes_per_row(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("polygon-readback"),
            size: padded_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback,
            width,
            height,
            padded_row,
        }
    }

    fn copy_to_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Blocks until the copy lands, then strips the row padding.
    fn read(&self, device: &wgpu::Device) -> Result<ColorTarget> {
        let slice = self.readback.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|err| RenderError::BufferMap(err.to_string()))?
            .map_err(|err| RenderError::BufferMap(err.to_string()))?;

        let row = self.width as usize * 4;
        let mut pixels = Vec::with_capacity(row * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks(self.padded_row as usize) {
                pixels.extend_from_slice(&chunk[..row]);
            }
        }
        self.readback.unmap();

        ColorTarget::from_rgba8(self.width, self.height, &pixels)
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Rejects attachments the device cannot allocate.
fn check_target_size(width: u32, height: u32, max_dimension: u32) -> Result<()> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(RenderError::InvalidTargetSize { width, height });
    }
    Ok(())
}
