use pb_core::FilterMode;

use crate::camera::Camera2D;
use crate::context::{RenderContext, SpriteBatch, Viewport};
use crate::instance::SpriteInstance;
use crate::sprite_pipeline::{BatchUniform, SpritePipeline};

pub const SURFACE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, thiserror::Error)]
pub enum GpuInitError {
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
}

/// Atlas surface on the GPU, with one bind group per sampler filter.
pub struct WgpuSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    linear_group: wgpu::BindGroup,
    nearest_group: wgpu::BindGroup,
}

pub struct WgpuBuffer {
    pub buffer: wgpu::Buffer,
    pub capacity: usize,
}

/// Where a sprite list draws: a colour attachment plus the camera to view it with.
/// Draws load the existing contents; clearing is the caller's job.
pub struct WgpuTarget {
    pub view: wgpu::TextureView,
    pub camera: Camera2D,
}

pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    pipeline: SpritePipeline,
}

impl WgpuContext {
    /// Open an adapter without a window. Draw targets use `SURFACE_FORMAT`.
    pub fn headless() -> Result<Self, GpuInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuInitError::NoAdapter)?;

        log::info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pb device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))?;

        Ok(Self::from_device(device, queue, SURFACE_FORMAT))
    }

    /// Wrap a device the application already owns, drawing into `target_format`.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue, target_format: wgpu::TextureFormat) -> Self {
        let pipeline = SpritePipeline::new(&device, target_format);
        Self {
            device,
            queue,
            target_format,
            pipeline,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Offscreen colour texture usable as a `WgpuTarget`.
    pub fn create_target_texture(&self, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("pb offscreen target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }
}

impl RenderContext for WgpuContext {
    type Surface = WgpuSurface;
    type Buffer = WgpuBuffer;
    type Target = WgpuTarget;

    fn create_surface(&self, width: u32, height: u32, label: &str) -> WgpuSurface {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SURFACE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let linear_group =
            self.pipeline
                .texture_bind_group(&self.device, &view, &self.pipeline.linear_sampler, label);
        let nearest_group =
            self.pipeline
                .texture_bind_group(&self.device, &view, &self.pipeline.nearest_sampler, label);
        WgpuSurface {
            texture,
            view,
            linear_group,
            nearest_group,
        }
    }

    fn write_surface(&self, surface: &WgpuSurface, rgba: &[u8], viewport: Viewport) {
        if viewport.width == 0 || viewport.height == 0 {
            return;
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &surface.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: viewport.x,
                    y: viewport.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * viewport.width),
                rows_per_image: Some(viewport.height),
            },
            wgpu::Extent3d {
                width: viewport.width,
                height: viewport.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn create_instance_buffer(&self, capacity: usize, label: &str) -> WgpuBuffer {
        let capacity = capacity.max(1);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity * SpriteInstance::SIZE) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        WgpuBuffer { buffer, capacity }
    }

    fn write_instances(&self, buffer: &WgpuBuffer, first: usize, instances: &[SpriteInstance]) {
        if instances.is_empty() || first + instances.len() > buffer.capacity {
            return;
        }
        let offset = (first * SpriteInstance::SIZE) as wgpu::BufferAddress;
        self.queue
            .write_buffer(&buffer.buffer, offset, bytemuck::cast_slice(instances));
    }

    fn draw_instanced(&self, target: &mut WgpuTarget, batch: SpriteBatch<'_, Self>) {
        if batch.count == 0 {
            return;
        }
        let uniform = BatchUniform {
            view_proj: target.camera.view_proj(),
            tint: batch.tint,
        };
        self.queue
            .write_buffer(&self.pipeline.batch_buffer, 0, bytemuck::cast_slice(&[uniform]));

        let texture_group = match batch.filter {
            FilterMode::Linear => &batch.surface.linear_group,
            FilterMode::Nearest => &batch.surface.nearest_group,
        };

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("pb sprite encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pb sprite pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline.pipeline);
            pass.set_bind_group(0, &self.pipeline.batch_bind_group, &[]);
            pass.set_bind_group(1, texture_group, &[]);
            pass.set_vertex_buffer(0, batch.instances.buffer.slice(..));
            pass.draw(0..6, 0..batch.count);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
