//! wgpu implementation of [`FrameBackend`].

use framebridge_core::config::{PowerPreference, RenderConfig};
use framebridge_core::renderer::{FrameBackend, QuadGeometry, SurfaceSize, TextureUpload};

use crate::error::BackendError;
use crate::pipeline::GpuPipeline;
use crate::program::LinkedProgram;

/// Presents the frame texture on a window surface.
pub struct WgpuFrameBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pipeline: GpuPipeline,
    clear_color: wgpu::Color,
}

impl WgpuFrameBackend {
    /// Opens a device that can present to `window` and builds the quad
    /// pipeline. The surface is configured on the first
    /// [`resize`](FrameBackend::resize).
    ///
    /// # Errors
    ///
    /// Surface, adapter, device or pipeline failures. All are fatal.
    pub fn new<W>(window: W, size: SurfaceSize, render: &RenderConfig) -> Result<Self, BackendError>
    where
        W: wgpu::WindowHandle + 'static,
    {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_preference(render.power_preference),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or(BackendError::AdapterNotFound)?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "GPU adapter selected");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("FrameBridge Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))?;

        let capabilities = surface.get_capabilities(&adapter);
        // Pixels are passed through untouched, so prefer a linear target.
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or(BackendError::UnsupportedSurface)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: if render.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let mut pipeline = GpuPipeline::link(&device, LinkedProgram::quad()?, format)?;
        pipeline.create_buffers(&device);

        let [r, g, b, a] = render.clear_color;
        Ok(Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            clear_color: wgpu::Color { r, g, b, a },
        })
    }

    /// The quad pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> &GpuPipeline {
        &self.pipeline
    }

    /// Presentation format.
    #[must_use]
    pub const fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}

impl FrameBackend for WgpuFrameBackend {
    type Error = BackendError;

    fn resize(&mut self, size: SurfaceSize, geometry: &QuadGeometry) -> Result<(), Self::Error> {
        // Texture and surface share the device's 2D limit; a rejected size
        // leaves the surface configured at its previous size.
        self.pipeline.resize(&self.device, &self.queue, size, geometry)?;

        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        Ok(())
    }

    fn upload(&mut self, upload: &TextureUpload<'_>) -> Result<(), Self::Error> {
        self.pipeline.write_texture(&self.queue, upload)?;
        Ok(())
    }

    fn draw(&mut self, size: SurfaceSize) -> Result<(), Self::Error> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::debug!("surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("surface timeout, frame dropped");
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(BackendError::OutOfMemory),
        };

        self.pipeline.write_resolution(&self.queue, size)?;

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Quad Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            self.pipeline.record(&mut pass)?;
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}

const fn power_preference(preference: PowerPreference) -> wgpu::PowerPreference {
    match preference {
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    }
}
