//! # GPU Pipeline
//!
//! Device-side half of the quad program. Creation is staged and every
//! resource getter fails with [`PipelineError::NotCreated`] until its
//! creation step has run:
//!
//! ```text
//! link() ─► create_buffer(Vertex | Index | Uniform)
//!        ─► create_texture(size)      (drops the bind group)
//!        ─► create_bind_group()       (needs Uniform + texture)
//!        ─► set_geometry() / upload_geometry()
//! ```
//!
//! [`GpuPipeline::resize`] runs the last three steps as one unit after
//! checking the size against the device limits.
//!
//! The bind group plays the role of a vertex-array/binding-state object: it
//! captures the resolution buffer, the texture view and the sampler, and is
//! rebuilt whenever the texture is reallocated so it can never reference
//! storage of a stale size.

use std::fmt;

use framebridge_core::renderer::{QuadGeometry, QuadVertex, SurfaceSize, TextureUpload, QUAD_INDICES};
use wgpu::util::DeviceExt;

use crate::error::PipelineError;
use crate::program::{Attribute, LinkedProgram, Uniform};

/// Texture format of the frame texture.
pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Size of the resolution uniform buffer (vec2 padded to 16 bytes).
pub const RESOLUTION_BUFFER_SIZE: u64 = 16;

/// Named GPU buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// Quad vertices.
    Vertex,
    /// Quad indices.
    Index,
    /// Resolution uniform.
    Uniform,
}

impl BufferSlot {
    /// All slots.
    pub const ALL: [Self; 3] = [Self::Vertex, Self::Index, Self::Uniform];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Pipeline resources that have a creation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// A buffer.
    Buffer(BufferSlot),
    /// The frame texture.
    Texture,
    /// The bind group.
    BindGroup,
    /// The stored quad geometry.
    Geometry,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(slot) => write!(f, "{slot:?} buffer"),
            Self::Texture => f.write_str("frame texture"),
            Self::BindGroup => f.write_str("bind group"),
            Self::Geometry => f.write_str("quad geometry"),
        }
    }
}

/// The frame texture and its default view.
#[derive(Debug)]
pub struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: SurfaceSize,
}

impl FrameTexture {
    /// Texture handle.
    #[must_use]
    pub const fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Default view.
    #[must_use]
    pub const fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Storage size.
    #[must_use]
    pub const fn size(&self) -> SurfaceSize {
        self.size
    }
}

/// Render pipeline plus the resources one draw needs.
#[derive(Debug)]
pub struct GpuPipeline {
    program: LinkedProgram,
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    buffers: [Option<wgpu::Buffer>; 3],
    texture: Option<FrameTexture>,
    bind_group: Option<wgpu::BindGroup>,
    geometry: Option<QuadGeometry>,
}

fn check_texture_size(device: &wgpu::Device, size: SurfaceSize) -> Result<(), PipelineError> {
    let max = device.limits().max_texture_dimension_2d;
    if size.is_empty() || size.width > max || size.height > max {
        tracing::warn!(width = size.width, height = size.height, max, "texture size rejected");
        return Err(PipelineError::TextureSize {
            requested: (size.width, size.height),
            max,
        });
    }
    Ok(())
}

const VERTEX_STRIDE: u64 = std::mem::size_of::<QuadVertex>() as u64;
#[allow(clippy::cast_possible_truncation)]
const QUAD_INDEX_COUNT: u32 = QUAD_INDICES.len() as u32;

impl GpuPipeline {
    /// Creates the render pipeline for `program` targeting `format`.
    ///
    /// Device validation errors are captured and reported as
    /// [`PipelineError::Link`].
    ///
    /// # Errors
    ///
    /// [`PipelineError::Link`].
    pub fn link(
        device: &wgpu::Device,
        program: LinkedProgram,
        format: wgpu::TextureFormat,
    ) -> Result<Self, PipelineError> {
        for uniform in Uniform::ALL {
            let binding = program.uniform(uniform);
            if binding.group != 0 {
                return Err(PipelineError::Link {
                    diagnostic: format!("uniform `{}` must be in @group(0), found {}", uniform.name(), binding.group),
                });
            }
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(program.vertex().source().into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Quad Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(program.fragment().source().into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Quad Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: program.uniform(Uniform::Resolution).binding,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: program.uniform(Uniform::Texture).binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: program.uniform(Uniform::Sampler).binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Quad Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let attributes = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: program.attribute(Attribute::Position),
                format: wgpu::VertexFormat::Float32x2,
            },
            wgpu::VertexAttribute {
                offset: 8,
                shader_location: program.attribute(Attribute::TexCoord),
                format: wgpu::VertexFormat::Float32x2,
            },
        ];

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Quad Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: program.vertex().entry_point(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: VERTEX_STRIDE,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &attributes,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: program.fragment().entry_point(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            let diagnostic = err.to_string();
            tracing::error!("render pipeline rejected by device:\n{diagnostic}");
            return Err(PipelineError::Link { diagnostic });
        }

        tracing::info!(?format, "quad pipeline created");
        Ok(Self {
            program,
            render_pipeline,
            bind_group_layout,
            sampler,
            buffers: [None, None, None],
            texture: None,
            bind_group: None,
            geometry: None,
        })
    }

    /// Creates (or recreates) the buffer in `slot`.
    ///
    /// The index buffer is filled with [`QUAD_INDICES`]; the others are
    /// zeroed until written.
    pub fn create_buffer(&mut self, device: &wgpu::Device, slot: BufferSlot) {
        let buffer = match slot {
            BufferSlot::Vertex => device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Quad Vertex Buffer"),
                size: VERTEX_STRIDE * 4,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            BufferSlot::Index => device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Index Buffer"),
                contents: bytemuck::cast_slice(&QUAD_INDICES),
                usage: wgpu::BufferUsages::INDEX,
            }),
            BufferSlot::Uniform => device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Resolution Uniform Buffer"),
                size: RESOLUTION_BUFFER_SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        };
        if slot == BufferSlot::Uniform {
            // The old bind group references the old buffer.
            self.bind_group = None;
        }
        self.buffers[slot.index()] = Some(buffer);
    }

    /// Creates every buffer slot.
    pub fn create_buffers(&mut self, device: &wgpu::Device) {
        for slot in BufferSlot::ALL {
            self.create_buffer(device, slot);
        }
    }

    /// Allocates texture storage of `size`, replacing any previous texture
    /// and invalidating the bind group.
    ///
    /// # Errors
    ///
    /// [`PipelineError::TextureSize`] if `size` is empty or exceeds the
    /// device's 2D texture limit. The previous texture is kept.
    pub fn create_texture(&mut self, device: &wgpu::Device, size: SurfaceSize) -> Result<(), PipelineError> {
        check_texture_size(device, size)?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.texture = Some(FrameTexture { texture, view, size });
        self.bind_group = None;
        tracing::debug!(width = size.width, height = size.height, "frame texture allocated");
        Ok(())
    }

    /// Rebuilds everything that depends on the surface size: stores and
    /// uploads `geometry`, reallocates the texture and rebinds it.
    ///
    /// The size is checked before anything changes, so a rejected resize
    /// leaves the previous geometry, texture and bind group usable.
    ///
    /// # Errors
    ///
    /// [`PipelineError::TextureSize`] for an unusable size, or
    /// [`PipelineError::NotCreated`] if the buffers are missing.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        size: SurfaceSize,
        geometry: &QuadGeometry,
    ) -> Result<(), PipelineError> {
        check_texture_size(device, size)?;
        self.buffer(BufferSlot::Vertex)?;
        self.buffer(BufferSlot::Uniform)?;

        self.set_geometry(*geometry);
        self.upload_geometry(queue)?;
        self.create_texture(device, size)?;
        self.create_bind_group(device)
    }

    /// Binds the resolution buffer, texture and sampler.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] if the uniform buffer or texture is
    /// missing.
    pub fn create_bind_group(&mut self, device: &wgpu::Device) -> Result<(), PipelineError> {
        let uniform = self.buffer(BufferSlot::Uniform)?;
        let texture = self.texture()?;
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Quad Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: self.program.uniform(Uniform::Resolution).binding,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: self.program.uniform(Uniform::Texture).binding,
                    resource: wgpu::BindingResource::TextureView(texture.view()),
                },
                wgpu::BindGroupEntry {
                    binding: self.program.uniform(Uniform::Sampler).binding,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        self.bind_group = Some(bind_group);
        Ok(())
    }

    /// Buffer in `slot`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] before [`create_buffer`](Self::create_buffer).
    pub fn buffer(&self, slot: BufferSlot) -> Result<&wgpu::Buffer, PipelineError> {
        self.buffers[slot.index()]
            .as_ref()
            .ok_or(PipelineError::NotCreated(Resource::Buffer(slot)))
    }

    /// The frame texture.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] before [`create_texture`](Self::create_texture).
    pub fn texture(&self) -> Result<&FrameTexture, PipelineError> {
        self.texture.as_ref().ok_or(PipelineError::NotCreated(Resource::Texture))
    }

    /// The bind group.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] before
    /// [`create_bind_group`](Self::create_bind_group), or after the texture
    /// or uniform buffer was replaced.
    pub fn bind_group(&self) -> Result<&wgpu::BindGroup, PipelineError> {
        self.bind_group.as_ref().ok_or(PipelineError::NotCreated(Resource::BindGroup))
    }

    /// Stores the quad for (re)upload.
    pub fn set_geometry(&mut self, geometry: QuadGeometry) {
        self.geometry = Some(geometry);
    }

    /// The stored quad.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] before [`set_geometry`](Self::set_geometry).
    pub fn geometry(&self) -> Result<&QuadGeometry, PipelineError> {
        self.geometry.as_ref().ok_or(PipelineError::NotCreated(Resource::Geometry))
    }

    /// Writes the stored quad into the vertex buffer.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] for a missing buffer or geometry.
    pub fn upload_geometry(&self, queue: &wgpu::Queue) -> Result<(), PipelineError> {
        let buffer = self.buffer(BufferSlot::Vertex)?;
        queue.write_buffer(buffer, 0, self.geometry()?.as_bytes());
        Ok(())
    }

    /// Writes the resolution uniform.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] for a missing uniform buffer.
    pub fn write_resolution(&self, queue: &wgpu::Queue, size: SurfaceSize) -> Result<(), PipelineError> {
        let [w, h] = size.as_vec2();
        let data: [f32; 4] = [w, h, 0.0, 0.0];
        queue.write_buffer(self.buffer(BufferSlot::Uniform)?, 0, bytemuck::cast_slice(&data));
        Ok(())
    }

    /// Copies pixel rows into the texture.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] without a texture, and
    /// [`PipelineError::UploadMismatch`] if the rows do not match its size.
    pub fn write_texture(&self, queue: &wgpu::Queue, upload: &TextureUpload<'_>) -> Result<(), PipelineError> {
        let texture = self.texture()?;
        if (upload.width, upload.height) != (texture.size.width, texture.size.height) {
            return Err(PipelineError::UploadMismatch {
                upload: (upload.width, upload.height),
                texture: (texture.size.width, texture.size.height),
            });
        }
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            upload.bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(upload.stride),
                rows_per_image: Some(upload.height),
            },
            wgpu::Extent3d {
                width: upload.width,
                height: upload.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Records the quad draw into `pass`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NotCreated`] for any missing resource.
    pub fn record<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) -> Result<(), PipelineError> {
        let bind_group = self.bind_group()?;
        let vertices = self.buffer(BufferSlot::Vertex)?;
        let indices = self.buffer(BufferSlot::Index)?;

        pass.set_pipeline(&self.render_pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..QUAD_INDEX_COUNT, 0, 0..1);
        Ok(())
    }

    /// The linked program.
    #[must_use]
    pub const fn program(&self) -> &LinkedProgram {
        &self.program
    }
}
