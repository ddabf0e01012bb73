// SPDX-License-Identifier: GPL-3.0-only

//! GPU state for shader-based filters
//!
//! The environment creates its device on first use and owns every GPU
//! object a pipeline run touches: the quad mesh, compiled programs, a
//! sampler, the filter uniform buffer and a table of textures addressed by
//! [`TextureId`]. Objects are only valid on the thread that drives the
//! environment.

use super::mesh::RenderMesh;
use super::program::RenderProgram;
use crate::buffer::{EffectBuffer, PixelFormat, TextureId};
use crate::config::PowerPreference;
use crate::errors::{EffectError, EffectResult};
use crate::gpu::{self, GpuContext};
use crate::memory;
use crate::shaders::{FragmentShader, FilterUniform};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Texture format used to hold pixels of `format`
pub fn texture_format(format: PixelFormat) -> EffectResult<wgpu::TextureFormat> {
    match format {
        PixelFormat::Rgba8888 => Ok(wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::Rgba1010102 => Ok(wgpu::TextureFormat::Rgb10a2Unorm),
        other => Err(EffectError::UnsupportedPixelFormat(format!(
            "{other} has no texture representation"
        ))),
    }
}

#[derive(Debug)]
pub struct RenderTexture {
    pub texture: wgpu::Texture,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Device-side objects created together with the device
#[derive(Debug)]
struct SharedObjects {
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
}

#[derive(Debug)]
pub struct RenderEnvironment {
    power: PowerPreference,
    context: Option<GpuContext>,
    shared: Option<SharedObjects>,
    mesh: RenderMesh,
    programs: HashMap<(&'static str, wgpu::TextureFormat), RenderProgram>,
    textures: HashMap<TextureId, RenderTexture>,
    next_texture_id: u32,
}

impl Default for RenderEnvironment {
    fn default() -> Self {
        Self::new(PowerPreference::default())
    }
}

impl RenderEnvironment {
    pub fn new(power: PowerPreference) -> Self {
        Self {
            power,
            context: None,
            shared: None,
            mesh: RenderMesh::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_texture_id: 1,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Create the device on first call
    pub fn init(&mut self) -> EffectResult<()> {
        if self.context.is_some() {
            return Ok(());
        }
        let context = pollster::block_on(gpu::create_device("image_effect_device", self.power))?;
        let device = &context.device;
        let shared = gpu::checked(device, "render environment", || SharedObjects {
            sampler: device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("filter_sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Nearest,
                min_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            }),
            uniform_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("filter_uniform_buffer"),
                size: std::mem::size_of::<FilterUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        })?;
        info!(adapter = %context.info.adapter_name, "Render environment initialized");
        self.shared = Some(shared);
        self.context = Some(context);
        Ok(())
    }

    pub fn context(&self) -> EffectResult<&GpuContext> {
        self.context
            .as_ref()
            .ok_or_else(|| EffectError::Gpu("render environment not initialized".into()))
    }

    fn device_and_queue(&self) -> EffectResult<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
        let context = self.context()?;
        Ok((Arc::clone(&context.device), Arc::clone(&context.queue)))
    }

    fn texture(&self, id: TextureId) -> EffectResult<&RenderTexture> {
        self.textures
            .get(&id)
            .ok_or(EffectError::InvalidTexture(id.get()))
    }

    pub fn has_texture(&self, id: TextureId) -> bool {
        self.textures.contains_key(&id)
    }

    pub fn texture_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&id).map(|t| (t.width, t.height))
    }

    pub fn texture_pixel_format(&self, id: TextureId) -> Option<PixelFormat> {
        self.textures.get(&id).map(|t| t.format)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Allocate an empty texture usable as draw source and target
    pub fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> EffectResult<TextureId> {
        if width == 0 || height == 0 {
            return Err(EffectError::InvalidParameter(format!(
                "texture size {width}x{height}"
            )));
        }
        let wgpu_format = texture_format(format)?;
        self.init()?;
        let (device, _) = self.device_and_queue()?;

        let texture = gpu::checked(&device, "texture", || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("effect_texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu_format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::COPY_SRC
                    | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;

        let id = TextureId::new(self.next_texture_id)
            .ok_or_else(|| EffectError::Gpu("texture ids exhausted".into()))?;
        self.next_texture_id = self
            .next_texture_id
            .checked_add(1)
            .ok_or_else(|| EffectError::Gpu("texture ids exhausted".into()))?;
        self.textures.insert(
            id,
            RenderTexture {
                texture,
                width,
                height,
                format,
            },
        );
        debug!(id = id.get(), width, height, %format, "Created texture");
        Ok(id)
    }

    /// Copy a memory-backed buffer into a new texture
    pub fn upload(&mut self, buffer: &EffectBuffer) -> EffectResult<TextureId> {
        let desc = buffer.descriptor.clone();
        let pixels = buffer.data()?;
        let id = self.create_texture(desc.width, desc.height, desc.format)?;
        let (device, queue) = self.device_and_queue()?;
        let texture = &self.texture(id)?.texture;

        let result = memory::read_shared(pixels).and_then(|data| {
            gpu::checked(&device, "texture upload", || {
                queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    &data.bytes()[..desc.len],
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(desc.row_stride),
                        rows_per_image: Some(desc.height),
                    },
                    wgpu::Extent3d {
                        width: desc.width,
                        height: desc.height,
                        depth_or_array_layers: 1,
                    },
                );
            })
        });

        if let Err(e) = result {
            self.release_texture(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Run `shader` sampling `input` into `output`
    pub fn draw(
        &mut self,
        shader: FragmentShader,
        input: TextureId,
        output: TextureId,
        uniform: FilterUniform,
    ) -> EffectResult<()> {
        if input == output {
            return Err(EffectError::InvalidParameter(format!(
                "texture {} cannot be both draw source and target",
                input.get()
            )));
        }
        self.init()?;
        let (device, queue) = self.device_and_queue()?;
        let target_format = texture_format(self.texture(output)?.format)?;
        self.texture(input)?;

        let key = (shader.label, target_format);
        if !self.programs.contains_key(&key) {
            let program = RenderProgram::new(&device, shader, target_format)?;
            self.programs.insert(key, program);
        }
        self.mesh.bind(&device)?;

        let shared = self
            .shared
            .as_ref()
            .ok_or_else(|| EffectError::Gpu("render environment not initialized".into()))?;
        let program = self
            .programs
            .get(&key)
            .ok_or_else(|| EffectError::Gpu(format!("program {} missing", shader.label)))?;
        let input_view = self
            .texture(input)?
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let output_view = self
            .texture(output)?
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        queue.write_buffer(&shared.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        let mesh = &self.mesh;
        gpu::checked(&device, shader.label, || {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("filter_bind_group"),
                layout: &program.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&input_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&shared.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: shared.uniform_buffer.as_entire_binding(),
                    },
                ],
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filter_encoder"),
            });
            {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("filter_pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &output_view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    ..Default::default()
                });
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                mesh.draw(&mut pass);
            }
            queue.submit(std::iter::once(encoder.finish()));
        })?;

        debug!(
            shader = shader.label,
            input = input.get(),
            output = output.get(),
            "Drew filter pass"
        );
        Ok(())
    }

    /// Read texture pixels into `dst`, rows `row_stride` bytes apart
    pub fn read_pixels(&self, id: TextureId, dst: &mut [u8], row_stride: u32) -> EffectResult<()> {
        let (device, queue) = self.device_and_queue()?;
        let texture = self.texture(id)?;
        let row_bytes = texture.format.min_row_stride(texture.width);
        if row_stride < row_bytes || dst.len() < row_stride as usize * texture.height as usize {
            return Err(EffectError::AccessPixelsFailed(format!(
                "{} byte destination with stride {row_stride} for a {}x{} texture",
                dst.len(),
                texture.width,
                texture.height
            )));
        }
        let padded = gpu::padded_bytes_per_row(row_bytes);

        let staging = gpu::checked(&device, "readback", || {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_buffer"),
                size: padded as u64 * texture.height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded),
                        rows_per_image: Some(texture.height),
                    },
                },
                wgpu::Extent3d {
                    width: texture.width,
                    height: texture.height,
                    depth_or_array_layers: 1,
                },
            );
            queue.submit(std::iter::once(encoder.finish()));
            staging
        })?;

        let pixels = pollster::block_on(gpu::read_buffer_async(&device, &staging))?;
        staging.destroy();

        for (src_row, dst_row) in pixels
            .chunks(padded as usize)
            .zip(dst.chunks_mut(row_stride as usize))
            .take(texture.height as usize)
        {
            dst_row[..row_bytes as usize].copy_from_slice(&src_row[..row_bytes as usize]);
        }
        Ok(())
    }

    /// Copy `src` into `dst`; both must have the same size and format
    pub fn copy_texture(&self, src: TextureId, dst: TextureId) -> EffectResult<()> {
        let (device, queue) = self.device_and_queue()?;
        let (from, to) = (self.texture(src)?, self.texture(dst)?);
        if (from.width, from.height, from.format) != (to.width, to.height, to.format) {
            return Err(EffectError::InvalidParameter(format!(
                "copy texture {} into mismatched texture {}",
                src.get(),
                dst.get()
            )));
        }
        gpu::checked(&device, "texture copy", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_encoder"),
            });
            encoder.copy_texture_to_texture(
                from.texture.as_image_copy(),
                to.texture.as_image_copy(),
                wgpu::Extent3d {
                    width: from.width,
                    height: from.height,
                    depth_or_array_layers: 1,
                },
            );
            queue.submit(std::iter::once(encoder.finish()));
        })
    }

    pub fn release_texture(&mut self, id: TextureId) -> bool {
        match self.textures.remove(&id) {
            Some(texture) => {
                texture.texture.destroy();
                debug!(id = id.get(), "Released texture");
                true
            }
            None => false,
        }
    }

    /// Tear down every GPU object, newest first
    pub fn release(&mut self) {
        if self.context.is_none() {
            return;
        }
        let texture_count = self.textures.len();
        let mut ids: Vec<TextureId> = self.textures.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        for id in ids {
            self.release_texture(id);
        }
        self.programs.clear();
        self.mesh.release();
        if let Some(shared) = self.shared.take() {
            shared.uniform_buffer.destroy();
        }
        self.context = None;
        info!(textures = texture_count, "Render environment released");
    }
}

impl Drop for RenderEnvironment {
    fn drop(&mut self) {
        if !self.textures.is_empty() {
            debug!(count = self.textures.len(), "Dropping render environment with live textures");
        }
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferDescriptor, ColorSpace};

    fn environment() -> Option<RenderEnvironment> {
        let mut env = RenderEnvironment::new(PowerPreference::LowPower);
        match env.init() {
            Ok(()) => Some(env),
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                None
            }
        }
    }

    #[test]
    fn test_texture_formats() {
        assert_eq!(
            texture_format(PixelFormat::Rgba8888),
            Ok(wgpu::TextureFormat::Rgba8Unorm)
        );
        assert!(texture_format(PixelFormat::Nv12).is_err());
    }

    #[test]
    fn test_release_without_init_is_noop() {
        let mut env = RenderEnvironment::default();
        env.release();
        assert!(!env.is_initialized());
        assert_eq!(env.texture_count(), 0);
    }

    #[test]
    fn test_upload_and_read_back_padded_rows() {
        let Some(mut env) = environment() else {
            return;
        };
        let desc = BufferDescriptor::linear(3, 2, PixelFormat::Rgba8888, ColorSpace::Srgb);
        let bytes: Vec<u8> = (0..desc.len as u8).collect();
        let buffer = EffectBuffer::from_bytes(desc, bytes.clone()).unwrap();

        let id = env.upload(&buffer).unwrap();
        assert_eq!(id.get(), 1);
        assert_eq!(env.texture_size(id), Some((3, 2)));

        let mut out = vec![0u8; 16 * 2];
        env.read_pixels(id, &mut out, 16).unwrap();
        assert_eq!(&out[0..12], &bytes[0..12]);
        assert_eq!(&out[16..28], &bytes[12..24]);

        assert!(env.release_texture(id));
        assert!(!env.has_texture(id));
    }

    #[test]
    fn test_draw_rejects_same_texture() {
        let Some(mut env) = environment() else {
            return;
        };
        let id = env.create_texture(2, 2, PixelFormat::Rgba8888).unwrap();
        let result = env.draw(crate::shaders::BRIGHTNESS, id, id, FilterUniform::new(0.0));
        assert!(matches!(result, Err(EffectError::InvalidParameter(_))));
    }
}
