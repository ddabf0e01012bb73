// SPDX-License-Identifier: GPL-3.0-only

//! State shared by every filter of one pipeline

use crate::buffer::{BufferDescriptor, EffectBuffer, PixelFormat, TextureId};
use crate::color::ColorSpaceManager;
use crate::config::EngineConfig;
use crate::errors::EffectResult;
use crate::filters::ProcessingPath;
use crate::memory::MemoryManager;
use crate::render::RenderEnvironment;
use tracing::debug;

#[derive(Debug)]
pub struct EffectContext {
    /// Processing path chosen for the current run
    pub ip_type: ProcessingPath,
    pub render_environment: RenderEnvironment,
    pub color_space_manager: ColorSpaceManager,
    pub memory_manager: MemoryManager,
    /// Input and output of texture-input filters
    pub bound_textures: Option<(TextureId, TextureId)>,
    scratch_textures: Vec<TextureId>,
}

impl EffectContext {
    pub fn new(ip_type: ProcessingPath) -> Self {
        Self::with_config(ip_type, &EngineConfig::default())
    }

    pub fn with_config(ip_type: ProcessingPath, config: &EngineConfig) -> Self {
        Self {
            ip_type,
            render_environment: RenderEnvironment::new(config.power_preference),
            color_space_manager: ColorSpaceManager::new(),
            memory_manager: MemoryManager::new(config.reuse_allocations),
            bound_textures: None,
            scratch_textures: Vec::new(),
        }
    }

    /// Texture released at the end of the run
    pub fn scratch_texture(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> EffectResult<TextureId> {
        let id = self.render_environment.create_texture(width, height, format)?;
        self.scratch_textures.push(id);
        Ok(id)
    }

    /// Upload a memory buffer into a scratch texture
    pub fn upload_scratch(&mut self, buffer: &EffectBuffer) -> EffectResult<EffectBuffer> {
        let id = self.render_environment.upload(buffer)?;
        self.scratch_textures.push(id);
        let desc = &buffer.descriptor;
        Ok(EffectBuffer::from_texture(
            id,
            BufferDescriptor::texture(desc.width, desc.height, desc.format, desc.color_space),
        ))
    }

    pub fn scratch_texture_count(&self) -> usize {
        self.scratch_textures.len()
    }

    pub fn release_scratch_textures(&mut self) {
        if self.scratch_textures.is_empty() {
            return;
        }
        debug!(count = self.scratch_textures.len(), "Releasing scratch textures");
        for id in self.scratch_textures.drain(..).rev() {
            self.render_environment.release_texture(id);
        }
    }

    /// Forget per-run state; GPU objects other than scratch textures stay
    pub fn end_run(&mut self) {
        self.release_scratch_textures();
        self.color_space_manager.reset();
        self.memory_manager.release_all();
        self.bound_textures = None;
    }
}
