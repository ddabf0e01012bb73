// SPDX-License-Identifier: GPL-3.0-only

//! Filter chain execution
//!
//! A [`Pipeline`] runs an ordered chain of filters over one input:
//!
//! 1. Lock the external input (and output) pixel buffers
//! 2. Pick the processing path for the chain and the input format
//! 3. Negotiate one working color space and convert the input to it
//! 4. Run every filter, each reading the previous filter's result
//! 5. Read GPU results back and write the pixels into the output buffer
//!
//! Locks, scratch textures and engine allocations are released on every
//! exit path.

mod context;
mod handle;

pub use context::EffectContext;
pub use handle::FilterHandle;

use crate::buffer::{
    self, BufferDescriptor, ColorSpace, EffectBuffer, PixelBuffer, PixelFormat, StorageKind,
    TextureId,
};
use crate::codec::{self, ImageCodec, ImageCrateCodec};
use crate::color::ColorSpaceStrategy;
use crate::color::strategy::is_need_conversion;
use crate::config::{EngineConfig, PathPreference};
use crate::errors::{EffectError, EffectResult};
use crate::filters::{EffectInfo, Filter, ProcessingPath, registry};
use crate::memory::{self, SharedMemoryData};
use crate::render::RenderEnvironment;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A filter in the chain; shared filters stay owned by the caller
#[derive(Debug)]
enum FilterSlot {
    Owned(Box<dyn Filter>),
    Shared(Arc<Mutex<dyn Filter>>),
}

impl FilterSlot {
    fn with<R>(&mut self, f: impl FnOnce(&mut dyn Filter) -> R) -> EffectResult<R> {
        match self {
            FilterSlot::Owned(filter) => Ok(f(filter.as_mut())),
            FilterSlot::Shared(filter) => {
                let mut guard = filter.lock().map_err(|_| {
                    EffectError::InvalidParameter("shared filter lock poisoned".into())
                })?;
                Ok(f(&mut *guard))
            }
        }
    }
}

#[derive(Debug)]
pub struct Pipeline {
    // Dropped before the context so filters never outlive the GPU state
    filters: Vec<FilterSlot>,
    context: EffectContext,
    config: EngineConfig,
    codec: Arc<dyn ImageCodec>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Pipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            filters: Vec::new(),
            context: EffectContext::with_config(ProcessingPath::Cpu, &config),
            config,
            codec: Arc::new(ImageCrateCodec),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_processing_path(&mut self, preference: PathPreference) {
        self.config.processing_path = preference;
    }

    pub fn context(&self) -> &EffectContext {
        &self.context
    }

    pub fn render_environment_mut(&mut self) -> &mut RenderEnvironment {
        &mut self.context.render_environment
    }

    /// Append a filter the pipeline owns
    pub fn add_filter(&mut self, filter: Box<dyn Filter>) {
        debug!(filter = filter.name(), "Adding filter");
        self.filters.push(FilterSlot::Owned(filter));
    }

    /// Create a filter through the registry and append it
    pub fn add_filter_by_name(&mut self, name: &str) -> EffectResult<()> {
        let filter =
            registry::create(name).ok_or_else(|| EffectError::FilterNotFound(name.to_string()))?;
        self.add_filter(filter);
        Ok(())
    }

    /// Append a caller-owned filter; the pipeline only detaches it
    pub fn add_shared_filter(&mut self, filter: Arc<Mutex<dyn Filter>>) {
        self.filters.push(FilterSlot::Shared(filter));
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filter_names(&mut self) -> EffectResult<Vec<String>> {
        self.filters
            .iter_mut()
            .map(|slot| slot.with(|f| f.name().to_string()))
            .collect()
    }

    /// Run `f` against the filter at `index`
    pub fn with_filter<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut dyn Filter) -> R,
    ) -> EffectResult<R> {
        self.filters
            .get_mut(index)
            .ok_or_else(|| EffectError::InvalidParameter(format!("no filter at index {index}")))?
            .with(f)
    }

    fn effect_infos(&mut self) -> EffectResult<Vec<Arc<EffectInfo>>> {
        self.filters
            .iter_mut()
            .map(|slot| slot.with(|f| f.effect_info()))
            .collect()
    }

    fn all_texture_input(&mut self) -> EffectResult<bool> {
        let mut all = !self.filters.is_empty();
        for slot in &mut self.filters {
            all &= slot.with(|f| f.is_texture_input())?;
        }
        Ok(all)
    }

    /// Processing path for a run over `format`
    pub fn select_processing_path(&mut self, format: PixelFormat) -> EffectResult<ProcessingPath> {
        let path = match self.config.processing_path {
            PathPreference::Cpu => ProcessingPath::Cpu,
            PathPreference::Gpu => {
                self.context.render_environment.init()?;
                ProcessingPath::Gpu
            }
            PathPreference::Auto => {
                let infos = self.effect_infos()?;
                let gpu_capable = !infos.is_empty()
                    && infos
                        .iter()
                        .all(|info| info.supports(format, ProcessingPath::Gpu));
                if !gpu_capable {
                    ProcessingPath::Cpu
                } else if let Err(e) = self.context.render_environment.init() {
                    warn!(error = %e, "GPU unavailable, falling back to CPU");
                    ProcessingPath::Cpu
                } else {
                    ProcessingPath::Gpu
                }
            }
        };
        debug!(%format, %path, "Processing path selected");
        Ok(path)
    }

    fn color_space_sets(&mut self) -> EffectResult<Vec<HashSet<ColorSpace>>> {
        Ok(self
            .effect_infos()?
            .iter()
            .map(|info| info.color_spaces.clone())
            .collect())
    }

    /// Render `input` into `output`, or in place when `output` is `None`
    pub fn render(
        &mut self,
        input: &PixelBuffer,
        output: Option<&PixelBuffer>,
    ) -> EffectResult<()> {
        if self.filters.is_empty() {
            return Err(EffectError::InputNull("filter chain"));
        }
        if self.all_texture_input()? {
            let (input, output) = self
                .context
                .bound_textures
                .ok_or(EffectError::InputNull("bound textures"))?;
            return self.render_bound_chain(input, output);
        }

        let input_lock = buffer::lock(input)?;
        // A failed output lock drops the input lock on the way out
        let output_lock = match output {
            Some(out) if !out.ptr_eq(input) => Some(buffer::lock(out)?),
            _ => None,
        };

        let target = output_lock
            .as_ref()
            .map_or(input, |locked| locked.pixel_buffer());
        let result = self.render_locked(
            input_lock.buffer(),
            output_lock.as_ref().map(|locked| locked.buffer()),
            target,
        );
        self.context.end_run();

        drop(output_lock);
        drop(input_lock);
        if let Err(e) = &result {
            warn!(error = %e, code = e.code(), "Pipeline render failed");
        }
        result
    }

    fn render_locked(
        &mut self,
        src: &EffectBuffer,
        dst: Option<&EffectBuffer>,
        target: &PixelBuffer,
    ) -> EffectResult<()> {
        let path = self.select_processing_path(src.descriptor.format)?;
        self.context.ip_type = path;

        let sets = self.color_space_sets()?;
        let working_space = self.context.color_space_manager.negotiate(
            &sets,
            &src.descriptor,
            dst.map(|d| &d.descriptor),
        )?;

        // In place, a single filter on unconverted pixels writes the caller's
        // memory directly. Anything that can fail halfway runs on a copy.
        let staged = self.filters.len() > 1
            || is_need_conversion(src.descriptor.color_space, working_space);
        let mut working = match dst {
            Some(dst) => {
                let kind = match dst.handle.storage_kind {
                    StorageKind::Unspecified => StorageKind::Heap,
                    kind => kind,
                };
                let copy = self.context.memory_manager.duplicate(src.data()?, kind)?;
                EffectBuffer::from_memory(copy)?
            }
            None if staged => {
                let copy = self
                    .context
                    .memory_manager
                    .duplicate(src.data()?, StorageKind::Heap)?;
                EffectBuffer::from_memory(copy)?
            }
            None => src.clone(),
        };
        self.context
            .color_space_manager
            .apply_color_space(&mut working, working_space)?;

        let result = self.run_chain(working.clone())?;
        let pixels = self.collect_pixels(&working, &result)?;
        memory::write_shared(&pixels)?.info.descriptor.color_space = working.descriptor.color_space;

        self.context.memory_manager.write_back(&pixels, target)?;
        info!(
            width = working.descriptor.width,
            height = working.descriptor.height,
            format = %working.descriptor.format,
            %path,
            "Pipeline render finished"
        );
        Ok(())
    }

    /// Memory holding the chain's final pixels
    fn collect_pixels(
        &mut self,
        working: &EffectBuffer,
        result: &EffectBuffer,
    ) -> EffectResult<SharedMemoryData> {
        let data = working.data()?;
        match result.texture_id() {
            Some(id) => {
                let mut guard = memory::write_shared(data)?;
                self.context.render_environment.read_pixels(
                    id,
                    guard.bytes_mut(),
                    working.descriptor.row_stride,
                )?;
                Ok(Arc::clone(data))
            }
            None => Ok(Arc::clone(result.data()?)),
        }
    }

    fn run_chain(&mut self, mut current: EffectBuffer) -> EffectResult<EffectBuffer> {
        let ctx = &mut self.context;
        for slot in &mut self.filters {
            current = slot.with(|filter| {
                let input = if filter.is_texture_input() && current.texture_id().is_none() {
                    ctx.upload_scratch(&current)?
                } else {
                    current
                };
                debug!(filter = filter.name(), path = %ctx.ip_type, "Running filter");
                filter.render(input, ctx)
            })??;
        }
        Ok(current)
    }

    /// Texture-input chain: each filter reads the previous texture
    fn render_bound_chain(&mut self, input: TextureId, output: TextureId) -> EffectResult<()> {
        let (width, height) = self
            .context
            .render_environment
            .texture_size(input)
            .ok_or(EffectError::InvalidTexture(input.get()))?;
        let format = self
            .context
            .render_environment
            .texture_pixel_format(input)
            .ok_or(EffectError::InvalidTexture(input.get()))?;
        self.context.ip_type = ProcessingPath::Gpu;

        let count = self.filters.len();
        let ctx = &mut self.context;
        let mut current = input;
        let mut result = Ok(());
        for (index, slot) in self.filters.iter_mut().enumerate() {
            let target = if index + 1 == count {
                output
            } else {
                match ctx.scratch_texture(width, height, format) {
                    Ok(id) => id,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            };
            ctx.bound_textures = Some((current, target));
            if let Err(e) = slot.with(|filter| filter.render_bound(ctx)).and_then(|r| r) {
                result = Err(e);
                break;
            }
            current = target;
        }
        self.context.release_scratch_textures();
        self.context.bound_textures = Some((input, output));
        result
    }

    /// Render between two textures of the render environment
    pub fn render_textures(
        &mut self,
        input: u32,
        output: u32,
        color_space: ColorSpace,
    ) -> EffectResult<()> {
        let input = TextureId::new(input).ok_or(EffectError::InputNull("input texture id"))?;
        let output = TextureId::new(output).ok_or(EffectError::InputNull("output texture id"))?;
        if color_space == ColorSpace::Default || !ColorSpaceStrategy::is_supported(color_space) {
            return Err(EffectError::InvalidParameter(format!(
                "texture color space {color_space}"
            )));
        }
        if self.filters.is_empty() {
            return Err(EffectError::InputNull("filter chain"));
        }

        let env = &mut self.context.render_environment;
        env.init()?;
        for id in [input, output] {
            if !env.has_texture(id) {
                return Err(EffectError::InvalidTexture(id.get()));
            }
        }

        if self.all_texture_input()? {
            self.context.bound_textures = Some((input, output));
            let result = self.render_bound_chain(input, output);
            self.context.end_run();
            return result;
        }

        let result = self.render_texture_chain(input, output, color_space);
        self.context.end_run();
        result
    }

    fn render_texture_chain(
        &mut self,
        input: TextureId,
        output: TextureId,
        color_space: ColorSpace,
    ) -> EffectResult<()> {
        let env = &self.context.render_environment;
        let (width, height) = env
            .texture_size(input)
            .ok_or(EffectError::InvalidTexture(input.get()))?;
        let format = env
            .texture_pixel_format(input)
            .ok_or(EffectError::InvalidTexture(input.get()))?;
        self.context.ip_type = ProcessingPath::Gpu;

        let mut source = EffectBuffer::from_texture(
            input,
            BufferDescriptor::texture(width, height, format, color_space),
        );
        let sets = self.color_space_sets()?;
        let working_space =
            self.context
                .color_space_manager
                .negotiate(&sets, &source.descriptor, None)?;
        self.context
            .color_space_manager
            .apply_color_space(&mut source, working_space)?;

        let result = self.run_chain(source)?;
        match result.texture_id() {
            Some(id) if id == output => Ok(()),
            Some(id) => self.context.render_environment.copy_texture(id, output),
            None => Err(EffectError::InvalidTexture(output.get())),
        }
    }

    /// Decode `input`, run the chain and encode the result to `output`
    pub fn render_path(&mut self, input: &Path, output: &Path) -> EffectResult<()> {
        let mut source = EffectBuffer::from_path(input);
        let image_codec = Arc::clone(&self.codec);
        let pixels = codec::resolve_input(image_codec.as_ref(), &mut source)?
            .ok_or(EffectError::InputNull("decoded input"))?;
        self.render(&pixels, None)?;
        image_codec.encode(&pixels, output)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        debug!(filters = self.filters.len(), "Dropping pipeline");
        // Caller-owned filters are only detached
        self.filters.clear();
        self.context.render_environment.release();
    }
}
