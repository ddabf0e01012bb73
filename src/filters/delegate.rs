// SPDX-License-Identifier: GPL-3.0-only

//! Third-party filters plugged into the registry through a callback table

use super::params::{self, ParamMap, ParamValue};
use super::{Category, EffectInfo, Filter, ProcessingPath};
use crate::buffer::{ColorSpace, EffectBuffer, PixelFormat, StorageKind, TextureId};
use crate::errors::{EffectError, EffectResult};
use crate::memory::{self, copy_pixels};
use crate::pipeline::EffectContext;
use crate::render::RenderEnvironment;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callbacks of an externally supplied filter
///
/// One delegate serves every filter instance created under its name, so
/// per-instance state lives in the parameter map handed to each call.
pub trait FilterDelegate: Send + Sync + fmt::Debug {
    /// Accept or refuse a parameter
    fn set_value(&self, key: &str, value: &ParamValue) -> bool;

    /// Transform `buffer` in place
    fn render(&self, buffer: &mut EffectBuffer, params: &ParamMap) -> bool;

    /// Persisted form of `params`; `None` uses the generic encoding
    fn save(&self, _params: &ParamMap) -> Option<serde_json::Value> {
        None
    }

    /// Validate parameters being restored
    fn restore(&self, _saved: &ParamMap) -> bool {
        true
    }

    /// Draw `input` into `output` for texture-input filters
    fn render_texture(
        &self,
        _input: TextureId,
        _output: TextureId,
        _env: &mut RenderEnvironment,
        _params: &ParamMap,
    ) -> bool {
        false
    }
}

/// What a delegate declares when it is registered
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateInfo {
    pub name: String,
    pub formats: Vec<PixelFormat>,
    /// Accepted input storage; empty accepts any
    pub storage_kinds: Vec<StorageKind>,
    pub texture_input: bool,
    pub category: Category,
    pub color_spaces: Vec<ColorSpace>,
}

impl DelegateInfo {
    pub fn new(name: impl Into<String>, formats: &[PixelFormat]) -> Self {
        Self {
            name: name.into(),
            formats: formats.to_vec(),
            storage_kinds: Vec::new(),
            texture_input: false,
            category: Category::Other,
            color_spaces: vec![ColorSpace::Srgb, ColorSpace::DisplayP3],
        }
    }

    pub fn with_storage_kinds(mut self, kinds: &[StorageKind]) -> Self {
        self.storage_kinds = kinds.to_vec();
        self
    }

    pub fn with_color_spaces(mut self, color_spaces: &[ColorSpace]) -> Self {
        self.color_spaces = color_spaces.to_vec();
        self
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    pub fn with_texture_input(mut self, texture_input: bool) -> Self {
        self.texture_input = texture_input;
        self
    }

    /// Texture-input delegates run on the GPU path only, all others on the
    /// CPU path
    pub fn effect_info(&self) -> EffectInfo {
        let path = if self.texture_input {
            ProcessingPath::Gpu
        } else {
            ProcessingPath::Cpu
        };
        EffectInfo {
            formats: self
                .formats
                .iter()
                .map(|format| (*format, vec![path]))
                .collect::<BTreeMap<_, _>>(),
            category: self.category,
            color_spaces: self.color_spaces.iter().copied().collect(),
        }
    }

    pub fn formats_label(&self) -> String {
        self.formats
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Filter instance routing every call to a registered delegate
#[derive(Debug)]
pub struct DelegateFilter {
    info: Arc<DelegateInfo>,
    effect_info: Arc<EffectInfo>,
    delegate: Arc<dyn FilterDelegate>,
    params: ParamMap,
}

impl DelegateFilter {
    pub fn new(
        info: Arc<DelegateInfo>,
        effect_info: Arc<EffectInfo>,
        delegate: Arc<dyn FilterDelegate>,
    ) -> Self {
        Self {
            info,
            effect_info,
            delegate,
            params: ParamMap::new(),
        }
    }

    fn failed(&self) -> EffectError {
        warn!(filter = %self.info.name, "Delegate callback failed");
        EffectError::DelegateFailed(self.info.name.clone())
    }

    fn render_textures(
        &self,
        input: TextureId,
        output: TextureId,
        ctx: &mut EffectContext,
    ) -> EffectResult<()> {
        if self
            .delegate
            .render_texture(input, output, &mut ctx.render_environment, &self.params)
        {
            Ok(())
        } else {
            Err(self.failed())
        }
    }
}

impl Filter for DelegateFilter {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn effect_info(&self) -> Arc<EffectInfo> {
        Arc::clone(&self.effect_info)
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    fn set_value(&mut self, key: &str, value: ParamValue) -> EffectResult<()> {
        if !self.delegate.set_value(key, &value) {
            warn!(filter = %self.info.name, key, "Delegate refused parameter");
            return Err(EffectError::UnsupportedValueKey {
                filter: self.info.name.clone(),
                key: key.to_string(),
            });
        }
        self.params.insert(key.to_string(), value);
        Ok(())
    }

    fn restore(&mut self, saved: &ParamMap) -> EffectResult<()> {
        if !self.delegate.restore(saved) {
            return Err(self.failed());
        }
        self.params
            .extend(saved.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn save(&self) -> serde_json::Value {
        self.delegate
            .save(&self.params)
            .unwrap_or_else(|| params::to_json(&self.info.name, &self.params))
    }

    fn is_texture_input(&self) -> bool {
        self.info.texture_input
    }

    fn render_to(
        &mut self,
        src: &EffectBuffer,
        dst: &mut EffectBuffer,
        ctx: &mut EffectContext,
    ) -> EffectResult<()> {
        let format = src.descriptor.format;
        if !self.effect_info.supports_format(format) {
            warn!(filter = %self.info.name, %format, "Pixel format not implemented");
            return Err(EffectError::UnsupportedFormatType {
                filter: self.info.name.clone(),
                format: format.to_string(),
            });
        }
        if !self.effect_info.supports(format, ctx.ip_type) {
            return Err(EffectError::UnsupportedProcessingPath {
                filter: self.info.name.clone(),
                path: ctx.ip_type.to_string(),
            });
        }

        if self.info.texture_input {
            let (Some(input), Some(output)) = (src.texture_id(), dst.texture_id()) else {
                return Err(EffectError::InputNull("texture id"));
            };
            return self.render_textures(input, output, ctx);
        }

        let kind = src.handle.storage_kind;
        if !self.info.storage_kinds.is_empty() && !self.info.storage_kinds.contains(&kind) {
            warn!(filter = %self.info.name, ?kind, "Storage kind not accepted");
            return Err(EffectError::UnsupportedBufferStorageKind(format!("{kind:?}")));
        }

        if !src.shares_memory(dst) {
            let src_guard = memory::read_shared(src.data()?)?;
            let mut dst_guard = memory::write_shared(dst.data()?)?;
            copy_pixels(
                src_guard.bytes(),
                &src.descriptor,
                dst_guard.bytes_mut(),
                &dst.descriptor,
            )?;
        }
        debug!(filter = %self.info.name, %format, "Rendering through delegate");
        if self.delegate.render(dst, &self.params) {
            Ok(())
        } else {
            Err(self.failed())
        }
    }

    fn render_bound(&mut self, ctx: &mut EffectContext) -> EffectResult<()> {
        if !self.info.texture_input {
            return Err(EffectError::UnsupportedProcessingPath {
                filter: self.info.name.clone(),
                path: ctx.ip_type.to_string(),
            });
        }
        let (input, output) = ctx.bound_textures.ok_or(EffectError::InputNull("bound textures"))?;
        self.render_textures(input, output, ctx)
    }
}
