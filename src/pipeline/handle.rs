// SPDX-License-Identifier: GPL-3.0-only

//! Standalone filter API: one filter with its own pipeline

use super::Pipeline;
use crate::buffer::{ColorSpace, PixelBuffer, TextureId};
use crate::config::{EngineConfig, PathPreference};
use crate::errors::{EffectError, EffectResult};
use crate::filters::{EffectInfo, Filter, ParamMap, ParamValue, registry};
use crate::render::RenderEnvironment;
use std::sync::Arc;

#[derive(Debug)]
pub struct FilterHandle {
    name: String,
    pipeline: Pipeline,
}

impl FilterHandle {
    /// Create the named filter; `None` when no such filter is registered
    pub fn create(name: &str) -> Option<Self> {
        Self::create_with_config(name, EngineConfig::default())
    }

    pub fn create_with_config(name: &str, config: EngineConfig) -> Option<Self> {
        registry::create(name).map(|filter| Self::from_filter(filter, config))
    }

    pub fn from_filter(filter: Box<dyn Filter>, config: EngineConfig) -> Self {
        let name = filter.name().to_string();
        let mut pipeline = Pipeline::new(config);
        pipeline.add_filter(filter);
        Self { name, pipeline }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn filter<R>(&mut self, f: impl FnOnce(&mut dyn Filter) -> R) -> EffectResult<R> {
        self.pipeline.with_filter(0, f)
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<ParamValue>) -> EffectResult<()> {
        let value = value.into();
        self.filter(|f| f.set_value(key, value))?
    }

    pub fn get_value(&mut self, key: &str) -> EffectResult<ParamValue> {
        self.filter(|f| f.get_value(key))?
    }

    pub fn remove_value(&mut self, key: &str) -> EffectResult<Option<ParamValue>> {
        self.filter(|f| f.remove_value(key))
    }

    pub fn values(&mut self) -> EffectResult<ParamMap> {
        self.filter(|f| f.values())
    }

    pub fn restore(&mut self, saved: &ParamMap) -> EffectResult<()> {
        self.filter(|f| f.restore(saved))?
    }

    pub fn restore_json(&mut self, saved: &serde_json::Value) -> EffectResult<()> {
        self.filter(|f| f.restore_json(saved))?
    }

    pub fn save(&mut self) -> EffectResult<serde_json::Value> {
        self.filter(|f| f.save())
    }

    pub fn effect_info(&mut self) -> EffectResult<Arc<EffectInfo>> {
        self.filter(|f| f.effect_info())
    }

    pub fn set_processing_path(&mut self, preference: PathPreference) {
        self.pipeline.set_processing_path(preference);
    }

    /// Render `input` into `output`, or in place
    pub fn render(
        &mut self,
        input: &PixelBuffer,
        output: Option<&PixelBuffer>,
    ) -> EffectResult<()> {
        self.pipeline.render(input, output)
    }

    /// Render between two textures created in [`Self::render_environment_mut`]
    pub fn render_with_texture_ids(
        &mut self,
        input: u32,
        output: u32,
        color_space: ColorSpace,
    ) -> EffectResult<()> {
        self.pipeline.render_textures(input, output, color_space)
    }

    /// Bind the textures a texture-input filter renders between
    pub fn bind_textures(&mut self, input: u32, output: u32) -> EffectResult<()> {
        let input = TextureId::new(input).ok_or(EffectError::InputNull("input texture id"))?;
        let output = TextureId::new(output).ok_or(EffectError::InputNull("output texture id"))?;
        self.pipeline.context.bound_textures = Some((input, output));
        Ok(())
    }

    pub fn render_environment_mut(&mut self) -> &mut RenderEnvironment {
        self.pipeline.render_environment_mut()
    }
}
