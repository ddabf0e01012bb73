// SPDX-License-Identifier: GPL-3.0-only

//! Filters, their capability records and the registry that creates them
//!
//! A filter keeps an ordered parameter map and renders through a dispatch
//! table keyed by processing path and pixel format. Built-in filters are
//! [`Brightness`] and [`Contrast`]; third-party filters are installed in the
//! [`FilterRegistry`] as [`FilterDelegate`]s.

pub mod brightness;
pub mod contrast;
pub mod cpu;
pub mod delegate;
pub mod dispatch;
pub mod gpu;
pub mod params;
pub mod registry;

pub use brightness::Brightness;
pub use contrast::Contrast;
pub use delegate::{DelegateFilter, DelegateInfo, FilterDelegate};
pub use dispatch::{DispatchTable, RenderFn};
pub use params::{FloatParam, ParamMap, ParamValue};
pub use registry::FilterRegistry;

use crate::buffer::{BufferDescriptor, ColorSpace, EffectBuffer, PixelFormat};
use crate::constants::KEY_FILTER_NAME;
use crate::errors::{EffectError, EffectResult};
use crate::pipeline::EffectContext;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Where a filter's algorithm runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessingPath {
    Cpu,
    Gpu,
}

impl fmt::Display for ProcessingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessingPath::Cpu => "CPU",
            ProcessingPath::Gpu => "GPU",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    ColorAdjust,
    Style,
    Other,
}

impl Category {
    pub fn name(self) -> &'static str {
        match self {
            Category::ColorAdjust => "ColorAdjust",
            Category::Style => "Style",
            Category::Other => "Other",
        }
    }
}

impl FromStr for Category {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Category::ColorAdjust, Category::Style, Category::Other]
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| EffectError::InvalidParameter(format!("unknown category: {s}")))
    }
}

/// Capability record of one filter
#[derive(Debug, Clone, PartialEq)]
pub struct EffectInfo {
    /// Processing paths implemented for each pixel format
    pub formats: BTreeMap<PixelFormat, Vec<ProcessingPath>>,
    pub category: Category,
    pub color_spaces: HashSet<ColorSpace>,
}

impl EffectInfo {
    pub fn supports(&self, format: PixelFormat, path: ProcessingPath) -> bool {
        self.formats
            .get(&format)
            .is_some_and(|paths| paths.contains(&path))
    }

    pub fn supports_format(&self, format: PixelFormat) -> bool {
        self.formats.contains_key(&format)
    }
}

/// A named, configurable image transform
///
/// A filter is not internally synchronized; one instance must not render
/// from two threads at once.
pub trait Filter: Send + fmt::Debug {
    fn name(&self) -> &str;

    fn effect_info(&self) -> Arc<EffectInfo>;

    fn params(&self) -> &ParamMap;

    fn params_mut(&mut self) -> &mut ParamMap;

    /// Validate and store a parameter
    fn set_value(&mut self, key: &str, value: ParamValue) -> EffectResult<()>;

    fn get_value(&self, key: &str) -> EffectResult<ParamValue> {
        if key == KEY_FILTER_NAME {
            return Ok(ParamValue::Text(self.name().to_string()));
        }
        self.params()
            .get(key)
            .cloned()
            .ok_or_else(|| EffectError::NoValue(key.to_string()))
    }

    fn remove_value(&mut self, key: &str) -> Option<ParamValue> {
        self.params_mut().remove(key)
    }

    /// Snapshot of the current parameters
    fn values(&self) -> ParamMap {
        self.params().clone()
    }

    /// Reapply parameters saved earlier; values outside their range fail
    fn restore(&mut self, saved: &ParamMap) -> EffectResult<()>;

    fn restore_json(&mut self, saved: &serde_json::Value) -> EffectResult<()> {
        let map = params::from_json(saved)?;
        self.restore(&map)
    }

    fn save(&self) -> serde_json::Value {
        params::to_json(self.name(), self.params())
    }

    /// Consumes and produces GPU textures only
    fn is_texture_input(&self) -> bool {
        false
    }

    /// Render `src` into `dst`
    fn render_to(
        &mut self,
        src: &EffectBuffer,
        dst: &mut EffectBuffer,
        ctx: &mut EffectContext,
    ) -> EffectResult<()>;

    /// Single-buffer form. On the CPU path the output aliases the input;
    /// on the GPU path the output is a scratch texture owned by the context.
    fn render(
        &mut self,
        buffer: EffectBuffer,
        ctx: &mut EffectContext,
    ) -> EffectResult<EffectBuffer> {
        match ctx.ip_type {
            ProcessingPath::Cpu => {
                let mut dst = buffer.clone();
                self.render_to(&buffer, &mut dst, ctx)?;
                Ok(dst)
            }
            ProcessingPath::Gpu => {
                let desc = &buffer.descriptor;
                let id = ctx.scratch_texture(desc.width, desc.height, desc.format)?;
                let mut dst = EffectBuffer::from_texture(
                    id,
                    BufferDescriptor { row_stride: 0, len: 0, ..desc.clone() },
                );
                debug!(filter = self.name(), texture = id.get(), "Rendering into scratch texture");
                self.render_to(&buffer, &mut dst, ctx)?;
                Ok(dst)
            }
        }
    }

    /// Render with the textures bound in the context; only texture-input
    /// filters implement this
    fn render_bound(&mut self, ctx: &mut EffectContext) -> EffectResult<()> {
        Err(EffectError::UnsupportedProcessingPath {
            filter: self.name().to_string(),
            path: ctx.ip_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("coloradjust".parse::<Category>(), Ok(Category::ColorAdjust));
        assert!("Blur".parse::<Category>().is_err());
    }

    #[test]
    fn test_effect_info_supports() {
        let info = EffectInfo {
            formats: BTreeMap::from([
                (PixelFormat::Rgba8888, vec![ProcessingPath::Cpu, ProcessingPath::Gpu]),
                (PixelFormat::Nv12, vec![ProcessingPath::Cpu]),
            ]),
            category: Category::ColorAdjust,
            color_spaces: HashSet::from([ColorSpace::Srgb]),
        };
        assert!(info.supports(PixelFormat::Nv12, ProcessingPath::Cpu));
        assert!(!info.supports(PixelFormat::Nv12, ProcessingPath::Gpu));
        assert!(!info.supports_format(PixelFormat::Nv21));
    }
}
