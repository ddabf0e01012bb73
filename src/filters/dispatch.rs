// SPDX-License-Identifier: GPL-3.0-only

//! Algorithm selection by processing path and pixel format

use super::{Category, EffectInfo, ParamMap, ProcessingPath};
use crate::buffer::{ColorSpace, EffectBuffer, PixelFormat};
use crate::errors::{EffectError, EffectResult};
use crate::pipeline::EffectContext;
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// One algorithm: read `src`, write `dst`
pub type RenderFn =
    fn(&EffectBuffer, &mut EffectBuffer, &ParamMap, &mut EffectContext) -> EffectResult<()>;

#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    entries: BTreeMap<ProcessingPath, BTreeMap<PixelFormat, RenderFn>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `algorithm` for every format in `formats` on `path`
    pub fn with(
        mut self,
        path: ProcessingPath,
        formats: &[PixelFormat],
        algorithm: RenderFn,
    ) -> Self {
        let by_format = self.entries.entry(path).or_default();
        for format in formats {
            by_format.insert(*format, algorithm);
        }
        self
    }

    pub fn lookup(
        &self,
        filter: &str,
        path: ProcessingPath,
        format: PixelFormat,
    ) -> EffectResult<RenderFn> {
        let Some(by_format) = self.entries.get(&path) else {
            warn!(filter, %path, "Processing path not implemented");
            return Err(EffectError::UnsupportedProcessingPath {
                filter: filter.to_string(),
                path: path.to_string(),
            });
        };
        by_format.get(&format).copied().ok_or_else(|| {
            warn!(filter, %path, %format, "Pixel format not implemented");
            EffectError::UnsupportedFormatType {
                filter: filter.to_string(),
                format: format.to_string(),
            }
        })
    }

    /// Capability record describing exactly what this table implements
    pub fn effect_info(&self, category: Category, color_spaces: &[ColorSpace]) -> EffectInfo {
        let mut formats: BTreeMap<PixelFormat, Vec<ProcessingPath>> = BTreeMap::new();
        for (path, by_format) in &self.entries {
            for format in by_format.keys() {
                formats.entry(*format).or_default().push(*path);
            }
        }
        EffectInfo {
            formats,
            category,
            color_spaces: color_spaces.iter().copied().collect::<HashSet<_>>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(
        _: &EffectBuffer,
        _: &mut EffectBuffer,
        _: &ParamMap,
        _: &mut EffectContext,
    ) -> EffectResult<()> {
        Ok(())
    }

    fn table() -> DispatchTable {
        DispatchTable::new()
            .with(ProcessingPath::Cpu, &[PixelFormat::Rgba8888, PixelFormat::Nv12], noop)
            .with(ProcessingPath::Gpu, &[PixelFormat::Rgba8888], noop)
    }

    #[test]
    fn test_lookup_errors() {
        let cpu_only = DispatchTable::new().with(ProcessingPath::Cpu, &[PixelFormat::Nv12], noop);
        assert!(matches!(
            cpu_only.lookup("Test", ProcessingPath::Gpu, PixelFormat::Nv12),
            Err(EffectError::UnsupportedProcessingPath { .. })
        ));
        assert!(matches!(
            table().lookup("Test", ProcessingPath::Gpu, PixelFormat::Nv12),
            Err(EffectError::UnsupportedFormatType { .. })
        ));
        assert!(table().lookup("Test", ProcessingPath::Cpu, PixelFormat::Nv12).is_ok());
    }

    #[test]
    fn test_effect_info_from_table() {
        let info = table().effect_info(Category::ColorAdjust, &[ColorSpace::Srgb]);
        assert_eq!(
            info.formats.get(&PixelFormat::Rgba8888),
            Some(&vec![ProcessingPath::Cpu, ProcessingPath::Gpu])
        );
        assert_eq!(info.formats.get(&PixelFormat::Nv12), Some(&vec![ProcessingPath::Cpu]));
        assert!(info.color_spaces.contains(&ColorSpace::Srgb));
    }
}
