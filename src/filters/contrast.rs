// SPDX-License-Identifier: GPL-3.0-only

//! Contrast: scales color channels around mid-grey

use super::cpu::{apply_channel_lut, build_lut};
use super::gpu::render_shader;
use super::{
    Category, DispatchTable, EffectInfo, Filter, FloatParam, ParamMap, ParamValue, ProcessingPath,
};
use crate::buffer::{ColorSpace, EffectBuffer, PixelFormat};
use crate::constants::{INTENSITY_RANGE, KEY_INTENSITY};
use crate::errors::{EffectError, EffectResult};
use crate::pipeline::EffectContext;
use crate::shaders::{self, FilterUniform};
use std::sync::{Arc, OnceLock};

pub const NAME: &str = "Contrast";

const INTENSITY: FloatParam = FloatParam {
    key: KEY_INTENSITY,
    min: INTENSITY_RANGE.0,
    max: INTENSITY_RANGE.1,
    default: 0.0,
};

const COLOR_SPACES: [ColorSpace; 2] = [ColorSpace::Srgb, ColorSpace::DisplayP3];

const MID_GREY: f32 = 127.5;

fn dispatch() -> &'static DispatchTable {
    static TABLE: OnceLock<DispatchTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        DispatchTable::new()
            .with(
                ProcessingPath::Cpu,
                &[PixelFormat::Rgba8888, PixelFormat::Nv12, PixelFormat::Nv21],
                render_cpu,
            )
            .with(ProcessingPath::Gpu, &[PixelFormat::Rgba8888], render_gpu)
    })
}

pub fn effect_info() -> Arc<EffectInfo> {
    static INFO: OnceLock<Arc<EffectInfo>> = OnceLock::new();
    INFO.get_or_init(|| Arc::new(dispatch().effect_info(Category::ColorAdjust, &COLOR_SPACES)))
        .clone()
}

/// Slope applied around mid-grey; 0 at -100, 2 at 100
fn factor(intensity: f32) -> f32 {
    1.0 + intensity / INTENSITY_RANGE.1
}

fn render_cpu(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    params: &ParamMap,
    _ctx: &mut EffectContext,
) -> EffectResult<()> {
    let factor = factor(INTENSITY.get(params));
    apply_channel_lut(src, dst, &build_lut(|v| (v - MID_GREY) * factor + MID_GREY))
}

fn render_gpu(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    params: &ParamMap,
    ctx: &mut EffectContext,
) -> EffectResult<()> {
    let uniform = FilterUniform::new(INTENSITY.get(params) / INTENSITY_RANGE.1);
    render_shader(src, dst, ctx, shaders::CONTRAST, uniform)
}

#[derive(Debug, Default)]
pub struct Contrast {
    params: ParamMap,
}

impl Contrast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intensity(&self) -> f32 {
        INTENSITY.get(&self.params)
    }
}

impl Filter for Contrast {
    fn name(&self) -> &str {
        NAME
    }

    fn effect_info(&self) -> Arc<EffectInfo> {
        effect_info()
    }

    fn params(&self) -> &ParamMap {
        &self.params
    }

    fn params_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    fn set_value(&mut self, key: &str, value: ParamValue) -> EffectResult<()> {
        if key != KEY_INTENSITY {
            return Err(EffectError::UnsupportedValueKey {
                filter: NAME.to_string(),
                key: key.to_string(),
            });
        }
        INTENSITY.set(NAME, &mut self.params, &value)?;
        Ok(())
    }

    fn restore(&mut self, saved: &ParamMap) -> EffectResult<()> {
        INTENSITY.restore(NAME, &mut self.params, saved)
    }

    fn render_to(
        &mut self,
        src: &EffectBuffer,
        dst: &mut EffectBuffer,
        ctx: &mut EffectContext,
    ) -> EffectResult<()> {
        let algorithm = dispatch().lookup(NAME, ctx.ip_type, src.descriptor.format)?;
        algorithm(src, dst, &self.params, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferDescriptor;

    fn render(intensity: f32, pixels: Vec<u8>) -> Vec<u8> {
        let mut filter = Contrast::new();
        filter.set_value(KEY_INTENSITY, ParamValue::Float(intensity)).unwrap();
        // 1x1 NV12: one luma byte and one chroma row
        let desc = BufferDescriptor::linear(1, 1, PixelFormat::Nv12, ColorSpace::Srgb);
        let buffer = EffectBuffer::from_bytes(desc, pixels).unwrap();
        let mut ctx = EffectContext::new(ProcessingPath::Cpu);
        filter.render(buffer, &mut ctx).unwrap().to_bytes().unwrap()
    }

    #[test]
    fn test_zero_intensity_is_identity() {
        assert_eq!(render(0.0, vec![40, 128]), vec![40, 128]);
    }

    #[test]
    fn test_minimum_flattens_to_grey() {
        // Luma becomes mid-grey, chroma untouched
        assert_eq!(render(-100.0, vec![3, 200]), vec![128, 200]);
    }

    #[test]
    fn test_maximum_doubles_distance() {
        assert_eq!(render(100.0, vec![100, 60]), vec![73, 60]);
    }

    #[test]
    fn test_color_spaces() {
        let info = effect_info();
        assert_eq!(info.color_spaces.len(), 2);
        assert!(!info.color_spaces.contains(&ColorSpace::SrgbLimit));
    }
}
