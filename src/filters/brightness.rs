// SPDX-License-Identifier: GPL-3.0-only

//! Brightness: adds a constant offset to every color channel

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

pub const NAME: &str = "Brightness";

const INTENSITY: FloatParam = FloatParam {
    key: KEY_INTENSITY,
    min: INTENSITY_RANGE.0,
    max: INTENSITY_RANGE.1,
    default: 0.0,
};

const COLOR_SPACES: [ColorSpace; 4] = [
    ColorSpace::Srgb,
    ColorSpace::SrgbLimit,
    ColorSpace::DisplayP3,
    ColorSpace::DisplayP3Limit,
];

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

/// Capability record shared by every instance
pub fn effect_info() -> Arc<EffectInfo> {
    static INFO: OnceLock<Arc<EffectInfo>> = OnceLock::new();
    INFO.get_or_init(|| Arc::new(dispatch().effect_info(Category::ColorAdjust, &COLOR_SPACES)))
        .clone()
}

/// Channel offset in 8-bit units
fn offset(intensity: f32) -> f32 {
    intensity / INTENSITY_RANGE.1 * 255.0
}

fn render_cpu(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    params: &ParamMap,
    _ctx: &mut EffectContext,
) -> EffectResult<()> {
    let offset = offset(INTENSITY.get(params));
    apply_channel_lut(src, dst, &build_lut(|v| v + offset))
}

fn render_gpu(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    params: &ParamMap,
    ctx: &mut EffectContext,
) -> EffectResult<()> {
    let uniform = FilterUniform::new(INTENSITY.get(params) / INTENSITY_RANGE.1);
    render_shader(src, dst, ctx, shaders::BRIGHTNESS, uniform)
}

#[derive(Debug, Default)]
pub struct Brightness {
    params: ParamMap,
}

impl Brightness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intensity(&self) -> f32 {
        INTENSITY.get(&self.params)
    }
}

impl Filter for Brightness {
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
    use crate::constants::KEY_FILTER_NAME;

    #[test]
    fn test_capabilities() {
        let info = effect_info();
        assert!(info.supports(PixelFormat::Rgba8888, ProcessingPath::Gpu));
        assert!(info.supports(PixelFormat::Nv21, ProcessingPath::Cpu));
        assert!(!info.supports(PixelFormat::Nv12, ProcessingPath::Gpu));
        assert_eq!(info.category, Category::ColorAdjust);
        assert!(info.color_spaces.contains(&ColorSpace::SrgbLimit));
        assert!(Arc::ptr_eq(&info, &effect_info()));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let mut filter = Brightness::new();
        assert!(matches!(
            filter.set_value("Radius", ParamValue::Float(1.0)),
            Err(EffectError::UnsupportedValueKey { .. })
        ));
    }

    #[test]
    fn test_get_value() {
        let mut filter = Brightness::new();
        assert!(matches!(
            filter.get_value(KEY_INTENSITY),
            Err(EffectError::NoValue(_))
        ));
        filter.set_value(KEY_INTENSITY, ParamValue::Float(-20.0)).unwrap();
        assert_eq!(filter.get_value(KEY_INTENSITY), Ok(ParamValue::Float(-20.0)));
        assert_eq!(
            filter.get_value(KEY_FILTER_NAME),
            Ok(ParamValue::Text("Brightness".into()))
        );
        assert_eq!(filter.remove_value(KEY_INTENSITY), Some(ParamValue::Float(-20.0)));
        assert_eq!(filter.intensity(), 0.0);
    }

    #[test]
    fn test_save_restore() {
        let mut filter = Brightness::new();
        filter.set_value(KEY_INTENSITY, ParamValue::Float(25.0)).unwrap();
        let saved = filter.save();

        let mut restored = Brightness::new();
        restored.restore_json(&saved).unwrap();
        assert_eq!(restored.intensity(), 25.0);
    }

    #[test]
    fn test_cpu_render() {
        let mut filter = Brightness::new();
        filter.set_value(KEY_INTENSITY, ParamValue::Float(10.0)).unwrap();
        let desc = BufferDescriptor::linear(2, 1, PixelFormat::Rgba8888, ColorSpace::Srgb);
        let buffer = EffectBuffer::from_bytes(desc, vec![0, 100, 250, 255, 10, 10, 10, 7]).unwrap();
        let mut ctx = EffectContext::new(ProcessingPath::Cpu);

        let out = filter.render(buffer, &mut ctx).unwrap();

        // 10% of 255 is 25.5, rounded per channel
        assert_eq!(out.to_bytes().unwrap(), vec![26, 126, 255, 255, 36, 36, 36, 7]);
    }

    #[test]
    fn test_p010_is_not_dispatched() {
        let mut filter = Brightness::new();
        let desc = BufferDescriptor::linear(2, 2, PixelFormat::YcbcrP010, ColorSpace::Srgb);
        let buffer = EffectBuffer::from_bytes(desc.clone(), vec![0; desc.len]).unwrap();
        let mut ctx = EffectContext::new(ProcessingPath::Cpu);
        assert!(matches!(
            filter.render(buffer, &mut ctx),
            Err(EffectError::UnsupportedFormatType { .. })
        ));
    }
}
