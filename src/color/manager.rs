// SPDX-License-Identifier: GPL-3.0-only

//! Color space negotiation for a pipeline run and in-place conversion of
//! buffer pixels to the negotiated space.

use super::strategy::{ColorSpaceStrategy, check_conversion, is_need_conversion};
use crate::buffer::{BufferDescriptor, ColorSpace, EffectBuffer, PixelFormat};
use crate::errors::{EffectError, EffectResult};
use crate::memory::{self, rows_mut};
use std::collections::HashSet;
use tracing::{debug, info};

/// Adobe RGB (1998) to Display P3, linear light, D65
const ADOBE_RGB_TO_P3: [[f32; 3]; 3] = [
    [1.150_2, -0.150_1, 0.0],
    [0.046_4, 0.953_6, 0.0],
    [0.023_9, 0.026_5, 0.949_4],
];

/// Adobe RGB transfer exponent (563/256)
const ADOBE_RGB_GAMMA: f32 = 2.199_218_8;

#[derive(Debug, Default)]
pub struct ColorSpaceManager {
    strategy: ColorSpaceStrategy,
    working: Option<ColorSpace>,
}

impl ColorSpaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the working color space for one run; later calls in the same
    /// run return the first choice
    pub fn negotiate(
        &mut self,
        filter_sets: &[HashSet<ColorSpace>],
        src: &BufferDescriptor,
        dst: Option<&BufferDescriptor>,
    ) -> EffectResult<ColorSpace> {
        if let Some(working) = self.working {
            return Ok(working);
        }
        self.strategy.init(src, dst);
        let chosen = self
            .strategy
            .choose_color_space(filter_sets, src.color_space)
            .and_then(|chosen| {
                self.strategy.check_converter_color_space(chosen)?;
                Ok(chosen)
            });
        match chosen {
            Ok(chosen) => {
                info!(source = %src.color_space, working = %chosen, "Color space negotiated");
                self.working = Some(chosen);
                Ok(chosen)
            }
            Err(e) => {
                self.strategy.deinit();
                Err(e)
            }
        }
    }

    pub fn working_color_space(&self) -> Option<ColorSpace> {
        self.working
    }

    /// Forget the negotiated space at the end of a run
    pub fn reset(&mut self) {
        self.working = None;
        self.strategy.deinit();
    }

    /// Convert `buffer` to `desired`, returning the color space it ends in
    pub fn apply_color_space(
        &self,
        buffer: &mut EffectBuffer,
        desired: ColorSpace,
    ) -> EffectResult<ColorSpace> {
        let current = buffer.descriptor.color_space;
        if !is_need_conversion(current, desired) {
            buffer.descriptor.color_space = desired;
            return Ok(desired);
        }
        check_conversion(current, desired, buffer.descriptor.format)?;
        let data = buffer.data.as_ref().ok_or_else(|| EffectError::ConversionUnsupported {
            from: current.to_string(),
            to: desired.to_string(),
            format: "texture".into(),
        })?;

        let descriptor = buffer.descriptor.clone();
        {
            let mut guard = memory::write_shared(data)?;
            let bytes = guard.bytes_mut();
            if current.is_limited_range() {
                expand_range(bytes, &descriptor)?;
            } else {
                adobe_rgb_to_p3(bytes, &descriptor)?;
            }
            guard.info.descriptor.color_space = desired;
        }
        debug!(
            from = %current,
            to = %desired,
            format = %descriptor.format,
            "Converted buffer color space"
        );
        buffer.descriptor.color_space = desired;
        Ok(desired)
    }
}

fn expand(value: f32, low: f32, high: f32, max: f32) -> f32 {
    ((value - low) * max / (high - low)).round().clamp(0.0, max)
}

fn expand_chroma(value: f32, low: f32, high: f32, max: f32) -> f32 {
    let mid = (max + 1.0) / 2.0;
    ((value - mid) * max / (high - low) + mid).round().clamp(0.0, max)
}

/// Limited (video) range to full range
fn expand_range(bytes: &mut [u8], desc: &BufferDescriptor) -> EffectResult<()> {
    let stride = desc.row_stride as usize;
    let width = desc.width as usize;
    let height = desc.height as usize;
    let chroma_rows = desc.height.div_ceil(2) as usize;
    let chroma_width = desc.width.div_ceil(2) as usize * 2;

    match desc.format {
        PixelFormat::Rgba8888 => {
            for row in rows_mut(bytes, stride, 0, height, width * 4)? {
                for px in row.chunks_exact_mut(4) {
                    for c in &mut px[..3] {
                        *c = expand(f32::from(*c), 16.0, 235.0, 255.0) as u8;
                    }
                }
            }
        }
        PixelFormat::Rgba1010102 => {
            for row in rows_mut(bytes, stride, 0, height, width * 4)? {
                for px in row.chunks_exact_mut(4) {
                    let packed = u32::from_le_bytes([px[0], px[1], px[2], px[3]]);
                    let mut out = packed & 0xC000_0000;
                    for shift in [0, 10, 20] {
                        let v = ((packed >> shift) & 0x3FF) as f32;
                        out |= (expand(v, 64.0, 940.0, 1023.0) as u32) << shift;
                    }
                    px.copy_from_slice(&out.to_le_bytes());
                }
            }
        }
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            for row in rows_mut(bytes, stride, 0, height, width)? {
                for y in row {
                    *y = expand(f32::from(*y), 16.0, 235.0, 255.0) as u8;
                }
            }
            for row in rows_mut(bytes, stride, height, chroma_rows, chroma_width)? {
                for c in row {
                    *c = expand_chroma(f32::from(*c), 16.0, 240.0, 255.0) as u8;
                }
            }
        }
        PixelFormat::YcbcrP010 | PixelFormat::YcrcbP010 => {
            let sample = |bytes: &mut [u8], chroma: bool| {
                let v = (u16::from_le_bytes([bytes[0], bytes[1]]) >> 6) as f32;
                let out = (if chroma {
                    expand_chroma(v, 64.0, 960.0, 1023.0)
                } else {
                    expand(v, 64.0, 940.0, 1023.0)
                }) as u16;
                bytes.copy_from_slice(&(out << 6).to_le_bytes());
            };
            for row in rows_mut(bytes, stride, 0, height, width * 2)? {
                row.chunks_exact_mut(2).for_each(|s| sample(s, false));
            }
            for row in rows_mut(bytes, stride, height, chroma_rows, chroma_width * 2)? {
                row.chunks_exact_mut(2).for_each(|s| sample(s, true));
            }
        }
        PixelFormat::Default => {
            return Err(EffectError::UnsupportedPixelFormat(desc.format.to_string()));
        }
    }
    Ok(())
}

fn srgb_encode(linear: f32) -> f32 {
    if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

/// Gamut mapping for 8-bit RGBA
fn adobe_rgb_to_p3(bytes: &mut [u8], desc: &BufferDescriptor) -> EffectResult<()> {
    let stride = desc.row_stride as usize;
    let row_bytes = desc.width as usize * 4;
    for row in rows_mut(bytes, stride, 0, desc.height as usize, row_bytes)? {
        for px in row.chunks_exact_mut(4) {
            let linear = [0, 1, 2].map(|i| (f32::from(px[i]) / 255.0).powf(ADOBE_RGB_GAMMA));
            for (i, m) in ADOBE_RGB_TO_P3.iter().enumerate() {
                let v = m[0] * linear[0] + m[1] * linear[1] + m[2] * linear[2];
                px[i] = (srgb_encode(v.clamp(0.0, 1.0)) * 255.0).round() as u8;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_buffer(color_space: ColorSpace, pixels: &[u8]) -> EffectBuffer {
        let width = (pixels.len() / 4) as u32;
        let desc = BufferDescriptor::linear(width, 1, PixelFormat::Rgba8888, color_space);
        EffectBuffer::from_bytes(desc, pixels.to_vec()).unwrap()
    }

    #[test]
    fn test_limited_rgba_expands() {
        let manager = ColorSpaceManager::new();
        let mut buffer = rgba_buffer(ColorSpace::SrgbLimit, &[16, 235, 126, 77]);
        let result = manager.apply_color_space(&mut buffer, ColorSpace::Srgb);
        assert_eq!(result, Ok(ColorSpace::Srgb));
        let bytes = buffer.to_bytes().unwrap();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes[3], 77);
        assert_eq!(buffer.descriptor.color_space, ColorSpace::Srgb);
    }

    #[test]
    fn test_same_space_is_noop() {
        let manager = ColorSpaceManager::new();
        let mut buffer = rgba_buffer(ColorSpace::Srgb, &[16, 16, 16, 255]);
        manager.apply_color_space(&mut buffer, ColorSpace::Srgb).unwrap();
        assert_eq!(buffer.to_bytes().unwrap(), vec![16, 16, 16, 255]);
    }

    #[test]
    fn test_nv21_limited_expands_luma_and_chroma() {
        let desc = BufferDescriptor::linear(2, 2, PixelFormat::Nv21, ColorSpace::SrgbLimit);
        let mut buffer = EffectBuffer::from_bytes(desc, vec![16, 235, 16, 235, 128, 240]).unwrap();
        ColorSpaceManager::new()
            .apply_color_space(&mut buffer, ColorSpace::Srgb)
            .unwrap();
        assert_eq!(buffer.to_bytes().unwrap(), vec![0, 255, 0, 255, 128, 255]);
    }

    #[test]
    fn test_adobe_white_stays_white() {
        let manager = ColorSpaceManager::new();
        let mut buffer = rgba_buffer(ColorSpace::AdobeRgb, &[255, 255, 255, 255, 0, 0, 0, 9]);
        manager
            .apply_color_space(&mut buffer, ColorSpace::DisplayP3)
            .unwrap();
        let bytes = buffer.to_bytes().unwrap();
        assert!(bytes[..3].iter().all(|c| *c >= 254));
        assert_eq!(&bytes[4..8], &[0, 0, 0, 9]);
    }

    #[test]
    fn test_unsupported_conversion_leaves_pixels() {
        let manager = ColorSpaceManager::new();
        let mut buffer = rgba_buffer(ColorSpace::Srgb, &[1, 2, 3, 4]);
        assert!(matches!(
            manager.apply_color_space(&mut buffer, ColorSpace::Bt2020Pq),
            Err(EffectError::ConversionUnsupported { .. })
        ));
        assert_eq!(buffer.to_bytes().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_negotiation_is_sticky_until_reset() {
        let mut manager = ColorSpaceManager::new();
        let src = BufferDescriptor::linear(1, 1, PixelFormat::Rgba8888, ColorSpace::DisplayP3);
        let sets: [HashSet<ColorSpace>; 1] =
            [[ColorSpace::DisplayP3, ColorSpace::Srgb].into_iter().collect()];
        assert_eq!(manager.negotiate(&sets, &src, None), Ok(ColorSpace::DisplayP3));

        let other = BufferDescriptor::linear(1, 1, PixelFormat::Rgba8888, ColorSpace::Srgb);
        assert_eq!(manager.negotiate(&sets, &other, None), Ok(ColorSpace::DisplayP3));
        manager.reset();
        assert_eq!(manager.negotiate(&sets, &other, None), Ok(ColorSpace::Srgb));
    }
}
