// SPDX-License-Identifier: GPL-3.0-only

//! Working color space selection for a filter chain

use crate::buffer::{BufferDescriptor, ColorSpace, PixelFormat};
use crate::errors::{EffectError, EffectResult};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Color spaces the engine can convert from or to
static SUPPORTED_COLOR_SPACES: [ColorSpace; 9] = [
    ColorSpace::Srgb,
    ColorSpace::SrgbLimit,
    ColorSpace::DisplayP3,
    ColorSpace::DisplayP3Limit,
    ColorSpace::Bt2020Hlg,
    ColorSpace::Bt2020HlgLimit,
    ColorSpace::Bt2020Pq,
    ColorSpace::Bt2020PqLimit,
    ColorSpace::AdobeRgb,
];

#[derive(Debug, Default)]
pub struct ColorSpaceStrategy {
    src: Option<BufferDescriptor>,
    dst: Option<BufferDescriptor>,
}

impl ColorSpaceStrategy {
    pub fn is_supported(color_space: ColorSpace) -> bool {
        SUPPORTED_COLOR_SPACES.contains(&color_space)
    }

    pub fn all_supported() -> HashSet<ColorSpace> {
        SUPPORTED_COLOR_SPACES.iter().copied().collect()
    }

    /// Canonical working space for a source color space
    pub fn target_color_space(src: ColorSpace) -> ColorSpace {
        match src {
            ColorSpace::Default => ColorSpace::Srgb,
            ColorSpace::AdobeRgb => ColorSpace::DisplayP3,
            other => other.full_range(),
        }
    }

    /// Remember the buffers of the current run
    pub fn init(&mut self, src: &BufferDescriptor, dst: Option<&BufferDescriptor>) {
        self.src = Some(src.clone());
        self.dst = dst.cloned();
    }

    pub fn deinit(&mut self) {
        self.src = None;
        self.dst = None;
    }

    /// Pick the working color space: the source's own when every filter
    /// accepts it, else its canonical target when every filter accepts
    /// that. The outcome depends only on the intersection of the sets.
    pub fn choose_color_space(
        &self,
        filter_sets: &[HashSet<ColorSpace>],
        src: ColorSpace,
    ) -> EffectResult<ColorSpace> {
        let common = filter_sets
            .iter()
            .fold(Self::all_supported(), |acc, set| {
                acc.intersection(set).copied().collect()
            });

        if common.contains(&src) {
            debug!(color_space = %src, "Source color space kept");
            return Ok(src);
        }

        let target = Self::target_color_space(src);
        if common.contains(&target) {
            debug!(source = %src, target = %target, "Working color space chosen");
            return Ok(target);
        }

        warn!(source = %src, filters = filter_sets.len(), "No common color space");
        Err(EffectError::NoCommonColorSpace {
            src_color_space: src.to_string(),
        })
    }

    /// Check the source (and destination) can be converted to `target`
    pub fn check_converter_color_space(&self, target: ColorSpace) -> EffectResult<()> {
        let Some(src) = &self.src else {
            return Err(EffectError::InputNull("color space source"));
        };
        check_conversion(src.color_space, target, src.format)?;
        if let Some(dst) = &self.dst {
            if dst.format != PixelFormat::Default && !dst.same_shape(src) {
                debug!(
                    dst_format = %dst.format,
                    src_format = %src.format,
                    "Destination differs from source, converted on write-back"
                );
            }
        }
        Ok(())
    }
}

/// Whether a conversion `from -> to` exists for buffers of `format`
pub fn check_conversion(from: ColorSpace, to: ColorSpace, format: PixelFormat) -> EffectResult<()> {
    if !is_need_conversion(from, to) {
        return Ok(());
    }
    let range = from.is_limited_range() && from.full_range() == to;
    let gamut = from == ColorSpace::AdobeRgb && to == ColorSpace::DisplayP3;
    let supported = match format {
        PixelFormat::Rgba8888 => range || gamut,
        PixelFormat::Rgba1010102
        | PixelFormat::Nv12
        | PixelFormat::Nv21
        | PixelFormat::YcbcrP010
        | PixelFormat::YcrcbP010 => range,
        PixelFormat::Default => false,
    };
    if supported {
        Ok(())
    } else {
        Err(EffectError::ConversionUnsupported {
            from: from.to_string(),
            to: to.to_string(),
            format: format.to_string(),
        })
    }
}

/// Whether pixel data must change to go from `from` to `to`
pub fn is_need_conversion(from: ColorSpace, to: ColorSpace) -> bool {
    from != to && !(from == ColorSpace::Default && to == ColorSpace::Srgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_needed_only_between_different_spaces() {
        assert!(!is_need_conversion(ColorSpace::Srgb, ColorSpace::Srgb));
        assert!(!is_need_conversion(ColorSpace::Default, ColorSpace::Srgb));
        assert!(is_need_conversion(ColorSpace::SrgbLimit, ColorSpace::Srgb));
        assert!(is_need_conversion(ColorSpace::Srgb, ColorSpace::DisplayP3));
    }

    fn set(spaces: &[ColorSpace]) -> HashSet<ColorSpace> {
        spaces.iter().copied().collect()
    }

    #[test]
    fn test_source_kept_when_common() {
        let strategy = ColorSpaceStrategy::default();
        let sets = [
            set(&[ColorSpace::Srgb, ColorSpace::DisplayP3]),
            set(&[ColorSpace::DisplayP3]),
        ];
        assert_eq!(
            strategy.choose_color_space(&sets, ColorSpace::DisplayP3),
            Ok(ColorSpace::DisplayP3)
        );
    }

    #[test]
    fn test_limited_source_maps_to_full_range() {
        let strategy = ColorSpaceStrategy::default();
        let sets = [set(&[ColorSpace::Srgb, ColorSpace::DisplayP3])];
        assert_eq!(
            strategy.choose_color_space(&sets, ColorSpace::SrgbLimit),
            Ok(ColorSpace::Srgb)
        );
    }

    #[test]
    fn test_no_common_color_space() {
        let strategy = ColorSpaceStrategy::default();
        let sets = [set(&[ColorSpace::Srgb]), set(&[ColorSpace::DisplayP3])];
        assert!(matches!(
            strategy.choose_color_space(&sets, ColorSpace::Srgb),
            Err(EffectError::NoCommonColorSpace { .. })
        ));
    }

    #[test]
    fn test_default_source_is_srgb() {
        let strategy = ColorSpaceStrategy::default();
        let sets = [set(&[ColorSpace::Srgb])];
        assert_eq!(
            strategy.choose_color_space(&sets, ColorSpace::Default),
            Ok(ColorSpace::Srgb)
        );
    }

    #[test]
    fn test_conversion_table() {
        assert!(check_conversion(ColorSpace::SrgbLimit, ColorSpace::Srgb, PixelFormat::Nv21).is_ok());
        assert!(
            check_conversion(ColorSpace::AdobeRgb, ColorSpace::DisplayP3, PixelFormat::Rgba8888)
                .is_ok()
        );
        assert!(
            check_conversion(ColorSpace::AdobeRgb, ColorSpace::DisplayP3, PixelFormat::Nv12)
                .is_err()
        );
        assert!(check_conversion(ColorSpace::Srgb, ColorSpace::DisplayP3, PixelFormat::Rgba8888).is_err());
        assert!(check_conversion(ColorSpace::Default, ColorSpace::Srgb, PixelFormat::Nv12).is_ok());
    }

    #[test]
    fn test_check_converter_needs_init() {
        let mut strategy = ColorSpaceStrategy::default();
        assert!(matches!(
            strategy.check_converter_color_space(ColorSpace::Srgb),
            Err(EffectError::InputNull(_))
        ));
        let src = BufferDescriptor::linear(1, 1, PixelFormat::Rgba8888, ColorSpace::SrgbLimit);
        strategy.init(&src, None);
        assert!(strategy.check_converter_color_space(ColorSpace::Srgb).is_ok());
        strategy.deinit();
        assert!(strategy.check_converter_color_space(ColorSpace::Srgb).is_err());
    }
}
