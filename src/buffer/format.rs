// SPDX-License-Identifier: GPL-3.0-only

//! Pixel formats, color spaces and the lookup tables between the internal
//! enums and the formats external buffers declare.

use std::fmt;

/// Internal pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum PixelFormat {
    /// Unset
    #[default]
    Default,
    Rgba8888,
    /// Y plane followed by interleaved U/V
    Nv12,
    /// Y plane followed by interleaved V/U
    Nv21,
    Rgba1010102,
    /// 10-bit semi-planar, U before V
    YcbcrP010,
    /// 10-bit semi-planar, V before U
    YcrcbP010,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Rgba8888,
        PixelFormat::Nv12,
        PixelFormat::Nv21,
        PixelFormat::Rgba1010102,
        PixelFormat::YcbcrP010,
        PixelFormat::YcrcbP010,
    ];

    /// Bytes per pixel of the first plane
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Rgba1010102 => 4,
            PixelFormat::Nv12 | PixelFormat::Nv21 => 1,
            PixelFormat::YcbcrP010 | PixelFormat::YcrcbP010 => 2,
            PixelFormat::Default => 0,
        }
    }

    pub fn is_semi_planar(self) -> bool {
        matches!(
            self,
            PixelFormat::Nv12 | PixelFormat::Nv21 | PixelFormat::YcbcrP010 | PixelFormat::YcrcbP010
        )
    }

    /// Number of stride-sized rows backing an image of `height` rows
    pub fn row_count(self, height: u32) -> u32 {
        if self.is_semi_planar() {
            height + height.div_ceil(2)
        } else {
            height
        }
    }

    /// Tightly packed stride for `width` pixels
    pub fn min_row_stride(self, width: u32) -> u32 {
        width * self.bytes_per_pixel()
    }

    /// Total byte length of a linear buffer
    pub fn buffer_len(self, row_stride: u32, height: u32) -> usize {
        row_stride as usize * self.row_count(height) as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            PixelFormat::Default => "Default",
            PixelFormat::Rgba8888 => "RGBA8888",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
            PixelFormat::Rgba1010102 => "RGBA1010102",
            PixelFormat::YcbcrP010 => "YCBCR_P010",
            PixelFormat::YcrcbP010 => "YCRCB_P010",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Color space of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ColorSpace {
    /// Unset
    #[default]
    Default,
    Srgb,
    SrgbLimit,
    DisplayP3,
    DisplayP3Limit,
    Bt2020Hlg,
    Bt2020HlgLimit,
    Bt2020Pq,
    Bt2020PqLimit,
    AdobeRgb,
}

impl ColorSpace {
    /// Limited (video) range variant
    pub fn is_limited_range(self) -> bool {
        matches!(
            self,
            ColorSpace::SrgbLimit
                | ColorSpace::DisplayP3Limit
                | ColorSpace::Bt2020HlgLimit
                | ColorSpace::Bt2020PqLimit
        )
    }

    /// Full range member of the same family
    pub fn full_range(self) -> ColorSpace {
        match self {
            ColorSpace::SrgbLimit => ColorSpace::Srgb,
            ColorSpace::DisplayP3Limit => ColorSpace::DisplayP3,
            ColorSpace::Bt2020HlgLimit => ColorSpace::Bt2020Hlg,
            ColorSpace::Bt2020PqLimit => ColorSpace::Bt2020Pq,
            other => other,
        }
    }

    pub fn is_hdr(self) -> bool {
        matches!(
            self.full_range(),
            ColorSpace::Bt2020Hlg | ColorSpace::Bt2020Pq
        )
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Format declared by an external pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativePixelFormat {
    Rgba8888,
    Bgra8888,
    Nv21,
    Nv12,
    Rgba1010102,
    Rgb565,
}

impl NativePixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            NativePixelFormat::Rgba8888
            | NativePixelFormat::Bgra8888
            | NativePixelFormat::Rgba1010102 => 4,
            NativePixelFormat::Rgb565 => 2,
            NativePixelFormat::Nv21 | NativePixelFormat::Nv12 => 1,
        }
    }
}

/// Format of a hardware surface buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    Rgba8888,
    Ycbcr420Sp,
    Ycrcb420Sp,
    Rgba1010102,
    YcbcrP010,
    YcrcbP010,
}

static NATIVE_FORMATS: [(NativePixelFormat, PixelFormat); 4] = [
    (NativePixelFormat::Rgba8888, PixelFormat::Rgba8888),
    (NativePixelFormat::Nv21, PixelFormat::Nv21),
    (NativePixelFormat::Nv12, PixelFormat::Nv12),
    (NativePixelFormat::Rgba1010102, PixelFormat::Rgba1010102),
];

static SURFACE_FORMATS: [(SurfaceFormat, PixelFormat); 6] = [
    (SurfaceFormat::Rgba8888, PixelFormat::Rgba8888),
    (SurfaceFormat::Ycbcr420Sp, PixelFormat::Nv12),
    (SurfaceFormat::Ycrcb420Sp, PixelFormat::Nv21),
    (SurfaceFormat::Rgba1010102, PixelFormat::Rgba1010102),
    (SurfaceFormat::YcbcrP010, PixelFormat::YcbcrP010),
    (SurfaceFormat::YcrcbP010, PixelFormat::YcrcbP010),
];

pub fn from_native(native: NativePixelFormat) -> Option<PixelFormat> {
    NATIVE_FORMATS
        .iter()
        .find(|(n, _)| *n == native)
        .map(|(_, format)| *format)
}

pub fn to_native(format: PixelFormat) -> Option<NativePixelFormat> {
    NATIVE_FORMATS
        .iter()
        .find(|(_, f)| *f == format)
        .map(|(native, _)| *native)
}

pub fn from_surface(surface: SurfaceFormat) -> Option<PixelFormat> {
    SURFACE_FORMATS
        .iter()
        .find(|(s, _)| *s == surface)
        .map(|(_, format)| *format)
}

pub fn to_surface(format: PixelFormat) -> Option<SurfaceFormat> {
    SURFACE_FORMATS
        .iter()
        .find(|(_, f)| *f == format)
        .map(|(surface, _)| *surface)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_table_is_bidirectional() {
        for (native, format) in NATIVE_FORMATS {
            assert_eq!(from_native(native), Some(format));
            assert_eq!(to_native(format), Some(native));
        }
        assert_eq!(from_native(NativePixelFormat::Bgra8888), None);
        assert_eq!(to_native(PixelFormat::YcbcrP010), None);
    }

    #[test]
    fn test_surface_table_covers_p010() {
        assert_eq!(
            from_surface(SurfaceFormat::YcrcbP010),
            Some(PixelFormat::YcrcbP010)
        );
        assert_eq!(to_surface(PixelFormat::Nv21), Some(SurfaceFormat::Ycrcb420Sp));
        assert_eq!(to_surface(PixelFormat::Default), None);
    }

    #[test]
    fn test_semi_planar_length_includes_chroma() {
        assert_eq!(PixelFormat::Nv12.buffer_len(4, 4), 24);
        assert_eq!(PixelFormat::Nv21.buffer_len(4, 3), 20);
        assert_eq!(PixelFormat::Rgba8888.buffer_len(16, 4), 64);
    }

    #[test]
    fn test_limited_range_family() {
        assert_eq!(ColorSpace::DisplayP3Limit.full_range(), ColorSpace::DisplayP3);
        assert!(ColorSpace::Bt2020PqLimit.is_hdr());
        assert!(!ColorSpace::Srgb.is_limited_range());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(PixelFormat::from_name("nv21"), Some(PixelFormat::Nv21));
        assert_eq!(PixelFormat::from_name("Default"), None);
    }
}
