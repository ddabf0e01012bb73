// SPDX-License-Identifier: GPL-3.0-only

//! Engine-wide constants

/// Parameter key shared by the intensity-driven built-in filters
pub const KEY_INTENSITY: &str = "FilterIntensity";

/// Pseudo parameter that reads back the filter's own name
pub const KEY_FILTER_NAME: &str = "FILTER_NAME";

/// Valid intensity range for brightness and contrast
pub const INTENSITY_RANGE: (f32, f32) = (-100.0, 100.0);

/// Filter names must be strictly shorter than this
pub const MAX_FILTER_NAME_LEN: usize = 1024;

/// Row alignment of DMA surface buffers in bytes
pub const SURFACE_STRIDE_ALIGNMENT: u32 = 64;

/// wgpu requires 256-byte aligned rows for texture-to-buffer copies
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Lookup key returning every known filter
pub const LOOKUP_DEFAULT: &str = "Default";
/// Lookup key prefix selecting by category
pub const LOOKUP_CATEGORY_PREFIX: &str = "Category:";
/// Lookup key prefix selecting by supported format
pub const LOOKUP_FORMAT_PREFIX: &str = "Format:";

/// Telemetry event emitted when an external filter is registered
pub const EVENT_REGISTER_CUSTOM_FILTER: &str = "register_custom_filter";

/// Image metadata written back with the output buffer
pub mod exif {
    pub const IMAGE_WIDTH: &str = "ImageWidth";
    pub const IMAGE_LENGTH: &str = "ImageLength";
    pub const PIXEL_X_DIMENSION: &str = "PixelXDimension";
    pub const PIXEL_Y_DIMENSION: &str = "PixelYDimension";
    pub const DATE_TIME: &str = "DateTime";
    /// Timestamp layout used by the DateTime tag
    pub const DATE_TIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";
}

/// Directory name under the user config dir
pub const CONFIG_DIR_NAME: &str = "image-effect";
pub const CONFIG_FILE_NAME: &str = "config.json";
