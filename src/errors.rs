// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the filter execution engine

use thiserror::Error;

/// Result type alias using EffectError
pub type EffectResult<T> = Result<T, EffectError>;

/// Every recoverable failure the engine reports to its caller
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    /// A required argument was missing
    #[error("required input is missing: {0}")]
    InputNull(&'static str),
    /// Native pixel format has no internal mapping
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),
    /// Filter has no algorithm for this format on the chosen path
    #[error("filter {filter} does not support format {format}")]
    UnsupportedFormatType { filter: String, format: String },
    /// Filter has no algorithm table for this processing path
    #[error("filter {filter} does not support processing path {path}")]
    UnsupportedProcessingPath { filter: String, path: String },
    #[error("unsupported buffer storage kind: {0}")]
    UnsupportedBufferStorageKind(String),
    /// Parameter value has the wrong dynamic type
    #[error("value for {key} must be {expected}")]
    AnyCastTypeMismatch { key: String, expected: &'static str },
    /// Parameter value is outside its declared range
    #[error("value {value} for {key} is outside [{min}, {max}]")]
    ValueOutOfRange {
        key: String,
        value: String,
        min: String,
        max: String,
    },
    #[error("parameter key {key} is not supported by {filter}")]
    UnsupportedValueKey { filter: String, key: String },
    #[error("no value set for {0}")]
    NoValue(String),
    #[error("failed to create memory: {0}")]
    CreateMemoryFailed(String),
    #[error("failed to allocate memory: {0}")]
    AllocMemoryFailed(String),
    #[error("failed to access pixels: {0}")]
    AccessPixelsFailed(String),
    /// Storage context required by the storage kind is absent
    #[error("buffer extra info is missing")]
    ExtraInfoNull,
    #[error("invalid surface buffer: {0}")]
    InvalidSurfaceBuffer(String),
    #[error("invalid file descriptor: {0}")]
    InvalidFileDescriptor(String),
    /// Filter chain shares no color space with the source
    #[error("no common color space for source {src_color_space}")]
    NoCommonColorSpace { src_color_space: String },
    #[error("color space conversion {from} -> {to} is not supported for {format}")]
    ConversionUnsupported {
        from: String,
        to: String,
        format: String,
    },
    #[error("failed to set image info: {0}")]
    SetImageInfoFailed(String),
    #[error("filter not found: {0}")]
    FilterNotFound(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A registered delegate reported failure
    #[error("delegate filter {0} failed")]
    DelegateFailed(String),
    #[error("invalid texture id {0}")]
    InvalidTexture(u32),
    #[error("decode failed: {0}")]
    DecodeFailed(String),
    #[error("encode failed: {0}")]
    EncodeFailed(String),
    #[error("GPU error: {0}")]
    Gpu(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl EffectError {
    /// Stable result code reported at the public boundary
    pub fn code(&self) -> u32 {
        match self {
            Self::InputNull(_) => 401,
            Self::InvalidParameter(_) => 402,
            Self::UnsupportedPixelFormat(_) => 7_100_001,
            Self::UnsupportedFormatType { .. } => 7_100_002,
            Self::UnsupportedProcessingPath { .. } => 7_100_003,
            Self::UnsupportedBufferStorageKind(_) => 7_100_004,
            Self::UnsupportedValueKey { .. } => 7_100_005,
            Self::AnyCastTypeMismatch { .. } => 7_100_006,
            Self::ValueOutOfRange { .. } => 7_100_007,
            Self::NoValue(_) => 7_100_008,
            Self::CreateMemoryFailed(_) => 7_200_001,
            Self::AllocMemoryFailed(_) => 7_200_002,
            Self::AccessPixelsFailed(_) => 7_200_003,
            Self::ExtraInfoNull => 7_200_004,
            Self::InvalidSurfaceBuffer(_) => 7_200_005,
            Self::InvalidFileDescriptor(_) => 7_200_006,
            Self::NoCommonColorSpace { .. } => 7_300_001,
            Self::ConversionUnsupported { .. } => 7_300_002,
            Self::SetImageInfoFailed(_) => 7_300_003,
            Self::FilterNotFound(_) => 7_400_001,
            Self::DelegateFailed(_) => 7_400_002,
            Self::InvalidTexture(_) => 7_500_001,
            Self::Gpu(_) => 7_500_002,
            Self::DecodeFailed(_) => 7_600_001,
            Self::EncodeFailed(_) => 7_600_002,
            Self::Config(_) => 7_700_001,
            Self::Io(_) => 7_700_002,
        }
    }
}

impl From<std::io::Error> for EffectError {
    fn from(err: std::io::Error) -> Self {
        EffectError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for EffectError {
    fn from(err: serde_json::Error) -> Self {
        EffectError::Config(err.to_string())
    }
}
