// SPDX-License-Identifier: GPL-3.0-only

//! Buffer model
//!
//! An [`EffectBuffer`] describes one rectangular pixel region passed between
//! pipeline stages: its geometry and format ([`BufferDescriptor`]), where
//! its pixels come from ([`BufferHandle`]) and, for memory-backed buffers,
//! the allocation holding them.

pub mod format;
pub mod pixel_buffer;

pub use format::{ColorSpace, NativePixelFormat, PixelFormat, SurfaceFormat};
pub use pixel_buffer::{AllocatorKind, LockedBuffer, PixelBuffer, PixelBufferInfo, lock, unlock};

use crate::errors::{EffectError, EffectResult};
use crate::memory::{
    self, MemoryData, MemoryInfo, SharedMemoryData, Storage, SurfaceBuffer, SurfaceInfo,
};
use std::num::NonZeroU32;
use std::path::PathBuf;

/// Where a buffer's pixels live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageKind {
    Heap,
    Dma,
    SharedMemory,
    #[default]
    Unspecified,
}

/// Identifier of a texture owned by a render environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    /// Zero is never a valid texture
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    /// Byte length; zero for texture-only buffers
    pub len: usize,
    pub format: PixelFormat,
    pub color_space: ColorSpace,
}

impl BufferDescriptor {
    /// Tightly packed linear buffer
    pub fn linear(width: u32, height: u32, format: PixelFormat, color_space: ColorSpace) -> Self {
        let row_stride = format.min_row_stride(width);
        Self {
            width,
            height,
            row_stride,
            len: format.buffer_len(row_stride, height),
            format,
            color_space,
        }
    }

    /// Texture-only buffer: no stride or length
    pub fn texture(width: u32, height: u32, format: PixelFormat, color_space: ColorSpace) -> Self {
        Self {
            width,
            height,
            row_stride: 0,
            len: 0,
            format,
            color_space,
        }
    }

    pub fn with_row_stride(&self, row_stride: u32) -> Self {
        Self {
            row_stride,
            len: self.format.buffer_len(row_stride, self.height),
            ..self.clone()
        }
    }

    pub fn is_texture_only(&self) -> bool {
        self.len == 0 && self.row_stride == 0
    }

    /// Same pixel geometry and format
    pub fn same_shape(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

/// The single payload a buffer handle carries
#[derive(Debug, Clone)]
pub enum BufferSource {
    /// External pixel buffer locked for this stage
    PixelBuffer(PixelBuffer),
    /// Hardware surface; the allocation owns the mapping
    Surface(SurfaceInfo),
    /// Caller-supplied bytes of the given length
    Raw { len: usize },
    Texture(TextureId),
    /// File input; holds the decoded pixels once read
    Path {
        path: PathBuf,
        decoded: Option<PixelBuffer>,
    },
    Uri {
        uri: String,
        decoded: Option<PixelBuffer>,
    },
}

#[derive(Debug, Clone)]
pub struct BufferHandle {
    pub source: BufferSource,
    pub storage_kind: StorageKind,
    /// Storage belongs to the engine and is released after use
    pub auto_release: bool,
}

impl BufferHandle {
    pub fn texture(id: TextureId) -> Self {
        Self {
            source: BufferSource::Texture(id),
            storage_kind: StorageKind::Unspecified,
            auto_release: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EffectBuffer {
    pub descriptor: BufferDescriptor,
    pub handle: BufferHandle,
    /// Pixel memory; `None` for texture-only buffers
    pub data: Option<SharedMemoryData>,
}

impl EffectBuffer {
    /// Wrap an allocation made by the memory manager
    pub fn from_memory(data: SharedMemoryData) -> EffectResult<Self> {
        let (descriptor, storage_kind, auto_release) = {
            let guard = memory::read_shared(&data)?;
            (
                guard.info.descriptor.clone(),
                guard.info.storage_kind,
                guard.info.auto_release,
            )
        };
        Ok(Self {
            handle: BufferHandle {
                source: BufferSource::Raw {
                    len: descriptor.len,
                },
                storage_kind,
                auto_release,
            },
            descriptor,
            data: Some(data),
        })
    }

    /// Wrap caller-owned bytes
    pub fn from_bytes(descriptor: BufferDescriptor, bytes: Vec<u8>) -> EffectResult<Self> {
        let min_stride = descriptor.format.min_row_stride(descriptor.width);
        if !descriptor.is_texture_only() && descriptor.row_stride < min_stride {
            return Err(EffectError::InvalidParameter(format!(
                "row stride {} shorter than {min_stride} bytes of pixels",
                descriptor.row_stride
            )));
        }
        if bytes.len() < descriptor.len {
            return Err(EffectError::InvalidParameter(format!(
                "{} bytes supplied for a {} byte buffer",
                bytes.len(),
                descriptor.len
            )));
        }
        let len = bytes.len();
        let data = MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::Heap,
                descriptor: descriptor.clone(),
                auto_release: false,
            },
            Storage::Heap(bytes),
        )
        .into_shared();
        Ok(Self {
            descriptor,
            handle: BufferHandle {
                source: BufferSource::Raw { len },
                storage_kind: StorageKind::Heap,
                auto_release: false,
            },
            data: Some(data),
        })
    }

    /// Wrap a hardware surface buffer
    pub fn from_surface(surface: SurfaceBuffer, color_space: ColorSpace) -> EffectResult<Self> {
        let info = surface.info();
        let pixel_format = format::from_surface(info.format)
            .ok_or_else(|| EffectError::UnsupportedPixelFormat(format!("{:?}", info.format)))?;
        let descriptor = BufferDescriptor::linear(info.width, info.height, pixel_format, color_space)
            .with_row_stride(info.stride);
        let data = MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::Dma,
                descriptor: descriptor.clone(),
                auto_release: false,
            },
            Storage::Dma(surface),
        )
        .into_shared();
        Ok(Self {
            descriptor,
            handle: BufferHandle {
                source: BufferSource::Surface(info),
                storage_kind: StorageKind::Dma,
                auto_release: false,
            },
            data: Some(data),
        })
    }

    /// Texture-only buffer referring to a render environment texture
    pub fn from_texture(id: TextureId, descriptor: BufferDescriptor) -> Self {
        Self {
            descriptor,
            handle: BufferHandle::texture(id),
            data: None,
        }
    }

    /// Input or output named by path; the path is passed through untouched
    /// until a codec decodes it
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor: BufferDescriptor::texture(0, 0, PixelFormat::Default, ColorSpace::Default),
            handle: BufferHandle {
                source: BufferSource::Path {
                    path: path.into(),
                    decoded: None,
                },
                storage_kind: StorageKind::Unspecified,
                auto_release: false,
            },
            data: None,
        }
    }

    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            descriptor: BufferDescriptor::texture(0, 0, PixelFormat::Default, ColorSpace::Default),
            handle: BufferHandle {
                source: BufferSource::Uri {
                    uri: uri.into(),
                    decoded: None,
                },
                storage_kind: StorageKind::Unspecified,
                auto_release: false,
            },
            data: None,
        }
    }

    pub fn texture_id(&self) -> Option<TextureId> {
        match self.handle.source {
            BufferSource::Texture(id) => Some(id),
            _ => None,
        }
    }

    pub fn data(&self) -> EffectResult<&SharedMemoryData> {
        self.data.as_ref().ok_or(EffectError::ExtraInfoNull)
    }

    /// Copy of the pixel bytes, trimmed to the descriptor length
    pub fn to_bytes(&self) -> EffectResult<Vec<u8>> {
        let data = memory::read_shared(self.data()?)?;
        let bytes = data.bytes();
        Ok(bytes[..self.descriptor.len.min(bytes.len())].to_vec())
    }

    /// Same allocation backs both buffers
    pub fn shares_memory(&self, other: &EffectBuffer) -> bool {
        match (&self.data, &other.data) {
            (Some(a), Some(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_id_rejects_zero() {
        assert!(TextureId::new(0).is_none());
        assert_eq!(TextureId::new(7).map(TextureId::get), Some(7));
    }

    #[test]
    fn test_linear_descriptor_invariant() {
        let desc = BufferDescriptor::linear(5, 3, PixelFormat::Rgba8888, ColorSpace::Srgb);
        assert_eq!(desc.row_stride, 20);
        assert_eq!(desc.len, (desc.height * desc.row_stride) as usize);

        let padded = desc.with_row_stride(32);
        assert_eq!(padded.len, 96);
    }

    #[test]
    fn test_texture_descriptor_has_no_memory() {
        let desc = BufferDescriptor::texture(5, 3, PixelFormat::Rgba8888, ColorSpace::Srgb);
        assert!(desc.is_texture_only());
        let buffer = EffectBuffer::from_texture(TextureId::new(1).unwrap(), desc);
        assert!(buffer.data.is_none());
        assert_eq!(buffer.texture_id().map(TextureId::get), Some(1));
        assert!(matches!(buffer.to_bytes(), Err(EffectError::ExtraInfoNull)));
    }

    #[test]
    fn test_from_bytes_checks_length() {
        let desc = BufferDescriptor::linear(2, 2, PixelFormat::Rgba8888, ColorSpace::Srgb);
        assert!(EffectBuffer::from_bytes(desc.clone(), vec![0; 15]).is_err());
        let buffer = EffectBuffer::from_bytes(desc, vec![9; 16]).unwrap();
        assert_eq!(buffer.to_bytes().unwrap(), vec![9; 16]);
        assert_eq!(buffer.handle.storage_kind, StorageKind::Heap);
    }

    #[test]
    fn test_from_bytes_rejects_short_stride() {
        let desc = BufferDescriptor::linear(2, 2, PixelFormat::Rgba8888, ColorSpace::Srgb)
            .with_row_stride(4);
        assert!(matches!(
            EffectBuffer::from_bytes(desc, vec![0; 16]),
            Err(EffectError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_from_surface_uses_surface_stride() {
        let surface = SurfaceBuffer::new(4, 2, SurfaceFormat::Ycrcb420Sp).unwrap();
        let buffer = EffectBuffer::from_surface(surface, ColorSpace::Srgb).unwrap();
        assert_eq!(buffer.descriptor.format, PixelFormat::Nv21);
        assert_eq!(buffer.descriptor.row_stride, 64);
        assert_eq!(buffer.handle.storage_kind, StorageKind::Dma);
        assert!(matches!(buffer.handle.source, BufferSource::Surface(_)));
    }

    #[test]
    fn test_path_passes_through() {
        let buffer = EffectBuffer::from_path("/tmp/out.png");
        assert!(matches!(
            &buffer.handle.source,
            BufferSource::Path { decoded: None, .. }
        ));
        assert!(buffer.data.is_none());
    }
}
