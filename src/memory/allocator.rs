// SPDX-License-Identifier: GPL-3.0-only

//! One allocator per storage kind

use super::surface::{SharedMemorySegment, SurfaceBuffer};
use super::{MemoryData, MemoryInfo, Storage};
use crate::buffer::format;
use crate::buffer::{BufferDescriptor, StorageKind};
use crate::errors::{EffectError, EffectResult};
use tracing::debug;

pub trait MemoryAllocator: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Allocate zeroed storage sized for `descriptor`. The returned
    /// descriptor may carry a wider row stride than requested.
    fn allocate(&self, descriptor: &BufferDescriptor) -> EffectResult<MemoryData>;
}

pub struct HeapAllocator;

impl MemoryAllocator for HeapAllocator {
    fn kind(&self) -> StorageKind {
        StorageKind::Heap
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> EffectResult<MemoryData> {
        if descriptor.len == 0 {
            return Err(EffectError::AllocMemoryFailed("zero-length heap buffer".into()));
        }
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(descriptor.len)
            .map_err(|e| EffectError::AllocMemoryFailed(e.to_string()))?;
        bytes.resize(descriptor.len, 0);
        Ok(MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::Heap,
                descriptor: descriptor.clone(),
                auto_release: true,
            },
            Storage::Heap(bytes),
        ))
    }
}

pub struct DmaAllocator;

impl MemoryAllocator for DmaAllocator {
    fn kind(&self) -> StorageKind {
        StorageKind::Dma
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> EffectResult<MemoryData> {
        let surface_format = format::to_surface(descriptor.format)
            .ok_or_else(|| EffectError::UnsupportedPixelFormat(descriptor.format.to_string()))?;
        let surface = SurfaceBuffer::new(descriptor.width, descriptor.height, surface_format)?;
        let descriptor = descriptor.with_row_stride(surface.stride());
        debug!(
            width = descriptor.width,
            height = descriptor.height,
            stride = descriptor.row_stride,
            "Allocated surface buffer"
        );
        Ok(MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::Dma,
                descriptor,
                auto_release: true,
            },
            Storage::Dma(surface),
        ))
    }
}

pub struct SharedMemoryAllocator;

impl MemoryAllocator for SharedMemoryAllocator {
    fn kind(&self) -> StorageKind {
        StorageKind::SharedMemory
    }

    fn allocate(&self, descriptor: &BufferDescriptor) -> EffectResult<MemoryData> {
        let segment = SharedMemorySegment::new(descriptor.len)?;
        Ok(MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::SharedMemory,
                descriptor: descriptor.clone(),
                auto_release: true,
            },
            Storage::Shared(segment),
        ))
    }
}

/// Allocator for a storage kind; `Unspecified` has none
pub fn create_allocator(kind: StorageKind) -> EffectResult<Box<dyn MemoryAllocator>> {
    match kind {
        StorageKind::Heap => Ok(Box::new(HeapAllocator)),
        StorageKind::Dma => Ok(Box::new(DmaAllocator)),
        StorageKind::SharedMemory => Ok(Box::new(SharedMemoryAllocator)),
        StorageKind::Unspecified => Err(EffectError::CreateMemoryFailed(
            "no allocator for unspecified storage".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ColorSpace, PixelFormat};
    use crate::memory::ExtraContext;

    fn rgba(width: u32, height: u32) -> BufferDescriptor {
        BufferDescriptor::linear(width, height, PixelFormat::Rgba8888, ColorSpace::Srgb)
    }

    #[test]
    fn test_every_kind_allocates() {
        for kind in [StorageKind::Heap, StorageKind::Dma, StorageKind::SharedMemory] {
            let allocator = create_allocator(kind).unwrap();
            let data = allocator.allocate(&rgba(3, 2)).unwrap();
            assert_eq!(data.info.storage_kind, kind);
            assert!(data.bytes().len() >= data.info.descriptor.len);
            assert!(data.bytes().iter().all(|b| *b == 0));
        }
    }

    #[test]
    fn test_dma_widens_stride() {
        let data = DmaAllocator.allocate(&rgba(3, 2)).unwrap();
        assert_eq!(data.info.descriptor.row_stride, 64);
        assert!(matches!(data.extra(), ExtraContext::Surface(_)));
    }

    #[test]
    fn test_unspecified_has_no_allocator() {
        assert!(matches!(
            create_allocator(StorageKind::Unspecified),
            Err(EffectError::CreateMemoryFailed(_))
        ));
    }

    #[test]
    fn test_heap_rejects_empty() {
        let desc = BufferDescriptor::texture(4, 4, PixelFormat::Rgba8888, ColorSpace::Srgb);
        assert!(HeapAllocator.allocate(&desc).is_err());
    }
}
