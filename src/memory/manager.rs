// SPDX-License-Identifier: GPL-3.0-only

//! Allocation tracking, reuse and write-back into external pixel buffers

use super::{SharedMemoryData, copy_pixels, create_allocator, read_shared, write_shared};
use crate::buffer::{BufferDescriptor, PixelBuffer, StorageKind};
use crate::constants::exif;
use crate::errors::{EffectError, EffectResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

fn address_of(data: &SharedMemoryData) -> usize {
    Arc::as_ptr(data) as *const () as usize
}

/// Owns engine allocations for one pipeline run
#[derive(Debug)]
pub struct MemoryManager {
    allocations: HashMap<usize, SharedMemoryData>,
    reuse_allocations: bool,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MemoryManager {
    pub fn new(reuse_allocations: bool) -> Self {
        Self {
            allocations: HashMap::new(),
            reuse_allocations,
        }
    }

    /// Allocate storage of `kind` for `descriptor` and track it
    pub fn allocate(
        &mut self,
        kind: StorageKind,
        descriptor: &BufferDescriptor,
    ) -> EffectResult<SharedMemoryData> {
        let allocator = create_allocator(kind)?;
        let data = allocator.allocate(descriptor)?.into_shared();
        debug!(
            ?kind,
            width = descriptor.width,
            height = descriptor.height,
            format = %descriptor.format,
            "Allocated memory"
        );
        self.allocations.insert(address_of(&data), Arc::clone(&data));
        Ok(data)
    }

    /// Tracked allocation at the same address, if any
    pub fn find(&self, data: &SharedMemoryData) -> Option<SharedMemoryData> {
        self.allocations.get(&address_of(data)).cloned()
    }

    /// The existing allocation when its kind already matches, else `None`
    pub fn reuse(
        &self,
        existing: &SharedMemoryData,
        required: StorageKind,
    ) -> Option<SharedMemoryData> {
        if !self.reuse_allocations {
            return None;
        }
        let kind = read_shared(existing).ok()?.info.storage_kind;
        (kind == required).then(|| Arc::clone(existing))
    }

    /// Fresh allocation of `kind` holding a copy of `src`
    pub fn duplicate(
        &mut self,
        src: &SharedMemoryData,
        kind: StorageKind,
    ) -> EffectResult<SharedMemoryData> {
        let src_guard = read_shared(src)?;
        let src_desc = src_guard.info.descriptor.clone();
        let dst = self.allocate(kind, &src_desc)?;
        {
            let mut dst_guard = write_shared(&dst)?;
            let dst_desc = dst_guard.info.descriptor.clone();
            copy_pixels(src_guard.bytes(), &src_desc, dst_guard.bytes_mut(), &dst_desc)?;
        }
        Ok(dst)
    }

    /// Hand the pixels in `memory` to `target`, reusing the allocation when
    /// its storage kind matches the target's, and refresh the target's
    /// geometry and image metadata
    pub fn write_back(
        &mut self,
        memory: &SharedMemoryData,
        target: &PixelBuffer,
    ) -> EffectResult<()> {
        let descriptor = read_shared(memory)?.info.descriptor.clone();
        let current = target.memory()?;

        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, memory)) {
            debug!("Output already shares the pixel memory");
            target.refresh_info(&descriptor)?;
        } else {
            let target_kind = target.allocator()?.storage_kind();
            let adopted = match self.reuse(memory, target_kind) {
                Some(reused) => reused,
                None => self.duplicate(memory, target_kind)?,
            };
            // The pixel buffer now owns it.
            write_shared(&adopted)?.info.auto_release = false;
            self.allocations.remove(&address_of(&adopted));
            target.adopt(adopted)?;
        }

        update_image_metadata(target, &descriptor)?;
        Ok(())
    }

    /// Drop the tracked allocation
    pub fn release(&mut self, data: &SharedMemoryData) -> bool {
        self.allocations.remove(&address_of(data)).is_some()
    }

    pub fn release_all(&mut self) {
        if !self.allocations.is_empty() {
            info!(count = self.allocations.len(), "Releasing tracked allocations");
        }
        self.allocations.clear();
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}

fn update_image_metadata(target: &PixelBuffer, descriptor: &BufferDescriptor) -> EffectResult<()> {
    let timestamp = chrono::Local::now()
        .format(exif::DATE_TIME_FORMAT)
        .to_string();
    let width = descriptor.width.to_string();
    let height = descriptor.height.to_string();
    let updated = target
        .update_properties(&[
            (exif::IMAGE_WIDTH, width.clone()),
            (exif::IMAGE_LENGTH, height.clone()),
            (exif::PIXEL_X_DIMENSION, width),
            (exif::PIXEL_Y_DIMENSION, height),
            (exif::DATE_TIME, timestamp),
        ])
        .map_err(|e| EffectError::SetImageInfoFailed(e.to_string()))?;
    if updated {
        debug!("Updated output image metadata");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{AllocatorKind, ColorSpace, NativePixelFormat, PixelFormat, lock};

    fn rgba(width: u32, height: u32) -> BufferDescriptor {
        BufferDescriptor::linear(width, height, PixelFormat::Rgba8888, ColorSpace::Srgb)
    }

    #[test]
    fn test_allocate_tracks_by_address() {
        let mut manager = MemoryManager::default();
        let data = manager.allocate(StorageKind::Heap, &rgba(2, 2)).unwrap();
        assert_eq!(manager.len(), 1);
        assert!(manager.find(&data).is_some());
        assert!(manager.release(&data));
        assert!(manager.find(&data).is_none());
    }

    #[test]
    fn test_reuse_requires_matching_kind() {
        let mut manager = MemoryManager::default();
        let data = manager.allocate(StorageKind::SharedMemory, &rgba(2, 2)).unwrap();
        assert!(manager.reuse(&data, StorageKind::SharedMemory).is_some());
        assert!(manager.reuse(&data, StorageKind::Heap).is_none());

        let no_reuse = MemoryManager::new(false);
        assert!(no_reuse.reuse(&data, StorageKind::SharedMemory).is_none());
    }

    #[test]
    fn test_write_back_copies_across_kinds() {
        let mut manager = MemoryManager::default();
        let data = manager.allocate(StorageKind::Heap, &rgba(2, 2)).unwrap();
        write_shared(&data).unwrap().bytes_mut().fill(7);

        let target = PixelBuffer::new(2, 2, NativePixelFormat::Rgba8888, AllocatorKind::Dma)
            .unwrap()
            .with_properties();
        manager.write_back(&data, &target).unwrap();

        let info = target.info().unwrap();
        assert_eq!(info.row_stride, 64);
        let locked = lock(&target).unwrap();
        assert_eq!(locked.buffer().handle.storage_kind, StorageKind::Dma);
        let bytes = target.to_bytes().unwrap();
        assert_eq!(&bytes[0..8], &[7; 8]);
        assert_eq!(&bytes[64..72], &[7; 8]);
        assert_eq!(target.property(exif::IMAGE_WIDTH).as_deref(), Some("2"));
        assert!(target.property(exif::DATE_TIME).is_some());
    }

    #[test]
    fn test_write_back_reuses_same_kind() {
        let mut manager = MemoryManager::default();
        let data = manager.allocate(StorageKind::Heap, &rgba(1, 1)).unwrap();
        let target = PixelBuffer::from_rgba(3, 3, vec![0; 36]).unwrap();

        manager.write_back(&data, &target).unwrap();

        assert!(Arc::ptr_eq(&target.memory().unwrap().unwrap(), &data));
        assert_eq!(target.info().unwrap().width, 1);
        assert!(manager.is_empty());
    }
}
