// SPDX-License-Identifier: GPL-3.0-only

//! External pixel buffers and the lock/unlock cycle that exposes them to
//! the engine as [`EffectBuffer`]s.

use super::format::{self, ColorSpace, NativePixelFormat, PixelFormat};
use super::{BufferDescriptor, BufferHandle, BufferSource, EffectBuffer, StorageKind};
use crate::errors::{EffectError, EffectResult};
use crate::memory::{self, MemoryData, MemoryInfo, SharedMemoryData, Storage, create_allocator};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Allocator an external buffer was created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocatorKind {
    Heap,
    Dma,
    SharedMemory,
}

static ALLOCATOR_KINDS: [(AllocatorKind, StorageKind); 3] = [
    (AllocatorKind::Heap, StorageKind::Heap),
    (AllocatorKind::Dma, StorageKind::Dma),
    (AllocatorKind::SharedMemory, StorageKind::SharedMemory),
];

impl AllocatorKind {
    pub fn storage_kind(self) -> StorageKind {
        ALLOCATOR_KINDS
            .iter()
            .find(|(a, _)| *a == self)
            .map_or(StorageKind::Unspecified, |(_, kind)| *kind)
    }

    pub fn from_storage_kind(kind: StorageKind) -> Option<Self> {
        ALLOCATOR_KINDS
            .iter()
            .find(|(_, k)| *k == kind)
            .map(|(allocator, _)| *allocator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBufferInfo {
    pub width: u32,
    pub height: u32,
    pub row_stride: u32,
    pub format: NativePixelFormat,
}

#[derive(Debug)]
struct PixelBufferState {
    info: PixelBufferInfo,
    color_space: ColorSpace,
    allocator: AllocatorKind,
    memory: Option<SharedMemoryData>,
    /// Image metadata, when the buffer carries any
    properties: Option<BTreeMap<String, String>>,
    lock_count: u32,
}

/// Handle to a caller-owned pixel buffer
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    state: Arc<Mutex<PixelBufferState>>,
}

fn descriptor_for(
    width: u32,
    height: u32,
    native: NativePixelFormat,
    color_space: ColorSpace,
) -> BufferDescriptor {
    match format::from_native(native) {
        Some(pixel_format) => BufferDescriptor::linear(width, height, pixel_format, color_space),
        None => BufferDescriptor::linear(width, height, PixelFormat::Default, color_space)
            .with_row_stride(width * native.bytes_per_pixel()),
    }
}

impl PixelBuffer {
    /// Allocate a zeroed buffer with the given allocator
    pub fn new(
        width: u32,
        height: u32,
        native: NativePixelFormat,
        allocator: AllocatorKind,
    ) -> EffectResult<Self> {
        let descriptor = descriptor_for(width, height, native, ColorSpace::Srgb);
        let mut data = create_allocator(allocator.storage_kind())?.allocate(&descriptor)?;
        data.info.auto_release = false;
        let row_stride = data.info.descriptor.row_stride;
        Ok(Self::from_state(PixelBufferState {
            info: PixelBufferInfo {
                width,
                height,
                row_stride,
                format: native,
            },
            color_space: ColorSpace::Srgb,
            allocator,
            memory: Some(data.into_shared()),
            properties: None,
            lock_count: 0,
        }))
    }

    /// Heap buffer over existing bytes
    pub fn from_bytes(
        width: u32,
        height: u32,
        native: NativePixelFormat,
        row_stride: u32,
        bytes: Vec<u8>,
    ) -> EffectResult<Self> {
        let descriptor = descriptor_for(width, height, native, ColorSpace::Srgb)
            .with_row_stride(row_stride);
        if row_stride < width * native.bytes_per_pixel() || bytes.len() < descriptor.len {
            return Err(EffectError::InvalidParameter(format!(
                "{} bytes with stride {row_stride} for {width}x{height} {native:?}",
                bytes.len()
            )));
        }
        let data = MemoryData::new(
            MemoryInfo {
                storage_kind: StorageKind::Heap,
                descriptor,
                auto_release: false,
            },
            Storage::Heap(bytes),
        );
        Ok(Self::from_state(PixelBufferState {
            info: PixelBufferInfo {
                width,
                height,
                row_stride,
                format: native,
            },
            color_space: ColorSpace::Srgb,
            allocator: AllocatorKind::Heap,
            memory: Some(data.into_shared()),
            properties: None,
            lock_count: 0,
        }))
    }

    /// Tightly packed RGBA8888 heap buffer
    pub fn from_rgba(width: u32, height: u32, bytes: Vec<u8>) -> EffectResult<Self> {
        Self::from_bytes(width, height, NativePixelFormat::Rgba8888, width * 4, bytes)
    }

    fn from_state(state: PixelBufferState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn state(&self) -> EffectResult<MutexGuard<'_, PixelBufferState>> {
        self.state
            .lock()
            .map_err(|_| EffectError::AccessPixelsFailed("pixel buffer lock poisoned".into()))
    }

    /// Enable the image metadata map
    pub fn with_properties(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.properties.get_or_insert_with(BTreeMap::new);
        }
        self
    }

    /// Declare the allocator without changing the storage behind it
    pub fn with_allocator_kind(self, allocator: AllocatorKind) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.allocator = allocator;
        }
        self
    }

    pub fn with_color_space(self, color_space: ColorSpace) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.color_space = color_space;
        }
        self
    }

    /// Drop the pixel memory; later locks fail
    pub fn release_pixels(&self) -> EffectResult<()> {
        self.state()?.memory = None;
        Ok(())
    }

    pub fn info(&self) -> EffectResult<PixelBufferInfo> {
        Ok(self.state()?.info)
    }

    pub fn color_space(&self) -> EffectResult<ColorSpace> {
        Ok(self.state()?.color_space)
    }

    pub fn allocator(&self) -> EffectResult<AllocatorKind> {
        Ok(self.state()?.allocator)
    }

    pub fn lock_count(&self) -> u32 {
        self.state.lock().map_or(0, |state| state.lock_count)
    }

    pub fn properties(&self) -> Option<BTreeMap<String, String>> {
        self.state.lock().ok()?.properties.clone()
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.state.lock().ok()?.properties.as_ref()?.get(key).cloned()
    }

    pub(crate) fn memory(&self) -> EffectResult<Option<SharedMemoryData>> {
        Ok(self.state()?.memory.clone())
    }

    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Copy of the pixel bytes covered by the buffer geometry
    pub fn to_bytes(&self) -> EffectResult<Vec<u8>> {
        let (memory, len) = {
            let state = self.state()?;
            let memory = state
                .memory
                .clone()
                .ok_or_else(|| EffectError::AccessPixelsFailed("no pixel memory".into()))?;
            let rows = format::from_native(state.info.format)
                .map_or(state.info.height, |f| f.row_count(state.info.height));
            (memory, state.info.row_stride as usize * rows as usize)
        };
        let data = memory::read_shared(&memory)?;
        let bytes = data.bytes();
        Ok(bytes[..len.min(bytes.len())].to_vec())
    }

    /// Replace the pixel memory and geometry with an engine allocation
    pub(crate) fn adopt(&self, memory: SharedMemoryData) -> EffectResult<()> {
        let descriptor = memory::read_shared(&memory)?.info.descriptor.clone();
        let native = format::to_native(descriptor.format).ok_or_else(|| {
            EffectError::SetImageInfoFailed(format!("no native format for {}", descriptor.format))
        })?;
        let mut state = self.state()?;
        state.info = PixelBufferInfo {
            width: descriptor.width,
            height: descriptor.height,
            row_stride: descriptor.row_stride,
            format: native,
        };
        state.color_space = descriptor.color_space;
        state.memory = Some(memory);
        Ok(())
    }

    /// Refresh geometry from an allocation already shared with this buffer
    pub(crate) fn refresh_info(&self, descriptor: &BufferDescriptor) -> EffectResult<()> {
        let native = format::to_native(descriptor.format).ok_or_else(|| {
            EffectError::SetImageInfoFailed(format!("no native format for {}", descriptor.format))
        })?;
        let mut state = self.state()?;
        state.info = PixelBufferInfo {
            width: descriptor.width,
            height: descriptor.height,
            row_stride: descriptor.row_stride,
            format: native,
        };
        state.color_space = descriptor.color_space;
        Ok(())
    }

    /// Set metadata entries; no-op when the buffer carries no metadata
    pub(crate) fn update_properties(&self, entries: &[(&str, String)]) -> EffectResult<bool> {
        let mut state = self.state()?;
        let Some(properties) = state.properties.as_mut() else {
            return Ok(false);
        };
        for (key, value) in entries {
            properties.insert((*key).to_string(), value.clone());
        }
        Ok(true)
    }

    fn unlock_once(&self) {
        match self.state.lock() {
            Ok(mut state) => {
                if state.lock_count == 0 {
                    warn!("Unlock without matching lock");
                } else {
                    state.lock_count -= 1;
                }
            }
            Err(_) => warn!("Pixel buffer lock poisoned during unlock"),
        }
    }
}

/// A locked pixel buffer; unlocked when dropped
#[derive(Debug)]
pub struct LockedBuffer {
    owner: PixelBuffer,
    buffer: EffectBuffer,
}

impl LockedBuffer {
    pub fn buffer(&self) -> &EffectBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut EffectBuffer {
        &mut self.buffer
    }

    pub fn pixel_buffer(&self) -> &PixelBuffer {
        &self.owner
    }

    pub fn unlock(self) {}
}

impl Drop for LockedBuffer {
    fn drop(&mut self) {
        self.owner.unlock_once();
    }
}

/// Expose an external pixel buffer as an effect buffer
pub fn lock(pixel_buffer: &PixelBuffer) -> EffectResult<LockedBuffer> {
    let mut state = pixel_buffer.state()?;

    let pixel_format = format::from_native(state.info.format)
        .ok_or_else(|| EffectError::UnsupportedPixelFormat(format!("{:?}", state.info.format)))?;
    let memory = state
        .memory
        .clone()
        .ok_or_else(|| EffectError::AccessPixelsFailed("pixel buffer has no memory".into()))?;

    let has_surface = memory::read_shared(&memory)?.has_surface();
    let storage_kind = match state.allocator {
        AllocatorKind::Dma if !has_surface => {
            debug!("DMA buffer without surface, treating as unspecified storage");
            StorageKind::Unspecified
        }
        allocator => allocator.storage_kind(),
    };

    let descriptor = BufferDescriptor::linear(
        state.info.width,
        state.info.height,
        pixel_format,
        state.color_space,
    )
    .with_row_stride(state.info.row_stride);
    memory::write_shared(&memory)?.info.descriptor = descriptor.clone();

    state.lock_count += 1;
    drop(state);

    Ok(LockedBuffer {
        owner: pixel_buffer.clone(),
        buffer: EffectBuffer {
            descriptor,
            handle: BufferHandle {
                source: BufferSource::PixelBuffer(pixel_buffer.clone()),
                storage_kind,
                auto_release: false,
            },
            data: Some(memory),
        },
    })
}

/// Release a lock taken by [`lock`]
pub fn unlock(locked: LockedBuffer) {
    drop(locked);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_exposes_same_memory() {
        let pixels = PixelBuffer::from_rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let locked = lock(&pixels).unwrap();
        assert_eq!(pixels.lock_count(), 1);
        assert_eq!(locked.buffer().descriptor.format, PixelFormat::Rgba8888);
        assert_eq!(locked.buffer().handle.storage_kind, StorageKind::Heap);
        assert_eq!(locked.buffer().to_bytes().unwrap(), pixels.to_bytes().unwrap());
        drop(locked);
        assert_eq!(pixels.lock_count(), 0);
    }

    #[test]
    fn test_unmapped_format_fails_without_locking() {
        let pixels =
            PixelBuffer::from_bytes(1, 1, NativePixelFormat::Bgra8888, 4, vec![0; 4]).unwrap();
        assert!(matches!(
            lock(&pixels),
            Err(EffectError::UnsupportedPixelFormat(_))
        ));
        assert_eq!(pixels.lock_count(), 0);
    }

    #[test]
    fn test_released_pixels_fail_access() {
        let pixels = PixelBuffer::from_rgba(1, 1, vec![0; 4]).unwrap();
        pixels.release_pixels().unwrap();
        assert!(matches!(
            lock(&pixels),
            Err(EffectError::AccessPixelsFailed(_))
        ));
    }

    #[test]
    fn test_dma_without_surface_is_unspecified() {
        let pixels = PixelBuffer::from_rgba(1, 1, vec![0; 4])
            .unwrap()
            .with_allocator_kind(AllocatorKind::Dma);
        let locked = lock(&pixels).unwrap();
        assert_eq!(locked.buffer().handle.storage_kind, StorageKind::Unspecified);
    }

    #[test]
    fn test_dma_with_surface_is_dma() {
        let pixels = PixelBuffer::new(4, 4, NativePixelFormat::Nv12, AllocatorKind::Dma).unwrap();
        let locked = lock(&pixels).unwrap();
        assert_eq!(locked.buffer().handle.storage_kind, StorageKind::Dma);
        assert_eq!(locked.buffer().descriptor.row_stride, 64);
    }

    #[test]
    fn test_allocator_table() {
        assert_eq!(AllocatorKind::SharedMemory.storage_kind(), StorageKind::SharedMemory);
        assert_eq!(AllocatorKind::from_storage_kind(StorageKind::Unspecified), None);
    }

    #[test]
    fn test_properties_absent_by_default() {
        let pixels = PixelBuffer::from_rgba(1, 1, vec![0; 4]).unwrap();
        assert!(!pixels.update_properties(&[("ImageWidth", "1".into())]).unwrap());
        let pixels = pixels.with_properties();
        assert!(pixels.update_properties(&[("ImageWidth", "1".into())]).unwrap());
        assert_eq!(pixels.property("ImageWidth").as_deref(), Some("1"));
    }
}
