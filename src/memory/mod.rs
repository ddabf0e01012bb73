// SPDX-License-Identifier: GPL-3.0-only

//! Pixel storage for the three storage kinds and the manager that tracks
//! allocations for reuse.

pub mod allocator;
pub mod manager;
pub mod surface;

pub use allocator::{MemoryAllocator, create_allocator};
pub use manager::MemoryManager;
pub use surface::{SharedMemorySegment, SurfaceBuffer, SurfaceInfo};

use crate::buffer::{BufferDescriptor, StorageKind};
use crate::errors::{EffectError, EffectResult};
use std::os::fd::RawFd;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Allocation shared between an external pixel buffer and the effect
/// buffers wrapping it
pub type SharedMemoryData = Arc<RwLock<MemoryData>>;

/// Describes one allocation
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryInfo {
    pub storage_kind: StorageKind,
    pub descriptor: BufferDescriptor,
    /// Owned by the memory manager and released with it
    pub auto_release: bool,
}

/// Backing bytes of an allocation
#[derive(Debug)]
pub enum Storage {
    Heap(Vec<u8>),
    Dma(SurfaceBuffer),
    Shared(SharedMemorySegment),
}

/// Storage-specific context an allocation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraContext {
    None,
    Surface(SurfaceInfo),
    Fd(RawFd),
}

#[derive(Debug)]
pub struct MemoryData {
    pub info: MemoryInfo,
    storage: Storage,
}

impl MemoryData {
    pub fn new(info: MemoryInfo, storage: Storage) -> Self {
        Self { info, storage }
    }

    pub fn into_shared(self) -> SharedMemoryData {
        Arc::new(RwLock::new(self))
    }

    pub fn extra(&self) -> ExtraContext {
        match &self.storage {
            Storage::Heap(_) => ExtraContext::None,
            Storage::Dma(surface) => ExtraContext::Surface(surface.info()),
            Storage::Shared(segment) => ExtraContext::Fd(segment.fd()),
        }
    }

    pub fn has_surface(&self) -> bool {
        matches!(self.storage, Storage::Dma(_))
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Heap(bytes) => bytes,
            Storage::Dma(surface) => surface.as_slice(),
            Storage::Shared(segment) => segment.as_slice(),
        }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        match &mut self.storage {
            Storage::Heap(bytes) => bytes,
            Storage::Dma(surface) => surface.as_mut_slice(),
            Storage::Shared(segment) => segment.as_mut_slice(),
        }
    }
}

pub(crate) fn read_shared(
    data: &SharedMemoryData,
) -> EffectResult<RwLockReadGuard<'_, MemoryData>> {
    data.read()
        .map_err(|_| EffectError::AccessPixelsFailed("memory lock poisoned".into()))
}

pub(crate) fn write_shared(
    data: &SharedMemoryData,
) -> EffectResult<RwLockWriteGuard<'_, MemoryData>> {
    data.write()
        .map_err(|_| EffectError::AccessPixelsFailed("memory lock poisoned".into()))
}

/// `rows` rows of `row_bytes` bytes each, starting at `first_row`
pub(crate) fn rows_mut<'a>(
    bytes: &'a mut [u8],
    stride: usize,
    first_row: usize,
    rows: usize,
    row_bytes: usize,
) -> EffectResult<impl Iterator<Item = &'a mut [u8]>> {
    if rows > 0 && stride < row_bytes {
        return Err(EffectError::AccessPixelsFailed(format!(
            "row stride {stride} shorter than {row_bytes} bytes of pixels"
        )));
    }
    let len = bytes.len();
    let start = first_row * stride;
    let end = start + rows.saturating_sub(1) * stride + row_bytes;
    if rows > 0 && end > len {
        return Err(EffectError::AccessPixelsFailed(format!(
            "buffer of {len} bytes too small for {rows} rows of stride {stride}"
        )));
    }
    Ok(bytes[start.min(len)..]
        .chunks_mut(stride.max(1))
        .take(rows)
        .map(move |row| &mut row[..row_bytes]))
}

/// Copy pixels row by row between buffers of the same format and size,
/// honouring each side's row stride
pub fn copy_pixels(
    src: &[u8],
    src_desc: &BufferDescriptor,
    dst: &mut [u8],
    dst_desc: &BufferDescriptor,
) -> EffectResult<()> {
    if src_desc.format != dst_desc.format
        || src_desc.width != dst_desc.width
        || src_desc.height != dst_desc.height
    {
        return Err(EffectError::InvalidParameter(format!(
            "copy {}x{} {} into {}x{} {}",
            src_desc.width,
            src_desc.height,
            src_desc.format,
            dst_desc.width,
            dst_desc.height,
            dst_desc.format
        )));
    }
    let row_bytes = src_desc.format.min_row_stride(src_desc.width) as usize;
    let rows = src_desc.format.row_count(src_desc.height) as usize;
    let (src_stride, dst_stride) = (src_desc.row_stride as usize, dst_desc.row_stride as usize);

    if src_stride == dst_stride
        && src.len() >= rows * src_stride
        && dst.len() >= rows * dst_stride
    {
        let len = rows * src_stride;
        dst[..len].copy_from_slice(&src[..len]);
        return Ok(());
    }

    for row in 0..rows {
        let s = row * src_stride;
        let d = row * dst_stride;
        let (Some(src_row), Some(dst_row)) = (
            src.get(s..s + row_bytes),
            dst.get_mut(d..d + row_bytes),
        ) else {
            return Err(EffectError::AccessPixelsFailed(format!(
                "row {row} out of bounds (src {} bytes, dst {} bytes)",
                src.len(),
                dst.len()
            )));
        };
        dst_row.copy_from_slice(src_row);
    }
    Ok(())
}
