// SPDX-License-Identifier: GPL-3.0-only

//! File-descriptor backed storage: DMA-style surface buffers and shared
//! memory segments, both mapped from an anonymous memfd.

use crate::buffer::format::{self, SurfaceFormat};
use crate::constants::SURFACE_STRIDE_ALIGNMENT;
use crate::errors::{EffectError, EffectResult};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;
use tracing::debug;

/// A shared read/write mapping of an fd
#[derive(Debug)]
struct MappedRegion {
    fd: OwnedFd,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory owned by this struct; access goes through &self / &mut self.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    fn new(name: &str, len: usize) -> EffectResult<Self> {
        if len == 0 {
            return Err(EffectError::CreateMemoryFailed(format!(
                "{name}: zero-length mapping"
            )));
        }
        let c_name = CString::new(name)
            .map_err(|_| EffectError::CreateMemoryFailed(format!("{name}: invalid name")))?;

        let raw = unsafe { libc::memfd_create(c_name.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(EffectError::InvalidFileDescriptor(format!(
                "memfd_create({name}) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let result = unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) };
        if result < 0 {
            return Err(EffectError::AllocMemoryFailed(format!(
                "ftruncate({name}, {len}) failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(EffectError::AllocMemoryFailed(format!(
                "mmap({name}, {len}) failed: {}",
                std::io::Error::last_os_error()
            )));
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| EffectError::AllocMemoryFailed(format!("{name}: null mapping")))?;

        debug!(name, len, fd = fd.as_raw_fd(), "Mapped memfd region");
        Ok(Self { fd, ptr, len })
    }

    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let result = unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) };
        if result != 0 {
            tracing::warn!(len = self.len, "munmap failed");
        }
    }
}

/// Geometry and fd of a surface buffer, carried by buffer handles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub fd: RawFd,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: SurfaceFormat,
}

/// Hardware-style surface buffer with an aligned row stride
#[derive(Debug)]
pub struct SurfaceBuffer {
    region: MappedRegion,
    width: u32,
    height: u32,
    stride: u32,
    format: SurfaceFormat,
}

impl SurfaceBuffer {
    pub fn new(width: u32, height: u32, surface_format: SurfaceFormat) -> EffectResult<Self> {
        let pixel_format = format::from_surface(surface_format).ok_or_else(|| {
            EffectError::UnsupportedPixelFormat(format!("{surface_format:?}"))
        })?;
        if width == 0 || height == 0 {
            return Err(EffectError::InvalidSurfaceBuffer(format!(
                "{width}x{height} surface"
            )));
        }
        let stride = pixel_format
            .min_row_stride(width)
            .next_multiple_of(SURFACE_STRIDE_ALIGNMENT);
        let len = pixel_format.buffer_len(stride, height);
        let region = MappedRegion::new("effect-surface", len)?;
        Ok(Self {
            region,
            width,
            height,
            stride,
            format: surface_format,
        })
    }

    pub fn info(&self) -> SurfaceInfo {
        SurfaceInfo {
            fd: self.region.fd.as_raw_fd(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
        }
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }
}

/// Shared memory segment addressed by its fd
#[derive(Debug)]
pub struct SharedMemorySegment {
    region: MappedRegion,
}

impl SharedMemorySegment {
    pub fn new(len: usize) -> EffectResult<Self> {
        Ok(Self {
            region: MappedRegion::new("effect-ashmem", len)?,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.region.fd.as_raw_fd()
    }

    pub fn len(&self) -> usize {
        self.region.len
    }

    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.region.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }
}
