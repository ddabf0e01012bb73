// SPDX-License-Identifier: GPL-3.0-only

//! GPU initialization utilities for the render environment.
//!
//! Device creation is asynchronous in wgpu; the engine is synchronous, so
//! callers drive these futures with `pollster::block_on`.

use crate::config::PowerPreference;
use crate::errors::{EffectError, EffectResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, ...)
    pub backend: wgpu::Backend,
}

/// Device, queue and adapter description
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub info: GpuDeviceInfo,
}

/// Create a wgpu device and queue for off-screen rendering.
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
/// * `power` - Adapter preference
pub async fn create_device(label: &str, power: PowerPreference) -> EffectResult<GpuContext> {
    info!(label = label, ?power, "Creating GPU device for rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power.into(),
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| EffectError::Gpu(format!("Failed to find suitable GPU adapter: {e}")))?;

    let adapter_info = adapter.get_info();

    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for rendering"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| EffectError::Gpu(format!("Failed to create GPU device: {e}")))?;

    debug!(backend = ?adapter_info.backend, "GPU device created");

    Ok(GpuContext {
        device: Arc::new(device),
        queue: Arc::new(queue),
        info: GpuDeviceInfo {
            adapter_name: adapter_info.name,
            backend: adapter_info.backend,
        },
    })
}

/// Run `create` inside a validation error scope and report any captured
/// error instead of panicking in the uncaptured-error handler
pub fn checked<T>(
    device: &wgpu::Device,
    what: &str,
    create: impl FnOnce() -> T,
) -> EffectResult<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(error) => {
            tracing::error!(what, %error, "GPU object creation failed");
            Err(EffectError::Gpu(format!("{what}: {error}")))
        }
    }
}

/// Helper for async buffer readback (map, poll, read, unmap)
///
/// # Arguments
/// * `device` - The wgpu device for polling
/// * `buffer` - The buffer to read from (must be MAP_READ)
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> EffectResult<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| EffectError::Gpu("Failed to receive buffer mapping".to_string()))?
        .map_err(|e| EffectError::Gpu(format!("Failed to map buffer: {e:?}")))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

/// Row pitch for texture-to-buffer copies
#[inline]
pub fn padded_bytes_per_row(unpadded: u32) -> u32 {
    unpadded.next_multiple_of(crate::constants::COPY_BYTES_PER_ROW_ALIGNMENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(4), 256);
        assert_eq!(padded_bytes_per_row(256), 256);
        assert_eq!(padded_bytes_per_row(1028), 1280);
    }

    #[test]
    fn test_create_device() {
        // This test requires a GPU, so it may be skipped in CI
        match pollster::block_on(create_device("test_device", PowerPreference::LowPower)) {
            Ok(context) => {
                println!("Created device: {:?}", context.info);
                // Device and queue should be usable
                drop(context);
            }
            Err(e) => {
                // Skip if no GPU available
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
