// SPDX-License-Identifier: GPL-3.0-only

//! Image effect engine
//!
//! Runs chains of image filters over pixel buffers on the CPU or the GPU.
//!
//! # Architecture
//!
//! - [`buffer`]: pixel formats, color spaces, effect buffers and external pixel buffers
//! - [`memory`]: heap, DMA surface and shared-memory storage, allocation and write-back
//! - [`color`]: color space negotiation and conversion
//! - [`render`]: GPU render environment (mesh, programs, textures)
//! - [`filters`]: filter trait, built-in filters, delegates and the registry
//! - [`pipeline`]: filter chains and the standalone filter handle
//! - [`codec`]: image file decode and encode
//!
//! # Example
//!
//! ```no_run
//! use image_effect::{FilterHandle, PixelBuffer};
//!
//! let mut brightness = FilterHandle::create("Brightness").expect("built-in filter");
//! brightness.set_value("FilterIntensity", 40.0f32)?;
//! let pixels = PixelBuffer::from_rgba(1, 1, vec![10, 20, 30, 255])?;
//! brightness.render(&pixels, None)?;
//! # Ok::<(), image_effect::EffectError>(())
//! ```

pub mod buffer;
pub mod codec;
pub mod color;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod memory;
pub mod pipeline;
pub mod render;
pub mod shaders;
pub mod telemetry;

// Re-export commonly used types
pub use buffer::{ColorSpace, EffectBuffer, NativePixelFormat, PixelBuffer, PixelFormat};
pub use config::{EngineConfig, PathPreference};
pub use errors::{EffectError, EffectResult};
pub use filters::{Filter, FilterDelegate, ParamValue, ProcessingPath};
pub use pipeline::{EffectContext, FilterHandle, Pipeline};
