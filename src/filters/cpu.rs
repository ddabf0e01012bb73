// SPDX-License-Identifier: GPL-3.0-only

//! CPU algorithm helpers shared by the built-in filters

use crate::buffer::{BufferDescriptor, EffectBuffer, PixelFormat};
use crate::errors::{EffectError, EffectResult};
use crate::memory::{self, copy_pixels, rows_mut};

/// 8-bit lookup table built from a per-value mapping
pub fn build_lut(map: impl Fn(f32) -> f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = map(i as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Map color channels of `src` through `lut` into `dst`. RGBA keeps alpha;
/// semi-planar YUV maps the luma plane and copies chroma.
pub fn apply_channel_lut(
    src: &EffectBuffer,
    dst: &mut EffectBuffer,
    lut: &[u8; 256],
) -> EffectResult<()> {
    if src.shares_memory(dst) {
        let mut guard = memory::write_shared(dst.data()?)?;
        return apply_in_place(guard.bytes_mut(), &src.descriptor, lut);
    }

    let src_guard = memory::read_shared(src.data()?)?;
    let mut dst_guard = memory::write_shared(dst.data()?)?;
    copy_pixels(
        src_guard.bytes(),
        &src.descriptor,
        dst_guard.bytes_mut(),
        &dst.descriptor,
    )?;
    drop(src_guard);
    apply_in_place(dst_guard.bytes_mut(), &dst.descriptor, lut)
}

fn apply_in_place(
    bytes: &mut [u8],
    desc: &BufferDescriptor,
    lut: &[u8; 256],
) -> EffectResult<()> {
    let stride = desc.row_stride as usize;
    let width = desc.width as usize;
    let height = desc.height as usize;
    match desc.format {
        PixelFormat::Rgba8888 => {
            for row in rows_mut(bytes, stride, 0, height, width * 4)? {
                for px in row.chunks_exact_mut(4) {
                    px[0] = lut[px[0] as usize];
                    px[1] = lut[px[1] as usize];
                    px[2] = lut[px[2] as usize];
                }
            }
        }
        PixelFormat::Nv12 | PixelFormat::Nv21 => {
            for row in rows_mut(bytes, stride, 0, height, width)? {
                for y in row {
                    *y = lut[*y as usize];
                }
            }
        }
        other => return Err(EffectError::UnsupportedPixelFormat(other.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ColorSpace;

    fn rgba_buffer(pixels: Vec<u8>, width: u32, height: u32) -> EffectBuffer {
        let desc = BufferDescriptor::linear(width, height, PixelFormat::Rgba8888, ColorSpace::Srgb);
        EffectBuffer::from_bytes(desc, pixels).unwrap()
    }

    #[test]
    fn test_build_lut_clamps() {
        let lut = build_lut(|v| v + 100.0);
        assert_eq!(lut[0], 100);
        assert_eq!(lut[155], 255);
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn test_rgba_keeps_alpha_in_place() {
        let src = rgba_buffer(vec![10, 20, 30, 40], 1, 1);
        let mut dst = src.clone();
        apply_channel_lut(&src, &mut dst, &build_lut(|v| v * 2.0)).unwrap();
        assert_eq!(dst.to_bytes().unwrap(), vec![20, 40, 60, 40]);
        assert_eq!(src.to_bytes().unwrap(), vec![20, 40, 60, 40]);
    }

    #[test]
    fn test_separate_destination_leaves_source() {
        let src = rgba_buffer(vec![1, 2, 3, 4, 5, 6, 7, 8], 2, 1);
        let mut dst = rgba_buffer(vec![0; 8], 2, 1);
        apply_channel_lut(&src, &mut dst, &build_lut(|v| v + 1.0)).unwrap();
        assert_eq!(src.to_bytes().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(dst.to_bytes().unwrap(), vec![2, 3, 4, 4, 6, 7, 8, 8]);
    }

    #[test]
    fn test_nv21_maps_luma_only() {
        let desc = BufferDescriptor::linear(2, 2, PixelFormat::Nv21, ColorSpace::Srgb);
        assert_eq!(desc.len, 6);
        let src = EffectBuffer::from_bytes(desc, vec![10, 10, 10, 10, 128, 128]).unwrap();
        let mut dst = src.clone();
        apply_channel_lut(&src, &mut dst, &build_lut(|v| v + 5.0)).unwrap();
        assert_eq!(dst.to_bytes().unwrap(), vec![15, 15, 15, 15, 128, 128]);
    }

    #[test]
    fn test_unsupported_format() {
        let desc = BufferDescriptor::linear(1, 1, PixelFormat::Rgba1010102, ColorSpace::Srgb);
        let src = EffectBuffer::from_bytes(desc, vec![0; 4]).unwrap();
        let mut dst = src.clone();
        assert!(matches!(
            apply_channel_lut(&src, &mut dst, &build_lut(|v| v)),
            Err(EffectError::UnsupportedPixelFormat(_))
        ));
    }
}
