// SPDX-License-Identifier: GPL-3.0-only

//! Image file decode and encode at the pipeline boundary

use crate::buffer::{BufferSource, EffectBuffer, NativePixelFormat, PixelBuffer};
use crate::errors::{EffectError, EffectResult};
use image::RgbaImage;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// JPEG quality used when the output path asks for JPEG
const JPEG_QUALITY: u8 = 92;

pub trait ImageCodec: Send + Sync + fmt::Debug {
    fn decode_path(&self, path: &Path) -> EffectResult<PixelBuffer>;

    /// Only `file://` URIs (or bare paths) are readable by default
    fn decode_uri(&self, uri: &str) -> EffectResult<PixelBuffer> {
        match uri.split_once("://") {
            Some(("file", path)) => self.decode_path(Path::new(path)),
            Some((scheme, _)) => Err(EffectError::DecodeFailed(format!(
                "unsupported URI scheme: {scheme}"
            ))),
            None => self.decode_path(Path::new(uri)),
        }
    }

    fn encode(&self, pixels: &PixelBuffer, path: &Path) -> EffectResult<()>;
}

/// Codec backed by the `image` crate; decodes to RGBA8888
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateCodec;

impl ImageCodec for ImageCrateCodec {
    fn decode_path(&self, path: &Path) -> EffectResult<PixelBuffer> {
        let rgba = image::open(path)
            .map_err(|e| EffectError::DecodeFailed(format!("{}: {e}", path.display())))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        info!(path = %path.display(), width, height, "Decoded input image");
        PixelBuffer::from_rgba(width, height, rgba.into_raw())
    }

    fn encode(&self, pixels: &PixelBuffer, path: &Path) -> EffectResult<()> {
        let image = to_rgba_image(pixels)?;
        let is_jpeg = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"));

        if is_jpeg {
            let rgb = image::DynamicImage::ImageRgba8(image).into_rgb8();
            let mut buf = Vec::new();
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
            encoder
                .encode_image(&rgb)
                .map_err(|e| EffectError::EncodeFailed(format!("JPEG: {e}")))?;
            std::fs::write(path, buf)?;
        } else {
            image
                .save(path)
                .map_err(|e| EffectError::EncodeFailed(format!("{}: {e}", path.display())))?;
        }
        info!(path = %path.display(), "Encoded output image");
        Ok(())
    }
}

/// Repack a strided RGBA8888 pixel buffer into an `image` buffer
fn to_rgba_image(pixels: &PixelBuffer) -> EffectResult<RgbaImage> {
    let info = pixels.info()?;
    if info.format != NativePixelFormat::Rgba8888 {
        return Err(EffectError::EncodeFailed(format!(
            "{:?} cannot be encoded, RGBA8888 required",
            info.format
        )));
    }
    let bytes = pixels.to_bytes()?;
    let row_bytes = info.width as usize * 4;
    let mut packed = Vec::with_capacity(row_bytes * info.height as usize);
    for row in bytes
        .chunks(info.row_stride as usize)
        .take(info.height as usize)
    {
        packed.extend_from_slice(row.get(..row_bytes).ok_or_else(|| {
            EffectError::AccessPixelsFailed("short row in pixel buffer".into())
        })?);
    }
    RgbaImage::from_raw(info.width, info.height, packed)
        .ok_or_else(|| EffectError::EncodeFailed("pixel data shorter than image".into()))
}

/// Decode a path or URI input in place, returning the decoded pixels.
/// Memory and texture buffers are left as they are.
pub fn resolve_input(
    codec: &dyn ImageCodec,
    buffer: &mut EffectBuffer,
) -> EffectResult<Option<PixelBuffer>> {
    let decoded = match &mut buffer.handle.source {
        BufferSource::Path { path, decoded } => {
            if decoded.is_none() {
                *decoded = Some(codec.decode_path(path)?);
            }
            decoded.clone()
        }
        BufferSource::Uri { uri, decoded } => {
            if decoded.is_none() {
                *decoded = Some(codec.decode_uri(uri)?);
            }
            decoded.clone()
        }
        _ => None,
    };
    if decoded.is_some() {
        debug!("Resolved file-backed input");
    }
    Ok(decoded)
}
