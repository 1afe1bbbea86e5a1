//! Pixel seam: decode, resize, encode.
//!
//! The pipeline only ever talks to the [`Codec`] trait; [`RasterCodec`] is
//! the `image`-crate implementation. `probe` reads container headers only,
//! so dimension extraction never pays for a full decode.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use thiserror::Error;

use crate::directive::OutputFormat;

/// Encoder default when the requested quality is 0 or out of range.
const DEFAULT_QUALITY: u32 = 75;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cannot decode image: {0}")]
    Decode(String),
    #[error("cannot encode image: {0}")]
    Encode(String),
}

/// Final encode parameters for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeSpec {
    /// Target width; 0 keeps the source aspect from `height`.
    pub width: u32,
    /// Target height; 0 keeps the source aspect from `width`.
    pub height: u32,
    pub format: OutputFormat,
    /// 1..=100; anything else falls back to the encoder default.
    pub quality: u32,
}

pub trait Codec: Send + Sync {
    /// Extracts `(width, height)` from encoded bytes.
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), CodecError>;

    /// Decodes, resizes (Lanczos3), and re-encodes.
    fn process(&self, bytes: &[u8], spec: &EncodeSpec) -> Result<Vec<u8>, CodecError>;
}

/// `image`-crate codec: pure Rust decoders and encoders for jpeg, png, gif
/// and webp (webp encoding is the crate's lossless encoder).
pub struct RasterCodec;

impl Codec for RasterCodec {
    fn probe(&self, bytes: &[u8]) -> Result<(u32, u32), CodecError> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .into_dimensions()
            .map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn process(&self, bytes: &[u8], spec: &EncodeSpec) -> Result<Vec<u8>, CodecError> {
        let img = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(e.to_string()))?
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))?;

        let (width, height) = effective_dimensions(img.width(), img.height(), spec);
        let resized = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        encode(&resized, spec.format, spec.quality)
    }
}

/// A zero side keeps the source aspect ratio; both zero keeps the source
/// size. Degenerate rounding to zero is bumped to one pixel.
fn effective_dimensions(source_w: u32, source_h: u32, spec: &EncodeSpec) -> (u32, u32) {
    let aspect = source_w as f32 / source_h as f32;
    let (w, h) = match (spec.width, spec.height) {
        (0, 0) => (source_w, source_h),
        (0, h) => ((h as f32 * aspect) as u32, h),
        (w, 0) => (w, (w as f32 / aspect) as u32),
        (w, h) => (w, h),
    };
    (w.max(1), h.max(1))
}

fn encode(img: &DynamicImage, format: OutputFormat, quality: u32) -> Result<Vec<u8>, CodecError> {
    let quality = if quality == 0 || quality > 100 {
        DEFAULT_QUALITY
    } else {
        quality
    };

    let mut out = Cursor::new(Vec::new());
    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut out, quality as u8);
            rgb.write_with_encoder(encoder)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_to(&mut out, ImageFormat::Png)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        OutputFormat::Gif => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut out, ImageFormat::Gif)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
        OutputFormat::Webp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_to(&mut out, ImageFormat::WebP)
                .map_err(|e| CodecError::Encode(e.to_string()))?;
        }
    }
    Ok(out.into_inner())
}
