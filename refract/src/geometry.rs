//! Target-dimension resolution.
//!
//! Pure and deterministic: called once per request, after the source's real
//! dimensions are known, to turn the requested width/height plus crop mode
//! into the final encode dimensions. All validation happened at parse time,
//! so resolution cannot fail.

use crate::directive::CropMode;

/// Resolves final target dimensions.
///
/// - `Scale` ignores the source aspect ratio; a single zero side is copied
///   from the nonzero one (square fallback).
/// - `Fit` preserves the source aspect ratio, keeping the larger requested
///   side fixed and recomputing the other. Ties (`height == width`,
///   including both zero) recompute height from width.
/// - `Limit` is `Fit`, except a request exceeding the source on either side
///   returns the source dimensions unchanged (never upscale).
pub fn resolve(
    source_width: u32,
    source_height: u32,
    crop: CropMode,
    target_width: u32,
    target_height: u32,
) -> (u32, u32) {
    match crop {
        CropMode::Scale => {
            let width = if target_width == 0 {
                target_height
            } else {
                target_width
            };
            let height = if target_height == 0 {
                target_width
            } else {
                target_height
            };
            (width, height)
        }
        CropMode::Fit => fit(source_width, source_height, target_width, target_height),
        CropMode::Limit => {
            if target_height > source_height || target_width > source_width {
                (source_width, source_height)
            } else {
                fit(source_width, source_height, target_width, target_height)
            }
        }
    }
}

fn fit(source_width: u32, source_height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    let aspect = source_width as f32 / source_height as f32;
    if target_height > target_width {
        ((target_height as f32 * aspect) as u32, target_height)
    } else {
        (target_width, (target_width as f32 / aspect) as u32)
    }
}
