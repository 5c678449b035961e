//! Working-resolution scaling.
//!
//! Below the `High` quality level appliers run on a smaller copy of the
//! running image. [`downscale`] produces that copy and
//! [`merge_upscaled`] brings applier output back to source resolution so
//! it can be composed with everything else. Pixels the applier left
//! alone keep their exact source values.

use std::fmt;

use serde::{Deserialize, Serialize};

use image::Luma;

use crate::types::{Dimensions, GrayImage, RgbaImage};

/// Resampling filter used when changing working resolution.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Dimensions of `dims` scaled by `scale`, at least 1x1.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn scaled_dimensions(dims: Dimensions, scale: f64) -> Dimensions {
    let s = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    Dimensions {
        width: s(dims.width),
        height: s(dims.height),
    }
}

/// Shrink `image` by `scale`.
///
/// Returns `None` when `scale` is not below 1.0 (or not finite) and the
/// image should be used as is.
#[must_use]
pub fn downscale(image: &RgbaImage, scale: f64, filter: ResampleFilter) -> Option<RgbaImage> {
    if !scale.is_finite() || scale >= 1.0 || scale <= 0.0 {
        return None;
    }
    let target = scaled_dimensions(Dimensions::of(image), scale);
    if (target.width, target.height) == image.dimensions() {
        return None;
    }
    Some(image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    ))
}

/// Resize `image` to exactly `dims`. Images already that size are
/// cloned.
#[must_use = "returns the resized image"]
pub fn upscale_to(image: &RgbaImage, dims: Dimensions, filter: ResampleFilter) -> RgbaImage {
    if image.dimensions() == (dims.width, dims.height) {
        return image.clone();
    }
    image::imageops::resize(image, dims.width, dims.height, filter.to_image_filter())
}

/// Bring a reduced-resolution applier result back onto `original`.
///
/// `before` is the downscaled input the applier saw and `after` what it
/// returned. Only the area where they differ is upscaled and blended in;
/// everywhere else `original` is kept bit for bit.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn merge_upscaled(
    original: &RgbaImage,
    before: &RgbaImage,
    after: &RgbaImage,
    filter: ResampleFilter,
) -> RgbaImage {
    let dims = Dimensions::of(original);
    let changed = GrayImage::from_fn(after.width(), after.height(), |x, y| {
        let unchanged = before.get_pixel_checked(x, y) == Some(after.get_pixel(x, y));
        Luma([if unchanged { 0 } else { 255 }])
    });
    let mask = image::imageops::resize(&changed, dims.width, dims.height, filter.to_image_filter());
    let upscaled = upscale_to(after, dims, filter);

    let mut out = original.clone();
    for ((dst, src), m) in out.pixels_mut().zip(upscaled.pixels()).zip(mask.pixels()) {
        let weight = f64::from(m.0[0]) / 255.0;
        if weight <= 0.0 {
            continue;
        }
        for (d, s) in dst.0.iter_mut().zip(src.0) {
            let v = weight.mul_add(f64::from(s) - f64::from(*d), f64::from(*d));
            *d = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
