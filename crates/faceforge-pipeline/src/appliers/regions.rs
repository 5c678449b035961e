//! Facial regions on the 468-point face mesh and the masks built from
//! them.
//!
//! Masks are single-channel images where 255 means "fully inside the
//! region". Feathering blurs the mask edge so effects fade out instead
//! of ending on a hard polygon border.

use image::Luma;
use imageproc::point::Point as PixelPoint;

use crate::types::{ApplierError, GrayImage, LandmarkSet, Point};

pub const LIP_UPPER: &[usize] = &[
    61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291, 308, 415, 310, 312, 13, 82, 81, 80, 191, 78,
];
pub const LIP_LOWER: &[usize] = &[
    61, 146, 91, 181, 84, 17, 314, 405, 321, 375, 291, 308, 324, 402, 317, 14, 87, 178, 88, 95, 78,
];
pub const LEFT_EYE: &[usize] = &[
    33, 246, 161, 160, 159, 158, 157, 173, 133, 155, 154, 153, 145, 144, 163, 7,
];
pub const RIGHT_EYE: &[usize] = &[
    362, 398, 384, 385, 386, 387, 388, 466, 263, 249, 390, 373, 374, 380, 381, 382,
];
/// Upper lash line, outer corner first.
pub const LEFT_UPPER_LID: &[usize] = &[33, 246, 161, 160, 159, 158, 157, 173, 133];
/// Upper lash line, outer corner first.
pub const RIGHT_UPPER_LID: &[usize] = &[263, 466, 388, 387, 386, 385, 384, 398, 362];
pub const LEFT_EYESHADOW: &[usize] = &[
    226, 247, 30, 29, 27, 28, 56, 190, 243, 173, 157, 158, 159, 160, 161, 246, 33, 130,
];
pub const RIGHT_EYESHADOW: &[usize] = &[
    463, 414, 286, 258, 257, 259, 260, 467, 446, 359, 263, 466, 388, 387, 386, 385, 384, 398, 362,
];
pub const FACE_OUTLINE: &[usize] = &[
    152, 148, 176, 149, 150, 136, 172, 58, 132, 93, 234, 127, 162, 21, 54, 103, 67, 109, 10, 338,
    297, 332, 284, 251, 389, 454, 323, 401, 361, 435, 288, 397, 365, 379, 378, 400, 377,
];
pub const JAW: &[usize] = &[
    132, 58, 172, 136, 150, 149, 176, 148, 152, 377, 400, 378, 379, 365, 397, 288, 361,
];
pub const CHIN: &[usize] = &[152, 148, 176, 377, 400];
pub const JAW_CORNERS: &[usize] = &[172, 136, 397, 365];
pub const LEFT_CHEEKBONE: &[usize] = &[116, 117, 118, 123, 147, 187, 205];
pub const RIGHT_CHEEKBONE: &[usize] = &[345, 346, 347, 352, 376, 411, 425];
pub const NOSE_TIP: &[usize] = &[1, 2, 4, 5];
pub const NOSE_WINGS: &[usize] = &[48, 64, 129, 278, 294, 358];
pub const NOSE_BRIDGE_SIDES: &[usize] = &[122, 188, 351, 412];

pub const LEFT_CHEEK: usize = 50;
pub const RIGHT_CHEEK: usize = 280;
pub const LEFT_OUTER_EYE: usize = 33;
pub const LEFT_INNER_EYE: usize = 133;
pub const RIGHT_OUTER_EYE: usize = 263;
pub const RIGHT_INNER_EYE: usize = 362;
pub const FOREHEAD: usize = 10;
pub const CHIN_TIP: usize = 152;
pub const LEFT_FACE_EDGE: usize = 234;
pub const RIGHT_FACE_EDGE: usize = 454;

/// Fail unless every index in `indices` is present.
pub fn require(landmarks: &LandmarkSet, indices: &[usize]) -> Result<(), ApplierError> {
    let required = indices.iter().max().map_or(0, |&m| m + 1);
    if landmarks.len() < required {
        return Err(ApplierError::InsufficientLandmarks {
            required,
            available: landmarks.len(),
        });
    }
    Ok(())
}

/// One landmark, as an error if missing.
pub fn landmark(landmarks: &LandmarkSet, index: usize) -> Result<Point, ApplierError> {
    landmarks.get(index).ok_or(ApplierError::InsufficientLandmarks {
        required: index + 1,
        available: landmarks.len(),
    })
}

/// Face width and height in pixels, measured across the face edges and
/// from forehead to chin.
pub fn face_size(landmarks: &LandmarkSet) -> Result<(f64, f64), ApplierError> {
    let width = landmark(landmarks, LEFT_FACE_EDGE)?.distance(landmark(landmarks, RIGHT_FACE_EDGE)?);
    let height = landmark(landmarks, FOREHEAD)?.distance(landmark(landmarks, CHIN_TIP)?);
    Ok((width.max(1.0), height.max(1.0)))
}

/// Mean position of a group of landmarks.
pub fn center(landmarks: &LandmarkSet, indices: &[usize]) -> Result<Point, ApplierError> {
    require(landmarks, indices)?;
    let points: Vec<Point> = indices.iter().filter_map(|&i| landmarks.get(i)).collect();
    LandmarkSet::new(points).centroid().ok_or(ApplierError::InsufficientLandmarks {
        required: 1,
        available: 0,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn pixel(p: Point) -> PixelPoint<i32> {
    PixelPoint::new(p.x.round() as i32, p.y.round() as i32)
}

/// Filled polygon through the given landmarks.
///
/// Consecutive duplicate vertices and a closing vertex equal to the
/// first are dropped; fewer than three distinct vertices draw nothing.
pub fn polygon_mask(
    width: u32,
    height: u32,
    landmarks: &LandmarkSet,
    indices: &[usize],
) -> Result<GrayImage, ApplierError> {
    require(landmarks, indices)?;
    let mut mask = GrayImage::new(width, height);
    let mut poly: Vec<PixelPoint<i32>> = Vec::with_capacity(indices.len());
    for p in indices.iter().filter_map(|&i| landmarks.get(i)).map(pixel) {
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() >= 3 {
        imageproc::drawing::draw_polygon_mut(&mut mask, &poly, Luma([255]));
    }
    Ok(mask)
}

/// Filled disc.
#[allow(clippy::cast_possible_truncation)]
pub fn disc_mask(width: u32, height: u32, center: Point, radius: f64) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let radius = radius.round().max(1.0) as i32;
    let c = pixel(center);
    imageproc::drawing::draw_filled_circle_mut(&mut mask, (c.x, c.y), radius, Luma([255]));
    mask
}

/// Thick polyline through the given landmarks, drawn as overlapping
/// discs.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn stroke_mask(width: u32, height: u32, path: &[Point], thickness: f64) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let radius = (thickness / 2.0).round().max(1.0) as i32;
    for pair in path.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let steps = a.distance(b).ceil().max(1.0) as usize;
        for s in 0..=steps {
            #[allow(clippy::cast_precision_loss)]
            let t = s as f64 / steps as f64;
            let p = pixel(Point::new(t.mul_add(b.x - a.x, a.x), t.mul_add(b.y - a.y, a.y)));
            imageproc::drawing::draw_filled_circle_mut(&mut mask, (p.x, p.y), radius, Luma([255]));
        }
    }
    mask
}

/// Gaussian-feathered copy of a mask. Non-positive sigma returns the
/// mask unchanged, since `imageproc` panics on `sigma <= 0.0`.
#[must_use = "returns the feathered mask"]
pub fn feather(mask: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 || !sigma.is_finite() {
        return mask.clone();
    }
    imageproc::filter::gaussian_blur_f32(mask, sigma)
}

/// Per-pixel maximum of two masks, written into `into`.
pub fn union(into: &mut GrayImage, other: &GrayImage) {
    for (a, b) in into.pixels_mut().zip(other.pixels()) {
        a.0[0] = a.0[0].max(b.0[0]);
    }
}

/// Remove `other` from `from`.
pub fn subtract(from: &mut GrayImage, other: &GrayImage) {
    for (a, b) in from.pixels_mut().zip(other.pixels()) {
        a.0[0] = a.0[0].saturating_sub(b.0[0]);
    }
}
