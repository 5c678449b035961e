//! Built-in appearance effects.
//!
//! Each effect builds a feathered region mask from landmarks and blends
//! a color into the pixels under it. The mask value scales the effect's
//! opacity, so region edges fade out smoothly.

use image::Rgba;

use super::regions::{
    self, FACE_OUTLINE, LEFT_CHEEK, LEFT_EYE, LEFT_EYESHADOW, LEFT_INNER_EYE, LEFT_OUTER_EYE,
    LEFT_UPPER_LID, LIP_LOWER, LIP_UPPER, RIGHT_CHEEK, RIGHT_EYE, RIGHT_EYESHADOW, RIGHT_INNER_EYE,
    RIGHT_OUTER_EYE, RIGHT_UPPER_LID,
};
use crate::applier::{AppliedEffect, EffectApplier};
use crate::effect::{
    BlendMode, BlushConfig, EffectConfig, EyelinerConfig, EyelinerStyle, EyeshadowConfig,
    EyeshadowStyle, FoundationConfig, FoundationFinish, LipstickConfig,
};
use crate::types::{ApplierError, Color, GrayImage, LandmarkSet, Point, RgbaImage};

/// Share of `intensity` used as blend opacity, per effect.
const EYESHADOW_OPACITY: f64 = 0.6;
const BLUSH_OPACITY: f64 = 0.4;
const FOUNDATION_OPACITY: f64 = 0.3;
const GLOSS_OPACITY: f64 = 0.25;

const MATTE_TONE: f64 = 0.95;
const DEWY_TONE: f64 = 1.1;

/// Linear RGB in `0.0..=1.0`.
type Shade = [f64; 3];

fn shade(color: Color) -> Shade {
    [
        f64::from(color.r) / 255.0,
        f64::from(color.g) / 255.0,
        f64::from(color.b) / 255.0,
    ]
}

fn lerp(a: Shade, b: Shade, t: f64) -> Shade {
    let t = t.clamp(0.0, 1.0);
    std::array::from_fn(|c| t.mul_add(b[c] - a[c], a[c]))
}

/// Color at `t` along a multi-stop palette.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn palette(stops: &[Shade], t: f64) -> Shade {
    match stops {
        [] => [0.0; 3],
        [only] => *only,
        _ => {
            let pos = t.clamp(0.0, 1.0) * (stops.len() - 1) as f64;
            let i = (pos.floor() as usize).min(stops.len() - 2);
            lerp(stops[i], stops[i + 1], pos - i as f64)
        }
    }
}

/// Blend one normalized channel.
fn blend_channel(base: f64, top: f64, mode: BlendMode) -> f64 {
    match mode {
        BlendMode::Normal => top,
        BlendMode::Multiply => base * top,
        BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - top),
        BlendMode::Overlay => {
            if base < 0.5 {
                2.0 * base * top
            } else {
                1.0 - 2.0 * (1.0 - base) * (1.0 - top)
            }
        }
        BlendMode::SoftLight => (1.0 - 2.0 * top) * base * base + 2.0 * top * base,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f64) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend `color` into `pixel` with `mode`, then mix the result with the
/// original by `opacity`. Alpha is preserved.
pub fn blend_pixel(pixel: &mut Rgba<u8>, color: Shade, mode: BlendMode, opacity: f64) {
    let opacity = opacity.clamp(0.0, 1.0);
    for (c, top) in color.iter().enumerate() {
        let base = f64::from(pixel.0[c]) / 255.0;
        let mixed = blend_channel(base, *top, mode);
        pixel.0[c] = to_u8(opacity.mul_add(mixed - base, base));
    }
}

/// Blend a per-pixel shade into every masked pixel.
fn paint(
    image: &mut RgbaImage,
    mask: &GrayImage,
    mode: BlendMode,
    opacity: f64,
    shade_at: impl Fn(u32, u32) -> Shade,
) {
    if opacity <= 0.0 {
        return;
    }
    for (x, y, m) in mask.enumerate_pixels() {
        let m = m.0[0];
        if m == 0 {
            continue;
        }
        let strength = f64::from(m) / 255.0;
        blend_pixel(image.get_pixel_mut(x, y), shade_at(x, y), mode, opacity * strength);
    }
}

/// Scale brightness under the mask by `factor`, weighted by mask strength.
fn tone(image: &mut RgbaImage, mask: &GrayImage, factor: f64) {
    for (x, y, m) in mask.enumerate_pixels() {
        let strength = f64::from(m.0[0]) / 255.0;
        if strength == 0.0 {
            continue;
        }
        let k = strength.mul_add(factor - 1.0, 1.0);
        let pixel = image.get_pixel_mut(x, y);
        for c in 0..3 {
            pixel.0[c] = to_u8(f64::from(pixel.0[c]) / 255.0 * k);
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn sigma(px: f64) -> f32 {
    px as f32
}

fn eyes_mask(w: u32, h: u32, landmarks: &LandmarkSet) -> Result<GrayImage, ApplierError> {
    let mut mask = regions::polygon_mask(w, h, landmarks, LEFT_EYE)?;
    regions::union(&mut mask, &regions::polygon_mask(w, h, landmarks, RIGHT_EYE)?);
    Ok(mask)
}

fn lips_mask(w: u32, h: u32, landmarks: &LandmarkSet) -> Result<GrayImage, ApplierError> {
    let mut mask = regions::polygon_mask(w, h, landmarks, LIP_UPPER)?;
    regions::union(&mut mask, &regions::polygon_mask(w, h, landmarks, LIP_LOWER)?);
    Ok(mask)
}

fn foundation(
    image: &mut RgbaImage,
    landmarks: &LandmarkSet,
    config: &FoundationConfig,
) -> Result<(), ApplierError> {
    let (w, h) = image.dimensions();
    let (face_width, _) = regions::face_size(landmarks)?;

    let mut mask = regions::polygon_mask(w, h, landmarks, FACE_OUTLINE)?;
    regions::subtract(&mut mask, &eyes_mask(w, h, landmarks)?);
    regions::subtract(&mut mask, &lips_mask(w, h, landmarks)?);
    let mask = regions::feather(&mask, sigma(face_width * 0.02));

    let color = shade(config.color);
    paint(
        image,
        &mask,
        BlendMode::Normal,
        config.coverage * FOUNDATION_OPACITY,
        |_, _| color,
    );
    match config.finish {
        FoundationFinish::Natural => {}
        FoundationFinish::Matte => tone(image, &mask, MATTE_TONE),
        FoundationFinish::Dewy => tone(image, &mask, DEWY_TONE),
    }
    Ok(())
}

fn lipstick(
    image: &mut RgbaImage,
    landmarks: &LandmarkSet,
    config: &LipstickConfig,
) -> Result<(), ApplierError> {
    let (w, h) = image.dimensions();
    let (face_width, _) = regions::face_size(landmarks)?;
    let mask = regions::feather(&lips_mask(w, h, landmarks)?, sigma(face_width * 0.008));

    let color = shade(config.color);
    paint(image, &mask, config.blend_mode, config.intensity, |_, _| color);

    if config.glossiness > 0.0 {
        let lower = regions::polygon_mask(w, h, landmarks, LIP_LOWER)?;
        let highlight = regions::feather(&lower, sigma(face_width * 0.02));
        paint(
            image,
            &highlight,
            BlendMode::Screen,
            config.glossiness * config.intensity * GLOSS_OPACITY,
            |_, _| [1.0; 3],
        );
    }
    Ok(())
}

fn eyeshadow(
    image: &mut RgbaImage,
    landmarks: &LandmarkSet,
    config: &EyeshadowConfig,
) -> Result<(), ApplierError> {
    let (w, h) = image.dimensions();
    let (face_width, _) = regions::face_size(landmarks)?;

    let mut mask = regions::polygon_mask(w, h, landmarks, LEFT_EYESHADOW)?;
    regions::union(&mut mask, &regions::polygon_mask(w, h, landmarks, RIGHT_EYESHADOW)?);
    regions::subtract(&mut mask, &eyes_mask(w, h, landmarks)?);
    let spread = match config.style {
        EyeshadowStyle::Natural | EyeshadowStyle::Halo => 1.0,
        EyeshadowStyle::Smoky => 1.8,
        EyeshadowStyle::CutCrease => 0.4,
        EyeshadowStyle::Gradient => 1.2,
    };
    let mask = regions::feather(&mask, sigma(face_width * 0.012 * spread));

    let lift = config.shimmer.mul_add(0.3, 1.0);
    let stops: Vec<Shade> = config
        .colors
        .iter()
        .map(|&c| shade(c).map(|v| (v * lift).min(1.0)))
        .collect();

    let ys: Vec<f64> = LEFT_EYESHADOW
        .iter()
        .chain(RIGHT_EYESHADOW)
        .filter_map(|&i| landmarks.get(i).map(|p| p.y))
        .collect();
    let top = ys.iter().copied().fold(f64::INFINITY, f64::min);
    let bottom = ys.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (bottom - top).max(1.0);

    let left = regions::center(landmarks, LEFT_EYE)?;
    let right = regions::center(landmarks, RIGHT_EYE)?;
    let reach = regions::landmark(landmarks, LEFT_OUTER_EYE)?
        .distance(regions::landmark(landmarks, LEFT_INNER_EYE)?)
        .max(1.0);

    let style = config.style;
    paint(
        image,
        &mask,
        config.blend_mode,
        config.intensity * EYESHADOW_OPACITY,
        |x, y| {
            let p = Point::new(f64::from(x), f64::from(y));
            match style {
                EyeshadowStyle::Gradient => palette(&stops, (p.y - top) / span),
                EyeshadowStyle::Halo => {
                    let d = p.distance(left).min(p.distance(right));
                    palette(&stops, d / reach)
                }
                _ => palette(&stops, 0.0),
            }
        },
    );
    Ok(())
}

fn blush(image: &mut RgbaImage, landmarks: &LandmarkSet, config: &BlushConfig) -> Result<(), ApplierError> {
    let (w, h) = image.dimensions();
    let (face_width, _) = regions::face_size(landmarks)?;
    let radius = face_width * 0.09;

    let mut mask = regions::disc_mask(w, h, regions::landmark(landmarks, LEFT_CHEEK)?, radius);
    regions::union(
        &mut mask,
        &regions::disc_mask(w, h, regions::landmark(landmarks, RIGHT_CHEEK)?, radius),
    );
    let mask = regions::feather(&mask, sigma(radius * 0.5));

    let color = shade(config.color);
    paint(
        image,
        &mask,
        config.blend_mode,
        config.intensity * BLUSH_OPACITY,
        |_, _| color,
    );
    Ok(())
}

/// Upper lash line from the outer corner, with a wing in front of it if
/// requested.
fn lash_line(
    landmarks: &LandmarkSet,
    lid: &[usize],
    outer: usize,
    inner: usize,
    winged: bool,
) -> Result<Vec<Point>, ApplierError> {
    regions::require(landmarks, lid)?;
    let outer_p = regions::landmark(landmarks, outer)?;
    let inner_p = regions::landmark(landmarks, inner)?;
    let mut path = Vec::with_capacity(lid.len() + 1);
    if winged {
        let width = outer_p.distance(inner_p).max(1.0);
        let dx = (outer_p.x - inner_p.x) / width;
        let dy = (outer_p.y - inner_p.y) / width;
        path.push(Point::new(
            dx.mul_add(width * 0.3, outer_p.x),
            dy.mul_add(width * 0.3, outer_p.y) - width * 0.15,
        ));
    }
    path.extend(lid.iter().filter_map(|&i| landmarks.get(i)));
    Ok(path)
}

fn eyeliner(
    image: &mut RgbaImage,
    landmarks: &LandmarkSet,
    config: &EyelinerConfig,
) -> Result<(), ApplierError> {
    let (w, h) = image.dimensions();
    let winged = config.style == EyelinerStyle::Winged;
    let left = lash_line(landmarks, LEFT_UPPER_LID, LEFT_OUTER_EYE, LEFT_INNER_EYE, winged)?;
    let right = lash_line(landmarks, RIGHT_UPPER_LID, RIGHT_OUTER_EYE, RIGHT_INNER_EYE, winged)?;

    let eye_width = regions::landmark(landmarks, LEFT_OUTER_EYE)?
        .distance(regions::landmark(landmarks, LEFT_INNER_EYE)?);
    let weight = if config.style == EyelinerStyle::Dramatic { 1.8 } else { 1.0 };
    let thickness = (config.thickness * eye_width * 0.15 * weight).max(1.0);

    let mut mask = regions::stroke_mask(w, h, &left, thickness);
    regions::union(&mut mask, &regions::stroke_mask(w, h, &right, thickness));
    let mask = regions::feather(&mask, 0.5);

    let color = shade(config.color);
    paint(image, &mask, BlendMode::Normal, config.intensity, |_, _| color);
    Ok(())
}

/// Applier for every appearance effect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeupApplier;

impl EffectApplier for MakeupApplier {
    fn apply(
        &self,
        image: &RgbaImage,
        landmarks: &LandmarkSet,
        config: &EffectConfig,
    ) -> Result<AppliedEffect, ApplierError> {
        let mut out = image.clone();
        match config {
            EffectConfig::Foundation(c) => foundation(&mut out, landmarks, c)?,
            EffectConfig::Eyeshadow(c) => eyeshadow(&mut out, landmarks, c)?,
            EffectConfig::Blush(c) => blush(&mut out, landmarks, c)?,
            EffectConfig::Lipstick(c) => lipstick(&mut out, landmarks, c)?,
            EffectConfig::Eyeliner(c) => eyeliner(&mut out, landmarks, c)?,
            other => {
                return Err(ApplierError::UnsupportedConfig { effect: other.id() });
            }
        }
        Ok(AppliedEffect::image(out))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::appliers::template_landmarks;
    use crate::effect::{EffectId, JawlineConfig};

    fn skin(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 160, 140, 255]))
    }

    fn changed(a: &RgbaImage, b: &RgbaImage) -> usize {
        a.pixels().zip(b.pixels()).filter(|(p, q)| p != q).count()
    }

    #[test]
    fn blend_modes_at_full_opacity() {
        let mut p = Rgba([128, 128, 128, 200]);
        blend_pixel(&mut p, [1.0, 0.0, 0.5], BlendMode::Normal, 1.0);
        assert_eq!(p, Rgba([255, 0, 128, 200]));

        let mut p = Rgba([255, 128, 0, 255]);
        blend_pixel(&mut p, [0.5, 0.5, 0.5], BlendMode::Multiply, 1.0);
        assert_eq!(p, Rgba([128, 64, 0, 255]));

        let mut p = Rgba([0, 128, 255, 255]);
        blend_pixel(&mut p, [0.5, 0.5, 0.5], BlendMode::Screen, 1.0);
        assert_eq!(p.0[0], 128);
        assert_eq!(p.0[2], 255);
    }

    #[test]
    fn zero_opacity_is_identity() {
        for mode in [
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Overlay,
            BlendMode::SoftLight,
            BlendMode::Screen,
        ] {
            let mut p = Rgba([10, 100, 200, 255]);
            blend_pixel(&mut p, [0.9, 0.2, 0.4], mode, 0.0);
            assert_eq!(p, Rgba([10, 100, 200, 255]), "{mode}");
        }
    }

    #[test]
    fn palette_interpolates_stops() {
        let stops = [[0.0; 3], [1.0; 3], [0.0; 3]];
        assert!((palette(&stops, 0.5)[0] - 1.0).abs() < 1e-9);
        assert!((palette(&stops, 0.25)[0] - 0.5).abs() < 1e-9);
        assert!((palette(&stops, 1.0)[0]).abs() < 1e-9);
    }

    #[test]
    fn every_makeup_effect_changes_the_face() {
        let (w, h) = (96, 96);
        let image = skin(w, h);
        let lm = template_landmarks(w, h);
        let configs = [
            EffectConfig::Foundation(FoundationConfig {
                color: Color::rgb(240, 210, 190),
                coverage: 0.9,
                finish: FoundationFinish::Dewy,
            }),
            EffectConfig::Eyeshadow(EyeshadowConfig {
                colors: vec![Color::rgb(90, 40, 120), Color::rgb(200, 150, 90)],
                style: EyeshadowStyle::Gradient,
                intensity: 0.9,
                blend_mode: BlendMode::Normal,
                shimmer: 0.2,
            }),
            EffectConfig::Blush(BlushConfig {
                color: Color::rgb(240, 90, 110),
                intensity: 0.9,
                blend_mode: BlendMode::Normal,
            }),
            EffectConfig::Lipstick(LipstickConfig {
                color: Color::rgb(170, 20, 50),
                intensity: 0.9,
                glossiness: 0.5,
                blend_mode: BlendMode::Normal,
            }),
            EffectConfig::Eyeliner(EyelinerConfig {
                color: Color::rgb(20, 20, 20),
                thickness: 0.8,
                style: EyelinerStyle::Winged,
                intensity: 1.0,
            }),
        ];
        for config in &configs {
            let out = MakeupApplier.apply(&image, &lm, config).unwrap();
            assert!(out.landmarks.is_none());
            assert_eq!(out.image.dimensions(), (w, h));
            assert!(changed(&image, &out.image) > 0, "{} left the image unchanged", config.id());
        }
    }

    #[test]
    fn short_landmarks_are_rejected() {
        let config = EffectConfig::Blush(BlushConfig {
            color: Color::rgb(240, 90, 110),
            intensity: 0.5,
            blend_mode: BlendMode::Normal,
        });
        let lm = LandmarkSet::new(vec![Point::new(1.0, 1.0); 30]);
        assert!(matches!(
            MakeupApplier.apply(&skin(8, 8), &lm, &config),
            Err(ApplierError::InsufficientLandmarks { .. })
        ));
    }

    #[test]
    fn geometry_configs_are_unsupported() {
        let config = EffectConfig::JawlineSurgery(JawlineConfig::default());
        assert_eq!(
            MakeupApplier
                .apply(&skin(8, 8), &template_landmarks(8, 8), &config)
                .unwrap_err(),
            ApplierError::UnsupportedConfig {
                effect: EffectId::JAWLINE_SURGERY
            }
        );
    }

    #[test]
    fn lipstick_stays_near_the_mouth() {
        let (w, h) = (96, 96);
        let image = skin(w, h);
        let lm = template_landmarks(w, h);
        let config = EffectConfig::Lipstick(LipstickConfig {
            color: Color::rgb(170, 20, 50),
            intensity: 1.0,
            glossiness: 0.0,
            blend_mode: BlendMode::Normal,
        });
        let out = MakeupApplier.apply(&image, &lm, &config).unwrap().image;
        // Forehead untouched.
        assert_eq!(out.get_pixel(w / 2, h / 6), image.get_pixel(w / 2, h / 6));
    }
}
