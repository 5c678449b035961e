//! faceforge-pipeline: layered, dependency-aware face effect pipeline
//! (sans-IO).
//!
//! Composes makeup and reshaping effects onto a face image anchored to a
//! 468-point landmark mesh:
//!
//! update request -> conflict resolution -> dirty set -> cache lookup ->
//! layered composition at working scale -> quality score -> result.
//!
//! The [`Orchestrator`] owns all state. Effects are rendered by
//! [`EffectApplier`]s looked up in an [`ApplierRegistry`];
//! [`ApplierRegistry::with_builtins`] provides simple landmark-anchored
//! implementations of all nine built-in effects.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! images and returns structured data. File handling, landmark
//! detection models and presentation live with the caller.

pub mod applier;
pub mod appliers;
pub mod batch;
pub mod cache;
pub mod conflict;
pub mod diagnostics;
pub mod effect;
pub mod graph;
pub mod orchestrator;
pub mod performance;
pub mod quality;
pub mod scale;
pub mod state;
pub mod types;

pub use applier::{AppliedEffect, ApplierRegistry, EffectApplier, LandmarkDetector};
pub use appliers::{MakeupApplier, SurgeryApplier, template_landmarks};
pub use batch::{BatchJob, render, render_batch};
pub use cache::{CacheStats, Fingerprint, ResultCache};
pub use conflict::{ConflictKind, ConflictPolicy, ConflictResolver, ConflictTuning};
pub use diagnostics::{EffectDiagnostics, EffectOutcome, PassDiagnostics};
pub use effect::{
    BlendMode, BlushConfig, CheekboneConfig, EffectConfig, EffectFamily, EffectId, EffectLayer,
    EyeConfig, EyelinerConfig, EyelinerStyle, EyeshadowConfig, EyeshadowStyle, FaceConfig,
    FoundationConfig, FoundationFinish, JawlineConfig, LipstickConfig, MakeupConfig, NoseConfig,
    SurgeryConfig,
};
pub use graph::DependencyGraph;
pub use orchestrator::{IntegratedResult, Orchestrator, PerformanceStats, UpdateMode, UpdateRequest};
pub use performance::{PerformanceConfig, PerformanceController, QualityLevel};
pub use quality::{QualityAssessor, QualityBreakdown};
pub use scale::ResampleFilter;
pub use state::{EffectOutput, EffectState, EffectStore, LandmarkDelta, Lineage, PixelDelta};
pub use types::{
    ApplierError, Color, Dimensions, GrayImage, LandmarkSet, OrchestratorConfig, PipelineError,
    Point, RgbaImage,
};

/// Decode an encoded image (PNG, JPEG, BMP, WebP) into RGBA.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn decode_empty_input() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn decode_corrupt_input() {
        assert!(matches!(
            decode(&[0xFF, 0x00]),
            Err(PipelineError::ImageDecode(_))
        ));
    }

    #[test]
    fn decode_round_trips_png() {
        let img = RgbaImage::from_fn(5, 3, |x, y| {
            image::Rgba([u8::try_from(x * 40).unwrap(), u8::try_from(y * 80).unwrap(), 7, 255])
        });
        assert_eq!(decode(&png(&img)).unwrap(), img);
    }
}
