//! Appearance/geometry conflict detection and resolution.
//!
//! Three region pairs are checked: lips against the jawline, eyeshadow
//! against eye reshaping, and blush against cheekbone reshaping. A pair
//! conflicts when both effects are configured and the geometry
//! adjustment's magnitude is strictly greater than the region threshold.
//!
//! Resolution is a pure function of its inputs.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::effect::{MakeupConfig, SurgeryConfig};
use crate::types::PipelineError;

/// A detected overlap between an appearance and a geometry effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Lip color with a large jawline length change.
    #[serde(rename = "lipstick_jawline_conflict")]
    LipstickJawline,
    /// Eyeshadow with a large eye size change.
    #[serde(rename = "eyeshadow_eye_surgery_conflict")]
    EyeshadowEyeSurgery,
    /// Blush with a large cheekbone width change.
    #[serde(rename = "blush_cheekbone_conflict")]
    BlushCheekbone,
}

impl ConflictKind {
    /// Stable snake-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::LipstickJawline => "lipstick_jawline_conflict",
            Self::EyeshadowEyeSurgery => "eyeshadow_eye_surgery_conflict",
            Self::BlushCheekbone => "blush_cheekbone_conflict",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do about detected conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Leave both configurations alone; later layers paint over earlier
    /// ones.
    Override,
    /// Attenuate both sides of each conflicting pair.
    #[default]
    Blend,
    /// Drop the geometry adjustment that caused each conflict.
    Preserve,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => f.write_str("Override"),
            Self::Blend => f.write_str("Blend"),
            Self::Preserve => f.write_str("Preserve"),
        }
    }
}

/// Region thresholds and `Blend` damping factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictTuning {
    /// Jawline `length` magnitude above which lipstick conflicts.
    pub jawline_length_threshold: f64,
    /// Eye `size` magnitude above which eyeshadow conflicts.
    pub eye_size_threshold: f64,
    /// Cheekbone `width` magnitude above which blush conflicts.
    pub cheekbone_width_threshold: f64,
    /// Lipstick intensity multiplier under `Blend`.
    pub lipstick_damping: f64,
    /// Eyeshadow intensity multiplier under `Blend`.
    pub eyeshadow_damping: f64,
    /// Blush intensity multiplier under `Blend`.
    pub blush_damping: f64,
    /// Multiplier for the conflicting geometry adjustment under `Blend`.
    pub geometry_damping: f64,
}

impl ConflictTuning {
    pub const DEFAULT_JAWLINE_LENGTH_THRESHOLD: f64 = 0.3;
    pub const DEFAULT_EYE_SIZE_THRESHOLD: f64 = 0.4;
    pub const DEFAULT_CHEEKBONE_WIDTH_THRESHOLD: f64 = 0.3;
    pub const DEFAULT_LIPSTICK_DAMPING: f64 = 0.7;
    pub const DEFAULT_EYESHADOW_DAMPING: f64 = 0.8;
    pub const DEFAULT_BLUSH_DAMPING: f64 = 0.8;
    pub const DEFAULT_GEOMETRY_DAMPING: f64 = 0.8;

    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if a threshold or
    /// damping factor is outside `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fields = [
            ("jawline_length_threshold", self.jawline_length_threshold),
            ("eye_size_threshold", self.eye_size_threshold),
            ("cheekbone_width_threshold", self.cheekbone_width_threshold),
            ("lipstick_damping", self.lipstick_damping),
            ("eyeshadow_damping", self.eyeshadow_damping),
            ("blush_damping", self.blush_damping),
            ("geometry_damping", self.geometry_damping),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(PipelineError::InvalidConfiguration(format!(
                    "conflict.{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ConflictTuning {
    fn default() -> Self {
        Self {
            jawline_length_threshold: Self::DEFAULT_JAWLINE_LENGTH_THRESHOLD,
            eye_size_threshold: Self::DEFAULT_EYE_SIZE_THRESHOLD,
            cheekbone_width_threshold: Self::DEFAULT_CHEEKBONE_WIDTH_THRESHOLD,
            lipstick_damping: Self::DEFAULT_LIPSTICK_DAMPING,
            eyeshadow_damping: Self::DEFAULT_EYESHADOW_DAMPING,
            blush_damping: Self::DEFAULT_BLUSH_DAMPING,
            geometry_damping: Self::DEFAULT_GEOMETRY_DAMPING,
        }
    }
}

/// Detects and resolves conflicts with a fixed [`ConflictTuning`].
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    tuning: ConflictTuning,
}

impl ConflictResolver {
    #[must_use]
    pub const fn new(tuning: ConflictTuning) -> Self {
        Self { tuning }
    }

    #[must_use]
    pub const fn tuning(&self) -> &ConflictTuning {
        &self.tuning
    }

    /// Every conflicting region pair, in a fixed order.
    #[must_use]
    pub fn detect(&self, makeup: &MakeupConfig, surgery: &SurgeryConfig) -> Vec<ConflictKind> {
        let t = &self.tuning;
        let mut conflicts = Vec::new();
        if makeup.lipstick.is_some()
            && surgery
                .jawline
                .as_ref()
                .is_some_and(|j| j.length.abs() > t.jawline_length_threshold)
        {
            conflicts.push(ConflictKind::LipstickJawline);
        }
        if makeup.eyeshadow.is_some()
            && surgery
                .eye
                .as_ref()
                .is_some_and(|e| e.size.abs() > t.eye_size_threshold)
        {
            conflicts.push(ConflictKind::EyeshadowEyeSurgery);
        }
        if makeup.blush.is_some()
            && surgery
                .cheekbone
                .as_ref()
                .is_some_and(|c| c.width.abs() > t.cheekbone_width_threshold)
        {
            conflicts.push(ConflictKind::BlushCheekbone);
        }
        conflicts
    }

    /// Apply `policy` to each distinct conflict and return the adjusted
    /// configurations. With no conflicts both are returned unchanged.
    #[must_use]
    pub fn resolve(
        &self,
        conflicts: &[ConflictKind],
        policy: ConflictPolicy,
        makeup: &MakeupConfig,
        surgery: &SurgeryConfig,
    ) -> (MakeupConfig, SurgeryConfig) {
        let mut makeup = makeup.clone();
        let mut surgery = surgery.clone();
        let distinct: BTreeSet<ConflictKind> = conflicts.iter().copied().collect();
        let t = &self.tuning;

        for conflict in distinct {
            match (policy, conflict) {
                (ConflictPolicy::Override, _) => {}
                (ConflictPolicy::Blend, ConflictKind::LipstickJawline) => {
                    if let Some(lipstick) = &mut makeup.lipstick {
                        lipstick.intensity *= t.lipstick_damping;
                    }
                    if let Some(jawline) = &mut surgery.jawline {
                        jawline.length *= t.geometry_damping;
                    }
                }
                (ConflictPolicy::Blend, ConflictKind::EyeshadowEyeSurgery) => {
                    if let Some(eyeshadow) = &mut makeup.eyeshadow {
                        eyeshadow.intensity *= t.eyeshadow_damping;
                    }
                    if let Some(eye) = &mut surgery.eye {
                        eye.size *= t.geometry_damping;
                    }
                }
                (ConflictPolicy::Blend, ConflictKind::BlushCheekbone) => {
                    if let Some(blush) = &mut makeup.blush {
                        blush.intensity *= t.blush_damping;
                    }
                    if let Some(cheekbone) = &mut surgery.cheekbone {
                        cheekbone.width *= t.geometry_damping;
                    }
                }
                (ConflictPolicy::Preserve, ConflictKind::LipstickJawline) => {
                    if let Some(jawline) = &mut surgery.jawline {
                        jawline.length = 0.0;
                    }
                }
                (ConflictPolicy::Preserve, ConflictKind::EyeshadowEyeSurgery) => {
                    if let Some(eye) = &mut surgery.eye {
                        eye.size = 0.0;
                    }
                }
                (ConflictPolicy::Preserve, ConflictKind::BlushCheekbone) => {
                    if let Some(cheekbone) = &mut surgery.cheekbone {
                        cheekbone.width = 0.0;
                    }
                }
            }
        }
        (makeup, surgery)
    }
}
