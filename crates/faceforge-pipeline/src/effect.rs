//! Effect identities, layers and configurations.
//!
//! Every supported effect kind has exactly one configuration struct and
//! one [`EffectConfig`] variant. Appliers dispatch on the variant, so
//! adding an effect kind is a compile-time change everywhere it matters.
//!
//! Effects fall into two families: appearance (makeup, recolors pixels
//! inside a region) and geometry (surgery, moves landmarks and warps the
//! pixels around them). The conflict resolver works on the two families
//! as a whole, grouped into [`MakeupConfig`] and [`SurgeryConfig`].

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Color, PipelineError};

/// Stable string key of an effect (e.g. `"lipstick"`, `"nose_surgery"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Cow<'static, str>);

impl EffectId {
    /// Skin-tone base.
    pub const FOUNDATION: Self = Self(Cow::Borrowed("foundation"));
    /// Eyelid color.
    pub const EYESHADOW: Self = Self(Cow::Borrowed("eyeshadow"));
    /// Cheek color.
    pub const BLUSH: Self = Self(Cow::Borrowed("blush"));
    /// Lip color.
    pub const LIPSTICK: Self = Self(Cow::Borrowed("lipstick"));
    /// Lash-line accent.
    pub const EYELINER: Self = Self(Cow::Borrowed("eyeliner"));
    /// Nose reshaping.
    pub const NOSE_SURGERY: Self = Self(Cow::Borrowed("nose_surgery"));
    /// Eye reshaping.
    pub const EYE_SURGERY: Self = Self(Cow::Borrowed("eye_surgery"));
    /// Jawline reshaping.
    pub const JAWLINE_SURGERY: Self = Self(Cow::Borrowed("jawline_surgery"));
    /// Cheekbone reshaping.
    pub const CHEEKBONE_SURGERY: Self = Self(Cow::Borrowed("cheekbone_surgery"));

    /// Every built-in effect id, appearance effects first.
    pub const BUILTIN: [Self; 9] = [
        Self::FOUNDATION,
        Self::EYESHADOW,
        Self::BLUSH,
        Self::LIPSTICK,
        Self::EYELINER,
        Self::NOSE_SURGERY,
        Self::EYE_SURGERY,
        Self::JAWLINE_SURGERY,
        Self::CHEEKBONE_SURGERY,
    ];

    /// Create an id from any string. Custom ids are allowed; they only
    /// need a registered applier and an explicit layer to take part in a
    /// render.
    #[must_use]
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EffectId {
    fn from(id: &'static str) -> Self {
        Self(Cow::Borrowed(id))
    }
}

/// Composition-order bucket.
///
/// The derived `Ord` is the composition order: lower layers are applied
/// to the running image first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectLayer {
    /// The unmodified source image.
    Base = 0,
    /// Large-scale geometry changes (reshaping a region).
    SurgeryShape = 1,
    /// Fine geometry changes.
    SurgeryDetail = 2,
    /// Skin-tone base makeup.
    MakeupBase = 3,
    /// Region color makeup.
    MakeupColor = 4,
    /// Lines and accents drawn on top of color.
    MakeupAccent = 5,
    /// Post-processing over the composed face.
    Final = 6,
}

impl EffectLayer {
    /// The fixed layer of a built-in effect, or `None` for custom ids.
    #[must_use]
    pub fn for_effect(id: &EffectId) -> Option<Self> {
        let layer = match id.as_str() {
            "nose_surgery" | "eye_surgery" | "jawline_surgery" | "cheekbone_surgery" => {
                Self::SurgeryShape
            }
            "foundation" => Self::MakeupBase,
            "eyeshadow" | "blush" => Self::MakeupColor,
            "lipstick" | "eyeliner" => Self::MakeupAccent,
            _ => return None,
        };
        Some(layer)
    }
}

impl fmt::Display for EffectLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str("Base"),
            Self::SurgeryShape => f.write_str("SurgeryShape"),
            Self::SurgeryDetail => f.write_str("SurgeryDetail"),
            Self::MakeupBase => f.write_str("MakeupBase"),
            Self::MakeupColor => f.write_str("MakeupColor"),
            Self::MakeupAccent => f.write_str("MakeupAccent"),
            Self::Final => f.write_str("Final"),
        }
    }
}

/// Appearance or geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectFamily {
    /// Recolors pixels; never moves landmarks.
    Appearance,
    /// Moves landmarks and warps pixels.
    Geometry,
}

/// How a makeup color combines with the underlying skin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Straight alpha blend toward the color.
    #[default]
    Normal,
    /// Darkens: `base * color`.
    Multiply,
    /// Multiply in the shadows, screen in the highlights.
    Overlay,
    /// Gentle contrast (Pegtop formula).
    SoftLight,
    /// Lightens: inverse multiply of the inverses.
    Screen,
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Multiply => f.write_str("Multiply"),
            Self::Overlay => f.write_str("Overlay"),
            Self::SoftLight => f.write_str("SoftLight"),
            Self::Screen => f.write_str("Screen"),
        }
    }
}

/// Eyeshadow placement style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeshadowStyle {
    /// Soft single wash over the lid.
    #[default]
    Natural,
    /// Dense color with a wider feather.
    Smoky,
    /// Sharp lid edge, minimal feather.
    CutCrease,
    /// Lighter center, darker edges.
    Halo,
    /// Vertical blend from the first color to the last.
    Gradient,
}

/// Foundation surface finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoundationFinish {
    /// No adjustment.
    #[default]
    Natural,
    /// Slightly darker, flat.
    Matte,
    /// Slightly brighter, luminous.
    Dewy,
}

/// Eyeliner shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyelinerStyle {
    /// Thin line following the lash line.
    #[default]
    Natural,
    /// Line extended past the outer corner.
    Winged,
    /// Thick line.
    Dramatic,
}

/// Foundation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundationConfig {
    /// Foundation shade.
    pub color: Color,
    /// 0.0 (sheer) to 1.0 (full coverage).
    pub coverage: f64,
    /// Surface finish.
    #[serde(default)]
    pub finish: FoundationFinish,
}

/// Eyeshadow settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeshadowConfig {
    /// One or more shades; at least one is required.
    pub colors: Vec<Color>,
    /// Placement style.
    #[serde(default)]
    pub style: EyeshadowStyle,
    /// 0.0 to 1.0.
    pub intensity: f64,
    /// Color blend mode.
    #[serde(default)]
    pub blend_mode: BlendMode,
    /// 0.0 (matte) to 1.0 (shimmer).
    #[serde(default)]
    pub shimmer: f64,
}

/// Blush settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlushConfig {
    /// Blush shade.
    pub color: Color,
    /// 0.0 to 1.0.
    pub intensity: f64,
    /// Color blend mode.
    #[serde(default)]
    pub blend_mode: BlendMode,
}

/// Lipstick settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LipstickConfig {
    /// Lip shade.
    pub color: Color,
    /// 0.0 to 1.0.
    pub intensity: f64,
    /// 0.0 (matte) to 1.0 (glossy).
    #[serde(default)]
    pub glossiness: f64,
    /// Color blend mode.
    #[serde(default)]
    pub blend_mode: BlendMode,
}

/// Eyeliner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyelinerConfig {
    /// Liner shade.
    pub color: Color,
    /// 0.0 to 1.0, relative to eye height.
    pub thickness: f64,
    /// Line shape.
    #[serde(default)]
    pub style: EyelinerStyle,
    /// 0.0 to 1.0.
    #[serde(default = "full_intensity")]
    pub intensity: f64,
}

const fn full_intensity() -> f64 {
    1.0
}

/// Nose reshaping, every field in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NoseConfig {
    /// Tip height (positive lifts).
    pub height: f64,
    /// Alar width (positive widens).
    pub width: f64,
    /// Tip projection.
    pub tip: f64,
    /// Bridge width.
    pub bridge: f64,
}

/// Eye reshaping, every field in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeConfig {
    /// Scale about the eye center (positive enlarges).
    pub size: f64,
    /// Rounder (negative) to sharper (positive).
    pub shape: f64,
    /// Closer together (negative) to further apart (positive).
    pub position: f64,
    /// Outer-corner tilt (positive lifts).
    pub angle: f64,
}

/// Jawline reshaping, every field in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JawlineConfig {
    /// Jaw width (positive widens).
    pub width: f64,
    /// Jaw-angle sharpness.
    pub angle: f64,
    /// Chin length (positive lengthens).
    pub length: f64,
}

/// Cheekbone reshaping, every field in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CheekboneConfig {
    /// Cheekbone height (positive lifts).
    pub height: f64,
    /// Cheekbone width (positive widens).
    pub width: f64,
    /// Outward projection.
    pub prominence: f64,
}

fn check_unit(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfiguration(format!(
            "{name} must be within 0.0..=1.0, got {value}"
        )))
    }
}

fn check_signed(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && (-1.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfiguration(format!(
            "{name} must be within -1.0..=1.0, got {value}"
        )))
    }
}

impl FoundationConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if `coverage` is out
    /// of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit("foundation.coverage", self.coverage)
    }
}

impl EyeshadowConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if no color is given
    /// or a scalar is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.colors.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "eyeshadow.colors needs at least one color".to_owned(),
            ));
        }
        check_unit("eyeshadow.intensity", self.intensity)?;
        check_unit("eyeshadow.shimmer", self.shimmer)
    }
}

impl BlushConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if `intensity` is out
    /// of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit("blush.intensity", self.intensity)
    }
}

impl LipstickConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if a scalar is out
    /// of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit("lipstick.intensity", self.intensity)?;
        check_unit("lipstick.glossiness", self.glossiness)
    }
}

impl EyelinerConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if a scalar is out
    /// of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_unit("eyeliner.thickness", self.thickness)?;
        check_unit("eyeliner.intensity", self.intensity)
    }
}

impl NoseConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if an adjustment is
    /// out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_signed("nose_surgery.height", self.height)?;
        check_signed("nose_surgery.width", self.width)?;
        check_signed("nose_surgery.tip", self.tip)?;
        check_signed("nose_surgery.bridge", self.bridge)
    }
}

impl EyeConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if an adjustment is
    /// out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_signed("eye_surgery.size", self.size)?;
        check_signed("eye_surgery.shape", self.shape)?;
        check_signed("eye_surgery.position", self.position)?;
        check_signed("eye_surgery.angle", self.angle)
    }
}

impl JawlineConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if an adjustment is
    /// out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_signed("jawline_surgery.width", self.width)?;
        check_signed("jawline_surgery.angle", self.angle)?;
        check_signed("jawline_surgery.length", self.length)
    }
}

impl CheekboneConfig {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if an adjustment is
    /// out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_signed("cheekbone_surgery.height", self.height)?;
        check_signed("cheekbone_surgery.width", self.width)?;
        check_signed("cheekbone_surgery.prominence", self.prominence)
    }
}

/// Configuration of one effect, tagged by effect kind.
///
/// Serialized with an `"effect"` tag holding the effect id:
///
/// ```json
/// { "effect": "lipstick", "color": { "r": 200, "g": 30, "b": 60 }, "intensity": 0.8 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum EffectConfig {
    Foundation(FoundationConfig),
    Eyeshadow(EyeshadowConfig),
    Blush(BlushConfig),
    Lipstick(LipstickConfig),
    Eyeliner(EyelinerConfig),
    NoseSurgery(NoseConfig),
    EyeSurgery(EyeConfig),
    JawlineSurgery(JawlineConfig),
    CheekboneSurgery(CheekboneConfig),
}

impl EffectConfig {
    /// The id of the effect this configuration belongs to.
    #[must_use]
    pub const fn id(&self) -> EffectId {
        match self {
            Self::Foundation(_) => EffectId::FOUNDATION,
            Self::Eyeshadow(_) => EffectId::EYESHADOW,
            Self::Blush(_) => EffectId::BLUSH,
            Self::Lipstick(_) => EffectId::LIPSTICK,
            Self::Eyeliner(_) => EffectId::EYELINER,
            Self::NoseSurgery(_) => EffectId::NOSE_SURGERY,
            Self::EyeSurgery(_) => EffectId::EYE_SURGERY,
            Self::JawlineSurgery(_) => EffectId::JAWLINE_SURGERY,
            Self::CheekboneSurgery(_) => EffectId::CHEEKBONE_SURGERY,
        }
    }

    /// The effect's fixed composition layer.
    #[must_use]
    pub const fn layer(&self) -> EffectLayer {
        match self {
            Self::NoseSurgery(_)
            | Self::EyeSurgery(_)
            | Self::JawlineSurgery(_)
            | Self::CheekboneSurgery(_) => EffectLayer::SurgeryShape,
            Self::Foundation(_) => EffectLayer::MakeupBase,
            Self::Eyeshadow(_) | Self::Blush(_) => EffectLayer::MakeupColor,
            Self::Lipstick(_) | Self::Eyeliner(_) => EffectLayer::MakeupAccent,
        }
    }

    /// Appearance or geometry.
    #[must_use]
    pub const fn family(&self) -> EffectFamily {
        match self {
            Self::Foundation(_)
            | Self::Eyeshadow(_)
            | Self::Blush(_)
            | Self::Lipstick(_)
            | Self::Eyeliner(_) => EffectFamily::Appearance,
            Self::NoseSurgery(_)
            | Self::EyeSurgery(_)
            | Self::JawlineSurgery(_)
            | Self::CheekboneSurgery(_) => EffectFamily::Geometry,
        }
    }

    /// Check every field's range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] naming the first
    /// out-of-range field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            Self::Foundation(c) => c.validate(),
            Self::Eyeshadow(c) => c.validate(),
            Self::Blush(c) => c.validate(),
            Self::Lipstick(c) => c.validate(),
            Self::Eyeliner(c) => c.validate(),
            Self::NoseSurgery(c) => c.validate(),
            Self::EyeSurgery(c) => c.validate(),
            Self::JawlineSurgery(c) => c.validate(),
            Self::CheekboneSurgery(c) => c.validate(),
        }
    }
}

/// All appearance effects of a face, each optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeupConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foundation: Option<FoundationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyeshadow: Option<EyeshadowConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blush: Option<BlushConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lipstick: Option<LipstickConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyeliner: Option<EyelinerConfig>,
}

impl MakeupConfig {
    /// Returns `true` if no appearance effect is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.foundation.is_none()
            && self.eyeshadow.is_none()
            && self.blush.is_none()
            && self.lipstick.is_none()
            && self.eyeliner.is_none()
    }
}

/// All geometry effects of a face, each optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nose: Option<NoseConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eye: Option<EyeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jawline: Option<JawlineConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheekbone: Option<CheekboneConfig>,
}

impl SurgeryConfig {
    /// Returns `true` if no geometry effect is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.nose.is_none() && self.eye.is_none() && self.jawline.is_none() && self.cheekbone.is_none()
    }
}

/// The full configuration of a face: every configured effect of both
/// families.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Appearance effects.
    pub makeup: MakeupConfig,
    /// Geometry effects.
    pub surgery: SurgeryConfig,
}

impl FaceConfig {
    /// Build a face configuration from a list of effect configurations.
    /// Later entries for the same effect replace earlier ones.
    #[must_use]
    pub fn from_effects(effects: impl IntoIterator<Item = EffectConfig>) -> Self {
        let mut config = Self::default();
        for effect in effects {
            config.set(effect);
        }
        config
    }

    /// Every configured effect, appearance effects first.
    #[must_use]
    pub fn effects(&self) -> Vec<EffectConfig> {
        EffectId::BUILTIN
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Ids of every configured effect.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<EffectId> {
        EffectId::BUILTIN
            .into_iter()
            .filter(|id| self.get(id).is_some())
            .collect()
    }

    /// The configuration of one effect, if configured.
    #[must_use]
    pub fn get(&self, id: &EffectId) -> Option<EffectConfig> {
        let m = &self.makeup;
        let s = &self.surgery;
        match id.as_str() {
            "foundation" => m.foundation.clone().map(EffectConfig::Foundation),
            "eyeshadow" => m.eyeshadow.clone().map(EffectConfig::Eyeshadow),
            "blush" => m.blush.clone().map(EffectConfig::Blush),
            "lipstick" => m.lipstick.clone().map(EffectConfig::Lipstick),
            "eyeliner" => m.eyeliner.clone().map(EffectConfig::Eyeliner),
            "nose_surgery" => s.nose.clone().map(EffectConfig::NoseSurgery),
            "eye_surgery" => s.eye.clone().map(EffectConfig::EyeSurgery),
            "jawline_surgery" => s.jawline.clone().map(EffectConfig::JawlineSurgery),
            "cheekbone_surgery" => s.cheekbone.clone().map(EffectConfig::CheekboneSurgery),
            _ => None,
        }
    }

    /// Set (or replace) one effect's configuration.
    pub fn set(&mut self, config: EffectConfig) {
        match config {
            EffectConfig::Foundation(c) => self.makeup.foundation = Some(c),
            EffectConfig::Eyeshadow(c) => self.makeup.eyeshadow = Some(c),
            EffectConfig::Blush(c) => self.makeup.blush = Some(c),
            EffectConfig::Lipstick(c) => self.makeup.lipstick = Some(c),
            EffectConfig::Eyeliner(c) => self.makeup.eyeliner = Some(c),
            EffectConfig::NoseSurgery(c) => self.surgery.nose = Some(c),
            EffectConfig::EyeSurgery(c) => self.surgery.eye = Some(c),
            EffectConfig::JawlineSurgery(c) => self.surgery.jawline = Some(c),
            EffectConfig::CheekboneSurgery(c) => self.surgery.cheekbone = Some(c),
        }
    }

    /// Returns `true` if at least one appearance effect is configured.
    #[must_use]
    pub const fn has_appearance(&self) -> bool {
        !self.makeup.is_empty()
    }

    /// Returns `true` if at least one geometry effect is configured.
    #[must_use]
    pub const fn has_geometry(&self) -> bool {
        !self.surgery.is_empty()
    }

    /// Validate every configured effect.
    ///
    /// # Errors
    ///
    /// Returns the first [`PipelineError::InvalidConfiguration`] found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.effects().iter().try_for_each(EffectConfig::validate)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lipstick(intensity: f64) -> EffectConfig {
        EffectConfig::Lipstick(LipstickConfig {
            color: Color::rgb(180, 30, 60),
            intensity,
            glossiness: 0.2,
            blend_mode: BlendMode::Normal,
        })
    }

    #[test]
    fn layers_are_ordered() {
        assert!(EffectLayer::Base < EffectLayer::SurgeryShape);
        assert!(EffectLayer::SurgeryShape < EffectLayer::SurgeryDetail);
        assert!(EffectLayer::SurgeryDetail < EffectLayer::MakeupBase);
        assert!(EffectLayer::MakeupBase < EffectLayer::MakeupColor);
        assert!(EffectLayer::MakeupColor < EffectLayer::MakeupAccent);
        assert!(EffectLayer::MakeupAccent < EffectLayer::Final);
    }

    #[test]
    fn layer_table_matches_config_variants() {
        let face = FaceConfig::from_effects([
            lipstick(0.5),
            EffectConfig::JawlineSurgery(JawlineConfig::default()),
            EffectConfig::Foundation(FoundationConfig {
                color: Color::rgb(230, 200, 180),
                coverage: 0.5,
                finish: FoundationFinish::Natural,
            }),
        ]);
        for config in face.effects() {
            assert_eq!(EffectLayer::for_effect(&config.id()), Some(config.layer()));
        }
    }

    #[test]
    fn custom_ids_have_no_builtin_layer() {
        assert_eq!(EffectLayer::for_effect(&EffectId::new("freckles")), None);
    }

    #[test]
    fn tagged_json_round_trips_through_id() {
        let json = r#"{"effect":"nose_surgery","height":0.2}"#;
        let config: EffectConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.id(), EffectId::NOSE_SURGERY);
        assert_eq!(config.family(), EffectFamily::Geometry);
        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back["effect"], "nose_surgery");
    }

    #[test]
    fn out_of_range_intensity_is_rejected() {
        assert!(lipstick(1.5).validate().is_err());
        assert!(lipstick(f64::NAN).validate().is_err());
        assert!(lipstick(1.0).validate().is_ok());
    }

    #[test]
    fn eyeshadow_needs_a_color() {
        let config = EyeshadowConfig {
            colors: Vec::new(),
            style: EyeshadowStyle::Natural,
            intensity: 0.5,
            blend_mode: BlendMode::Multiply,
            shimmer: 0.0,
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn geometry_range_is_signed() {
        let ok = JawlineConfig {
            length: -1.0,
            ..JawlineConfig::default()
        };
        assert!(ok.validate().is_ok());
        let bad = JawlineConfig {
            length: -1.01,
            ..JawlineConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn face_config_set_replaces() {
        let mut face = FaceConfig::default();
        assert!(!face.has_appearance());
        face.set(lipstick(0.3));
        face.set(lipstick(0.6));
        assert_eq!(face.effects(), vec![lipstick(0.6)]);
        assert!(face.has_appearance());
        assert!(!face.has_geometry());
        assert_eq!(face.ids().len(), 1);
    }
}
