//! Seams to the outside world: effect appliers and landmark detection.
//!
//! An [`EffectApplier`] turns `(image, landmarks, config)` into a new
//! image and, for geometry effects, new landmarks. Appliers are pure with
//! respect to their inputs and are shared read-only between pipelines,
//! so they must be `Send + Sync`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::appliers::{MakeupApplier, SurgeryApplier};
use crate::effect::{EffectConfig, EffectId};
use crate::types::{ApplierError, LandmarkSet, PipelineError, RgbaImage};

/// Output of one applier call.
#[derive(Debug, Clone)]
pub struct AppliedEffect {
    /// The new image, same dimensions as the input.
    pub image: RgbaImage,
    /// Moved landmarks, or `None` if the effect does not move any.
    pub landmarks: Option<LandmarkSet>,
}

impl AppliedEffect {
    /// An appearance-only result.
    #[must_use]
    pub const fn image(image: RgbaImage) -> Self {
        Self {
            image,
            landmarks: None,
        }
    }
}

/// Renders one effect.
pub trait EffectApplier: Send + Sync {
    /// Apply `config` to `image`.
    ///
    /// # Errors
    ///
    /// Any [`ApplierError`]; the orchestrator contains it and keeps the
    /// effect's previous output.
    fn apply(
        &self,
        image: &RgbaImage,
        landmarks: &LandmarkSet,
        config: &EffectConfig,
    ) -> Result<AppliedEffect, ApplierError>;
}

impl<F> EffectApplier for F
where
    F: Fn(&RgbaImage, &LandmarkSet, &EffectConfig) -> Result<AppliedEffect, ApplierError>
        + Send
        + Sync,
{
    fn apply(
        &self,
        image: &RgbaImage,
        landmarks: &LandmarkSet,
        config: &EffectConfig,
    ) -> Result<AppliedEffect, ApplierError> {
        self(image, landmarks, config)
    }
}

/// Finds facial landmarks in an image.
pub trait LandmarkDetector {
    /// Landmarks of the most prominent face, or `None` if no face was
    /// found.
    fn detect(&self, image: &RgbaImage) -> Option<LandmarkSet>;
}

impl<F> LandmarkDetector for F
where
    F: Fn(&RgbaImage) -> Option<LandmarkSet>,
{
    fn detect(&self, image: &RgbaImage) -> Option<LandmarkSet> {
        self(image)
    }
}

/// By-id lookup of appliers.
#[derive(Clone, Default)]
pub struct ApplierRegistry {
    appliers: HashMap<EffectId, Arc<dyn EffectApplier>>,
}

impl fmt::Debug for ApplierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplierRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl ApplierRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in applier for every built-in effect.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        let makeup: Arc<dyn EffectApplier> = Arc::new(MakeupApplier::default());
        for id in [
            EffectId::FOUNDATION,
            EffectId::EYESHADOW,
            EffectId::BLUSH,
            EffectId::LIPSTICK,
            EffectId::EYELINER,
        ] {
            registry.register_shared(id, Arc::clone(&makeup));
        }

        let surgery: Arc<dyn EffectApplier> = Arc::new(SurgeryApplier::default());
        for id in [
            EffectId::NOSE_SURGERY,
            EffectId::EYE_SURGERY,
            EffectId::JAWLINE_SURGERY,
            EffectId::CHEEKBONE_SURGERY,
        ] {
            registry.register_shared(id, Arc::clone(&surgery));
        }

        info!(count = registry.len(), "Registered built-in appliers");
        registry
    }

    /// Register an applier. Overwrites any previous applier for `id`.
    pub fn register(&mut self, id: EffectId, applier: impl EffectApplier + 'static) {
        self.register_shared(id, Arc::new(applier));
    }

    /// Register an already shared applier. Overwrites any previous
    /// applier for `id`.
    pub fn register_shared(&mut self, id: EffectId, applier: Arc<dyn EffectApplier>) {
        self.appliers.insert(id, applier);
    }

    /// Register an applier unless one already exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if `id` is taken.
    pub fn try_register(
        &mut self,
        id: EffectId,
        applier: impl EffectApplier + 'static,
    ) -> Result<(), PipelineError> {
        if self.appliers.contains_key(&id) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "an applier for `{id}` is already registered"
            )));
        }
        self.register(id, applier);
        Ok(())
    }

    /// Look up the applier for `id`.
    #[must_use]
    pub fn get(&self, id: &EffectId) -> Option<&Arc<dyn EffectApplier>> {
        self.appliers.get(id)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> BTreeSet<EffectId> {
        self.appliers.keys().cloned().collect()
    }

    /// Number of registered appliers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.appliers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.appliers.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::effect::NoseConfig;

    fn identity(
        image: &RgbaImage,
        _: &LandmarkSet,
        _: &EffectConfig,
    ) -> Result<AppliedEffect, ApplierError> {
        Ok(AppliedEffect::image(image.clone()))
    }

    #[test]
    fn empty_registry() {
        let reg = ApplierRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.get(&EffectId::BLUSH).is_none());
    }

    #[test]
    fn builtins_cover_every_builtin_effect() {
        let reg = ApplierRegistry::with_builtins();
        assert_eq!(reg.len(), EffectId::BUILTIN.len());
        assert_eq!(reg.ids(), EffectId::BUILTIN.into_iter().collect());
    }

    #[test]
    fn register_overwrites_try_register_refuses() {
        let mut reg = ApplierRegistry::with_builtins();
        reg.register(EffectId::BLUSH, identity);
        assert!(reg.try_register(EffectId::BLUSH, identity).is_err());
        assert!(reg.try_register(EffectId::new("freckles"), identity).is_ok());
        assert_eq!(reg.len(), EffectId::BUILTIN.len() + 1);
    }

    #[test]
    fn closures_are_appliers() {
        let mut reg = ApplierRegistry::new();
        reg.register(
            EffectId::NOSE_SURGERY,
            |_: &RgbaImage, _: &LandmarkSet, _: &EffectConfig| -> Result<AppliedEffect, ApplierError> {
                Err(ApplierError::Failed("boom".to_owned()))
            },
        );
        let applier = reg.get(&EffectId::NOSE_SURGERY).unwrap();
        let result = applier.apply(
            &RgbaImage::new(1, 1),
            &LandmarkSet::default(),
            &EffectConfig::NoseSurgery(NoseConfig::default()),
        );
        assert_eq!(result.unwrap_err(), ApplierError::Failed("boom".to_owned()));
    }

    #[test]
    fn closures_are_detectors() {
        let none = |_: &RgbaImage| -> Option<LandmarkSet> { None };
        assert!(none.detect(&RgbaImage::new(1, 1)).is_none());
    }
}
