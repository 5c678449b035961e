//! Per-effect state and the store that owns it.
//!
//! Each configured effect keeps its latest output as both the finished
//! image and the signed change it made to its input. A clean effect is
//! replayed onto the running image by adding that change back, which is
//! exact whenever its input is unchanged and close to exact otherwise.
//!
//! Every output also carries a [`Lineage`]: a unique generation and a
//! token naming the chain of outputs it was rendered on top of. A replay
//! is exact exactly when the running chain token equals the output's
//! `underlay`.

use std::collections::BTreeMap;
use std::hash::Hasher;
use std::time::Duration;

use siphasher::sip::SipHasher13;
use web_time::Instant;

use crate::effect::{EffectConfig, EffectId, EffectLayer, FaceConfig};
use crate::types::{ApplierError, LandmarkSet, Point, RgbaImage};

/// Sparse signed per-pixel change an effect applied to its input.
///
/// Only pixels that actually changed are stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PixelDelta {
    width: u32,
    height: u32,
    changes: Vec<(u32, [i16; 4])>,
}

impl PixelDelta {
    /// The change that turns `before` into `after`.
    ///
    /// Both images must have the same dimensions; mismatched input yields
    /// an empty delta.
    #[must_use]
    pub fn between(before: &RgbaImage, after: &RgbaImage) -> Self {
        let (width, height) = before.dimensions();
        if after.dimensions() != (width, height) {
            return Self::default();
        }
        let changes = before
            .pixels()
            .zip(after.pixels())
            .enumerate()
            .filter(|(_, (b, a))| b != a)
            .map(|(i, (b, a))| {
                let d: [i16; 4] =
                    std::array::from_fn(|c| i16::from(a.0[c]) - i16::from(b.0[c]));
                (u32::try_from(i).unwrap_or(u32::MAX), d)
            })
            .collect();
        Self {
            width,
            height,
            changes,
        }
    }

    /// Number of changed pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns `true` if no pixel changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Add the change to `image`, clamping each channel to `0..=255`.
    ///
    /// Does nothing if `image` has different dimensions than the images
    /// the delta was taken from.
    pub fn apply(&self, image: &mut RgbaImage) {
        if image.dimensions() != (self.width, self.height) || self.width == 0 {
            return;
        }
        let width = self.width;
        for &(index, d) in &self.changes {
            let pixel = image.get_pixel_mut(index % width, index / width);
            for (channel, delta) in pixel.0.iter_mut().zip(d) {
                *channel = u8::try_from((i16::from(*channel) + delta).clamp(0, 255)).unwrap_or(u8::MAX);
            }
        }
    }
}

/// Per-landmark displacement a geometry effect applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkDelta(Vec<Point>);

impl LandmarkDelta {
    /// The displacement from `before` to `after`, or `None` if nothing
    /// moved or the sets differ in length.
    #[must_use]
    pub fn between(before: &LandmarkSet, after: &LandmarkSet) -> Option<Self> {
        if before.len() != after.len() || before == after {
            return None;
        }
        let offsets = before
            .points()
            .iter()
            .zip(after.points())
            .map(|(b, a)| Point {
                x: a.x - b.x,
                y: a.y - b.y,
                z: a.z - b.z,
            })
            .collect();
        Some(Self(offsets))
    }

    /// Add the displacement to `landmarks`. Sets of a different length
    /// are left alone.
    pub fn apply(&self, landmarks: &mut LandmarkSet) {
        if landmarks.len() != self.0.len() {
            return;
        }
        for (p, d) in landmarks.points_mut().iter_mut().zip(&self.0) {
            p.x += d.x;
            p.y += d.y;
            p.z += d.z;
        }
    }
}

/// Identity of one output within the composition chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Lineage {
    /// Unique per output within one orchestrator.
    pub generation: u64,
    /// Chain token of the running composition the output was rendered
    /// on.
    pub underlay: u64,
}

impl Lineage {
    /// Token of an empty chain rendered at the given working scale.
    #[must_use]
    pub fn root(scale: f64) -> u64 {
        Self::extend(0, scale.to_bits())
    }

    /// Token after appending the output with `generation` to `token`.
    #[must_use]
    pub fn extend(token: u64, generation: u64) -> u64 {
        let mut hasher = SipHasher13::new();
        hasher.write_u64(token);
        hasher.write_u64(generation);
        hasher.finish()
    }
}

/// The last successful output of one effect, at full resolution.
#[derive(Debug, Clone)]
pub struct EffectOutput {
    /// The image the applier produced (up-scaled if rendered smaller).
    pub image: RgbaImage,
    /// Landmarks after the effect; equal to its input for appearance
    /// effects.
    pub landmarks: LandmarkSet,
    /// Change applied to the input image.
    pub pixels: PixelDelta,
    /// Change applied to the input landmarks, if any moved.
    pub landmark_delta: Option<LandmarkDelta>,
    pub lineage: Lineage,
}

impl EffectOutput {
    /// Record an output against the input it was computed from.
    #[must_use]
    pub fn new(
        input_image: &RgbaImage,
        input_landmarks: &LandmarkSet,
        image: RgbaImage,
        landmarks: LandmarkSet,
        lineage: Lineage,
    ) -> Self {
        Self {
            pixels: PixelDelta::between(input_image, &image),
            landmark_delta: LandmarkDelta::between(input_landmarks, &landmarks),
            image,
            landmarks,
            lineage,
        }
    }

    /// Whether replaying onto the chain named by `underlay` reproduces
    /// the applier's output exactly.
    #[must_use]
    pub fn is_exact_on(&self, underlay: u64) -> bool {
        self.lineage.underlay == underlay
    }

    /// Replay this output onto a running image and landmark set.
    pub fn replay(&self, image: &mut RgbaImage, landmarks: &mut LandmarkSet) {
        self.pixels.apply(image);
        if let Some(delta) = &self.landmark_delta {
            delta.apply(landmarks);
        }
    }
}

/// Everything the pipeline knows about one configured effect.
#[derive(Debug, Clone)]
pub struct EffectState {
    /// Effect id.
    pub id: EffectId,
    /// Composition layer, fixed at creation.
    pub layer: EffectLayer,
    /// Configuration as requested by the caller.
    pub config: EffectConfig,
    /// Configuration the cached output was rendered with. Differs from
    /// `config` when conflict resolution attenuated it.
    pub applied_config: Option<EffectConfig>,
    /// Last successful output.
    pub output: Option<EffectOutput>,
    /// Whether `output` is stale.
    pub dirty: bool,
    /// When the applier last ran.
    pub last_update: Option<Instant>,
    /// How long the applier took on its last run.
    pub last_duration: Duration,
    /// Error from the most recent applier run, cleared on success.
    pub last_error: Option<ApplierError>,
}

impl EffectState {
    fn new(config: EffectConfig) -> Self {
        Self {
            id: config.id(),
            layer: config.layer(),
            config,
            applied_config: None,
            output: None,
            dirty: true,
            last_update: None,
            last_duration: Duration::ZERO,
            last_error: None,
        }
    }
}

/// Owner of the base image, base landmarks and every [`EffectState`].
#[derive(Debug, Clone, Default)]
pub struct EffectStore {
    base_image: RgbaImage,
    base_landmarks: LandmarkSet,
    states: BTreeMap<EffectId, EffectState>,
}

impl EffectStore {
    /// An empty store with a 0x0 base image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything: new base, one dirty state per configured
    /// effect.
    pub fn initialize(&mut self, base_image: RgbaImage, base_landmarks: LandmarkSet, config: &FaceConfig) {
        self.base_image = base_image;
        self.base_landmarks = base_landmarks;
        self.states = config
            .effects()
            .into_iter()
            .map(|c| (c.id(), EffectState::new(c)))
            .collect();
    }

    /// The unmodified source image.
    #[must_use]
    pub const fn base_image(&self) -> &RgbaImage {
        &self.base_image
    }

    /// The source landmarks.
    #[must_use]
    pub const fn base_landmarks(&self) -> &LandmarkSet {
        &self.base_landmarks
    }

    /// State of one effect.
    #[must_use]
    pub fn get(&self, id: &EffectId) -> Option<&EffectState> {
        self.states.get(id)
    }

    /// Mutable state of one effect.
    pub fn get_mut(&mut self, id: &EffectId) -> Option<&mut EffectState> {
        self.states.get_mut(id)
    }

    /// Store a new configuration and mark the effect dirty. Creates the
    /// state on first use. Does not recompute anything.
    ///
    /// Returns `true` if the state was newly created.
    pub fn set_config(&mut self, config: EffectConfig) -> bool {
        let id = config.id();
        if let Some(state) = self.states.get_mut(&id) {
            debug_assert_eq!(state.layer, config.layer());
            state.config = config;
            state.dirty = true;
            false
        } else {
            self.states.insert(id, EffectState::new(config));
            true
        }
    }

    /// Mark one effect dirty. Returns `false` if it is not configured.
    pub fn mark_dirty(&mut self, id: &EffectId) -> bool {
        self.states.get_mut(id).is_some_and(|state| {
            state.dirty = true;
            true
        })
    }

    /// Mark every effect dirty.
    pub fn mark_all_dirty(&mut self) {
        for state in self.states.values_mut() {
            state.dirty = true;
        }
    }

    /// Returns `true` if `id` is configured.
    #[must_use]
    pub fn contains(&self, id: &EffectId) -> bool {
        self.states.contains_key(id)
    }

    /// Iterate states in id order.
    pub fn iter(&self) -> impl Iterator<Item = &EffectState> {
        self.states.values()
    }

    /// Number of configured effects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Returns `true` if no effect is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The requested configuration of every effect, as a whole.
    #[must_use]
    pub fn face_config(&self) -> FaceConfig {
        FaceConfig::from_effects(self.states.values().map(|s| s.config.clone()))
    }

    /// Drop every state and the base image.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
