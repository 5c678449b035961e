//! Shared types for the faceforge effect pipeline.

use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictPolicy, ConflictTuning};
use crate::effect::EffectId;
use crate::performance::PerformanceConfig;
use crate::scale::ResampleFilter;

/// Re-export `RgbaImage` so downstream crates can hand images to the
/// pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// Re-export `GrayImage`, used for region masks by the built-in appliers.
pub use image::GrayImage;

/// A facial landmark in image coordinates.
///
/// `z` carries the relative depth reported by face-mesh style detectors.
/// The pipeline never interprets it beyond carrying it through warps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
    /// Relative depth.
    #[serde(default)]
    pub z: f64,
}

impl Point {
    /// Create a new point with zero depth.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Squared Euclidean distance to another point in the image plane.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point in the image plane.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Scale the image-plane coordinates, leaving depth untouched.
    #[must_use]
    pub fn scaled(self, sx: f64, sy: f64) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            z: self.z,
        }
    }
}

/// An ordered set of facial landmarks.
///
/// Indices follow the 468-point face-mesh convention. Effects address
/// regions by landmark index, so the order is significant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet(Vec<Point>);

impl LandmarkSet {
    /// Number of landmarks produced by a face-mesh detector.
    pub const FACE_MESH_LEN: usize = 468;

    /// Create a landmark set from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the set has no landmarks.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of landmarks.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the landmark at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Point> {
        self.0.get(index).copied()
    }

    /// Returns a slice of all landmarks.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Returns a mutable slice of all landmarks.
    pub fn points_mut(&mut self) -> &mut [Point] {
        &mut self.0
    }

    /// Consumes the set and returns the underlying vector.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Scale every landmark's image-plane coordinates.
    #[must_use]
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self(self.0.iter().map(|p| p.scaled(sx, sy)).collect())
    }

    /// Mean position of all landmarks, or `None` for an empty set.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centroid(&self) -> Option<Point> {
        if self.0.is_empty() {
            return None;
        }
        let n = self.0.len() as f64;
        let (sx, sy) = self
            .0
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }
}

impl From<Vec<Point>> for LandmarkSet {
    fn from(points: Vec<Point>) -> Self {
        Self(points)
    }
}

/// An 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    #[serde(default = "Color::opaque")]
    pub a: u8,
}

impl Color {
    /// Create an opaque color.
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    const fn opaque() -> u8 {
        255
    }

    /// The color as an `image` pixel.
    #[must_use]
    pub const fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Tunables of an [`Orchestrator`](crate::Orchestrator).
///
/// Every field has a default matching the documented behavior of the
/// pipeline. The thresholds and damping factors inside [`ConflictTuning`]
/// are policy constants, not physical ones: they only need to express
/// "a moderate attenuation".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of composed results kept by the result cache.
    pub cache_capacity: usize,

    /// Whether composed results are memoized at all.
    pub enable_caching: bool,

    /// How appearance/geometry conflicts are resolved before execution.
    pub conflict_policy: ConflictPolicy,

    /// Region thresholds and damping factors for conflict handling.
    pub conflict: ConflictTuning,

    /// Adaptive quality controller settings.
    pub performance: PerformanceConfig,

    /// Filter used to down-scale the working image and up-scale applier
    /// output when the quality level is below `High`.
    pub resample_filter: ResampleFilter,
}

impl OrchestratorConfig {
    /// Default result cache capacity.
    pub const DEFAULT_CACHE_CAPACITY: usize = 10;

    /// Caching is on by default.
    pub const DEFAULT_ENABLE_CACHING: bool = true;

    /// Default conflict policy.
    pub const DEFAULT_CONFLICT_POLICY: ConflictPolicy = ConflictPolicy::Blend;

    /// Default resampling filter.
    pub const DEFAULT_RESAMPLE_FILTER: ResampleFilter = ResampleFilter::Triangle;

    /// Check the configuration for values the pipeline cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.conflict.validate()?;
        self.performance.validate()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: Self::DEFAULT_CACHE_CAPACITY,
            enable_caching: Self::DEFAULT_ENABLE_CACHING,
            conflict_policy: Self::DEFAULT_CONFLICT_POLICY,
            conflict: ConflictTuning::default(),
            performance: PerformanceConfig::default(),
            resample_filter: Self::DEFAULT_RESAMPLE_FILTER,
        }
    }
}

/// Errors surfaced to callers of the pipeline.
///
/// Per-effect failures are [`ApplierError`]s and never escape an update;
/// everything here is a configuration or input problem reported
/// synchronously.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The dependency graph restricted to the requested effects has a cycle.
    #[error("cyclic dependency among effects: {}", join_ids(effects))]
    CyclicDependency {
        /// Effects that could not be ordered, sorted by id.
        effects: Vec<EffectId>,
    },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An update was submitted before [`initialize`](crate::Orchestrator::initialize).
    #[error("pipeline has not been initialized")]
    NotInitialized,

    /// The input image data was empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The landmark detector found no face.
    #[error("no face landmarks detected")]
    NoLandmarks,
}

fn join_ids(ids: &[EffectId]) -> String {
    ids.iter()
        .map(EffectId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a single effect applier.
///
/// Contained by the orchestrator: the failing effect keeps its previous
/// output and the rest of the update proceeds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplierError {
    /// No applier is registered for the effect.
    #[error("no applier registered for effect `{0}`")]
    NotRegistered(EffectId),

    /// The landmark set is too short for the regions this effect uses.
    #[error("effect needs {required} landmarks, got {available}")]
    InsufficientLandmarks {
        /// Minimum landmark count required.
        required: usize,
        /// Landmark count supplied.
        available: usize,
    },

    /// The applier was handed a configuration variant it does not handle.
    #[error("applier does not support `{effect}` configurations")]
    UnsupportedConfig {
        /// Id of the configuration variant received.
        effect: EffectId,
    },

    /// The applier returned an image of different dimensions.
    #[error("applier returned a {got_width}x{got_height} image for a {width}x{height} input")]
    DimensionMismatch {
        /// Input width.
        width: u32,
        /// Input height.
        height: u32,
        /// Returned width.
        got_width: u32,
        /// Returned height.
        got_height: u32,
    },

    /// The applier returned a landmark set of a different length.
    #[error("applier returned {got} landmarks for {expected} inputs")]
    LandmarkCountChanged {
        /// Input landmark count.
        expected: usize,
        /// Returned landmark count.
        got: usize,
    },

    /// Any other failure reported by the applier.
    #[error("{0}")]
    Failed(String),
}
