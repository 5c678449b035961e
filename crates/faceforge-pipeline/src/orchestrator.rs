//! The update orchestrator: owns every piece of pipeline state and turns
//! effect updates into composed results.
//!
//! ```rust
//! # use std::sync::Arc;
//! # use faceforge_pipeline::*;
//! # fn run(photo: RgbaImage, landmarks: LandmarkSet) -> Result<(), PipelineError> {
//! let registry = Arc::new(ApplierRegistry::with_builtins());
//! let mut orchestrator = Orchestrator::new(OrchestratorConfig::default(), registry)?;
//!
//! let mut face = FaceConfig::default();
//! face.set(EffectConfig::Lipstick(LipstickConfig {
//!     color: Color::rgb(180, 30, 60),
//!     intensity: 0.8,
//!     glossiness: 0.2,
//!     blend_mode: BlendMode::Normal,
//! }));
//! orchestrator.initialize(photo, landmarks, &face)?;
//!
//! orchestrator.update_effect(
//!     EffectConfig::JawlineSurgery(JawlineConfig { width: -0.3, ..Default::default() }),
//!     UpdateMode::Incremental,
//! )?;
//! let result = orchestrator.get_current_result();
//! # Ok(())
//! # }
//! ```
//!
//! # Passes
//!
//! Every drained request runs one pass:
//!
//! 1. The conflict resolver turns the requested configuration into the
//!    effective one. Effects whose effective configuration changed are
//!    marked dirty along with their transitive dependents.
//! 2. The result cache is consulted with the base image, base landmarks,
//!    effective configuration and quality level.
//! 3. On a miss, effects are composed onto the base image in layer
//!    order (dependency order within a layer). Dirty effects run their
//!    applier at the current working scale; clean ones replay their
//!    cached delta.
//! 4. The composed image is scored and published as the new
//!    [`IntegratedResult`]. It is cached only if every effect in it is
//!    exact: freshly rendered, or replayed onto the same chain of outputs
//!    it was rendered on, and not left over from a failed run.
//!
//! A cache hit publishes the stored result without touching any effect
//! state: dirty effects stay dirty with their previous output and are
//! rendered by the next pass that misses.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use web_time::Instant;

use crate::applier::{ApplierRegistry, LandmarkDetector};
use crate::cache::{CacheStats, Fingerprint, ResultCache};
use crate::conflict::{ConflictKind, ConflictResolver};
use crate::diagnostics::{EffectDiagnostics, EffectOutcome, PassDiagnostics, duration_ms, duration_serde};
use crate::effect::{EffectConfig, EffectId, EffectLayer, FaceConfig};
use crate::graph::DependencyGraph;
use crate::performance::{PerformanceController, QualityLevel};
use crate::quality::QualityAssessor;
use crate::scale::{ResampleFilter, downscale, merge_upscaled};
use crate::state::{EffectOutput, EffectState, EffectStore, Lineage};
use crate::types::{
    ApplierError, Dimensions, LandmarkSet, OrchestratorConfig, PipelineError, RgbaImage,
};

// ───────────────────────── Requests ──────────────────────────

/// How much of the pipeline an update invalidates.
///
/// Ordered from narrowest to widest; when two queued requests for one
/// effect are coalesced the wider mode is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// The target effect and its direct dependents.
    Selective,
    /// The target effect and everything downstream of it.
    #[default]
    Incremental,
    /// Every configured effect.
    FullRefresh,
}

/// One queued change to one effect.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub config: EffectConfig,
    pub mode: UpdateMode,
    /// Higher runs first.
    pub priority: i32,
    pub submitted_at: Instant,
}

impl UpdateRequest {
    #[must_use]
    pub fn new(config: EffectConfig, mode: UpdateMode) -> Self {
        Self {
            config,
            mode,
            priority: 0,
            submitted_at: Instant::now(),
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Id of the targeted effect.
    #[must_use]
    pub const fn id(&self) -> EffectId {
        self.config.id()
    }
}

/// Heap entry: priority descending, then submission order ascending.
#[derive(Debug)]
struct Queued {
    request: UpdateRequest,
    sequence: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

// ───────────────────────── Results ──────────────────────────

/// A finished, immutable composition.
#[derive(Debug, Clone)]
pub struct IntegratedResult {
    pub final_image: RgbaImage,
    pub final_landmarks: LandmarkSet,
    /// Effects that contributed, in composition order.
    pub applied_effects: Vec<EffectId>,
    /// Effects whose applier failed during the pass that produced this
    /// result.
    pub failed_effects: Vec<EffectId>,
    pub processing_time: Duration,
    pub quality_score: f64,
    pub conflicts: Vec<ConflictKind>,
    /// Working resolution the result was rendered at.
    pub quality_level: QualityLevel,
}

impl IntegratedResult {
    /// Score at or above which a result counts as successful.
    pub const SUCCESS_THRESHOLD: f64 = 0.5;

    /// Non-empty image, at least one applied effect and a score of at
    /// least [`SUCCESS_THRESHOLD`](Self::SUCCESS_THRESHOLD).
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.final_image.width() > 0
            && !self.applied_effects.is_empty()
            && self.quality_score >= Self::SUCCESS_THRESHOLD
    }

    #[must_use]
    pub fn is_high_quality(&self, threshold: f64) -> bool {
        self.quality_score >= threshold
    }
}

/// Snapshot for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub current_quality_level: QualityLevel,
    #[serde(with = "duration_serde")]
    pub average_processing_time: Duration,
    pub active_effect_count: usize,
    pub pending_update_count: usize,
    pub passes: u64,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Idle,
    Processing,
}

// ───────────────────────── Orchestrator ──────────────────────────

/// Owner of the effect store, result cache, dependency graph and
/// performance controller of one pipeline.
///
/// Strictly single-writer: requests are applied one at a time in
/// priority order.
#[derive(Debug)]
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: Arc<ApplierRegistry>,
    graph: DependencyGraph,
    resolver: ConflictResolver,
    store: EffectStore,
    cache: ResultCache<IntegratedResult>,
    performance: PerformanceController,
    assessor: QualityAssessor,
    queue: BinaryHeap<Queued>,
    sequence: u64,
    phase: Phase,
    current: Option<Arc<IntegratedResult>>,
    diagnostics: Option<PassDiagnostics>,
    passes: u64,
    /// Last [`Lineage::generation`] handed out.
    generation: u64,
}

impl Orchestrator {
    /// An uninitialized orchestrator using the default dependency rules.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if `config` does
    /// not validate.
    pub fn new(config: OrchestratorConfig, registry: Arc<ApplierRegistry>) -> Result<Self, PipelineError> {
        Self::with_graph(config, registry, DependencyGraph::with_default_rules())
    }

    /// An uninitialized orchestrator with a custom dependency graph.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::CyclicDependency`] if `graph` has a
    /// cycle, or [`PipelineError::InvalidConfiguration`] if `config` does
    /// not validate or an edge points back to an earlier layer.
    pub fn with_graph(
        config: OrchestratorConfig,
        registry: Arc<ApplierRegistry>,
        graph: DependencyGraph,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        graph.validate()?;
        graph.check_layers(EffectLayer::for_effect)?;
        Ok(Self {
            resolver: ConflictResolver::new(config.conflict.clone()),
            cache: ResultCache::new(config.cache_capacity),
            performance: PerformanceController::new(config.performance.clone()),
            config,
            registry,
            graph,
            store: EffectStore::new(),
            assessor: QualityAssessor,
            queue: BinaryHeap::new(),
            sequence: 0,
            phase: Phase::Uninitialized,
            current: None,
            diagnostics: None,
            passes: 0,
            generation: 0,
        })
    }

    /// Load a new face and render every configured effect.
    ///
    /// Drops any queued requests. The result cache survives: its keys
    /// include the base image, and it only holds composites that a fresh
    /// render would reproduce.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] for a zero-sized image and
    /// [`PipelineError::InvalidConfiguration`] if `face` does not
    /// validate. The orchestrator is left unchanged on error.
    pub fn initialize(
        &mut self,
        image: RgbaImage,
        landmarks: LandmarkSet,
        face: &FaceConfig,
    ) -> Result<(), PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::EmptyInput);
        }
        face.validate()?;

        self.store.initialize(image, landmarks, face);
        self.queue.clear();
        self.current = None;
        self.diagnostics = None;
        self.phase = Phase::Processing;
        let outcome = self.run_pass();
        self.phase = Phase::Idle;
        outcome
    }

    /// [`initialize`](Self::initialize) with landmarks from `detector`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoLandmarks`] if the detector finds no
    /// face, otherwise as [`initialize`](Self::initialize).
    pub fn initialize_with_detector(
        &mut self,
        image: RgbaImage,
        detector: &impl LandmarkDetector,
        face: &FaceConfig,
    ) -> Result<(), PipelineError> {
        let landmarks = detector.detect(&image).ok_or(PipelineError::NoLandmarks)?;
        self.initialize(image, landmarks, face)
    }

    /// Queue a request without processing it. A queued request for the
    /// same effect is replaced; the wider of the two modes is kept.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotInitialized`] before
    /// [`initialize`](Self::initialize), or
    /// [`PipelineError::InvalidConfiguration`] if the configuration does
    /// not validate.
    pub fn submit(&mut self, mut request: UpdateRequest) -> Result<(), PipelineError> {
        if self.phase == Phase::Uninitialized {
            return Err(PipelineError::NotInitialized);
        }
        request.config.validate()?;

        let id = request.id();
        let mut superseded = None;
        self.queue.retain(|queued| {
            if queued.request.id() == id {
                superseded = Some(queued.request.mode);
                false
            } else {
                true
            }
        });
        if let Some(mode) = superseded {
            debug!(effect = %id, "coalesced queued update");
            request.mode = request.mode.max(mode);
        }

        self.sequence += 1;
        self.queue.push(Queued {
            request,
            sequence: self.sequence,
        });
        Ok(())
    }

    /// Apply every queued request, one pass each. Returns the number of
    /// requests processed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotInitialized`] before
    /// [`initialize`](Self::initialize). Applier failures are not errors.
    pub fn drain(&mut self) -> Result<usize, PipelineError> {
        match self.phase {
            Phase::Uninitialized => return Err(PipelineError::NotInitialized),
            Phase::Processing => return Ok(0),
            Phase::Idle => {}
        }
        self.phase = Phase::Processing;
        let mut processed = 0;
        let mut outcome = Ok(());
        while let Some(Queued { request, .. }) = self.queue.pop() {
            outcome = self.apply_request(request);
            if outcome.is_err() {
                break;
            }
            processed += 1;
        }
        self.phase = Phase::Idle;
        outcome.map(|()| processed)
    }

    /// Change one effect's configuration and re-render.
    ///
    /// Adds the effect if it was not configured yet.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit) and [`drain`](Self::drain). A failing
    /// applier is contained and does not make this return an error.
    pub fn update_effect(&mut self, config: EffectConfig, mode: UpdateMode) -> Result<(), PipelineError> {
        self.submit(UpdateRequest::new(config, mode))?;
        self.drain().map(|_| ())
    }

    /// The most recently published result.
    #[must_use]
    pub fn get_current_result(&self) -> Option<Arc<IntegratedResult>> {
        self.current.clone()
    }

    /// State of one configured effect.
    ///
    /// After a pass served from the result cache, effects that pass would
    /// have rendered still report `dirty` with their previous
    /// `applied_config`, `output` and `last_update`.
    #[must_use]
    pub fn get_effect_state(&self, id: &EffectId) -> Option<&EffectState> {
        self.store.get(id)
    }

    #[must_use]
    pub fn get_performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            current_quality_level: self.performance.level(),
            average_processing_time: self.performance.average(),
            active_effect_count: self.store.len(),
            pending_update_count: self.queue.len(),
            passes: self.passes,
            cache: self.cache.stats(),
        }
    }

    /// `true` when recent passes exceed the frame budget and a streaming
    /// caller should coalesce instead of rendering.
    #[must_use]
    pub fn should_skip_frame(&self) -> bool {
        self.performance.should_skip_frame()
    }

    /// Diagnostics of the most recent pass.
    #[must_use]
    pub const fn diagnostics(&self) -> Option<&PassDiagnostics> {
        self.diagnostics.as_ref()
    }

    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.phase != Phase::Uninitialized
    }

    /// Forget the face, every effect, the cache and the performance
    /// history. [`initialize`](Self::initialize) must be called again.
    pub fn reset(&mut self) {
        self.store.clear();
        self.cache.clear();
        self.queue.clear();
        self.performance.reset();
        self.current = None;
        self.diagnostics = None;
        self.phase = Phase::Uninitialized;
    }

    fn apply_request(&mut self, request: UpdateRequest) -> Result<(), PipelineError> {
        let id = request.id();
        debug!(effect = %id, mode = ?request.mode, priority = request.priority, "applying update");
        self.store.set_config(request.config);

        let stale = match request.mode {
            UpdateMode::FullRefresh => {
                self.store.mark_all_dirty();
                BTreeSet::new()
            }
            UpdateMode::Incremental => self.graph.transitive_dependents(&id),
            UpdateMode::Selective => self.graph.dependents(&id).cloned().collect(),
        };
        for dependent in &stale {
            self.store.mark_dirty(dependent);
        }
        self.run_pass()
    }

    /// Requested configuration after conflict resolution, plus the
    /// conflicts found.
    fn effective_config(&self) -> (FaceConfig, Vec<ConflictKind>) {
        let requested = self.store.face_config();
        if !(requested.has_appearance() && requested.has_geometry()) {
            return (requested, Vec::new());
        }
        let conflicts = self.resolver.detect(&requested.makeup, &requested.surgery);
        let (makeup, surgery) = self.resolver.resolve(
            &conflicts,
            self.config.conflict_policy,
            &requested.makeup,
            &requested.surgery,
        );
        (FaceConfig { makeup, surgery }, conflicts)
    }

    fn run_pass(&mut self) -> Result<(), PipelineError> {
        let started = Instant::now();
        let level = self.performance.level();
        let (effective, conflicts) = self.effective_config();

        let changed: Vec<EffectId> = self
            .store
            .iter()
            .filter(|s| !s.dirty && s.applied_config != effective.get(&s.id))
            .map(|s| s.id.clone())
            .collect();
        for id in &changed {
            self.store.mark_dirty(id);
            for dependent in self.graph.transitive_dependents(id) {
                self.store.mark_dirty(&dependent);
            }
        }

        let ids: BTreeSet<EffectId> = self.store.iter().map(|s| s.id.clone()).collect();
        let mut order = self.graph.update_order(&ids)?;
        order.sort_by_key(|id| self.store.get(id).map(|s| s.layer));

        let key = if self.config.enable_caching {
            Fingerprint::new(
                self.store.base_image(),
                &(&effective, level, self.store.base_landmarks()),
            )
        } else {
            None
        };
        if let Some(key) = &key
            && let Some(hit) = self.cache.get(key)
        {
            debug!(quality_score = hit.quality_score, "result cache hit");
            self.publish(hit, Vec::new(), true, started);
            return Ok(());
        }

        let scale = level.scale();
        let filter = self.config.resample_filter;
        let registry = Arc::clone(&self.registry);
        let mut image = self.store.base_image().clone();
        let mut landmarks = self.store.base_landmarks().clone();
        let mut applied_effects = Vec::new();
        let mut failed_effects = Vec::new();
        let mut effect_diagnostics = Vec::with_capacity(order.len());
        // The composite is only cached when every effect in it is exactly
        // what a fresh render of the effective configuration would give.
        let mut underlay = Lineage::root(scale);
        let mut exact = true;

        for id in &order {
            let Some(state) = self.store.get_mut(id) else {
                continue;
            };
            let config = effective.get(id).unwrap_or_else(|| state.config.clone());

            if !state.dirty {
                let outcome = if let Some(output) = &state.output {
                    exact &= state.last_error.is_none() && output.is_exact_on(underlay);
                    output.replay(&mut image, &mut landmarks);
                    underlay = Lineage::extend(underlay, output.lineage.generation);
                    applied_effects.push(id.clone());
                    EffectOutcome::Replayed
                } else {
                    exact = false;
                    EffectOutcome::Missing
                };
                effect_diagnostics.push(EffectDiagnostics {
                    id: id.clone(),
                    layer: state.layer,
                    outcome,
                    duration: Duration::ZERO,
                });
                continue;
            }

            let effect_started = Instant::now();
            let rendered = render_effect(&registry, filter, scale, &image, &landmarks, &config);
            let elapsed = effect_started.elapsed();
            state.dirty = false;
            state.applied_config = Some(config);
            state.last_update = Some(Instant::now());
            state.last_duration = elapsed;

            let outcome = match rendered {
                Ok((out_image, out_landmarks)) => {
                    self.generation += 1;
                    let lineage = Lineage {
                        generation: self.generation,
                        underlay,
                    };
                    underlay = Lineage::extend(underlay, lineage.generation);
                    let output = EffectOutput::new(&image, &landmarks, out_image, out_landmarks, lineage);
                    image.clone_from(&output.image);
                    landmarks.clone_from(&output.landmarks);
                    state.output = Some(output);
                    state.last_error = None;
                    applied_effects.push(id.clone());
                    EffectOutcome::Computed
                }
                Err(err) => {
                    warn!(effect = %id, error = %err, "effect applier failed; keeping previous output");
                    exact = false;
                    if let Some(output) = &state.output {
                        output.replay(&mut image, &mut landmarks);
                        underlay = Lineage::extend(underlay, output.lineage.generation);
                    }
                    let reason = err.to_string();
                    state.last_error = Some(err);
                    failed_effects.push(id.clone());
                    EffectOutcome::Failed { reason }
                }
            };
            effect_diagnostics.push(EffectDiagnostics {
                id: id.clone(),
                layer: state.layer,
                outcome,
                duration: elapsed,
            });
        }

        let quality_score = self.assessor.score(self.store.base_image(), &image, &landmarks);
        let result = Arc::new(IntegratedResult {
            final_image: image,
            final_landmarks: landmarks,
            applied_effects,
            processing_time: started.elapsed(),
            quality_score,
            conflicts,
            quality_level: level,
            failed_effects,
        });
        if let Some(key) = key {
            if exact {
                self.cache.put(key, Arc::clone(&result));
            } else {
                debug!("pass composed from stale outputs; not cached");
            }
        }
        self.publish(result, effect_diagnostics, false, started);
        Ok(())
    }

    fn publish(
        &mut self,
        result: Arc<IntegratedResult>,
        effects: Vec<EffectDiagnostics>,
        cache_hit: bool,
        started: Instant,
    ) {
        let total_duration = started.elapsed();
        self.performance.record(total_duration);
        self.passes += 1;

        let diagnostics = PassDiagnostics {
            effects,
            cache_hit,
            quality_level: result.quality_level,
            quality_score: result.quality_score,
            conflicts: result.conflicts.clone(),
            total_duration,
        };
        debug!(
            computed = diagnostics.computed(),
            replayed = diagnostics.replayed(),
            failed = diagnostics.failed(),
            cache_hit,
            duration_ms = duration_ms(total_duration),
            "pass complete"
        );
        self.diagnostics = Some(diagnostics);
        self.current = Some(result);
    }
}

/// Run one applier at the working scale and bring its output back to
/// the resolution of `image`.
fn render_effect(
    registry: &ApplierRegistry,
    filter: ResampleFilter,
    scale: f64,
    image: &RgbaImage,
    landmarks: &LandmarkSet,
    config: &EffectConfig,
) -> Result<(RgbaImage, LandmarkSet), ApplierError> {
    let id = config.id();
    let applier = registry.get(&id).ok_or(ApplierError::NotRegistered(id))?;

    let small = downscale(image, scale, filter);
    let work = small.as_ref().unwrap_or(image);
    let (sx, sy) = (
        f64::from(work.width()) / f64::from(image.width()),
        f64::from(work.height()) / f64::from(image.height()),
    );
    let work_landmarks = if small.is_some() {
        landmarks.scaled(sx, sy)
    } else {
        landmarks.clone()
    };

    let applied = applier.apply(work, &work_landmarks, config)?;
    if applied.image.dimensions() != work.dimensions() {
        return Err(ApplierError::DimensionMismatch {
            width: work.width(),
            height: work.height(),
            got_width: applied.image.width(),
            got_height: applied.image.height(),
        });
    }
    if let Some(moved) = &applied.landmarks
        && moved.len() != work_landmarks.len()
    {
        return Err(ApplierError::LandmarkCountChanged {
            expected: work_landmarks.len(),
            got: moved.len(),
        });
    }

    let Some(small) = small else {
        let landmarks = applied.landmarks.unwrap_or_else(|| landmarks.clone());
        return Ok((applied.image, landmarks));
    };

    let out_image = merge_upscaled(image, &small, &applied.image, filter);
    let out_landmarks = match applied.landmarks {
        Some(moved) => LandmarkSet::new(
            landmarks
                .points()
                .iter()
                .zip(work_landmarks.points())
                .zip(moved.points())
                .map(|((&full, &before), &after)| {
                    if before == after {
                        full
                    } else {
                        after.scaled(1.0 / sx, 1.0 / sy)
                    }
                })
                .collect(),
        ),
        None => landmarks.clone(),
    };
    debug_assert_eq!(Dimensions::of(&out_image), Dimensions::of(image));
    Ok((out_image, out_landmarks))
}
