//! Integration tests: end-to-end orchestrator behavior with built-in and
//! mock appliers.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use faceforge_pipeline::{
    AppliedEffect, ApplierError, ApplierRegistry, BlendMode, BlushConfig, Color, ConflictKind,
    EffectConfig, EffectId, EffectOutcome, EyelinerConfig, EyelinerStyle, EyeshadowConfig,
    EyeshadowStyle, FaceConfig, FoundationConfig, FoundationFinish, JawlineConfig, LandmarkSet,
    LipstickConfig, Orchestrator, OrchestratorConfig, RgbaImage, UpdateMode, template_landmarks,
};
use image::Rgba;

const SIZE: u32 = 96;

fn portrait() -> RgbaImage {
    RgbaImage::from_fn(SIZE, SIZE, |x, y| {
        let shade = u8::try_from((x + y) / 3).unwrap();
        Rgba([120 + shade / 2, 110 + shade / 3, 100, 255])
    })
}

fn foundation(coverage: f64) -> EffectConfig {
    EffectConfig::Foundation(FoundationConfig {
        color: Color::rgb(230, 190, 160),
        coverage,
        finish: FoundationFinish::Natural,
    })
}

fn eyeshadow(intensity: f64) -> EffectConfig {
    EffectConfig::Eyeshadow(EyeshadowConfig {
        colors: vec![Color::rgb(90, 40, 120)],
        style: EyeshadowStyle::Natural,
        intensity,
        blend_mode: BlendMode::Normal,
        shimmer: 0.0,
    })
}

fn eyeliner() -> EffectConfig {
    EffectConfig::Eyeliner(EyelinerConfig {
        color: Color::rgb(10, 10, 10),
        thickness: 0.5,
        style: EyelinerStyle::Winged,
        intensity: 1.0,
    })
}

fn lipstick(intensity: f64) -> EffectConfig {
    EffectConfig::Lipstick(LipstickConfig {
        color: Color::rgb(170, 20, 60),
        intensity,
        glossiness: 0.2,
        blend_mode: BlendMode::Normal,
    })
}

fn blush(intensity: f64) -> EffectConfig {
    EffectConfig::Blush(BlushConfig {
        color: Color::rgb(230, 100, 120),
        intensity,
        blend_mode: BlendMode::SoftLight,
    })
}

fn jawline(length: f64) -> EffectConfig {
    EffectConfig::JawlineSurgery(JawlineConfig {
        width: 0.0,
        angle: 0.0,
        length,
    })
}

fn start(registry: ApplierRegistry, config: OrchestratorConfig, effects: Vec<EffectConfig>) -> Orchestrator {
    let mut orchestrator = Orchestrator::new(config, Arc::new(registry)).unwrap();
    orchestrator
        .initialize(
            portrait(),
            template_landmarks(SIZE, SIZE),
            &FaceConfig::from_effects(effects),
        )
        .unwrap();
    orchestrator
}

fn builtin(effects: Vec<EffectConfig>) -> Orchestrator {
    start(ApplierRegistry::with_builtins(), OrchestratorConfig::default(), effects)
}

fn outcome(orchestrator: &Orchestrator, id: &EffectId) -> EffectOutcome {
    orchestrator
        .diagnostics()
        .unwrap()
        .effects
        .iter()
        .find(|e| &e.id == id)
        .map(|e| e.outcome.clone())
        .expect("effect missing from diagnostics")
}

#[test]
fn foundation_alone_changes_the_image() {
    let orchestrator = builtin(vec![foundation(0.8)]);
    let result = orchestrator.get_current_result().unwrap();
    assert!(result.applied_effects.contains(&EffectId::FOUNDATION));
    assert_ne!(result.final_image, portrait());
    assert!((0.0..=1.0).contains(&result.quality_score));
}

#[test]
fn updating_a_dependency_recomputes_its_dependents() {
    let mut orchestrator = builtin(vec![foundation(0.5), eyeshadow(0.6)]);
    let before = orchestrator
        .get_effect_state(&EffectId::EYESHADOW)
        .unwrap()
        .last_update
        .unwrap();

    orchestrator
        .update_effect(foundation(0.9), UpdateMode::Incremental)
        .unwrap();

    assert_eq!(outcome(&orchestrator, &EffectId::FOUNDATION), EffectOutcome::Computed);
    assert_eq!(outcome(&orchestrator, &EffectId::EYESHADOW), EffectOutcome::Computed);
    let state = orchestrator.get_effect_state(&EffectId::EYESHADOW).unwrap();
    assert!(!state.dirty);
    assert!(state.last_update.unwrap() >= before);
}

#[test]
fn selective_stops_at_direct_dependents() {
    let mut orchestrator = builtin(vec![foundation(0.5), eyeshadow(0.6), eyeliner()]);

    orchestrator
        .update_effect(foundation(0.7), UpdateMode::Selective)
        .unwrap();
    assert_eq!(outcome(&orchestrator, &EffectId::EYESHADOW), EffectOutcome::Computed);
    assert_eq!(outcome(&orchestrator, &EffectId::EYELINER), EffectOutcome::Replayed);

    orchestrator
        .update_effect(foundation(0.6), UpdateMode::Incremental)
        .unwrap();
    assert_eq!(outcome(&orchestrator, &EffectId::EYELINER), EffectOutcome::Computed);

    orchestrator
        .update_effect(foundation(0.55), UpdateMode::FullRefresh)
        .unwrap();
    assert!(!orchestrator.diagnostics().unwrap().cache_hit);
    assert_eq!(orchestrator.diagnostics().unwrap().computed(), 3);
}

#[test]
fn conflicting_lipstick_and_jawline_are_blended() {
    let orchestrator = builtin(vec![lipstick(0.8), jawline(0.6)]);
    let result = orchestrator.get_current_result().unwrap();
    assert_eq!(result.conflicts, vec![ConflictKind::LipstickJawline]);

    let state = orchestrator.get_effect_state(&EffectId::LIPSTICK).unwrap();
    let Some(EffectConfig::Lipstick(applied)) = &state.applied_config else {
        panic!("lipstick state holds {:?}", state.applied_config);
    };
    assert!(applied.intensity < 0.8);
    assert_eq!(state.config, lipstick(0.8), "requested config is kept");
}

#[test]
fn conflict_appearing_later_recomputes_the_damped_effect() {
    let mut orchestrator = builtin(vec![lipstick(0.8), jawline(0.1)]);
    assert!(orchestrator.get_current_result().unwrap().conflicts.is_empty());

    orchestrator
        .update_effect(jawline(0.9), UpdateMode::Incremental)
        .unwrap();
    assert_eq!(outcome(&orchestrator, &EffectId::LIPSTICK), EffectOutcome::Computed);
    assert_eq!(
        orchestrator.get_current_result().unwrap().conflicts,
        vec![ConflictKind::LipstickJawline]
    );
}

#[test]
fn failing_applier_does_not_block_other_effects() {
    let mut registry = ApplierRegistry::with_builtins();
    registry.register(
        EffectId::BLUSH,
        |_: &RgbaImage, _: &LandmarkSet, _: &EffectConfig| -> Result<AppliedEffect, ApplierError> {
            Err(ApplierError::Failed("always fails".to_owned()))
        },
    );
    let mut orchestrator = start(
        registry,
        OrchestratorConfig::default(),
        vec![foundation(0.5), lipstick(0.7), blush(0.5)],
    );

    orchestrator
        .update_effect(blush(0.6), UpdateMode::Incremental)
        .unwrap();

    let result = orchestrator.get_current_result().unwrap();
    assert!(result.applied_effects.contains(&EffectId::FOUNDATION));
    assert!(result.applied_effects.contains(&EffectId::LIPSTICK));
    assert_eq!(result.failed_effects, vec![EffectId::BLUSH]);
    assert!(matches!(
        outcome(&orchestrator, &EffectId::BLUSH),
        EffectOutcome::Failed { .. }
    ));
    let state = orchestrator.get_effect_state(&EffectId::BLUSH).unwrap();
    assert!(!state.dirty);
    assert!(state.output.is_none());
    assert_eq!(state.last_error, Some(ApplierError::Failed("always fails".to_owned())));
}

/// A registry with only a foundation applier, plus a count of its calls.
fn counting_foundation() -> (ApplierRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut registry = ApplierRegistry::new();
    registry.register(
        EffectId::FOUNDATION,
        move |img: &RgbaImage, _: &LandmarkSet, config: &EffectConfig| -> Result<AppliedEffect, ApplierError> {
            counter.fetch_add(1, Ordering::SeqCst);
            let EffectConfig::Foundation(c) = config else {
                return Err(ApplierError::UnsupportedConfig { effect: config.id() });
            };
            let mut out = img.clone();
            let lift = if c.coverage > 0.5 { 60 } else { 30 };
            for p in out.pixels_mut() {
                p.0[2] = p.0[2].saturating_add(lift);
            }
            Ok(AppliedEffect::image(out))
        },
    );
    (registry, calls)
}

fn with_capacity(cache_capacity: usize) -> OrchestratorConfig {
    OrchestratorConfig {
        cache_capacity,
        ..OrchestratorConfig::default()
    }
}

#[test]
fn cached_result_skips_every_applier() {
    let (registry, calls) = counting_foundation();
    let mut orchestrator = start(registry, OrchestratorConfig::default(), vec![foundation(0.3)]);
    let first = orchestrator.get_current_result().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    orchestrator
        .update_effect(foundation(0.6), UpdateMode::Incremental)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    orchestrator
        .update_effect(foundation(0.3), UpdateMode::Incremental)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2, "applier ran on a cache hit");
    assert!(orchestrator.diagnostics().unwrap().cache_hit);
    let again = orchestrator.get_current_result().unwrap();
    assert!(Arc::ptr_eq(&first, &again));

    let stats = orchestrator.get_performance_stats();
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.passes, 3);
}

#[test]
fn cache_hit_leaves_effect_state_dirty() {
    let (registry, calls) = counting_foundation();
    let mut orchestrator = start(registry, OrchestratorConfig::default(), vec![foundation(0.3)]);
    orchestrator
        .update_effect(foundation(0.6), UpdateMode::Incremental)
        .unwrap();
    let rendered_at = orchestrator
        .get_effect_state(&EffectId::FOUNDATION)
        .unwrap()
        .last_update;

    orchestrator
        .update_effect(foundation(0.3), UpdateMode::Incremental)
        .unwrap();
    assert!(orchestrator.diagnostics().unwrap().cache_hit);
    let state = orchestrator.get_effect_state(&EffectId::FOUNDATION).unwrap();
    assert!(state.dirty);
    assert_eq!(state.config, foundation(0.3));
    assert_eq!(state.applied_config, Some(foundation(0.6)));
    assert_eq!(state.last_update, rendered_at);

    orchestrator
        .update_effect(foundation(0.9), UpdateMode::Incremental)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let state = orchestrator.get_effect_state(&EffectId::FOUNDATION).unwrap();
    assert!(!state.dirty);
    assert_eq!(state.applied_config, Some(foundation(0.9)));
}

/// Blush that fails above half intensity and otherwise floods blue.
fn flaky_blush() -> ApplierRegistry {
    let mut registry = ApplierRegistry::with_builtins();
    registry.register(
        EffectId::BLUSH,
        |img: &RgbaImage, _: &LandmarkSet, config: &EffectConfig| -> Result<AppliedEffect, ApplierError> {
            let EffectConfig::Blush(c) = config else {
                return Err(ApplierError::UnsupportedConfig { effect: config.id() });
            };
            if c.intensity > 0.5 {
                return Err(ApplierError::Failed("too intense".to_owned()));
            }
            let mut out = img.clone();
            for p in out.pixels_mut() {
                p.0[2] = 255;
            }
            Ok(AppliedEffect::image(out))
        },
    );
    registry
}

fn assert_same_result(cached: &Orchestrator, plain: &Orchestrator, step: &str) {
    let (a, b) = (
        cached.get_current_result().unwrap(),
        plain.get_current_result().unwrap(),
    );
    assert!(a.final_image == b.final_image, "images differ after {step}");
    assert_eq!(a.final_landmarks, b.final_landmarks, "{step}");
    assert_eq!(a.applied_effects, b.applied_effects, "{step}");
    assert_eq!(a.failed_effects, b.failed_effects, "{step}");
}

#[test]
fn caching_never_changes_the_result_after_a_failure() {
    let uncached = OrchestratorConfig {
        enable_caching: false,
        ..OrchestratorConfig::default()
    };
    let effects = || vec![foundation(0.3), lipstick(0.7), blush(0.3)];
    let mut cached = start(flaky_blush(), OrchestratorConfig::default(), effects());
    let mut plain = start(flaky_blush(), uncached, effects());
    assert_same_result(&cached, &plain, "initialize");

    for orchestrator in [&mut cached, &mut plain] {
        orchestrator
            .update_effect(blush(0.8), UpdateMode::Incremental)
            .unwrap();
    }
    assert_same_result(&cached, &plain, "failed blush");

    for orchestrator in [&mut cached, &mut plain] {
        orchestrator
            .update_effect(lipstick(0.6), UpdateMode::Incremental)
            .unwrap();
    }
    assert_same_result(&cached, &plain, "lipstick over a stale blush");
    assert_eq!(cached.get_performance_stats().cache.len, 1, "stale composites stored");

    let face = FaceConfig::from_effects(vec![foundation(0.3), lipstick(0.6), blush(0.8)]);
    for orchestrator in [&mut cached, &mut plain] {
        orchestrator
            .initialize(portrait(), template_landmarks(SIZE, SIZE), &face)
            .unwrap();
    }
    assert!(!cached.diagnostics().unwrap().cache_hit);
    assert_same_result(&cached, &plain, "initialize");
    let result = cached.get_current_result().unwrap();
    assert_eq!(result.failed_effects, vec![EffectId::BLUSH]);
    assert!(result.final_image.pixels().all(|p| p.0[2] != 255), "old blush output leaked");
}

#[test]
fn selective_replay_onto_a_changed_underlay_is_not_cached() {
    let uncached = OrchestratorConfig {
        enable_caching: false,
        ..OrchestratorConfig::default()
    };
    let effects = || vec![foundation(0.5), eyeshadow(0.6), eyeliner()];
    let mut cached = start(ApplierRegistry::with_builtins(), OrchestratorConfig::default(), effects());
    let mut plain = start(ApplierRegistry::with_builtins(), uncached, effects());

    for orchestrator in [&mut cached, &mut plain] {
        orchestrator
            .update_effect(foundation(0.7), UpdateMode::Selective)
            .unwrap();
    }
    assert_eq!(outcome(&cached, &EffectId::EYELINER), EffectOutcome::Replayed);
    assert_eq!(cached.get_performance_stats().cache.len, 1);

    let face = FaceConfig::from_effects(vec![foundation(0.7), eyeshadow(0.6), eyeliner()]);
    for orchestrator in [&mut cached, &mut plain] {
        orchestrator
            .initialize(portrait(), template_landmarks(SIZE, SIZE), &face)
            .unwrap();
    }
    assert!(!cached.diagnostics().unwrap().cache_hit);
    assert_same_result(&cached, &plain, "initialize");

    // The fresh render is exact, so it is reused from here on.
    cached
        .initialize(portrait(), template_landmarks(SIZE, SIZE), &face)
        .unwrap();
    assert!(cached.diagnostics().unwrap().cache_hit);
    assert_same_result(&cached, &plain, "second initialize");
}

#[test]
fn full_refresh_matches_a_fresh_render() {
    let mut orchestrator = builtin(vec![foundation(0.5), eyeshadow(0.6), eyeliner()]);
    orchestrator
        .update_effect(foundation(0.7), UpdateMode::Selective)
        .unwrap();
    orchestrator
        .update_effect(foundation(0.7), UpdateMode::FullRefresh)
        .unwrap();
    assert!(!orchestrator.diagnostics().unwrap().cache_hit);
    assert_eq!(orchestrator.diagnostics().unwrap().computed(), 3);

    let fresh = builtin(vec![foundation(0.7), eyeshadow(0.6), eyeliner()]);
    let (a, b) = (
        orchestrator.get_current_result().unwrap(),
        fresh.get_current_result().unwrap(),
    );
    assert!(a.final_image == b.final_image);
    assert_eq!(a.final_landmarks, b.final_landmarks);
}

#[test]
fn least_recently_used_result_is_evicted() {
    let (registry, calls) = counting_foundation();
    let mut orchestrator = start(registry, with_capacity(2), vec![foundation(0.2)]);
    for coverage in [0.4, 0.6] {
        orchestrator
            .update_effect(foundation(coverage), UpdateMode::Incremental)
            .unwrap();
    }
    let stats = orchestrator.get_performance_stats().cache;
    assert_eq!((stats.len, stats.capacity), (2, 2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    orchestrator
        .update_effect(foundation(0.4), UpdateMode::Incremental)
        .unwrap();
    assert!(orchestrator.diagnostics().unwrap().cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    orchestrator
        .update_effect(foundation(0.2), UpdateMode::Incremental)
        .unwrap();
    assert!(!orchestrator.diagnostics().unwrap().cache_hit, "0.2 should have been evicted");
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let stats = orchestrator.get_performance_stats().cache;
    assert_eq!((stats.hits, stats.misses), (1, 4));
    assert_eq!(stats.len, 2);
}

#[test]
fn zero_capacity_never_hits() {
    let (registry, calls) = counting_foundation();
    let mut orchestrator = start(registry, with_capacity(0), vec![foundation(0.3)]);
    for _ in 0..3 {
        orchestrator
            .update_effect(foundation(0.3), UpdateMode::Incremental)
            .unwrap();
        assert!(!orchestrator.diagnostics().unwrap().cache_hit);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let stats = orchestrator.get_performance_stats().cache;
    assert_eq!((stats.hits, stats.len, stats.capacity), (0, 0, 0));
}

#[test]
fn reset_empties_the_cache() {
    let (registry, calls) = counting_foundation();
    let mut orchestrator = start(registry, OrchestratorConfig::default(), vec![foundation(0.3)]);
    assert_eq!(orchestrator.get_performance_stats().cache.len, 1);

    orchestrator.reset();
    assert_eq!(orchestrator.get_performance_stats().cache.len, 0);

    orchestrator
        .initialize(
            portrait(),
            template_landmarks(SIZE, SIZE),
            &FaceConfig::from_effects(vec![foundation(0.3)]),
        )
        .unwrap();
    assert!(!orchestrator.diagnostics().unwrap().cache_hit);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn disabled_cache_always_recomputes() {
    let config = OrchestratorConfig {
        enable_caching: false,
        ..OrchestratorConfig::default()
    };
    let mut orchestrator = start(ApplierRegistry::with_builtins(), config, vec![foundation(0.3)]);
    orchestrator
        .update_effect(foundation(0.3), UpdateMode::Incremental)
        .unwrap();
    assert!(!orchestrator.diagnostics().unwrap().cache_hit);
    assert_eq!(orchestrator.get_performance_stats().cache.len, 0);
}

#[test]
fn repeating_an_update_is_idempotent() {
    for enable_caching in [true, false] {
        let config = OrchestratorConfig {
            enable_caching,
            ..OrchestratorConfig::default()
        };
        let mut orchestrator = start(
            ApplierRegistry::with_builtins(),
            config,
            vec![foundation(0.4), lipstick(0.6), jawline(0.2)],
        );

        orchestrator
            .update_effect(lipstick(0.7), UpdateMode::Incremental)
            .unwrap();
        let first = orchestrator.get_current_result().unwrap();
        orchestrator
            .update_effect(lipstick(0.7), UpdateMode::Incremental)
            .unwrap();
        let second = orchestrator.get_current_result().unwrap();

        assert_eq!(first.final_image, second.final_image, "caching={enable_caching}");
        assert_eq!(first.final_landmarks, second.final_landmarks);
        assert_eq!(first.applied_effects, second.applied_effects);
    }
}

#[test]
fn geometry_moves_landmarks_seen_by_later_makeup() {
    let orchestrator = builtin(vec![jawline(0.25), lipstick(0.5)]);
    let result = orchestrator.get_current_result().unwrap();
    assert_ne!(result.final_landmarks, template_landmarks(SIZE, SIZE));
    assert_eq!(
        result.applied_effects,
        vec![EffectId::JAWLINE_SURGERY, EffectId::LIPSTICK]
    );
}

#[test]
fn stats_report_queue_and_effects() {
    let orchestrator = builtin(vec![foundation(0.4), blush(0.3)]);
    let stats = orchestrator.get_performance_stats();
    assert_eq!(stats.active_effect_count, 2);
    assert_eq!(stats.pending_update_count, 0);
    assert_eq!(stats.passes, 1);
    let json = serde_json::to_value(&stats).unwrap();
    assert!(json["average_processing_time"].is_f64());
}
