//! faceforge-bench: CLI tool for driving the face effect pipeline and
//! collecting diagnostics.
//!
//! Loads an image, renders an initial effect configuration, then applies
//! a sequence of single-effect updates, printing per-pass diagnostics.
//! Useful for:
//!
//! - Seeing which effects an update recomputes and which it replays
//! - Comparing conflict policies on overlapping makeup and reshaping
//! - Watching the adaptive quality level react to pass durations
//! - Measuring cache hit rates across repeated update sequences
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin faceforge-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to see pipeline events.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use faceforge_pipeline::{
    ApplierRegistry, BlendMode, Color, ConflictPolicy, EffectConfig, FaceConfig, FoundationConfig,
    FoundationFinish, JawlineConfig, LandmarkSet, LipstickConfig, Orchestrator,
    OrchestratorConfig, PassDiagnostics, PerformanceConfig, QualityLevel, ResampleFilter,
    UpdateMode, template_landmarks,
};
use serde::de::DeserializeOwned;
use tracing_subscriber::EnvFilter;

/// Face effect pipeline driver and diagnostics.
///
/// Renders an effect configuration onto an image, applies updates one at
/// a time, and prints what each pass computed, replayed or failed.
#[derive(Parser)]
#[command(name = "faceforge-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Landmarks as a JSON array of `{"x", "y"}` points (468-point face
    /// mesh). Defaults to a template face centered in the image.
    #[arg(long)]
    landmarks: Option<PathBuf>,

    /// Initial `FaceConfig`, as a JSON string or a path to a JSON file.
    /// Defaults to foundation, lipstick and a jawline adjustment.
    #[arg(long)]
    effects: Option<String>,

    /// An `EffectConfig` to apply after the initial render, as a JSON
    /// string or file path. Repeat to apply several in order.
    #[arg(long = "update")]
    updates: Vec<String>,

    /// Invalidation mode for updates.
    #[arg(long, value_enum, default_value_t = Mode::Incremental)]
    mode: Mode,

    /// Conflict policy when makeup and reshaping overlap.
    #[arg(long, value_enum, default_value_t = Policy::Blend)]
    policy: Policy,

    /// Pin the working quality level instead of adapting it.
    #[arg(long, value_enum)]
    quality: Option<Quality>,

    /// Resampling filter used below full quality.
    #[arg(long, value_enum, default_value_t = Filter::Triangle)]
    filter: Filter,

    /// Disable the result cache.
    #[arg(long)]
    no_cache: bool,

    /// Number of times to repeat the update sequence.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Write the final composed image to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output diagnostics as JSON instead of human-readable reports.
    #[arg(long)]
    json: bool,

    /// Full orchestrator config as a JSON string.
    ///
    /// When provided, `--policy`, `--quality`, `--filter` and
    /// `--no-cache` are ignored.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// The updated effect and its direct dependents.
    Selective,
    /// The updated effect and everything downstream.
    Incremental,
    /// Every configured effect.
    FullRefresh,
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
    /// Leave both effects as requested.
    Override,
    /// Damp both effects in the overlapping region.
    Blend,
    /// Drop the reshaping in the overlapping region.
    Preserve,
}

#[derive(Clone, Copy, ValueEnum)]
enum Quality {
    High,
    Medium,
    Low,
}

#[derive(Clone, Copy, ValueEnum)]
enum Filter {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Bilinear interpolation (fast, decent quality).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Build an [`OrchestratorConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_cli(cli: &Cli) -> Result<OrchestratorConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(OrchestratorConfig {
        enable_caching: !cli.no_cache,
        conflict_policy: match cli.policy {
            Policy::Override => ConflictPolicy::Override,
            Policy::Blend => ConflictPolicy::Blend,
            Policy::Preserve => ConflictPolicy::Preserve,
        },
        performance: match cli.quality {
            None => PerformanceConfig::default(),
            Some(Quality::High) => PerformanceConfig::fixed(QualityLevel::High),
            Some(Quality::Medium) => PerformanceConfig::fixed(QualityLevel::Medium),
            Some(Quality::Low) => PerformanceConfig::fixed(QualityLevel::Low),
        },
        resample_filter: match cli.filter {
            Filter::Nearest => ResampleFilter::Nearest,
            Filter::Triangle => ResampleFilter::Triangle,
            Filter::CatmullRom => ResampleFilter::CatmullRom,
            Filter::Gaussian => ResampleFilter::Gaussian,
            Filter::Lanczos3 => ResampleFilter::Lanczos3,
        },
        ..OrchestratorConfig::default()
    })
}

const fn update_mode(mode: Mode) -> UpdateMode {
    match mode {
        Mode::Selective => UpdateMode::Selective,
        Mode::Incremental => UpdateMode::Incremental,
        Mode::FullRefresh => UpdateMode::FullRefresh,
    }
}

/// Parse a JSON argument that is either inline JSON or a path to a file.
fn json_arg<T: DeserializeOwned>(flag: &str, arg: &str) -> Result<T, String> {
    let path = Path::new(arg);
    let text = if path.is_file() {
        std::fs::read_to_string(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?
    } else {
        arg.to_owned()
    };
    serde_json::from_str(&text).map_err(|e| format!("Error parsing {flag}: {e}"))
}

fn demo_effects() -> FaceConfig {
    FaceConfig::from_effects([
        EffectConfig::Foundation(FoundationConfig {
            color: Color::rgb(224, 188, 160),
            coverage: 0.5,
            finish: FoundationFinish::Natural,
        }),
        EffectConfig::Lipstick(LipstickConfig {
            color: Color::rgb(176, 36, 64),
            intensity: 0.8,
            glossiness: 0.3,
            blend_mode: BlendMode::Normal,
        }),
        EffectConfig::JawlineSurgery(JawlineConfig {
            width: -0.2,
            angle: 0.1,
            length: 0.4,
        }),
    ])
}

fn load_landmarks(cli: &Cli, width: u32, height: u32) -> Result<LandmarkSet, String> {
    cli.landmarks.as_ref().map_or_else(
        || Ok(template_landmarks(width, height)),
        |path| json_arg("--landmarks", &path.to_string_lossy()),
    )
}

fn emit(diagnostics: &PassDiagnostics, json: bool) -> Result<(), String> {
    if json {
        let out = serde_json::to_string_pretty(diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{out}");
    } else {
        println!("{}\n", diagnostics.report());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    tracing::debug!(?config, "orchestrator config");
    let face = match &cli.effects {
        Some(arg) => json_arg::<FaceConfig>("--effects", arg)?,
        None => demo_effects(),
    };
    let updates = cli
        .updates
        .iter()
        .map(|arg| json_arg::<EffectConfig>("--update", arg))
        .collect::<Result<Vec<_>, _>>()?;

    let bytes = std::fs::read(&cli.image_path)
        .map_err(|e| format!("Error reading {}: {e}", cli.image_path.display()))?;
    let image = faceforge_pipeline::decode(&bytes).map_err(|e| format!("Pipeline error: {e}"))?;
    let landmarks = load_landmarks(cli, image.width(), image.height())?;

    eprintln!(
        "Image: {} ({}x{}, {} landmarks)",
        cli.image_path.display(),
        image.width(),
        image.height(),
        landmarks.len(),
    );
    eprintln!("Effects: {:?}", face.ids());
    eprintln!("Updates: {} x {} runs", updates.len(), cli.runs);
    eprintln!();

    let registry = Arc::new(ApplierRegistry::with_builtins());
    let mut orchestrator = Orchestrator::new(config, registry).map_err(|e| format!("Pipeline error: {e}"))?;
    orchestrator
        .initialize(image, landmarks, &face)
        .map_err(|e| format!("Pipeline error: {e}"))?;
    if let Some(diagnostics) = orchestrator.diagnostics() {
        emit(diagnostics, cli.json)?;
    }

    let mode = update_mode(cli.mode);
    for run in 0..cli.runs {
        if cli.runs > 1 && !updates.is_empty() {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        for update in &updates {
            orchestrator
                .update_effect(update.clone(), mode)
                .map_err(|e| format!("Pipeline error: {e}"))?;
            if let Some(diagnostics) = orchestrator.diagnostics() {
                emit(diagnostics, cli.json)?;
            }
        }
    }

    let stats = orchestrator.get_performance_stats();
    if cli.json {
        let out = serde_json::to_string_pretty(&stats)
            .map_err(|e| format!("Error serializing stats: {e}"))?;
        println!("{out}");
    } else {
        println!("Summary\n{}", "=".repeat(60));
        println!(
            "Passes: {}  |  Quality level: {}  |  Mean pass: {:.3}ms",
            stats.passes,
            stats.current_quality_level,
            stats.average_processing_time.as_secs_f64() * 1000.0,
        );
        println!(
            "Cache: {} hits / {} misses ({:.0}%), {}/{} entries",
            stats.cache.hits,
            stats.cache.misses,
            stats.cache.hit_rate() * 100.0,
            stats.cache.len,
            stats.cache.capacity,
        );
    }

    if let Some(result) = orchestrator.get_current_result() {
        if !result.failed_effects.is_empty() {
            eprintln!("Failed effects: {:?}", result.failed_effects);
        }
        if let Some(ref path) = cli.output {
            result
                .final_image
                .save(path)
                .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            eprintln!("Image written to {}", path.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}
