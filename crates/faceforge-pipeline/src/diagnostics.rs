//! Pass diagnostics: what each orchestrator pass did to each effect and
//! how long it took.
//!
//! Every pass records one [`PassDiagnostics`], reachable through
//! [`Orchestrator::diagnostics`](crate::Orchestrator::diagnostics).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictKind;
use crate::effect::{EffectId, EffectLayer};
use crate::performance::QualityLevel;

/// Serde support for `std::time::Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// What happened to one effect during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EffectOutcome {
    /// The applier ran and its output was accepted.
    Computed,
    /// The effect was clean; its cached output was replayed.
    Replayed,
    /// The applier failed; the stale output (if any) was replayed.
    Failed { reason: String },
    /// The effect never produced an output and contributed nothing.
    Missing,
}

/// Diagnostics for one effect in one pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectDiagnostics {
    pub id: EffectId,
    pub layer: EffectLayer,
    #[serde(flatten)]
    pub outcome: EffectOutcome,
    /// Applier time including any rescaling; zero when replayed.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics collected from a single orchestrator pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassDiagnostics {
    /// Effects in composition order. Empty on a cache hit.
    pub effects: Vec<EffectDiagnostics>,
    /// Whether the composed result came from the result cache.
    pub cache_hit: bool,
    /// Quality level the pass rendered at.
    pub quality_level: QualityLevel,
    pub quality_score: f64,
    pub conflicts: Vec<ConflictKind>,
    /// Wall-clock duration of the whole pass.
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

impl PassDiagnostics {
    /// Number of effects whose applier ran successfully.
    #[must_use]
    pub fn computed(&self) -> usize {
        self.count(|o| matches!(o, EffectOutcome::Computed))
    }

    /// Number of effects replayed from their cached output.
    #[must_use]
    pub fn replayed(&self) -> usize {
        self.count(|o| matches!(o, EffectOutcome::Replayed))
    }

    /// Number of effects whose applier failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EffectOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&EffectOutcome) -> bool) -> usize {
        self.effects.iter().filter(|e| pred(&e.outcome)).count()
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        let total_ms = duration_ms(self.total_duration);

        let _ = writeln!(out, "Pass Diagnostics Report\n{}", "=".repeat(60));
        let _ = writeln!(
            out,
            "Quality level: {}  |  Score: {:.3}  |  Cache: {}",
            self.quality_level,
            self.quality_score,
            if self.cache_hit { "hit" } else { "miss" },
        );
        let _ = writeln!(out, "Total duration: {total_ms:.3}ms");
        if !self.conflicts.is_empty() {
            let names: Vec<&str> = self.conflicts.iter().map(|c| c.name()).collect();
            let _ = writeln!(out, "Conflicts: {}", names.join(", "));
        }
        out.push('\n');

        let _ = writeln!(
            out,
            "{:<20} {:<16} {:>10} {:>9}  Outcome",
            "Effect", "Layer", "Duration", "% Total"
        );
        let _ = writeln!(out, "{}", "-".repeat(80));
        for effect in &self.effects {
            let ms = duration_ms(effect.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let _ = writeln!(
                out,
                "{:<20} {:<16} {ms:>8.3}ms {pct:>8.1}%  {}",
                effect.id.as_str(),
                effect.layer.to_string(),
                format_outcome(&effect.outcome),
            );
        }

        out.push('\n');
        let _ = write!(
            out,
            "Computed: {}  |  Replayed: {}  |  Failed: {}",
            self.computed(),
            self.replayed(),
            self.failed(),
        );
        out
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_outcome(outcome: &EffectOutcome) -> String {
    match outcome {
        EffectOutcome::Computed => "computed".to_owned(),
        EffectOutcome::Replayed => "replayed".to_owned(),
        EffectOutcome::Failed { reason } => format!("FAILED: {reason}"),
        EffectOutcome::Missing => "missing".to_owned(),
    }
}
