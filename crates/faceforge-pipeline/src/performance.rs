//! Adaptive quality controller.
//!
//! Keeps a rolling window of recent pass durations. Once the window is
//! full its mean is compared with two thresholds: above the upper one the
//! level drops one step, below the lower one it rises one step. The
//! window is cleared after every transition, so the level moves at most
//! one step per window of observations.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::diagnostics::duration_serde;
use crate::types::PipelineError;

/// Working resolution relative to the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    /// Half resolution.
    Low,
    /// 70% resolution.
    Medium,
    /// Full resolution.
    #[default]
    High,
}

impl QualityLevel {
    /// Linear scale factor applied to the working image.
    #[must_use]
    pub const fn scale(self) -> f64 {
        match self {
            Self::High => 1.0,
            Self::Medium => 0.7,
            Self::Low => 0.5,
        }
    }

    /// One step down, saturating at `Low`.
    #[must_use]
    pub const fn lower(self) -> Self {
        match self {
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// One step up, saturating at `High`.
    #[must_use]
    pub const fn higher(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium | Self::High => Self::High,
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("High"),
            Self::Medium => f.write_str("Medium"),
            Self::Low => f.write_str("Low"),
        }
    }
}

/// Settings of the [`PerformanceController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Number of observations averaged before a transition is considered.
    pub window: usize,
    /// Mean duration above which the level drops (seconds).
    #[serde(with = "duration_serde")]
    pub degrade_above: Duration,
    /// Mean duration below which the level rises (seconds).
    #[serde(with = "duration_serde")]
    pub recover_below: Duration,
    /// Mean duration above which callers should skip frames (seconds).
    #[serde(with = "duration_serde")]
    pub frame_budget: Duration,
    /// Whether the level adapts at all. When off the level stays at
    /// `initial_level`.
    pub adaptive: bool,
    /// Level before any observation.
    pub initial_level: QualityLevel,
}

impl PerformanceConfig {
    pub const DEFAULT_WINDOW: usize = 10;
    pub const DEFAULT_DEGRADE_ABOVE: Duration = Duration::from_millis(50);
    pub const DEFAULT_RECOVER_BELOW: Duration = Duration::from_millis(25);
    pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(33);

    /// A controller that never changes level.
    #[must_use]
    pub fn fixed(level: QualityLevel) -> Self {
        Self {
            adaptive: false,
            initial_level: level,
            ..Self::default()
        }
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] for an empty window
    /// or a recover threshold that is not below the degrade threshold.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.window == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "performance.window must be at least 1".to_owned(),
            ));
        }
        if self.recover_below >= self.degrade_above {
            return Err(PipelineError::InvalidConfiguration(format!(
                "performance.recover_below ({:?}) must be below degrade_above ({:?})",
                self.recover_below, self.degrade_above
            )));
        }
        Ok(())
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
            degrade_above: Self::DEFAULT_DEGRADE_ABOVE,
            recover_below: Self::DEFAULT_RECOVER_BELOW,
            frame_budget: Self::DEFAULT_FRAME_BUDGET,
            adaptive: true,
            initial_level: QualityLevel::High,
        }
    }
}

/// Rolling-window hysteresis over pass durations.
#[derive(Debug, Clone)]
pub struct PerformanceController {
    config: PerformanceConfig,
    level: QualityLevel,
    samples: VecDeque<Duration>,
}

impl PerformanceController {
    #[must_use]
    pub fn new(config: PerformanceConfig) -> Self {
        Self {
            level: config.initial_level,
            samples: VecDeque::with_capacity(config.window),
            config,
        }
    }

    #[must_use]
    pub const fn level(&self) -> QualityLevel {
        self.level
    }

    /// Scale factor of the current level.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.level.scale()
    }

    /// Mean of the observations in the window, zero when empty.
    #[must_use]
    pub fn average(&self) -> Duration {
        let n = u32::try_from(self.samples.len()).unwrap_or(u32::MAX);
        if n == 0 {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / n
    }

    /// `true` when recent passes already exceed the frame budget.
    #[must_use]
    pub fn should_skip_frame(&self) -> bool {
        self.average() > self.config.frame_budget
    }

    /// Record one pass duration. Returns the new level if it changed.
    pub fn record(&mut self, duration: Duration) -> Option<QualityLevel> {
        if self.samples.len() == self.config.window {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);

        if !self.config.adaptive || self.samples.len() < self.config.window {
            return None;
        }

        let average = self.average();
        let next = if average > self.config.degrade_above {
            self.level.lower()
        } else if average < self.config.recover_below {
            self.level.higher()
        } else {
            self.level
        };
        if next == self.level {
            return None;
        }

        info!(
            from = %self.level,
            to = %next,
            average_ms = average.as_secs_f64() * 1000.0,
            "quality level changed"
        );
        self.level = next;
        self.samples.clear();
        Some(next)
    }

    /// Forget all observations and return to the initial level.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.level = self.config.initial_level;
    }
}
