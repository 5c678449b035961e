//! One-shot rendering of many independent faces in parallel.
//!
//! Each job gets its own [`Orchestrator`]; the only thing jobs share is
//! the read-only [`ApplierRegistry`].

use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use crate::applier::ApplierRegistry;
use crate::effect::FaceConfig;
use crate::orchestrator::{IntegratedResult, Orchestrator};
use crate::types::{LandmarkSet, OrchestratorConfig, PipelineError, RgbaImage};

/// A face to render once.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub image: RgbaImage,
    pub landmarks: LandmarkSet,
    pub face: FaceConfig,
}

/// Render one face with a fresh orchestrator.
///
/// # Errors
///
/// As [`Orchestrator::new`] and [`Orchestrator::initialize`].
pub fn render(
    config: &OrchestratorConfig,
    registry: Arc<ApplierRegistry>,
    job: BatchJob,
) -> Result<Arc<IntegratedResult>, PipelineError> {
    let mut orchestrator = Orchestrator::new(config.clone(), registry)?;
    orchestrator.initialize(job.image, job.landmarks, &job.face)?;
    orchestrator
        .get_current_result()
        .ok_or(PipelineError::NotInitialized)
}

/// Render every job on the rayon pool. Results come back in job order;
/// one job failing does not affect the others.
#[must_use]
pub fn render_batch(
    config: &OrchestratorConfig,
    registry: &Arc<ApplierRegistry>,
    jobs: Vec<BatchJob>,
) -> Vec<Result<Arc<IntegratedResult>, PipelineError>> {
    debug!(jobs = jobs.len(), "rendering batch");
    jobs.into_par_iter()
        .map(|job| render(config, Arc::clone(registry), job))
        .collect()
}
