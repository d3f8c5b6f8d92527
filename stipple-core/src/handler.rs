//! Job handling around a lazily loaded pipeline.
//!
//! Every path through [`JobHandler::handle`] ends in a [`GenerationResult`]:
//! bad input, load failures, inference errors and panics in the model are all
//! reported to the caller and the process keeps serving.

use std::{sync::Arc, time::Instant};

use anyhow::Result;
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::{error, info, warn};

use crate::{
    image_to_data_uri, GenerationParams, GenerationRequest, GenerationResult, HealthReport,
    HealthStatus, Loader, ModelLike,
};

const PROMPT_LOG_CHARS: usize = 100;

pub struct JobHandler<L: Loader> {
    loader: L,
    pipeline: OnceCell<Arc<L::Model>>,
    // One generation at a time per process. The guard travels into the
    // blocking task so a dropped caller cannot release it early.
    inference_gate: Arc<Mutex<()>>,
}

impl<L: Loader> JobHandler<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            pipeline: OnceCell::new(),
            inference_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn model_id(&self) -> &str {
        self.loader.model_id()
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.initialized()
    }

    /// Returns the pipeline, loading it on first use. Concurrent callers share
    /// one load; a failed load is retried by the next caller.
    pub async fn ensure_loaded(&self) -> Result<Arc<L::Model>> {
        let pipeline = self
            .pipeline
            .get_or_try_init(|| async {
                info!(model = self.loader.model_id(), "loading pipeline");
                let started = Instant::now();
                let model = self.loader.load().await?;
                info!(elapsed = ?started.elapsed(), "pipeline loaded");
                Ok::<_, anyhow::Error>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(pipeline))
    }

    /// Eager load at start-up. A failure is logged, not fatal.
    pub async fn preload(&self) -> bool {
        match self.ensure_loaded().await {
            Ok(_) => {
                info!("pipeline pre-loaded");
                true
            }
            Err(e) => {
                error!(
                    error = %format!("{e:#}"),
                    "pipeline pre-loading failed, jobs will load on demand"
                );
                false
            }
        }
    }

    /// Handles the `input` object of one job.
    pub async fn handle(&self, input: Value) -> GenerationResult {
        let params = match GenerationRequest::from_input(input).and_then(|r| r.into_params()) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "rejected job");
                return GenerationResult::failure(e.to_string());
            }
        };

        info!(
            prompt = %truncate(&params.prompt, PROMPT_LOG_CHARS),
            height = params.height,
            width = params.width,
            steps = params.steps,
            guidance = params.guidance_scale,
            "processing generation request"
        );

        let result = self.generate(params).await;
        info!(
            success = result.success,
            image_data_len = result.image_data.len(),
            "generation finished"
        );
        result
    }

    async fn generate(&self, params: GenerationParams) -> GenerationResult {
        let pipeline = match self.ensure_loaded().await {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!(error = %format!("{e:#}"), "failed to load pipeline");
                return GenerationResult::failure(format!("Failed to load SDXL pipeline: {e:#}"));
            }
        };

        let gate = Arc::clone(&self.inference_gate).lock_owned().await;
        let job_params = params.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let _gate = gate;
            let image = pipeline.run(&job_params)?;
            image_to_data_uri(&image)
        })
        .await;

        match outcome {
            Ok(Ok(image_data)) => {
                GenerationResult::success(image_data, &params, self.loader.model_id())
            }
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "generation failed");
                GenerationResult::failure(format!("Generation error: {e:#}"))
            }
            Err(e) => {
                error!(error = %e, "generation task aborted");
                GenerationResult::failure(format!("Generation error: {e}"))
            }
        }
    }

    pub fn health(&self) -> HealthReport {
        if self.is_loaded() {
            HealthReport {
                status: HealthStatus::Healthy,
                message: "SDXL pipeline loaded and ready".to_string(),
                model: Some(self.loader.model_id().to_string()),
            }
        } else {
            HealthReport {
                status: HealthStatus::Unhealthy,
                message: "SDXL pipeline not loaded".to_string(),
                model: None,
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
