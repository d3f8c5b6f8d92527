use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stipple_core::{GenerationResult, HealthReport, JobHandler, Loader};

pub const STATUS_COMPLETED: &str = "COMPLETED";
pub const STATUS_FAILED: &str = "FAILED";

/// A job as dispatched by the runtime.
#[derive(Deserialize, Debug)]
pub struct Job {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "empty_input")]
    pub input: Value,
}

fn empty_input() -> Value {
    Value::Object(Default::default())
}

#[derive(Serialize, Deserialize, Debug)]
pub struct JobResponse {
    pub id: String,
    pub status: String,
    pub output: GenerationResult,
}

fn sync_job_id() -> String {
    format!("sync-{}", uuid::Uuid::new_v4())
}

pub fn router<L: Loader + 'static>(handler: Arc<JobHandler<L>>) -> Router {
    Router::new()
        .route("/runsync", post(run_job::<L>))
        .route("/health", get(health::<L>))
        .with_state(handler)
}

async fn run_job<L: Loader + 'static>(
    State(handler): State<Arc<JobHandler<L>>>,
    job: Result<Json<Job>, JsonRejection>,
) -> impl IntoResponse {
    let Json(job) = match job {
        Ok(job) => job,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "malformed job envelope");
            let response = JobResponse {
                id: sync_job_id(),
                status: STATUS_FAILED.to_string(),
                output: GenerationResult::failure(format!(
                    "Handler error: {}",
                    rejection.body_text()
                )),
            };
            return (StatusCode::BAD_REQUEST, Json(response));
        }
    };

    let id = job.id.unwrap_or_else(sync_job_id);
    tracing::info!(job_id = %id, "handler called");
    let output = handler.handle(job.input).await;
    let response = JobResponse {
        id,
        status: STATUS_COMPLETED.to_string(),
        output,
    };
    (StatusCode::OK, Json(response))
}

async fn health<L: Loader + 'static>(
    State(handler): State<Arc<JobHandler<L>>>,
) -> Json<HealthReport> {
    Json(handler.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use image::DynamicImage;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stipple_core::{GenerationParams, HealthStatus, ModelLike};
    use tower::ServiceExt;

    struct BlankModel;

    impl ModelLike for BlankModel {
        fn run(&self, params: &GenerationParams) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgb8(
                params.width as u32 / 128,
                params.height as u32 / 128,
            ))
        }
    }

    struct BlankLoader;

    impl Loader for BlankLoader {
        type Model = BlankModel;

        fn model_id(&self) -> &str {
            "test/blank"
        }

        async fn load(&self) -> Result<BlankModel> {
            Ok(BlankModel)
        }
    }

    fn app() -> Router {
        router(Arc::new(JobHandler::new(BlankLoader)))
    }

    async fn post_job(app: Router, body: &str) -> (StatusCode, Value) {
        let request = Request::post("/runsync")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn runsync_wraps_output_in_envelope() {
        let body = json!({
            "id": "job-42",
            "input": { "prompt": "a paper crane", "height": 640, "width": 640 }
        });
        let (status, value) = post_job(app(), &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["id"], json!("job-42"));
        assert_eq!(value["status"], json!("COMPLETED"));
        assert_eq!(value["output"]["success"], json!(true));
        assert_eq!(value["output"]["model"], json!("test/blank"));
        assert_eq!(value["output"]["usage"]["height"], json!(640));
        assert!(value["output"]["image_data"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn validation_failures_are_completed_jobs() {
        let body = json!({ "input": { "prompt": "x", "num_inference_steps": 80 } });
        let (status, value) = post_job(app(), &body.to_string()).await;

        assert_eq!(status, StatusCode::OK);
        assert!(value["id"].as_str().unwrap().starts_with("sync-"));
        assert_eq!(value["output"]["success"], json!(false));
        assert_eq!(
            value["output"]["error"],
            json!("num_inference_steps must be between 1 and 50")
        );
    }

    #[tokio::test]
    async fn missing_input_reports_missing_prompt() {
        let (_, value) = post_job(app(), "{}").await;
        assert_eq!(
            value["output"]["error"],
            json!("Missing required parameter: 'prompt'")
        );
    }

    #[tokio::test]
    async fn malformed_envelope_is_rejected_with_a_result() {
        let (status, value) = post_job(app(), "{not json").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["status"], json!("FAILED"));
        assert_eq!(value["output"]["success"], json!(false));
        assert!(value["output"]["error"]
            .as_str()
            .unwrap()
            .starts_with("Handler error"));
    }

    #[tokio::test]
    async fn health_reports_pipeline_state() {
        let handler = Arc::new(JobHandler::new(BlankLoader));

        let response = router(Arc::clone(&handler))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: HealthReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);

        handler.preload().await;
        let response = router(handler)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let report: HealthReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.model.as_deref(), Some("test/blank"));
    }
}
