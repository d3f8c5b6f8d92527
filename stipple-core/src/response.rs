use serde::{Deserialize, Serialize};

use crate::GenerationParams;

/// Model name reported on failed jobs.
pub const ERROR_MODEL: &str = "error";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Usage {
    pub inference_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
}

impl Usage {
    pub fn from_params(params: &GenerationParams) -> Self {
        Self {
            inference_steps: params.steps,
            height: Some(params.height),
            width: Some(params.width),
            guidance_scale: Some(params.guidance_scale),
        }
    }

    pub fn none() -> Self {
        Self {
            inference_steps: 0,
            height: None,
            width: None,
            guidance_scale: None,
        }
    }
}

/// The output of a job. Failures are values, never faults.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub success: bool,
    pub image_data: String,
    pub usage: Usage,
    pub model: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn success(image_data: String, params: &GenerationParams, model: &str) -> Self {
        Self {
            success: true,
            image_data,
            usage: Usage::from_params(params),
            model: model.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            image_data: String::new(),
            usage: Usage::none(),
            model: ERROR_MODEL.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            error: Some(error.into()),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
