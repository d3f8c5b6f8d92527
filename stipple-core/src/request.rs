use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MIN_DIMENSION: i64 = 512;
pub const MAX_DIMENSION: i64 = 1536;
pub const DEFAULT_DIMENSION: i64 = 1024;
/// The UNet downsamples by 8, so latent sizes need pixel sizes divisible by it.
pub const DIMENSION_MULTIPLE: i64 = 8;

pub const MIN_STEPS: i64 = 1;
pub const MAX_STEPS: i64 = 50;
pub const DEFAULT_STEPS: i64 = 25;

pub const MIN_GUIDANCE: f64 = 1.0;
pub const MAX_GUIDANCE: f64 = 20.0;
pub const DEFAULT_GUIDANCE: f64 = 7.5;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required parameter: 'prompt'")]
    MissingPrompt,
    #[error("Prompt must be a non-empty string")]
    BlankPrompt,
    #[error("height must be between 512 and 1536")]
    HeightOutOfRange(i64),
    #[error("width must be between 512 and 1536")]
    WidthOutOfRange(i64),
    #[error("num_inference_steps must be between 1 and 50")]
    StepsOutOfRange(i64),
    #[error("guidance_scale must be between 1.0 and 20.0")]
    GuidanceOutOfRange(f64),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// The `input` object of a job, as sent by the caller.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Kept loose so a non-string prompt is a prompt error, not a parse error.
    #[serde(default)]
    pub prompt: Option<Value>,
    #[serde(default = "default_dimension")]
    pub height: i64,
    #[serde(default = "default_dimension")]
    pub width: i64,
    #[serde(default = "default_steps")]
    pub num_inference_steps: i64,
    #[serde(default = "default_guidance")]
    pub guidance_scale: f64,
}

fn default_dimension() -> i64 {
    DEFAULT_DIMENSION
}

fn default_steps() -> i64 {
    DEFAULT_STEPS
}

fn default_guidance() -> f64 {
    DEFAULT_GUIDANCE
}

impl GenerationRequest {
    /// Parses a raw job input. Only JSON objects are accepted.
    pub fn from_input(input: Value) -> Result<Self, ValidationError> {
        if !input.is_object() {
            return Err(ValidationError::InvalidInput(format!(
                "expected a JSON object, got {input}"
            )));
        }
        serde_json::from_value(input).map_err(|e| ValidationError::InvalidInput(e.to_string()))
    }

    /// The prompt text. Absent or empty values (`null`, `""`, `0`, `false`,
    /// `[]`, `{}`) count as missing; any other non-string is rejected.
    pub fn prompt_text(&self) -> Result<&str, ValidationError> {
        let prompt = match &self.prompt {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                return Err(ValidationError::MissingPrompt)
            }
            Some(Value::String(s)) if s.is_empty() => return Err(ValidationError::MissingPrompt),
            Some(Value::Array(a)) if a.is_empty() => return Err(ValidationError::MissingPrompt),
            Some(Value::Object(o)) if o.is_empty() => return Err(ValidationError::MissingPrompt),
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => {
                return Err(ValidationError::MissingPrompt)
            }
            Some(Value::String(s)) => s.as_str(),
            Some(_) => return Err(ValidationError::BlankPrompt),
        };
        if prompt.trim().is_empty() {
            return Err(ValidationError::BlankPrompt);
        }
        Ok(prompt)
    }

    /// Checks every field in order and stops at the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.prompt_text()?;
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&self.height) {
            return Err(ValidationError::HeightOutOfRange(self.height));
        }
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&self.width) {
            return Err(ValidationError::WidthOutOfRange(self.width));
        }
        if !(MIN_STEPS..=MAX_STEPS).contains(&self.num_inference_steps) {
            return Err(ValidationError::StepsOutOfRange(self.num_inference_steps));
        }
        // NaN fails the range check too.
        if !(MIN_GUIDANCE..=MAX_GUIDANCE).contains(&self.guidance_scale) {
            return Err(ValidationError::GuidanceOutOfRange(self.guidance_scale));
        }
        Ok(())
    }

    /// Validates and normalizes into the parameters handed to the pipeline.
    pub fn into_params(self) -> Result<GenerationParams, ValidationError> {
        self.validate()?;
        Ok(GenerationParams {
            prompt: self.prompt_text()?.to_string(),
            height: snap_dimension(self.height),
            width: snap_dimension(self.width),
            steps: self.num_inference_steps.clamp(MIN_STEPS, MAX_STEPS) as usize,
            guidance_scale: self.guidance_scale.clamp(MIN_GUIDANCE, MAX_GUIDANCE),
        })
    }
}

/// Clamps into `[MIN_DIMENSION, MAX_DIMENSION]`, then rounds down to a multiple of 8.
pub fn snap_dimension(value: i64) -> usize {
    let clamped = value.clamp(MIN_DIMENSION, MAX_DIMENSION);
    (clamped - clamped % DIMENSION_MULTIPLE) as usize
}

/// Normalized generation parameters.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub height: usize,
    pub width: usize,
    pub steps: usize,
    pub guidance_scale: f64,
}
