use std::{collections::BTreeMap, io::ErrorKind, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DeployError;

pub const DEFAULT_CONFIG_FILE: &str = "runpod-endpoint-config.json";

/// Declarative endpoint definition, as stored on disk.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfig {
    pub name: String,
    #[serde(flatten)]
    pub template: EndpointTemplate,
}

/// Everything but the name; sent as the endpoint's `template`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointTemplate {
    pub image_name: String,
    pub env: BTreeMap<String, String>,
    pub gpu_types: Vec<String>,
    pub min_vram: u32,
    pub container_disk_in_gb: u32,
    pub volume_in_gb: u32,
    /// Exposed ports, e.g. `"8000/http"`.
    pub ports: Value,
    pub max_concurrency: u32,
    pub max_runtime: u32,
    pub idle_timeout: u32,
    pub locations: Vec<String>,
}

impl EndpointConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                DeployError::ConfigNotFound(path.to_path_buf())
            } else {
                DeployError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&contents).map_err(|source| DeployError::InvalidConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A copy safe to log: environment values are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for value in config.template.env.values_mut() {
            *value = "***".to_string();
        }
        config
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn sample_config_json() -> Value {
        json!({
            "name": "sdxl-worker",
            "imageName": "registry.example.com/sdxl-worker:1.2.0",
            "env": { "HF_TOKEN": "{{ RUNPOD_SECRET_HuggingFaceAPI }}" },
            "gpuTypes": ["NVIDIA RTX A5000", "NVIDIA GeForce RTX 4090"],
            "minVram": 24,
            "containerDiskInGb": 40,
            "volumeInGb": 0,
            "ports": "8000/http",
            "maxConcurrency": 3,
            "maxRuntime": 600,
            "idleTimeout": 5,
            "locations": ["US"]
        })
    }

    #[test]
    fn parses_camel_case_fields() {
        let config: EndpointConfig = serde_json::from_value(sample_config_json()).unwrap();
        assert_eq!(config.name, "sdxl-worker");
        assert_eq!(config.template.min_vram, 24);
        assert_eq!(config.template.container_disk_in_gb, 40);
        assert_eq!(config.template.gpu_types.len(), 2);
        assert_eq!(config.template.ports, json!("8000/http"));
    }

    #[test]
    fn template_serializes_without_name() {
        let config: EndpointConfig = serde_json::from_value(sample_config_json()).unwrap();
        let template = serde_json::to_value(&config.template).unwrap();
        assert!(template.get("name").is_none());
        assert_eq!(template["imageName"], json!("registry.example.com/sdxl-worker:1.2.0"));
        assert_eq!(template["idleTimeout"], json!(5));
    }

    #[test]
    fn redaction_masks_env_values_only() {
        let config: EndpointConfig = serde_json::from_value(sample_config_json()).unwrap();
        let redacted = config.redacted();
        assert_eq!(redacted.template.env["HF_TOKEN"], "***");
        assert_eq!(redacted.template.image_name, config.template.image_name);
    }

    #[test]
    fn missing_file_is_reported() {
        let err = EndpointConfig::from_path("/nonexistent/endpoint.json").unwrap_err();
        assert!(matches!(err, DeployError::ConfigNotFound(_)));
    }

    #[test]
    fn missing_field_is_invalid() {
        let path = std::env::temp_dir().join(format!("stipple-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "name": "incomplete" }"#).unwrap();

        let err = EndpointConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, DeployError::InvalidConfig { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}
