use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{DeployError, EndpointConfig};

pub const DEFAULT_GRAPHQL_URL: &str = "https://api.runpod.ai/graphql";

const CREATE_ENDPOINT_MUTATION: &str = r#"
mutation CreateEndpoint($input: EndpointInput!) {
    createEndpoint(input: $input) {
        id
        name
        status
    }
}
"#;

/// The endpoint as acknowledged by the platform.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Builds the GraphQL request body for `createEndpoint`.
pub fn create_endpoint_payload(config: &EndpointConfig) -> Value {
    json!({
        "query": CREATE_ENDPOINT_MUTATION,
        "variables": {
            "input": {
                "name": config.name,
                "template": config.template,
            }
        }
    })
}

pub struct DeployClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl DeployClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(api_key, DEFAULT_GRAPHQL_URL)
    }

    pub fn with_url(api_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// Sends one `createEndpoint` mutation. The platform creates or updates by
    /// name; nothing is retried here.
    pub async fn create_or_update_endpoint(
        &self,
        config: &EndpointConfig,
    ) -> Result<Endpoint, DeployError> {
        let payload = create_endpoint_payload(config);
        tracing::debug!(url = %self.url, "sending createEndpoint mutation");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        // A 200 can still carry GraphQL errors.
        if let Some(errors) = body.get("errors") {
            return Err(DeployError::GraphQl(errors.clone()));
        }
        let endpoint = body
            .pointer("/data/createEndpoint")
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or(DeployError::MissingEndpoint)?;
        serde_json::from_value(endpoint).map_err(DeployError::InvalidEndpoint)
    }
}
