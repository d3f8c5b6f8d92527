//! Creates or updates the serverless endpoint that runs the SDXL worker.

pub mod client;
pub mod config;
pub mod credentials;
mod error;

pub use client::{DeployClient, Endpoint, DEFAULT_GRAPHQL_URL};
pub use config::{EndpointConfig, EndpointTemplate, DEFAULT_CONFIG_FILE};
pub use credentials::{load_api_key, read_api_key, DEFAULT_API_KEY_FILES};
pub use error::DeployError;
