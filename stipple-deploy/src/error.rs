use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("API key file not found, tried {}", display_paths(.0))]
    MissingCredentials(Vec<PathBuf>),
    #[error("config file {0} not found")]
    ConfigNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    InvalidConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("GraphQL errors: {0}")]
    GraphQl(serde_json::Value),
    #[error("no endpoint data in response")]
    MissingEndpoint,
    #[error("unexpected endpoint data: {0}")]
    InvalidEndpoint(#[source] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
