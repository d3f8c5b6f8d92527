use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use stipple_deploy::{
    load_api_key, DeployClient, EndpointConfig, DEFAULT_API_KEY_FILES, DEFAULT_CONFIG_FILE,
    DEFAULT_GRAPHQL_URL,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Create or update the SDXL serverless endpoint")]
struct Args {
    /// Endpoint definition (JSON)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// API key files to try in order; the first that exists is used
    #[arg(long = "api-key-file", default_values_t = DEFAULT_API_KEY_FILES.map(String::from))]
    api_key_files: Vec<String>,

    /// GraphQL API URL
    #[arg(long, env = "RUNPOD_GRAPHQL_URL", default_value = DEFAULT_GRAPHQL_URL)]
    api_url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let candidates: Vec<PathBuf> = args.api_key_files.iter().map(PathBuf::from).collect();
    let api_key = load_api_key(&candidates)?;
    let config = EndpointConfig::from_path(&args.config)?;

    tracing::info!(
        config = %serde_json::to_string_pretty(&config.redacted())?,
        "creating/updating endpoint"
    );

    let endpoint = DeployClient::with_url(api_key, args.api_url)
        .create_or_update_endpoint(&config)
        .await
        .context("failed to configure endpoint")?;

    tracing::info!(
        id = %endpoint.id,
        name = %endpoint.name,
        status = endpoint.status.as_deref().unwrap_or("unknown"),
        "endpoint created/updated"
    );
    Ok(())
}
