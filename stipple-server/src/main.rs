use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use stipple_core::{
    DeviceMap, JobHandler, SdxlLoader, DEFAULT_ATTENTION_SLICE_SIZE, DEFAULT_MODEL_ID,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod routes;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stipple SDXL serverless worker")]
struct Args {
    /// Use CPU instead of GPU
    #[arg(long)]
    cpu: bool,

    /// Hub repository of the SDXL weights
    #[arg(long, env = "STIPPLE_MODEL", default_value = DEFAULT_MODEL_ID)]
    model: String,

    /// Host address to bind the server to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,

    /// Attention slice size on accelerators, 0 disables slicing
    #[arg(long, default_value_t = DEFAULT_ATTENTION_SLICE_SIZE)]
    attention_slice_size: usize,

    /// Skip the start-up load and load on the first job instead
    #[arg(long)]
    lazy: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let loader = SdxlLoader {
        model_id: args.model,
        device_map: DeviceMap::from_cpu_flag(args.cpu),
        attention_slice_size: (args.attention_slice_size > 0).then_some(args.attention_slice_size),
        ..SdxlLoader::default()
    };
    let handler = Arc::new(JobHandler::new(loader));

    if args.lazy {
        tracing::info!("lazy start, the pipeline loads with the first job");
    } else {
        tracing::info!(model = handler.model_id(), "container starting, pre-loading pipeline");
        handler.preload().await;
    }

    let app = routes::router(handler);

    let bind_address = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening for jobs");
    axum::serve(listener, app).await?;

    Ok(())
}
