//! Tile and analytics API service.
//!
//! HTTP server serving vector/raster/archive tiles, feature search,
//! geospatial analytics and datasource probes.

use anyhow::Result;
use axum::{extract::Extension, routing::get, routing::post, Router};
use clap::Parser;
use std::{env, net::SocketAddr, sync::Arc};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use tile_api::handlers;
use tile_api::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "tile-api")]
#[command(about = "Tile serving and spatial analytics API server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    info!("Starting tile API server");

    let state = Arc::new(AppState::new().await?);

    let app = Router::new()
        // Tile read path
        .route(
            "/tiles/:tileset_id/:z/:x/:y",
            get(handlers::tile_handler),
        )
        .route(
            "/tilesets/:tileset_id/tilejson",
            get(handlers::tilejson_handler),
        )
        // Feature search
        .route("/search", get(handlers::search_handler))
        // Analytics
        .route("/analytics/distance", post(handlers::distance_handler))
        .route("/analytics/nearest", post(handlers::nearest_handler))
        .route("/analytics/density", post(handlers::density_handler))
        .route("/analytics/clusters", post(handlers::clusters_handler))
        .route("/analytics/ring", post(handlers::ring_handler))
        .route("/analytics/area", post(handlers::area_handler))
        // Datasource probes
        .route(
            "/datasources/:datasource_id/probe",
            get(handlers::probe_handler),
        )
        // Health & observability
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(state))
        .layer(Extension(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
