use std::{path::PathBuf, sync::Arc};

use fetchmate_backend::{
    AppState, build_router, config::AppConfig, error::ApiError, extractor::YtDlpExtractor,
    workspace::cleanup_stale_workspaces,
};
use tokio::{net::TcpListener, time::Duration};
use tracing::{info, warn};

const STALE_WORKSPACE_SECONDS: u64 = 2 * 60 * 60;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "fetchmate_backend=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Server error: {}", error.message);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ApiError> {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let config = AppConfig::from_env(root).map_err(ApiError::internal)?;

    tokio::fs::create_dir_all(&config.scratch_root)
        .await
        .map_err(|error| {
            ApiError::internal(format!("Could not create the scratch directory: {error}"))
        })?;
    cleanup_stale_workspaces(
        &config.scratch_root,
        Duration::from_secs(STALE_WORKSPACE_SECONDS),
    )
    .await;

    if config.jwt_secret.is_none() {
        warn!("JWT_SECRET is not set. Every authenticated request will be rejected.");
    }
    if !config.cookies_file.exists() {
        info!(
            "No cookie file at {:?}. Sign-in gated content will be refused.",
            config.cookies_file
        );
    }

    let extractor = YtDlpExtractor::new(config.yt_dlp_program.clone(), config.yt_dlp_timeout);
    let bind_addr = config.bind_addr.clone();
    let state = AppState {
        config: Arc::new(config),
        extractor: Arc::new(extractor),
    };

    let app = build_router(state)?;

    let listener = TcpListener::bind(&bind_addr).await.map_err(|error| {
        ApiError::internal(format!("Could not bind {bind_addr}: {error}"))
    })?;

    info!("Backend ready on http://{bind_addr}");

    axum::serve(listener, app)
        .await
        .map_err(|error| ApiError::internal(format!("HTTP server error: {error}")))
}
