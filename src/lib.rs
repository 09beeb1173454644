pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod media;
pub mod response;
pub mod routes;
pub mod source;
pub mod workspace;

use std::{collections::HashSet, sync::Arc};

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    middleware,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{config::AppConfig, error::ApiError, extractor::Extractor};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub extractor: Arc<dyn Extractor>,
}

pub fn build_router(state: AppState) -> Result<Router, ApiError> {
    let cors = build_cors_layer(&state.config.allowed_origins)?;

    let protected = Router::new()
        .route("/api/downloader/fetch/", post(routes::fetch_link))
        .route("/api/downloader/fetch", post(routes::fetch_link))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Ok(Router::new()
        .route("/", get(routes::root_health))
        .route("/api/health", get(routes::health))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let origins = if configured.is_empty() {
        warn!("ALLOWED_ORIGINS is not set. Falling back to development origins.");
        vec![
            "http://127.0.0.1:5173".to_string(),
            "http://localhost:5173".to_string(),
        ]
    } else {
        configured.to_vec()
    };

    let normalized_origins = origins
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                ApiError::internal(format!(
                    "Invalid origin in ALLOWED_ORIGINS: {origin}. Use values like https://example.com"
                ))
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins
    );

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .expose_headers([CONTENT_DISPOSITION]))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
