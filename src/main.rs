use axum::{
    routing::{get, post, put},
    Router,
};
use rust_sm8_sync::attachments::DirectoryFileStore;
use rust_sm8_sync::badges::BadgeCache;
use rust_sm8_sync::config::{load_pipelines, Config};
use rust_sm8_sync::handlers::{self, AppState};
use rust_sm8_sync::pipeline::SubmissionPipeline;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the application.
///
/// Initializes logging, configuration, pipeline configs, the shared badge
/// cache and file store, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_sm8_sync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let pipelines = match &config.pipelines_path {
        Some(path) => {
            let pipelines = load_pipelines(path)?;
            tracing::info!(
                "Loaded {} pipeline config(s) from {}",
                pipelines.len(),
                path.display()
            );
            pipelines
        }
        None => {
            tracing::info!("PIPELINES_PATH not set; every form uses the default pipeline config");
            HashMap::new()
        }
    };

    // Badge cache shared by all pipeline runs, keyed by hashed credential
    let badge_cache = BadgeCache::new(
        Duration::from_secs(config.settings.cache_duration_secs),
        config.settings.cache_badges,
    );
    tracing::info!(
        "Badge cache initialized (enabled: {}, ttl: {}s)",
        config.settings.cache_badges,
        config.settings.cache_duration_secs
    );

    let file_store = Arc::new(DirectoryFileStore::new(config.uploads_dir.clone()));
    tracing::info!("Serving uploads from {}", config.uploads_dir.display());

    let pipeline = SubmissionPipeline::new(config.base_url.clone(), badge_cache, file_store)?;

    // Build application state
    let app_state = Arc::new(AppState {
        settings: RwLock::new(config.settings.clone()),
        config: config.clone(),
        pipelines,
        pipeline,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = Router::new()
        .route("/api/v1/forms/:form_id/submissions", post(handlers::submit))
        .route("/api/v1/connection/test", post(handlers::test_connection))
        .route("/api/v1/settings", put(handlers::update_settings))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 1MB (files travel by reference)
                .layer(RequestBodyLimitLayer::new(1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
