use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rust_bizops_api::config::Config;
use rust_bizops_api::db::Database;
use rust_bizops_api::handlers::{self, AppState};
use rust_bizops_api::models;

/// OpenAPI document for the public surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::check_limit,
        handlers::usage_summary,
        handlers::create_campaign,
        handlers::get_campaign,
        handlers::dispatch_campaign,
        handlers::list_leads,
        handlers::generate_leads,
    ),
    components(schemas(
        models::Campaign,
        models::CampaignEmail,
        models::Lead,
        models::CreateCampaignRequest,
        models::DispatchRequest,
        models::DispatchResponse,
        models::LimitCheckResponse,
        models::FeatureUsage,
        models::UsageResponse,
        models::GenerateLeadsRequest,
        models::GenerateLeadsResponse,
    )),
    tags(
        (name = "rust-bizops-api", description = "Multi-tenant business management API")
    )
)]
struct ApiDoc;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection.
/// - Caches (dispatch dedup, plan limits).
/// - HTTP routes and middleware (CORS, rate limiting, body limit).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_bizops_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Dispatch dedup cache. The TTL is a backstop only - the handler
    // invalidates entries when a dispatch finishes - but it must outlive the
    // longest plausible send loop, which for a large campaign is minutes.
    let dispatching_campaigns = Cache::builder()
        .time_to_live(Duration::from_secs(1800))
        .max_capacity(10_000)
        .build();
    tracing::info!("Dispatch deduplication cache initialized");

    // Plan cache (60s TTL). Limits change rarely; usage counts are never
    // cached, so a stale plan row is the only staleness possible here.
    let plan_cache = Cache::builder()
        .time_to_live(Duration::from_secs(60))
        .max_capacity(50_000)
        .build();
    tracing::info!("Plan limit cache initialized (60s TTL)");

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        dispatching_campaigns,
        plan_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Feature gating
        .route("/api/v1/limits/:feature", get(handlers::check_limit))
        .route("/api/v1/usage", get(handlers::usage_summary))
        // Campaigns
        .route("/api/v1/campaigns", post(handlers::create_campaign))
        .route("/api/v1/campaigns/:id", get(handlers::get_campaign))
        .route(
            "/api/v1/campaigns/:id/dispatch",
            post(handlers::dispatch_campaign),
        )
        // Leads
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/generate", post(handlers::generate_leads))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 2MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(2 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting) and docs
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
