//! # Server Configuration
//!
//! Application state assembly, the Axum router and the serve loop with
//! background tasks (dedup sweeper, transport supervisor) tied to one
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::ingest::classify::Classifier;
use crate::ingest::dedup::{self, DedupGate};
use crate::ingest::IngestPipeline;
use crate::notify::Notifier;
use crate::store::LeadStore;
use crate::transport::ConnectionTracker;
use crate::transport::supervisor::TransportSupervisor;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn LeadStore>,
    pub notifier: Notifier,
    pub connection: Arc<ConnectionTracker>,
    pub pipeline: Arc<IngestPipeline>,
}

/// Assemble the application state from a config and a store.
pub fn build_state(
    config: AppConfig,
    store: Arc<dyn LeadStore>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let notifier = Notifier::new(config.events_buffer);
    let connection = Arc::new(ConnectionTracker::new());

    let gate = Arc::new(DedupGate::new(
        Duration::from_secs(config.dedup.window_seconds),
        config.dedup.capacity,
    ));

    let classifier = Classifier::from_keywords(&config.potential_keywords)?;
    if classifier.is_enabled() {
        tracing::info!(
            keywords = config.potential_keywords.len(),
            "creation-time classification enabled"
        );
    }

    let pipeline = Arc::new(IngestPipeline::new(
        Arc::clone(&store),
        notifier.clone(),
        gate,
        classifier,
        config.country_code.clone(),
    ));

    Ok(AppState {
        config,
        store,
        notifier,
        connection,
        pipeline,
    })
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route(
            "/leads",
            post(handlers::leads::create_lead).get(handlers::leads::list_leads),
        )
        .route("/leads/{id}/status", put(handlers::leads::update_lead_status))
        .route("/leads/{id}/value", put(handlers::leads::update_lead_value))
        .route("/leads/{id}", delete(handlers::leads::delete_lead))
        .route("/stats", get(handlers::stats::get_stats))
        .route("/transport/events", post(handlers::transport::ingest_event))
        .route(
            "/transport/contacts",
            post(handlers::transport::resolve_contact),
        )
        .route("/transport/state", post(handlers::transport::report_state))
        .route("/ws", get(handlers::ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration and store.
pub async fn run_server(
    config: AppConfig,
    store: Arc<dyn LeadStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config, store)?;

    let shutdown = CancellationToken::new();

    tokio::spawn(dedup::run_sweeper(
        Arc::clone(state.pipeline.dedup_gate()),
        Duration::from_secs(state.config.dedup.sweep_interval_seconds),
        shutdown.clone(),
    ));

    let supervisor = TransportSupervisor::new(
        Arc::clone(&state.connection),
        state.notifier.clone(),
        &state.config.transport,
    );
    tokio::spawn(supervisor.run(shutdown.clone()));

    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();

    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    shutdown.cancel();
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::leads::create_lead,
        crate::handlers::leads::list_leads,
        crate::handlers::leads::update_lead_status,
        crate::handlers::leads::update_lead_value,
        crate::handlers::leads::delete_lead,
        crate::handlers::stats::get_stats,
        crate::handlers::transport::ingest_event,
        crate::handlers::transport::resolve_contact,
        crate::handlers::transport::report_state,
    ),
    components(
        schemas(
            crate::handlers::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::transport::BridgeAcceptResponse,
            crate::models::lead::LeadResponse,
            crate::models::lead::LeadStatus,
            crate::models::lead::LeadSource,
            crate::store::LeadStats,
            crate::error::ApiError,
            crate::ingest::normalizer::RawChatEvent,
            crate::ingest::normalizer::Direction,
            crate::ingest::ContactResolution,
            crate::transport::BridgeLifecycleEvent,
            crate::transport::ConnectionState,
        )
    ),
    info(
        title = "Leadflow API",
        description = "WhatsApp CRM lead ingestion and pipeline API",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
