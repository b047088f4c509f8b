//! Lessonbook API Gateway
//!
//! The entry point for all external API requests. Handles:
//! - Bearer-token authentication
//! - Request routing
//! - Observability (logging, metrics, request ids)

mod extract;
mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use lessonbook_common::{
    auth::JwtManager,
    cache::ResponseCache,
    config::AppConfig,
    db::{DbPool, Repository},
    metrics,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jwt: Arc<JwtManager>,
    pub cache: Arc<ResponseCache>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.observability.log_level.clone()));
    if config.observability.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("Starting lessonbook API gateway v{}", lessonbook_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Prometheus exporter listening on {}", metrics_addr);
    }

    // Initialize database connection (runs bootstrap DDL)
    let db = DbPool::new(&config.database).await?;

    // Provision the bootstrap admin if configured and absent
    if let (Some(username), Some(password)) = (
        &config.auth.bootstrap_admin_username,
        &config.auth.bootstrap_admin_password,
    ) {
        let repo = Repository::new(db.clone());
        if repo.find_user_by_username(username).await?.is_none() {
            let password_hash = lessonbook_common::auth::hash_password(password)?;
            let admin = repo.create_user(username.clone(), password_hash, true).await?;
            info!(user_id = %admin.id, "Bootstrap admin provisioned");
        }
    }

    // Create app state
    let state = AppState {
        jwt: Arc::new(JwtManager::new(
            &config.auth.jwt_secret,
            config.auth.token_expiration_secs,
        )),
        cache: Arc::new(ResponseCache::new(Duration::from_secs(
            config.cache.ttl_secs,
        ))),
        config: config.clone(),
        db,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Auth endpoints
        .route("/token", post(handlers::auth::login))
        .route("/users", post(handlers::auth::create_user))
        .route(
            "/users/change-password",
            post(handlers::auth::change_password),
        )
        // Student endpoints
        .route("/students", get(handlers::students::list_students))
        .route("/students", post(handlers::students::create_student))
        .route("/students/{id}", get(handlers::students::get_student))
        .route("/students/{id}", put(handlers::students::update_student))
        .route("/students/{id}", delete(handlers::students::delete_student))
        // Lesson endpoints
        .route("/lessons", get(handlers::lessons::list_lessons))
        .route("/lessons", post(handlers::lessons::create_lesson))
        .route("/lessons/{id}", get(handlers::lessons::get_lesson))
        .route("/lessons/{id}", put(handlers::lessons::update_lesson))
        .route("/lessons/{id}", delete(handlers::lessons::delete_lesson))
        .route(
            "/lessons/{id}/complete",
            put(handlers::lessons::complete_lesson),
        )
        .route(
            "/lessons/{id}/cancel",
            put(handlers::lessons::cancel_lesson),
        )
        .route(
            "/lessons/by-student/{student_id}",
            get(handlers::lessons::lessons_by_student),
        )
        .route(
            "/lessons/by-date/{date}",
            get(handlers::lessons::lessons_by_date),
        )
        // Subscription endpoints
        .route(
            "/subscriptions",
            get(handlers::subscriptions::list_subscriptions),
        )
        .route(
            "/subscriptions",
            post(handlers::subscriptions::create_subscription),
        )
        .route(
            "/subscriptions/{id}",
            get(handlers::subscriptions::get_subscription),
        )
        .route(
            "/subscriptions/{id}",
            delete(handlers::subscriptions::delete_subscription),
        )
        .route(
            "/subscriptions/by-student/{student_id}",
            get(handlers::subscriptions::subscriptions_by_student),
        )
        // Finance endpoints
        .route("/expenses", get(handlers::finance::list_expenses))
        .route("/expenses", post(handlers::finance::create_expense))
        .route("/expenses/{id}", put(handlers::finance::update_expense))
        .route("/expenses/{id}", delete(handlers::finance::delete_expense))
        .route("/incomes", get(handlers::finance::list_incomes))
        .route("/incomes", post(handlers::finance::create_income))
        .route("/incomes/{id}", put(handlers::finance::update_income))
        .route("/incomes/{id}", delete(handlers::finance::delete_income))
        .route("/finance/summary", get(handlers::finance::finance_summary))
        // Rent settings endpoints
        .route("/rent-settings", get(handlers::rent::get_rent_settings))
        .route("/rent-settings", post(handlers::rent::upsert_rent_settings));

    // Compose the app
    Router::new()
        // Health endpoints (no auth, outside /api)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
