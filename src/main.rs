use std::sync::Arc;

use gotcha::axum::response::{IntoResponse, Response};
use gotcha::Gotcha;
use gotcha::Json;
use serde_json::json;
use tracing::{error, info};

use tally::api::{greeting, items, sweep, users};
use tally::config::Settings;
use tally::service::TallyService;
use tally::{AppState, Service};

// ============================================================================
// Health check handler
// ============================================================================

async fn health_check() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting Tally API Server");

    let settings = Settings::new().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Initializing services...");
    let service = Service(Arc::new(
        TallyService::from_settings(&settings.application).await?,
    ));

    let app_state = AppState {
        service: service.clone(),
        settings: settings.application.clone(),
    };

    let addr = format!("{}:{}", &settings.basic.host, &settings.basic.port);
    info!("Starting server on http://{}", addr);

    let server = Gotcha::with_types::<AppState, Settings>()
        .state(app_state)
        .config(settings)
        // Health check
        .get("/health", health_check)
        // Item routes
        .post("/create-item", items::create_item)
        .get("/items", items::get_items)
        .put("/items/:id/done", items::mark_done)
        // User routes
        .post("/user", users::add_user)
        .get("/user/:id", users::get_user)
        .get("/users", users::list_users)
        // Sweep route
        .get("/sweep", sweep::get_sweep)
        // Greeting routes
        .get("/goodbye", greeting::goodbye_custom)
        .get("/goodbye/:name", greeting::goodbye)
        .with_cors()
        .with_openapi()
        .listen(addr);

    tokio::select! {
        result = server => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    service.shutdown().await;
    info!("Tally stopped");

    Ok(())
}
