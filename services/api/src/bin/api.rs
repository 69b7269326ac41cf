//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, MemoryDb},
    config::Config,
    error::ApiError,
    web::{self, auth::hash_password, rest::ApiDoc, state::AppState},
};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    Router,
};
use mangati_core::{DatabaseService, NewUser, Role};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store. Data will not survive a restart.");
            Arc::new(MemoryDb::new())
        }
    };

    // --- 3. Seed the Administrator ---
    if let Some((email, password)) = &config.seed_admin {
        seed_admin(db.as_ref(), email, password).await?;
    }

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(db, config.clone())?);

    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
        .expose_headers([
            HeaderName::from_static(web::series::TOTAL_COUNT_HEADER),
            HeaderName::from_static(web::series::TOTAL_PAGES_HEADER),
        ]);

    // --- 5. Create the Web Router ---
    let api_router = web::router(app_state)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Creates the configured administrator unless an account with that email exists.
async fn seed_admin(db: &dyn DatabaseService, email: &str, password: &str) -> Result<(), ApiError> {
    if db.email_taken(email).await? {
        return Ok(());
    }
    let hashed_password =
        hash_password(password).map_err(|e| ApiError::Internal(format!("Failed to hash password: {}", e)))?;
    let username = email.split('@').next().unwrap_or(email).to_string();
    let admin = db
        .create_user(NewUser {
            username,
            email: email.to_string(),
            hashed_password,
            role: Role::Admin,
        })
        .await?;
    info!("Seeded administrator {}", admin.email);
    Ok(())
}
