//! services/api/src/web/mod.rs
//!
//! The HTTP surface: handlers grouped by resource, and the router that wires
//! them to their paths.

pub mod auth;
pub mod chapters;
pub mod dto;
pub mod favorites;
pub mod filters;
pub mod health;
pub mod middleware;
pub mod progress;
pub mod rest;
pub mod series;
pub mod settings;
pub mod state;
pub mod subscription;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use mangati_core::{AccessError, Caller};
use std::sync::Arc;
use tracing::debug;

use crate::error::HttpError;
use state::AppState;

/// Logs an access-policy rejection and converts it into a response.
pub(crate) fn denied(operation: &str, caller: &Caller, err: AccessError) -> HttpError {
    debug!(
        "{} denied for {} ({:?}): {}",
        operation, caller.user_id, caller.role_claims, err
    );
    err.into()
}

/// Builds the application router. Every route sits behind [`middleware::authenticate`];
/// handlers decide whether a caller is required.
pub fn router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register_handler))
        .route("/login", post(auth::login_handler))
        .route("/me", get(auth::me_handler))
        .route("/refresh", post(auth::refresh_handler))
        .route("/debug", get(auth::debug_handler));

    let series_routes = Router::new()
        .route(
            "/",
            get(series::list_series_handler).post(series::create_series_handler),
        )
        .route(
            "/{id}",
            get(series::get_series_handler)
                .put(series::update_series_handler)
                .delete(series::delete_series_handler),
        );

    let chapter_routes = Router::new()
        .route(
            "/",
            get(chapters::list_chapters_handler).post(chapters::create_chapter_handler),
        )
        .route(
            "/{id}",
            get(chapters::get_chapter_handler).delete(chapters::delete_chapter_handler),
        )
        .route("/{id}/status", put(chapters::set_chapter_status_handler));

    let filter_routes = Router::new()
        .route(
            "/tags",
            get(filters::list_tags_handler).post(filters::create_tag_handler),
        )
        .route(
            "/languages",
            get(filters::list_languages_handler).post(filters::create_language_handler),
        )
        .route("/all", get(filters::all_filters_handler))
        .route("/trending-tags", get(filters::trending_tags_handler));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/mangaseries", series_routes)
        .nest("/manga/{mangaId}/chapter", chapter_routes)
        .nest("/filters", filter_routes)
        .route(
            "/favorites",
            get(favorites::list_favorites_handler).post(favorites::add_favorite_handler),
        )
        .route(
            "/favorites/{mangaId}",
            axum::routing::delete(favorites::remove_favorite_handler),
        )
        .route("/readingprogress", post(progress::record_progress_handler))
        .route("/readingprogress/{mangaId}", get(progress::series_progress_handler))
        .route(
            "/readingprogress/chapter/{chapterId}",
            get(progress::chapter_progress_handler),
        )
        .route(
            "/viewersettings",
            get(settings::get_settings_handler).put(settings::save_settings_handler),
        )
        .route("/subscription", get(subscription::my_subscription_handler))
        .route("/subscription/plans", get(subscription::list_plans_handler))
        .route(
            "/subscription/{userId}",
            put(subscription::assign_subscription_handler),
        );

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health::health_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ))
        .with_state(state)
}
