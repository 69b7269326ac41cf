//! services/api/src/web/settings.rs
//!
//! Reader display preferences, always bound to the caller.

use axum::{extract::State, http::StatusCode, Json};
use mangati_core::{validation, ViewerSettings};
use std::sync::Arc;

use crate::error::HttpResult;
use crate::web::dto::ViewerSettingsDto;
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

/// GET /api/viewersettings - Stored settings, or the defaults when none were saved
#[utoipa::path(
    get,
    path = "/api/viewersettings",
    tag = "settings",
    responses(
        (status = 200, description = "Viewer settings", body = ViewerSettingsDto),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> HttpResult<Json<ViewerSettingsDto>> {
    let settings = state
        .db
        .get_viewer_settings(caller.user_id)
        .await?
        .unwrap_or_else(|| ViewerSettings::defaults_for(caller.user_id));
    Ok(Json(ViewerSettingsDto::from(&settings)))
}

#[utoipa::path(
    put,
    path = "/api/viewersettings",
    tag = "settings",
    request_body = ViewerSettingsDto,
    responses(
        (status = 204, description = "Settings saved"),
        (status = 400, description = "Zoom level out of range"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_settings_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<ViewerSettingsDto>,
) -> HttpResult<StatusCode> {
    validation::zoom_level(req.zoom_level)?;
    state
        .db
        .save_viewer_settings(ViewerSettings {
            user_id: caller.user_id,
            theme: req.theme,
            reading_mode: req.reading_mode,
            fit_to_width: req.fit_to_width,
            zoom_level: req.zoom_level,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
