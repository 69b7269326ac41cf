//! services/api/src/web/favorites.rs
//!
//! The caller's favorite series.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::error::HttpResult;
use crate::web::dto::{FavoriteRequest, SeriesDto};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

#[utoipa::path(
    get,
    path = "/api/favorites",
    tag = "favorites",
    responses(
        (status = 200, description = "Favorite series", body = [SeriesDto]),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
) -> HttpResult<Json<Vec<SeriesDto>>> {
    let favorites = state.db.list_favorites(caller.user_id).await?;
    Ok(Json(favorites.iter().map(SeriesDto::from).collect()))
}

/// POST /api/favorites - Mark a series as favorite; repeating it is harmless
#[utoipa::path(
    post,
    path = "/api/favorites",
    tag = "favorites",
    request_body = FavoriteRequest,
    responses(
        (status = 204, description = "Series is a favorite"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Series not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_favorite_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<FavoriteRequest>,
) -> HttpResult<StatusCode> {
    state
        .db
        .add_favorite(caller.user_id, req.manga_series_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/api/favorites/{mangaId}",
    tag = "favorites",
    params(("mangaId" = i64, Path, description = "Series id")),
    responses(
        (status = 204, description = "Favorite removed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Series was not a favorite")
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_favorite_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(series_id): Path<i64>,
) -> HttpResult<StatusCode> {
    state.db.remove_favorite(caller.user_id, series_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
