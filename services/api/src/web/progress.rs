//! services/api/src/web/progress.rs
//!
//! Per-chapter reading progress of the caller.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use mangati_core::validation;
use std::sync::Arc;

use crate::error::HttpResult;
use crate::web::dto::{ChapterProgressDto, UpdateProgressRequest};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

#[utoipa::path(
    get,
    path = "/api/readingprogress/{mangaId}",
    tag = "progress",
    params(("mangaId" = i64, Path, description = "Series id")),
    responses(
        (status = 200, description = "Progress per chapter of the series", body = [ChapterProgressDto]),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearer_auth" = []))
)]
pub async fn series_progress_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(series_id): Path<i64>,
) -> HttpResult<Json<Vec<ChapterProgressDto>>> {
    let progress = state
        .db
        .progress_for_series(caller.user_id, series_id)
        .await?;
    Ok(Json(progress.iter().map(ChapterProgressDto::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/readingprogress/chapter/{chapterId}",
    tag = "progress",
    params(("chapterId" = i64, Path, description = "Chapter id")),
    responses(
        (status = 200, description = "Progress in the chapter", body = ChapterProgressDto),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Chapter never opened")
    ),
    security(("bearer_auth" = []))
)]
pub async fn chapter_progress_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(chapter_id): Path<i64>,
) -> HttpResult<Json<ChapterProgressDto>> {
    let progress = state
        .db
        .progress_for_chapter(caller.user_id, chapter_id)
        .await?;
    Ok(Json(ChapterProgressDto::from(&progress)))
}

#[utoipa::path(
    post,
    path = "/api/readingprogress",
    tag = "progress",
    request_body = UpdateProgressRequest,
    responses(
        (status = 204, description = "Progress saved"),
        (status = 400, description = "Invalid page number"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Chapter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn record_progress_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<UpdateProgressRequest>,
) -> HttpResult<StatusCode> {
    validation::page_number(req.page_number)?;
    state
        .db
        .record_progress(caller.user_id, req.chapter_id, req.page_number, Utc::now())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
