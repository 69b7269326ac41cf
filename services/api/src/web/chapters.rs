//! services/api/src/web/chapters.rs
//!
//! Chapters of a series. Reads are open to anonymous visitors but filtered by
//! moderation visibility; uploads are charged against the uploader's monthly
//! quota unless the uploader is an admin.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use mangati_core::{
    access::is_visible, authorize, check_roles, rules, validation, AccessError, Caller,
    ChapterStatus, NewChapter, NewPage, ResourceState, Role, UploadCharge,
};
use std::sync::Arc;
use uuid::Uuid;
use tracing::{info, warn};

use crate::error::{HttpError, HttpResult};
use crate::web::denied;
use crate::web::dto::{
    ChapterDetailDto, ChapterDto, ChapterListQuery, CreateChapterRequest, PageDto,
    UpdateChapterStatusRequest,
};
use crate::web::middleware::{AuthCaller, MaybeCaller};
use crate::web::state::AppState;

const IMAGE_URL_MAX: usize = 500;

fn is_visible_to(caller: Option<&Caller>, author_id: Uuid, status: ChapterStatus) -> bool {
    is_visible(caller, &ResourceState::moderated(author_id, status))
}

/// GET /api/manga/{mangaId}/chapter - Chapters the caller may see, by number
#[utoipa::path(
    get,
    path = "/api/manga/{mangaId}/chapter",
    tag = "chapters",
    params(
        ("mangaId" = i64, Path, description = "Series id"),
        ChapterListQuery
    ),
    responses(
        (status = 200, description = "Visible chapters", body = [ChapterDto]),
        (status = 404, description = "Series not found")
    )
)]
pub async fn list_chapters_handler(
    State(state): State<Arc<AppState>>,
    MaybeCaller(caller): MaybeCaller,
    Path(series_id): Path<i64>,
    Query(query): Query<ChapterListQuery>,
) -> HttpResult<Json<Vec<ChapterDto>>> {
    let series = state.db.get_series(series_id).await?;

    // The status filter is a moderation tool; readers always get the visible set.
    let status_filter = query.status.filter(|_| {
        caller
            .as_ref()
            .is_some_and(|c| c.has_any_role(&[Role::Admin, Role::Writer]))
    });

    let chapters = state
        .db
        .list_chapters(series_id)
        .await?
        .iter()
        .filter(|c| is_visible_to(caller.as_ref(), series.author_id, c.status))
        .filter(|c| status_filter.map_or(true, |s| c.status == s))
        .map(ChapterDto::from)
        .collect();

    Ok(Json(chapters))
}

/// GET /api/manga/{mangaId}/chapter/{id} - A chapter with its pages
#[utoipa::path(
    get,
    path = "/api/manga/{mangaId}/chapter/{id}",
    tag = "chapters",
    params(
        ("mangaId" = i64, Path, description = "Series id"),
        ("id" = i64, Path, description = "Chapter id")
    ),
    responses(
        (status = 200, description = "Chapter with pages", body = ChapterDetailDto),
        (status = 404, description = "Chapter not available")
    )
)]
pub async fn get_chapter_handler(
    State(state): State<Arc<AppState>>,
    MaybeCaller(caller): MaybeCaller,
    Path((series_id, chapter_id)): Path<(i64, i64)>,
) -> HttpResult<Json<ChapterDetailDto>> {
    let series = state.db.get_series(series_id).await?;
    let chapter = state.db.get_chapter(series_id, chapter_id).await?;

    match authorize(
        caller.as_ref(),
        &rules::READ_CHAPTER,
        &ResourceState::moderated(series.author_id, chapter.status),
    ) {
        Ok(()) => {}
        Err(AccessError::NotFound) => return Err(HttpError::not_found("Chapter not available")),
        Err(e) => return Err(e.into()),
    }

    if let Some(caller) = &caller {
        if let Err(e) = state
            .db
            .touch_progress(caller.user_id, chapter.id, Utc::now())
            .await
        {
            warn!("Failed to record progress for {}: {}", caller.user_id, e);
        }
    }

    Ok(Json(ChapterDetailDto {
        chapter: ChapterDto::from(&chapter),
        pages: chapter.pages.iter().map(PageDto::from).collect(),
    }))
}

/// POST /api/manga/{mangaId}/chapter - Upload a chapter
#[utoipa::path(
    post,
    path = "/api/manga/{mangaId}/chapter",
    tag = "chapters",
    params(("mangaId" = i64, Path, description = "Series id")),
    request_body = CreateChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterDto),
        (status = 400, description = "Invalid input, no active subscription or monthly limit reached"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller may not upload to this series"),
        (status = 404, description = "Series not found"),
        (status = 409, description = "Chapter number already used")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_chapter_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(series_id): Path<i64>,
    Json(req): Json<CreateChapterRequest>,
) -> HttpResult<impl IntoResponse> {
    // Role first, so a viewer learns nothing about the series.
    check_roles(Some(&caller), &rules::CREATE_CHAPTER)
        .map_err(|e| denied("create chapter", &caller, e))?;

    let series = state.db.get_series(series_id).await?;
    authorize(
        Some(&caller),
        &rules::CREATE_CHAPTER,
        &ResourceState::authored_by(series.author_id),
    )
    .map_err(|e| denied("create chapter", &caller, e))?;

    let title = validation::required_text("Title", &req.title, validation::CHAPTER_TITLE_MAX)?;
    if let Some(number) = req.number {
        if number < 1 {
            return Err(HttpError::bad_request("Chapter number must be positive"));
        }
    }
    let pages = req
        .pages
        .into_iter()
        .map(|p| {
            Ok(NewPage {
                image_url: validation::required_text("Image URL", &p.image_url, IMAGE_URL_MAX)?,
                file_size_bytes: validation::file_size(p.file_size_bytes)?,
            })
        })
        .collect::<Result<Vec<_>, validation::ValidationError>>()?;

    let (charge, status) = if caller.is_admin() {
        (UploadCharge::Exempt, ChapterStatus::Approved)
    } else {
        (
            UploadCharge::Quota {
                user_id: caller.user_id,
            },
            ChapterStatus::Pending,
        )
    };

    let chapter = state
        .db
        .create_chapter(
            NewChapter {
                series_id,
                title,
                number: req.number,
                status,
                pages,
            },
            charge,
            Utc::now(),
        )
        .await
        .map_err(|e| {
            warn!("Chapter upload by {} refused: {}", caller.user_id, e);
            HttpError::from(e)
        })?;
    info!(
        "User {} uploaded chapter {} (#{}) to series {}",
        caller.user_id, chapter.id, chapter.number, series_id
    );

    Ok((StatusCode::CREATED, Json(ChapterDto::from(&chapter))))
}

/// PUT /api/manga/{mangaId}/chapter/{id}/status - Moderate a chapter
#[utoipa::path(
    put,
    path = "/api/manga/{mangaId}/chapter/{id}/status",
    tag = "chapters",
    params(
        ("mangaId" = i64, Path, description = "Series id"),
        ("id" = i64, Path, description = "Chapter id")
    ),
    request_body = UpdateChapterStatusRequest,
    responses(
        (status = 204, description = "Status changed"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Chapter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn set_chapter_status_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path((series_id, chapter_id)): Path<(i64, i64)>,
    Json(req): Json<UpdateChapterStatusRequest>,
) -> HttpResult<StatusCode> {
    check_roles(Some(&caller), &rules::MODERATE_CHAPTER)
        .map_err(|e| denied("moderate chapter", &caller, e))?;

    state
        .db
        .set_chapter_status(series_id, chapter_id, req.status)
        .await?;
    info!(
        "Admin {} set chapter {} to {}",
        caller.user_id,
        chapter_id,
        req.status.as_str()
    );
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/manga/{mangaId}/chapter/{id} - Remove a chapter
#[utoipa::path(
    delete,
    path = "/api/manga/{mangaId}/chapter/{id}",
    tag = "chapters",
    params(
        ("mangaId" = i64, Path, description = "Series id"),
        ("id" = i64, Path, description = "Chapter id")
    ),
    responses(
        (status = 204, description = "Chapter deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller does not own the series"),
        (status = 404, description = "Chapter not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_chapter_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path((series_id, chapter_id)): Path<(i64, i64)>,
) -> HttpResult<StatusCode> {
    check_roles(Some(&caller), &rules::DELETE_CHAPTER)
        .map_err(|e| denied("delete chapter", &caller, e))?;

    let series = state.db.get_series(series_id).await?;
    authorize(
        Some(&caller),
        &rules::DELETE_CHAPTER,
        &ResourceState::authored_by(series.author_id),
    )
    .map_err(|e| denied("delete chapter", &caller, e))?;

    state.db.delete_chapter(series_id, chapter_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
