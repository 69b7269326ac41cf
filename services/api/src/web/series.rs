//! services/api/src/web/series.rs
//!
//! The manga series catalogue: public listing and detail, and authoring
//! operations for writers.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode},
    response::IntoResponse,
    Json,
};
use mangati_core::{
    authorize, check_roles, rules, validation, ChapterStatus, NewSeries, ResourceState,
    SeriesFilter, SeriesUpdate,
};
use std::sync::Arc;
use tracing::info;

use crate::error::{HttpError, HttpResult};
use crate::web::denied;
use crate::web::dto::{
    ChapterListItemDto, CreateSeriesRequest, SeriesDetailDto, SeriesDto, SeriesListQuery,
    UpdateSeriesRequest,
};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";
pub const TOTAL_PAGES_HEADER: &str = "x-total-pages";

const COVER_URL_MAX: usize = 500;

fn parse_tag_ids(raw: Option<&str>) -> HttpResult<Vec<i64>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| HttpError::bad_request(format!("'{}' is not a valid tag id", s)))
        })
        .collect()
}

impl SeriesListQuery {
    fn into_filter(self) -> HttpResult<SeriesFilter> {
        let tag_ids = parse_tag_ids(self.tag_ids.as_deref())?;
        Ok(SeriesFilter {
            search_term: self.search_term,
            status: self.status,
            language_id: self.language_id,
            tag_ids,
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(SeriesFilter::DEFAULT_PAGE_SIZE),
        }
        .normalized())
    }
}

/// GET /api/mangaseries - Filtered, paged catalogue listing
#[utoipa::path(
    get,
    path = "/api/mangaseries",
    tag = "series",
    params(SeriesListQuery),
    responses(
        (status = 200, description = "One page of series; totals in X-Total-Count / X-Total-Pages", body = [SeriesDto]),
        (status = 400, description = "Malformed filter")
    )
)]
pub async fn list_series_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SeriesListQuery>,
) -> HttpResult<impl IntoResponse> {
    let filter = query.into_filter()?;
    let page = state.db.list_series(&filter).await?;

    let items: Vec<SeriesDto> = page.items.iter().map(SeriesDto::from).collect();
    let headers = [
        (
            HeaderName::from_static(TOTAL_COUNT_HEADER),
            page.total_items.to_string(),
        ),
        (
            HeaderName::from_static(TOTAL_PAGES_HEADER),
            page.total_pages.to_string(),
        ),
    ];
    Ok((headers, Json(items)))
}

/// GET /api/mangaseries/{id} - Series detail with its approved chapters
#[utoipa::path(
    get,
    path = "/api/mangaseries/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series id")),
    responses(
        (status = 200, description = "Series detail", body = SeriesDetailDto),
        (status = 404, description = "Series not found")
    )
)]
pub async fn get_series_handler(
    State(state): State<Arc<AppState>>,
    Path(series_id): Path<i64>,
) -> HttpResult<Json<SeriesDetailDto>> {
    let series = state.db.get_series(series_id).await?;
    let chapters = state
        .db
        .list_chapters(series_id)
        .await?
        .iter()
        .filter(|c| c.status == ChapterStatus::Approved)
        .map(ChapterListItemDto::from)
        .collect();

    Ok(Json(SeriesDetailDto {
        series: SeriesDto::from(&series),
        chapters,
    }))
}

/// POST /api/mangaseries - Start a new series authored by the caller
#[utoipa::path(
    post,
    path = "/api/mangaseries",
    tag = "series",
    request_body = CreateSeriesRequest,
    responses(
        (status = 201, description = "Series created", body = SeriesDto),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller is not a writer")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_series_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<CreateSeriesRequest>,
) -> HttpResult<impl IntoResponse> {
    check_roles(Some(&caller), &rules::CREATE_SERIES)
        .map_err(|e| denied("create series", &caller, e))?;

    let title = validation::required_text("Title", &req.title, validation::SERIES_TITLE_MAX)?;
    let cover_image_url =
        validation::required_text("Cover image URL", &req.cover_image_url, COVER_URL_MAX)?;

    let series = state
        .db
        .create_series(NewSeries {
            title,
            synopsis: req.synopsis.trim().to_string(),
            cover_image_url,
            author_id: caller.user_id,
            tag_ids: req.tag_ids.unwrap_or_default(),
            language_ids: req.language_ids.unwrap_or_default(),
        })
        .await?;
    info!("User {} created series {}", caller.user_id, series.id);

    Ok((StatusCode::CREATED, Json(SeriesDto::from(&series))))
}

/// PUT /api/mangaseries/{id} - Replace a series' editable fields
#[utoipa::path(
    put,
    path = "/api/mangaseries/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series id")),
    request_body = UpdateSeriesRequest,
    responses(
        (status = 204, description = "Series updated"),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller does not own the series"),
        (status = 404, description = "Series not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_series_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(series_id): Path<i64>,
    Json(req): Json<UpdateSeriesRequest>,
) -> HttpResult<StatusCode> {
    check_roles(Some(&caller), &rules::MODIFY_SERIES)
        .map_err(|e| denied("update series", &caller, e))?;

    let series = state.db.get_series(series_id).await?;
    authorize(
        Some(&caller),
        &rules::MODIFY_SERIES,
        &ResourceState::authored_by(series.author_id),
    )
    .map_err(|e| denied("update series", &caller, e))?;

    let title = validation::required_text("Title", &req.title, validation::SERIES_TITLE_MAX)?;
    let cover_image_url =
        validation::required_text("Cover image URL", &req.cover_image_url, COVER_URL_MAX)?;

    state
        .db
        .update_series(
            series_id,
            SeriesUpdate {
                title,
                synopsis: req.synopsis.trim().to_string(),
                cover_image_url,
                status: req.status,
                tag_ids: req.tag_ids,
                language_ids: req.language_ids,
            },
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/mangaseries/{id} - Remove a series and everything under it
#[utoipa::path(
    delete,
    path = "/api/mangaseries/{id}",
    tag = "series",
    params(("id" = i64, Path, description = "Series id")),
    responses(
        (status = 204, description = "Series deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller does not own the series"),
        (status = 404, description = "Series not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_series_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Path(series_id): Path<i64>,
) -> HttpResult<StatusCode> {
    check_roles(Some(&caller), &rules::MODIFY_SERIES)
        .map_err(|e| denied("delete series", &caller, e))?;

    let series = state.db.get_series(series_id).await?;
    authorize(
        Some(&caller),
        &rules::MODIFY_SERIES,
        &ResourceState::authored_by(series.author_id),
    )
    .map_err(|e| denied("delete series", &caller, e))?;

    state.db.delete_series(series_id).await?;
    info!("User {} deleted series {}", caller.user_id, series_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_ids_parse_from_a_comma_list() {
        assert_eq!(parse_tag_ids(Some("1, 2,,3")).unwrap(), vec![1, 2, 3]);
        assert!(parse_tag_ids(None).unwrap().is_empty());
        assert!(parse_tag_ids(Some("1,two")).is_err());
    }

    #[test]
    fn listing_query_is_clamped() {
        let filter = SeriesListQuery {
            page: Some(0),
            page_size: Some(500),
            ..Default::default()
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, SeriesFilter::MAX_PAGE_SIZE);
    }
}
