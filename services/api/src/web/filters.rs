//! services/api/src/web/filters.rs
//!
//! Tags and languages used to classify and filter series.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use mangati_core::{check_roles, rules, validation};
use std::sync::Arc;

use crate::error::HttpResult;
use crate::web::denied;
use crate::web::dto::{
    CreateNameRequest, FiltersDto, LanguageDto, TagDto, TagWithCountDto, TrendingQuery,
};
use crate::web::middleware::AuthCaller;
use crate::web::state::AppState;

const DEFAULT_TRENDING_LIMIT: u32 = 10;
const MAX_TRENDING_LIMIT: u32 = 100;

#[utoipa::path(
    get,
    path = "/api/filters/tags",
    tag = "filters",
    responses((status = 200, description = "All tags by name", body = [TagDto]))
)]
pub async fn list_tags_handler(State(state): State<Arc<AppState>>) -> HttpResult<Json<Vec<TagDto>>> {
    let tags = state.db.list_tags().await?;
    Ok(Json(tags.iter().map(TagDto::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/filters/languages",
    tag = "filters",
    responses((status = 200, description = "All languages by name", body = [LanguageDto]))
)]
pub async fn list_languages_handler(
    State(state): State<Arc<AppState>>,
) -> HttpResult<Json<Vec<LanguageDto>>> {
    let languages = state.db.list_languages().await?;
    Ok(Json(languages.iter().map(LanguageDto::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/filters/all",
    tag = "filters",
    responses((status = 200, description = "Tags and languages together", body = FiltersDto))
)]
pub async fn all_filters_handler(State(state): State<Arc<AppState>>) -> HttpResult<Json<FiltersDto>> {
    let tags = state.db.list_tags().await?;
    let languages = state.db.list_languages().await?;
    Ok(Json(FiltersDto {
        tags: tags.iter().map(TagDto::from).collect(),
        languages: languages.iter().map(LanguageDto::from).collect(),
    }))
}

/// GET /api/filters/trending-tags - Tags ordered by how many series carry them
#[utoipa::path(
    get,
    path = "/api/filters/trending-tags",
    tag = "filters",
    params(TrendingQuery),
    responses((status = 200, description = "Most used tags", body = [TagWithCountDto]))
)]
pub async fn trending_tags_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendingQuery>,
) -> HttpResult<Json<Vec<TagWithCountDto>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRENDING_LIMIT)
        .clamp(1, MAX_TRENDING_LIMIT);
    let usage = state.db.trending_tags(limit).await?;
    Ok(Json(usage.iter().map(TagWithCountDto::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/filters/tags",
    tag = "filters",
    request_body = CreateNameRequest,
    responses(
        (status = 201, description = "Tag created", body = TagDto),
        (status = 400, description = "Invalid name"),
        (status = 403, description = "Caller is not a writer"),
        (status = 409, description = "Tag already exists")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_tag_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<CreateNameRequest>,
) -> HttpResult<impl IntoResponse> {
    check_roles(Some(&caller), &rules::CREATE_TAG).map_err(|e| denied("create tag", &caller, e))?;
    let name = validation::required_text("Name", &req.name, validation::FILTER_NAME_MAX)?;
    let tag = state.db.create_tag(&name).await?;
    Ok((StatusCode::CREATED, Json(TagDto::from(&tag))))
}

#[utoipa::path(
    post,
    path = "/api/filters/languages",
    tag = "filters",
    request_body = CreateNameRequest,
    responses(
        (status = 201, description = "Language created", body = LanguageDto),
        (status = 400, description = "Invalid name"),
        (status = 403, description = "Caller is not an admin"),
        (status = 409, description = "Language already exists")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_language_handler(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Json(req): Json<CreateNameRequest>,
) -> HttpResult<impl IntoResponse> {
    check_roles(Some(&caller), &rules::CREATE_LANGUAGE)
        .map_err(|e| denied("create language", &caller, e))?;
    let name = validation::required_text("Name", &req.name, validation::FILTER_NAME_MAX)?;
    let language = state.db.create_language(&name).await?;
    Ok((StatusCode::CREATED, Json(LanguageDto::from(&language))))
}
