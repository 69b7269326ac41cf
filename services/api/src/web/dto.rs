//! services/api/src/web/dto.rs
//!
//! Request and response payloads of the REST API and their projections from
//! the core domain types. JSON field names are camelCase.

use chrono::{DateTime, Utc};
use mangati_core::{
    Chapter, ChapterStatus, Language, MangaSeries, Page, ReadingMode, ReadingProgress,
    SeriesStatus, Subscription, SubscriptionPlan, SubscriptionStatus, Tag, TagUsage, ThemeMode,
    User, ViewerSettings,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

//=========================================================================================
// Auth
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// `Viewer` (default), `Writer` or `Admin`; matched case-insensitively.
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles: user.roles.iter().map(|r| r.as_str().to_string()).collect(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserDto,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DebugAuthResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub role_claims: Vec<String>,
    pub is_in_viewer_role: bool,
    pub is_in_writer_role: bool,
    pub is_in_admin_role: bool,
    /// Literal `WRITER` / `writer` claims are reported but confer nothing.
    pub is_in_writer_role_uppercase: bool,
    pub is_in_writer_role_lowercase: bool,
}

//=========================================================================================
// Tags and Languages
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
pub struct TagDto {
    pub id: i64,
    pub name: String,
}

impl From<&Tag> for TagDto {
    fn from(tag: &Tag) -> Self {
        Self {
            id: tag.id,
            name: tag.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguageDto {
    pub id: i64,
    pub name: String,
}

impl From<&Language> for LanguageDto {
    fn from(language: &Language) -> Self {
        Self {
            id: language.id,
            name: language.name.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagWithCountDto {
    pub id: i64,
    pub name: String,
    pub count: i64,
}

impl From<&TagUsage> for TagWithCountDto {
    fn from(usage: &TagUsage) -> Self {
        Self {
            id: usage.tag.id,
            name: usage.tag.name.clone(),
            count: usage.count,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FiltersDto {
    pub tags: Vec<TagDto>,
    pub languages: Vec<LanguageDto>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateNameRequest {
    pub name: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrendingQuery {
    pub limit: Option<u32>,
}

//=========================================================================================
// Series
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDto {
    pub id: i64,
    pub title: String,
    pub synopsis: String,
    pub cover_image_url: String,
    #[schema(value_type = String, example = "Ongoing")]
    pub status: SeriesStatus,
    pub author_id: Uuid,
    pub author_name: String,
    pub tags: Vec<TagDto>,
    pub languages: Vec<LanguageDto>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&MangaSeries> for SeriesDto {
    fn from(series: &MangaSeries) -> Self {
        Self {
            id: series.id,
            title: series.title.clone(),
            synopsis: series.synopsis.clone(),
            cover_image_url: series.cover_image_url.clone(),
            status: series.status,
            author_id: series.author_id,
            author_name: series.author_name.clone(),
            tags: series.tags.iter().map(TagDto::from).collect(),
            languages: series.languages.iter().map(LanguageDto::from).collect(),
            created_at: series.created_at,
            updated_at: series.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterListItemDto {
    pub id: i64,
    pub title: String,
    pub number: i32,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetailDto {
    #[serde(flatten)]
    pub series: SeriesDto,
    pub chapters: Vec<ChapterListItemDto>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSeriesRequest {
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    pub cover_image_url: String,
    #[serde(default)]
    pub language_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub tag_ids: Option<Vec<i64>>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSeriesRequest {
    pub title: String,
    #[serde(default)]
    pub synopsis: String,
    pub cover_image_url: String,
    #[schema(value_type = String, example = "Completed")]
    pub status: SeriesStatus,
    #[serde(default)]
    pub language_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub tag_ids: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SeriesListQuery {
    pub search_term: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<SeriesStatus>,
    pub language_id: Option<i64>,
    /// Comma-separated tag ids; a series matches if it carries any of them.
    pub tag_ids: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

//=========================================================================================
// Chapters
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDto {
    pub id: i64,
    pub title: String,
    pub number: i32,
    #[schema(value_type = String, example = "Pending")]
    pub status: ChapterStatus,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Chapter> for ChapterDto {
    fn from(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id,
            title: chapter.title.clone(),
            number: chapter.number,
            status: chapter.status,
            uploaded_at: chapter.uploaded_at,
        }
    }
}

impl From<&Chapter> for ChapterListItemDto {
    fn from(chapter: &Chapter) -> Self {
        Self {
            id: chapter.id,
            title: chapter.title.clone(),
            number: chapter.number,
            uploaded_at: chapter.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PageDto {
    pub id: i64,
    pub image_url: String,
    pub order: i32,
}

impl From<&Page> for PageDto {
    fn from(page: &Page) -> Self {
        Self {
            id: page.id,
            image_url: page.image_url.clone(),
            order: page.order,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDetailDto {
    #[serde(flatten)]
    pub chapter: ChapterDto,
    pub pages: Vec<PageDto>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPageRequest {
    pub image_url: String,
    #[serde(default)]
    pub file_size_bytes: i64,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChapterRequest {
    pub title: String,
    /// Defaults to one past the highest existing chapter number.
    #[serde(default)]
    pub number: Option<i32>,
    #[serde(default)]
    pub pages: Vec<NewPageRequest>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateChapterStatusRequest {
    #[schema(value_type = String, example = "Approved")]
    pub status: ChapterStatus,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChapterListQuery {
    #[param(value_type = Option<String>)]
    pub status: Option<ChapterStatus>,
}

//=========================================================================================
// Viewer State
//=========================================================================================

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub manga_series_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgressDto {
    pub chapter_id: i64,
    pub chapter_number: i32,
    pub last_read_page: i32,
    pub last_read_at: DateTime<Utc>,
}

impl From<&ReadingProgress> for ChapterProgressDto {
    fn from(progress: &ReadingProgress) -> Self {
        Self {
            chapter_id: progress.chapter_id,
            chapter_number: progress.chapter_number,
            last_read_page: progress.last_read_page,
            last_read_at: progress.last_read_at,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgressRequest {
    pub chapter_id: i64,
    pub page_number: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSettingsDto {
    #[schema(value_type = String, example = "Light")]
    pub theme: ThemeMode,
    #[schema(value_type = String, example = "PageFlip")]
    pub reading_mode: ReadingMode,
    pub fit_to_width: bool,
    pub zoom_level: i32,
}

impl From<&ViewerSettings> for ViewerSettingsDto {
    fn from(settings: &ViewerSettings) -> Self {
        Self {
            theme: settings.theme,
            reading_mode: settings.reading_mode,
            fit_to_width: settings.fit_to_width,
            zoom_level: settings.zoom_level,
        }
    }
}

//=========================================================================================
// Subscriptions and Health
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: i64,
    pub name: String,
    pub price_cents: i64,
    pub upload_limit_per_month: i32,
}

impl From<&SubscriptionPlan> for PlanDto {
    fn from(plan: &SubscriptionPlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.clone(),
            price_cents: plan.price_cents,
            upload_limit_per_month: plan.upload_limit_per_month,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub plan: PlanDto,
    pub monthly_limit: i32,
    pub used_this_month: i32,
    pub remaining: i32,
    #[schema(value_type = String, example = "Active")]
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl SubscriptionDto {
    /// Projects the record as it stands at `now`, applying any pending month rollover.
    pub fn at(subscription: &Subscription, now: DateTime<Utc>) -> Self {
        Self {
            plan: PlanDto::from(&subscription.plan),
            monthly_limit: subscription.plan.upload_limit_per_month,
            used_this_month: subscription.used_this_month(now),
            remaining: subscription.remaining(now),
            status: subscription.status,
            start_date: subscription.start_date,
            end_date: subscription.end_date,
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignSubscriptionRequest {
    pub plan_id: i64,
    #[serde(default)]
    #[schema(value_type = Option<String>, example = "Active")]
    pub status: Option<SubscriptionStatus>,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}
