//! crates/mangati_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of a specific persistence technology.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Chapter, ChapterStatus, Language, MangaSeries, NewChapter, NewSeries, NewUser,
    ReadingProgress, SeriesFilter, SeriesPage, SeriesUpdate, Tag, TagUsage, User,
    UserCredentials, ViewerSettings,
};
use crate::entitlement::{QuotaError, Subscription, SubscriptionPlan, SubscriptionStatus, UploadCharge};
use crate::role::Role;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., the database).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Cheap round trip used by the health endpoint.
    async fn ping(&self) -> PortResult<()>;

    // --- Users ---
    async fn create_user(&self, new_user: NewUser) -> PortResult<User>;

    async fn email_taken(&self, email: &str) -> PortResult<bool>;

    async fn username_taken(&self, username: &str) -> PortResult<bool>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    /// Always read from storage, never from a cache, so tokens carry current roles.
    async fn get_user_roles(&self, user_id: Uuid) -> PortResult<Vec<Role>>;

    // --- Series ---
    async fn list_series(&self, filter: &SeriesFilter) -> PortResult<SeriesPage>;

    async fn get_series(&self, series_id: i64) -> PortResult<MangaSeries>;

    async fn create_series(&self, new_series: NewSeries) -> PortResult<MangaSeries>;

    async fn update_series(&self, series_id: i64, update: SeriesUpdate) -> PortResult<()>;

    async fn delete_series(&self, series_id: i64) -> PortResult<()>;

    // --- Chapters ---
    /// Chapters of a series ordered by number, without pages.
    async fn list_chapters(&self, series_id: i64) -> PortResult<Vec<Chapter>>;

    /// A single chapter with its pages ordered.
    async fn get_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<Chapter>;

    /// Inserts a chapter and its pages, charging `charge` in the same transaction.
    ///
    /// Fails with `PortError::Quota` without writing anything when the charge is refused.
    async fn create_chapter(
        &self,
        new_chapter: NewChapter,
        charge: UploadCharge,
        now: DateTime<Utc>,
    ) -> PortResult<Chapter>;

    async fn set_chapter_status(
        &self,
        series_id: i64,
        chapter_id: i64,
        status: ChapterStatus,
    ) -> PortResult<()>;

    async fn delete_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<()>;

    // --- Tags and Languages ---
    async fn list_tags(&self) -> PortResult<Vec<Tag>>;

    /// Fails with `PortError::Conflict` when a tag with the same name (ignoring case) exists.
    async fn create_tag(&self, name: &str) -> PortResult<Tag>;

    async fn trending_tags(&self, limit: u32) -> PortResult<Vec<TagUsage>>;

    async fn list_languages(&self) -> PortResult<Vec<Language>>;

    async fn create_language(&self, name: &str) -> PortResult<Language>;

    // --- Favorites ---
    async fn list_favorites(&self, user_id: Uuid) -> PortResult<Vec<MangaSeries>>;

    /// Idempotent; fails with `NotFound` for an unknown series.
    async fn add_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()>;

    /// Fails with `NotFound` when the series was not a favorite.
    async fn remove_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()>;

    // --- Reading Progress ---
    async fn progress_for_series(&self, user_id: Uuid, series_id: i64)
        -> PortResult<Vec<ReadingProgress>>;

    async fn progress_for_chapter(&self, user_id: Uuid, chapter_id: i64)
        -> PortResult<ReadingProgress>;

    /// Upserts the last read page; fails with `NotFound` for an unknown chapter.
    async fn record_progress(
        &self,
        user_id: Uuid,
        chapter_id: i64,
        page_number: i32,
        now: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Marks a chapter as opened: page 1 the first time, a timestamp bump afterwards.
    async fn touch_progress(&self, user_id: Uuid, chapter_id: i64, now: DateTime<Utc>)
        -> PortResult<()>;

    // --- Viewer Settings ---
    async fn get_viewer_settings(&self, user_id: Uuid) -> PortResult<Option<ViewerSettings>>;

    async fn save_viewer_settings(&self, settings: ViewerSettings) -> PortResult<()>;

    // --- Subscriptions ---
    async fn list_plans(&self) -> PortResult<Vec<SubscriptionPlan>>;

    async fn get_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>>;

    /// Creates or updates the user's subscription.
    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: i64,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> PortResult<Subscription>;
}
