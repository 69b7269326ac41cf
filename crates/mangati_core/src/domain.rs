//! crates/mangati_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;

//=========================================================================================
// Users
//=========================================================================================

/// A registered principal, as projected to callers. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

/// Input for registering a principal. Exactly one role is assigned at signup.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: String,
    pub role: Role,
}

//=========================================================================================
// Series, Tags and Languages
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesStatus {
    Ongoing,
    Completed,
}

impl SeriesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesStatus::Ongoing => "Ongoing",
            SeriesStatus::Completed => "Completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Ongoing" => Some(SeriesStatus::Ongoing),
            "Completed" => Some(SeriesStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub id: i64,
    pub name: String,
}

/// A tag together with the number of series that carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUsage {
    pub tag: Tag,
    pub count: i64,
}

/// A manga series with its author and classification.
#[derive(Debug, Clone)]
pub struct MangaSeries {
    pub id: i64,
    pub title: String,
    pub synopsis: String,
    pub cover_image_url: String,
    pub status: SeriesStatus,
    pub author_id: Uuid,
    pub author_name: String,
    pub tags: Vec<Tag>,
    pub languages: Vec<Language>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MangaSeries {
    /// The timestamp series listings are ordered by.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone)]
pub struct NewSeries {
    pub title: String,
    pub synopsis: String,
    pub cover_image_url: String,
    pub author_id: Uuid,
    pub tag_ids: Vec<i64>,
    pub language_ids: Vec<i64>,
}

/// Full replacement of a series' editable fields. `None` link sets are left untouched.
#[derive(Debug, Clone)]
pub struct SeriesUpdate {
    pub title: String,
    pub synopsis: String,
    pub cover_image_url: String,
    pub status: SeriesStatus,
    pub tag_ids: Option<Vec<i64>>,
    pub language_ids: Option<Vec<i64>>,
}

/// Listing filters for the series catalogue.
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    pub search_term: Option<String>,
    pub status: Option<SeriesStatus>,
    pub language_id: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub page: u32,
    pub page_size: u32,
}

impl SeriesFilter {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Clamps paging parameters into their accepted ranges.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, Self::MAX_PAGE_SIZE);
        self.search_term = self
            .search_term
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Whether a series passes every filter except paging.
    pub fn matches(&self, series: &MangaSeries) -> bool {
        if let Some(term) = &self.search_term {
            let term = term.to_lowercase();
            if !series.title.to_lowercase().contains(&term)
                && !series.synopsis.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if let Some(status) = self.status {
            if series.status != status {
                return false;
            }
        }
        if let Some(language_id) = self.language_id {
            if !series.languages.iter().any(|l| l.id == language_id) {
                return false;
            }
        }
        if !self.tag_ids.is_empty() && !series.tags.iter().any(|t| self.tag_ids.contains(&t.id)) {
            return false;
        }
        true
    }
}

/// One page of a series listing plus the totals reported to the client.
#[derive(Debug, Clone)]
pub struct SeriesPage {
    pub items: Vec<MangaSeries>,
    pub total_items: u64,
    pub total_pages: u64,
}

impl SeriesPage {
    pub fn total_pages_for(total_items: u64, page_size: u32) -> u64 {
        let size = u64::from(page_size.max(1));
        total_items.div_ceil(size)
    }
}

//=========================================================================================
// Chapters and Pages
//=========================================================================================

/// Moderation status of a chapter. Only `Approved` chapters are publicly visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChapterStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Pending => "Pending",
            ChapterStatus::Approved => "Approved",
            ChapterStatus::Rejected => "Rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(ChapterStatus::Pending),
            "Approved" => Some(ChapterStatus::Approved),
            "Rejected" => Some(ChapterStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub id: i64,
    pub image_url: String,
    pub file_size_bytes: i64,
    pub order: i32,
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub id: i64,
    pub series_id: i64,
    pub title: String,
    pub number: i32,
    pub status: ChapterStatus,
    pub uploaded_at: DateTime<Utc>,
    /// Empty in listings; populated when a single chapter is fetched.
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
pub struct NewPage {
    pub image_url: String,
    pub file_size_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct NewChapter {
    pub series_id: i64,
    pub title: String,
    /// When absent the chapter is numbered one past the current maximum.
    pub number: Option<i32>,
    pub status: ChapterStatus,
    pub pages: Vec<NewPage>,
}

//=========================================================================================
// Viewer State
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingProgress {
    pub user_id: Uuid,
    pub chapter_id: i64,
    pub chapter_number: i32,
    pub last_read_page: i32,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeMode {
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingMode {
    PageFlip,
    VerticalScroll,
}

impl ThemeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeMode::Light => "Light",
            ThemeMode::Dark => "Dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Light" => Some(ThemeMode::Light),
            "Dark" => Some(ThemeMode::Dark),
            _ => None,
        }
    }
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::PageFlip => "PageFlip",
            ReadingMode::VerticalScroll => "VerticalScroll",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PageFlip" => Some(ReadingMode::PageFlip),
            "VerticalScroll" => Some(ReadingMode::VerticalScroll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSettings {
    pub user_id: Uuid,
    pub theme: ThemeMode,
    pub reading_mode: ReadingMode,
    pub fit_to_width: bool,
    pub zoom_level: i32,
}

impl ViewerSettings {
    pub const MIN_ZOOM: i32 = 25;
    pub const MAX_ZOOM: i32 = 400;

    /// Settings reported for a user who never saved any.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            theme: ThemeMode::Light,
            reading_mode: ReadingMode::PageFlip,
            fit_to_width: true,
            zoom_level: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(title: &str, synopsis: &str, tags: &[i64]) -> MangaSeries {
        MangaSeries {
            id: 1,
            title: title.to_string(),
            synopsis: synopsis.to_string(),
            cover_image_url: "https://img.example/cover.png".to_string(),
            status: SeriesStatus::Ongoing,
            author_id: Uuid::new_v4(),
            author_name: "author".to_string(),
            tags: tags
                .iter()
                .map(|id| Tag { id: *id, name: format!("tag-{id}") })
                .collect(),
            languages: vec![],
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn normalized_filter_clamps_paging() {
        let filter = SeriesFilter { page: 0, page_size: 500, ..Default::default() }.normalized();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, SeriesFilter::MAX_PAGE_SIZE);

        let filter = SeriesFilter { page: 3, page_size: 0, ..Default::default() }.normalized();
        assert_eq!(filter.page_size, 1);
        assert_eq!(filter.offset(), 2);
    }

    #[test]
    fn filter_matches_search_term_in_title_or_synopsis() {
        let filter = SeriesFilter {
            search_term: Some("  dragon ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert!(filter.matches(&series("The dragon gate", "", &[])));
        assert!(filter.matches(&series("Gate", "a dragon appears", &[])));
        assert!(filter.matches(&series("DRAGON King", "", &[])));
        assert!(!filter.matches(&series("Gate", "nothing here", &[])));
    }

    #[test]
    fn filter_matches_any_requested_tag() {
        let filter = SeriesFilter { tag_ids: vec![2, 9], ..Default::default() };
        assert!(filter.matches(&series("a", "", &[1, 2])));
        assert!(!filter.matches(&series("a", "", &[1, 3])));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(SeriesPage::total_pages_for(0, 20), 0);
        assert_eq!(SeriesPage::total_pages_for(20, 20), 1);
        assert_eq!(SeriesPage::total_pages_for(21, 20), 2);
    }
}
