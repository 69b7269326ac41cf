//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `DatabaseService` port.
//!
//! Every operation takes the single store lock for its whole duration, so a
//! chapter insert and the quota charge that gates it are applied together or
//! not at all, just as the Postgres adapter does inside one transaction. Used
//! when no `DATABASE_URL` is configured, and by the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mangati_core::{
    charge_upload, Chapter, ChapterStatus, Language, MangaSeries, NewChapter, NewSeries, NewUser,
    Page, PortError, PortResult, ReadingProgress, Role, SeriesFilter, SeriesPage, SeriesStatus,
    SeriesUpdate, Subscription, SubscriptionPlan, SubscriptionStatus, Tag, TagUsage, UploadCharge,
    User, UserCredentials, ViewerSettings,
};
use mangati_core::DatabaseService;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

//=========================================================================================
// Stored Rows
//=========================================================================================

struct UserRow {
    user: User,
    hashed_password: String,
}

struct SeriesRow {
    id: i64,
    title: String,
    synopsis: String,
    cover_image_url: String,
    status: SeriesStatus,
    author_id: Uuid,
    tag_ids: Vec<i64>,
    language_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

struct ProgressRow {
    last_read_page: i32,
    last_read_at: DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    next_id: i64,
    users: HashMap<Uuid, UserRow>,
    series: BTreeMap<i64, SeriesRow>,
    tags: BTreeMap<i64, Tag>,
    languages: BTreeMap<i64, Language>,
    chapters: BTreeMap<i64, Chapter>,
    favorites: BTreeSet<(Uuid, i64)>,
    progress: HashMap<(Uuid, i64), ProgressRow>,
    settings: HashMap<Uuid, ViewerSettings>,
    plans: BTreeMap<i64, SubscriptionPlan>,
    subscriptions: HashMap<Uuid, Subscription>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user_id: Uuid) -> PortResult<&UserRow> {
        self.users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    fn series_row(&self, series_id: i64) -> PortResult<&SeriesRow> {
        self.series
            .get(&series_id)
            .ok_or_else(|| PortError::NotFound(format!("Series {} not found", series_id)))
    }

    fn chapter_of(&mut self, series_id: i64, chapter_id: i64) -> PortResult<&mut Chapter> {
        self.chapters
            .get_mut(&chapter_id)
            .filter(|c| c.series_id == series_id)
            .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter_id)))
    }

    fn to_series(&self, row: &SeriesRow) -> MangaSeries {
        let mut tags: Vec<Tag> = row
            .tag_ids
            .iter()
            .filter_map(|id| self.tags.get(id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        let mut languages: Vec<Language> = row
            .language_ids
            .iter()
            .filter_map(|id| self.languages.get(id).cloned())
            .collect();
        languages.sort_by(|a, b| a.name.cmp(&b.name));

        MangaSeries {
            id: row.id,
            title: row.title.clone(),
            synopsis: row.synopsis.clone(),
            cover_image_url: row.cover_image_url.clone(),
            status: row.status,
            author_id: row.author_id,
            author_name: self
                .users
                .get(&row.author_id)
                .map(|u| u.user.username.clone())
                .unwrap_or_default(),
            tags,
            languages,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn known_ids(&self, tag_ids: &[i64], language_ids: &[i64]) -> PortResult<()> {
        if let Some(id) = tag_ids.iter().find(|id| !self.tags.contains_key(id)) {
            return Err(PortError::NotFound(format!("Tag {} not found", id)));
        }
        if let Some(id) = language_ids.iter().find(|id| !self.languages.contains_key(id)) {
            return Err(PortError::NotFound(format!("Language {} not found", id)));
        }
        Ok(())
    }

    fn touch_series(&mut self, series_id: i64, now: DateTime<Utc>) {
        if let Some(series) = self.series.get_mut(&series_id) {
            series.updated_at = Some(now);
        }
    }
}

fn dedup(mut ids: Vec<i64>) -> Vec<i64> {
    ids.sort_unstable();
    ids.dedup();
    ids
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct MemoryDb {
    store: Mutex<Store>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    /// An empty store holding the standard plans.
    pub fn new() -> Self {
        let mut store = Store::default();
        for (name, price_cents, limit) in [("Basic", 499, 10), ("Pro", 999, 50)] {
            let id = store.next_id();
            store.plans.insert(
                id,
                SubscriptionPlan {
                    id,
                    name: name.to_string(),
                    price_cents,
                    upload_limit_per_month: limit,
                },
            );
        }
        Self {
            store: Mutex::new(store),
        }
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn ping(&self) -> PortResult<()> {
        Ok(())
    }

    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut store = self.store.lock().await;
        if store
            .users
            .values()
            .any(|u| u.user.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(PortError::Conflict("Email is already registered".to_string()));
        }
        if store
            .users
            .values()
            .any(|u| u.user.username.eq_ignore_ascii_case(&new_user.username))
        {
            return Err(PortError::Conflict("Username is already taken".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            roles: vec![new_user.role],
            created_at: Utc::now(),
        };
        store.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                hashed_password: new_user.hashed_password,
            },
        );
        Ok(user)
    }

    async fn email_taken(&self, email: &str) -> PortResult<bool> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .values()
            .any(|u| u.user.email.eq_ignore_ascii_case(email)))
    }

    async fn username_taken(&self, username: &str) -> PortResult<bool> {
        let store = self.store.lock().await;
        Ok(store
            .users
            .values()
            .any(|u| u.user.username.eq_ignore_ascii_case(username)))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let store = self.store.lock().await;
        Ok(store.user(user_id)?.user.clone())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let store = self.store.lock().await;
        store
            .users
            .values()
            .find(|u| u.user.email.eq_ignore_ascii_case(email))
            .map(|u| UserCredentials {
                user: u.user.clone(),
                hashed_password: u.hashed_password.clone(),
            })
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    async fn get_user_roles(&self, user_id: Uuid) -> PortResult<Vec<Role>> {
        let store = self.store.lock().await;
        Ok(store.user(user_id)?.user.roles.clone())
    }

    // --- Series ---

    async fn list_series(&self, filter: &SeriesFilter) -> PortResult<SeriesPage> {
        let store = self.store.lock().await;
        let mut matching: Vec<MangaSeries> = store
            .series
            .values()
            .map(|row| store.to_series(row))
            .filter(|series| filter.matches(series))
            .collect();
        matching.sort_by(|a, b| {
            b.last_activity()
                .cmp(&a.last_activity())
                .then(b.id.cmp(&a.id))
        });

        let total_items = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.page_size as usize)
            .collect();
        Ok(SeriesPage {
            items,
            total_items,
            total_pages: SeriesPage::total_pages_for(total_items, filter.page_size),
        })
    }

    async fn get_series(&self, series_id: i64) -> PortResult<MangaSeries> {
        let store = self.store.lock().await;
        let row = store.series_row(series_id)?;
        Ok(store.to_series(row))
    }

    async fn create_series(&self, new_series: NewSeries) -> PortResult<MangaSeries> {
        let mut store = self.store.lock().await;
        store.user(new_series.author_id)?;
        let tag_ids = dedup(new_series.tag_ids);
        let language_ids = dedup(new_series.language_ids);
        store.known_ids(&tag_ids, &language_ids)?;

        let id = store.next_id();
        let row = SeriesRow {
            id,
            title: new_series.title,
            synopsis: new_series.synopsis,
            cover_image_url: new_series.cover_image_url,
            status: SeriesStatus::Ongoing,
            author_id: new_series.author_id,
            tag_ids,
            language_ids,
            created_at: Utc::now(),
            updated_at: None,
        };
        let series = store.to_series(&row);
        store.series.insert(id, row);
        Ok(series)
    }

    async fn update_series(&self, series_id: i64, update: SeriesUpdate) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.series_row(series_id)?;
        let tag_ids = update.tag_ids.map(dedup);
        let language_ids = update.language_ids.map(dedup);
        store.known_ids(
            tag_ids.as_deref().unwrap_or_default(),
            language_ids.as_deref().unwrap_or_default(),
        )?;

        if let Some(row) = store.series.get_mut(&series_id) {
            row.title = update.title;
            row.synopsis = update.synopsis;
            row.cover_image_url = update.cover_image_url;
            row.status = update.status;
            if let Some(tag_ids) = tag_ids {
                row.tag_ids = tag_ids;
            }
            if let Some(language_ids) = language_ids {
                row.language_ids = language_ids;
            }
            row.updated_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn delete_series(&self, series_id: i64) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.series_row(series_id)?;
        store.series.remove(&series_id);

        let chapter_ids: Vec<i64> = store
            .chapters
            .values()
            .filter(|c| c.series_id == series_id)
            .map(|c| c.id)
            .collect();
        for chapter_id in &chapter_ids {
            store.chapters.remove(chapter_id);
        }
        store
            .progress
            .retain(|(_, chapter_id), _| !chapter_ids.contains(chapter_id));
        store.favorites.retain(|(_, id)| *id != series_id);
        Ok(())
    }

    // --- Chapters ---

    async fn list_chapters(&self, series_id: i64) -> PortResult<Vec<Chapter>> {
        let store = self.store.lock().await;
        store.series_row(series_id)?;
        let mut chapters: Vec<Chapter> = store
            .chapters
            .values()
            .filter(|c| c.series_id == series_id)
            .map(|c| Chapter {
                pages: Vec::new(),
                ..c.clone()
            })
            .collect();
        chapters.sort_by_key(|c| c.number);
        Ok(chapters)
    }

    async fn get_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<Chapter> {
        let mut store = self.store.lock().await;
        Ok(store.chapter_of(series_id, chapter_id)?.clone())
    }

    async fn create_chapter(
        &self,
        new_chapter: NewChapter,
        charge: UploadCharge,
        now: DateTime<Utc>,
    ) -> PortResult<Chapter> {
        let mut store = self.store.lock().await;
        store.series_row(new_chapter.series_id)?;

        // Work on a copy; it is written back only once the chapter is in.
        let charged = match charge {
            UploadCharge::Exempt => None,
            UploadCharge::Quota { user_id } => {
                let mut subscription = store.subscriptions.get(&user_id).cloned();
                charge_upload(subscription.as_mut(), now)?;
                subscription
            }
        };

        let existing: Vec<i32> = store
            .chapters
            .values()
            .filter(|c| c.series_id == new_chapter.series_id)
            .map(|c| c.number)
            .collect();
        let number = match new_chapter.number {
            Some(number) if existing.contains(&number) => {
                return Err(PortError::Conflict(format!(
                    "Chapter {} already exists",
                    number
                )))
            }
            Some(number) => number,
            None => existing.iter().copied().max().unwrap_or(0) + 1,
        };

        let chapter_id = store.next_id();
        let mut pages = Vec::with_capacity(new_chapter.pages.len());
        for (index, page) in new_chapter.pages.into_iter().enumerate() {
            pages.push(Page {
                id: store.next_id(),
                image_url: page.image_url,
                file_size_bytes: page.file_size_bytes,
                order: index as i32 + 1,
            });
        }
        let chapter = Chapter {
            id: chapter_id,
            series_id: new_chapter.series_id,
            title: new_chapter.title,
            number,
            status: new_chapter.status,
            uploaded_at: now,
            pages,
        };

        store.chapters.insert(chapter_id, chapter.clone());
        store.touch_series(chapter.series_id, now);
        if let Some(subscription) = charged {
            store.subscriptions.insert(subscription.user_id, subscription);
        }
        Ok(chapter)
    }

    async fn set_chapter_status(
        &self,
        series_id: i64,
        chapter_id: i64,
        status: ChapterStatus,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.chapter_of(series_id, chapter_id)?.status = status;
        if status == ChapterStatus::Approved {
            store.touch_series(series_id, Utc::now());
        }
        Ok(())
    }

    async fn delete_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.chapter_of(series_id, chapter_id)?;
        store.chapters.remove(&chapter_id);
        store.progress.retain(|(_, id), _| *id != chapter_id);
        Ok(())
    }

    // --- Tags and Languages ---

    async fn list_tags(&self) -> PortResult<Vec<Tag>> {
        let store = self.store.lock().await;
        let mut tags: Vec<Tag> = store.tags.values().cloned().collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn create_tag(&self, name: &str) -> PortResult<Tag> {
        let mut store = self.store.lock().await;
        if store.tags.values().any(|t| t.name.eq_ignore_ascii_case(name)) {
            return Err(PortError::Conflict(format!("Tag '{}' already exists", name)));
        }
        let tag = Tag {
            id: store.next_id(),
            name: name.to_string(),
        };
        store.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn trending_tags(&self, limit: u32) -> PortResult<Vec<TagUsage>> {
        let store = self.store.lock().await;
        let mut usage: Vec<TagUsage> = store
            .tags
            .values()
            .map(|tag| TagUsage {
                tag: tag.clone(),
                count: store
                    .series
                    .values()
                    .filter(|s| s.tag_ids.contains(&tag.id))
                    .count() as i64,
            })
            .filter(|u| u.count > 0)
            .collect();
        usage.sort_by(|a, b| b.count.cmp(&a.count).then(a.tag.name.cmp(&b.tag.name)));
        usage.truncate(limit as usize);
        Ok(usage)
    }

    async fn list_languages(&self) -> PortResult<Vec<Language>> {
        let store = self.store.lock().await;
        let mut languages: Vec<Language> = store.languages.values().cloned().collect();
        languages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(languages)
    }

    async fn create_language(&self, name: &str) -> PortResult<Language> {
        let mut store = self.store.lock().await;
        if store
            .languages
            .values()
            .any(|l| l.name.eq_ignore_ascii_case(name))
        {
            return Err(PortError::Conflict(format!(
                "Language '{}' already exists",
                name
            )));
        }
        let language = Language {
            id: store.next_id(),
            name: name.to_string(),
        };
        store.languages.insert(language.id, language.clone());
        Ok(language)
    }

    // --- Favorites ---

    async fn list_favorites(&self, user_id: Uuid) -> PortResult<Vec<MangaSeries>> {
        let store = self.store.lock().await;
        Ok(store
            .favorites
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .filter_map(|(_, series_id)| store.series.get(series_id))
            .map(|row| store.to_series(row))
            .collect())
    }

    async fn add_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.series_row(series_id)?;
        store.favorites.insert((user_id, series_id));
        Ok(())
    }

    async fn remove_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()> {
        let mut store = self.store.lock().await;
        if store.favorites.remove(&(user_id, series_id)) {
            Ok(())
        } else {
            Err(PortError::NotFound(format!(
                "Series {} is not a favorite",
                series_id
            )))
        }
    }

    // --- Reading Progress ---

    async fn progress_for_series(
        &self,
        user_id: Uuid,
        series_id: i64,
    ) -> PortResult<Vec<ReadingProgress>> {
        let store = self.store.lock().await;
        let mut progress: Vec<ReadingProgress> = store
            .progress
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .filter_map(|((_, chapter_id), row)| {
                let chapter = store.chapters.get(chapter_id)?;
                (chapter.series_id == series_id).then(|| ReadingProgress {
                    user_id,
                    chapter_id: chapter.id,
                    chapter_number: chapter.number,
                    last_read_page: row.last_read_page,
                    last_read_at: row.last_read_at,
                })
            })
            .collect();
        progress.sort_by_key(|p| p.chapter_number);
        Ok(progress)
    }

    async fn progress_for_chapter(
        &self,
        user_id: Uuid,
        chapter_id: i64,
    ) -> PortResult<ReadingProgress> {
        let store = self.store.lock().await;
        let not_found =
            || PortError::NotFound(format!("No reading progress for chapter {}", chapter_id));
        let row = store.progress.get(&(user_id, chapter_id)).ok_or_else(not_found)?;
        let chapter = store.chapters.get(&chapter_id).ok_or_else(not_found)?;
        Ok(ReadingProgress {
            user_id,
            chapter_id,
            chapter_number: chapter.number,
            last_read_page: row.last_read_page,
            last_read_at: row.last_read_at,
        })
    }

    async fn record_progress(
        &self,
        user_id: Uuid,
        chapter_id: i64,
        page_number: i32,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        if !store.chapters.contains_key(&chapter_id) {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        store.progress.insert(
            (user_id, chapter_id),
            ProgressRow {
                last_read_page: page_number,
                last_read_at: now,
            },
        );
        Ok(())
    }

    async fn touch_progress(
        &self,
        user_id: Uuid,
        chapter_id: i64,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut store = self.store.lock().await;
        if !store.chapters.contains_key(&chapter_id) {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        store
            .progress
            .entry((user_id, chapter_id))
            .and_modify(|row| row.last_read_at = now)
            .or_insert(ProgressRow {
                last_read_page: 1,
                last_read_at: now,
            });
        Ok(())
    }

    // --- Viewer Settings ---

    async fn get_viewer_settings(&self, user_id: Uuid) -> PortResult<Option<ViewerSettings>> {
        let store = self.store.lock().await;
        Ok(store.settings.get(&user_id).cloned())
    }

    async fn save_viewer_settings(&self, settings: ViewerSettings) -> PortResult<()> {
        let mut store = self.store.lock().await;
        store.settings.insert(settings.user_id, settings);
        Ok(())
    }

    // --- Subscriptions ---

    async fn list_plans(&self) -> PortResult<Vec<SubscriptionPlan>> {
        let store = self.store.lock().await;
        Ok(store.plans.values().cloned().collect())
    }

    async fn get_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>> {
        let store = self.store.lock().await;
        Ok(store.subscriptions.get(&user_id).cloned())
    }

    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: i64,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> PortResult<Subscription> {
        let mut store = self.store.lock().await;
        store.user(user_id)?;
        let plan = store
            .plans
            .get(&plan_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Plan {} not found", plan_id)))?;

        let subscription = store
            .subscriptions
            .entry(user_id)
            .and_modify(|sub| {
                sub.plan = plan.clone();
                sub.status = status;
            })
            .or_insert_with(|| Subscription {
                status,
                ..Subscription::start(user_id, plan, now)
            });
        Ok(subscription.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mangati_core::{NewPage, QuotaError};

    async fn writer(db: &MemoryDb) -> User {
        db.create_user(NewUser {
            username: "kana".to_string(),
            email: "kana@mangati.app".to_string(),
            hashed_password: "hash".to_string(),
            role: Role::Writer,
        })
        .await
        .unwrap()
    }

    async fn series_by(db: &MemoryDb, author: &User) -> MangaSeries {
        db.create_series(NewSeries {
            title: "Blue Lanterns".to_string(),
            synopsis: "Night markets".to_string(),
            cover_image_url: "https://img.example/blue.png".to_string(),
            author_id: author.id,
            tag_ids: vec![],
            language_ids: vec![],
        })
        .await
        .unwrap()
    }

    fn chapter(series_id: i64) -> NewChapter {
        NewChapter {
            series_id,
            title: "Arrival".to_string(),
            number: None,
            status: ChapterStatus::Pending,
            pages: vec![NewPage {
                image_url: "https://img.example/1.png".to_string(),
                file_size_bytes: 1024,
            }],
        }
    }

    #[tokio::test]
    async fn refused_charge_writes_nothing() {
        let db = MemoryDb::new();
        let author = writer(&db).await;
        let series = series_by(&db, &author).await;
        let now = Utc::now();

        let err = db
            .create_chapter(chapter(series.id), UploadCharge::Quota { user_id: author.id }, now)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Quota(QuotaError::SubscriptionRequired)));
        assert!(db.list_chapters(series.id).await.unwrap().is_empty());
        assert!(db.get_series(series.id).await.unwrap().updated_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_uploads_at_the_limit_boundary_charge_once() {
        let db = MemoryDb::new();
        let author = writer(&db).await;
        let series = series_by(&db, &author).await;
        let now = Utc::now();
        db.upsert_subscription(author.id, 1, SubscriptionStatus::Active, now)
            .await
            .unwrap();
        let charge = UploadCharge::Quota { user_id: author.id };
        for _ in 0..9 {
            db.create_chapter(chapter(series.id), charge, now).await.unwrap();
        }

        let (a, b) = tokio::join!(
            db.create_chapter(chapter(series.id), charge, now),
            db.create_chapter(chapter(series.id), charge, now),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(PortError::Quota(QuotaError::LimitReached { limit: 10 }))
        )));
        let subscription = db.get_subscription(author.id).await.unwrap().unwrap();
        assert_eq!(subscription.chapters_uploaded_this_month, 10);
        assert_eq!(db.list_chapters(series.id).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn numbering_continues_and_duplicates_conflict() {
        let db = MemoryDb::new();
        let author = writer(&db).await;
        let series = series_by(&db, &author).await;
        let now = Utc::now();

        let first = db
            .create_chapter(chapter(series.id), UploadCharge::Exempt, now)
            .await
            .unwrap();
        let second = db
            .create_chapter(chapter(series.id), UploadCharge::Exempt, now)
            .await
            .unwrap();
        assert_eq!((first.number, second.number), (1, 2));
        assert_eq!(second.pages[0].order, 1);

        let duplicate = NewChapter {
            number: Some(2),
            ..chapter(series.id)
        };
        assert!(matches!(
            db.create_chapter(duplicate, UploadCharge::Exempt, now).await,
            Err(PortError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn touching_progress_starts_on_page_one_and_keeps_later_pages() {
        let db = MemoryDb::new();
        let author = writer(&db).await;
        let series = series_by(&db, &author).await;
        let now = Utc::now();
        let chapter = db
            .create_chapter(chapter(series.id), UploadCharge::Exempt, now)
            .await
            .unwrap();

        db.touch_progress(author.id, chapter.id, now).await.unwrap();
        assert_eq!(
            db.progress_for_chapter(author.id, chapter.id)
                .await
                .unwrap()
                .last_read_page,
            1
        );

        db.record_progress(author.id, chapter.id, 7, now).await.unwrap();
        db.touch_progress(author.id, chapter.id, now).await.unwrap();
        let progress = db.progress_for_series(author.id, series.id).await.unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].last_read_page, 7);
    }

    #[tokio::test]
    async fn deleting_a_series_removes_favorites() {
        let db = MemoryDb::new();
        let author = writer(&db).await;
        let series = series_by(&db, &author).await;

        db.add_favorite(author.id, series.id).await.unwrap();
        db.add_favorite(author.id, series.id).await.unwrap();
        assert_eq!(db.list_favorites(author.id).await.unwrap().len(), 1);

        db.delete_series(series.id).await.unwrap();
        assert!(db.list_favorites(author.id).await.unwrap().is_empty());
        assert!(matches!(
            db.remove_favorite(author.id, series.id).await,
            Err(PortError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn tag_names_are_unique_ignoring_case() {
        let db = MemoryDb::new();
        db.create_tag("Action").await.unwrap();
        assert!(matches!(
            db.create_tag("action").await,
            Err(PortError::Conflict(_))
        ));
    }
}
