//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Queries are checked at runtime (`query` / `query_as`) so the crate builds
//! without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mangati_core::{
    charge_upload, Chapter, ChapterStatus, DatabaseService, Language, MangaSeries, NewChapter,
    NewSeries, NewUser, Page, PortError, PortResult, ReadingMode, ReadingProgress, Role,
    SeriesFilter, SeriesPage, SeriesStatus, SeriesUpdate, Subscription, SubscriptionPlan,
    SubscriptionStatus, Tag, TagUsage, ThemeMode, UploadCharge, User, UserCredentials,
    ViewerSettings,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn load_series(&self, records: Vec<SeriesRecord>) -> PortResult<Vec<MangaSeries>> {
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        let mut tags = links::<Tag>(&self.pool, TAG_LINKS_SQL, &ids).await?;
        let mut languages = links::<Language>(&self.pool, LANGUAGE_LINKS_SQL, &ids).await?;

        records
            .into_iter()
            .map(|r| {
                let id = r.id;
                r.to_domain(
                    tags.remove(&id).unwrap_or_default(),
                    languages.remove(&id).unwrap_or_default(),
                )
            })
            .collect()
    }

    async fn fetch_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>> {
        let sql = format!("{} WHERE us.user_id = $1", SUBSCRIPTION_SELECT);
        sqlx::query_as::<_, SubscriptionRecord>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .map(SubscriptionRecord::to_domain)
            .transpose()
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    error!("Database error: {}", e);
    PortError::Unexpected(e.to_string())
}

fn not_found_or(e: sqlx::Error, what: String) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(what),
        other => unexpected(other),
    }
}

/// Maps constraint violations on writes to the port's conflict / not-found errors.
fn write_error(e: sqlx::Error, conflict: &str) -> PortError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return PortError::Conflict(conflict.to_string());
        }
        if db_err.is_foreign_key_violation() {
            return PortError::NotFound("Referenced item does not exist".to_string());
        }
    }
    unexpected(e)
}

fn parse_column<T>(value: &str, parse: fn(&str) -> Option<T>, column: &str) -> PortResult<T> {
    parse(value).ok_or_else(|| PortError::Unexpected(format!("Unknown {} '{}'", column, value)))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    created_at: DateTime<Utc>,
    roles: Vec<String>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            roles: self.roles.iter().filter_map(|r| Role::from_claim(r)).collect(),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    #[sqlx(flatten)]
    user: UserRecord,
    password_hash: String,
}

const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.created_at, \
     COALESCE(ARRAY_AGG(r.role ORDER BY r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles \
     FROM users u LEFT JOIN user_roles r ON r.user_id = u.id";

const CREDENTIALS_SELECT: &str = "SELECT u.id, u.username, u.email, u.created_at, u.password_hash, \
     COALESCE(ARRAY_AGG(r.role ORDER BY r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles \
     FROM users u LEFT JOIN user_roles r ON r.user_id = u.id";

#[derive(FromRow)]
struct SeriesRecord {
    id: i64,
    title: String,
    synopsis: String,
    cover_image_url: String,
    status: String,
    author_id: Uuid,
    author_name: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}
impl SeriesRecord {
    fn to_domain(self, tags: Vec<Tag>, languages: Vec<Language>) -> PortResult<MangaSeries> {
        Ok(MangaSeries {
            id: self.id,
            title: self.title,
            synopsis: self.synopsis,
            cover_image_url: self.cover_image_url,
            status: parse_column(&self.status, SeriesStatus::parse, "series status")?,
            author_id: self.author_id,
            author_name: self.author_name,
            tags,
            languages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SERIES_SELECT: &str = "SELECT s.id, s.title, s.synopsis, s.cover_image_url, s.status, \
     s.author_id, u.username AS author_name, s.created_at, s.updated_at \
     FROM manga_series s JOIN users u ON u.id = s.author_id";

const SERIES_FILTER: &str = "WHERE ($1::text IS NULL \
         OR STRPOS(LOWER(s.title), LOWER($1)) > 0 \
         OR STRPOS(LOWER(s.synopsis), LOWER($1)) > 0) \
     AND ($2::text IS NULL OR s.status = $2) \
     AND ($3::bigint IS NULL OR EXISTS ( \
         SELECT 1 FROM series_languages sl WHERE sl.series_id = s.id AND sl.language_id = $3)) \
     AND (CARDINALITY($4::bigint[]) = 0 OR EXISTS ( \
         SELECT 1 FROM series_tags st WHERE st.series_id = s.id AND st.tag_id = ANY($4)))";

#[derive(FromRow)]
struct LinkRecord {
    series_id: i64,
    id: i64,
    name: String,
}

const TAG_LINKS_SQL: &str = "SELECT st.series_id, t.id, t.name FROM series_tags st \
     JOIN tags t ON t.id = st.tag_id WHERE st.series_id = ANY($1) ORDER BY t.name";
const LANGUAGE_LINKS_SQL: &str = "SELECT sl.series_id, l.id, l.name FROM series_languages sl \
     JOIN languages l ON l.id = sl.language_id WHERE sl.series_id = ANY($1) ORDER BY l.name";

impl From<LinkRecord> for Tag {
    fn from(r: LinkRecord) -> Self {
        Tag { id: r.id, name: r.name }
    }
}
impl From<LinkRecord> for Language {
    fn from(r: LinkRecord) -> Self {
        Language { id: r.id, name: r.name }
    }
}

async fn links<T: From<LinkRecord>>(
    pool: &PgPool,
    sql: &str,
    series_ids: &[i64],
) -> PortResult<HashMap<i64, Vec<T>>> {
    let records = sqlx::query_as::<_, LinkRecord>(sql)
        .bind(series_ids)
        .fetch_all(pool)
        .await
        .map_err(unexpected)?;

    let mut grouped: HashMap<i64, Vec<T>> = HashMap::new();
    for record in records {
        grouped.entry(record.series_id).or_default().push(record.into());
    }
    Ok(grouped)
}

#[derive(FromRow)]
struct NamedRecord {
    id: i64,
    name: String,
}

#[derive(FromRow)]
struct ChapterRecord {
    id: i64,
    series_id: i64,
    title: String,
    number: i32,
    status: String,
    uploaded_at: DateTime<Utc>,
}
impl ChapterRecord {
    fn to_domain(self, pages: Vec<Page>) -> PortResult<Chapter> {
        Ok(Chapter {
            id: self.id,
            series_id: self.series_id,
            title: self.title,
            number: self.number,
            status: parse_column(&self.status, ChapterStatus::parse, "chapter status")?,
            uploaded_at: self.uploaded_at,
            pages,
        })
    }
}

#[derive(FromRow)]
struct PageRecord {
    id: i64,
    image_url: String,
    file_size_bytes: i64,
    page_order: i32,
}
impl PageRecord {
    fn to_domain(self) -> Page {
        Page {
            id: self.id,
            image_url: self.image_url,
            file_size_bytes: self.file_size_bytes,
            order: self.page_order,
        }
    }
}

#[derive(FromRow)]
struct ProgressRecord {
    chapter_id: i64,
    chapter_number: i32,
    last_read_page: i32,
    last_read_at: DateTime<Utc>,
}
impl ProgressRecord {
    fn to_domain(self, user_id: Uuid) -> ReadingProgress {
        ReadingProgress {
            user_id,
            chapter_id: self.chapter_id,
            chapter_number: self.chapter_number,
            last_read_page: self.last_read_page,
            last_read_at: self.last_read_at,
        }
    }
}

#[derive(FromRow)]
struct SettingsRecord {
    user_id: Uuid,
    theme: String,
    reading_mode: String,
    fit_to_width: bool,
    zoom_level: i32,
}
impl SettingsRecord {
    fn to_domain(self) -> PortResult<ViewerSettings> {
        Ok(ViewerSettings {
            user_id: self.user_id,
            theme: parse_column(&self.theme, ThemeMode::parse, "theme")?,
            reading_mode: parse_column(&self.reading_mode, ReadingMode::parse, "reading mode")?,
            fit_to_width: self.fit_to_width,
            zoom_level: self.zoom_level,
        })
    }
}

#[derive(FromRow)]
struct PlanRecord {
    id: i64,
    name: String,
    price_cents: i64,
    upload_limit_per_month: i32,
}
impl PlanRecord {
    fn to_domain(self) -> SubscriptionPlan {
        SubscriptionPlan {
            id: self.id,
            name: self.name,
            price_cents: self.price_cents,
            upload_limit_per_month: self.upload_limit_per_month,
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRecord {
    user_id: Uuid,
    #[sqlx(flatten)]
    plan: PlanRecord,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    status: String,
    chapters_uploaded_this_month: i32,
    last_upload_reset_date: DateTime<Utc>,
}
impl SubscriptionRecord {
    fn to_domain(self) -> PortResult<Subscription> {
        Ok(Subscription {
            user_id: self.user_id,
            plan: self.plan.to_domain(),
            start_date: self.start_date,
            end_date: self.end_date,
            status: parse_column(&self.status, SubscriptionStatus::parse, "subscription status")?,
            chapters_uploaded_this_month: self.chapters_uploaded_this_month,
            last_upload_reset_date: self.last_upload_reset_date,
        })
    }
}

const SUBSCRIPTION_SELECT: &str = "SELECT us.user_id, p.id, p.name, p.price_cents, \
     p.upload_limit_per_month, us.start_date, us.end_date, us.status, \
     us.chapters_uploaded_this_month, us.last_upload_reset_date \
     FROM user_subscriptions us JOIN subscription_plans p ON p.id = us.plan_id";

//=========================================================================================
// Transaction Helpers
//=========================================================================================

async fn replace_links(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    column: &str,
    series_id: i64,
    ids: &[i64],
) -> PortResult<()> {
    sqlx::query(&format!("DELETE FROM {} WHERE series_id = $1", table))
        .bind(series_id)
        .execute(&mut **tx)
        .await
        .map_err(unexpected)?;
    sqlx::query(&format!(
        "INSERT INTO {} (series_id, {}) SELECT $1, UNNEST($2::bigint[]) ON CONFLICT DO NOTHING",
        table, column
    ))
    .bind(series_id)
    .bind(ids)
    .execute(&mut **tx)
    .await
    .map_err(|e| write_error(e, "Duplicate link"))?;
    Ok(())
}

async fn chapter_exists(pool: &PgPool, chapter_id: i64) -> PortResult<()> {
    sqlx::query("SELECT 1 FROM chapters WHERE id = $1")
        .bind(chapter_id)
        .fetch_optional(pool)
        .await
        .map_err(unexpected)?
        .map(|_| ())
        .ok_or_else(|| PortError::NotFound(format!("Chapter {} not found", chapter_id)))
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn ping(&self) -> PortResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    // --- Users ---

    async fn create_user(&self, new_user: NewUser) -> PortResult<User> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let user_id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.hashed_password)
        .execute(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Email or username is already registered"))?;

        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(user_id)
            .bind(new_user.role.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        self.get_user_by_id(user_id).await
    }

    async fn email_taken(&self, email: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn username_taken(&self, username: &str) -> PortResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM users WHERE LOWER(username) = LOWER($1))",
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let sql = format!("{} WHERE u.id = $1 GROUP BY u.id", USER_SELECT);
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("User {} not found", user_id)))?;
        Ok(record.to_domain())
    }

    async fn get_credentials_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let sql = format!(
            "{} WHERE LOWER(u.email) = LOWER($1) GROUP BY u.id",
            CREDENTIALS_SELECT
        );
        let record = sqlx::query_as::<_, CredentialsRecord>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, "User not found".to_string()))?;
        Ok(UserCredentials {
            user: record.user.to_domain(),
            hashed_password: record.password_hash,
        })
    }

    async fn get_user_roles(&self, user_id: Uuid) -> PortResult<Vec<Role>> {
        Ok(self.get_user_by_id(user_id).await?.roles)
    }

    // --- Series ---

    async fn list_series(&self, filter: &SeriesFilter) -> PortResult<SeriesPage> {
        let status = filter.status.map(|s| s.as_str());

        let count_sql = format!("SELECT COUNT(*) FROM manga_series s {}", SERIES_FILTER);
        let total_items: i64 = sqlx::query_scalar(&count_sql)
            .bind(filter.search_term.as_deref())
            .bind(status)
            .bind(filter.language_id)
            .bind(&filter.tag_ids)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let page_sql = format!(
            "{} {} ORDER BY COALESCE(s.updated_at, s.created_at) DESC, s.id DESC LIMIT $5 OFFSET $6",
            SERIES_SELECT, SERIES_FILTER
        );
        let records = sqlx::query_as::<_, SeriesRecord>(&page_sql)
            .bind(filter.search_term.as_deref())
            .bind(status)
            .bind(filter.language_id)
            .bind(&filter.tag_ids)
            .bind(i64::from(filter.page_size))
            .bind(filter.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        let total_items = total_items.max(0) as u64;
        Ok(SeriesPage {
            items: self.load_series(records).await?,
            total_items,
            total_pages: SeriesPage::total_pages_for(total_items, filter.page_size),
        })
    }

    async fn get_series(&self, series_id: i64) -> PortResult<MangaSeries> {
        let sql = format!("{} WHERE s.id = $1", SERIES_SELECT);
        let record = sqlx::query_as::<_, SeriesRecord>(&sql)
            .bind(series_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| not_found_or(e, format!("Series {} not found", series_id)))?;

        self.load_series(vec![record])
            .await?
            .pop()
            .ok_or_else(|| PortError::NotFound(format!("Series {} not found", series_id)))
    }

    async fn create_series(&self, new_series: NewSeries) -> PortResult<MangaSeries> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let series_id: i64 = sqlx::query_scalar(
            "INSERT INTO manga_series (title, synopsis, cover_image_url, author_id) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&new_series.title)
        .bind(&new_series.synopsis)
        .bind(&new_series.cover_image_url)
        .bind(new_series.author_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, "Series already exists"))?;

        replace_links(&mut tx, "series_tags", "tag_id", series_id, &new_series.tag_ids).await?;
        replace_links(
            &mut tx,
            "series_languages",
            "language_id",
            series_id,
            &new_series.language_ids,
        )
        .await?;

        tx.commit().await.map_err(unexpected)?;
        self.get_series(series_id).await
    }

    async fn update_series(&self, series_id: i64, update: SeriesUpdate) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let result = sqlx::query(
            "UPDATE manga_series SET title = $2, synopsis = $3, cover_image_url = $4, \
             status = $5, updated_at = NOW() WHERE id = $1",
        )
        .bind(series_id)
        .bind(&update.title)
        .bind(&update.synopsis)
        .bind(&update.cover_image_url)
        .bind(update.status.as_str())
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Series {} not found", series_id)));
        }

        if let Some(tag_ids) = &update.tag_ids {
            replace_links(&mut tx, "series_tags", "tag_id", series_id, tag_ids).await?;
        }
        if let Some(language_ids) = &update.language_ids {
            replace_links(&mut tx, "series_languages", "language_id", series_id, language_ids)
                .await?;
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_series(&self, series_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM manga_series WHERE id = $1")
            .bind(series_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Series {} not found", series_id)));
        }
        Ok(())
    }

    // --- Chapters ---

    async fn list_chapters(&self, series_id: i64) -> PortResult<Vec<Chapter>> {
        self.get_series(series_id).await?;
        let records = sqlx::query_as::<_, ChapterRecord>(
            "SELECT id, series_id, title, number, status, uploaded_at FROM chapters \
             WHERE series_id = $1 ORDER BY number",
        )
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain(Vec::new())).collect()
    }

    async fn get_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<Chapter> {
        let record = sqlx::query_as::<_, ChapterRecord>(
            "SELECT id, series_id, title, number, status, uploaded_at FROM chapters \
             WHERE id = $1 AND series_id = $2",
        )
        .bind(chapter_id)
        .bind(series_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found_or(e, format!("Chapter {} not found", chapter_id)))?;

        let pages = sqlx::query_as::<_, PageRecord>(
            "SELECT id, image_url, file_size_bytes, page_order FROM pages \
             WHERE chapter_id = $1 ORDER BY page_order",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?
        .into_iter()
        .map(PageRecord::to_domain)
        .collect();

        record.to_domain(pages)
    }

    async fn create_chapter(
        &self,
        new_chapter: NewChapter,
        charge: UploadCharge,
        now: DateTime<Utc>,
    ) -> PortResult<Chapter> {
        let series_id = new_chapter.series_id;
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Serializes numbering within the series.
        sqlx::query("SELECT id FROM manga_series WHERE id = $1 FOR UPDATE")
            .bind(series_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Series {} not found", series_id)))?;

        // The subscription row stays locked until commit, so two uploads at the
        // limit boundary cannot both pass the check.
        let charged = match charge {
            UploadCharge::Exempt => None,
            UploadCharge::Quota { user_id } => {
                let sql = format!("{} WHERE us.user_id = $1 FOR UPDATE OF us", SUBSCRIPTION_SELECT);
                let mut subscription = sqlx::query_as::<_, SubscriptionRecord>(&sql)
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(unexpected)?
                    .map(SubscriptionRecord::to_domain)
                    .transpose()?;
                charge_upload(subscription.as_mut(), now)?;
                subscription
            }
        };

        let number = match new_chapter.number {
            Some(number) => number,
            None => sqlx::query_scalar::<_, i32>(
                "SELECT COALESCE(MAX(number), 0) + 1 FROM chapters WHERE series_id = $1",
            )
            .bind(series_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?,
        };

        let record = sqlx::query_as::<_, ChapterRecord>(
            "INSERT INTO chapters (series_id, title, number, status, uploaded_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, series_id, title, number, status, uploaded_at",
        )
        .bind(series_id)
        .bind(&new_chapter.title)
        .bind(number)
        .bind(new_chapter.status.as_str())
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| write_error(e, &format!("Chapter {} already exists", number)))?;

        let mut pages = Vec::with_capacity(new_chapter.pages.len());
        for (index, page) in new_chapter.pages.iter().enumerate() {
            let page = sqlx::query_as::<_, PageRecord>(
                "INSERT INTO pages (chapter_id, image_url, file_size_bytes, page_order) \
                 VALUES ($1, $2, $3, $4) RETURNING id, image_url, file_size_bytes, page_order",
            )
            .bind(record.id)
            .bind(&page.image_url)
            .bind(page.file_size_bytes)
            .bind(index as i32 + 1)
            .fetch_one(&mut *tx)
            .await
            .map_err(unexpected)?;
            pages.push(page.to_domain());
        }

        sqlx::query("UPDATE manga_series SET updated_at = $2 WHERE id = $1")
            .bind(series_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        if let Some(subscription) = &charged {
            sqlx::query(
                "UPDATE user_subscriptions SET chapters_uploaded_this_month = $2, \
                 last_upload_reset_date = $3 WHERE user_id = $1",
            )
            .bind(subscription.user_id)
            .bind(subscription.chapters_uploaded_this_month)
            .bind(subscription.last_upload_reset_date)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        tx.commit().await.map_err(unexpected)?;
        record.to_domain(pages)
    }

    async fn set_chapter_status(
        &self,
        series_id: i64,
        chapter_id: i64,
        status: ChapterStatus,
    ) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let result = sqlx::query("UPDATE chapters SET status = $3 WHERE id = $1 AND series_id = $2")
            .bind(chapter_id)
            .bind(series_id)
            .bind(status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        if status == ChapterStatus::Approved {
            sqlx::query("UPDATE manga_series SET updated_at = NOW() WHERE id = $1")
                .bind(series_id)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn delete_chapter(&self, series_id: i64, chapter_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM chapters WHERE id = $1 AND series_id = $2")
            .bind(chapter_id)
            .bind(series_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Chapter {} not found", chapter_id)));
        }
        Ok(())
    }

    // --- Tags and Languages ---

    async fn list_tags(&self) -> PortResult<Vec<Tag>> {
        let records = sqlx::query_as::<_, NamedRecord>("SELECT id, name FROM tags ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| Tag { id: r.id, name: r.name })
            .collect())
    }

    async fn create_tag(&self, name: &str) -> PortResult<Tag> {
        let record = sqlx::query_as::<_, NamedRecord>(
            "INSERT INTO tags (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Tag '{}' already exists", name)))?;
        Ok(Tag {
            id: record.id,
            name: record.name,
        })
    }

    async fn trending_tags(&self, limit: u32) -> PortResult<Vec<TagUsage>> {
        #[derive(FromRow)]
        struct UsageRecord {
            id: i64,
            name: String,
            count: i64,
        }

        let records = sqlx::query_as::<_, UsageRecord>(
            "SELECT t.id, t.name, COUNT(st.series_id) AS count FROM tags t \
             JOIN series_tags st ON st.tag_id = t.id \
             GROUP BY t.id, t.name ORDER BY count DESC, t.name LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records
            .into_iter()
            .map(|r| TagUsage {
                tag: Tag { id: r.id, name: r.name },
                count: r.count,
            })
            .collect())
    }

    async fn list_languages(&self) -> PortResult<Vec<Language>> {
        let records =
            sqlx::query_as::<_, NamedRecord>("SELECT id, name FROM languages ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(records
            .into_iter()
            .map(|r| Language { id: r.id, name: r.name })
            .collect())
    }

    async fn create_language(&self, name: &str) -> PortResult<Language> {
        let record = sqlx::query_as::<_, NamedRecord>(
            "INSERT INTO languages (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, &format!("Language '{}' already exists", name)))?;
        Ok(Language {
            id: record.id,
            name: record.name,
        })
    }

    // --- Favorites ---

    async fn list_favorites(&self, user_id: Uuid) -> PortResult<Vec<MangaSeries>> {
        let sql = format!(
            "{} JOIN favorites f ON f.series_id = s.id WHERE f.user_id = $1 ORDER BY f.created_at DESC",
            SERIES_SELECT
        );
        let records = sqlx::query_as::<_, SeriesRecord>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        self.load_series(records).await
    }

    async fn add_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO favorites (user_id, series_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(series_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match write_error(e, "Already a favorite") {
            PortError::NotFound(_) => PortError::NotFound(format!("Series {} not found", series_id)),
            other => other,
        })?;
        Ok(())
    }

    async fn remove_favorite(&self, user_id: Uuid, series_id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND series_id = $2")
            .bind(user_id)
            .bind(series_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Series {} is not a favorite",
                series_id
            )));
        }
        Ok(())
    }

    // --- Reading Progress ---

    async fn progress_for_series(
        &self,
        user_id: Uuid,
        series_id: i64,
    ) -> PortResult<Vec<ReadingProgress>> {
        let records = sqlx::query_as::<_, ProgressRecord>(
            "SELECT rp.chapter_id, c.number AS chapter_number, rp.last_read_page, rp.last_read_at \
             FROM reading_progress rp JOIN chapters c ON c.id = rp.chapter_id \
             WHERE rp.user_id = $1 AND c.series_id = $2 ORDER BY c.number",
        )
        .bind(user_id)
        .bind(series_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain(user_id)).collect())
    }

    async fn progress_for_chapter(
        &self,
        user_id: Uuid,
        chapter_id: i64,
    ) -> PortResult<ReadingProgress> {
        let record = sqlx::query_as::<_, ProgressRecord>(
            "SELECT rp.chapter_id, c.number AS chapter_number, rp.last_read_page, rp.last_read_at \
             FROM reading_progress rp JOIN chapters c ON c.id = rp.chapter_id \
             WHERE rp.user_id = $1 AND rp.chapter_id = $2",
        )
        .bind(user_id)
        .bind(chapter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            not_found_or(e, format!("No reading progress for chapter {}", chapter_id))
        })?;
        Ok(record.to_domain(user_id))
    }

    async fn record_progress(
        &self,
        user_id: Uuid,
        chapter_id: i64,
        page_number: i32,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        chapter_exists(&self.pool, chapter_id).await?;
        sqlx::query(
            "INSERT INTO reading_progress (user_id, chapter_id, last_read_page, last_read_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (user_id, chapter_id) DO UPDATE \
             SET last_read_page = EXCLUDED.last_read_page, last_read_at = EXCLUDED.last_read_at",
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(page_number)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Progress conflict"))?;
        Ok(())
    }

    async fn touch_progress(
        &self,
        user_id: Uuid,
        chapter_id: i64,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        chapter_exists(&self.pool, chapter_id).await?;
        sqlx::query(
            "INSERT INTO reading_progress (user_id, chapter_id, last_read_page, last_read_at) \
             VALUES ($1, $2, 1, $3) ON CONFLICT (user_id, chapter_id) DO UPDATE \
             SET last_read_at = EXCLUDED.last_read_at",
        )
        .bind(user_id)
        .bind(chapter_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Progress conflict"))?;
        Ok(())
    }

    // --- Viewer Settings ---

    async fn get_viewer_settings(&self, user_id: Uuid) -> PortResult<Option<ViewerSettings>> {
        sqlx::query_as::<_, SettingsRecord>(
            "SELECT user_id, theme, reading_mode, fit_to_width, zoom_level \
             FROM viewer_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .map(SettingsRecord::to_domain)
        .transpose()
    }

    async fn save_viewer_settings(&self, settings: ViewerSettings) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO viewer_settings (user_id, theme, reading_mode, fit_to_width, zoom_level) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (user_id) DO UPDATE \
             SET theme = EXCLUDED.theme, reading_mode = EXCLUDED.reading_mode, \
             fit_to_width = EXCLUDED.fit_to_width, zoom_level = EXCLUDED.zoom_level",
        )
        .bind(settings.user_id)
        .bind(settings.theme.as_str())
        .bind(settings.reading_mode.as_str())
        .bind(settings.fit_to_width)
        .bind(settings.zoom_level)
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Settings conflict"))?;
        Ok(())
    }

    // --- Subscriptions ---

    async fn list_plans(&self) -> PortResult<Vec<SubscriptionPlan>> {
        let records = sqlx::query_as::<_, PlanRecord>(
            "SELECT id, name, price_cents, upload_limit_per_month FROM subscription_plans ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(PlanRecord::to_domain).collect())
    }

    async fn get_subscription(&self, user_id: Uuid) -> PortResult<Option<Subscription>> {
        self.fetch_subscription(user_id).await
    }

    async fn upsert_subscription(
        &self,
        user_id: Uuid,
        plan_id: i64,
        status: SubscriptionStatus,
        now: DateTime<Utc>,
    ) -> PortResult<Subscription> {
        self.get_user_by_id(user_id).await?;
        sqlx::query("SELECT 1 FROM subscription_plans WHERE id = $1")
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Plan {} not found", plan_id)))?;

        sqlx::query(
            "INSERT INTO user_subscriptions \
             (user_id, plan_id, start_date, status, chapters_uploaded_this_month, last_upload_reset_date) \
             VALUES ($1, $2, $3, $4, 0, $3) ON CONFLICT (user_id) DO UPDATE \
             SET plan_id = EXCLUDED.plan_id, status = EXCLUDED.status",
        )
        .bind(user_id)
        .bind(plan_id)
        .bind(now)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, "Subscription conflict"))?;

        self.fetch_subscription(user_id)
            .await?
            .ok_or_else(|| PortError::Unexpected("Subscription vanished after upsert".to_string()))
    }
}
