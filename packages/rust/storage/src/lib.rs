//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding users, courses
//! (with their chapters and topics) and subscription history.
//!
//! **Access rules:**
//! - CLI write commands: read-write via [`Storage::open`]
//! - Inspection commands: read-only via [`Storage::open_readonly`]
//!
//! Foreign keys are enforced, so deleting a course removes its chapters and
//! topics.

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use coursemind_shared::{
    Chapter, ContentMode, Course, CourseMindError, ImageRef, Plan, Result, Role, Subscription,
    SubscriptionStatus, Topic, User, course_progress,
};
use libsql::{Connection, Database, Row, TransactionBehavior, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Course ceiling enforced at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseQuota {
    pub plan: Plan,
    pub limit: u32,
}

/// A topic together with its owning chapter and course.
///
/// `chapter.topics` and `course.chapters` are left empty.
#[derive(Debug, Clone)]
pub struct TopicRecord {
    pub topic: Topic,
    pub chapter: Chapter,
    pub course: Course,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| CourseMindError::io(parent, e))?;
            }
        }

        let storage = Self::connect(path, false).await?;
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CourseMindError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .await
            .map_err(db_err)?;

        Ok(Self { db, conn, readonly })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CourseMindError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CourseMindError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert a user. Emails are unique.
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO users (id, email, name, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id.as_str(),
                    user.email.as_str(),
                    user.name.as_deref(),
                    user.role.as_str(),
                    timestamp(&user.created_at),
                ],
            )
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint failed") {
                    CourseMindError::validation(format!(
                        "a user with email '{}' already exists",
                        user.email
                    ))
                } else {
                    db_err(e)
                }
            })?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.query_user("SELECT id, email, name, role, created_at FROM users WHERE id = ?1", id)
            .await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user(
            "SELECT id, email, name, role, created_at FROM users WHERE email = ?1",
            email,
        )
        .await
    }

    async fn query_user(&self, sql: &str, key: &str) -> Result<Option<User>> {
        let mut rows = self.conn.query(sql, params![key]).await.map_err(db_err)?;
        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(User {
                id: col_string(&row, 0)?,
                email: col_string(&row, 1)?,
                name: row.get::<String>(2).ok(),
                role: parse_col::<Role>(&row, 3)?,
                created_at: col_timestamp(&row, 4)?,
            })),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Courses
    // -----------------------------------------------------------------------

    /// Insert a course with all of its chapters and topics in one transaction.
    pub async fn insert_course(&self, course: &Course) -> Result<()> {
        self.insert_course_within(course, None).await
    }

    /// Insert a course, counting the owner's courses inside the same write
    /// transaction when `quota` is given.
    ///
    /// Fails with [`CourseMindError::QuotaExceeded`] and writes nothing when
    /// the owner already holds `quota.limit` courses.
    pub async fn insert_course_within(
        &self,
        course: &Course,
        quota: Option<&CourseQuota>,
    ) -> Result<()> {
        self.check_writable()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(db_err)?;

        if let Some(quota) = quota {
            let mut rows = tx
                .query(
                    "SELECT COUNT(*) FROM courses WHERE user_id = ?1",
                    params![course.user_id.as_str()],
                )
                .await
                .map_err(db_err)?;
            let owned = match rows.next().await.map_err(db_err)? {
                Some(row) => row.get::<i64>(0).map_err(db_err)?.max(0) as u64,
                None => 0,
            };
            drop(rows);

            if owned >= u64::from(quota.limit) {
                tx.rollback().await.map_err(db_err)?;
                return Err(CourseMindError::QuotaExceeded {
                    plan: quota.plan.to_string(),
                    limit: quota.limit,
                });
            }
        }

        tx.execute(
            "INSERT INTO courses (id, user_id, name, language, mode, progress, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                course.id.as_str(),
                course.user_id.as_str(),
                course.name.as_str(),
                course.language.as_str(),
                course.mode.as_str(),
                i64::from(course.progress),
                timestamp(&course.created_at),
                timestamp(&course.updated_at),
            ],
        )
        .await
        .map_err(db_err)?;

        for chapter in &course.chapters {
            tx.execute(
                "INSERT INTO chapters (id, course_id, title, position) VALUES (?1, ?2, ?3, ?4)",
                params![
                    chapter.id.as_str(),
                    course.id.as_str(),
                    chapter.title.as_str(),
                    i64::from(chapter.position),
                ],
            )
            .await
            .map_err(db_err)?;

            for topic in &chapter.topics {
                let (image_url, image_fallback) = image_columns(topic.image.as_ref());
                tx.execute(
                    "INSERT INTO topics (id, chapter_id, title, description, position, completed,
                                         theory_html, video_id, image_url, image_fallback)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        topic.id.as_str(),
                        chapter.id.as_str(),
                        topic.title.as_str(),
                        topic.description.as_deref(),
                        i64::from(topic.position),
                        i64::from(topic.completed),
                        topic.theory_html.as_deref(),
                        topic.video_id.as_deref(),
                        image_url,
                        image_fallback,
                    ],
                )
                .await
                .map_err(db_err)?;
            }
        }

        tx.commit().await.map_err(db_err)?;
        tracing::debug!(
            course_id = %course.id,
            chapters = course.chapters.len(),
            "course inserted"
        );
        Ok(())
    }

    /// Load a course with its chapters and topics, in order.
    pub async fn get_course(&self, id: &str) -> Result<Option<Course>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, language, mode, progress, created_at, updated_at
                 FROM courses WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        let mut course = match rows.next().await.map_err(db_err)? {
            Some(row) => row_to_course(&row, 0)?,
            None => return Ok(None),
        };

        let mut rows = self
            .conn
            .query(
                "SELECT id, course_id, title, position FROM chapters
                 WHERE course_id = ?1 ORDER BY position",
                params![id],
            )
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            course.chapters.push(row_to_chapter(&row, 0)?);
        }

        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.chapter_id, t.title, t.description, t.position, t.completed,
                        t.theory_html, t.video_id, t.image_url, t.image_fallback
                 FROM topics t JOIN chapters c ON t.chapter_id = c.id
                 WHERE c.course_id = ?1
                 ORDER BY c.position, t.position",
                params![id],
            )
            .await
            .map_err(db_err)?;
        while let Some(row) = rows.next().await.map_err(db_err)? {
            let topic = row_to_topic(&row, 0)?;
            if let Some(chapter) = course.chapters.iter_mut().find(|c| c.id == topic.chapter_id) {
                chapter.topics.push(topic);
            }
        }

        Ok(Some(course))
    }

    /// List a user's courses, newest first. Chapters are not loaded.
    pub async fn list_courses(&self, user_id: &str) -> Result<Vec<Course>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, language, mode, progress, created_at, updated_at
                 FROM courses WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
                params![user_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_course(&row, 0)?);
        }
        Ok(results)
    }

    pub async fn count_courses(&self, user_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM courses WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
            None => Ok(0),
        }
    }

    /// Delete a course and, by cascade, its chapters and topics.
    /// Returns whether a course was removed.
    pub async fn delete_course(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute("DELETE FROM courses WHERE id = ?1", params![id])
            .await
            .map_err(db_err)?;
        Ok(affected > 0)
    }

    /// Recompute and store a course's progress from its topics' completion flags.
    pub async fn recompute_course_progress(&self, course_id: &str) -> Result<u8> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(t.id), COALESCE(SUM(t.completed), 0)
                 FROM topics t JOIN chapters c ON t.chapter_id = c.id
                 WHERE c.course_id = ?1",
                params![course_id],
            )
            .await
            .map_err(db_err)?;

        let (total, completed) = match rows.next().await.map_err(db_err)? {
            Some(row) => (
                row.get::<i64>(0).map_err(db_err)?.max(0) as u64,
                row.get::<i64>(1).map_err(db_err)?.max(0) as u64,
            ),
            None => (0, 0),
        };

        let progress = course_progress(completed, total);
        let affected = self
            .conn
            .execute(
                "UPDATE courses SET progress = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(progress), timestamp(&Utc::now()), course_id],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(CourseMindError::not_found("course", course_id));
        }

        tracing::debug!(course_id, completed, total, progress, "course progress recomputed");
        Ok(progress)
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Load a topic with its chapter and course.
    pub async fn get_topic(&self, topic_id: &str) -> Result<Option<TopicRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT t.id, t.chapter_id, t.title, t.description, t.position, t.completed,
                        t.theory_html, t.video_id, t.image_url, t.image_fallback,
                        c.id, c.course_id, c.title, c.position,
                        co.id, co.user_id, co.name, co.language, co.mode, co.progress,
                        co.created_at, co.updated_at
                 FROM topics t
                 JOIN chapters c ON t.chapter_id = c.id
                 JOIN courses co ON c.course_id = co.id
                 WHERE t.id = ?1",
                params![topic_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(TopicRecord {
                topic: row_to_topic(&row, 0)?,
                chapter: row_to_chapter(&row, 10)?,
                course: row_to_course(&row, 14)?,
            })),
            None => Ok(None),
        }
    }

    /// Store generated content on a topic.
    ///
    /// Theory and media are written together; whichever media field is not
    /// supplied is cleared.
    pub async fn update_topic_content(
        &self,
        topic_id: &str,
        theory_html: &str,
        video_id: Option<&str>,
        image: Option<&ImageRef>,
    ) -> Result<()> {
        self.check_writable()?;
        let (image_url, image_fallback) = image_columns(image);
        let affected = self
            .conn
            .execute(
                "UPDATE topics
                 SET theory_html = ?1, video_id = ?2, image_url = ?3, image_fallback = ?4
                 WHERE id = ?5",
                params![theory_html, video_id, image_url, image_fallback, topic_id],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(CourseMindError::not_found("topic", topic_id));
        }
        Ok(())
    }

    pub async fn set_topic_completed(&self, topic_id: &str, completed: bool) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "UPDATE topics SET completed = ?1 WHERE id = ?2",
                params![i64::from(completed), topic_id],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(CourseMindError::not_found("topic", topic_id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub async fn insert_subscription(&self, sub: &Subscription) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO subscriptions (id, user_id, plan, status, customer_ref, subscription_ref,
                                            price_ref, current_period_start, current_period_end,
                                            cancel_at_period_end, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    sub.id.as_str(),
                    sub.user_id.as_str(),
                    sub.plan.as_str(),
                    sub.status.as_str(),
                    sub.customer_ref.as_deref(),
                    sub.subscription_ref.as_deref(),
                    sub.price_ref.as_deref(),
                    sub.current_period_start.as_ref().map(timestamp),
                    sub.current_period_end.as_ref().map(timestamp),
                    i64::from(sub.cancel_at_period_end),
                    timestamp(&sub.created_at),
                    timestamp(&sub.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Record a status transition reported by the billing provider.
    pub async fn update_subscription_status(
        &self,
        id: &str,
        status: SubscriptionStatus,
        cancel_at_period_end: bool,
    ) -> Result<()> {
        self.check_writable()?;
        let affected = self
            .conn
            .execute(
                "UPDATE subscriptions
                 SET status = ?1, cancel_at_period_end = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![
                    status.as_str(),
                    i64::from(cancel_at_period_end),
                    timestamp(&Utc::now()),
                    id,
                ],
            )
            .await
            .map_err(db_err)?;

        if affected == 0 {
            return Err(CourseMindError::not_found("subscription", id));
        }
        Ok(())
    }

    /// The most recently created `ACTIVE` subscription for a user.
    pub async fn latest_active_subscription(&self, user_id: &str) -> Result<Option<Subscription>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE user_id = ?1 AND status = ?2
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT 1"
                ),
                params![user_id, SubscriptionStatus::Active.as_str()],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(row_to_subscription(&row)?)),
            None => Ok(None),
        }
    }

    /// A user's full subscription history, newest first.
    pub async fn list_subscriptions(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE user_id = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![user_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_subscription(&row)?);
        }
        Ok(results)
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan, status, customer_ref, subscription_ref, \
     price_ref, current_period_start, current_period_end, cancel_at_period_end, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn db_err(e: libsql::Error) -> CourseMindError {
    CourseMindError::Storage(e.to_string())
}

/// RFC 3339 with fixed microsecond precision, so text order is time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn image_columns(image: Option<&ImageRef>) -> (Option<&str>, i64) {
    match image {
        Some(image) => (Some(image.url()), i64::from(image.is_fallback())),
        None => (None, 0),
    }
}

fn col_string(row: &Row, idx: usize) -> Result<String> {
    row.get::<String>(idx as i32).map_err(db_err)
}

fn col_u32(row: &Row, idx: usize) -> Result<u32> {
    let value = row.get::<i64>(idx as i32).map_err(db_err)?;
    u32::try_from(value)
        .map_err(|_| CourseMindError::Storage(format!("column {idx} out of range: {value}")))
}

fn col_bool(row: &Row, idx: usize) -> Result<bool> {
    Ok(row.get::<i64>(idx as i32).map_err(db_err)? != 0)
}

fn col_timestamp(row: &Row, idx: usize) -> Result<DateTime<Utc>> {
    parse_timestamp(&col_string(row, idx)?)
}

fn opt_timestamp(row: &Row, idx: usize) -> Result<Option<DateTime<Utc>>> {
    row.get::<String>(idx as i32)
        .ok()
        .map(|s| parse_timestamp(&s))
        .transpose()
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CourseMindError::Storage(format!("invalid date '{s}': {e}")))
}

fn parse_col<T>(row: &Row, idx: usize) -> Result<T>
where
    T: std::str::FromStr<Err = CourseMindError>,
{
    col_string(row, idx)?
        .parse::<T>()
        .map_err(|e| CourseMindError::Storage(format!("corrupt column {idx}: {e}")))
}

fn row_to_course(row: &Row, offset: usize) -> Result<Course> {
    let progress = col_u32(row, offset + 5)?.min(100) as u8;
    Ok(Course {
        id: col_string(row, offset)?,
        user_id: col_string(row, offset + 1)?,
        name: col_string(row, offset + 2)?,
        language: col_string(row, offset + 3)?,
        mode: parse_col::<ContentMode>(row, offset + 4)?,
        progress,
        created_at: col_timestamp(row, offset + 6)?,
        updated_at: col_timestamp(row, offset + 7)?,
        chapters: Vec::new(),
    })
}

fn row_to_chapter(row: &Row, offset: usize) -> Result<Chapter> {
    Ok(Chapter {
        id: col_string(row, offset)?,
        course_id: col_string(row, offset + 1)?,
        title: col_string(row, offset + 2)?,
        position: col_u32(row, offset + 3)?,
        topics: Vec::new(),
    })
}

fn row_to_topic(row: &Row, offset: usize) -> Result<Topic> {
    let image = row.get::<String>((offset + 8) as i32).ok().map(|url| {
        if row.get::<i64>((offset + 9) as i32).unwrap_or(0) != 0 {
            ImageRef::Fallback(url)
        } else {
            ImageRef::Found(url)
        }
    });

    Ok(Topic {
        id: col_string(row, offset)?,
        chapter_id: col_string(row, offset + 1)?,
        title: col_string(row, offset + 2)?,
        description: row.get::<String>((offset + 3) as i32).ok(),
        position: col_u32(row, offset + 4)?,
        completed: col_bool(row, offset + 5)?,
        theory_html: row.get::<String>((offset + 6) as i32).ok(),
        video_id: row.get::<String>((offset + 7) as i32).ok(),
        image,
    })
}

fn row_to_subscription(row: &Row) -> Result<Subscription> {
    Ok(Subscription {
        id: col_string(row, 0)?,
        user_id: col_string(row, 1)?,
        plan: parse_col::<Plan>(row, 2)?,
        status: parse_col::<SubscriptionStatus>(row, 3)?,
        customer_ref: row.get::<String>(4).ok(),
        subscription_ref: row.get::<String>(5).ok(),
        price_ref: row.get::<String>(6).ok(),
        current_period_start: opt_timestamp(row, 7)?,
        current_period_end: opt_timestamp(row, 8)?,
        cancel_at_period_end: col_bool(row, 9)?,
        created_at: col_timestamp(row, 10)?,
        updated_at: col_timestamp(row, 11)?,
    })
}
