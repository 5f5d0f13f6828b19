//! SQL migration definitions for the CourseMind database.
//!
//! Migrations are applied in order on database open. Each one records its
//! version in `schema_migrations` as its final statement.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: users, courses, chapters, topics, subscriptions",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY,
    email      TEXT NOT NULL UNIQUE,
    name       TEXT,
    role       TEXT NOT NULL DEFAULT 'USER',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS courses (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    language   TEXT NOT NULL,
    mode       TEXT NOT NULL,
    progress   INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_courses_user_id ON courses(user_id);

CREATE TABLE IF NOT EXISTS chapters (
    id        TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    title     TEXT NOT NULL,
    position  INTEGER NOT NULL,
    UNIQUE(course_id, position)
);

CREATE TABLE IF NOT EXISTS topics (
    id             TEXT PRIMARY KEY,
    chapter_id     TEXT NOT NULL REFERENCES chapters(id) ON DELETE CASCADE,
    title          TEXT NOT NULL,
    description    TEXT,
    position       INTEGER NOT NULL,
    completed      INTEGER NOT NULL DEFAULT 0,
    theory_html    TEXT,
    video_id       TEXT,
    image_url      TEXT,
    image_fallback INTEGER NOT NULL DEFAULT 0,
    UNIQUE(chapter_id, position)
);

CREATE INDEX IF NOT EXISTS idx_topics_chapter_id ON topics(chapter_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Subscriptions",
            sql: r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id                   TEXT PRIMARY KEY,
    user_id              TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    plan                 TEXT NOT NULL,
    status               TEXT NOT NULL,
    customer_ref         TEXT,
    subscription_ref     TEXT UNIQUE,
    price_ref            TEXT,
    current_period_start TEXT,
    current_period_end   TEXT,
    cancel_at_period_end INTEGER NOT NULL DEFAULT 0,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_user_status
    ON subscriptions(user_id, status, created_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
