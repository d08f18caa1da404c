use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS subjects (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS achievements (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS units (
            id INTEGER PRIMARY KEY,
            subject_id INTEGER,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL CHECK (sort_order >= 0),
            linked_achievement_id TEXT,
            FOREIGN KEY (subject_id) REFERENCES subjects(id) ON DELETE SET NULL,
            FOREIGN KEY (linked_achievement_id) REFERENCES achievements(id) ON DELETE SET NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lessons (
            id INTEGER PRIMARY KEY,
            unit_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            xp_value INTEGER CHECK (xp_value IS NULL OR xp_value >= 0),
            sort_order INTEGER NOT NULL CHECK (sort_order >= 0),
            FOREIGN KEY (unit_id) REFERENCES units(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id BLOB PRIMARY KEY,
            username TEXT,
            full_name TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lesson_progress (
            id INTEGER PRIMARY KEY,
            user_id BLOB NOT NULL,
            lesson_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            confidence TEXT,
            note TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, lesson_id),
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_achievements (
            id INTEGER PRIMARY KEY,
            user_id BLOB NOT NULL,
            achievement_id TEXT NOT NULL,
            unlocked_at TEXT NOT NULL,
            UNIQUE (user_id, achievement_id)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_lessons_unit_order
            ON lessons (unit_id, sort_order, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_lesson_progress_user_completed
            ON lesson_progress (user_id, completed);
    ",
];

/// Runs the versioned migrations for the progress schema.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: catalog, progress and unlock tables.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1.iter().copied() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = 1, "applied schema migration");
    }

    Ok(())
}
