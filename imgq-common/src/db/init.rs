//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and creates every table,
//! index and view idempotently.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// How long a connection waits on the writer lock before SQLITE_BUSY
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes and views (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_images_table(pool).await?;
    create_assignments_table(pool).await?;
    create_annotations_table(pool).await?;
    create_live_annotations_view(pool).await?;
    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'annotator' CHECK (role IN ('annotator', 'admin')),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the images table
///
/// `original_meta` holds the opaque seed metadata as JSON text.
async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            image_path TEXT NOT NULL,
            image_url TEXT,
            original_meta TEXT NOT NULL DEFAULT '{}',
            annotation_count INTEGER NOT NULL DEFAULT 0 CHECK (annotation_count >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the assignments table
///
/// Unique on (user_id, image_id), and additionally on image_id alone: an
/// image sits in at most one user's queue.
async fn create_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            image_id TEXT NOT NULL REFERENCES images(id),
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'completed')),
            assigned_at TEXT NOT NULL,
            completed_at TEXT,
            UNIQUE (user_id, image_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_assignments_image ON assignments(image_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_assignments_user_status ON assignments(user_id, status, assigned_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_annotations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS annotations (
            id TEXT PRIMARY KEY,
            image_id TEXT NOT NULL REFERENCES images(id),
            user_id TEXT NOT NULL REFERENCES users(id),
            assignment_id TEXT REFERENCES assignments(id),
            question TEXT,
            answer TEXT,
            is_approved INTEGER,
            is_reported INTEGER NOT NULL DEFAULT 0,
            pass_number INTEGER NOT NULL DEFAULT 1 CHECK (pass_number >= 1),
            annotated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_annotations_image ON annotations(image_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_annotations_assignment ON annotations(assignment_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_annotations_user ON annotations(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the live_annotations view
///
/// One row per assignment (or per image when unassigned): the latest by
/// `annotated_at`, ties broken by insertion order. `seq` exposes the rowid
/// for stable ordering by callers.
async fn create_live_annotations_view(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS live_annotations AS
        SELECT a.*, a.rowid AS seq
        FROM annotations a
        WHERE NOT EXISTS (
            SELECT 1 FROM annotations b
            WHERE COALESCE(b.assignment_id, 'image:' || b.image_id)
                = COALESCE(a.assignment_id, 'image:' || a.image_id)
              AND (b.annotated_at > a.annotated_at
                   OR (b.annotated_at = a.annotated_at AND b.rowid > a.rowid))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
