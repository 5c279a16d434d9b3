//! Progress aggregation, leaderboard, exports and the recent-activity feed
//!
//! Read-only queries over `live_annotations`. Missing tables (a database
//! that was never initialized) degrade to zero-valued results rather than
//! errors.

use imgq_common::time::parse_storage;
use imgq_common::{Error, Image, Result};
use serde::Serialize;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::warn;

use crate::services::annotations::{annotation_from_row, AnnotationSummary};
use crate::services::catalog::{display_source, image_from_row};

/// Feed size ceiling
pub const MAX_FEED_LIMIT: i64 = 500;

/// Percentage of `done` over `total`, rounded to one decimal, in [0, 100]
pub fn progress_percentage(done: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let pct = (done as f64 / total as f64 * 1000.0).round() / 10.0;
    pct.clamp(0.0, 100.0)
}

/// Catalog-wide progress
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct GlobalProgress {
    pub total_images: i64,
    pub approved: i64,
    /// Rejected and not reported
    pub rejected: i64,
    pub reported: i64,
    pub processed: i64,
    pub remaining: i64,
    pub progress_percentage: f64,
}

/// One user's queue progress (multi-user)
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct UserProgress {
    pub user_id: String,
    pub assigned: i64,
    pub completed: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub reported: i64,
    pub progress_percentage: f64,
}

/// Per-annotator row of the admin breakdown
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserBreakdown {
    pub user_id: String,
    pub username: String,
    pub assigned: i64,
    pub completed: i64,
    pub pending: i64,
    /// Live approvals
    pub submitted: i64,
    pub rejected: i64,
    pub reported: i64,
    pub progress_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub approved: i64,
    pub completed: i64,
}

/// Export filter on live annotation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Approved,
    /// Rejected and not reported
    Rejected,
    Reported,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFilter::Approved => "approved",
            StatusFilter::Rejected => "rejected",
            StatusFilter::Reported => "reported",
        }
    }

    fn predicate(&self) -> &'static str {
        match self {
            StatusFilter::Approved => "l.is_approved = 1",
            StatusFilter::Rejected => "l.is_approved = 0 AND COALESCE(l.is_reported, 0) = 0",
            StatusFilter::Reported => "l.is_reported = 1",
        }
    }
}

impl FromStr for StatusFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "approved" => Ok(StatusFilter::Approved),
            "rejected" => Ok(StatusFilter::Rejected),
            "reported" => Ok(StatusFilter::Reported),
            other => Err(Error::InvalidPayload(format!("Unknown status filter: {}", other))),
        }
    }
}

/// One live annotation joined with its image and author
#[derive(Debug, Clone, Serialize)]
pub struct ExportRow {
    pub annotation_id: String,
    pub image_id: String,
    pub source: String,
    pub image: String,
    pub image_url: Option<String>,
    pub metadata: Value,
    pub user_id: String,
    pub username: String,
    pub assignment_id: Option<String>,
    #[serde(flatten)]
    pub annotation: AnnotationSummary,
}

/// One catalog image with its live annotation (if any)
#[derive(Debug, Clone, Serialize)]
pub struct CatalogExportRow {
    pub image_id: String,
    pub source: String,
    pub image: String,
    pub image_url: Option<String>,
    pub metadata: Value,
    pub annotation_count: i64,
    pub annotation: Option<AnnotationSummary>,
}

/// Recent-activity feed entry
#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub image_id: String,
    pub source: String,
    pub image: String,
    pub metadata: Value,
    pub user_id: String,
    pub annotation: AnnotationSummary,
}

/// Turn a missing-table failure into the zero value
fn degrade<T: Default>(result: Result<T>, what: &str) -> Result<T> {
    match result {
        Err(e) if e.is_missing_table() => {
            warn!("{} unavailable, reporting zeros: {}", what, e);
            Ok(T::default())
        }
        other => other,
    }
}

/// Aggregation service
#[derive(Clone)]
pub struct Aggregator {
    db: SqlitePool,
}

impl Aggregator {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Catalog-wide progress
    pub async fn global_progress(&self) -> Result<GlobalProgress> {
        degrade(self.query_global_progress().await, "Global progress")
    }

    async fn query_global_progress(&self) -> Result<GlobalProgress> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM images) AS total_images,
                (SELECT COUNT(DISTINCT image_id) FROM live_annotations
                    WHERE is_approved = 1) AS approved,
                (SELECT COUNT(DISTINCT image_id) FROM live_annotations
                    WHERE is_approved = 0 AND COALESCE(is_reported, 0) = 0) AS rejected,
                (SELECT COUNT(DISTINCT image_id) FROM live_annotations
                    WHERE is_reported = 1) AS reported,
                (SELECT COUNT(DISTINCT image_id) FROM live_annotations) AS processed
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let total_images: i64 = row.try_get("total_images")?;
        let processed: i64 = row.try_get("processed")?;

        Ok(GlobalProgress {
            total_images,
            approved: row.try_get("approved")?,
            rejected: row.try_get("rejected")?,
            reported: row.try_get("reported")?,
            processed,
            remaining: (total_images - processed).max(0),
            progress_percentage: progress_percentage(processed, total_images),
        })
    }

    /// Progress of one user's queue
    pub async fn user_progress(&self, user_id: &str) -> Result<UserProgress> {
        let progress = degrade(self.query_user_progress(user_id).await, "User progress")?;
        Ok(UserProgress {
            user_id: user_id.to_string(),
            ..progress
        })
    }

    async fn query_user_progress(&self, user_id: &str) -> Result<UserProgress> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM assignments WHERE user_id = ?1) AS assigned,
                (SELECT COUNT(*) FROM assignments
                    WHERE user_id = ?1 AND status = 'completed') AS completed,
                (SELECT COUNT(*) FROM live_annotations
                    WHERE user_id = ?1 AND is_approved = 1) AS approved,
                (SELECT COUNT(*) FROM live_annotations
                    WHERE user_id = ?1 AND is_approved = 0 AND COALESCE(is_reported, 0) = 0) AS rejected,
                (SELECT COUNT(*) FROM live_annotations
                    WHERE user_id = ?1 AND is_reported = 1) AS reported
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let assigned: i64 = row.try_get("assigned")?;
        let completed: i64 = row.try_get("completed")?;

        Ok(UserProgress {
            user_id: user_id.to_string(),
            assigned,
            completed,
            pending: assigned - completed,
            approved: row.try_get("approved")?,
            rejected: row.try_get("rejected")?,
            reported: row.try_get("reported")?,
            progress_percentage: progress_percentage(completed, assigned),
        })
    }

    /// Per-annotator breakdown, in account creation order
    pub async fn per_user_breakdown(&self) -> Result<Vec<UserBreakdown>> {
        degrade(self.query_breakdown().await, "User breakdown")
    }

    async fn query_breakdown(&self) -> Result<Vec<UserBreakdown>> {
        let rows = sqlx::query(
            r#"
            SELECT
                u.id AS user_id,
                u.username,
                (SELECT COUNT(*) FROM assignments a WHERE a.user_id = u.id) AS assigned,
                (SELECT COUNT(*) FROM assignments a
                    WHERE a.user_id = u.id AND a.status = 'completed') AS completed,
                (SELECT COUNT(*) FROM live_annotations l
                    WHERE l.user_id = u.id AND l.is_approved = 1) AS submitted,
                (SELECT COUNT(*) FROM live_annotations l
                    WHERE l.user_id = u.id AND l.is_approved = 0
                      AND COALESCE(l.is_reported, 0) = 0) AS rejected,
                (SELECT COUNT(*) FROM live_annotations l
                    WHERE l.user_id = u.id AND l.is_reported = 1) AS reported
            FROM users u
            WHERE u.role = 'annotator'
            ORDER BY u.created_at, u.rowid
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let assigned: i64 = row.try_get("assigned")?;
                let completed: i64 = row.try_get("completed")?;
                Ok(UserBreakdown {
                    user_id: row.try_get("user_id")?,
                    username: row.try_get("username")?,
                    assigned,
                    completed,
                    pending: assigned - completed,
                    submitted: row.try_get("submitted")?,
                    rejected: row.try_get("rejected")?,
                    reported: row.try_get("reported")?,
                    progress_percentage: progress_percentage(completed, assigned),
                })
            })
            .collect()
    }

    /// Annotators ranked by live approvals.
    ///
    /// The sort is stable, so ties keep account creation order.
    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        let mut users = self.per_user_breakdown().await?;
        users.sort_by(|a, b| b.submitted.cmp(&a.submitted));

        Ok(users
            .into_iter()
            .enumerate()
            .map(|(idx, user)| LeaderboardEntry {
                rank: idx + 1,
                user_id: user.user_id,
                username: user.username,
                approved: user.submitted,
                completed: user.completed,
            })
            .collect())
    }

    /// Live annotations matching the filters, ordered by image id
    pub async fn export_filtered(
        &self,
        status: Option<StatusFilter>,
        user_id: Option<&str>,
    ) -> Result<Vec<ExportRow>> {
        degrade(self.query_export(status, user_id).await, "Export")
    }

    async fn query_export(
        &self,
        status: Option<StatusFilter>,
        user_id: Option<&str>,
    ) -> Result<Vec<ExportRow>> {
        let status_clause = status
            .map(|s| format!("AND {}", s.predicate()))
            .unwrap_or_default();
        let sql = format!(
            r#"
            SELECT
                l.id, l.image_id, l.user_id, l.assignment_id, l.question, l.answer,
                l.is_approved, l.is_reported, l.pass_number, l.annotated_at,
                i.source, i.image_path, i.image_url, i.original_meta,
                i.annotation_count, i.created_at,
                u.username
            FROM live_annotations l
            JOIN images i ON i.id = l.image_id
            JOIN users u ON u.id = l.user_id
            WHERE (?1 IS NULL OR l.user_id = ?1) {}
            ORDER BY l.image_id, l.seq
            "#,
            status_clause
        );

        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.db).await?;

        rows.iter()
            .map(|row| {
                let annotation = annotation_from_row(row)?;
                let image = image_from_row_aliased(row, &annotation.image_id)?;
                Ok(ExportRow {
                    annotation_id: annotation.id.clone(),
                    image_id: annotation.image_id.clone(),
                    source: image.source.clone(),
                    image: display_source(&image).href(),
                    image_url: image.image_url.clone(),
                    metadata: image.metadata.clone(),
                    user_id: annotation.user_id.clone(),
                    username: row.try_get("username")?,
                    assignment_id: annotation.assignment_id.clone(),
                    annotation: AnnotationSummary::from(&annotation),
                })
            })
            .collect()
    }

    /// Every catalog image with its live annotation, ordered by image id
    pub async fn export_catalog(&self) -> Result<Vec<CatalogExportRow>> {
        degrade(self.query_catalog_export().await, "Catalog export")
    }

    async fn query_catalog_export(&self) -> Result<Vec<CatalogExportRow>> {
        let image_rows = sqlx::query(
            "SELECT id, source, image_path, image_url, original_meta, annotation_count, created_at \
             FROM images ORDER BY id",
        )
        .fetch_all(&self.db)
        .await?;

        // Latest live row per image
        let live_rows = sqlx::query(
            r#"
            SELECT l.id, l.image_id, l.user_id, l.assignment_id, l.question, l.answer,
                   l.is_approved, l.is_reported, l.pass_number, l.annotated_at
            FROM live_annotations l
            ORDER BY l.image_id, l.annotated_at, l.seq
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut latest = std::collections::HashMap::new();
        for row in &live_rows {
            let annotation = annotation_from_row(row)?;
            latest.insert(annotation.image_id.clone(), annotation);
        }

        image_rows
            .iter()
            .map(|row| {
                let image = image_from_row(row)?;
                let annotation = latest.get(&image.id).map(AnnotationSummary::from);
                Ok(CatalogExportRow {
                    image: display_source(&image).href(),
                    image_id: image.id,
                    source: image.source,
                    image_url: image.image_url,
                    metadata: image.metadata,
                    annotation_count: image.annotation_count,
                    annotation,
                })
            })
            .collect()
    }

    /// Newest live annotations first, optionally limited to one author
    pub async fn recent_feed(&self, user_id: Option<&str>, limit: i64) -> Result<Vec<FeedItem>> {
        let limit = limit.clamp(1, MAX_FEED_LIMIT);
        degrade(self.query_feed(user_id, limit).await, "Recent feed")
    }

    async fn query_feed(&self, user_id: Option<&str>, limit: i64) -> Result<Vec<FeedItem>> {
        let rows = sqlx::query(
            r#"
            SELECT
                l.id, l.image_id, l.user_id, l.assignment_id, l.question, l.answer,
                l.is_approved, l.is_reported, l.pass_number, l.annotated_at,
                i.source, i.image_path, i.image_url, i.original_meta,
                i.annotation_count, i.created_at
            FROM live_annotations l
            JOIN images i ON i.id = l.image_id
            WHERE (?1 IS NULL OR l.user_id = ?1)
            ORDER BY l.annotated_at DESC, l.seq DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                let annotation = annotation_from_row(row)?;
                let image = image_from_row_aliased(row, &annotation.image_id)?;
                Ok(FeedItem {
                    image: display_source(&image).href(),
                    image_id: image.id,
                    source: image.source,
                    metadata: image.metadata,
                    user_id: annotation.user_id.clone(),
                    annotation: AnnotationSummary::from(&annotation),
                })
            })
            .collect()
    }
}

/// Decode the image half of a joined row whose `id` column is the annotation's
fn image_from_row_aliased(row: &SqliteRow, image_id: &str) -> Result<Image> {
    let raw_meta: String = row.try_get("original_meta")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(Image {
        id: image_id.to_string(),
        source: row.try_get("source")?,
        image_path: row.try_get("image_path")?,
        image_url: row.try_get("image_url")?,
        metadata: serde_json::from_str(&raw_meta).unwrap_or(Value::String(raw_meta)),
        annotation_count: row.try_get("annotation_count")?,
        created_at: parse_storage(&created_at, "images.created_at")?,
    })
}
