//! Assignment ledger
//!
//! Decides what a user works on next and tracks assignment state.
//!
//! **Single-pool:** an image is available while it has no annotation rows;
//! the next item is drawn uniformly at random from the available set.
//!
//! **Multi-user:** an administrator distributes unassigned images into
//! per-user queues (`bulk_assign`); a user's next item is their earliest
//! pending assignment.

use imgq_common::time::{now, parse_storage, parse_storage_opt, to_storage};
use imgq_common::uuid_utils::generate_id;
use imgq_common::{Assignment, AssignmentStatus, Error, Image, Mode, Result};
use rand::Rng;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::services::catalog::ImageCatalog;
use crate::utils::{retry_on_conflict, DEFAULT_MAX_ATTEMPTS};

/// A resolved unit of work
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub image: Image,
    /// Present in multi-user mode
    pub assignment: Option<Assignment>,
}

/// Outcome of asking for the next unit of work
#[derive(Debug, Clone)]
pub enum NextWork {
    Item(Box<WorkItem>),
    /// Nothing left for this caller; a normal outcome, not an error
    AllComplete,
}

const ASSIGNMENT_COLUMNS: &str = "id, user_id, image_id, status, assigned_at, completed_at";

fn assignment_from_row(row: &SqliteRow) -> Result<Assignment> {
    let status: String = row.try_get("status")?;
    let assigned_at: String = row.try_get("assigned_at")?;

    Ok(Assignment {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        image_id: row.try_get("image_id")?,
        status: status.parse()?,
        assigned_at: parse_storage(&assigned_at, "assignments.assigned_at")?,
        completed_at: parse_storage_opt(row.try_get("completed_at")?, "assignments.completed_at")?,
    })
}

/// Pick a uniformly random index into a candidate list
pub fn pick_index<R: Rng + ?Sized>(rng: &mut R, len: usize) -> Option<usize> {
    if len == 0 {
        None
    } else {
        Some(rng.gen_range(0..len))
    }
}

/// Load an assignment inside an open transaction
pub(crate) async fn fetch_assignment(
    conn: &mut SqliteConnection,
    assignment_id: &str,
) -> Result<Option<Assignment>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM assignments WHERE id = ?",
        ASSIGNMENT_COLUMNS
    ))
    .bind(assignment_id)
    .fetch_optional(&mut *conn)
    .await?;
    row.as_ref().map(assignment_from_row).transpose()
}

/// Mark an assignment completed inside an open transaction.
///
/// Completing an already completed assignment re-stamps `completed_at`.
pub(crate) async fn complete_assignment(
    conn: &mut SqliteConnection,
    assignment_id: &str,
    user_id: &str,
) -> Result<Assignment> {
    let mut assignment = fetch_assignment(conn, assignment_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Assignment {}", assignment_id)))?;

    if assignment.user_id != user_id {
        return Err(Error::Forbidden(format!(
            "Assignment {} belongs to another user",
            assignment_id
        )));
    }

    let completed_at = now();
    sqlx::query("UPDATE assignments SET status = 'completed', completed_at = ? WHERE id = ?")
        .bind(to_storage(&completed_at))
        .bind(assignment_id)
        .execute(&mut *conn)
        .await?;

    assignment.status = AssignmentStatus::Completed;
    assignment.completed_at = Some(completed_at);
    Ok(assignment)
}

/// Assignment ledger service
#[derive(Clone)]
pub struct AssignmentLedger {
    db: SqlitePool,
    mode: Mode,
}

impl AssignmentLedger {
    pub fn new(db: SqlitePool, mode: Mode) -> Self {
        Self { db, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Resolve the next unit of work for `user_id`
    pub async fn next_work_item<R>(&self, user_id: &str, rng: &mut R) -> Result<NextWork>
    where
        R: Rng + Send + ?Sized,
    {
        match self.mode {
            Mode::SinglePool => self.next_from_pool(rng).await,
            Mode::MultiUser => self.next_from_queue(user_id).await,
        }
    }

    async fn next_from_pool<R>(&self, rng: &mut R) -> Result<NextWork>
    where
        R: Rng + Send + ?Sized,
    {
        let candidates = self.unannotated_image_ids().await?;
        let Some(index) = pick_index(rng, candidates.len()) else {
            return Ok(NextWork::AllComplete);
        };

        let image = ImageCatalog::new(self.db.clone())
            .get(&candidates[index])
            .await?;
        debug!(
            "Picked image {} from {} unannotated",
            image.id,
            candidates.len()
        );

        Ok(NextWork::Item(Box::new(WorkItem {
            image,
            assignment: None,
        })))
    }

    async fn next_from_queue(&self, user_id: &str) -> Result<NextWork> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM assignments
            WHERE user_id = ? AND status = 'pending'
            ORDER BY assigned_at, rowid
            LIMIT 1
            "#,
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            return Ok(NextWork::AllComplete);
        };
        let assignment = assignment_from_row(&row)?;
        let image = ImageCatalog::new(self.db.clone())
            .get(&assignment.image_id)
            .await?;

        Ok(NextWork::Item(Box::new(WorkItem {
            image,
            assignment: Some(assignment),
        })))
    }

    /// Ids of images with zero annotation rows, in catalog order
    pub async fn unannotated_image_ids(&self) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT i.id FROM images i
            WHERE NOT EXISTS (SELECT 1 FROM annotations a WHERE a.image_id = i.id)
            ORDER BY i.id
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(ids)
    }

    /// Queue up to `count` never-assigned images for `user_id`.
    ///
    /// Images are taken in catalog order. The selection and inserts run in
    /// one transaction; when it loses the writer lock to a concurrent
    /// distribution it is re-run, so two concurrent calls never hand out the
    /// same image. Returns the number of assignments created.
    pub async fn bulk_assign(&self, user_id: &str, count: i64) -> Result<usize> {
        if self.mode != Mode::MultiUser {
            return Err(Error::InvalidPayload(
                "Bulk assignment is only available in multi-user mode".to_string(),
            ));
        }
        if count < 0 {
            return Err(Error::InvalidPayload(format!(
                "Assignment count must not be negative (got {})",
                count
            )));
        }

        let created = retry_on_conflict("bulk assign", DEFAULT_MAX_ATTEMPTS, || {
            self.try_bulk_assign(user_id, count)
        })
        .await?;

        info!("Assigned {} images to user {}", created, user_id);
        Ok(created)
    }

    async fn try_bulk_assign(&self, user_id: &str, count: i64) -> Result<usize> {
        let mut tx = self.db.begin().await?;

        let user_exists: Option<String> = sqlx::query_scalar("SELECT id FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user_exists.is_none() {
            return Err(Error::NotFound(format!("User {}", user_id)));
        }

        let image_ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT i.id FROM images i
            WHERE NOT EXISTS (SELECT 1 FROM assignments a WHERE a.image_id = i.id)
            ORDER BY i.id
            LIMIT ?
            "#,
        )
        .bind(count)
        .fetch_all(&mut *tx)
        .await?;

        let assigned_at = to_storage(&now());
        for image_id in &image_ids {
            sqlx::query(
                r#"
                INSERT INTO assignments (id, user_id, image_id, status, assigned_at)
                VALUES (?, ?, ?, 'pending', ?)
                "#,
            )
            .bind(generate_id())
            .bind(user_id)
            .bind(image_id)
            .bind(&assigned_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from_write(e, &format!("Assignment for image {}", image_id)))?;
        }

        tx.commit().await?;
        Ok(image_ids.len())
    }

    /// Mark an assignment completed on behalf of `user_id`
    pub async fn complete(&self, assignment_id: &str, user_id: &str) -> Result<Assignment> {
        let mut tx = self.db.begin().await?;
        let assignment = complete_assignment(&mut tx, assignment_id, user_id).await?;
        tx.commit().await?;
        Ok(assignment)
    }

    /// Look up an assignment, failing with `NotFound`
    pub async fn get(&self, assignment_id: &str) -> Result<Assignment> {
        let mut conn = self.db.acquire().await?;
        fetch_assignment(&mut conn, assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Assignment {}", assignment_id)))
    }

    /// The assignment holding an image, if any
    pub async fn find_for_image(&self, image_id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE image_id = ?",
            ASSIGNMENT_COLUMNS
        ))
        .bind(image_id)
        .fetch_optional(&self.db)
        .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    /// All assignments of a user, in queue order
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE user_id = ? ORDER BY assigned_at, rowid",
            ASSIGNMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(assignment_from_row).collect()
    }
}
