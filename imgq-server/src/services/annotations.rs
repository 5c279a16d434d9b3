//! Annotation store
//!
//! Persists annotate/reject/report actions under the mode's write policy.
//!
//! **Single-pool:** at most one live row per image. A submission replaces
//! every prior row for the image. Each submission bumps the image's
//! `annotation_count`, which doubles as the revision token: a caller that
//! passes the revision it saw loses with `Conflict` if anyone wrote first.
//!
//! **Multi-user:** rows are keyed to assignments. Resubmitting for an
//! assignment updates its row in place (pass number kept); the first
//! submission inserts with the next pass number. The assignment is marked
//! completed in the same transaction.

use imgq_common::time::{now, parse_storage, to_storage};
use imgq_common::uuid_utils::generate_id;
use imgq_common::{Annotation, Error, Identity, Mode, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::services::ledger::{complete_assignment, fetch_assignment};
use crate::utils::{retry_on_conflict, DEFAULT_MAX_ATTEMPTS};

/// What a submission records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Both fields trimmed and non-empty
    Approve { question: String, answer: String },
    Reject,
    Report,
}

impl Payload {
    /// Build an approval, rejecting blank fields
    pub fn approve(question: &str, answer: &str) -> Result<Self> {
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return Err(Error::InvalidPayload(
                "Question and answer must both be non-empty".to_string(),
            ));
        }
        Ok(Payload::Approve {
            question: question.to_string(),
            answer: answer.to_string(),
        })
    }

    /// Interpret the wire form of an annotate request.
    ///
    /// A non-blank question and answer make an approval (the rejection flag
    /// is then ignored); otherwise the request must be flagged as a
    /// rejection.
    pub fn from_submission(
        question: Option<&str>,
        answer: Option<&str>,
        is_rejected: bool,
    ) -> Result<Self> {
        let question = question.map(str::trim).filter(|q| !q.is_empty());
        let answer = answer.map(str::trim).filter(|a| !a.is_empty());

        match (question, answer) {
            (Some(q), Some(a)) => Self::approve(q, a),
            _ if is_rejected => Ok(Payload::Reject),
            _ => Err(Error::InvalidPayload(
                "Provide both question and answer, or mark the image as rejected".to_string(),
            )),
        }
    }

    fn columns(&self) -> (Option<&str>, Option<&str>, bool, bool) {
        match self {
            Payload::Approve { question, answer } => {
                (Some(question.as_str()), Some(answer.as_str()), true, false)
            }
            Payload::Reject => (None, None, false, false),
            Payload::Report => (None, None, false, true),
        }
    }
}

/// Which record a submission is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Single-pool: the image itself
    Image {
        image_id: String,
        /// Revision the caller saw; `None` only claims an unannotated image
        expected_revision: Option<i64>,
    },
    /// Multi-user: the caller's assignment
    Assignment {
        assignment_id: String,
        /// When given, must match the assignment's image
        image_id: Option<String>,
    },
}

/// Result of a submission
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub annotation: Annotation,
    /// False when an existing row was updated in place
    pub created: bool,
    /// The image's revision after the write
    pub revision: i64,
}

/// Client-facing view of an annotation
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub is_approved: Option<bool>,
    pub is_reported: bool,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub pass_number: i64,
    pub annotated_at: String,
}

impl From<&Annotation> for AnnotationSummary {
    fn from(annotation: &Annotation) -> Self {
        Self {
            is_approved: annotation.is_approved,
            is_reported: annotation.is_reported,
            question: annotation.question.clone(),
            answer: annotation.answer.clone(),
            pass_number: annotation.pass_number,
            annotated_at: to_storage(&annotation.annotated_at),
        }
    }
}

pub(crate) const ANNOTATION_COLUMNS: &str = "id, image_id, user_id, assignment_id, question, \
     answer, is_approved, is_reported, pass_number, annotated_at";

/// Decode an `annotations` (or `live_annotations`) row
pub(crate) fn annotation_from_row(row: &SqliteRow) -> Result<Annotation> {
    let annotated_at: String = row.try_get("annotated_at")?;
    let is_reported: Option<bool> = row.try_get("is_reported")?;

    Ok(Annotation {
        id: row.try_get("id")?,
        image_id: row.try_get("image_id")?,
        user_id: row.try_get("user_id")?,
        assignment_id: row.try_get("assignment_id")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        is_approved: row.try_get("is_approved")?,
        is_reported: is_reported.unwrap_or(false),
        pass_number: row.try_get("pass_number")?,
        annotated_at: parse_storage(&annotated_at, "annotations.annotated_at")?,
    })
}

async fn image_revision(conn: &mut SqliteConnection, image_id: &str) -> Result<i64> {
    let count: Option<i64> = sqlx::query_scalar("SELECT annotation_count FROM images WHERE id = ?")
        .bind(image_id)
        .fetch_optional(&mut *conn)
        .await?;
    count.ok_or_else(|| Error::NotFound(format!("Image {}", image_id)))
}

/// Annotation store service
#[derive(Clone)]
pub struct AnnotationStore {
    db: SqlitePool,
    mode: Mode,
}

impl AnnotationStore {
    pub fn new(db: SqlitePool, mode: Mode) -> Self {
        Self { db, mode }
    }

    /// Record a submission for `actor`
    pub async fn submit(
        &self,
        actor: &Identity,
        target: Target,
        payload: Payload,
    ) -> Result<SubmitOutcome> {
        let outcome = match (self.mode, &target) {
            (
                Mode::SinglePool,
                Target::Image {
                    image_id,
                    expected_revision,
                },
            ) => {
                retry_on_conflict("single-pool submit", DEFAULT_MAX_ATTEMPTS, || {
                    self.try_submit_image(actor, image_id, *expected_revision, &payload)
                })
                .await?
            }
            (
                Mode::MultiUser,
                Target::Assignment {
                    assignment_id,
                    image_id,
                },
            ) => {
                retry_on_conflict("assignment submit", DEFAULT_MAX_ATTEMPTS, || {
                    self.try_submit_assignment(actor, assignment_id, image_id.as_deref(), &payload)
                })
                .await?
            }
            (Mode::SinglePool, Target::Assignment { .. }) => {
                return Err(Error::InvalidPayload(
                    "Single-pool submissions target an image, not an assignment".to_string(),
                ))
            }
            (Mode::MultiUser, Target::Image { .. }) => {
                return Err(Error::InvalidPayload(
                    "Multi-user submissions must name an assignment".to_string(),
                ))
            }
        };

        info!(
            "User {} {} image {} (pass {})",
            actor.username,
            match payload {
                Payload::Approve { .. } => "approved",
                Payload::Reject => "rejected",
                Payload::Report => "reported",
            },
            outcome.annotation.image_id,
            outcome.annotation.pass_number
        );
        Ok(outcome)
    }

    async fn try_submit_image(
        &self,
        actor: &Identity,
        image_id: &str,
        expected_revision: Option<i64>,
        payload: &Payload,
    ) -> Result<SubmitOutcome> {
        let mut tx = self.db.begin().await?;

        let current = image_revision(&mut tx, image_id).await?;
        match expected_revision {
            Some(expected) if expected != current => {
                return Err(Error::Conflict(format!(
                    "Image {} changed since revision {} (now {})",
                    image_id, expected, current
                )));
            }
            Some(_) => {}
            // Without a revision the submission is a first claim; replacing
            // an existing annotation needs the revision it was served at.
            None => {
                let annotated: bool =
                    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM annotations WHERE image_id = ?)")
                        .bind(image_id)
                        .fetch_one(&mut *tx)
                        .await?;
                if annotated {
                    return Err(Error::Conflict(format!(
                        "Image {} is already annotated (revision {})",
                        image_id, current
                    )));
                }
            }
        }

        // Compare-and-swap on the counter guards against a writer slipping in
        // between the read above and this statement.
        let bumped = sqlx::query(
            "UPDATE images SET annotation_count = annotation_count + 1 WHERE id = ? AND annotation_count = ?",
        )
        .bind(image_id)
        .bind(current)
        .execute(&mut *tx)
        .await?;
        if bumped.rows_affected() == 0 {
            return Err(Error::Conflict(format!(
                "Image {} was annotated concurrently",
                image_id
            )));
        }

        let replaced = sqlx::query("DELETE FROM annotations WHERE image_id = ?")
            .bind(image_id)
            .execute(&mut *tx)
            .await?;
        if replaced.rows_affected() > 0 {
            debug!(
                "Replaced {} prior annotation rows for image {}",
                replaced.rows_affected(),
                image_id
            );
        }

        let annotation = insert_annotation(
            &mut tx,
            image_id,
            &actor.user_id,
            None,
            payload,
            current + 1,
        )
        .await?;

        tx.commit().await?;

        Ok(SubmitOutcome {
            annotation,
            created: true,
            revision: current + 1,
        })
    }

    async fn try_submit_assignment(
        &self,
        actor: &Identity,
        assignment_id: &str,
        image_id: Option<&str>,
        payload: &Payload,
    ) -> Result<SubmitOutcome> {
        let mut tx = self.db.begin().await?;

        let assignment = fetch_assignment(&mut tx, assignment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Assignment {}", assignment_id)))?;
        if assignment.user_id != actor.user_id {
            return Err(Error::Forbidden(format!(
                "Assignment {} belongs to another user",
                assignment_id
            )));
        }
        if let Some(claimed) = image_id {
            if claimed != assignment.image_id {
                return Err(Error::InvalidPayload(format!(
                    "Assignment {} is for image {}, not {}",
                    assignment_id, assignment.image_id, claimed
                )));
            }
        }

        let existing = sqlx::query(&format!(
            r#"
            SELECT {} FROM annotations
            WHERE assignment_id = ?
            ORDER BY annotated_at DESC, rowid DESC
            LIMIT 1
            "#,
            ANNOTATION_COLUMNS
        ))
        .bind(assignment_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (annotation, created, revision) = match existing {
            Some(row) => {
                let mut annotation = annotation_from_row(&row)?;
                let (question, answer, approved, reported) = payload.columns();
                let annotated_at = now();
                sqlx::query(
                    r#"
                    UPDATE annotations
                    SET question = ?, answer = ?, is_approved = ?, is_reported = ?, annotated_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(question)
                .bind(answer)
                .bind(approved)
                .bind(reported)
                .bind(to_storage(&annotated_at))
                .bind(&annotation.id)
                .execute(&mut *tx)
                .await?;

                annotation.question = question.map(str::to_string);
                annotation.answer = answer.map(str::to_string);
                annotation.is_approved = Some(approved);
                annotation.is_reported = reported;
                annotation.annotated_at = annotated_at;

                let revision = image_revision(&mut tx, &assignment.image_id).await?;
                (annotation, false, revision)
            }
            None => {
                let current = image_revision(&mut tx, &assignment.image_id).await?;
                let annotation = insert_annotation(
                    &mut tx,
                    &assignment.image_id,
                    &actor.user_id,
                    Some(assignment_id),
                    payload,
                    current + 1,
                )
                .await?;
                sqlx::query("UPDATE images SET annotation_count = annotation_count + 1 WHERE id = ?")
                    .bind(&assignment.image_id)
                    .execute(&mut *tx)
                    .await?;
                (annotation, true, current + 1)
            }
        };

        complete_assignment(&mut tx, assignment_id, &actor.user_id).await?;
        tx.commit().await?;

        Ok(SubmitOutcome {
            annotation,
            created,
            revision,
        })
    }

    /// Live annotation of an image, if any
    pub async fn live_for_image(&self, image_id: &str) -> Result<Option<Annotation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM live_annotations
            WHERE image_id = ?
            ORDER BY annotated_at DESC, seq DESC
            LIMIT 1
            "#,
            ANNOTATION_COLUMNS
        ))
        .bind(image_id)
        .fetch_optional(&self.db)
        .await?;
        row.as_ref().map(annotation_from_row).transpose()
    }

    /// Every stored row for an image, oldest first (history included)
    pub async fn history_for_image(&self, image_id: &str) -> Result<Vec<Annotation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM annotations WHERE image_id = ? ORDER BY annotated_at, rowid",
            ANNOTATION_COLUMNS
        ))
        .bind(image_id)
        .fetch_all(&self.db)
        .await?;
        rows.iter().map(annotation_from_row).collect()
    }

    /// Remove superseded unassigned rows so each image keeps only its live one.
    ///
    /// Run at boot in single-pool mode; returns the number of rows removed.
    pub async fn compact_single_pool(&self) -> Result<u64> {
        let removed = sqlx::query(
            r#"
            DELETE FROM annotations
            WHERE assignment_id IS NULL
              AND id NOT IN (SELECT id FROM live_annotations WHERE assignment_id IS NULL)
            "#,
        )
        .execute(&self.db)
        .await?
        .rows_affected();

        if removed > 0 {
            info!("Compacted {} superseded annotation rows", removed);
        }
        Ok(removed)
    }
}

async fn insert_annotation(
    conn: &mut SqliteConnection,
    image_id: &str,
    user_id: &str,
    assignment_id: Option<&str>,
    payload: &Payload,
    pass_number: i64,
) -> Result<Annotation> {
    let (question, answer, approved, reported) = payload.columns();
    let annotation = Annotation {
        id: generate_id(),
        image_id: image_id.to_string(),
        user_id: user_id.to_string(),
        assignment_id: assignment_id.map(str::to_string),
        question: question.map(str::to_string),
        answer: answer.map(str::to_string),
        is_approved: Some(approved),
        is_reported: reported,
        pass_number,
        annotated_at: now(),
    };

    sqlx::query(
        r#"
        INSERT INTO annotations
            (id, image_id, user_id, assignment_id, question, answer,
             is_approved, is_reported, pass_number, annotated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&annotation.id)
    .bind(&annotation.image_id)
    .bind(&annotation.user_id)
    .bind(&annotation.assignment_id)
    .bind(&annotation.question)
    .bind(&annotation.answer)
    .bind(approved)
    .bind(reported)
    .bind(pass_number)
    .bind(to_storage(&annotation.annotated_at))
    .execute(&mut *conn)
    .await
    .map_err(|e| Error::from_write(e, "Annotation"))?;

    Ok(annotation)
}
