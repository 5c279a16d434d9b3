//! Work item and submission endpoints
//!
//! GET /api/work, GET /api/images/:image_id, POST /api/annotate,
//! POST /api/report

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use imgq_common::{Annotation, Assignment, Identity, Image, Mode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::services::{display_source, AnnotationSummary, NextWork, Payload, SubmitOutcome, Target};
use crate::AppState;

/// An image as presented to an annotator
#[derive(Debug, Serialize)]
pub struct ImagePayload {
    pub id: String,
    pub source: String,
    /// Browser-usable link (remote URL or /media path)
    pub image: String,
    pub image_url: Option<String>,
    pub metadata: Value,
    /// Pass this back as `expected_revision` to detect concurrent writes
    pub revision: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    pub annotation: Option<AnnotationSummary>,
}

impl ImagePayload {
    fn new(image: &Image, assignment: Option<&Assignment>, annotation: Option<&Annotation>) -> Self {
        Self {
            id: image.id.clone(),
            source: image.source.clone(),
            image: display_source(image).href(),
            image_url: image.image_url.clone(),
            metadata: image.metadata.clone(),
            revision: image.annotation_count,
            assignment_id: assignment.map(|a| a.id.clone()),
            annotation: annotation.map(AnnotationSummary::from),
        }
    }
}

/// Response of GET /api/work
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WorkResponse {
    Item(ImagePayload),
    AllComplete { all_complete: bool, message: String },
}

/// GET /api/work
///
/// Next unit of work for the caller.
pub async fn get_work_item(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
) -> ApiResult<Json<WorkResponse>> {
    let mut rng = StdRng::from_entropy();
    let next = state
        .ledger()
        .next_work_item(&caller.user_id, &mut rng)
        .await?;

    match next {
        NextWork::AllComplete => Ok(Json(WorkResponse::AllComplete {
            all_complete: true,
            message: "All images have been annotated".to_string(),
        })),
        NextWork::Item(item) => {
            let annotation = state.store().live_for_image(&item.image.id).await?;
            Ok(Json(WorkResponse::Item(ImagePayload::new(
                &item.image,
                item.assignment.as_ref(),
                annotation.as_ref(),
            ))))
        }
    }
}

/// GET /api/images/:image_id
///
/// In multi-user mode an annotator may only open images in their own queue.
pub async fn get_image(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Path(image_id): Path<String>,
) -> ApiResult<Json<ImagePayload>> {
    let image = state.catalog().get(&image_id).await?;

    let assignment = match state.mode {
        Mode::SinglePool => None,
        Mode::MultiUser => {
            let assignment = state.ledger().find_for_image(&image_id).await?;
            if !caller.is_admin() {
                match &assignment {
                    Some(a) if a.user_id == caller.user_id => {}
                    _ => {
                        return Err(ApiError::Forbidden(format!(
                            "Image {} is not in your queue",
                            image_id
                        )))
                    }
                }
            }
            assignment
        }
    };

    let annotation = state.store().live_for_image(&image_id).await?;
    Ok(Json(ImagePayload::new(
        &image,
        assignment.as_ref(),
        annotation.as_ref(),
    )))
}

/// Body of POST /api/annotate
#[derive(Debug, Deserialize)]
pub struct AnnotateRequest {
    pub image_id: Option<String>,
    pub assignment_id: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    #[serde(default)]
    pub is_rejected: bool,
    pub expected_revision: Option<i64>,
}

/// Body of POST /api/report
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub image_id: Option<String>,
    pub assignment_id: Option<String>,
    pub expected_revision: Option<i64>,
}

/// Response of a successful submission
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: String,
    pub image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    pub revision: i64,
    pub created: bool,
    pub annotation: AnnotationSummary,
}

impl SubmitResponse {
    fn new(message: &str, outcome: SubmitOutcome) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            image_id: outcome.annotation.image_id.clone(),
            assignment_id: outcome.annotation.assignment_id.clone(),
            revision: outcome.revision,
            created: outcome.created,
            annotation: AnnotationSummary::from(&outcome.annotation),
        }
    }
}

/// Work out which record a submission addresses.
///
/// In multi-user mode a bare `image_id` resolves to the assignment holding
/// that image; ownership is checked by the store.
async fn resolve_target(
    state: &AppState,
    image_id: Option<String>,
    assignment_id: Option<String>,
    expected_revision: Option<i64>,
) -> ApiResult<Target> {
    match state.mode {
        Mode::SinglePool => {
            let image_id =
                image_id.ok_or_else(|| ApiError::BadRequest("Missing image_id".to_string()))?;
            Ok(Target::Image {
                image_id,
                expected_revision,
            })
        }
        Mode::MultiUser => match (assignment_id, image_id) {
            (Some(assignment_id), image_id) => Ok(Target::Assignment {
                assignment_id,
                image_id,
            }),
            (None, Some(image_id)) => {
                let assignment = state
                    .ledger()
                    .find_for_image(&image_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("No assignment holds image {}", image_id))
                    })?;
                Ok(Target::Assignment {
                    assignment_id: assignment.id,
                    image_id: Some(image_id),
                })
            }
            (None, None) => Err(ApiError::BadRequest("Missing assignment_id".to_string())),
        },
    }
}

/// POST /api/annotate
///
/// Approve (question and answer) or reject an image.
pub async fn submit_annotation(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(request): Json<AnnotateRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let payload = Payload::from_submission(
        request.question.as_deref(),
        request.answer.as_deref(),
        request.is_rejected,
    )?;
    let target = resolve_target(
        &state,
        request.image_id,
        request.assignment_id,
        request.expected_revision,
    )
    .await?;

    let message = match payload {
        Payload::Reject => "Image rejected",
        _ => "Annotation saved",
    };
    let outcome = state.store().submit(&caller, target, payload).await?;
    Ok(Json(SubmitResponse::new(message, outcome)))
}

/// POST /api/report
///
/// Flag an image as problematic.
pub async fn report_image(
    State(state): State<AppState>,
    Extension(caller): Extension<Identity>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let target = resolve_target(
        &state,
        request.image_id,
        request.assignment_id,
        request.expected_revision,
    )
    .await?;

    let outcome = state.store().submit(&caller, target, Payload::Report).await?;
    Ok(Json(SubmitResponse::new("Image reported successfully", outcome)))
}
