use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{EnrollmentDetails, EnrollmentResponse},
    middleware::LearnerContext,
    models::Enrollment,
    AppState,
};

/// Enroll the learner in a course. Payment follows as a separate step.
pub async fn create_enrollment(
    State(state): State<AppState>,
    learner: LearnerContext,
    Path(course_id): Path<String>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), AppError> {
    let course = state
        .store
        .get_course(&course_id)
        .await?
        .filter(|course| course.is_active)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Course not found")))?;

    let enrollment = Enrollment::new_pending(&learner.learner_id, &course.id);
    state.store.create_enrollment(enrollment.clone()).await?;

    tracing::info!(
        enrollment_id = %enrollment.id,
        course_id = %course.id,
        learner_id = %learner.learner_id,
        "Enrollment created"
    );

    Ok((StatusCode::CREATED, Json(enrollment.into())))
}

pub async fn get_enrollment(
    State(state): State<AppState>,
    learner: LearnerContext,
    Path(enrollment_id): Path<String>,
) -> Result<Json<EnrollmentDetails>, AppError> {
    let enrollment = state
        .store
        .get_enrollment_for_learner(&enrollment_id, &learner.learner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Enrollment not found")))?;

    let latest_payment = state
        .store
        .latest_payment_for_enrollment(&enrollment.id)
        .await?;

    Ok(Json(EnrollmentDetails {
        enrollment: enrollment.into(),
        latest_payment: latest_payment.map(Into::into),
    }))
}
