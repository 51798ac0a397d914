//! Public response endpoints. The invite token in the path is the only
//! credential.

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;
use shared::{ApiResponse, MessageBody, ResponseForm, SubmitResponseRequest};

use crate::{error::AppError, meetings::prepare_availability, state::AppState};

fn invalid_invite() -> AppError {
    AppError::NotFound("Invalid or expired invitation".to_string())
}

/// GET /api/response/:token
pub async fn response_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<ResponseForm>>, AppError> {
    let (form, responses) = state
        .db
        .response_form(&token)
        .await?
        .ok_or_else(invalid_invite)?;

    Ok(Json(ApiResponse::ok(form.into_form(responses)?)))
}

/// POST /api/response/:token
pub async fn submit_response(
    State(state): State<AppState>,
    Path(token): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<SubmitResponseRequest>, AppError>,
) -> Result<Json<ApiResponse<MessageBody>>, AppError> {
    if !state.db.invite_exists(&token).await? {
        return Err(invalid_invite());
    }
    let entries = prepare_availability(req)?;

    let submission = state
        .db
        .submit_availability(&token, &entries)
        .await?
        .ok_or_else(invalid_invite)?;

    tracing::info!(
        "Participant {} answered {} slots for meeting {} ({} responded)",
        submission.participant_id,
        entries.len(),
        submission.meeting_request_id,
        submission.responded_participants
    );
    Ok(Json(ApiResponse::ok(MessageBody::new(
        "Response submitted successfully",
    ))))
}
