//! Organizer-facing meeting endpoints. Every handler requires a bearer token
//! and only ever sees meetings the caller organizes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use shared::{
    AddParticipantsRequest, AnalyticsReport, ApiResponse, CreateMeetingRequest, Meeting,
    MeetingAnalytics, MeetingCreated, MeetingEnvelope, MeetingList, MeetingStatus, MessageBody,
    Participant, ParticipantList, ParticipantSummary, ParticipantsCreated, ReminderReceipt,
    StatusCount, UpdateMeetingRequest,
};

use crate::{
    db::MeetingRow,
    error::AppError,
    meetings::{analytics::build_heatmap, prepare_participants, reminder_text, MeetingChanges, NewMeeting},
    routes::auth::authenticate,
    state::AppState,
};

async fn owned_meeting(state: &AppState, id: &str, organizer_id: &str) -> Result<MeetingRow, AppError> {
    state
        .db
        .get_meeting(id, organizer_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Meeting not found".to_string()))
}

/// POST /api/meetings
pub async fn create_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(req), _): WithRejection<Json<CreateMeetingRequest>, AppError>,
) -> Result<(StatusCode, Json<ApiResponse<MeetingCreated>>), AppError> {
    let user = authenticate(&state, &headers).await?;
    let new_meeting = NewMeeting::try_from(req)?;

    let row = state.db.create_meeting(&user.id, &new_meeting).await?;
    tracing::info!(
        "Meeting {} created by {} with {} invitees",
        row.id,
        user.email,
        new_meeting.participant_emails.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(MeetingCreated {
            meeting: Meeting::try_from(row)?,
            message: "Meeting request created successfully".to_string(),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
}

/// GET /api/meetings
pub async fn list_meetings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<MeetingList>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let status = match params.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<MeetingStatus>().map_err(|_| {
            AppError::BadRequest(format!("Invalid status filter: {raw}"))
        })?),
    };

    let meetings = state
        .db
        .list_meetings(&user.id, status)
        .await?
        .into_iter()
        .map(Meeting::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ApiResponse::ok(MeetingList { meetings })))
}

/// GET /api/meetings/:id
pub async fn get_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MeetingEnvelope>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let row = owned_meeting(&state, &id, &user.id).await?;
    Ok(Json(ApiResponse::ok(MeetingEnvelope {
        meeting: Meeting::try_from(row)?,
    })))
}

/// PUT /api/meetings/:id
pub async fn update_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateMeetingRequest>, AppError>,
) -> Result<Json<ApiResponse<MeetingEnvelope>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let changes = MeetingChanges::try_from(req)?;

    let current = Meeting::try_from(owned_meeting(&state, &id, &user.id).await?)?.status;
    let next = changes.next_status(current)?;

    let applied = state
        .db
        .update_meeting(&id, &user.id, current, next, &changes)
        .await?;
    if !applied {
        return Err(AppError::BadRequest(
            "Meeting changed while it was being updated, please retry".to_string(),
        ));
    }

    tracing::info!("Meeting {} updated ({} -> {})", id, current, next);
    let row = owned_meeting(&state, &id, &user.id).await?;
    Ok(Json(ApiResponse::ok(MeetingEnvelope {
        meeting: Meeting::try_from(row)?,
    })))
}

/// DELETE /api/meetings/:id
pub async fn delete_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<MessageBody>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    if !state.db.delete_meeting(&id, &user.id).await? {
        return Err(AppError::NotFound("Meeting not found".to_string()));
    }

    tracing::info!("Meeting {} deleted by {}", id, user.email);
    Ok(Json(ApiResponse::ok(MessageBody::new(
        "Meeting deleted successfully",
    ))))
}

/// POST /api/meetings/:id/participants
pub async fn add_participants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<AddParticipantsRequest>, AppError>,
) -> Result<(StatusCode, Json<ApiResponse<ParticipantsCreated>>), AppError> {
    let user = authenticate(&state, &headers).await?;
    let meeting = owned_meeting(&state, &id, &user.id).await?;
    let records = prepare_participants(req)?;

    let participants = state
        .db
        .add_participants(&meeting.id, &records)
        .await?
        .into_iter()
        .map(Participant::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    tracing::info!("Added {} participants to meeting {}", participants.len(), meeting.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(ParticipantsCreated { participants })),
    ))
}

/// GET /api/meetings/:id/participants
pub async fn list_participants(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ParticipantList>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let meeting = owned_meeting(&state, &id, &user.id).await?;

    let participants = state
        .db
        .list_participants(&meeting.id)
        .await?
        .into_iter()
        .map(ParticipantSummary::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(Json(ApiResponse::ok(ParticipantList { participants })))
}

/// GET /api/meetings/:id/analytics
pub async fn analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AnalyticsReport>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let meeting = owned_meeting(&state, &id, &user.id).await?;

    let analytics = state
        .db
        .get_analytics(&meeting.id)
        .await?
        .map(MeetingAnalytics::from);
    let response_breakdown = state
        .db
        .response_breakdown(&meeting.id)
        .await?
        .into_iter()
        .map(StatusCount::try_from)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let votes = state.db.meeting_votes(&meeting.id).await?;

    Ok(Json(ApiResponse::ok(AnalyticsReport {
        analytics,
        response_breakdown,
        availability_heatmap: build_heatmap(&votes),
    })))
}

/// POST /api/meetings/:id/send-reminders
///
/// Reminders are only logged as pending notifications; delivery happens
/// elsewhere.
pub async fn send_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ReminderReceipt>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let meeting = owned_meeting(&state, &id, &user.id).await?;

    let (subject, body) = reminder_text(&meeting.title);
    let reminder_count = state.db.queue_reminders(&meeting.id, &subject, &body).await?;

    tracing::info!("Queued {} reminders for meeting {}", reminder_count, meeting.id);
    Ok(Json(ApiResponse::ok(ReminderReceipt {
        message: format!("Reminders queued for {reminder_count} participants"),
        reminder_count,
    })))
}
