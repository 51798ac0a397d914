//! Meeting request lifecycle: input validation, invite tokens, status
//! transitions and availability submissions.

use rand::{rngs::OsRng, RngCore};
use shared::{
    AddParticipantsRequest, CreateMeetingRequest, MeetingStatus, ParticipantRole, Preference,
    SubmitResponseRequest, TimeRange, UpdateMeetingRequest,
};
use std::collections::BTreeMap;

use crate::db::canonical_instant;
use crate::error::AppError;

pub mod analytics;

/// Bytes of randomness behind each invite token (hex encoded to 64 chars).
const INVITE_TOKEN_BYTES: usize = 32;

/// A validated meeting request ready to be stored.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub time_zone: String,
    pub preferred_times: Vec<TimeRange>,
    pub participant_emails: Vec<String>,
    pub metadata: serde_json::Value,
}

impl TryFrom<CreateMeetingRequest> for NewMeeting {
    type Error = AppError;

    fn try_from(req: CreateMeetingRequest) -> Result<Self, AppError> {
        let title = req.title.as_deref().map(str::trim).unwrap_or_default();
        let timezone = req.timezone.as_deref().map(str::trim).unwrap_or_default();
        let duration = req.duration.as_ref().map(|d| d.to_string()).unwrap_or_default();

        let (Some(time_ranges), Some(groups)) = (&req.time_ranges, &req.groups) else {
            return Err(missing_fields());
        };
        if title.is_empty() || timezone.is_empty() || duration.trim().is_empty() {
            return Err(missing_fields());
        }
        if time_ranges.is_empty() {
            return Err(AppError::BadRequest(
                "At least one preferred time range is required".to_string(),
            ));
        }

        let participant_emails: Vec<String> = groups
            .iter()
            .flat_map(|group| &group.participants)
            .filter_map(|p| p.email.as_deref().map(str::trim))
            .filter(|email| !email.is_empty())
            .map(String::from)
            .collect();

        if participant_emails.is_empty() {
            return Err(AppError::BadRequest(
                "At least one participant email is required".to_string(),
            ));
        }

        let description = req
            .description
            .clone()
            .or_else(|| req.location.clone())
            .filter(|d| !d.trim().is_empty());

        Ok(NewMeeting {
            title: title.to_string(),
            description,
            duration: duration.trim().to_string(),
            time_zone: timezone.to_string(),
            preferred_times: time_ranges.clone(),
            participant_emails,
            metadata: serde_json::json!({
                "groups": groups,
                "createdFrom": "office-addin",
            }),
        })
    }
}

fn missing_fields() -> AppError {
    AppError::BadRequest(
        "Missing required fields: title, duration, timezone, timeRanges, groups".to_string(),
    )
}

/// Changes an organizer asked for on an existing meeting.
#[derive(Debug, Clone, Default)]
pub struct MeetingChanges {
    pub status: Option<MeetingStatus>,
    pub scheduled_time: Option<String>,
    pub meeting_link: Option<String>,
}

impl TryFrom<UpdateMeetingRequest> for MeetingChanges {
    type Error = AppError;

    fn try_from(req: UpdateMeetingRequest) -> Result<Self, AppError> {
        let status = match req.status.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<MeetingStatus>().map_err(|_| {
                AppError::BadRequest(
                    "Invalid status. Must be: pending, scheduled, or cancelled".to_string(),
                )
            })?),
        };

        Ok(MeetingChanges {
            status,
            scheduled_time: req.scheduled_time.as_ref().map(canonical_instant),
            meeting_link: req.meeting_link.filter(|link| !link.trim().is_empty()),
        })
    }
}

impl MeetingChanges {
    /// Status the meeting ends up in, or an error if the move is not allowed.
    pub fn next_status(&self, current: MeetingStatus) -> Result<MeetingStatus, AppError> {
        let next = self.status.unwrap_or(current);
        if current.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::BadRequest(format!(
                "Cannot change meeting status from {current} to {next}"
            )))
        }
    }
}

/// A participant row about to be inserted, invite token already minted.
#[derive(Debug, Clone)]
pub struct NewParticipantRecord {
    pub email: String,
    pub display_name: Option<String>,
    pub role: ParticipantRole,
    pub invite_token: String,
}

pub fn prepare_participants(
    req: AddParticipantsRequest,
) -> Result<Vec<NewParticipantRecord>, AppError> {
    if req.participants.is_empty() {
        return Err(AppError::BadRequest(
            "At least one participant is required".to_string(),
        ));
    }

    req.participants
        .into_iter()
        .map(|p| {
            let email = p.email.trim().to_string();
            if email.is_empty() {
                return Err(AppError::BadRequest(
                    "Every participant needs an email".to_string(),
                ));
            }
            Ok(NewParticipantRecord {
                email,
                display_name: p.display_name.filter(|n| !n.trim().is_empty()),
                role: p.role.unwrap_or_default(),
                invite_token: generate_invite_token(),
            })
        })
        .collect()
}

/// 256 bits from the OS RNG, hex encoded.
pub fn generate_invite_token() -> String {
    let mut bytes = [0u8; INVITE_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One availability vote with canonical slot boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityEntry {
    pub time_slot_start: String,
    pub time_slot_end: String,
    pub is_available: bool,
    pub preference: Preference,
    pub comment: Option<String>,
}

/// Validate a submission and collapse it to one vote per slot (last wins).
pub fn prepare_availability(
    req: SubmitResponseRequest,
) -> Result<Vec<AvailabilityEntry>, AppError> {
    let mut slots: BTreeMap<(String, String), AvailabilityEntry> = BTreeMap::new();

    for vote in req.availability {
        if vote.time_slot_end <= vote.time_slot_start {
            return Err(AppError::BadRequest(format!(
                "Time slot ending {} does not end after it starts",
                vote.time_slot_end
            )));
        }

        let entry = AvailabilityEntry {
            time_slot_start: canonical_instant(&vote.time_slot_start),
            time_slot_end: canonical_instant(&vote.time_slot_end),
            is_available: vote.is_available,
            preference: vote.preference.unwrap_or_default(),
            comment: vote.comment.or_else(|| req.comment.clone()),
        };
        slots.insert(
            (entry.time_slot_start.clone(), entry.time_slot_end.clone()),
            entry,
        );
    }

    Ok(slots.into_values().collect())
}

/// Subject and body of a reminder for a meeting titled `title`.
pub fn reminder_text(title: &str) -> (String, String) {
    (
        format!("Reminder: Please respond to \"{title}\" meeting request"),
        format!("This is a reminder to respond to the meeting request for \"{title}\"."),
    )
}
