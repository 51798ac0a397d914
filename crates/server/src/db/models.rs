use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use shared::{
    AuthUser, Availability, Meeting, MeetingAnalytics, MeetingView, OrganizerView, Participant,
    ParticipantSummary, ParticipantView, ResponseForm, StatusCount,
};
use sqlx::FromRow;

/// Timestamp written to `created_at`/`updated_at` columns.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Canonical text form of an instant: UTC, `Z` suffix, sub-second digits only
/// when present. Equal instants always produce equal strings.
pub fn canonical_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Chronological sort key for a stored `(start, end)` slot. Canonical text
/// does not sort chronologically once fractional seconds appear
/// (`09:00:00.5Z` < `09:00:00Z`).
pub fn slot_order(start: &str, end: &str) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let parse = |text: &str| {
        DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|instant| instant.with_timezone(&Utc))
    };
    (parse(start), parse(end))
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub time_zone: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserRow {
    pub fn to_auth_user(&self) -> AuthUser {
        AuthUser {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            time_zone: self.time_zone.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Profile fields refreshed on every sign-in.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCalendarConnection {
    pub user_id: String,
    pub provider: String,
    pub provider_user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MeetingRow {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub time_zone: String,
    pub preferred_times: String,
    pub participant_emails: String,
    pub status: String,
    pub scheduled_time: Option<String>,
    pub meeting_link: Option<String>,
    pub metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<MeetingRow> for Meeting {
    type Error = anyhow::Error;

    fn try_from(row: MeetingRow) -> Result<Self> {
        Ok(Meeting {
            preferred_times: serde_json::from_str(&row.preferred_times)
                .with_context(|| format!("meeting {} has unreadable preferred_times", row.id))?,
            participant_emails: serde_json::from_str(&row.participant_emails)
                .with_context(|| format!("meeting {} has unreadable participant_emails", row.id))?,
            status: row.status.parse()?,
            metadata: match row.metadata.as_deref() {
                Some(raw) => serde_json::from_str(raw)
                    .with_context(|| format!("meeting {} has unreadable metadata", row.id))?,
                None => serde_json::Value::Null,
            },
            id: row.id,
            organizer_id: row.organizer_id,
            title: row.title,
            description: row.description,
            duration: row.duration,
            time_zone: row.time_zone,
            scheduled_time: row.scheduled_time,
            meeting_link: row.meeting_link,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantRow {
    pub id: String,
    pub meeting_request_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub invite_token: String,
    pub response_status: String,
    pub last_reminder_sent: Option<String>,
    pub created_at: String,
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantRow) -> Result<Self> {
        Ok(Participant {
            role: row.role.parse()?,
            response_status: row.response_status.parse()?,
            id: row.id,
            meeting_request_id: row.meeting_request_id,
            email: row.email,
            display_name: row.display_name,
            invite_token: row.invite_token,
            last_reminder_sent: row.last_reminder_sent,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantSummaryRow {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
    pub response_status: String,
    pub last_reminder_sent: Option<String>,
    pub created_at: String,
    pub response_count: i64,
}

impl TryFrom<ParticipantSummaryRow> for ParticipantSummary {
    type Error = anyhow::Error;

    fn try_from(row: ParticipantSummaryRow) -> Result<Self> {
        Ok(ParticipantSummary {
            role: row.role.parse()?,
            response_status: row.response_status.parse()?,
            id: row.id,
            email: row.email,
            display_name: row.display_name,
            last_reminder_sent: row.last_reminder_sent,
            created_at: row.created_at,
            response_count: row.response_count,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AvailabilityRow {
    pub id: String,
    pub participant_id: String,
    pub time_slot_start: String,
    pub time_slot_end: String,
    pub is_available: bool,
    pub preference: String,
    pub comment: Option<String>,
    pub created_at: String,
}

impl TryFrom<AvailabilityRow> for Availability {
    type Error = anyhow::Error;

    fn try_from(row: AvailabilityRow) -> Result<Self> {
        Ok(Availability {
            preference: row.preference.parse()?,
            id: row.id,
            participant_id: row.participant_id,
            time_slot_start: row.time_slot_start,
            time_slot_end: row.time_slot_end,
            is_available: row.is_available,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

/// Joined participant, meeting and organizer columns behind a response form.
#[derive(Debug, Clone, FromRow)]
pub struct ResponseFormRow {
    pub participant_id: String,
    pub participant_email: String,
    pub participant_display_name: Option<String>,
    pub response_status: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub time_zone: String,
    pub preferred_times: String,
    pub organizer_display_name: Option<String>,
    pub organizer_email: String,
}

impl ResponseFormRow {
    pub fn into_form(self, responses: Vec<AvailabilityRow>) -> Result<ResponseForm> {
        Ok(ResponseForm {
            participant: ParticipantView {
                email: self.participant_email,
                display_name: self.participant_display_name,
                response_status: self.response_status.parse()?,
            },
            meeting: MeetingView {
                preferred_times: serde_json::from_str(&self.preferred_times)
                    .context("response form has unreadable preferred_times")?,
                title: self.title,
                description: self.description,
                duration: self.duration,
                time_zone: self.time_zone,
            },
            organizer: OrganizerView {
                display_name: self.organizer_display_name,
                email: self.organizer_email,
            },
            existing_responses: {
                let mut existing = responses
                    .into_iter()
                    .map(Availability::try_from)
                    .collect::<Result<Vec<_>>>()?;
                existing.sort_by_cached_key(|a| slot_order(&a.time_slot_start, &a.time_slot_end));
                existing
            },
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AnalyticsRow {
    pub meeting_request_id: String,
    pub total_participants: i64,
    pub responded_participants: i64,
    pub updated_at: String,
}

impl From<AnalyticsRow> for MeetingAnalytics {
    fn from(row: AnalyticsRow) -> Self {
        MeetingAnalytics {
            meeting_request_id: row.meeting_request_id,
            total_participants: row.total_participants,
            responded_participants: row.responded_participants,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StatusCountRow {
    pub status: String,
    pub count: i64,
}

impl TryFrom<StatusCountRow> for StatusCount {
    type Error = anyhow::Error;

    fn try_from(row: StatusCountRow) -> Result<Self> {
        Ok(StatusCount {
            status: row.status.parse()?,
            count: row.count,
        })
    }
}

/// One availability vote as needed for the heatmap.
#[derive(Debug, Clone, FromRow)]
pub struct VoteRow {
    pub time_slot_start: String,
    pub time_slot_end: String,
    pub is_available: bool,
    pub preference: String,
}

/// Outcome of a response submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub participant_id: String,
    pub meeting_request_id: String,
    pub responded_participants: i64,
}
