use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a snake_case string enum stored as TEXT and sent as a JSON string.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a meeting request.
    MeetingStatus, "meeting status" {
        Pending => "pending",
        Scheduled => "scheduled",
        Cancelled => "cancelled",
    }
);

text_enum!(
    ParticipantRole, "participant role" {
        Organizer => "organizer",
        Attendee => "attendee",
        Optional => "optional",
    }
);

text_enum!(
    ResponseStatus, "response status" {
        Pending => "pending",
        Responded => "responded",
        Declined => "declined",
    }
);

text_enum!(
    /// How much a participant likes a slot they marked available.
    Preference, "preference" {
        Preferred => "preferred",
        Neutral => "neutral",
        IfNeeded => "if_needed",
    }
);

text_enum!(
    NotificationType, "notification type" {
        Invite => "invite",
        Reminder => "reminder",
        Confirmation => "confirmation",
        Cancellation => "cancellation",
        Update => "update",
    }
);

text_enum!(
    NotificationStatus, "notification status" {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
        Bounced => "bounced",
    }
);

impl MeetingStatus {
    /// Whether an organizer may move a meeting from `self` to `next`.
    ///
    /// Cancellation is terminal and a scheduled meeting never falls back to
    /// pending. Re-asserting the current status is always accepted.
    pub fn can_transition_to(self, next: MeetingStatus) -> bool {
        use MeetingStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled) | (Pending, Cancelled) | (Scheduled, Cancelled)
        ) || self == next
    }
}

impl Default for ParticipantRole {
    fn default() -> Self {
        ParticipantRole::Attendee
    }
}

impl Default for Preference {
    fn default() -> Self {
        Preference::Neutral
    }
}

// ============================================================================
// Meeting requests
// ============================================================================

/// Meeting length as sent by the add-in: either minutes or a label like "1h".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Minutes(u64),
    Label(String),
}

impl fmt::Display for DurationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationValue::Minutes(m) => write!(f, "{m}"),
            DurationValue::Label(l) => f.write_str(l),
        }
    }
}

/// A window the organizer would like the meeting to fall into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub date: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupParticipant {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantGroup {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

/// Body of `POST /meetings`. Every field is optional on the wire so missing
/// ones can be reported with a single validation message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMeetingRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub duration: Option<DurationValue>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub time_ranges: Option<Vec<TimeRange>>,
    #[serde(default)]
    pub groups: Option<Vec<ParticipantGroup>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeetingRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: String,
    pub organizer_id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub time_zone: String,
    pub preferred_times: Vec<TimeRange>,
    pub participant_emails: Vec<String>,
    pub status: MeetingStatus,
    pub scheduled_time: Option<String>,
    pub meeting_link: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingCreated {
    pub meeting: Meeting,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingEnvelope {
    pub meeting: Meeting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingList {
    pub meetings: Vec<Meeting>,
}

// ============================================================================
// Participants
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<ParticipantRole>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddParticipantsRequest {
    #[serde(default)]
    pub participants: Vec<NewParticipant>,
}

/// A participant as seen by the organizer right after the invite was created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub meeting_request_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: ParticipantRole,
    pub invite_token: String,
    pub response_status: ResponseStatus,
    pub last_reminder_sent: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsCreated {
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub role: ParticipantRole,
    pub response_status: ResponseStatus,
    pub last_reminder_sent: Option<String>,
    pub created_at: String,
    pub response_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantList {
    pub participants: Vec<ParticipantSummary>,
}

// ============================================================================
// Availability responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotVote {
    pub time_slot_start: DateTime<Utc>,
    pub time_slot_end: DateTime<Utc>,
    pub is_available: bool,
    #[serde(default)]
    pub preference: Option<Preference>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitResponseRequest {
    #[serde(default)]
    pub availability: Vec<SlotVote>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub id: String,
    pub participant_id: String,
    pub time_slot_start: String,
    pub time_slot_end: String,
    pub is_available: bool,
    pub preference: Preference,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub email: String,
    pub display_name: Option<String>,
    pub response_status: ResponseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingView {
    pub title: String,
    pub description: Option<String>,
    pub duration: String,
    pub time_zone: String,
    pub preferred_times: Vec<TimeRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizerView {
    pub display_name: Option<String>,
    pub email: String,
}

/// Everything the public response page needs for one invite token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseForm {
    pub participant: ParticipantView,
    pub meeting: MeetingView,
    pub organizer: OrganizerView,
    pub existing_responses: Vec<Availability>,
}

// ============================================================================
// Analytics
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingAnalytics {
    pub meeting_request_id: String,
    pub total_participants: i64,
    pub responded_participants: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: ResponseStatus,
    pub count: i64,
}

/// Tally of every vote cast for one exact `(start, end)` slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapSlot {
    pub start: String,
    pub end: String,
    pub available: u32,
    pub unavailable: u32,
    pub preferred: u32,
    pub neutral: u32,
    pub if_needed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub analytics: Option<MeetingAnalytics>,
    pub response_breakdown: Vec<StatusCount>,
    pub availability_heatmap: Vec<HeatmapSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReceipt {
    pub message: String,
    pub reminder_count: usize,
}
