use anyhow::Result;
use shared::{MeetingStatus, NotificationStatus, NotificationType, ResponseStatus};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{
    now_timestamp, AnalyticsRow, AvailabilityRow, Database, MeetingRow, ParticipantRow,
    ParticipantSummaryRow, ResponseFormRow, StatusCountRow, Submission, VoteRow,
};
use crate::meetings::{AvailabilityEntry, MeetingChanges, NewMeeting, NewParticipantRecord};

const MEETING_COLUMNS: &str = "id, organizer_id, title, description, duration, time_zone, \
     preferred_times, participant_emails, status, scheduled_time, meeting_link, metadata, \
     created_at, updated_at";

const AVAILABILITY_COLUMNS: &str = "id, participant_id, time_slot_start, time_slot_end, \
     is_available, preference, comment, created_at";

/// Recount participants for a meeting and upsert its analytics row.
async fn refresh_analytics(conn: &mut SqliteConnection, meeting_id: &str) -> Result<()> {
    let now = now_timestamp();
    sqlx::query(
        r#"
        INSERT INTO meeting_analytics (
            meeting_request_id, total_participants, responded_participants, created_at, updated_at
        )
        VALUES (
            ?,
            (SELECT COUNT(*) FROM meeting_participants WHERE meeting_request_id = ?),
            (SELECT COUNT(*) FROM meeting_participants
                WHERE meeting_request_id = ? AND response_status = ?),
            ?,
            ?
        )
        ON CONFLICT(meeting_request_id) DO UPDATE SET
            total_participants = excluded.total_participants,
            responded_participants = excluded.responded_participants,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(meeting_id)
    .bind(meeting_id)
    .bind(meeting_id)
    .bind(ResponseStatus::Responded.as_str())
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Database {
    // Meeting request operations
    pub async fn create_meeting(&self, organizer_id: &str, meeting: &NewMeeting) -> Result<MeetingRow> {
        let id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        sqlx::query(
            r#"
            INSERT INTO meeting_requests (
                id, organizer_id, title, description, duration, time_zone,
                preferred_times, participant_emails, status, metadata, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(organizer_id)
        .bind(&meeting.title)
        .bind(&meeting.description)
        .bind(&meeting.duration)
        .bind(&meeting.time_zone)
        .bind(serde_json::to_string(&meeting.preferred_times)?)
        .bind(serde_json::to_string(&meeting.participant_emails)?)
        .bind(MeetingStatus::Pending.as_str())
        .bind(serde_json::to_string(&meeting.metadata)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_meeting(&id, organizer_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("meeting {id} vanished right after insert"))
    }

    /// The organizer's meetings, newest first.
    pub async fn list_meetings(
        &self,
        organizer_id: &str,
        status: Option<MeetingStatus>,
    ) -> Result<Vec<MeetingRow>> {
        let meetings = match status {
            Some(status) => {
                sqlx::query_as::<_, MeetingRow>(&format!(
                    "SELECT {MEETING_COLUMNS} FROM meeting_requests \
                     WHERE organizer_id = ? AND status = ? \
                     ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(organizer_id)
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MeetingRow>(&format!(
                    "SELECT {MEETING_COLUMNS} FROM meeting_requests \
                     WHERE organizer_id = ? \
                     ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(organizer_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(meetings)
    }

    /// A meeting as long as it belongs to `organizer_id`.
    pub async fn get_meeting(&self, id: &str, organizer_id: &str) -> Result<Option<MeetingRow>> {
        let meeting = sqlx::query_as::<_, MeetingRow>(&format!(
            "SELECT {MEETING_COLUMNS} FROM meeting_requests WHERE id = ? AND organizer_id = ?"
        ))
        .bind(id)
        .bind(organizer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(meeting)
    }

    /// Apply `changes` if the meeting is still in `expected` status.
    /// Returns false when the row was missing or its status moved on.
    pub async fn update_meeting(
        &self,
        id: &str,
        organizer_id: &str,
        expected: MeetingStatus,
        next: MeetingStatus,
        changes: &MeetingChanges,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE meeting_requests SET
                status = ?,
                scheduled_time = COALESCE(?, scheduled_time),
                meeting_link = COALESCE(?, meeting_link),
                updated_at = ?
            WHERE id = ? AND organizer_id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(&changes.scheduled_time)
        .bind(&changes.meeting_link)
        .bind(now_timestamp())
        .bind(id)
        .bind(organizer_id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_meeting(&self, id: &str, organizer_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM meeting_requests WHERE id = ? AND organizer_id = ?")
            .bind(id)
            .bind(organizer_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Participant operations

    /// Insert a batch of participants and refresh the meeting's counters.
    pub async fn add_participants(
        &self,
        meeting_id: &str,
        participants: &[NewParticipantRecord],
    ) -> Result<Vec<ParticipantRow>> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;
        let mut rows = Vec::with_capacity(participants.len());

        for p in participants {
            let row = ParticipantRow {
                id: Uuid::new_v4().to_string(),
                meeting_request_id: meeting_id.to_string(),
                email: p.email.clone(),
                display_name: p.display_name.clone(),
                role: p.role.as_str().to_string(),
                invite_token: p.invite_token.clone(),
                response_status: ResponseStatus::Pending.as_str().to_string(),
                last_reminder_sent: None,
                created_at: now.clone(),
            };

            sqlx::query(
                r#"
                INSERT INTO meeting_participants (
                    id, meeting_request_id, email, display_name, role, invite_token,
                    response_status, created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.meeting_request_id)
            .bind(&row.email)
            .bind(&row.display_name)
            .bind(&row.role)
            .bind(&row.invite_token)
            .bind(&row.response_status)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            rows.push(row);
        }

        refresh_analytics(&mut *tx, meeting_id).await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Participants with how many slots each has answered, oldest first.
    pub async fn list_participants(&self, meeting_id: &str) -> Result<Vec<ParticipantSummaryRow>> {
        let participants = sqlx::query_as::<_, ParticipantSummaryRow>(
            r#"
            SELECT p.id, p.email, p.display_name, p.role, p.response_status,
                   p.last_reminder_sent, p.created_at, COUNT(a.id) AS response_count
            FROM meeting_participants p
            LEFT JOIN participant_availability a ON a.participant_id = p.id
            WHERE p.meeting_request_id = ?
            GROUP BY p.id
            ORDER BY p.created_at, p.rowid
            "#,
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    // Response operations

    /// Replace a participant's availability, mark them responded and refresh
    /// the meeting's counters, all in one transaction. `None` if the token is
    /// unknown.
    ///
    /// The first statement is the status write, so the transaction holds the
    /// write lock before it reads anything.
    pub async fn submit_availability(
        &self,
        invite_token: &str,
        entries: &[AvailabilityEntry],
    ) -> Result<Option<Submission>> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        let Some((participant_id, meeting_id)) = sqlx::query_as::<_, (String, String)>(
            r#"
            UPDATE meeting_participants SET response_status = ?, updated_at = ?
            WHERE invite_token = ?
            RETURNING id, meeting_request_id
            "#,
        )
        .bind(ResponseStatus::Responded.as_str())
        .bind(&now)
        .bind(invite_token)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM participant_availability WHERE participant_id = ?")
            .bind(&participant_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO participant_availability (
                    id, participant_id, time_slot_start, time_slot_end,
                    is_available, preference, comment, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&participant_id)
            .bind(&entry.time_slot_start)
            .bind(&entry.time_slot_end)
            .bind(entry.is_available)
            .bind(entry.preference.as_str())
            .bind(&entry.comment)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        refresh_analytics(&mut *tx, &meeting_id).await?;

        let responded_participants: i64 = sqlx::query_scalar(
            "SELECT responded_participants FROM meeting_analytics WHERE meeting_request_id = ?",
        )
        .bind(&meeting_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(Submission {
            participant_id,
            meeting_request_id: meeting_id,
            responded_participants,
        }))
    }

    /// Participant, meeting, organizer and prior answers behind an invite
    /// token, read from a single snapshot.
    pub async fn response_form(
        &self,
        invite_token: &str,
    ) -> Result<Option<(ResponseFormRow, Vec<AvailabilityRow>)>> {
        let mut tx = self.pool.begin().await?;

        let Some(form) = sqlx::query_as::<_, ResponseFormRow>(
            r#"
            SELECT p.id AS participant_id,
                   p.email AS participant_email,
                   p.display_name AS participant_display_name,
                   p.response_status,
                   m.title, m.description, m.duration, m.time_zone, m.preferred_times,
                   u.display_name AS organizer_display_name,
                   u.email AS organizer_email
            FROM meeting_participants p
            JOIN meeting_requests m ON m.id = p.meeting_request_id
            JOIN users u ON u.id = m.organizer_id
            WHERE p.invite_token = ?
            "#,
        )
        .bind(invite_token)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let responses = sqlx::query_as::<_, AvailabilityRow>(&format!(
            "SELECT {AVAILABILITY_COLUMNS} FROM participant_availability \
             WHERE participant_id = ? ORDER BY time_slot_start, time_slot_end"
        ))
        .bind(&form.participant_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((form, responses)))
    }

    // Analytics operations
    pub async fn get_analytics(&self, meeting_id: &str) -> Result<Option<AnalyticsRow>> {
        let analytics = sqlx::query_as::<_, AnalyticsRow>(
            "SELECT meeting_request_id, total_participants, responded_participants, updated_at \
             FROM meeting_analytics WHERE meeting_request_id = ?",
        )
        .bind(meeting_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(analytics)
    }

    pub async fn response_breakdown(&self, meeting_id: &str) -> Result<Vec<StatusCountRow>> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            "SELECT response_status AS status, COUNT(*) AS count FROM meeting_participants \
             WHERE meeting_request_id = ? GROUP BY response_status ORDER BY response_status",
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Every availability vote cast by any participant of the meeting.
    pub async fn meeting_votes(&self, meeting_id: &str) -> Result<Vec<VoteRow>> {
        let votes = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT a.time_slot_start, a.time_slot_end, a.is_available, a.preference
            FROM participant_availability a
            JOIN meeting_participants p ON p.id = a.participant_id
            WHERE p.meeting_request_id = ?
            "#,
        )
        .bind(meeting_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(votes)
    }

    // Notification operations

    /// Log a pending reminder for every participant who has not answered yet
    /// and stamp their reminder time. Returns how many were queued.
    pub async fn queue_reminders(&self, meeting_id: &str, subject: &str, body: &str) -> Result<usize> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        // Stamping first takes the write lock before anything is read
        let pending = sqlx::query_as::<_, (String, String)>(
            r#"
            UPDATE meeting_participants SET last_reminder_sent = ?, updated_at = ?
            WHERE meeting_request_id = ? AND response_status = ?
            RETURNING id, email
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(meeting_id)
        .bind(ResponseStatus::Pending.as_str())
        .fetch_all(&mut *tx)
        .await?;

        for (participant_id, email) in &pending {
            sqlx::query(
                r#"
                INSERT INTO email_notifications (
                    id, meeting_request_id, participant_id, recipient_email,
                    email_type, subject, body_text, status, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(meeting_id)
            .bind(participant_id)
            .bind(email)
            .bind(NotificationType::Reminder.as_str())
            .bind(subject)
            .bind(body)
            .bind(NotificationStatus::Pending.as_str())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(pending.len())
    }

    /// Whether an invite token belongs to any participant.
    pub async fn invite_exists(&self, invite_token: &str) -> Result<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM meeting_participants WHERE invite_token = ?")
                .bind(invite_token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}
