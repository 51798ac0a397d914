use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

mod meetings;
mod models;

pub use models::*;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        display_name TEXT,
        first_name TEXT,
        last_name TEXT,
        time_zone TEXT DEFAULT 'UTC',
        avatar_url TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS calendar_connections (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider TEXT NOT NULL,
        provider_user_id TEXT NOT NULL,
        email TEXT NOT NULL,
        display_name TEXT,
        access_token TEXT NOT NULL,
        refresh_token TEXT,
        token_expires_at TEXT,
        scope TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_sync_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (user_id, provider, provider_user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meeting_requests (
        id TEXT PRIMARY KEY,
        organizer_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        description TEXT,
        duration TEXT NOT NULL,
        time_zone TEXT NOT NULL,
        preferred_times TEXT NOT NULL,
        participant_emails TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        scheduled_time TEXT,
        meeting_link TEXT,
        metadata TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS meeting_requests_organizer_idx ON meeting_requests (organizer_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS meeting_participants (
        id TEXT PRIMARY KEY,
        meeting_request_id TEXT NOT NULL REFERENCES meeting_requests(id) ON DELETE CASCADE,
        email TEXT NOT NULL,
        display_name TEXT,
        role TEXT NOT NULL DEFAULT 'attendee',
        invite_token TEXT UNIQUE NOT NULL,
        response_status TEXT NOT NULL DEFAULT 'pending',
        last_reminder_sent TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS meeting_participants_meeting_idx ON meeting_participants (meeting_request_id)",
    r#"
    CREATE TABLE IF NOT EXISTS participant_availability (
        id TEXT PRIMARY KEY,
        participant_id TEXT NOT NULL REFERENCES meeting_participants(id) ON DELETE CASCADE,
        time_slot_start TEXT NOT NULL,
        time_slot_end TEXT NOT NULL,
        is_available INTEGER NOT NULL,
        preference TEXT NOT NULL DEFAULT 'neutral',
        comment TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (participant_id, time_slot_start, time_slot_end)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_notifications (
        id TEXT PRIMARY KEY,
        meeting_request_id TEXT NOT NULL REFERENCES meeting_requests(id) ON DELETE CASCADE,
        participant_id TEXT REFERENCES meeting_participants(id) ON DELETE CASCADE,
        recipient_email TEXT NOT NULL,
        email_type TEXT NOT NULL,
        subject TEXT NOT NULL,
        body_text TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        sent_at TEXT,
        error_message TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meeting_analytics (
        meeting_request_id TEXT PRIMARY KEY REFERENCES meeting_requests(id) ON DELETE CASCADE,
        total_participants INTEGER NOT NULL DEFAULT 0,
        responded_participants INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const USER_COLUMNS: &str =
    "id, email, display_name, first_name, last_name, time_zone, avatar_url";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(path: &str) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database; a single connection keeps it alive.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        tracing::info!("Database migrations completed");
        Ok(())
    }

    // User operations

    /// Find the user by email, creating it on first sign-in, and refresh the
    /// profile fields either way.
    pub async fn upsert_user(&self, profile: &UserProfile) -> Result<UserRow> {
        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO users (id, email, display_name, first_name, last_name, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                display_name = excluded.display_name,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                avatar_url = excluded.avatar_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.avatar_url)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        let user = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = ?"
        ))
        .bind(&profile.email)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        let user = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    // Calendar connection operations
    pub async fn upsert_calendar_connection(&self, conn: &NewCalendarConnection) -> Result<()> {
        let now = now_timestamp();
        sqlx::query(
            r#"
            INSERT INTO calendar_connections (
                id, user_id, provider, provider_user_id, email, display_name,
                access_token, refresh_token, token_expires_at, scope, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, provider, provider_user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_expires_at = excluded.token_expires_at,
                scope = excluded.scope,
                is_active = 1,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&conn.user_id)
        .bind(&conn.provider)
        .bind(&conn.provider_user_id)
        .bind(&conn.email)
        .bind(&conn.display_name)
        .bind(&conn.access_token)
        .bind(&conn.refresh_token)
        .bind(&conn.token_expires_at)
        .bind(&conn.scope)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
