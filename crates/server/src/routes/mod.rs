use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use shared::ApiResponse;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{config::Config, error::AppError, state::AppState};

mod auth;
mod health;
mod meetings;
mod responses;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Origins accepted in every environment.
const LOCAL_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://localhost:3000",
    "http://localhost:8080",
    "https://localhost:8080",
];

/// Substrings that admit an origin in development (local dev servers,
/// tunnels and Outlook on the web).
const DEV_ORIGIN_HINTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "ngrok",
    "office.live.com",
    "outlook.live.com",
    "outlook.office365.com",
];

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let api = Router::new()
        // Auth routes
        .route("/auth/microsoft", get(auth::microsoft_authorize))
        .route("/auth/microsoft/callback", get(auth::microsoft_callback))
        .route("/auth/microsoft/profile", post(auth::profile_login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me))
        // Meeting routes
        .route(
            "/meetings",
            get(meetings::list_meetings).post(meetings::create_meeting),
        )
        .route(
            "/meetings/:id",
            get(meetings::get_meeting)
                .put(meetings::update_meeting)
                .delete(meetings::delete_meeting),
        )
        .route(
            "/meetings/:id/participants",
            get(meetings::list_participants).post(meetings::add_participants),
        )
        .route("/meetings/:id/analytics", get(meetings::analytics))
        .route("/meetings/:id/send-reminders", post(meetings::send_reminders))
        // Public invitee routes
        .route(
            "/response/:token",
            get(responses::response_form).post(responses::submit_response),
        );

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health::health_check))
        .nest("/api", api)
        .fallback(not_found)
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let mut allowed: Vec<String> = vec![config.server.frontend_url.clone()];
    allowed.extend(config.server.outlook_addin_url.clone());
    allowed.extend(config.server.cors_allowed_origins.iter().cloned());
    allowed.extend(LOCAL_ORIGINS.iter().map(|o| o.to_string()));
    let development = config.is_development();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let allowed_origin = origin
                .to_str()
                .map(|o| origin_allowed(o, &allowed, development))
                .unwrap_or(false);
            if !allowed_origin {
                tracing::warn!("CORS blocked origin: {:?}", origin);
            }
            allowed_origin
        }))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

fn origin_allowed(origin: &str, allowed: &[String], development: bool) -> bool {
    if development && DEV_ORIGIN_HINTS.iter().any(|hint| origin.contains(hint)) {
        return true;
    }
    allowed.iter().any(|a| a.trim_end_matches('/') == origin)
}

#[derive(Serialize)]
struct Banner {
    message: &'static str,
    version: &'static str,
}

async fn banner() -> Json<ApiResponse<Banner>> {
    Json(ApiResponse::ok(Banner {
        message: "WhatTime Outlook Add-in API",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

async fn not_found() -> AppError {
    AppError::NotFound("Endpoint not found".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let mut config = Config::default();
        config.auth.jwt_secret = "router-test-secret-that-is-long-enough".to_string();
        let db = Database::in_memory().await.unwrap();
        create_router(AppState::new(db, config).unwrap())
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Sign in through the profile endpoint; returns (access, refresh).
    async fn login(app: &Router, email: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/microsoft/profile",
            None,
            Some(json!({ "profile": { "email": email, "displayName": "Olga" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["data"]["accessToken"].as_str().unwrap().to_string(),
            body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    fn sync_meeting() -> Value {
        json!({
            "title": "Sync",
            "duration": 30,
            "timezone": "UTC",
            "timeRanges": [
                { "date": "2024-01-10", "startTime": "09:00", "endTime": "17:00" }
            ],
            "groups": [
                { "name": "Team", "participants": [{ "email": "a@x.com" }, { "email": " b@x.com " }] }
            ]
        })
    }

    async fn create_meeting(app: &Router, token: &str) -> String {
        let (status, body) =
            send(app, Method::POST, "/api/meetings", Some(token), Some(sync_meeting())).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["meeting"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn scheduling_round_trip() {
        let app = app().await;
        let (token, _) = login(&app, "o@x.com").await;

        let (status, body) =
            send(&app, Method::POST, "/api/meetings", Some(&token), Some(sync_meeting())).await;
        assert_eq!(status, StatusCode::CREATED);
        let meeting = &body["data"]["meeting"];
        assert_eq!(meeting["status"], "pending");
        assert_eq!(meeting["participantEmails"], json!(["a@x.com", "b@x.com"]));
        assert_eq!(meeting["duration"], "30");
        let id = meeting["id"].as_str().unwrap().to_string();

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/meetings/{id}/participants"),
            Some(&token),
            Some(json!({ "participants": [{ "email": "a@x.com" }, { "email": "b@x.com" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let participants = body["data"]["participants"].as_array().unwrap();
        assert_eq!(participants.len(), 2);
        let tokens: Vec<&str> = participants
            .iter()
            .map(|p| p["inviteToken"].as_str().unwrap())
            .collect();
        assert!(tokens.iter().all(|t| t.len() >= 64 && t.chars().all(|c| c.is_ascii_hexdigit())));
        assert_ne!(tokens[0], tokens[1]);

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/response/{}", tokens[0]),
            None,
            Some(json!({
                "availability": [{
                    "timeSlotStart": "2024-01-10T09:00:00Z",
                    "timeSlotEnd": "2024-01-10T09:30:00Z",
                    "isAvailable": true,
                    "preference": "preferred"
                }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/meetings/{id}/analytics"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = &body["data"];
        assert_eq!(report["analytics"]["totalParticipants"], 2);
        assert_eq!(report["analytics"]["respondedParticipants"], 1);
        assert_eq!(
            report["availabilityHeatmap"],
            json!([{
                "start": "2024-01-10T09:00:00Z",
                "end": "2024-01-10T09:30:00Z",
                "available": 1,
                "unavailable": 0,
                "preferred": 1,
                "neutral": 0,
                "ifNeeded": 0
            }])
        );

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/meetings/{id}/send-reminders"),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reminderCount"], 1);
        assert_eq!(body["data"]["message"], "Reminders queued for 1 participants");
    }

    #[tokio::test]
    async fn response_form_shows_previous_answers() {
        let app = app().await;
        let (token, _) = login(&app, "o@x.com").await;
        let id = create_meeting(&app, &token).await;

        let (_, body) = send(
            &app,
            Method::POST,
            &format!("/api/meetings/{id}/participants"),
            Some(&token),
            Some(json!({ "participants": [{ "email": "a@x.com", "displayName": "Ann" }] })),
        )
        .await;
        let invite = body["data"]["participants"][0]["inviteToken"]
            .as_str()
            .unwrap()
            .to_string();
        let uri = format!("/api/response/{invite}");

        let (status, body) = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["participant"]["responseStatus"], "pending");
        assert_eq!(body["data"]["meeting"]["title"], "Sync");
        assert_eq!(body["data"]["organizer"]["email"], "o@x.com");
        assert_eq!(body["data"]["existingResponses"], json!([]));

        // Offsets are normalised to UTC and the later duplicate wins
        let vote = |available: bool| {
            json!({
                "timeSlotStart": "2024-01-10T10:00:00+01:00",
                "timeSlotEnd": "2024-01-10T10:30:00+01:00",
                "isAvailable": available
            })
        };
        let (status, _) = send(
            &app,
            Method::POST,
            &uri,
            None,
            Some(json!({ "availability": [vote(true), vote(false)], "comment": "lunch" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, &uri, None, None).await;
        let responses = body["data"]["existingResponses"].as_array().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["timeSlotStart"], "2024-01-10T09:00:00Z");
        assert_eq!(responses[0]["isAvailable"], false);
        assert_eq!(responses[0]["preference"], "neutral");
        assert_eq!(responses[0]["comment"], "lunch");
        assert_eq!(body["data"]["participant"]["responseStatus"], "responded");
    }

    #[tokio::test]
    async fn unknown_invites_are_not_found_before_slots_are_checked() {
        let app = app().await;
        let inverted = json!({ "availability": [{
            "timeSlotStart": "2024-01-10T10:00:00Z",
            "timeSlotEnd": "2024-01-10T09:00:00Z",
            "isAvailable": true
        }] });

        let (status, body) = send(&app, Method::GET, "/api/response/deadbeef", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/response/deadbeef",
            None,
            Some(json!({ "availability": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/response/deadbeef",
            None,
            Some(inverted.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Invalid or expired invitation");

        // A real invite with a backwards slot is a validation error
        let (token, _) = login(&app, "o@x.com").await;
        let id = create_meeting(&app, &token).await;
        let (_, body) = send(
            &app,
            Method::POST,
            &format!("/api/meetings/{id}/participants"),
            Some(&token),
            Some(json!({ "participants": [{ "email": "a@x.com" }] })),
        )
        .await;
        let invite = body["data"]["participants"][0]["inviteToken"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/response/{invite}"),
            None,
            Some(inverted),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn meetings_require_a_valid_bearer_token() {
        let app = app().await;

        let (status, body) = send(&app, Method::GET, "/api/meetings", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Access token required");

        let (status, _) = send(&app, Method::GET, "/api/meetings", Some("not-a-jwt"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (_, refresh) = login(&app, "o@x.com").await;
        let (status, _) = send(&app, Method::GET, "/api/meetings", Some(&refresh), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn meetings_are_private_to_their_organizer() {
        let app = app().await;
        let (owner, _) = login(&app, "o@x.com").await;
        let (other, _) = login(&app, "s@x.com").await;
        let id = create_meeting(&app, &owner).await;

        let uri = format!("/api/meetings/{id}");
        let (status, body) = send(&app, Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Meeting not found");

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(&app, Method::GET, "/api/meetings", Some(&other), None).await;
        assert_eq!(body["data"]["meetings"], json!([]));

        let (status, _) = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &uri, Some(&owner), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_changes_follow_the_lifecycle() {
        let app = app().await;
        let (token, _) = login(&app, "o@x.com").await;
        let id = create_meeting(&app, &token).await;
        let uri = format!("/api/meetings/{id}");

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "status": "scheduled", "scheduledTime": "2024-01-10T09:00:00Z" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["meeting"]["status"], "scheduled");
        assert_eq!(body["data"]["meeting"]["scheduledTime"], "2024-01-10T09:00:00Z");

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "status": "pending" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            Some(&token),
            Some(json!({ "status": "archived" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/api/meetings?status=scheduled", Some(&token), None).await;
        assert_eq!(body["data"]["meetings"].as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::GET, "/api/meetings?status=bogus", Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_rejects_incomplete_requests() {
        let app = app().await;
        let (token, _) = login(&app, "o@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/meetings",
            Some(&token),
            Some(json!({ "title": "Sync" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let mut no_emails = sync_meeting();
        no_emails["groups"] = json!([{ "participants": [{ "email": "  " }] }]);
        let (status, _) =
            send(&app, Method::POST, "/api/meetings", Some(&token), Some(no_emails)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_issues_a_new_pair() {
        let app = app().await;
        let (access, refresh) = login(&app, "o@x.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": refresh })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let new_access = body["data"]["accessToken"].as_str().unwrap();

        let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(new_access), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], "o@x.com");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refreshToken": access })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::POST, "/api/auth/refresh", None, Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_login_requires_an_email() {
        let app = app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth/microsoft/profile",
            None,
            Some(json!({ "profile": { "displayName": "No Mail" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Profile with email is required");
    }

    #[tokio::test]
    async fn oauth_is_unavailable_without_configuration() {
        let app = app().await;
        let (status, _) = send(&app, Method::GET, "/api/auth/microsoft", None, None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn callback_without_code_redirects_with_error() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/microsoft/callback")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "https://localhost:3000/auth-callback.html?error=missing_code"
        );
    }

    #[tokio::test]
    async fn health_banner_and_unknown_paths() {
        let app = app().await;

        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["environment"], "development");

        let (status, body) = send(&app, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], "WhatTime Outlook Add-in API");

        let (status, body) = send(&app, Method::GET, "/api/nowhere", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "success": false, "error": "Endpoint not found" }));
    }

    #[test]
    fn cors_origins() {
        let allowed = vec!["https://addin.example.com/".to_string()];

        assert!(origin_allowed("https://addin.example.com", &allowed, false));
        assert!(!origin_allowed("https://evil.example.com", &allowed, false));
        assert!(!origin_allowed("https://abc.ngrok-free.app", &allowed, false));
        assert!(origin_allowed("https://abc.ngrok-free.app", &allowed, true));
        assert!(origin_allowed("https://outlook.office365.com", &allowed, true));
    }
}
