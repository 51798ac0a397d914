//! Sign-in, token refresh and current-user endpoints.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Redirect,
    Json,
};
use axum_extra::extract::WithRejection;
use reqwest::Url;
use serde::Deserialize;
use shared::{
    ApiResponse, AuthUrlResponse, CurrentUser, LoginResponse, ProfileLoginRequest, RefreshRequest,
    TokenPair,
};
use uuid::Uuid;

use crate::{
    auth::{extract_bearer, microsoft::MicrosoftClient, Audience, TokenSubject},
    db::{canonical_instant, NewCalendarConnection, UserProfile, UserRow},
    error::AppError,
    state::AppState,
};

const PROVIDER: &str = "microsoft";

/// Resolve the `Authorization: Bearer` access token to its user.
pub(crate) async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserRow, AppError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let token = extract_bearer(auth_header)
        .ok_or_else(|| AppError::AuthError("Access token required".to_string()))?;

    let claims = state.tokens.verify(token, Audience::Access)?;

    state
        .db
        .get_user_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

fn issue_pair(state: &AppState, user: &UserRow) -> Result<TokenPair, AppError> {
    let subject = TokenSubject {
        user_id: user.id.clone(),
        email: user.email.clone(),
    };
    Ok(TokenPair {
        access_token: state.tokens.issue_access_token(&subject)?,
        refresh_token: state.tokens.issue_refresh_token(&subject)?,
    })
}

fn microsoft_client(state: &AppState) -> Result<&MicrosoftClient, AppError> {
    state
        .microsoft
        .as_deref()
        .ok_or_else(|| AppError::Internal("Microsoft OAuth is not configured".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    pub state: Option<String>,
}

/// GET /api/auth/microsoft
pub async fn microsoft_authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Json<ApiResponse<AuthUrlResponse>>, AppError> {
    let client = microsoft_client(&state)?;
    let oauth_state = params
        .state
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let auth_url = client.authorize_url(&oauth_state)?;
    Ok(Json(ApiResponse::ok(AuthUrlResponse { auth_url })))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /api/auth/microsoft/callback
///
/// Always answers with a redirect to the add-in's callback page, carrying
/// either the access token or an error code.
pub async fn microsoft_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    let page = format!(
        "{}/auth-callback.html",
        state.config.server.frontend_url.trim_end_matches('/')
    );

    let outcome = if let Some(error) = params.error {
        tracing::warn!(
            "Microsoft sign-in failed: {} {}",
            error,
            params.error_description.as_deref().unwrap_or_default()
        );
        ("error", error)
    } else if let Some(code) = params.code {
        match complete_sign_in(&state, &code).await {
            Ok(token) => ("token", token),
            Err(e) => {
                tracing::error!("OAuth callback failed (state {:?}): {}", params.state, e);
                ("error", "callback_failed".to_string())
            }
        }
    } else {
        ("error", "missing_code".to_string())
    };

    let target = Url::parse_with_params(&page, &[(outcome.0, outcome.1.as_str())])
        .map_err(|e| AppError::Internal(format!("invalid frontend URL {page}: {e}")))?;
    Ok(Redirect::to(target.as_str()))
}

async fn complete_sign_in(state: &AppState, code: &str) -> Result<String, AppError> {
    let client = microsoft_client(state)?;
    let tokens = client
        .exchange_code(code)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;
    let profile = client
        .fetch_profile(&tokens.access_token)
        .await
        .map_err(|e| AppError::Upstream(format!("{e:#}")))?;

    let user = state
        .db
        .upsert_user(&UserProfile {
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            first_name: profile.first_name,
            last_name: profile.last_name,
            avatar_url: None,
        })
        .await?;

    state
        .db
        .upsert_calendar_connection(&NewCalendarConnection {
            user_id: user.id.clone(),
            provider: PROVIDER.to_string(),
            provider_user_id: profile.id,
            email: profile.email,
            display_name: profile.display_name,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_expires_at: tokens.expires_at.as_ref().map(canonical_instant),
            scope: tokens.scope,
        })
        .await?;

    tracing::info!("User {} signed in with Microsoft", user.email);
    Ok(issue_pair(state, &user)?.access_token)
}

/// POST /api/auth/microsoft/profile
pub async fn profile_login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<ProfileLoginRequest>, AppError>,
) -> Result<Json<ApiResponse<LoginResponse>>, AppError> {
    let profile = req.profile.unwrap_or_default();
    let email = profile
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Profile with email is required".to_string()))?;

    let user = state
        .db
        .upsert_user(&UserProfile {
            email: email.to_string(),
            display_name: profile.display_name,
            first_name: profile.first_name,
            last_name: profile.last_name,
            avatar_url: profile.avatar_url,
        })
        .await?;

    let pair = issue_pair(&state, &user)?;
    tracing::info!("User {} signed in with an add-in profile", user.email);

    Ok(Json(ApiResponse::ok(LoginResponse {
        user: user.to_auth_user(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RefreshRequest>, AppError>,
) -> Result<Json<ApiResponse<TokenPair>>, AppError> {
    let token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("Refresh token required".to_string()))?;

    let claims = state.tokens.verify(&token, Audience::Refresh)?;
    let user = state
        .db
        .get_user_by_id(&claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::ok(issue_pair(&state, &user)?)))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<CurrentUser>>, AppError> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(ApiResponse::ok(CurrentUser {
        user: user.to_auth_user(),
    })))
}
