//! Microsoft identity platform sign-in and Graph profile lookup.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::config::MicrosoftConfig;

const AUTHORITY: &str = "https://login.microsoftonline.com";
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

pub const SCOPES: &[&str] = &[
    "https://graph.microsoft.com/User.Read",
    "https://graph.microsoft.com/Calendars.Read",
    "https://graph.microsoft.com/Calendars.Read.Shared",
    "offline_access",
];

#[derive(Debug, Clone)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    #[serde(default)]
    mail: Option<String>,
    #[serde(default)]
    user_principal_name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    surname: Option<String>,
}

impl GraphUser {
    fn into_profile(self) -> Result<OAuthProfile> {
        let email = self
            .mail
            .filter(|m| !m.is_empty())
            .or(self.user_principal_name)
            .ok_or_else(|| anyhow!("Graph profile {} has no email address", self.id))?;

        Ok(OAuthProfile {
            id: self.id,
            email,
            display_name: self.display_name,
            first_name: self.given_name,
            last_name: self.surname,
        })
    }
}

pub struct MicrosoftClient {
    http: Client,
    config: MicrosoftConfig,
}

impl MicrosoftClient {
    pub fn new(config: MicrosoftConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}/oauth2/v2.0/{}", AUTHORITY, self.config.tenant_id, name)
    }

    /// URL the user is sent to in order to sign in and consent.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let scope = SCOPES.join(" ");
        let url = Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
        )?;
        Ok(url.into())
    }

    /// Exchange an authorization code for provider tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        let scope = SCOPES.join(" ");
        let response = self
            .http
            .post(self.endpoint("token"))
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await
            .context("token request to Microsoft failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Microsoft token endpoint returned {status}: {body}"));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .context("parsing Microsoft token response")?;

        Ok(OAuthTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens
                .expires_in
                .and_then(Duration::try_seconds)
                .map(|ttl| Utc::now() + ttl),
            scope: tokens.scope,
        })
    }

    pub async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile> {
        let user: GraphUser = self
            .http
            .get(format!("{}/me", GRAPH_API_BASE))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Graph profile request failed")?
            .error_for_status()
            .context("Graph rejected the profile request")?
            .json()
            .await
            .context("parsing Graph profile")?;

        user.into_profile()
    }
}
