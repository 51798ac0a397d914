use anyhow::{bail, Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub microsoft: Option<MicrosoftConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `development`, `production` or `test`
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Where the add-in's auth callback page lives
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default)]
    pub outlook_addin_url: Option<String>,
    /// Extra origins allowed by CORS on top of the frontend and add-in URLs
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for access and refresh tokens. Required.
    #[serde(default)]
    pub jwt_secret: String,
    /// Access token lifetime, e.g. "7d", "12h", "30m"
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry: String,
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrosoftConfig {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
}

fn default_environment() -> String { "development".to_string() }
fn default_frontend_url() -> String { "https://localhost:3000".to_string() }
fn default_access_expiry() -> String { "7d".to_string() }
fn default_refresh_expiry() -> String { "30d".to_string() }

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                environment: default_environment(),
                frontend_url: default_frontend_url(),
                outlook_addin_url: None,
                cors_allowed_origins: Vec::new(),
            },
            database: DatabaseConfig {
                path: "./data/whattime.db".to_string(),
            },
            auth: AuthConfig {
                jwt_secret: String::new(),
                access_token_expiry: default_access_expiry(),
                refresh_token_expiry: default_refresh_expiry(),
            },
            microsoft: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // A missing .env is fine; the real environment still applies
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        if let Ok(path) = std::env::var("WHATTIME_CONFIG") {
            return Self::load_from_path(Path::new(&path));
        }

        let default_paths = [
            PathBuf::from("whattime-server.toml"),
            PathBuf::from("config/whattime-server.toml"),
            PathBuf::from("/etc/whattime/server.toml"),
        ];

        for path in default_paths {
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        tracing::warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Overlay environment variables on top of the file configuration.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("API_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(env) = var("WHATTIME_ENV") {
            self.server.environment = env;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.server.frontend_url = url;
        }
        if let Some(url) = var("OUTLOOK_ADDIN_URL") {
            self.server.outlook_addin_url = Some(url);
        }
        if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
            self.server.cors_allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = var("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(secret) = var("JWT_SECRET_KEY") {
            self.auth.jwt_secret = secret;
        }
        if let Some(expiry) = var("JWT_EXPIRES_IN") {
            self.auth.access_token_expiry = expiry;
        }
        if let Some(expiry) = var("JWT_REFRESH_EXPIRES_IN") {
            self.auth.refresh_token_expiry = expiry;
        }

        let client_id = var("MICROSOFT_CLIENT_ID");
        let client_secret = var("MICROSOFT_CLIENT_SECRET");
        let tenant_id = var("MICROSOFT_TENANT_ID");
        let redirect_uri = var("MICROSOFT_REDIRECT_URI");
        if let (Some(client_id), Some(client_secret), Some(tenant_id), Some(redirect_uri)) =
            (client_id, client_secret, tenant_id, redirect_uri)
        {
            self.microsoft = Some(MicrosoftConfig {
                client_id,
                client_secret,
                tenant_id,
                redirect_uri,
            });
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("JWT secret is required (set JWT_SECRET_KEY or auth.jwt_secret)");
        }
        parse_lifetime(&self.auth.access_token_expiry)
            .context("invalid access token lifetime")?;
        parse_lifetime(&self.auth.refresh_token_expiry)
            .context("invalid refresh token lifetime")?;
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == "development"
    }
}

/// Parse a lifetime such as `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_lifetime(value: &str) -> Result<Duration> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);

    if digits.is_empty() {
        bail!("lifetime '{value}' has no amount");
    }
    let amount: i64 = digits
        .parse()
        .with_context(|| format!("lifetime '{value}' is out of range"))?;

    let duration = match unit {
        "" | "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        other => bail!("unknown lifetime unit '{other}' in '{value}'"),
    };

    match duration {
        Some(d) if d > Duration::zero() => Ok(d),
        Some(_) => bail!("lifetime '{value}' must be positive"),
        None => bail!("lifetime '{value}' is out of range"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_lifetimes() {
        assert_eq!(parse_lifetime("7d").unwrap(), Duration::days(7));
        assert_eq!(parse_lifetime("12h").unwrap(), Duration::hours(12));
        assert_eq!(parse_lifetime("30m").unwrap(), Duration::minutes(30));
        assert_eq!(parse_lifetime("3600").unwrap(), Duration::seconds(3600));
        assert_eq!(parse_lifetime(" 2w ").unwrap(), Duration::weeks(2));
    }

    #[test]
    fn rejects_bad_lifetimes() {
        assert!(parse_lifetime("").is_err());
        assert!(parse_lifetime("d").is_err());
        assert!(parse_lifetime("0s").is_err());
        assert!(parse_lifetime("7 days").is_err());
        assert!(parse_lifetime("5y").is_err());
    }

    #[test]
    fn missing_secret_is_fatal() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("JWT_SECRET_KEY", "s3cret"),
            ("JWT_EXPIRES_IN", "1h"),
            ("API_PORT", "9100"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ]));

        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.access_token_expiry, "1h");
        assert_eq!(config.server.port, 9100);
        assert_eq!(
            config.server.cors_allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert!(config.microsoft.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn microsoft_needs_every_credential() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("MICROSOFT_CLIENT_ID", "id"),
            ("MICROSOFT_CLIENT_SECRET", "secret"),
            ("MICROSOFT_TENANT_ID", "common"),
        ]));
        assert!(config.microsoft.is_none());

        config.apply_env(env(&[
            ("MICROSOFT_CLIENT_ID", "id"),
            ("MICROSOFT_CLIENT_SECRET", "secret"),
            ("MICROSOFT_TENANT_ID", "common"),
            ("MICROSOFT_REDIRECT_URI", "https://localhost:8000/auth/microsoft/callback"),
        ]));
        assert_eq!(config.microsoft.unwrap().tenant_id, "common");
    }

    #[test]
    fn parses_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8000

            [database]
            path = "/tmp/whattime.db"

            [auth]
            jwt_secret = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.environment, "development");
        assert_eq!(config.auth.access_token_expiry, "7d");
        assert_eq!(config.auth.refresh_token_expiry, "30d");
        assert!(config.validate().is_ok());
    }
}
