use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a single call, after which the call is cancelled and
    /// answered with 408.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_access_expiry")]
    pub access_token_expiry_minutes: u64,
    #[serde(default = "default_refresh_expiry")]
    pub refresh_token_expiry_days: u64,
    /// HMAC key used to sign and verify JWTs.
    ///
    /// Prefer loading this via the `JWT_SECRET` environment variable.  This
    /// config field is the fallback for deployments that cannot inject env
    /// vars at runtime.
    ///
    /// **Minimum length:** 32 characters.
    /// **Hot-reload safe:** NO. Read once at startup. Rotating the secret
    /// invalidates every live token pair.
    pub jwt_secret: Option<String>,
}

/// Cookie attributes applied to every session cookie the server emits.
///
/// Defaults are the strict set: `HttpOnly`, `Secure`, `SameSite=Strict`.
#[derive(Debug, Deserialize, Clone)]
pub struct CookieConfig {
    #[serde(default = "default_access_cookie")]
    pub access_cookie_name: String,
    #[serde(default = "default_refresh_cookie")]
    pub refresh_cookie_name: String,
    #[serde(default = "default_refresh_cookie_path")]
    pub refresh_cookie_path: String,
    #[serde(default = "default_true")]
    pub http_only: bool,
    #[serde(default = "default_true")]
    pub secure: bool,
    #[serde(default)]
    pub same_site: SameSitePolicy,
    /// Mirror the token values in `x-access-token` / `x-refresh-token`
    /// response headers for clients without a cookie jar.
    #[serde(default = "default_true")]
    pub mirror_headers: bool,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    #[default]
    Strict,
    Lax,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_db_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cookies: CookieConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

impl ServerConfig {
    /// Full bind address, e.g. `"127.0.0.1:8080"`
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl AuthConfig {
    /// Saturates on overflow; `validate_config` rejects such values.
    pub fn access_token_expiry_secs(&self) -> u64 {
        self.access_token_expiry_minutes.saturating_mul(60)
    }

    /// Refresh lifetime in seconds, also the session cookie `Max-Age`.
    pub fn refresh_token_expiry_secs(&self) -> u64 {
        self.refresh_token_expiry_days.saturating_mul(24 * 60 * 60)
    }

    /// Both lifetimes in seconds, `None` if either does not fit an `i64`
    /// Unix-seconds offset.
    pub fn checked_expiry_secs(&self) -> Option<(u64, u64)> {
        let fits = |secs: u64| i64::try_from(secs).is_ok().then_some(secs);
        let access = self.access_token_expiry_minutes.checked_mul(60).and_then(fits)?;
        let refresh = self
            .refresh_token_expiry_days
            .checked_mul(24 * 60 * 60)
            .and_then(fits)?;
        Some((access, refresh))
    }

    /// Resolve the JWT secret with `JWT_SECRET` env-var taking priority over
    /// the config file field.
    ///
    /// Returns `None` when neither source is set (the server startup code
    /// treats this as a hard error).
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_expiry_minutes: default_access_expiry(),
            refresh_token_expiry_days: default_refresh_expiry(),
            jwt_secret: None,
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            access_cookie_name: default_access_cookie(),
            refresh_cookie_name: default_refresh_cookie(),
            refresh_cookie_path: default_refresh_cookie_path(),
            http_only: true,
            secure: true,
            same_site: SameSitePolicy::Strict,
            mirror_headers: true,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_db_connections(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

pub fn default_bind() -> String {
    "127.0.0.1".to_string()
}

pub fn default_port() -> u16 {
    8080
}

pub fn default_request_timeout() -> u64 {
    30
}

pub fn default_access_expiry() -> u64 {
    15
}

pub fn default_refresh_expiry() -> u64 {
    7
}

pub fn default_access_cookie() -> String {
    "access_token".to_string()
}

pub fn default_refresh_cookie() -> String {
    "refresh_token".to_string()
}

pub fn default_refresh_cookie_path() -> String {
    "/api/v1/auth".to_string()
}

pub fn default_database_url() -> String {
    "sqlite://catalog.db?mode=rwc".to_string()
}

pub fn default_max_db_connections() -> u32 {
    5
}

pub fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

pub fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}
