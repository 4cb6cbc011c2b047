use std::fs;
use tracing::{debug, error, info};

use crate::types::server_config::{AppConfig, ConfigError};

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Loading configuration from: {}", path);

    let contents = fs::read_to_string(path)?;
    debug!("Processing file: {}", path);

    if contents.trim().is_empty() {
        error!("Configuration file is empty");
        return Err(ConfigError::InvalidConfig("empty file".into()));
    }

    let config = parse_config(&contents)?;

    info!("Configuration loaded successfully");

    Ok(config)
}

/// Parse and validate a TOML document without touching the filesystem.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = toml::from_str(contents)?;

    validate_config(&config)?;
    debug!("Config validated");

    Ok(config)
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.auth.access_token_expiry_minutes == 0 {
        return Err(ConfigError::InvalidConfig(
            "access_token_expiry_minutes must be greater than 0".into(),
        ));
    }

    if config.auth.refresh_token_expiry_days == 0 {
        return Err(ConfigError::InvalidConfig(
            "refresh_token_expiry_days must be greater than 0".into(),
        ));
    }

    let Some((access_secs, refresh_secs)) = config.auth.checked_expiry_secs() else {
        return Err(ConfigError::InvalidConfig(
            "token lifetimes are too large".into(),
        ));
    };

    if access_secs >= refresh_secs {
        return Err(ConfigError::InvalidConfig(
            "access tokens must expire before refresh tokens".into(),
        ));
    }

    if config.server.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidConfig(
            "request_timeout_secs must be greater than 0".into(),
        ));
    }

    if config.database.max_connections == 0 {
        return Err(ConfigError::InvalidConfig(
            "database.max_connections must be greater than 0".into(),
        ));
    }

    if config.cookies.access_cookie_name.is_empty() || config.cookies.refresh_cookie_name.is_empty()
    {
        return Err(ConfigError::InvalidConfig("cookie names cannot be empty".into()));
    }

    // Browsers drop SameSite=None cookies that are not also Secure.
    if config.cookies.same_site == crate::types::server_config::SameSitePolicy::None
        && !config.cookies.secure
    {
        return Err(ConfigError::InvalidConfig(
            "same_site = \"none\" requires secure = true".into(),
        ));
    }

    // JWT secret must be resolvable (env var or config field) and long enough.
    // Checked at load time so a bad secret also fails SIGHUP reloads.
    match config.auth.resolved_jwt_secret() {
        None => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be set via the JWT_SECRET env var or auth.jwt_secret config field"
                    .into(),
            ));
        }
        Some(secret) if secret.len() < 32 => {
            return Err(ConfigError::InvalidConfig(
                "jwt_secret must be at least 32 characters long".into(),
            ));
        }
        _ => {}
    }

    Ok(())
}
