use anyhow::{Context, Result};
use cookie::{Cookie, SameSite};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};
use hyper::http::response::Builder;
use shared::types::{CookieConfig, SameSitePolicy};
use time::Duration;
use tracing::debug;

use crate::auth::tokens::TokenPair;
use crate::handlers::http::utils::{get_bearer_token, get_cookie, get_header_value};

pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// What a response carries to hand a token pair to the client.
#[derive(Debug, Clone, Default)]
pub struct SessionCarrier {
    pub cookies: Vec<Cookie<'static>>,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl SessionCarrier {
    /// Attach every cookie and header to a response under construction.
    pub fn apply(self, mut builder: Builder) -> Builder {
        for cookie in self.cookies {
            builder = builder.header(SET_COOKIE, cookie.to_string());
        }
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        builder
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie<'static>> {
        self.cookies.iter().find(|c| c.name() == name)
    }
}

/// Moves token pairs between the server and HTTP cookies / headers.
///
/// Used by both register/authenticate and refresh so every flow emits the
/// same cookie attributes.
#[derive(Debug, Clone)]
pub struct SessionTransport {
    config: CookieConfig,
    max_age_secs: u64,
}

impl SessionTransport {
    /// `max_age_secs` is the cookie lifetime, normally the refresh token lifetime.
    pub fn new(config: CookieConfig, max_age_secs: u64) -> Self {
        Self {
            config,
            max_age_secs,
        }
    }

    pub fn emit(&self, pair: &TokenPair) -> Result<SessionCarrier> {
        let max_age = Duration::seconds(i64::try_from(self.max_age_secs).unwrap_or(i64::MAX));

        let cookies = vec![
            self.cookie(&self.config.access_cookie_name, &pair.access_token, "/", max_age),
            self.cookie(
                &self.config.refresh_cookie_name,
                &pair.refresh_token,
                &self.config.refresh_cookie_path,
                max_age,
            ),
        ];

        let mut headers = Vec::new();
        if self.config.mirror_headers {
            headers.push((
                HeaderName::from_static(ACCESS_TOKEN_HEADER),
                HeaderValue::from_str(&pair.access_token).context("Access token is not a valid header value")?,
            ));
            headers.push((
                HeaderName::from_static(REFRESH_TOKEN_HEADER),
                HeaderValue::from_str(&pair.refresh_token).context("Refresh token is not a valid header value")?,
            ));
        }

        debug!("Emitting session for user_id={}", pair.principal.user_id);
        Ok(SessionCarrier { cookies, headers })
    }

    /// Expiring cookies that remove both tokens from the client.
    pub fn clear(&self) -> SessionCarrier {
        SessionCarrier {
            cookies: vec![
                self.cookie(&self.config.access_cookie_name, "", "/", Duration::ZERO),
                self.cookie(
                    &self.config.refresh_cookie_name,
                    "",
                    &self.config.refresh_cookie_path,
                    Duration::ZERO,
                ),
            ],
            headers: Vec::new(),
        }
    }

    /// Refresh token from the refresh cookie, then `Authorization: Bearer`,
    /// then `x-refresh-token`.
    pub fn extract_refresh_token(&self, headers: &HeaderMap) -> Option<String> {
        get_cookie(headers, &self.config.refresh_cookie_name)
            .or_else(|| get_bearer_token(headers))
            .or_else(|| get_header_value(headers, REFRESH_TOKEN_HEADER))
    }

    /// Access token from `Authorization: Bearer`, then the access cookie,
    /// then `x-access-token`.
    pub fn extract_access_token(&self, headers: &HeaderMap) -> Option<String> {
        get_bearer_token(headers)
            .or_else(|| get_cookie(headers, &self.config.access_cookie_name))
            .or_else(|| get_header_value(headers, ACCESS_TOKEN_HEADER))
    }

    fn cookie(&self, name: &str, value: &str, path: &str, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name.to_string(), value.to_string()))
            .http_only(self.config.http_only)
            .secure(self.config.secure)
            .same_site(same_site(self.config.same_site))
            .path(path.to_string())
            .max_age(max_age)
            .build()
    }
}

fn same_site(policy: SameSitePolicy) -> SameSite {
    match policy {
        SameSitePolicy::Strict => SameSite::Strict,
        SameSitePolicy::Lax => SameSite::Lax,
        SameSitePolicy::None => SameSite::None,
    }
}
