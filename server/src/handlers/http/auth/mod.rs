pub mod authenticate;
pub mod logout;
pub mod refresh;
pub mod register;

pub use authenticate::handle_authenticate;
pub use logout::handle_logout;
pub use refresh::handle_refresh;
pub use register::handle_register;

use anyhow::{Context, Result};
use hyper::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::types::AuthError;
use tracing::warn;

use crate::auth::SessionCarrier;
use crate::handlers::http::utils::{empty, full};
use crate::{ApiRequest, ApiResponse};

/// Decode a JSON credentials body. Anything unreadable is treated as bad
/// credentials so malformed input gets the same answer as a wrong password.
fn parse_credentials<T: DeserializeOwned>(req: &ApiRequest) -> Result<T, AuthError> {
    serde_json::from_slice(req.body()).map_err(|e| {
        warn!("Rejected credentials body: {}", e);
        AuthError::InvalidCredentials
    })
}

/// Build a response carrying a session. `body` of `None` means no content.
fn session_response<T: Serialize>(
    status: StatusCode,
    body: Option<&T>,
    carrier: SessionCarrier,
) -> Result<ApiResponse> {
    let builder = carrier.apply(Response::builder().status(status));

    match body {
        Some(body) => {
            let json = serde_json::to_string(body).context("Failed to serialize response")?;
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(full(json))
                .context("Failed to build session response")
        }
        None => builder.body(empty()).context("Failed to build session response"),
    }
}
