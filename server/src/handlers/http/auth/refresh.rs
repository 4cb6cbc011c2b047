use anyhow::Result;
use hyper::StatusCode;
use shared::types::AuthError;
use tracing::{debug, warn};

use super::session_response;
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/v1/auth/refresh-token`
///
/// Rotates the presented refresh token. 204 with the new pair in the
/// carrier and an empty body.
pub async fn handle_refresh(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    let transport = state.session_transport().await;

    let Some(token) = transport.extract_refresh_token(req.headers()) else {
        warn!("Refresh requested without a refresh token");
        return Err(AuthError::InvalidToken.into());
    };

    let pair = state.tokens.refresh(&token).await?;
    let carrier = transport.emit(&pair)?;

    debug!("Refreshed session for user_id={}", pair.principal.user_id);
    session_response::<()>(StatusCode::NO_CONTENT, None, carrier)
}
