use anyhow::Result;
use hyper::StatusCode;
use serde_json::json;
use tracing::{info, warn};

use super::session_response;
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/v1/auth/logout`
///
/// Always clears the cookies. Revocation failures are logged, not returned:
/// the client is logged out either way.
pub async fn handle_logout(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    let transport = state.session_transport().await;

    match transport.extract_refresh_token(req.headers()) {
        Some(token) => match state.tokens.revoke(&token).await {
            Ok(()) => info!("Session revoked on logout"),
            Err(e) => warn!("Logout could not revoke session: {}", e),
        },
        None => info!("Logout without a refresh token"),
    }

    let body = json!({
        "status": "success",
        "message": "Logged out"
    });
    session_response(StatusCode::OK, Some(&body), transport.clear())
}
