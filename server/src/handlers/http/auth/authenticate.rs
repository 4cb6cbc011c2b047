use anyhow::Result;
use hyper::StatusCode;
use shared::types::AuthenticationRequest;
use tracing::info;

use super::{parse_credentials, session_response};
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/v1/auth/authenticate`
pub async fn handle_authenticate(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    info!("Processing authentication request");

    let request: AuthenticationRequest = parse_credentials(&req)?;
    let pair = state.tokens.authenticate(&request).await?;
    let carrier = state.session_transport().await.emit(&pair)?;

    session_response(
        StatusCode::OK,
        Some(&pair.to_response("Authentication successful")),
        carrier,
    )
}
