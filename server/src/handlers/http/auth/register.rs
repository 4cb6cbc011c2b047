use anyhow::Result;
use hyper::StatusCode;
use shared::types::RegisterRequest;
use tracing::info;

use super::{parse_credentials, session_response};
use crate::{ApiRequest, ApiResponse, AppState};

/// `POST /api/v1/auth/register`
///
/// 201 with token metadata in the body and the tokens in cookies / headers.
pub async fn handle_register(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    info!("Processing registration request");

    let request: RegisterRequest = parse_credentials(&req)?;
    let pair = state.tokens.register(&request).await?;
    let carrier = state.session_transport().await.emit(&pair)?;

    info!("Registration complete for user_id={}", pair.principal.user_id);
    session_response(
        StatusCode::CREATED,
        Some(&pair.to_response("Registration successful")),
        carrier,
    )
}
