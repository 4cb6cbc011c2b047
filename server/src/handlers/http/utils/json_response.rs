use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use shared::types::ErrorResponse;
use std::convert::Infallible;
use tracing::{debug, error};

use crate::ApiResponse;

pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, Infallible> {
    Full::new(chunk.into()).boxed()
}

pub fn empty() -> BoxBody<Bytes, Infallible> {
    Empty::<Bytes>::new().boxed()
}

/// Serialize any `Serialize` type and deliver it as a JSON response.
/// This is the primary helper all handlers should use instead of
/// writing their own one-off serialization + response-building blocks.
pub fn deliver_serialized_json<T: Serialize>(data: &T, status: StatusCode) -> Result<ApiResponse> {
    let json = serde_json::to_string(data).context("Failed to serialize response")?;

    debug!("Delivering serialized JSON response, size: {} bytes", json.len());

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(json))
        .map_err(|e| anyhow!("Failed to build JSON response: {}", e))
}

/// Delivers a JSON error response with the specified error code, message, and status.
pub fn deliver_error_json(error_code: &str, message: &str, status: StatusCode) -> Result<ApiResponse> {
    if status.is_server_error() {
        error!("Delivering error JSON: {} - {} ({})", status.as_u16(), error_code, message);
    } else {
        debug!("Delivering error JSON: {} - {} ({})", status.as_u16(), error_code, message);
    }

    deliver_serialized_json(&ErrorResponse::new(error_code, message), status)
}

/// Bodyless response, used for 204s.
pub fn deliver_empty(status: StatusCode) -> Result<ApiResponse> {
    Response::builder()
        .status(status)
        .body(empty())
        .map_err(|e| anyhow!("Failed to build empty response: {}", e))
}

/// Last-resort 500 for when even building the JSON error fails.
pub fn internal_error_fallback() -> ApiResponse {
    let mut response = Response::new(full(r#"{"status":"error","code":"INTERNAL_ERROR","message":"Internal server error"}"#));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(res: ApiResponse) -> serde_json::Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn error_json_has_status_code_message() {
        let res = deliver_error_json("NOT_FOUND", "Product 7 not found", StatusCode::NOT_FOUND).unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        let v = body_json(res).await;
        assert_eq!(v["status"], "error");
        assert_eq!(v["code"], "NOT_FOUND");
        assert_eq!(v["message"], "Product 7 not found");
    }

    #[tokio::test]
    async fn empty_response_has_no_body() {
        let res = deliver_empty(StatusCode::NO_CONTENT).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn fallback_is_valid_json() {
        let res = internal_error_fallback();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["code"], "INTERNAL_ERROR");
    }
}
