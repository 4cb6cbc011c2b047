use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::{Request, StatusCode};
use shared::types::{AuthError, ErrorResponse};
use tower::{Layer, Service};
use tracing::error;

use crate::database::products::CatalogError;
use crate::handlers::http::utils::{deliver_error_json, deliver_serialized_json, internal_error_fallback};
use crate::ApiResponse;

/// Outermost layer: turns errors that escaped the inner stack into JSON
/// responses so the connection always gets an answer.
///
/// Errors are logged by the call log before they reach this point, so this
/// layer only renders them.
#[derive(Clone, Default)]
pub struct ErrorResponseLayer;

impl<S> Layer<S> for ErrorResponseLayer {
    type Service = ErrorResponseService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ErrorResponseService { inner }
    }
}

#[derive(Clone)]
pub struct ErrorResponseService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for ErrorResponseService<S>
where
    S: Service<Request<ReqBody>, Response = ApiResponse, Error = anyhow::Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = ApiResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.inner.poll_ready(cx) {
            Poll::Ready(Err(e)) => {
                // Readiness errors are surfaced on the next call instead.
                error!("Inner service not ready: {:#}", e);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match inner.call(req).await {
                Ok(response) => Ok(response),
                Err(err) => Ok(render_error(&err)),
            }
        })
    }
}

/// Map a failed call to its client-facing JSON error.
///
/// Known domain errors keep their status and code. Anything else becomes a
/// generic 500 with no internal detail.
pub fn render_error(err: &anyhow::Error) -> ApiResponse {
    let rendered = if let Some(auth) = err.downcast_ref::<AuthError>() {
        let status =
            StatusCode::from_u16(auth.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        deliver_serialized_json(&ErrorResponse::from(auth), status)
    } else if let Some(catalog) = err.downcast_ref::<CatalogError>() {
        deliver_error_json(catalog.to_code(), &catalog.to_message(), catalog.status_code())
    } else {
        error!("Unhandled error: {:#}", err);
        deliver_error_json(
            "INTERNAL_ERROR",
            "Internal server error",
            StatusCode::INTERNAL_SERVER_ERROR,
        )
    };

    rendered.unwrap_or_else(|_| internal_error_fallback())
}
