use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::{Request, StatusCode};
use tokio::time;
use tower::{Layer, Service};

use crate::handlers::http::utils::{deliver_error_json, internal_error_fallback};
use crate::ApiResponse;

/// Tower layer for request timeouts
///
/// If the inner service does not respond within the configured
/// duration, the inner future is dropped and a 408 JSON error is returned.
/// Dropping the future is what lets the call log close the entry as cancelled.
#[derive(Clone)]
pub struct TimeoutLayer {
    duration: Duration,
}

impl TimeoutLayer {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            duration: self.duration,
        }
    }
}

/// The actual timeout service
#[derive(Clone)]
pub struct TimeoutService<S> {
    inner: S,
    duration: Duration,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TimeoutService<S>
where
    S: Service<Request<ReqBody>, Response = ApiResponse, Error = anyhow::Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = ApiResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let duration = self.duration;
        let mut inner = self.inner.clone();
        let path = req.uri().path().to_string();

        Box::pin(async move {
            match time::timeout(duration, inner.call(req)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Request to {} timed out after {:?}", path, duration);

                    Ok(deliver_error_json(
                        "REQUEST_TIMEOUT",
                        "Request timed out",
                        StatusCode::REQUEST_TIMEOUT,
                    )
                    .unwrap_or_else(|_| internal_error_fallback()))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::http::utils::full;
    use hyper::Response;
    use tower::{service_fn, ServiceExt};

    #[tokio::test(start_paused = true)]
    async fn slow_inner_gets_408() {
        let svc = TimeoutLayer::new(Duration::from_secs(5)).layer(service_fn(|_req: Request<()>| async {
            time::sleep(Duration::from_secs(30)).await;
            Ok::<ApiResponse, anyhow::Error>(Response::new(full("late")))
        }));

        let res = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn fast_inner_passes_through() {
        let svc = TimeoutLayer::new(Duration::from_secs(5)).layer(service_fn(|_req: Request<()>| async {
            Ok::<ApiResponse, anyhow::Error>(Response::new(full("ok")))
        }));

        let res = svc.oneshot(Request::new(())).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}
