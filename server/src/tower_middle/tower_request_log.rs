use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use anyhow::anyhow;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::warn;

use crate::call_log::{CallLogSink, LogEntry, RequestSnapshot, ResponseSnapshot};
use crate::{ApiRequest, ApiResponse};

/// Tower layer that logs every call passing through it
///
/// Per call the sink receives `Incoming`, then `Failed` if the inner service
/// returned an error, then exactly one `Response`. Responses and errors are
/// passed through untouched.
#[derive(Clone)]
pub struct RequestLogLayer {
    sink: Arc<dyn CallLogSink>,
}

impl RequestLogLayer {
    pub fn new(sink: Arc<dyn CallLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

/// The service that performs the logging
///
/// Buffers the request body so it can be logged, then hands the inner
/// service an `ApiRequest` whose extensions carry the `Arc<RequestSnapshot>`.
#[derive(Clone)]
pub struct RequestLogService<S> {
    inner: S,
    sink: Arc<dyn CallLogSink>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for RequestLogService<S>
where
    S: Service<ApiRequest, Response = ApiResponse, Error = anyhow::Error> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Body<Data = Bytes> + Send + 'static,
    ReqBody::Error: fmt::Display + Send,
{
    type Response = ApiResponse;
    type Error = anyhow::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let sink = self.sink.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let (body, read_error) = match body.collect().await {
                Ok(collected) => (collected.to_bytes(), None),
                Err(e) => (Bytes::new(), Some(e.to_string())),
            };

            let snapshot = Arc::new(RequestSnapshot::capture(&parts, body.clone()));
            sink.record(LogEntry::Incoming {
                request: snapshot.clone(),
            });

            // From here on the guard owns the "exactly one Response entry" rule.
            let guard = CallGuard::start(sink, &snapshot);

            if let Some(reason) = read_error {
                let err = anyhow!("Failed to read request body: {}", reason);
                guard.fail(&err);
                return Err(err);
            }

            parts.extensions.insert(snapshot);
            let req = Request::from_parts(parts, body);

            match inner.call(req).await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    let body = match body.collect().await {
                        Ok(collected) => collected.to_bytes(),
                        Err(never) => match never {},
                    };
                    guard.succeed(parts.status, &body);
                    Ok(Response::from_parts(parts, full_body(body)))
                }
                Err(err) => {
                    guard.fail(&err);
                    Err(err)
                }
            }
        })
    }
}

fn full_body(bytes: Bytes) -> http_body_util::combinators::BoxBody<Bytes, Infallible> {
    Full::new(bytes).boxed()
}

/// Finalizes one call's log exactly once.
///
/// `succeed` and `fail` consume the guard. If neither runs because the call
/// future was dropped (client gone, timeout layer fired), `Drop` writes the
/// response entry with an unknown status.
struct CallGuard {
    sink: Arc<dyn CallLogSink>,
    method: Method,
    path: String,
    started: Instant,
    finished: bool,
}

impl CallGuard {
    fn start(sink: Arc<dyn CallLogSink>, snapshot: &RequestSnapshot) -> Self {
        Self {
            sink,
            method: snapshot.method().clone(),
            path: snapshot.path().to_string(),
            started: Instant::now(),
            finished: false,
        }
    }

    fn succeed(mut self, status: StatusCode, body: &Bytes) {
        self.finish(Some(status), Some(body.clone()), None);
    }

    fn fail(mut self, err: &anyhow::Error) {
        let message = format!("{:#}", err);
        self.sink.record(LogEntry::Failed {
            method: self.method.clone(),
            path: self.path.clone(),
            error: message.clone(),
        });
        self.finish(None, None, Some(message));
    }

    fn finish(&mut self, status: Option<StatusCode>, body: Option<Bytes>, error: Option<String>) {
        self.finished = true;
        let elapsed_millis = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.sink.record(LogEntry::Response {
            method: self.method.clone(),
            path: self.path.clone(),
            response: ResponseSnapshot {
                status,
                body,
                elapsed_millis,
                error,
            },
        });
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Call cancelled before completion: {} {}", self.method, self.path);
            self.finish(None, None, Some("call cancelled".to_string()));
        }
    }
}
