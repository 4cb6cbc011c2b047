pub mod auth;
pub mod call_log;
pub mod database;
pub mod handlers;
pub mod tower_middle;

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::body::Body;
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Method, Request, Response};
use shared::config::LiveConfig;
use shared::types::server_config::CorsConfig;
use tower::util::BoxCloneService;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::transport::{ACCESS_TOKEN_HEADER, REFRESH_TOKEN_HEADER};
use crate::auth::{SessionTransport, TokenService};
use crate::call_log::CallLogSink;
use crate::database::ProductStore;
use crate::handlers::http::routes::{build_api_router, RouterService};
use crate::tower_middle::{ErrorResponseLayer, RequestLogLayer, TimeoutLayer};

/// Request as seen by handlers: the body is already buffered by the call log.
pub type ApiRequest = Request<Bytes>;

pub type ApiResponse = Response<BoxBody<Bytes, Infallible>>;

/// The fully layered application service.
pub type ApiService<B> = BoxCloneService<Request<B>, ApiResponse, Infallible>;

/// Shared, cheaply cloneable handles every handler receives.
#[derive(Clone)]
pub struct AppState {
    pub config: LiveConfig,
    pub tokens: Arc<TokenService>,
    pub products: Arc<dyn ProductStore>,
}

impl AppState {
    pub fn new(config: LiveConfig, tokens: Arc<TokenService>, products: Arc<dyn ProductStore>) -> Self {
        Self {
            config,
            tokens,
            products,
        }
    }

    /// Session transport for the current cookie config.
    ///
    /// Cookie lifetime follows the refresh-token lifetime the token service
    /// was built with.
    pub async fn session_transport(&self) -> SessionTransport {
        let cookies = self.config.read().await.cookies.clone();
        SessionTransport::new(cookies, self.tokens.policy().refresh_ttl_secs)
    }
}

/// Build the CORS layer for the configured origins; credentials are allowed.
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let origins = config
        .allowed_origins
        .iter()
        .map(|o| HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin {}", o)))
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([
            HeaderName::from_static(ACCESS_TOKEN_HEADER),
            HeaderName::from_static(REFRESH_TOKEN_HEADER),
        ]))
}

/// Compose the middleware stack around the API router.
///
/// Outermost first: CORS, error rendering, timeout, call log, router. CORS
/// sits outside error rendering so rendered failures carry its headers too.
pub fn build_service<B>(
    state: AppState,
    sink: Arc<dyn CallLogSink>,
    cors: CorsLayer,
    request_timeout: Duration,
) -> ApiService<B>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display + Send,
{
    let service = ServiceBuilder::new()
        .layer(cors)
        .layer(ErrorResponseLayer)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(RequestLogLayer::new(sink))
        .service(RouterService::new(build_api_router(), state));

    BoxCloneService::new(service)
}
