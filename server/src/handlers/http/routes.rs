use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use hyper::{header, Method, Response, StatusCode};
use shared::types::AuthError;
use tower::Service;
use tracing::{debug, warn};

use crate::auth::Principal;
use crate::handlers::http::utils::{deliver_error_json, full};
use crate::handlers::http::{auth, products};
use crate::{ApiRequest, ApiResponse, AppState};

// ---------------------------------------------------------------------------
// Handler type aliases
// ---------------------------------------------------------------------------
//
// Two security tiers:
//
//   RouteHandler  no auth.  Receives (req, state).
//                 Use for: auth endpoints, /health, catalog reads.
//
//   HardHandler   access token verified (signature, expiry, family not
//                 revoked) before the handler runs.
//                 Receives (req, state, principal).
//                 Use for: POST / PUT / DELETE on the catalog.

type HandlerFuture = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send>>;

type RouteHandler = Box<dyn Fn(ApiRequest, AppState) -> HandlerFuture + Send + Sync>;

type HardHandler = Box<dyn Fn(ApiRequest, AppState, Principal) -> HandlerFuture + Send + Sync>;

// ---------------------------------------------------------------------------
// RouteKind
// ---------------------------------------------------------------------------

enum RouteKind {
    /// No authentication check.
    Open(RouteHandler),

    /// Access token required. Handler receives the verified `Principal`.
    Hard(HardHandler),
}

struct Route {
    method: Method,
    path: String,
    kind: RouteKind,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// First registered match wins, so literal segments must be registered
/// before `:param` routes that would also match them.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes_count", &self.routes.len())
            .finish()
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    fn open<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Open(Box::new(move |req, state| Box::pin(handler(req, state)))),
        });
        self
    }

    fn hard<F, Fut>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, Principal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            kind: RouteKind::Hard(Box::new(move |req, state, principal| {
                Box::pin(handler(req, state, principal))
            })),
        });
        self
    }

    // ── Open (no auth) ────────────────────────────────────────────────────────

    pub fn get<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.open(Method::GET, path, handler)
    }

    /// POST with no authentication, use only for the auth endpoints.
    pub fn post<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.open(Method::POST, path, handler)
    }

    // ── Hard auth (access token + family revocation check) ───────────────────
    //
    // The router validates the access token before the handler is called.
    // Handlers receive the `Principal` and must NOT repeat the check.

    pub fn post_hard<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, Principal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.hard(Method::POST, path, handler)
    }

    pub fn put_hard<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, Principal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.hard(Method::PUT, path, handler)
    }

    pub fn delete_hard<F, Fut>(self, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest, AppState, Principal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        self.hard(Method::DELETE, path, handler)
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Run the matching handler.
    ///
    /// Auth failures are returned as `Err(AuthError)` so the call log records
    /// them; the error layer renders the 401.
    pub async fn route(&self, req: ApiRequest, state: AppState) -> Result<ApiResponse> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        for route in &self.routes {
            if route.method != method || !Self::path_matches(&route.path, &path) {
                continue;
            }

            return match &route.kind {
                RouteKind::Open(h) => h(req, state).await,

                RouteKind::Hard(h) => {
                    let transport = state.session_transport().await;
                    let Some(token) = transport.extract_access_token(req.headers()) else {
                        warn!("Hard-auth rejected {} {}: no access token", method, path);
                        return Err(AuthError::InvalidToken.into());
                    };

                    match state.tokens.validate_access(&token).await {
                        Ok(principal) => {
                            debug!("Hard-auth ok {} {} user_id={}", method, path, principal.user_id);
                            h(req, state, principal).await
                        }
                        Err(e) => {
                            warn!("Hard-auth rejected {} {}: {}", method, path, e);
                            Err(e.into())
                        }
                    }
                }
            };
        }

        deliver_error_json("NOT_FOUND", "Endpoint not found", StatusCode::NOT_FOUND)
            .context("Failed to deliver 404 response")
    }

    // ── Path matching ─────────────────────────────────────────────────────────

    pub fn path_matches(route_path: &str, request_path: &str) -> bool {
        // Strip query string from incoming request path before comparing.
        let clean = request_path.split('?').next().unwrap_or(request_path);

        if route_path == clean {
            return true;
        }

        // Segment-by-segment matching for `:param` wildcards.
        // e.g.  "/api/products/v1/:id"  matches  "/api/products/v1/42"
        let route_segs: Vec<&str> = route_path.split('/').collect();
        let path_segs: Vec<&str> = clean.split('/').collect();

        if route_segs.len() != path_segs.len() {
            return false;
        }

        route_segs
            .iter()
            .zip(path_segs.iter())
            .all(|(r, p)| (r.starts_with(':') && !p.is_empty()) || r == p)
    }
}

/// Value of the `:param` segment named `name` in `route_path`, taken from
/// `request_path`.
pub fn path_param<'a>(route_path: &str, request_path: &'a str, name: &str) -> Option<&'a str> {
    let clean = request_path.split('?').next().unwrap_or(request_path);
    route_path
        .split('/')
        .zip(clean.split('/'))
        .find(|(r, _)| r.strip_prefix(':') == Some(name))
        .map(|(_, p)| p)
}

// ---------------------------------------------------------------------------
// Tower adapter
// ---------------------------------------------------------------------------

/// Innermost service of the stack: hands each request to the router.
#[derive(Clone)]
pub struct RouterService {
    router: Arc<Router>,
    state: AppState,
}

impl RouterService {
    pub fn new(router: Router, state: AppState) -> Self {
        Self {
            router: Arc::new(router),
            state,
        }
    }
}

impl Service<ApiRequest> for RouterService {
    type Response = ApiResponse;
    type Error = anyhow::Error;
    type Future = HandlerFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ApiRequest) -> Self::Future {
        let router = self.router.clone();
        let state = self.state.clone();
        Box::pin(async move { router.route(req, state).await })
    }
}

// ---------------------------------------------------------------------------
// API routes
// ---------------------------------------------------------------------------

pub const PRODUCTS_PREFIX: &str = "/api/products/v1";
pub const PRODUCT_ID_ROUTE: &str = "/api/products/v1/:id";

pub fn build_api_router() -> Router {
    Router::new()
        .get("/health", |_req, _state| async move {
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(full(r#"{"status":"success","health":"ok"}"#))
                .context("Failed to build health response")
        })
        // ── Token lifecycle ──────────────────────────────────────────────────
        .post("/api/v1/auth/register", |req, state| async move {
            auth::handle_register(req, state).await
        })
        .post("/api/v1/auth/authenticate", |req, state| async move {
            auth::handle_authenticate(req, state).await
        })
        .post("/api/v1/auth/refresh-token", |req, state| async move {
            auth::handle_refresh(req, state).await
        })
        .post("/api/v1/auth/logout", |req, state| async move {
            auth::handle_logout(req, state).await
        })
        // ── Catalog: reads are open ──────────────────────────────────────────
        .get("/api/products/v1/youcan", |_req, _state| async move {
            products::handle_youcan().await
        })
        .get(PRODUCTS_PREFIX, |_req, state| async move {
            products::handle_list(state).await
        })
        .get(PRODUCT_ID_ROUTE, |req, state| async move {
            products::handle_get(req, state).await
        })
        // ── Catalog: mutations need an access token ──────────────────────────
        .post_hard(PRODUCTS_PREFIX, |req, state, principal| async move {
            products::handle_create(req, state, principal).await
        })
        .put_hard(PRODUCT_ID_ROUTE, |req, state, principal| async move {
            products::handle_update(req, state, principal).await
        })
        .delete_hard(PRODUCT_ID_ROUTE, |req, state, principal| async move {
            products::handle_delete(req, state, principal).await
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_path_matches() {
        assert!(Router::path_matches("/api/products/v1", "/api/products/v1"));
    }

    #[test]
    fn different_paths_do_not_match() {
        assert!(!Router::path_matches("/api/v1/auth/register", "/api/v1/auth/logout"));
    }

    #[test]
    fn trailing_slash_does_not_match_without_slash() {
        assert!(!Router::path_matches("/api/products/v1", "/api/products/v1/"));
    }

    #[test]
    fn wildcard_segment_matches_numeric_id() {
        assert!(Router::path_matches(PRODUCT_ID_ROUTE, "/api/products/v1/42"));
    }

    #[test]
    fn wildcard_does_not_match_empty_segment() {
        assert!(!Router::path_matches("/a/:id/b", "/a//b"));
    }

    #[test]
    fn wildcard_does_not_match_extra_segments() {
        assert!(!Router::path_matches(PRODUCT_ID_ROUTE, "/api/products/v1/42/images"));
    }

    #[test]
    fn query_string_stripped_before_match() {
        assert!(Router::path_matches(PRODUCTS_PREFIX, "/api/products/v1?page=2"));
    }

    #[test]
    fn path_param_extracts_named_segment() {
        assert_eq!(path_param(PRODUCT_ID_ROUTE, "/api/products/v1/42", "id"), Some("42"));
        assert_eq!(path_param(PRODUCT_ID_ROUTE, "/api/products/v1/42?x=1", "id"), Some("42"));
        assert_eq!(path_param(PRODUCT_ID_ROUTE, "/api/products/v1/42", "slug"), None);
    }

    #[test]
    fn router_new_has_no_routes() {
        assert!(Router::new().routes.is_empty());
    }

    #[test]
    fn youcan_is_registered_before_id_route() {
        let r = build_api_router();
        let youcan = r.routes.iter().position(|rt| rt.path.ends_with("/youcan")).unwrap();
        let by_id = r
            .routes
            .iter()
            .position(|rt| rt.path == PRODUCT_ID_ROUTE && rt.method == Method::GET)
            .unwrap();
        assert!(youcan < by_id);
    }

    #[test]
    fn catalog_mutations_are_hard_routes() {
        let r = build_api_router();
        for route in &r.routes {
            let is_catalog = route.path.starts_with(PRODUCTS_PREFIX);
            let mutating = route.method != Method::GET;
            if is_catalog && mutating {
                assert!(matches!(route.kind, RouteKind::Hard(_)), "{} {}", route.method, route.path);
            } else {
                assert!(matches!(route.kind, RouteKind::Open(_)), "{} {}", route.method, route.path);
            }
        }
    }

    #[tokio::test]
    async fn router_post_hard_adds_hard_route() {
        let r = Router::new().post_hard("/api/test", |_req, _state, _principal| async move {
            Ok(Response::new(full("ok")))
        });
        assert_eq!(r.routes.len(), 1);
        assert!(matches!(r.routes[0].kind, RouteKind::Hard(_)));
    }
}
