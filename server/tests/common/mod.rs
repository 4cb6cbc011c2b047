#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cookie::Cookie;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderMap, SET_COOKIE};
use hyper::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use server::auth::{ManualClock, MemoryIdentityStore, MemoryTokenStore, TokenPolicy, TokenService};
use server::call_log::MemorySink;
use server::database::{connect_in_memory, SqliteProductStore};
use server::{build_service, cors_layer, ApiService, AppState};
use shared::config::LiveConfig;
use shared::types::AppConfig;

pub const SECRET: &str = "integration-secret-0123456789abcdef";
pub const START: i64 = 1_700_000_000;

pub struct TestApp {
    pub service: ApiService<Full<Bytes>>,
    pub sink: Arc<MemorySink>,
    pub clock: Arc<ManualClock>,
    pub config: LiveConfig,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// `Set-Cookie` headers by cookie name.
    pub fn cookies(&self) -> HashMap<String, Cookie<'static>> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
            .map(|c| (c.name().to_string(), c))
            .collect()
    }

    pub fn raw_set_cookie(&self, name: &str) -> String {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .find(|v| v.starts_with(&format!("{}=", name)))
            .unwrap()
    }

    pub fn cookie_value(&self, name: &str) -> String {
        self.cookies()[name].value().to_string()
    }
}

pub async fn spawn_app() -> TestApp {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = Some(SECRET.to_string());

    let clock = Arc::new(ManualClock::new(START));
    let tokens = TokenService::new(
        SECRET,
        TokenPolicy::from_config(&config.auth),
        Arc::new(MemoryIdentityStore::new()),
        Arc::new(MemoryTokenStore::new()),
    )
    .with_clock(clock.clone());

    let pool = connect_in_memory().await.unwrap();
    let cors = cors_layer(&config.cors).unwrap();
    let live = LiveConfig::new(config);
    let state = AppState::new(
        live.clone(),
        Arc::new(tokens),
        Arc::new(SqliteProductStore::new(pool)),
    );

    let sink = Arc::new(MemorySink::new());
    let service = build_service(state, sink.clone(), cors, Duration::from_secs(30));

    TestApp {
        service,
        sink,
        clock,
        config: live,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Full<Bytes>>) -> TestResponse {
        let res = self.service.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, path: &str, body: Value) -> TestResponse {
        self.send(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(body.to_string())))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::get(path).body(Full::new(Bytes::new())).unwrap()).await
    }

    pub async fn register(&self, email: &str, password: &str) -> TestResponse {
        self.post_json(
            "/api/v1/auth/register",
            serde_json::json!({
                "firstname": "Ada",
                "lastname": "Lovelace",
                "email": email,
                "password": password,
            }),
        )
        .await
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> TestResponse {
        self.post_json(
            "/api/v1/auth/authenticate",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn refresh_with_cookie(&self, refresh_token: &str) -> TestResponse {
        self.send(
            Request::post("/api/v1/auth/refresh-token")
                .header("cookie", format!("refresh_token={}", refresh_token))
                .body(Full::new(Bytes::new()))
                .unwrap(),
        )
        .await
    }

    /// Request carrying `Authorization: Bearer <access_token>`.
    pub async fn send_authed(
        &self,
        method: hyper::Method,
        path: &str,
        access_token: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let body = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
        self.send(
            Request::builder()
                .method(method)
                .uri(path)
                .header("authorization", format!("Bearer {}", access_token))
                .header("content-type", "application/json")
                .body(Full::new(body))
                .unwrap(),
        )
        .await
    }
}
