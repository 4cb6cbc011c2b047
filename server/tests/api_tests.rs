mod common;

use bytes::Bytes;
use cookie::SameSite;
use futures_util::future::join_all;
use http_body_util::Full;
use hyper::{Method, Request, StatusCode};
use serde_json::{json, Value};
use tokio_test::assert_ok;

use server::call_log::{EntryKind, LogEntry};

use common::{spawn_app, TestApp};

const PASSWORD: &str = "correct horse battery";

async fn registered(app: &TestApp, email: &str) -> (String, String) {
    let res = app.register(email, PASSWORD).await;
    assert_eq!(res.status, StatusCode::CREATED);
    (res.cookie_value("access_token"), res.cookie_value("refresh_token"))
}

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn register_refresh_then_reuse_is_rejected() {
        let app = spawn_app().await;

        let res = app.register("u1", PASSWORD).await;
        assert_eq!(res.status, StatusCode::CREATED);
        let body = res.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["email"], "u1");

        let access = res.cookie_value("access_token");
        let refresh = res.cookie_value("refresh_token");
        assert_ne!(access, refresh);

        // Token strings travel in cookies and headers only.
        let text = String::from_utf8_lossy(&res.body);
        assert!(!text.contains(&access));
        assert!(!text.contains(&refresh));

        let rotated = app.refresh_with_cookie(&refresh).await;
        assert_eq!(rotated.status, StatusCode::NO_CONTENT);
        assert!(rotated.body.is_empty());
        let next_refresh = rotated.cookie_value("refresh_token");
        assert_ne!(next_refresh, refresh);

        let reused = app.refresh_with_cookie(&refresh).await;
        assert_eq!(reused.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reused.json()["code"], "TOKEN_REVOKED");

        // The whole family went down with the reuse.
        let successor = app.refresh_with_cookie(&next_refresh).await;
        assert_eq!(successor.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_cookies_carry_hardened_attributes() {
        let app = spawn_app().await;
        let res = app.register("cookies@example.com", PASSWORD).await;
        let cookies = res.cookies();

        let refresh = &cookies["refresh_token"];
        assert_eq!(refresh.http_only(), Some(true));
        assert_eq!(refresh.secure(), Some(true));
        assert_eq!(refresh.same_site(), Some(SameSite::Strict));
        assert_eq!(refresh.path(), Some("/api/v1/auth"));
        assert_eq!(
            refresh.max_age(),
            Some(time::Duration::seconds(7 * 24 * 60 * 60))
        );

        let access = &cookies["access_token"];
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.secure(), Some(true));

        // What the browser actually receives.
        let raw_refresh = res.raw_set_cookie("refresh_token");
        for attr in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/api/v1/auth", "Max-Age=604800"] {
            assert!(raw_refresh.contains(attr), "{} missing from {}", attr, raw_refresh);
        }
        let raw_access = res.raw_set_cookie("access_token");
        for attr in ["HttpOnly", "Secure", "SameSite=Strict", "Path=/"] {
            assert!(raw_access.contains(attr), "{} missing from {}", attr, raw_access);
        }
        assert!(!raw_access.contains("Path=/api"));

        assert!(res.headers.contains_key("x-access-token"));
        assert!(res.headers.contains_key("x-refresh-token"));
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let app = spawn_app().await;
        registered(&app, "dup@example.com").await;

        let res = app.register("DUP@example.com", PASSWORD).await;
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.json()["code"], "IDENTITY_TAKEN");
        assert!(res.cookies().is_empty());
    }

    #[tokio::test]
    async fn invalid_credentials_are_indistinguishable() {
        let app = spawn_app().await;
        registered(&app, "known@example.com").await;

        let wrong_password = app.authenticate("known@example.com", "not the password").await;
        let unknown_user = app.authenticate("nobody@example.com", PASSWORD).await;

        assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password.body, unknown_user.body);
    }

    #[tokio::test]
    async fn authenticate_issues_a_fresh_session() {
        let app = spawn_app().await;
        let (_, first_refresh) = registered(&app, "login@example.com").await;

        let res = app.authenticate("login@example.com", PASSWORD).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_ne!(res.cookie_value("refresh_token"), first_refresh);

        // Logging in again does not touch the earlier session.
        let rotated = app.refresh_with_cookie(&first_refresh).await;
        assert_eq!(rotated.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn refresh_accepts_bearer_token() {
        let app = spawn_app().await;
        let (_, refresh) = registered(&app, "bearer@example.com").await;

        let res = app
            .send(
                Request::post("/api/v1/auth/refresh-token")
                    .header("authorization", format!("Bearer {}", refresh))
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn refresh_without_token_is_unauthorized() {
        let app = spawn_app().await;
        let res = app.post_json("/api/v1/auth/refresh-token", json!({})).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.json()["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn concurrent_refreshes_have_one_winner() {
        let app = spawn_app().await;
        let (_, refresh) = registered(&app, "race@example.com").await;

        let results = join_all((0..8).map(|_| app.refresh_with_cookie(&refresh))).await;
        let winners = results
            .iter()
            .filter(|r| r.status == StatusCode::NO_CONTENT)
            .count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter(|r| r.status != StatusCode::NO_CONTENT)
            .all(|r| r.status == StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn expired_access_token_is_rejected() {
        let app = spawn_app().await;
        let (access, _) = registered(&app, "clock@example.com").await;

        let product = json!({ "name": "Mug" });
        let ok = app
            .send_authed(Method::POST, "/api/products/v1", &access, Some(product.clone()))
            .await;
        assert_eq!(ok.status, StatusCode::CREATED);

        app.clock.advance(15 * 60 + 1);
        let expired = app
            .send_authed(Method::POST, "/api/products/v1", &access, Some(product))
            .await;
        assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
        assert_eq!(expired.json()["code"], "TOKEN_EXPIRED");
    }

    #[tokio::test]
    async fn refresh_token_cannot_authorize_catalog_writes() {
        let app = spawn_app().await;
        let (_, refresh) = registered(&app, "kinds@example.com").await;

        let res = app
            .send_authed(Method::POST, "/api/products/v1", &refresh, Some(json!({ "name": "Mug" })))
            .await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_clears_cookies_and_revokes() {
        let app = spawn_app().await;
        let (_, refresh) = registered(&app, "bye@example.com").await;

        let res = app
            .send(
                Request::post("/api/v1/auth/logout")
                    .header("cookie", format!("refresh_token={}", refresh))
                    .body(Full::new(Bytes::new()))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);

        let cookies = res.cookies();
        for name in ["access_token", "refresh_token"] {
            assert_eq!(cookies[name].value(), "");
            assert_eq!(cookies[name].max_age(), Some(time::Duration::ZERO));
        }

        let after = app.refresh_with_cookie(&refresh).await;
        assert_eq!(after.status, StatusCode::UNAUTHORIZED);
        assert_eq!(after.json()["code"], "TOKEN_REVOKED");
    }

    #[tokio::test]
    async fn logout_without_session_still_succeeds() {
        let app = spawn_app().await;
        let res = app.post_json("/api/v1/auth/logout", json!({})).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.cookies().len(), 2);
    }
}

mod catalog_tests {
    use super::*;

    #[tokio::test]
    async fn crud_round_trip_with_bearer_token() {
        let app = spawn_app().await;
        let (access, _) = registered(&app, "admin@example.com").await;

        let created = app
            .send_authed(
                Method::POST,
                "/api/products/v1",
                &access,
                Some(json!({
                    "name": "Linen shirt",
                    "stock": 4,
                    "price": "29.90",
                    "colors": ["white", "sand"],
                    "imagesProduct": [{ "src": "/img/shirt-front.jpg" }]
                })),
            )
            .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let created: Value = assert_ok!(serde_json::from_slice(&created.body));
        let id = created["id"].as_i64().unwrap();
        let path = format!("/api/products/v1/{}", id);

        let list = app.get("/api/products/v1").await;
        assert_eq!(list.status, StatusCode::OK);
        assert_eq!(list.json().as_array().unwrap().len(), 1);

        let fetched = app.get(&path).await;
        assert_eq!(fetched.status, StatusCode::OK);
        let fetched = fetched.json();
        assert_eq!(fetched["name"], "Linen shirt");
        assert_eq!(fetched["colors"], json!(["white", "sand"]));
        assert_eq!(fetched["imagesProduct"][0]["src"], "/img/shirt-front.jpg");

        let updated = app
            .send_authed(
                Method::PUT,
                &path,
                &access,
                Some(json!({ "name": "Linen shirt", "stock": 0 })),
            )
            .await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.json()["stock"], 0);

        let deleted = app.send_authed(Method::DELETE, &path, &access, None).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);

        let gone = app.get(&path).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
        assert_eq!(gone.json()["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn writes_require_authentication() {
        let app = spawn_app().await;

        let res = app.post_json("/api/products/v1", json!({ "name": "Mug" })).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        let list = app.get("/api/products/v1").await;
        assert_eq!(list.json(), json!([]));
    }

    #[tokio::test]
    async fn access_cookie_authorizes_writes() {
        let app = spawn_app().await;
        let (access, _) = registered(&app, "cookie-writer@example.com").await;

        let res = app
            .send(
                Request::post("/api/products/v1")
                    .header("cookie", format!("access_token={}", access))
                    .header("content-type", "application/json")
                    .body(Full::new(Bytes::from(r#"{"name":"Mug"}"#)))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn malformed_product_id_is_bad_request() {
        let app = spawn_app().await;
        let res = app.get("/api/products/v1/abc").await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.json()["code"], "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn youcan_answers_in_plain_text() {
        let app = spawn_app().await;
        let res = app.get("/api/products/v1/youcan").await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(&res.body[..], b"yup !, you can");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let app = spawn_app().await;
        let res = app.get("/api/nowhere").await;
        assert_eq!(res.status, StatusCode::NOT_FOUND);
        assert_eq!(res.json()["status"], "error");
    }
}

mod call_log_tests {
    use super::*;

    #[tokio::test]
    async fn successful_call_logs_incoming_then_response() {
        let app = spawn_app().await;
        app.get("/health").await;

        assert_eq!(app.sink.kinds(), vec![EntryKind::Incoming, EntryKind::Response]);
        match &app.sink.entries()[1] {
            LogEntry::Response { path, response, .. } => {
                assert_eq!(path, "/health");
                assert_eq!(response.status_text(), "200");
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[tokio::test]
    async fn failed_call_logs_failure_between_request_and_response() {
        let app = spawn_app().await;
        let res = app.refresh_with_cookie("not-a-token").await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);

        assert_eq!(
            app.sink.kinds(),
            vec![EntryKind::Incoming, EntryKind::Failed, EntryKind::Response]
        );
        match &app.sink.entries()[2] {
            LogEntry::Response { response, .. } => {
                assert_eq!(response.status_text(), "unknown");
                assert!(response.error.is_some());
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[tokio::test]
    async fn credentials_never_reach_the_log() {
        let app = spawn_app().await;
        let (access, refresh) = registered(&app, "quiet@example.com").await;
        let login = app.authenticate("quiet@example.com", PASSWORD).await;
        assert_eq!(login.status, StatusCode::OK);

        app.send_authed(Method::POST, "/api/products/v1", &access, Some(json!({ "name": "Mug" })))
            .await;
        app.refresh_with_cookie(&refresh).await;

        let text: String = app
            .sink
            .entries()
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        assert!(!text.contains(PASSWORD));
        assert!(!text.contains(&access));
        assert!(!text.contains(&refresh));
        assert!(text.contains("\"password\": \"[redacted]\""));
        assert!(text.contains("authorization=[redacted]"));
        assert!(text.contains("quiet@example.com"));
    }

    #[tokio::test]
    async fn every_concurrent_call_is_logged_once() {
        let app = spawn_app().await;
        join_all((0..10).map(|_| app.get("/api/products/v1"))).await;

        let kinds = app.sink.kinds();
        let incoming = kinds.iter().filter(|k| **k == EntryKind::Incoming).count();
        let responses = kinds.iter().filter(|k| **k == EntryKind::Response).count();
        assert_eq!(incoming, 10);
        assert_eq!(responses, 10);
    }
}

mod cors_tests {
    use super::*;

    const ORIGIN: &str = "http://localhost:3000";

    async fn refresh_from(app: &TestApp, origin: &str) -> common::TestResponse {
        app.send(
            Request::post("/api/v1/auth/refresh-token")
                .header("origin", origin)
                .body(Full::new(Bytes::new()))
                .unwrap(),
        )
        .await
    }

    #[tokio::test]
    async fn failed_calls_carry_cors_headers() {
        let app = spawn_app().await;

        let res = refresh_from(&app, ORIGIN).await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.headers["access-control-allow-origin"], ORIGIN);
        assert_eq!(res.headers["access-control-allow-credentials"], "true");
        assert_eq!(res.json()["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn conflicts_carry_cors_headers() {
        let app = spawn_app().await;
        registered(&app, "cors@example.com").await;

        let res = app
            .send(
                Request::post("/api/v1/auth/register")
                    .header("origin", ORIGIN)
                    .header("content-type", "application/json")
                    .body(Full::new(Bytes::from(
                        json!({ "email": "cors@example.com", "password": PASSWORD }).to_string(),
                    )))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status, StatusCode::CONFLICT);
        assert_eq!(res.headers["access-control-allow-origin"], ORIGIN);
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_allow_header() {
        let app = spawn_app().await;
        let res = refresh_from(&app, "http://evil.example").await;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert!(!res.headers.contains_key("access-control-allow-origin"));
    }
}
