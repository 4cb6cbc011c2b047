use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use http::request::Parts;
use hyper::header::HeaderMap;
use hyper::{Method, StatusCode};

use super::serializer::{body_to_log_text, REDACTED};

/// Header values never written to the log.
const REDACTED_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-access-token",
    "x-refresh-token",
];

/// Peer address of the TCP connection a request arrived on.
///
/// Inserted into the request extensions by the accept loop.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

/// Immutable capture of one call's inputs.
///
/// Built once at call entry by the request log layer and shared with the
/// handler through the request extensions as `Arc<RequestSnapshot>`.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    method: Method,
    path: String,
    headers: HeaderMap,
    query_params: BTreeMap<String, Vec<String>>,
    body: Bytes,
    client_address: String,
}

impl RequestSnapshot {
    pub fn capture(parts: &Parts, body: Bytes) -> Self {
        let query_params = parts
            .uri
            .query()
            .map(parse_query)
            .unwrap_or_default();

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            headers: parts.headers.clone(),
            query_params,
            body,
            client_address: resolve_client_address(
                &parts.headers,
                parts.extensions.get::<ClientAddr>(),
            ),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query_params(&self) -> &BTreeMap<String, Vec<String>> {
        &self.query_params
    }

    pub fn body(&self) -> Option<&Bytes> {
        (!self.body.is_empty()).then_some(&self.body)
    }

    pub fn client_address(&self) -> &str {
        &self.client_address
    }

    /// `name=value; ` pairs with credential-bearing values masked.
    pub fn headers_text(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            let shown = if REDACTED_HEADERS.contains(&name.as_str()) {
                REDACTED
            } else {
                value.to_str().unwrap_or("[non-ascii]")
            };
            out.push_str(name.as_str());
            out.push('=');
            out.push_str(shown);
            out.push_str("; ");
        }
        out
    }

    pub fn query_text(&self) -> String {
        let pairs: Vec<String> = self
            .query_params
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect();
        format!("{{{}}}", pairs.join(", "))
    }

    pub fn body_text(&self) -> String {
        body_to_log_text(&self.body)
    }
}

/// Outcome of one call. Produced exactly once per `RequestSnapshot`.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    /// `None` when the call never reached a response (error or cancellation).
    pub status: Option<StatusCode>,
    pub body: Option<Bytes>,
    pub elapsed_millis: u64,
    pub error: Option<String>,
}

impl ResponseSnapshot {
    pub fn status_text(&self) -> String {
        self.status
            .map(|s| s.as_u16().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn body_text(&self) -> String {
        match &self.body {
            Some(body) => body_to_log_text(body),
            None => super::serializer::NULL_SENTINEL.to_string(),
        }
    }
}

impl fmt::Display for ResponseSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {} ms", self.status_text(), self.elapsed_millis)
    }
}

fn parse_query(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()).into_owned() {
        params.entry(key).or_default().push(value);
    }
    params
}

/// Forwarding headers first (the server usually sits behind a proxy), then
/// the socket peer, then `"unknown"`.
pub fn resolve_client_address(headers: &HeaderMap, peer: Option<&ClientAddr>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }

    peer.map(|p| p.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::Request;

    fn parts_for(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn query_params_keep_repeated_values_in_order() {
        let parts = parts_for(
            Request::get("/api/products/v1?size=s&size=m&color=red")
                .body(())
                .unwrap(),
        );
        let snap = RequestSnapshot::capture(&parts, Bytes::new());
        assert_eq!(snap.query_params()["size"], vec!["s", "m"]);
        assert_eq!(snap.query_params()["color"], vec!["red"]);
        assert_eq!(snap.path(), "/api/products/v1");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let parts = parts_for(
            Request::get("/")
                .header("X-Trace-Id", "abc")
                .body(())
                .unwrap(),
        );
        let snap = RequestSnapshot::capture(&parts, Bytes::new());
        assert_eq!(snap.headers().get("x-trace-id").unwrap(), "abc");
    }

    #[test]
    fn credential_headers_are_redacted() {
        let parts = parts_for(
            Request::post("/api/v1/auth/refresh-token")
                .header("authorization", "Bearer secret.jwt.value")
                .header("cookie", "refresh_token=abc")
                .header("accept", "application/json")
                .body(())
                .unwrap(),
        );
        let text = RequestSnapshot::capture(&parts, Bytes::new()).headers_text();
        assert!(!text.contains("secret.jwt.value"));
        assert!(!text.contains("refresh_token=abc"));
        assert!(text.contains("authorization=[redacted]"));
        assert!(text.contains("accept=application/json"));
    }

    #[test]
    fn empty_body_is_absent() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let snap = RequestSnapshot::capture(&parts, Bytes::new());
        assert!(snap.body().is_none());
        assert_eq!(snap.body_text(), "null");
    }

    #[test]
    fn forwarded_for_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer = ClientAddr(([127, 0, 0, 1], 4000).into());
        assert_eq!(resolve_client_address(&headers, Some(&peer)), "203.0.113.9");
    }

    #[test]
    fn peer_used_without_proxy_headers() {
        let peer = ClientAddr(([192, 168, 1, 4], 4000).into());
        assert_eq!(
            resolve_client_address(&HeaderMap::new(), Some(&peer)),
            "192.168.1.4"
        );
        assert_eq!(resolve_client_address(&HeaderMap::new(), None), "unknown");
    }

    #[test]
    fn unknown_status_when_call_never_completed() {
        let snap = ResponseSnapshot {
            status: None,
            body: None,
            elapsed_millis: 3,
            error: Some("boom".into()),
        };
        assert_eq!(snap.status_text(), "unknown");
        assert_eq!(snap.body_text(), "null");
    }
}
