use std::collections::BTreeMap;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts, MatchedPath, Query, RawPathParams};
use http::header::USER_AGENT;
use http::request::Parts;
use http::HeaderMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// Structured view of the request a failure happened in.
///
/// Header values are copied verbatim; use [`crate::sanitize`] before exporting
/// a snapshot anywhere sensitive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub url: String,
    pub path: String,
    /// Matched route template, or the raw path when routing did not record one.
    pub route: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Request-scoped metadata merged in by the enricher.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl RequestSnapshot {
    /// Captures a snapshot from request parts.
    ///
    /// Path parameters are only available when the request has been routed,
    /// i.e. when the capturing layer sits on a route rather than around the
    /// whole router.
    pub async fn capture(parts: &mut Parts) -> Self {
        let path = parts.uri.path().to_owned();
        let route = parts
            .extensions
            .get::<MatchedPath>()
            .map(|matched| matched.as_str().to_owned())
            .unwrap_or_else(|| path.clone());

        let params = match RawPathParams::from_request_parts(parts, &()).await {
            Ok(raw) => raw.iter().map(|(key, value)| (key.to_owned(), value.to_owned())).collect(),
            Err(_) => BTreeMap::new(),
        };

        let query = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();

        let user_agent = header_str(&parts.headers, USER_AGENT.as_str());
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .or_else(|| forwarded_ip(&parts.headers));

        Self {
            url: parts.uri.to_string(),
            path,
            route,
            method: parts.method.as_str().to_owned(),
            headers: header_map(&parts.headers),
            params,
            query,
            user_agent,
            ip,
            metadata: Map::new(),
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_owned)
}

/// First hop of `x-forwarded-for`, falling back to `x-real-ip`.
fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_owned()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
}

/// Repeated headers are joined with `", "`; non-UTF-8 values are lossily decoded.
fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    #[tokio::test]
    async fn captures_unrouted_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/users/42?verbose=true")
            .header("user-agent", "rail-test")
            .header("x-forwarded-for", "10.0.0.7, 10.0.0.1")
            .header("accept", "text/plain")
            .header("accept", "application/json")
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();

        let snapshot = RequestSnapshot::capture(&mut parts).await;

        assert_eq!(snapshot.path, "/users/42");
        assert_eq!(snapshot.route, "/users/42");
        assert_eq!(snapshot.method, "POST");
        assert_eq!(snapshot.query.get("verbose").map(String::as_str), Some("true"));
        assert!(snapshot.params.is_empty());
        assert_eq!(snapshot.user_agent.as_deref(), Some("rail-test"));
        assert_eq!(snapshot.ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(
            snapshot.headers.get("accept").map(String::as_str),
            Some("text/plain, application/json")
        );
    }
}
