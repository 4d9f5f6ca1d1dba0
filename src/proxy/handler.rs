use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

use crate::errors::AppError;
use crate::models::session::SessionToken;
use crate::server::AppState;

/// Request bodies above this size are refused before forwarding.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

pub const USER_ID_HEADER: &str = "x-auth-user-id";
pub const USER_EMAIL_HEADER: &str = "x-auth-user-email";

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Forwards everything the gate let through to the front-end application
/// and streams the answer back.
#[tracing::instrument(skip(state, req), fields(method = %req.method(), path = %req.uri().path()))]
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    req: Request,
) -> Result<Response, AppError> {
    let (parts, body) = req.into_parts();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let session = if state.config.forward_identity {
        parts.extensions.get::<SessionToken>()
    } else {
        None
    };
    let headers = upstream_headers(&parts.headers, session);

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::PayloadTooLarge)?;

    let upstream_resp = state
        .upstream
        .forward(parts.method.clone(), path_and_query, headers, body.to_vec())
        .await?;

    let status = upstream_resp.status();
    tracing::debug!(status = status.as_u16(), "upstream responded");

    let mut response = Response::builder().status(
        StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
    );
    for (name, value) in upstream_resp.headers() {
        if !is_hop_by_hop(name) {
            response = response.header(name, value);
        }
    }

    response
        .body(Body::from_stream(upstream_resp.bytes_stream()))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {}", e)))
}

/// Request headers as the upstream should see them: hop-by-hop headers
/// dropped, client-supplied identity headers stripped, original host kept
/// in `x-forwarded-host`, and identity headers set from the verified session.
pub fn upstream_headers(incoming: &HeaderMap, session: Option<&SessionToken>) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(incoming.len() + 2);
    for (name, value) in incoming {
        let n = name.as_str();
        if is_hop_by_hop(name)
            || n == "host"
            || n == "content-length"
            || n == USER_ID_HEADER
            || n == USER_EMAIL_HEADER
        {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if !headers.contains_key("x-forwarded-host") {
        if let Some(host) = incoming.get("host") {
            headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
        }
    }

    if let Some(session) = session {
        let identity = [
            (USER_ID_HEADER, session.user_id()),
            (USER_EMAIL_HEADER, session.user_email()),
        ];
        for (name, value) in identity {
            if let Some(v) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(HeaderName::from_static(name), v);
            }
        }
    }

    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn incoming() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("host", HeaderValue::from_static("apps.example.org"));
        h.insert("connection", HeaderValue::from_static("keep-alive"));
        h.insert("content-length", HeaderValue::from_static("12"));
        h.insert("accept", HeaderValue::from_static("text/html"));
        h.insert(USER_ID_HEADER, HeaderValue::from_static("spoofed"));
        h
    }

    #[test]
    fn test_strips_hop_by_hop_and_spoofed_identity() {
        let h = upstream_headers(&incoming(), None);
        assert!(h.get("connection").is_none());
        assert!(h.get("host").is_none());
        assert!(h.get("content-length").is_none());
        assert!(h.get(USER_ID_HEADER).is_none());
        assert_eq!(h.get("accept").unwrap(), "text/html");
        assert_eq!(h.get("x-forwarded-host").unwrap(), "apps.example.org");
    }

    #[test]
    fn test_existing_forwarded_host_is_kept() {
        let mut inc = incoming();
        inc.insert("x-forwarded-host", HeaderValue::from_static("edge.example.org"));
        let h = upstream_headers(&inc, None);
        assert_eq!(h.get("x-forwarded-host").unwrap(), "edge.example.org");
    }

    #[test]
    fn test_identity_headers_from_session() {
        let session: SessionToken = serde_json::from_value(json!({
            "sub": "u-7",
            "user": {"email": "ana@example.com"},
            "exp": 1,
        }))
        .unwrap();
        let h = upstream_headers(&incoming(), Some(&session));
        assert_eq!(h.get(USER_ID_HEADER).unwrap(), "u-7");
        assert_eq!(h.get(USER_EMAIL_HEADER).unwrap(), "ana@example.com");
    }
}
