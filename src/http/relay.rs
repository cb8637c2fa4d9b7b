//! Relay endpoint: turns an HTTP call into a relayed request and waits for its response.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::body_store::BodyRemoval;
use crate::coordination::{RelayError, RelayedResponse, ResponseBody};
use crate::http::{AppState, X_RELAY_REQUEST_ID};
use crate::model::{ClientRequest, HttpHeaders};
use crate::observability::metrics;
use crate::transport::TransportError;

/// Headers that describe the hop rather than the message.
const HOP_HEADERS: &[&str] = &[
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Request header asking connectors to trace the request.
const X_RELAY_TRACE: &str = "x-relay-trace";

#[derive(Debug, Deserialize)]
pub struct RelayPath {
    tenant: String,
    target: String,
    #[serde(default)]
    path: String,
}

pub async fn relay_handler(
    State(state): State<AppState>,
    Path(params): Path<RelayPath>,
    request: Request<Body>,
) -> Response {
    let started = Instant::now();
    let core = &state.core;
    let settings = core.settings();

    let Some(tenant) = state.tenants.find(&params.tenant) else {
        tracing::warn!(tenant = %params.tenant, "Relay call for unknown tenant");
        return finish(StatusCode::NOT_FOUND, "Unknown tenant", started);
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, settings.max_request_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(tenant = %tenant.name, error = %e, "Failed to read request body");
            return finish(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large", started);
        }
    };

    let mut client_request = ClientRequest::new(tenant.name.clone(), params.target, core.origin_id());
    client_request.http_method = parts.method.to_string();
    client_request.url = relay_url(&params.path, parts.uri.query());
    client_request.http_headers = collect_headers(&parts.headers);
    client_request.acknowledge_mode = tenant.acknowledge_mode;
    client_request.enable_tracing = parts.headers.contains_key(X_RELAY_TRACE);
    let request_id = client_request.request_id;

    tracing::debug!(
        request_id = %request_id,
        tenant = %tenant.name,
        target = %client_request.target,
        method = %client_request.http_method,
        url = %client_request.url,
        "Relaying request"
    );

    let _request_body = (body.len() as u64 > settings.maximum_binary_size)
        .then(|| BodyRemoval::request(core.body_store().clone(), request_id));
    let _waiting = core.responses().register_request(request_id);

    if let Err(e) = core.requests().process_request(client_request, body).await {
        return relay_failure(request_id, e, started);
    }

    let cancellation = state.shutdown.child_token();
    let timeout = Duration::from_secs(settings.request_timeout_secs);
    match tokio::time::timeout(timeout, core.responses().get_response(request_id, &cancellation)).await {
        Ok(Ok(relayed)) => relay_response(relayed, started),
        Ok(Err(e)) => relay_failure(request_id, e, started),
        Err(_) => {
            tracing::warn!(request_id = %request_id, timeout_secs = timeout.as_secs(), "Timed out waiting for response");
            finish(StatusCode::GATEWAY_TIMEOUT, "Timed out waiting for the target", started)
        }
    }
}

/// Relative url forwarded to the connector.
fn relay_url(path: &str, query: Option<&str>) -> String {
    let mut url = format!("/{}", path.trim_start_matches('/'));
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

fn collect_headers(headers: &HeaderMap) -> HttpHeaders {
    let mut collected = HttpHeaders::new();
    for (name, value) in headers {
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            collected
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    collected
}

fn relay_response(relayed: RelayedResponse, started: Instant) -> Response {
    let response = relayed.response;
    let status = StatusCode::from_u16(response.http_status_code).unwrap_or(StatusCode::BAD_GATEWAY);

    let body = match relayed.body {
        ResponseBody::Empty => Body::empty(),
        ResponseBody::Inline(bytes) => Body::from(bytes),
        ResponseBody::Outsourced(reader) => Body::from_stream(ReaderStream::new(reader)),
    };

    let mut http_response = Response::new(body);
    *http_response.status_mut() = status;
    let headers = http_response.headers_mut();
    for (name, values) in &response.http_headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        if HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    if let Ok(value) = HeaderValue::from_str(&response.request_id.to_string()) {
        headers.insert(X_RELAY_REQUEST_ID, value);
    }

    tracing::debug!(
        request_id = %response.request_id,
        status = status.as_u16(),
        request_failed = response.request_failed,
        "Relayed response"
    );
    metrics::record_relay_duration(status.as_u16(), started);
    http_response
}

fn relay_failure(request_id: Uuid, error: RelayError, started: Instant) -> Response {
    let (status, message) = match &error {
        RelayError::Transport(TransportError::NoConnector { .. }) => {
            (StatusCode::SERVICE_UNAVAILABLE, "No connector available for tenant")
        }
        RelayError::Cancelled(_) => (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down"),
        _ => (StatusCode::BAD_GATEWAY, "Relay failed"),
    };
    tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %error, "Relay failed");
    finish(status, message, started)
}

fn finish(status: StatusCode, message: &'static str, started: Instant) -> Response {
    metrics::record_relay_duration(status.as_u16(), started);
    (status, message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_url() {
        assert_eq!(relay_url("", None), "/");
        assert_eq!(relay_url("orders/42", Some("expand=lines")), "/orders/42?expand=lines");
    }

    #[test]
    fn test_collect_headers_skips_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("relay.local"));
        headers.append("accept", HeaderValue::from_static("text/html"));
        headers.append("accept", HeaderValue::from_static("application/json"));

        let collected = collect_headers(&headers);
        assert!(!collected.contains_key("host"));
        assert_eq!(collected["accept"], vec!["text/html", "application/json"]);
    }
}
