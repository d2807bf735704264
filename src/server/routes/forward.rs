use crate::server::{AppState, routes::ErrorResponse};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderValue, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Result of forwarding a single request to the upstream.
#[derive(Debug)]
pub enum UpstreamOutcome {
    /// Upstream answered with a successful status.
    Success { status: StatusCode, body: Bytes },
    /// Upstream answered with a 4xx/5xx status and a readable body.
    UpstreamError { status: StatusCode, body: Bytes },
    /// No usable response was received.
    TransportFault(String),
}

impl IntoResponse for UpstreamOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Success { status, body } | Self::UpstreamError { status, body } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            Self::TransportFault(error) => {
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { error })).into_response()
            }
        }
    }
}

/// Join the inbound path and query onto the upstream base URL without re-encoding either.
pub fn upstream_url(base_url: &Url, uri: &Uri) -> String {
    let mut url = format!("{}{}", base_url.as_str().trim_end_matches('/'), uri.path());
    if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(query);
    }
    url
}

pub async fn forward_handler(State(state): State<Arc<AppState>>, uri: Uri) -> UpstreamOutcome {
    let url = upstream_url(&state.server_settings.upstream_settings.base_url, &uri);
    info!("Forwarding to {url}");

    let response = match state.http_client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!("Failed to make request to upstream server: {err:?}");
            return UpstreamOutcome::TransportFault(format!("{:#}", anyhow::Error::from(err)));
        }
    };

    let status = response.status();
    let body = match response.bytes().await {
        Ok(body) => body,
        Err(err) => {
            warn!("Failed to read response body from upstream server: {err:?}");
            return UpstreamOutcome::TransportFault(format!("{:#}", anyhow::Error::from(err)));
        }
    };

    if status.is_client_error() || status.is_server_error() {
        UpstreamOutcome::UpstreamError { status, body }
    } else {
        UpstreamOutcome::Success { status, body }
    }
}

pub async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}
