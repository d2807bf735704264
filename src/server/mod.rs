#[cfg(feature = "rustls-tls")]
#[cfg(feature = "native-tls")]
compile_error!("You can only enable one TLS backend");

mod http_client;
mod routes;

use anyhow::Result;
use axum::{
    Router,
    extract::{ConnectInfo, Request},
    http::{HeaderValue, header},
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::get,
};
use core::{fmt, net::SocketAddr, time::Duration};
use http_client::{BuildHttpClientArgs, HttpClient, build_http_client};
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tower_http::{
    catch_panic::CatchPanicLayer,
    trace::{self, TraceLayer},
};
use tracing::{Level, info, info_span};
use url::Url;

#[derive(Debug)]
pub struct Server {
    router_inner: Router,
}

/// Settings to run the server with.
#[derive(Debug, Clone)]
pub struct Settings {
    /// See [`UpstreamSettings`].
    pub upstream_settings: UpstreamSettings,
}

/// Configuration options used when forwarding requests to the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Base URL that inbound paths and queries are appended to.
    pub base_url: Url,

    /// Token sent to the upstream as `Authorization: Bearer <token>`.
    pub api_key: ApiKey,

    /// Maximum time an upstream request may take before it is considered failed.
    ///
    /// When unset, the HTTP client's default (no timeout) applies.
    pub request_timeout: Option<Duration>,
}

/// Upstream API credential. Never shown in `Debug` output.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

#[derive(Debug)]
struct AppState {
    http_client: HttpClient,
    server_settings: Settings,
}

impl Server {
    /// Create a new server with the provided settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let router = Router::new()
            .route(
                "/",
                get(routes::forward_handler).options(routes::preflight_handler),
            )
            .route(
                "/{*path}",
                get(routes::forward_handler).options(routes::preflight_handler),
            )
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request| {
                        let remote_addr = request
                            .extensions()
                            .get::<ConnectInfo<SocketAddr>>()
                            .map(|ConnectInfo(addr)| addr.to_string())
                            .unwrap_or_else(|| "-".to_owned());
                        info_span!(
                            "request",
                            remote_addr = %remote_addr,
                            method = %request.method(),
                            uri = %request.uri(),
                            version = ?request.version()
                        )
                    })
                    .on_request(trace::DefaultOnRequest::new().level(Level::INFO))
                    .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(CatchPanicLayer::custom(routes::panic_response))
            .layer(axum_middleware::from_fn(Server::header_middleware))
            .with_state(Arc::new(AppState {
                http_client: build_http_client(BuildHttpClientArgs {
                    api_key: settings.upstream_settings.api_key.expose(),
                    request_timeout: settings.upstream_settings.request_timeout,
                })?,
                server_settings: settings,
            }));

        Ok(Self {
            router_inner: router,
        })
    }

    /// Start the server and expose it locally on the provided [`SocketAddr`].
    pub async fn start(self, address: &SocketAddr) -> Result<()> {
        let tcp_listener = TcpListener::bind(&address).await?;
        info!(
            "Proxy running at http://{} (Ctrl+C to stop)",
            tcp_listener.local_addr()?
        );
        axum::serve(
            tcp_listener,
            self.router_inner
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(Self::shutdown_signal())
        .await?;
        Ok(())
    }

    // https://github.com/tokio-rs/axum/blob/15917c6dbcb4a48707a20e9cfd021992a279a662/examples/graceful-shutdown/src/main.rs#L55
    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    /// Applied to every response, including errors produced by the router or its layers.
    async fn header_middleware(request: Request, next: Next) -> Response {
        let mut response = next.run(request).await;
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, Authorization"),
        );
        headers.append(
            header::SERVER,
            HeaderValue::from_static(env!("CARGO_PKG_NAME")),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiKey, Server, Settings, UpstreamSettings};
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use std::time::Duration;
    use tower::ServiceExt;

    pub(crate) fn test_server(base_url: &str) -> Server {
        test_server_with_upstream_timeout(base_url, Some(Duration::from_secs(5)))
    }

    pub(crate) fn test_server_with_upstream_timeout(
        base_url: &str,
        request_timeout: Option<Duration>,
    ) -> Server {
        Server::new(Settings {
            upstream_settings: UpstreamSettings {
                base_url: base_url.parse().unwrap(),
                api_key: ApiKey::new("test-key"),
                request_timeout,
            },
        })
        .unwrap()
    }

    pub(crate) fn assert_cors_headers(headers: &axum::http::HeaderMap) {
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "Content-Type, Authorization"
        );
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let rendered = format!("{:?}", ApiKey::new("em_live_secret"));
        assert!(!rendered.contains("em_live_secret"));
    }

    #[tokio::test]
    async fn unsupported_method_still_gets_cors_headers() {
        let server = test_server("http://127.0.0.1:9");
        let response = server
            .router_inner
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/v1/factors")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors_headers(response.headers());
        assert_eq!(response.headers()[header::SERVER], env!("CARGO_PKG_NAME"));
    }
}
