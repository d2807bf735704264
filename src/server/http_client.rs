use anyhow::Result;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use std::time::Duration;

pub type HttpClient = reqwest::Client;

/// User-Agent sent with every upstream request.
pub const UPSTREAM_USER_AGENT: &str = "TreeRoute/1.0";

pub struct BuildHttpClientArgs<'a> {
    pub api_key: &'a str,
    pub request_timeout: Option<Duration>,
}

/// Create a new [`HttpClient`] that authenticates every request with the given API key.
pub fn build_http_client(args: BuildHttpClientArgs) -> Result<HttpClient> {
    let mut authorization = HeaderValue::from_str(&format!("Bearer {}", args.api_key))?;
    authorization.set_sensitive(true);

    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    default_headers.insert(AUTHORIZATION, authorization);

    let mut builder = reqwest::ClientBuilder::default()
        .user_agent(UPSTREAM_USER_AGENT)
        .default_headers(default_headers);
    if let Some(timeout) = args.request_timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::{BuildHttpClientArgs, build_http_client};

    #[test]
    fn rejects_api_key_with_control_characters() {
        assert!(
            build_http_client(BuildHttpClientArgs {
                api_key: "bad\nkey",
                request_timeout: None,
            })
            .is_err()
        );
    }

    #[test]
    fn builds_with_and_without_timeout() {
        assert!(
            build_http_client(BuildHttpClientArgs {
                api_key: "key",
                request_timeout: None,
            })
            .is_ok()
        );
        assert!(
            build_http_client(BuildHttpClientArgs {
                api_key: "key",
                request_timeout: Some(std::time::Duration::from_secs(5)),
            })
            .is_ok()
        );
    }
}
