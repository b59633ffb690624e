//! Blocking HTTP plumbing shared by the provider clients.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{RagError, Result};

/// Builds a client with JSON content type, `headers` and a request timeout.
pub(crate) fn build_client(
    provider: &'static str,
    timeout: Duration,
    headers: &[(HeaderName, &str)],
) -> Result<Client> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let value = HeaderValue::from_str(value.trim()).map_err(|_| {
            RagError::config(format!("invalid {provider} header value for {name}"))
        })?;
        map.insert(name.clone(), value);
    }
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(map)
        .build()
        .map_err(|err| RagError::config(format!("failed to build {provider} HTTP client: {err}")))
}

/// Rejects blank credentials before any request is made.
pub(crate) fn require_key(provider: &'static str, key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(RagError::config(format!("missing {provider} API key")));
    }
    Ok(())
}

/// Sends `request` and maps non-success statuses onto [`RagError`].
pub(crate) fn send(provider: &'static str, request: RequestBuilder) -> Result<Response> {
    let resp = request
        .send()
        .map_err(|err| transport_error(provider, err))?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(status_error(provider, status, body))
}

/// Sends `request` and decodes a JSON body.
pub(crate) fn send_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T> {
    send(provider, request)?
        .json()
        .map_err(|err| transport_error(provider, err))
}

pub(crate) fn status_error(provider: &'static str, status: StatusCode, body: String) -> RagError {
    let detail = format!("{status}: {body}");
    match status {
        StatusCode::TOO_MANY_REQUESTS => RagError::RateLimited { provider, detail },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            RagError::ProviderTimeout { provider, detail }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RagError::ProviderUnavailable {
            provider,
            detail,
            transient: false,
        },
        status if status.is_server_error() => RagError::ProviderUnavailable {
            provider,
            detail,
            transient: true,
        },
        status => RagError::ProviderRejected {
            provider,
            status: status.as_u16(),
            detail: body,
        },
    }
}

pub(crate) fn transport_error(provider: &'static str, err: reqwest::Error) -> RagError {
    let detail = err.to_string();
    if err.is_timeout() {
        RagError::ProviderTimeout { provider, detail }
    } else if err.is_decode() {
        RagError::InvalidResponse { provider, detail }
    } else if err.is_builder() {
        RagError::config(format!("invalid {provider} request: {detail}"))
    } else {
        RagError::ProviderUnavailable {
            provider,
            detail,
            transient: true,
        }
    }
}
