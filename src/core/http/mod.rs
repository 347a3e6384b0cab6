// src/core/http/mod.rs

//! The layered HTTP request pipeline used for all remote I/O.
//!
//! Layers, outer to inner: retry, service binding, auth injection with
//! reauth-on-401/403, status check, JSON codec, content extraction, raw
//! transport. The decorators are plain functions over `RawRequest` and
//! `RawResponse` so each layer is testable in isolation.

mod client;
mod retry;
mod transport;

pub use client::{RequestOptions, ServiceClient};
pub use retry::{RetryPolicy, can_retry_except, default_can_retry};
pub use transport::{Method, RawRequest, RawResponse, ReqwestTransport, Transport};

use crate::core::errors::OtterError;
use bytes::Bytes;
use url::Url;

/// Default HTTP codes considered successful.
pub const DEFAULT_SUCCESS_CODES: &[u16] = &[200];
/// Default HTTP codes that invalidate the cached auth token.
pub const DEFAULT_REAUTH_CODES: &[u16] = &[401, 403];

/// Resolves a relative path (which may carry a query string) against a
/// service endpoint, preserving every existing path segment of the base.
pub fn append_segments(base: &Url, path: &str) -> Result<Url, OtterError> {
    let mut base_str = base.as_str().to_string();
    if !base_str.ends_with('/') {
        base_str.push('/');
    }
    let url = Url::parse(&base_str)?.join(path.trim_start_matches('/'))?;
    Ok(url)
}

/// Fails with a typed `Api` error when the status is not in `success_codes`.
pub fn check_status(success_codes: &[u16], response: &RawResponse) -> Result<(), OtterError> {
    if success_codes.contains(&response.status) {
        return Ok(());
    }
    Err(OtterError::Api {
        code: response.status,
        body: String::from_utf8_lossy(&response.body).into_owned(),
        headers: response.headers.clone(),
    })
}

/// Parses the response body as JSON; an empty body yields `Null`.
pub fn parse_json_body(response: &RawResponse) -> Result<serde_json::Value, OtterError> {
    if response.body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    Ok(serde_json::from_slice(&response.body)?)
}

/// Serializes an optional JSON request body.
pub fn encode_json_body(body: Option<&serde_json::Value>) -> Result<Option<Bytes>, OtterError> {
    match body {
        Some(value) => Ok(Some(Bytes::from(serde_json::to_vec(value)?))),
        None => Ok(None),
    }
}

/// Merges auth headers over caller-provided headers; auth wins on conflict.
pub fn merge_headers(
    caller: &[(String, String)],
    auth: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = caller
        .iter()
        .filter(|(name, _)| !auth.iter().any(|(a, _)| a.eq_ignore_ascii_case(name)))
        .cloned()
        .collect();
    merged.extend(auth.iter().cloned());
    merged
}
