// src/core/http/client.rs

//! A request function pre-bound to a tenant and a service+region, so callers
//! pass only a relative path. Composes every pipeline layer.

use super::retry::{RetryPolicy, default_can_retry};
use super::transport::{Method, RawRequest, RawResponse, Transport};
use super::{
    DEFAULT_REAUTH_CODES, DEFAULT_SUCCESS_CODES, append_segments, check_status, encode_json_body,
    merge_headers, parse_json_body,
};
use crate::core::auth::CachingAuthenticator;
use crate::core::errors::OtterError;
use std::sync::Arc;
use tracing::debug;

/// Per-call knobs of a bound request. `Default` gives the standard pipeline:
/// success on 200, reauth on 401/403, no body, no extra headers.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub success_codes: Vec<u16>,
    pub reauth_codes: Vec<u16>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            headers: Vec::new(),
            body: None,
            success_codes: DEFAULT_SUCCESS_CODES.to_vec(),
            reauth_codes: DEFAULT_REAUTH_CODES.to_vec(),
        }
    }
}

impl RequestOptions {
    pub fn with_body(body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn with_success_codes(codes: &[u16]) -> Self {
        Self {
            success_codes: codes.to_vec(),
            ..Self::default()
        }
    }
}

type RetryPredicate = Arc<dyn Fn(&OtterError) -> bool + Send + Sync>;

/// A typed, retrying, reauthenticating request function bound to one
/// tenant's view of one service in one region.
pub struct ServiceClient {
    transport: Arc<dyn Transport>,
    authenticator: Arc<CachingAuthenticator>,
    tenant_id: String,
    service_name: String,
    region: String,
    retry: RetryPolicy,
    can_retry: RetryPredicate,
}

impl ServiceClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        authenticator: Arc<CachingAuthenticator>,
        tenant_id: impl Into<String>,
        service_name: impl Into<String>,
        region: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            authenticator,
            tenant_id: tenant_id.into(),
            service_name: service_name.into(),
            region: region.into(),
            retry,
            can_retry: Arc::new(default_can_retry),
        }
    }

    /// Replaces the retryability predicate, letting callers opt failures out
    /// of (or into) the retry loop.
    pub fn with_retry_predicate(
        mut self,
        predicate: impl Fn(&OtterError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.can_retry = Arc::new(predicate);
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Issues a request for `path` relative to the bound service endpoint,
    /// returning the parsed response body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<serde_json::Value, OtterError> {
        let mut attempt = 0u32;
        loop {
            match self.request_once(method, path, &options).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts || !(self.can_retry)(&error) {
                        return Err(error);
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        %method,
                        path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying request after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<serde_json::Value, OtterError> {
        self.request(Method::Get, path, RequestOptions::default())
            .await
    }

    /// One authenticated round trip: resolve the endpoint, inject auth
    /// headers, send, and on a reauth status invalidate the cache entry and
    /// re-drive the request exactly once.
    async fn request_once(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> Result<serde_json::Value, OtterError> {
        let body = encode_json_body(options.body.as_ref())?;

        let response = self.send_authenticated(method, path, options, &body).await?;
        let response = if options.reauth_codes.contains(&response.status) {
            self.authenticator.invalidate(&self.tenant_id).await;
            self.send_authenticated(method, path, options, &body).await?
        } else {
            response
        };

        check_status(&options.success_codes, &response)?;
        parse_json_body(&response)
    }

    async fn send_authenticated(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
        body: &Option<bytes::Bytes>,
    ) -> Result<RawResponse, OtterError> {
        let session = self.authenticator.authenticate(&self.tenant_id).await?;
        let endpoint = session
            .catalog
            .public_endpoint(&self.service_name, &self.region)?;
        let url = append_segments(&endpoint, path)?;
        let headers = merge_headers(&options.headers, &session.auth_headers());
        self.transport
            .send(RawRequest {
                method,
                url,
                headers,
                body: body.clone(),
            })
            .await
    }
}
