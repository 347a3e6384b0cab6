// src/core/auth/identity.rs

//! The credential exchange against the identity endpoint.

use super::catalog::ServiceCatalog;
use crate::core::errors::OtterError;
use crate::core::http::{Method, RawRequest, Transport, append_segments, parse_json_body};
use crate::core::model::timestamp;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use url::Url;

/// The two supported token-exchange strategies.
#[derive(Debug, Clone)]
pub enum Credentials {
    Password { username: String, password: String },
    ApiKey { username: String, api_key: String },
}

impl Credentials {
    /// The `POST /tokens` request payload for this strategy.
    fn payload(&self) -> serde_json::Value {
        match self {
            Credentials::Password { username, password } => json!({
                "auth": {
                    "passwordCredentials": {
                        "username": username,
                        "password": password,
                    }
                }
            }),
            Credentials::ApiKey { username, api_key } => json!({
                "auth": {
                    "RAX-KSKEY:apiKeyCredentials": {
                        "username": username,
                        "apiKey": api_key,
                    }
                }
            }),
        }
    }
}

/// A tenant's authenticated session: the token and the catalog it unlocks.
#[derive(Debug, Clone)]
pub struct TenantSession {
    pub token: String,
    pub tenant_id: String,
    pub catalog: ServiceCatalog,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TenantSession {
    /// The headers the auth-injection layer merges over caller headers.
    pub fn auth_headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-auth-token".to_string(), self.token.clone()),
            ("accept".to_string(), "application/json".to_string()),
            ("content-type".to_string(), "application/json".to_string()),
        ]
    }
}

#[derive(Deserialize)]
struct TokenEnvelope {
    access: Access,
}

#[derive(Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: ServiceCatalog,
}

#[derive(Deserialize)]
struct Token {
    id: String,
    #[serde(default)]
    expires: Option<String>,
    tenant: Tenant,
}

#[derive(Deserialize)]
struct Tenant {
    id: String,
}

/// A thin client for the identity endpoint. Lives below the auth cache, so
/// it performs no caching or retries itself; the request pipeline retries
/// `AuthenticationUnavailable` failures.
pub struct IdentityClient {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    credentials: Credentials,
}

impl IdentityClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, credentials: Credentials) -> Self {
        Self {
            transport,
            endpoint,
            credentials,
        }
    }

    /// Exchanges credentials for a `(token, catalog)` pair scoped to
    /// `tenant_id`. Rejected credentials are fatal (`AuthenticationFailed`);
    /// transport failures and identity-side 5xx are retryable
    /// (`AuthenticationUnavailable`).
    pub async fn authenticate(&self, tenant_id: &str) -> Result<TenantSession, OtterError> {
        let mut payload = self.credentials.payload();
        payload["auth"]["tenantId"] = json!(tenant_id);

        let url = append_segments(&self.endpoint, "tokens")?;
        let body = Bytes::from(serde_json::to_vec(&payload)?);
        let response = self
            .transport
            .send(RawRequest {
                method: Method::Post,
                url,
                headers: vec![
                    ("accept".to_string(), "application/json".to_string()),
                    ("content-type".to_string(), "application/json".to_string()),
                ],
                body: Some(body),
            })
            .await
            .map_err(|e| OtterError::AuthenticationUnavailable(e.to_string()))?;

        match response.status {
            200 | 203 => {}
            code if code >= 500 => {
                return Err(OtterError::AuthenticationUnavailable(format!(
                    "identity returned {code}"
                )));
            }
            code => {
                return Err(OtterError::AuthenticationFailed(format!(
                    "identity rejected credentials with {code}"
                )));
            }
        }

        let parsed = parse_json_body(&response)?;
        let envelope: TokenEnvelope = serde_json::from_value(parsed)
            .map_err(|e| OtterError::AuthenticationUnavailable(format!("bad token body: {e}")))?;

        let expires_at = match envelope.access.token.expires.as_deref() {
            Some(raw) => Some(timestamp::from_zulu(raw).map_err(|_| {
                OtterError::AuthenticationUnavailable(format!("bad token expiry '{raw}'"))
            })?),
            None => None,
        };

        Ok(TenantSession {
            token: envelope.access.token.id,
            tenant_id: envelope.access.token.tenant.id,
            catalog: envelope.access.service_catalog,
            expires_at,
        })
    }
}
