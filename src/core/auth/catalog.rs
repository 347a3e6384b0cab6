// src/core/auth/catalog.rs

//! The service catalog returned by the identity service, and endpoint lookup.

use crate::core::errors::OtterError;
use serde::{Deserialize, Serialize};
use url::Url;

/// One endpoint of a catalog entry. Region is absent for region-less
/// (global) services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "publicURL")]
    pub public_url: Url,
}

/// One service in the tenant's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogService {
    pub name: String,
    #[serde(rename = "type", default)]
    pub service_type: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

/// A tenant's service catalog: the set of services and regional endpoints
/// the token is valid for.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    pub services: Vec<CatalogService>,
}

impl ServiceCatalog {
    /// Looks up the public endpoint for a service by name and region.
    /// Region-less endpoints match any requested region.
    pub fn public_endpoint(&self, service: &str, region: &str) -> Result<Url, OtterError> {
        self.services
            .iter()
            .filter(|s| s.name == service)
            .flat_map(|s| s.endpoints.iter())
            .find(|e| match &e.region {
                Some(r) => r.eq_ignore_ascii_case(region),
                None => true,
            })
            .map(|e| e.public_url.clone())
            .ok_or_else(|| OtterError::NoSuchEndpoint {
                service: service.to_string(),
                region: region.to_string(),
            })
    }
}
