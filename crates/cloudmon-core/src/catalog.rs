//! Service catalog types.
//!
//! The identity service returns a catalog mapping service names (for example
//! `cloudServers` or `cloudMonitoring`) to the regional deployments of that
//! service. This module defines the wire shape of that catalog and the
//! decomposed endpoint form the connection caches after resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One regional deployment of a service, as listed in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEndpoint {
    /// Region identifier (e.g. "DFW", "ORD"). Some global services omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Public base URL of this deployment.
    #[serde(rename = "publicURL", alias = "url")]
    pub url: String,

    /// Internal (service-net) URL, when the provider exposes one.
    #[serde(
        rename = "internalURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_url: Option<String>,

    /// Whether the catalog marks this deployment as the preferred one.
    #[serde(rename = "v1Default", alias = "isDefault", default)]
    pub is_default: bool,
}

impl CatalogEndpoint {
    /// Create a catalog entry
    pub fn new<S: Into<String>>(region: Option<S>, url: S, is_default: bool) -> Self {
        Self {
            region: region.map(Into::into),
            url: url.into(),
            internal_url: None,
            is_default,
        }
    }
}

/// Service catalog: service name -> ordered regional endpoints.
///
/// Order matters: when no entry is flagged default, the first listed entry
/// wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: HashMap<String, Vec<CatalogEndpoint>>,
}

impl ServiceCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the endpoint list for a service
    pub fn with_service<S: Into<String>>(mut self, name: S, endpoints: Vec<CatalogEndpoint>) -> Self {
        self.services.insert(name.into(), endpoints);
        self
    }

    /// Endpoints listed for a service; empty when the service is absent.
    pub fn endpoints(&self, service: &str) -> &[CatalogEndpoint] {
        self.services
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names of all services in the catalog
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    /// Number of services in the catalog
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the catalog lists no services
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// An endpoint URL decomposed into the parts requests are built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    /// URL scheme ("https" or "http")
    pub scheme: String,

    /// Host name, without port
    pub host: String,

    /// Explicit port, if the URL carried a non-default one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Path prefix every request on this endpoint is issued under, without a
    /// trailing slash (e.g. "/v1.0/123456"). Empty for a bare host.
    pub base_path: String,
}

impl ResolvedEndpoint {
    /// `scheme://host[:port]`
    pub fn origin(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}", self.scheme, self.host, port),
            None => format!("{}://{}", self.scheme, self.host),
        }
    }

    /// Full request path for an action path relative to this endpoint.
    pub fn request_path(&self, path: &str) -> String {
        if path.is_empty() {
            return self.base_path.clone();
        }
        if path.starts_with('/') {
            format!("{}{}", self.base_path, path)
        } else {
            format!("{}/{}", self.base_path, path)
        }
    }

    /// Absolute URL for an action path relative to this endpoint.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.origin(), self.request_path(path))
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin(), self.base_path)
    }
}

/// Resolved endpoints keyed by the connection-level service key
/// (e.g. "monitoring", "server", "load_balancer").
pub type ResolvedEndpoints = HashMap<String, ResolvedEndpoint>;
