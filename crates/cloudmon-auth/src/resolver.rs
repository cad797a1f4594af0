//! Endpoint resolution from the service catalog.
//!
//! Resolution picks one deployment per service (the catalog's default, else
//! the first listed) and decomposes its URL into host and base path. Some
//! providers serve APIs that the catalog does not list; those are derived
//! from resolved URLs by [`DerivedEndpointHook`] implementations so the
//! substitution stays out of the resolution logic.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cloudmon_core::{
    CatalogEndpoint, CloudmonError, ResolvedEndpoint, ResolvedEndpoints, Result, ServiceCatalog,
};
use thiserror::Error;
use url::Url;

/// Errors specific to endpoint resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to parse endpoint URL '{url}': {reason}")]
    UnparsableUrl { url: String, reason: String },

    #[error("endpoint URL '{0}' has no host")]
    MissingHost(String),
}

impl From<ResolveError> for CloudmonError {
    fn from(err: ResolveError) -> Self {
        match &err {
            ResolveError::UnparsableUrl { url, .. } | ResolveError::MissingHost(url) => {
                CloudmonError::invalid_url(url.clone(), err.to_string())
            }
        }
    }
}

/// Pick the default deployment of a service.
///
/// The first entry flagged default wins; if none is flagged, the first entry
/// in listed order is used. An empty list yields `None`.
pub fn select_default(endpoints: &[CatalogEndpoint]) -> Option<&CatalogEndpoint> {
    endpoints
        .iter()
        .find(|ep| ep.is_default)
        .or_else(|| endpoints.first())
}

/// Split a URL into scheme, host, port and base path.
///
/// The base path loses its trailing slash; query and fragment are dropped.
pub fn decompose(url: &str) -> Result<ResolvedEndpoint> {
    let parsed = Url::parse(url.trim()).map_err(|e| ResolveError::UnparsableUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ResolveError::MissingHost(url.to_string()))?;

    Ok(ResolvedEndpoint {
        scheme: parsed.scheme().to_string(),
        host: host.to_string(),
        port: parsed.port(),
        base_path: parsed.path().trim_end_matches('/').to_string(),
    })
}

/// Maps a connection-level key (e.g. "monitoring") to a catalog service name
/// (e.g. "cloudMonitoring").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBinding {
    pub key: String,
    pub service: String,
}

impl ServiceBinding {
    pub fn new<K: Into<String>, S: Into<String>>(key: K, service: S) -> Self {
        Self {
            key: key.into(),
            service: service.into(),
        }
    }
}

/// Produces an endpoint that the catalog does not list, from URLs that were
/// resolved from it.
pub trait DerivedEndpointHook: Send + Sync {
    /// Key the derived endpoint is stored under.
    fn key(&self) -> &str;

    /// Derive a URL from the resolved URLs (keyed by binding key).
    ///
    /// Returning `None` skips the derived endpoint.
    fn derive(&self, resolved_urls: &HashMap<String, String>) -> Option<String>;
}

/// Derives the load balancer API URL by textual substitution on the servers
/// URL. The catalog does not list load balancers, so the URL has to be built
/// by hand.
#[derive(Debug, Clone)]
pub struct LoadBalancerHook {
    pub source_key: String,
    pub from: String,
    pub to: String,
    pub key: String,
}

impl Default for LoadBalancerHook {
    fn default() -> Self {
        Self {
            source_key: "server".to_string(),
            from: "servers".to_string(),
            to: "ord.loadbalancers".to_string(),
            key: "load_balancer".to_string(),
        }
    }
}

impl DerivedEndpointHook for LoadBalancerHook {
    fn key(&self) -> &str {
        &self.key
    }

    fn derive(&self, resolved_urls: &HashMap<String, String>) -> Option<String> {
        let source = resolved_urls.get(&self.source_key)?;
        if !source.contains(&self.from) {
            return None;
        }
        Some(source.replace(&self.from, &self.to))
    }
}

/// Resolves a catalog into per-key endpoints.
///
/// The resolver is stateless; the connection calls it at most once and keeps
/// the result for its lifetime.
#[derive(Clone)]
pub struct EndpointResolver {
    bindings: Vec<ServiceBinding>,
    hooks: Vec<Arc<dyn DerivedEndpointHook>>,
}

impl EndpointResolver {
    /// Resolver with the given bindings and no hooks
    pub fn new(bindings: Vec<ServiceBinding>) -> Self {
        Self {
            bindings,
            hooks: Vec::new(),
        }
    }

    /// Default bindings:
    /// `server` ← `cloudServers`, `storage` ← `cloudFiles`,
    /// `cdn_management` ← `cloudFilesCDN`, `monitoring` ← `cloudMonitoring`.
    pub fn default_bindings() -> Vec<ServiceBinding> {
        vec![
            ServiceBinding::new("server", "cloudServers"),
            ServiceBinding::new("storage", "cloudFiles"),
            ServiceBinding::new("cdn_management", "cloudFilesCDN"),
            ServiceBinding::new("monitoring", "cloudMonitoring"),
        ]
    }

    /// Add or replace a binding
    pub fn with_binding(mut self, binding: ServiceBinding) -> Self {
        self.bindings.retain(|b| b.key != binding.key);
        self.bindings.push(binding);
        self
    }

    /// Register a derived-endpoint hook
    pub fn with_hook(mut self, hook: Arc<dyn DerivedEndpointHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Drop every derived-endpoint hook
    pub fn without_hooks(mut self) -> Self {
        self.hooks.clear();
        self
    }

    /// Configured bindings
    pub fn bindings(&self) -> &[ServiceBinding] {
        &self.bindings
    }

    /// Catalog service name bound to a key
    pub fn service_for(&self, key: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.key == key)
            .map(|b| b.service.as_str())
    }

    /// Resolve every binding whose service has a usable entry, then run the
    /// hooks over the resolved URLs.
    ///
    /// Services absent from the catalog are skipped. A URL that cannot be
    /// decomposed is an error.
    pub fn resolve(&self, catalog: &ServiceCatalog) -> Result<ResolvedEndpoints> {
        let mut urls: HashMap<String, String> = HashMap::new();

        for binding in &self.bindings {
            match select_default(catalog.endpoints(&binding.service)) {
                Some(entry) => {
                    tracing::debug!(
                        "resolved '{}' from catalog service '{}' (region {})",
                        binding.key,
                        binding.service,
                        entry.region.as_deref().unwrap_or("-")
                    );
                    urls.insert(binding.key.clone(), entry.url.clone());
                }
                None => {
                    tracing::debug!(
                        "catalog has no entries for service '{}'; '{}' left unresolved",
                        binding.service,
                        binding.key
                    );
                }
            }
        }

        for hook in &self.hooks {
            if urls.contains_key(hook.key()) {
                continue;
            }
            if let Some(url) = hook.derive(&urls) {
                tracing::debug!("derived endpoint '{}' -> {}", hook.key(), url);
                urls.insert(hook.key().to_string(), url);
            }
        }

        let mut resolved = ResolvedEndpoints::new();
        for (key, url) in urls {
            resolved.insert(key, decompose(&url)?);
        }

        Ok(resolved)
    }
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new(Self::default_bindings()).with_hook(Arc::new(LoadBalancerHook::default()))
    }
}

impl fmt::Debug for EndpointResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hook_keys: Vec<&str> = self.hooks.iter().map(|h| h.key()).collect();
        f.debug_struct("EndpointResolver")
            .field("bindings", &self.bindings)
            .field("hooks", &hook_keys)
            .finish()
    }
}
