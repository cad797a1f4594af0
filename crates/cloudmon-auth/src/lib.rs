//! Authentication and endpoint resolution for cloudmon.
//!
//! - [`TokenAuthenticator`] exchanges credentials for a token and the
//!   service catalog.
//! - [`EndpointResolver`] turns the catalog into decomposed per-service
//!   endpoints.
//!
//! Neither caches anything. Caching (at most once per connection) is done by
//! the connection in `cloudmon-client`.

pub mod authenticator;
pub mod resolver;

pub use authenticator::{AuthResult, TokenAuthenticator};
pub use resolver::{
    decompose, select_default, DerivedEndpointHook, EndpointResolver, LoadBalancerHook,
    ResolveError, ServiceBinding,
};
