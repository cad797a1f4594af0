//! Core types, errors, and shared functionality for cloudmon.
//!
//! This crate provides the foundational types used throughout cloudmon:
//!
//! - **Error types**: [`CloudmonError`] and the crate-wide [`Result`] alias
//! - **Catalog types**: the identity service's service catalog and the
//!   decomposed endpoints resolved from it
//! - **Resource records**: entities, checks, alarms, notifications and
//!   notification plans, plus their create/update payloads
//! - **Transport**: the [`Transport`] trait every HTTP call goes through
//!
//! # Examples
//!
//! ## Reading a catalog
//!
//! ```rust
//! use cloudmon_core::catalog::ServiceCatalog;
//!
//! let catalog: ServiceCatalog = serde_json::from_str(
//!     r#"{"cloudMonitoring": [{"publicURL": "https://monitoring.example.com/v1.0/42"}]}"#,
//! ).unwrap();
//! assert_eq!(catalog.endpoints("cloudMonitoring").len(), 1);
//! ```
//!
//! ## Error handling
//!
//! ```rust
//! use cloudmon_core::{CloudmonError, Result};
//!
//! fn example_operation() -> Result<String> {
//!     Err(CloudmonError::rejected_credentials(""))
//! }
//!
//! match example_operation() {
//!     Ok(val) => println!("Success: {}", val),
//!     Err(e) if e.is_auth_failure() => println!("Auth failed: {}", e),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```

pub mod catalog;
pub mod error;
pub mod resources;
pub mod transport;

// Re-export commonly used types for convenience
pub use catalog::{CatalogEndpoint, ResolvedEndpoint, ResolvedEndpoints, ServiceCatalog};
pub use error::{CloudmonError, Result, ValidationError};
pub use resources::{
    Alarm, AlarmUpdate, Check, CheckUpdate, Entity, EntityUpdate, Metadata, NewAlarm, NewCheck,
    NewEntity, NewNotification, NewNotificationPlan, Notification, NotificationPlan,
    NotificationPlanUpdate, NotificationUpdate, Resource, ResourceKind,
};
pub use transport::{HttpRequest, HttpResponse, Transport};

/// Credentials exchanged for a token at the identity service.
///
/// Both values are opaque and never validated locally. The key is redacted
/// from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account user name
    pub username: String,

    /// API key
    pub api_key: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new<U: Into<String>, K: Into<String>>(username: U, api_key: K) -> Self {
        Self {
            username: username.into(),
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Prelude module for convenient imports.
///
/// ```rust
/// use cloudmon_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::catalog::{ResolvedEndpoint, ServiceCatalog};
    pub use crate::error::{CloudmonError, Result};
    pub use crate::resources::{Alarm, Check, Entity, Notification, NotificationPlan, Resource};
    pub use crate::transport::{HttpRequest, HttpResponse, Transport};
    pub use crate::Credentials;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _catalog = ServiceCatalog::new();
        let _error = CloudmonError::config("test");
        let _creds = Credentials::new("user", "key");
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = Credentials::new("alice", "s3cr3t");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("s3cr3t"));
    }
}
