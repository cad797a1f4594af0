//! Configuration loading and types for cloudmon.
//!
//! This crate is responsible for:
//! - Defining the configuration model consumed by the client and the CLI
//! - Loading configuration from TOML files
//! - Providing a simple default search strategy (/etc/cloudmon/cloudmon.toml, ./cloudmon.toml)
//!
//! Credentials live in this file; nothing is read from the environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use cloudmon_core::{CloudmonError, Credentials, Result};

/// Default identity endpoint (US region, v1.1 auth API).
pub const DEFAULT_AUTH_URL: &str = "https://auth.api.rackspacecloud.com/v1.1";

/// Default resolver key of the monitoring service.
pub const DEFAULT_SERVICE: &str = "monitoring";

/// Root configuration struct for cloudmon.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudmonConfig {
    /// Identity service and credentials.
    pub auth: AuthConfig,

    /// Monitoring API options.
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Logging options.
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

impl CloudmonConfig {
    /// Perform basic structural validation of the configuration.
    ///
    /// This does not contact the identity service; bad credentials are only
    /// discovered on the first request.
    pub fn validate(&self) -> Result<()> {
        self.validate_auth()?;
        self.validate_monitoring()?;
        Ok(())
    }

    /// Credentials as the client consumes them.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.auth.username.clone(), self.auth.api_key.clone())
    }

    /// Log level from `[telemetry]`, if configured.
    pub fn log_level(&self) -> Option<&str> {
        self.telemetry.as_ref().and_then(|t| t.log_level.as_deref())
    }

    fn validate_auth(&self) -> Result<()> {
        if self.auth.username.trim().is_empty() {
            return Err(CloudmonError::invalid_config(
                "auth.username",
                "auth.username must not be empty",
            ));
        }

        if self.auth.api_key.trim().is_empty() {
            return Err(CloudmonError::invalid_config(
                "auth.api_key",
                "auth.api_key must not be empty",
            ));
        }

        if !looks_like_http_url(&self.auth.url) {
            return Err(CloudmonError::invalid_config(
                "auth.url",
                "auth.url must start with http:// or https://",
            ));
        }

        Ok(())
    }

    fn validate_monitoring(&self) -> Result<()> {
        if self.monitoring.service.trim().is_empty() {
            return Err(CloudmonError::invalid_config(
                "monitoring.service",
                "monitoring.service must not be empty",
            ));
        }

        if let Some(base_url) = &self.monitoring.base_url {
            if !looks_like_http_url(base_url) {
                return Err(CloudmonError::invalid_config(
                    "monitoring.base_url",
                    format!(
                        "monitoring.base_url must start with http:// or https:// (got '{}')",
                        base_url
                    ),
                ));
            }
        }

        if self.monitoring.page_limit == Some(0) {
            return Err(CloudmonError::invalid_config(
                "monitoring.page_limit",
                "monitoring.page_limit must be greater than zero",
            ));
        }

        if self.monitoring.timeout_secs == 0 {
            return Err(CloudmonError::invalid_config(
                "monitoring.timeout_secs",
                "monitoring.timeout_secs must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Identity service configuration section.
#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity API; `/auth` is appended to it.
    #[serde(default = "default_auth_url")]
    pub url: String,

    /// Account user name.
    pub username: String,

    /// API key for the account.
    pub api_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Monitoring API configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Resolver key of the service to talk to (default `monitoring`).
    #[serde(default = "default_service")]
    pub service: String,

    /// Forced base URL, bypassing the service catalog.
    ///
    /// A token is still obtained from the identity service.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Page size requested from listing endpoints (`limit` query parameter).
    #[serde(default)]
    pub page_limit: Option<u32>,

    /// Per-request timeout enforced by the HTTP transport.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            base_url: None,
            page_limit: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Level or filter expression, e.g. `info` or `info,cloudmon_client=debug`.
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Parse configuration from a TOML string.
pub fn from_toml_str(contents: &str) -> Result<CloudmonConfig> {
    toml::from_str(contents)
        .map_err(|err| CloudmonError::invalid_config("<toml>", format!("failed to parse config: {}", err)))
}

/// Load configuration from a specific file path.
///
/// This function parses TOML into [`CloudmonConfig`] and maps errors into
/// [`CloudmonError::Config`] / [`CloudmonError::InvalidConfig`] as appropriate.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<CloudmonConfig> {
    let path_ref = path.as_ref();
    let contents = fs::read_to_string(path_ref).map_err(|err| {
        CloudmonError::config(format!(
            "failed to read config file '{}': {}",
            path_ref.display(),
            err
        ))
    })?;

    let cfg: CloudmonConfig = toml::from_str(&contents).map_err(|err| {
        CloudmonError::invalid_config(
            path_ref.display().to_string(),
            format!("failed to parse config: {}", err),
        )
    })?;

    Ok(cfg)
}

/// Attempt to load configuration using the default search strategy.
///
/// Current strategy (in order):
/// 1. `/etc/cloudmon/cloudmon.toml`
/// 2. `./cloudmon.toml` (in the current working directory)
pub fn load_default() -> Result<CloudmonConfig> {
    let candidates = [
        PathBuf::from("/etc/cloudmon/cloudmon.toml"),
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("cloudmon.toml"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return load_from_path(candidate);
        }
    }

    Err(CloudmonError::config(
        "no configuration file found; provide a path explicitly or create /etc/cloudmon/cloudmon.toml or ./cloudmon.toml",
    ))
}

fn looks_like_http_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("http://") || url.starts_with("https://")
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    fn minimal_config() -> CloudmonConfig {
        CloudmonConfig {
            auth: AuthConfig {
                url: DEFAULT_AUTH_URL.to_string(),
                username: "alice".to_string(),
                api_key: "key".to_string(),
            },
            monitoring: MonitoringConfig::default(),
            telemetry: None,
        }
    }

    #[test]
    fn test_load_from_path_minimal() {
        let path = PathBuf::from("test_cloudmon_config_minimal.toml");

        let _ = fs::remove_file(&path);

        {
            let mut file = fs::File::create(&path).expect("create temp config file");
            writeln!(
                file,
                r#"
[auth]
username = "alice"
api_key = "0123456789abcdef"

[monitoring]
page_limit = 50

[telemetry]
log_level = "debug"
"#
            )
            .expect("write config");
        }

        let cfg = load_from_path(&path).expect("load config");

        assert_eq!(cfg.auth.url, DEFAULT_AUTH_URL);
        assert_eq!(cfg.auth.username, "alice");
        assert_eq!(cfg.monitoring.service, "monitoring");
        assert_eq!(cfg.monitoring.page_limit, Some(50));
        assert_eq!(cfg.monitoring.timeout_secs, 30);
        assert!(cfg.monitoring.base_url.is_none());
        assert_eq!(cfg.log_level(), Some("debug"));
        assert!(cfg.validate().is_ok());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_errors() {
        let res = load_from_path("/this/definitely/does/not/exist.toml");
        assert!(res.is_err());
    }

    #[test]
    fn test_missing_auth_section_errors() {
        let res = from_toml_str("[monitoring]\npage_limit = 10\n");
        assert!(matches!(res, Err(CloudmonError::InvalidConfig { .. })));
    }

    #[test]
    fn test_forced_base_url_is_parsed() {
        let cfg = from_toml_str(
            r#"
[auth]
url = "https://lon.auth.api.rackspacecloud.com/v1.1"
username = "bob"
api_key = "k"

[monitoring]
base_url = "https://monitoring.api.rackspacecloud.com/v1.0/123"
"#,
        )
        .expect("parse");

        assert_eq!(
            cfg.monitoring.base_url.as_deref(),
            Some("https://monitoring.api.rackspacecloud.com/v1.0/123")
        );
        assert_eq!(cfg.credentials().username, "bob");
    }

    #[test]
    fn test_validate_rejects_empty_username() {
        let mut cfg = minimal_config();
        cfg.auth.username = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_urls() {
        let mut cfg = minimal_config();
        cfg.auth.url = "ftp://auth".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = minimal_config();
        cfg.monitoring.base_url = Some("monitoring.example.com".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_limit() {
        let mut cfg = minimal_config();
        cfg.monitoring.page_limit = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut cfg = minimal_config();
        cfg.monitoring.timeout_secs = 0;
        assert!(matches!(
            cfg.validate(),
            Err(CloudmonError::InvalidConfig { ref field, .. }) if field == "monitoring.timeout_secs"
        ));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let cfg = minimal_config();
        let printed = format!("{:?}", cfg);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("\"key\""));
    }
}
