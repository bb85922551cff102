//! Configuration types for the DDNS system
//!
//! Settings live in a single JSON document (default `config/config.json`,
//! overridable with the `CONFIG` environment variable). The document is read
//! at startup and again on every confirmed reload.
//!
//! ```json
//! {
//!   "http": 80,
//!   "https": 443,
//!   "tls_cert": "config/cert.pem",
//!   "tls_key": "config/key.pem",
//!   "www": "www",
//!   "data": "data",
//!   "email": "",
//!   "token": "cf-api-token",
//!   "zone": "023e105f4ecef8ad9ca31a8372d0c353",
//!   "records": [{ "name": "home.example.com", "type": "AAAA", "proxied": false }],
//!   "static_ipv6": ""
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::Ipv6Addr;
use std::path::{Path, PathBuf};

/// Default location of the settings file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Environment variable overriding [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_ENV: &str = "CONFIG";

/// Resolve the settings path from the environment
///
/// An unset or empty `CONFIG` falls back to [`DEFAULT_CONFIG_PATH`].
pub fn config_path_from_env() -> PathBuf {
    config_path_from(std::env::var(CONFIG_ENV).ok())
}

fn config_path_from(value: Option<String>) -> PathBuf {
    match value {
        Some(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Daemon settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Plain HTTP listener port
    pub http: u16,

    /// HTTPS listener port (only used when both TLS paths are set)
    pub https: u16,

    /// TLS certificate path (PEM)
    pub tls_cert: String,

    /// TLS private key path (PEM)
    pub tls_key: String,

    /// Static web root
    pub www: PathBuf,

    /// Data directory (log file lives here)
    pub data: PathBuf,

    /// Account email; selects global-key authentication when set
    pub email: String,

    /// API token (or global API key when `email` is set)
    /// ⚠️ NEVER log this value
    pub token: String,

    /// Zone identifier
    pub zone: String,

    /// Desired DNS records
    pub records: Vec<RecordConfig>,

    /// IPv6 address to publish instead of the detected one
    pub static_ipv6: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http: 80,
            https: 443,
            tls_cert: String::new(),
            tls_key: String::new(),
            www: PathBuf::from("www"),
            data: PathBuf::from("data"),
            email: String::new(),
            token: String::new(),
            zone: String::new(),
            records: Vec::new(),
            static_ipv6: String::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`
    ///
    /// - Missing file → [`Settings::default()`]
    /// - Malformed or invalid document → [`Error::Parse`]
    /// - Any other read failure → [`Error::TransientIo`]
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Settings file does not exist, using defaults: {}", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(Error::transient_io(format!(
                    "Failed to read settings file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let settings = Self::from_slice(&content)
            .map_err(|e| Error::parse(format!("{}: {}", path.display(), e)))?;

        Ok(settings)
    }

    /// Parse and validate a settings document
    pub fn from_slice(content: &[u8]) -> Result<Self> {
        let settings: Settings = serde_json::from_slice(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        for record in &self.records {
            record.validate()?;
        }
        self.static_ipv6()?;
        Ok(())
    }

    /// Parsed `static_ipv6`, `None` when unset
    pub fn static_ipv6(&self) -> Result<Option<Ipv6Addr>> {
        let value = self.static_ipv6.trim();
        if value.is_empty() {
            return Ok(None);
        }
        value
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("static_ipv6 is not an IPv6 address: {}", value)))
    }

    /// Whether both TLS paths are configured
    pub fn tls_enabled(&self) -> bool {
        !self.tls_cert.is_empty() && !self.tls_key.is_empty()
    }
}

/// DNS record configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Fully qualified record name (e.g., "home.example.com")
    pub name: String,

    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Whether traffic goes through the provider's proxy
    #[serde(default)]
    pub proxied: bool,
}

impl RecordConfig {
    /// Create a new record configuration
    pub fn new(name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            name: name.into(),
            record_type,
            proxied: false,
        }
    }

    /// Set the proxied flag
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = proxied;
        self
    }

    /// Validate that the record name is a valid domain name
    ///
    /// This implements basic DNS domain name validation per RFC 1035.
    /// It's not comprehensive but catches common errors.
    pub fn validate(&self) -> Result<()> {
        let domain = self.name.as_str();
        if domain.is_empty() {
            return Err(Error::config("Record name cannot be empty"));
        }

        // Total length limit (RFC 1035: 253 chars max)
        if domain.len() > 253 {
            return Err(Error::config(format!(
                "Record name too long: {} chars (max 253). Got: {}",
                domain.len(),
                domain
            )));
        }

        for label in domain.split('.') {
            if label.is_empty() {
                return Err(Error::config(format!("Record name has empty label: '{}'", domain)));
            }

            if label.len() > 63 {
                return Err(Error::config(format!(
                    "Record label too long: {} chars (max 63). Label: '{}'",
                    label.len(),
                    label
                )));
            }

            // Wildcard labels ("*.example.com") are accepted in leading position only
            if label == "*" && domain.starts_with("*.") {
                continue;
            }

            if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(Error::config(format!(
                    "Record label contains invalid characters. Label: '{}'",
                    label
                )));
            }

            if label.starts_with('-') || label.ends_with('-') {
                return Err(Error::config(format!(
                    "Record label cannot start or end with hyphen. Label: '{}'",
                    label
                )));
            }
        }

        Ok(())
    }
}

/// DNS record type managed by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Parse a provider-reported type; `None` for types the daemon does not manage
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "A" => Some(RecordType::A),
            "AAAA" => Some(RecordType::Aaaa),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn config_path_falls_back_to_default() {
        assert_eq!(config_path_from(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(config_path_from(Some(String::new())), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(
            config_path_from(Some("/etc/ddns/config.json".to_string())),
            PathBuf::from("/etc/ddns/config.json")
        );
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let settings = Settings::from_slice(br#"{"http": 8080}"#).unwrap();
        assert_eq!(settings.http, 8080);
        assert_eq!(settings.https, 443);
        assert_eq!(settings.www, PathBuf::from("www"));
        assert!(settings.records.is_empty());
    }

    #[test]
    fn records_parse_with_wire_type_names() {
        let settings = Settings::from_slice(
            br#"{"records": [
                {"name": "home.example.com", "type": "AAAA", "proxied": true},
                {"name": "v4.example.com", "type": "A"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            settings.records,
            vec![
                RecordConfig::new("home.example.com", RecordType::Aaaa).with_proxied(true),
                RecordConfig::new("v4.example.com", RecordType::A),
            ]
        );
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let result =
            Settings::from_slice(br#"{"records": [{"name": "a.example.com", "type": "MX"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_record_name_is_rejected() {
        assert!(RecordConfig::new("bad..example.com", RecordType::A).validate().is_err());
        assert!(RecordConfig::new("-bad.example.com", RecordType::A).validate().is_err());
        assert!(RecordConfig::new("", RecordType::A).validate().is_err());
        assert!(RecordConfig::new("*.example.com", RecordType::A).validate().is_ok());
        assert!(RecordConfig::new("home.example.com", RecordType::Aaaa).validate().is_ok());
    }

    #[test]
    fn static_ipv6_must_be_an_address() {
        let mut settings = Settings::default();
        assert_eq!(settings.static_ipv6().unwrap(), None);

        settings.static_ipv6 = "2001:db8::1".to_string();
        assert_eq!(settings.static_ipv6().unwrap(), Some("2001:db8::1".parse().unwrap()));

        settings.static_ipv6 = "10.0.0.1".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn tls_requires_both_paths() {
        let mut settings = Settings::default();
        settings.tls_cert = "cert.pem".to_string();
        assert!(!settings.tls_enabled());
        settings.tls_key = "key.pem".to_string();
        assert!(settings.tls_enabled());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("config.json")).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"{\"http\": ").await.unwrap();

        let err = Settings::load(&path).await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)), "unexpected error: {:?}", err);
    }
}
