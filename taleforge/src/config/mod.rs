//! Configuration management for taleforge
//!
//! Configuration is loaded from multiple sources with clear precedence:
//!
//! 1. Environment variables (highest priority, `TALEFORGE_` prefix, `__` for nesting)
//! 2. `./config.toml` (development)
//! 3. `~/.config/taleforge/{service}/config.toml` (user config, XDG)
//! 4. `/etc/taleforge/{service}/config.toml` (system config)
//! 5. Hardcoded defaults (fallback)
//!
//! # Example Configuration
//!
//! ```toml
//! # config.toml
//! [uploads]
//! max_size_bytes = 5242880
//! sniff_content = true
//!
//! [moderation]
//! api_user = "123456"
//! api_secret = "set-me-through-TALEFORGE_MODERATION__API_SECRET"
//! threshold = 0.5
//!
//! [storage]
//! backend = "local"
//! local_root = "./uploads"
//! public_base_url = "https://media.example.com/uploads"
//!
//! [persistence]
//! database_url = "sqlite://./taleforge.db"
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use taleforge::config::TaleforgeConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = TaleforgeConfig::load_for_service("web")?;
//!
//! let constraints = config.upload_constraints();
//! let policy = config.decision_policy()?;
//! # Ok(())
//! # }
//! ```

use crate::moderation::client::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use crate::moderation::{
    ClassifierConfig, ClassifierCredentials, DecisionPolicy, PolicyError, DEFAULT_THRESHOLD,
};
use crate::storage::{
    HttpStorageGateway, LocalStorageGateway, StorageError, StorageGateway, UploadConstraints,
};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const ENV_PREFIX: &str = "TALEFORGE_";
const REDACTED: &str = "[REDACTED]";

/// Credential variables and the keys they set, kept verbatim
const CREDENTIAL_VARS: [(&str, &str); 2] = [
    ("MODERATION__API_USER", "moderation.api_user"),
    ("MODERATION__API_SECRET", "moderation.api_secret"),
];

/// Configuration values that cannot work together
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    /// Threshold outside `(0, 1]`
    #[error("moderation.threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    /// Size floor above the ceiling
    #[error("uploads.min_size_bytes ({min}) exceeds uploads.max_size_bytes ({max})")]
    InvalidSizeRange {
        /// Configured floor
        min: u64,
        /// Configured ceiling
        max: u64,
    },

    /// HTTP storage selected without a base URL
    #[error("storage.http_base_url is required when storage.backend = \"http\"")]
    MissingHttpBaseUrl,

    /// Local objects would reach the classifier through a URL it cannot fetch
    #[error(
        "storage.public_base_url must be an absolute http(s) URL when moderation \
         credentials are set, got {0:?}"
    )]
    UnreachablePublicUrl(String),
}

/// Classification service settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    /// API user; classification is disabled while unset
    #[serde(deserialize_with = "string_or_integer")]
    pub api_user: Option<String>,

    /// API secret; classification is disabled while unset
    #[serde(deserialize_with = "string_or_integer")]
    pub api_secret: Option<String>,

    /// Check endpoint URL
    pub endpoint: String,

    /// Admission threshold applied to every category
    pub threshold: f64,

    /// Transport timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            api_user: None,
            api_secret: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            threshold: DEFAULT_THRESHOLD,
            request_timeout_ms: u64::try_from(DEFAULT_TIMEOUT.as_millis()).unwrap_or(10_000),
        }
    }
}

impl ModerationSettings {
    fn has_credentials(&self) -> bool {
        let present = |value: Option<&str>| value.is_some_and(|v| !v.trim().is_empty());
        present(self.api_user.as_deref()) && present(self.api_secret.as_deref())
    }
}

impl fmt::Debug for ModerationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModerationSettings")
            .field("api_user", &self.api_user)
            .field("api_secret", &self.api_secret.as_ref().map(|_| REDACTED))
            .field("endpoint", &self.endpoint)
            .field("threshold", &self.threshold)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

/// Accepts credentials written as TOML integers (`api_user = 1234567890`)
fn string_or_integer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Credential {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(Option::<Credential>::deserialize(deserializer)?.map(|value| match value {
        Credential::Text(text) => text,
        Credential::Unsigned(n) => n.to_string(),
        Credential::Signed(n) => n.to_string(),
    }))
}

/// Merges `TALEFORGE_*` environment variables over `figment`
///
/// `Env` parses all-digit values as numbers, which would drop leading zeros
/// from credentials, so those variables are re-applied as raw strings.
fn merge_environment(figment: Figment) -> Figment {
    let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));
    CREDENTIAL_VARS
        .iter()
        .fold(figment, |figment, (var, key)| {
            match std::env::var(format!("{ENV_PREFIX}{var}")) {
                Ok(value) => figment.merge((*key, value)),
                Err(_) => figment,
            }
        })
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Local filesystem
    #[default]
    Local,
    /// Hosted object storage over HTTP
    Http,
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Which backend to use
    pub backend: StorageBackend,

    /// Root directory for the local backend
    pub local_root: PathBuf,

    /// URL prefix the local root is served under
    pub public_base_url: String,

    /// Service URL for the HTTP backend
    pub http_base_url: Option<String>,

    /// Transport timeout in milliseconds for the HTTP backend
    pub request_timeout_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: PathBuf::from("./uploads"),
            public_base_url: "/uploads".to_string(),
            http_base_url: None,
            request_timeout_ms: 30_000,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    /// `SQLx` database URL
    pub database_url: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./taleforge.db".to_string(),
        }
    }
}

/// Complete taleforge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaleforgeConfig {
    /// Local validation limits
    #[serde(default)]
    pub uploads: UploadConstraints,

    /// Classification service settings
    #[serde(default)]
    pub moderation: ModerationSettings,

    /// Storage backend settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Owning-record database settings
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

impl TaleforgeConfig {
    /// Load configuration for a specific service
    ///
    /// Searches for configuration in XDG-compliant locations with precedence:
    /// 1. Environment variables (`TALEFORGE_*`)
    /// 2. `./config.toml`
    /// 3. `~/.config/taleforge/{service_name}/config.toml`
    /// 4. `/etc/taleforge/{service_name}/config.toml`
    /// 5. Defaults
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A configuration file contains invalid TOML or mistyped values
    /// - The merged configuration fails [`validate`](Self::validate)
    pub fn load_for_service(service_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(&toml::to_string(&Self::default())?));

        let system_config = PathBuf::from("/etc/taleforge")
            .join(service_name)
            .join("config.toml");
        if system_config.exists() {
            figment = figment.merge(Toml::file(&system_config));
        }

        let user_config = Self::recommended_path(service_name);
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }

        let local_config = PathBuf::from("./config.toml");
        if local_config.exists() {
            figment = figment.merge(Toml::file(&local_config));
        }

        let config: Self = merge_environment(figment).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// A missing file yields the defaults; environment variables still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or mistyped values,
    /// or the result fails [`validate`](Self::validate)
    pub fn load_from(path: &str) -> anyhow::Result<Self> {
        let figment = Figment::new()
            .merge(Toml::string(&toml::to_string(&Self::default())?))
            .merge(Toml::file(path));
        let config: Self = merge_environment(figment).extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Get the recommended XDG config path for a service
    ///
    /// # Example
    ///
    /// ```rust
    /// use taleforge::config::TaleforgeConfig;
    ///
    /// let path = TaleforgeConfig::recommended_path("web");
    /// // Returns: ~/.config/taleforge/web/config.toml
    /// assert!(path.ends_with("config.toml"));
    /// ```
    #[must_use]
    pub fn recommended_path(service_name: &str) -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| {
                config_dir
                    .join("taleforge")
                    .join(service_name)
                    .join("config.toml")
            },
        )
    }

    /// Create config directory for a service
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created
    pub fn create_config_dir(service_name: &str) -> anyhow::Result<PathBuf> {
        let config_path = Self::recommended_path(service_name);
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config_path)
    }

    /// Checks values that deserialize fine but cannot work together
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.moderation.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.uploads.min_size_bytes > self.uploads.max_size_bytes {
            return Err(ConfigError::InvalidSizeRange {
                min: self.uploads.min_size_bytes,
                max: self.uploads.max_size_bytes,
            });
        }
        if self.storage.backend == StorageBackend::Http && self.storage.http_base_url.is_none() {
            return Err(ConfigError::MissingHttpBaseUrl);
        }
        if self.storage.backend == StorageBackend::Local
            && self.moderation.has_credentials()
            && !is_fetchable(&self.storage.public_base_url)
        {
            return Err(ConfigError::UnreachablePublicUrl(
                self.storage.public_base_url.clone(),
            ));
        }
        Ok(())
    }

    /// Copy safe to print, with the API secret masked
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.moderation.api_secret.is_some() {
            config.moderation.api_secret = Some(REDACTED.to_string());
        }
        config
    }

    /// Upload constraints for the validator
    #[must_use]
    pub fn upload_constraints(&self) -> UploadConstraints {
        self.uploads.clone()
    }

    /// Classifier settings; credentials stay `None` unless both halves are set
    #[must_use]
    pub fn classifier_config(&self) -> ClassifierConfig {
        let credentials = self
            .moderation
            .api_user
            .as_ref()
            .zip(self.moderation.api_secret.as_ref())
            .map(|(user, secret)| ClassifierCredentials::new(user, secret));

        ClassifierConfig {
            credentials,
            endpoint: self.moderation.endpoint.clone(),
            timeout: Duration::from_millis(self.moderation.request_timeout_ms),
        }
    }

    /// Decision policy with the configured threshold
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidThreshold` if the threshold is out of range
    pub fn decision_policy(&self) -> Result<DecisionPolicy, PolicyError> {
        DecisionPolicy::with_threshold(self.moderation.threshold)
    }

    /// Builds the configured storage backend
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the backend cannot be
    /// constructed from the settings
    pub fn storage_gateway(&self) -> Result<Arc<dyn StorageGateway>, StorageError> {
        match self.storage.backend {
            StorageBackend::Local => Ok(Arc::new(LocalStorageGateway::new(
                self.storage.local_root.clone(),
                self.storage.public_base_url.clone(),
            )?)),
            StorageBackend::Http => {
                let base_url = self.storage.http_base_url.as_deref().ok_or_else(|| {
                    StorageError::StorageUnavailable(ConfigError::MissingHttpBaseUrl.to_string())
                })?;
                Ok(Arc::new(HttpStorageGateway::new(
                    base_url,
                    Duration::from_millis(self.storage.request_timeout_ms),
                )?))
            }
        }
    }
}

fn is_fetchable(url: &str) -> bool {
    Url::parse(url).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = TaleforgeConfig::default();
        assert_eq!(config.uploads.max_size_bytes, 5 * 1024 * 1024);
        assert_eq!(config.uploads.min_size_bytes, 0);
        assert!(!config.uploads.sniff_content);
        assert!((config.moderation.threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.moderation.request_timeout_ms, 10_000);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.persistence.database_url, "sqlite://./taleforge.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_recommended_path() {
        let path = TaleforgeConfig::recommended_path("test-app");
        let path = path.to_str().unwrap();

        assert!(path.contains("test-app"));
        assert!(path.ends_with("config.toml"));
        assert!(path.contains("taleforge"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TaleforgeConfig::default();
        config.moderation.threshold = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreshold(0.0)));

        let mut config = TaleforgeConfig::default();
        config.uploads.min_size_bytes = 10;
        config.uploads.max_size_bytes = 5;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidSizeRange { min: 10, max: 5 })
        );

        let mut config = TaleforgeConfig::default();
        config.storage.backend = StorageBackend::Http;
        assert_eq!(config.validate(), Err(ConfigError::MissingHttpBaseUrl));
    }

    #[test]
    fn test_secret_is_redacted() {
        let mut config = TaleforgeConfig::default();
        config.moderation.api_user = Some("user".into());
        config.moderation.api_secret = Some("s3cret".into());

        assert!(!format!("{config:?}").contains("s3cret"));
        assert!(!toml::to_string(&config.redacted()).unwrap().contains("s3cret"));
        assert!(format!("{:?}", config.classifier_config()).contains("user"));
    }

    #[test]
    fn test_classifier_config_requires_both_halves() {
        let mut config = TaleforgeConfig::default();
        config.moderation.api_user = Some("user".into());
        assert!(config.classifier_config().credentials.is_none());

        config.moderation.api_secret = Some("secret".into());
        config.moderation.request_timeout_ms = 250;
        let classifier = config.classifier_config();
        assert!(classifier.credentials.is_some());
        assert_eq!(classifier.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        Jail::expect_with(|_jail| {
            let config = TaleforgeConfig::load_from("/nonexistent/path/config.toml")
                .map_err(|e| e.to_string())?;
            assert_eq!(config, TaleforgeConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [uploads]
                max_size_bytes = 1024
                allowed_types = ["image/png"]

                [moderation]
                api_user = "file-user"
                threshold = 0.7

                [storage]
                public_base_url = "https://media.example.com/uploads"
                "#,
            )?;
            jail.set_env("TALEFORGE_MODERATION__THRESHOLD", "0.8");
            jail.set_env("TALEFORGE_MODERATION__API_SECRET", "env-secret");

            let config = TaleforgeConfig::load_for_service("test").map_err(|e| e.to_string())?;

            assert_eq!(config.uploads.max_size_bytes, 1024);
            assert_eq!(config.uploads.allowed_types, vec!["image/png"]);
            assert!(!config.uploads.sniff_content);
            assert_eq!(config.moderation.api_user.as_deref(), Some("file-user"));
            assert_eq!(config.moderation.api_secret.as_deref(), Some("env-secret"));
            assert!((config.moderation.threshold - 0.8).abs() < f64::EPSILON);
            assert!(config.classifier_config().credentials.is_some());
            Ok(())
        });
    }

    #[test]
    fn test_numeric_credentials_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[storage]\npublic_base_url = \"https://media.example.com/uploads\"\n",
            )?;
            jail.set_env("TALEFORGE_MODERATION__API_USER", "1234567890");
            jail.set_env("TALEFORGE_MODERATION__API_SECRET", "0042");

            let config = TaleforgeConfig::load_for_service("test").map_err(|e| e.to_string())?;

            assert_eq!(config.moderation.api_user.as_deref(), Some("1234567890"));
            assert_eq!(config.moderation.api_secret.as_deref(), Some("0042"));
            assert!(config.classifier_config().credentials.is_some());
            Ok(())
        });
    }

    #[test]
    fn test_numeric_credentials_in_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [moderation]
                api_user = 1234567890
                api_secret = "secret"

                [storage]
                public_base_url = "http://localhost:8080/uploads"
                "#,
            )?;

            let config = TaleforgeConfig::load_from("custom.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.moderation.api_user.as_deref(), Some("1234567890"));
            Ok(())
        });
    }

    #[test]
    fn test_relative_public_url_rejected_with_credentials() {
        let mut config = TaleforgeConfig::default();
        config.moderation.api_user = Some("1234567890".into());
        config.moderation.api_secret = Some("secret".into());
        assert_eq!(
            config.validate(),
            Err(ConfigError::UnreachablePublicUrl("/uploads".into()))
        );

        config.storage.public_base_url = "ftp://media.example.com/uploads".into();
        assert!(config.validate().is_err());

        config.storage.public_base_url = "https://media.example.com/uploads".into();
        assert!(config.validate().is_ok());

        // Relative URLs stay fine while classification is off or storage is hosted.
        let mut config = TaleforgeConfig::default();
        config.moderation.api_user = Some("1234567890".into());
        assert!(config.validate().is_ok());
        config.moderation.api_secret = Some("secret".into());
        config.storage.backend = StorageBackend::Http;
        config.storage.http_base_url = Some("https://store.example/v1/".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file_value_is_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[moderation]\nthreshold = 1.5\n")?;

            let result = TaleforgeConfig::load_from("custom.toml");
            assert!(result.is_err());
            Ok(())
        });
    }

    #[test]
    fn test_storage_gateway_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TaleforgeConfig::default();
        config.storage.local_root = dir.path().to_path_buf();
        assert_eq!(config.storage_gateway().unwrap().name(), "Local Storage");

        config.storage.backend = StorageBackend::Http;
        config.storage.http_base_url = Some("https://store.example/v1/".into());
        assert_eq!(config.storage_gateway().unwrap().name(), "HTTP Object Storage");
    }
}
