//! Output cache configuration: global toggle, profiles and token key.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use donut_security::SealingEncryptor;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::settings::CacheProfile;

/// Looks up named cache profiles.
pub trait ProfileResolver: Send + Sync {
    /// Resolve a profile by name, failing if it is not defined.
    fn resolve_profile(&self, name: &str) -> Result<CacheProfile, ConfigError>;
}

/// Process-wide caching switch.
pub trait GlobalCachingToggle: Send + Sync {
    /// Check if output caching is enabled for the whole process.
    fn is_caching_enabled_globally(&self) -> bool;
}

/// Everything settings resolution needs from configuration.
pub trait CacheConfiguration: ProfileResolver + GlobalCachingToggle {}

impl<T: ProfileResolver + GlobalCachingToggle> CacheConfiguration for T {}

/// Output cache configuration file.
///
/// ```toml
/// enabled = true
/// encryption_key = "base64 encoded 32 byte key"
///
/// [profiles.short]
/// duration = 60
/// vary_by_param = "none"
/// location = "server"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCacheConfig {
    /// Global caching toggle.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Key sealing donut hole tokens (standard base64, 32 bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,

    /// Named cache profiles.
    #[serde(default)]
    pub profiles: HashMap<String, CacheProfile>,
}

fn default_enabled() -> bool {
    true
}

impl Default for OutputCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            encryption_key: None,
            profiles: HashMap::new(),
        }
    }
}

impl OutputCacheConfig {
    /// Load config from a TOML or JSON file (chosen by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read output cache config: {}", path.display()))?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
        .with_context(|| format!("Failed to parse output cache config: {}", path.display()))?;

        Ok(config)
    }

    /// Parse config from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse config from JSON.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Set the global toggle.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the token encryption key.
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Add a named profile.
    pub fn with_profile(mut self, name: impl Into<String>, profile: CacheProfile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    /// Build the token encryptor.
    ///
    /// Without a configured key a random one is generated, which is only
    /// suitable for stores that do not outlive the process.
    pub fn encryptor(&self) -> Result<SealingEncryptor, ConfigError> {
        match &self.encryption_key {
            Some(key) => SealingEncryptor::from_base64_key(key).map_err(ConfigError::EncryptionKey),
            None => {
                tracing::warn!("no encryption_key configured, sealing donut holes with a per-process key");
                Ok(SealingEncryptor::generate())
            }
        }
    }
}

impl ProfileResolver for OutputCacheConfig {
    fn resolve_profile(&self, name: &str) -> Result<CacheProfile, ConfigError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::ProfileNotDefined(name.to_string()))
    }
}

impl GlobalCachingToggle for OutputCacheConfig {
    fn is_caching_enabled_globally(&self) -> bool {
        self.enabled
    }
}
