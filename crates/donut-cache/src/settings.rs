//! Per-handler cache options, profiles and resolved settings.

use serde::{Deserialize, Serialize};

use crate::config::CacheConfiguration;
use crate::error::ConfigError;

/// Where a response may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLocation {
    /// Server, proxies and browser.
    Any,
    /// Browser only.
    Client,
    /// Proxies and browser, not the server.
    Downstream,
    /// Server only.
    #[default]
    Server,
    /// Nowhere.
    None,
    /// Server and browser, not proxies.
    ServerAndClient,
}

impl CacheLocation {
    /// Check if the server keeps a copy.
    pub fn caches_on_server(&self) -> bool {
        matches!(self, Self::Any | Self::Server | Self::ServerAndClient)
    }

    /// Get the Cache-Control cacheability directive for this location.
    pub fn cacheability(&self) -> &'static str {
        match self {
            Self::Any | Self::Downstream => "public",
            Self::Client | Self::ServerAndClient => "private",
            Self::Server | Self::None => "no-cache",
        }
    }
}

/// A named bundle of cache settings from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheProfile {
    /// Whether caching is enabled for handlers using this profile.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Time-to-live in seconds.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Parameters to vary by (`none`, `*`, or a `;`-separated list).
    #[serde(default)]
    pub vary_by_param: Option<String>,
    /// Custom vary discriminator name.
    #[serde(default)]
    pub vary_by_custom: Option<String>,
    /// Cache location.
    #[serde(default)]
    pub location: Option<CacheLocation>,
    /// Whether to forbid downstream storage.
    #[serde(default)]
    pub no_store: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for CacheProfile {
    fn default() -> Self {
        Self {
            enabled: true,
            duration: None,
            vary_by_param: None,
            vary_by_custom: None,
            location: None,
            no_store: false,
        }
    }
}

impl CacheProfile {
    /// Create an enabled profile with a duration.
    pub fn new(duration_secs: i64) -> Self {
        Self {
            duration: Some(duration_secs),
            ..Default::default()
        }
    }

    /// Set the vary-by-param rule.
    pub fn vary_by_param(mut self, rule: impl Into<String>) -> Self {
        self.vary_by_param = Some(rule.into());
        self
    }

    /// Set the vary-by-custom discriminator.
    pub fn vary_by_custom(mut self, custom: impl Into<String>) -> Self {
        self.vary_by_custom = Some(custom.into());
        self
    }

    /// Set the location.
    pub fn location(mut self, location: CacheLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Disable the profile.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Caching options attached to one handler at registration time.
///
/// Every field is optional; unset fields fall back to the referenced
/// profile, then to hard defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonutCacheOptions {
    /// Time-to-live in seconds.
    pub duration: Option<i64>,
    /// Parameters to vary by.
    pub vary_by_param: Option<String>,
    /// Custom vary discriminator name.
    pub vary_by_custom: Option<String>,
    /// Name of a configured cache profile.
    pub cache_profile: Option<String>,
    /// Cache location.
    pub location: Option<CacheLocation>,
    /// Whether to forbid downstream storage.
    pub no_store: Option<bool>,
}

impl DonutCacheOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the duration in seconds.
    pub fn with_duration(mut self, secs: i64) -> Self {
        self.duration = Some(secs);
        self
    }

    /// Set the vary-by-param rule.
    pub fn vary_by_param(mut self, rule: impl Into<String>) -> Self {
        self.vary_by_param = Some(rule.into());
        self
    }

    /// Set the vary-by-custom discriminator.
    pub fn vary_by_custom(mut self, custom: impl Into<String>) -> Self {
        self.vary_by_custom = Some(custom.into());
        self
    }

    /// Reference a configured cache profile.
    pub fn cache_profile(mut self, name: impl Into<String>) -> Self {
        self.cache_profile = Some(name.into());
        self
    }

    /// Set the cache location.
    pub fn location(mut self, location: CacheLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Forbid downstream storage.
    pub fn no_store(mut self, no_store: bool) -> Self {
        self.no_store = Some(no_store);
        self
    }
}

/// Settings resolved for one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Whether caching is enabled at all.
    pub is_caching_enabled: bool,
    /// Time-to-live in seconds.
    pub duration: u64,
    /// Parameters to vary by.
    pub vary_by_param: Option<String>,
    /// Custom vary discriminator name.
    pub vary_by_custom: Option<String>,
    /// Cache location.
    pub location: CacheLocation,
    /// Whether to forbid downstream storage.
    pub no_store: bool,
}

impl CacheSettings {
    /// Merge handler options with their profile and the global toggle.
    ///
    /// Explicit option values win over profile values, which win over the
    /// defaults. The duration must end up set and non-negative.
    pub fn resolve(
        options: &DonutCacheOptions,
        config: &dyn CacheConfiguration,
    ) -> Result<Self, ConfigError> {
        let globally_enabled = config.is_caching_enabled_globally();

        let profile = match &options.cache_profile {
            Some(name) if !name.is_empty() => Some(config.resolve_profile(name)?),
            _ => None,
        };

        let (is_caching_enabled, duration, vary_by_param, vary_by_custom, location, no_store) =
            match profile {
                None => (
                    globally_enabled,
                    options.duration,
                    options.vary_by_param.clone(),
                    options.vary_by_custom.clone(),
                    options.location,
                    options.no_store.unwrap_or(false),
                ),
                Some(profile) => (
                    globally_enabled && profile.enabled,
                    options.duration.or(profile.duration),
                    options.vary_by_param.clone().or(profile.vary_by_param),
                    options.vary_by_custom.clone().or(profile.vary_by_custom),
                    options.location.or(profile.location),
                    options.no_store.unwrap_or(profile.no_store),
                ),
            };

        let duration = duration.ok_or(ConfigError::MissingDuration)?;
        let duration = u64::try_from(duration).map_err(|_| ConfigError::NegativeDuration(duration))?;

        Ok(Self {
            is_caching_enabled,
            duration,
            vary_by_param,
            vary_by_custom: vary_by_custom.filter(|c| !c.is_empty()),
            location: location.unwrap_or_default(),
            no_store,
        })
    }

    /// Check if responses should be kept in the server-side store.
    pub fn is_server_caching_enabled(&self) -> bool {
        self.is_caching_enabled && self.duration > 0 && self.location.caches_on_server()
    }
}
