//! Cache key composition.

use std::borrow::Cow;
use std::sync::Arc;

use donut_core::{RequestContext, RouteValues};
use serde::{Deserialize, Serialize};

use crate::settings::CacheSettings;

/// Prefix shared by every donut cache key.
pub const KEY_PREFIX: &str = "_d0nutCache_";

const PAIR_SEPARATOR: char = '#';
const VALUE_SEPARATOR: char = '=';
const NAME_SEPARATOR: char = '_';

/// A cache key uniquely identifying a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// The computed key string.
    key: String,
    /// Components that make up the key (for debugging).
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    components: Vec<String>,
}

impl CacheKey {
    /// Create a cache key from a string.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            components: Vec::new(),
        }
    }

    /// Get the key string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Get the key components (for debugging).
    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Escape the characters the key grammar uses as separators.
fn escape(part: &str) -> Cow<'_, str> {
    if !part.contains(['%', '_', '#', '=']) {
        return Cow::Borrowed(part);
    }

    let mut escaped = String::with_capacity(part.len() + 8);
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '_' => escaped.push_str("%5F"),
            '#' => escaped.push_str("%23"),
            '=' => escaped.push_str("%3D"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Builds key strings from controller, action and name/value pairs.
///
/// Controller, action and pair names are case-insensitive; values are kept
/// verbatim. Every part is escaped so distinct inputs never concatenate to
/// the same key.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self {
            prefix: KEY_PREFIX.to_string(),
        }
    }
}

impl KeyBuilder {
    /// Create a key builder with the default prefix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different prefix (e.g., per application sharing a store).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Get the prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the key prefix for a controller, or a controller action.
    pub fn build_prefix(&self, controller: &str, action: Option<&str>) -> String {
        let mut key = self.prefix.clone();
        key.push_str(&escape(&controller.to_lowercase()));
        key.push(NAME_SEPARATOR);
        if let Some(action) = action {
            key.push_str(&escape(&action.to_lowercase()));
        }
        key
    }

    /// Build a key from a controller action and ordered name/value pairs.
    pub fn build_key<'a, I>(&self, controller: &str, action: &str, pairs: I) -> CacheKey
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut key = self.build_prefix(controller, Some(action));
        let mut components = vec![format!("action:{}.{}", controller, action)];

        for (name, value) in pairs {
            key.push(PAIR_SEPARATOR);
            key.push_str(&escape(&name.to_lowercase()));
            key.push(VALUE_SEPARATOR);
            key.push_str(&escape(value));
            components.push(format!("{}={}", name, value));
        }

        CacheKey { key, components }
    }

    /// Check if a stored key belongs to the given prefix.
    ///
    /// A controller prefix (ending in the name separator) matches every
    /// action of that controller; an action prefix matches only that action,
    /// with or without pairs.
    pub fn key_matches_prefix(key: &str, prefix: &str) -> bool {
        match key.strip_prefix(prefix) {
            Some(_) if prefix.ends_with(NAME_SEPARATOR) => true,
            Some(rest) => rest.is_empty() || rest.starts_with(PAIR_SEPARATOR),
            None => false,
        }
    }
}

/// Produces the discriminator for a `vary_by_custom` setting.
pub trait VaryByCustom: Send + Sync {
    /// Return the discriminator string for `custom` on this request.
    fn vary_by_custom_string(&self, ctx: &RequestContext, custom: &str) -> String;
}

/// Default hook: `browser` varies by User-Agent, anything else is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultVaryByCustom;

impl VaryByCustom for DefaultVaryByCustom {
    fn vary_by_custom_string(&self, ctx: &RequestContext, custom: &str) -> String {
        if custom.eq_ignore_ascii_case("browser") {
            ctx.header("User-Agent").unwrap_or_default().to_string()
        } else {
            String::new()
        }
    }
}

impl<F> VaryByCustom for F
where
    F: Fn(&RequestContext, &str) -> String + Send + Sync,
{
    fn vary_by_custom_string(&self, ctx: &RequestContext, custom: &str) -> String {
        self(ctx, custom)
    }
}

/// Route values as they appear in a key: without `controller` and
/// `action`, sorted by lowercased name.
pub fn keyed_route_values(values: &RouteValues) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = values
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .filter(|(name, _)| {
            !name.eq_ignore_ascii_case("controller") && !name.eq_ignore_ascii_case("action")
        })
        .collect();
    pairs.sort_by_key(|(name, _)| name.to_lowercase());
    pairs
}

/// Derives the cache key of a request under its settings.
#[derive(Clone)]
pub struct KeyGenerator {
    builder: KeyBuilder,
    vary_by_custom: Arc<dyn VaryByCustom>,
}

impl std::fmt::Debug for KeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyGenerator")
            .field("builder", &self.builder)
            .finish_non_exhaustive()
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new(KeyBuilder::default())
    }
}

impl KeyGenerator {
    /// Create a key generator using the default vary-by-custom hook.
    pub fn new(builder: KeyBuilder) -> Self {
        Self {
            builder,
            vary_by_custom: Arc::new(DefaultVaryByCustom),
        }
    }

    /// Replace the vary-by-custom hook.
    pub fn with_vary_by_custom(mut self, hook: Arc<dyn VaryByCustom>) -> Self {
        self.vary_by_custom = hook;
        self
    }

    /// Get the key builder.
    pub fn builder(&self) -> &KeyBuilder {
        &self.builder
    }

    /// Generate the cache key for the current handler.
    ///
    /// Route values (sorted by name) are included unless `vary_by_param` is
    /// `none`. `*` adds every request parameter sorted by name; a
    /// `;`-separated list adds the named parameters in the given order, with
    /// missing ones contributing an empty value. A custom discriminator, if
    /// set, is appended last.
    pub fn generate_key(&self, ctx: &RequestContext, settings: &CacheSettings) -> CacheKey {
        let mut pairs: Vec<(String, String)> = Vec::new();

        let vary_none = settings
            .vary_by_param
            .as_deref()
            .is_some_and(|rule| rule.trim().eq_ignore_ascii_case("none"));

        if !vary_none {
            pairs.extend(
                keyed_route_values(&ctx.route.values)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );

            match settings.vary_by_param.as_deref().map(str::trim) {
                Some("*") => {
                    pairs.extend(ctx.params.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Some(list) => {
                    for name in list.split(';').map(str::trim).filter(|n| !n.is_empty()) {
                        let value = ctx.param(name).unwrap_or_default();
                        pairs.push((name.to_string(), value.to_string()));
                    }
                }
                None => {}
            }
        }

        if let Some(custom) = settings.vary_by_custom.as_deref() {
            let value = self.vary_by_custom.vary_by_custom_string(ctx, custom);
            pairs.push((custom.to_string(), value));
        }

        self.builder.build_key(
            &ctx.route.controller,
            &ctx.route.action,
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }
}
