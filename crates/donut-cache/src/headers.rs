//! HTTP cache headers and cache debugging headers.

use chrono::{DateTime, Duration, Utc};
use donut_core::Response;

use crate::key::CacheKey;
use crate::settings::{CacheLocation, CacheSettings};

/// Header names.
pub mod header_names {
    /// Cache-Control header.
    pub const CACHE_CONTROL: &str = "Cache-Control";
    /// Expires header.
    pub const EXPIRES: &str = "Expires";
    /// Cache status header (HIT, MISS, BYPASS).
    pub const X_CACHE_STATUS: &str = "X-Cache-Status";
    /// Cache key used for lookup.
    pub const X_CACHE_KEY: &str = "X-Cache-Key";
}

/// HTTP date format (RFC 7231 IMF-fixdate).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// How a request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the store, holes re-rendered.
    Hit,
    /// Rendered and committed to the store.
    Miss,
    /// Rendered without touching the store.
    Bypass,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// Format a timestamp as an HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format(HTTP_DATE_FORMAT).to_string()
}

/// Instant `secs` seconds after `now`, saturating at the latest representable time.
pub fn expires_after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Cache-Control and Expires headers derived from resolved settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    cache_control: String,
    expires: Option<String>,
}

impl CacheHeaders {
    /// Build headers for a response produced at `now`.
    ///
    /// Locations that let the browser or proxies keep a copy get `max-age`
    /// and `Expires`; everything else is `no-cache`.
    pub fn from_settings(settings: &CacheSettings, now: DateTime<Utc>) -> Self {
        let cacheability = settings.location.cacheability();
        let mut directives = vec![cacheability.to_string()];
        let mut expires = None;

        if cacheability != CacheLocation::None.cacheability() {
            directives.push(format!("max-age={}", settings.duration));
            expires = Some(http_date(expires_after(now, settings.duration)));
        }

        if settings.no_store {
            directives.push("no-store".to_string());
        }

        Self {
            cache_control: directives.join(", "),
            expires,
        }
    }

    /// Cache-Control value.
    pub fn cache_control(&self) -> &str {
        &self.cache_control
    }

    /// Expires value, if any.
    pub fn expires(&self) -> Option<&str> {
        self.expires.as_deref()
    }

    /// Convert to HTTP headers.
    pub fn to_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![(
            header_names::CACHE_CONTROL.to_string(),
            self.cache_control.clone(),
        )];
        if let Some(expires) = &self.expires {
            headers.push((header_names::EXPIRES.to_string(), expires.clone()));
        }
        headers
    }

    /// Set the headers on a response.
    pub fn apply(&self, response: &mut Response) {
        for (name, value) in self.to_headers() {
            response.set_header(name, value);
        }
    }
}

/// Add cache debugging headers to a response.
pub fn apply_debug_headers(response: &mut Response, status: CacheStatus, key: Option<&CacheKey>) {
    response.set_header(header_names::X_CACHE_STATUS, status.to_string());
    if let Some(key) = key {
        response.set_header(header_names::X_CACHE_KEY, key.as_str());
    }
}

/// Check if the request asked for cache debugging headers.
pub fn should_include_debug_headers(ctx: &donut_core::RequestContext) -> bool {
    ctx.header("X-Debug-Cache") == Some("1")
}
