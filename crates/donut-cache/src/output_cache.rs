//! Handler wrapper: settings resolution, hit replay, capture and commit.

use std::sync::Arc;

use chrono::Utc;
use donut_core::{Output, RenderError, RequestContext};
use tracing::debug;

use crate::action::{ActionSettings, EncryptingActionSettingsSerializer, JsonActionSettingsSerializer};
use crate::capture::OutputCapture;
use crate::config::{CacheConfiguration, OutputCacheConfig};
use crate::error::{ConfigError, DonutError};
use crate::fragment::FragmentInvoker;
use crate::headers::{apply_debug_headers, expires_after, should_include_debug_headers, CacheHeaders, CacheStatus};
use crate::holes::DonutHoleFiller;
use crate::key::{CacheKey, KeyGenerator, VaryByCustom};
use crate::manager::OutputCacheManager;
use crate::settings::{CacheSettings, DonutCacheOptions};
use crate::store::{CacheItem, CacheStore};

/// Status code a response must have to be committed to the store.
const CACHEABLE_STATUS: u16 = 200;

/// Application-wide caching services shared by every cached handler.
pub struct DonutCaching {
    config: Arc<dyn CacheConfiguration>,
    key_generator: KeyGenerator,
    filler: DonutHoleFiller,
    manager: OutputCacheManager,
}

impl std::fmt::Debug for DonutCaching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonutCaching")
            .field("key_generator", &self.key_generator)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl DonutCaching {
    /// Assemble caching services from their parts.
    pub fn new(
        config: Arc<dyn CacheConfiguration>,
        key_generator: KeyGenerator,
        filler: DonutHoleFiller,
        manager: OutputCacheManager,
    ) -> Self {
        Self {
            config,
            key_generator,
            filler,
            manager,
        }
    }

    /// Build the default services for a configuration and store.
    ///
    /// Tokens are JSON action settings sealed with the configured key.
    pub fn from_config(config: OutputCacheConfig, store: Arc<dyn CacheStore>) -> Result<Self, ConfigError> {
        let serializer = EncryptingActionSettingsSerializer::new(
            JsonActionSettingsSerializer,
            Arc::new(config.encryptor()?),
        );
        let key_generator = KeyGenerator::default();
        let manager = OutputCacheManager::new(store, key_generator.builder().clone());

        Ok(Self::new(
            Arc::new(config),
            key_generator,
            DonutHoleFiller::new(Arc::new(serializer)),
            manager,
        ))
    }

    /// Replace the vary-by-custom hook.
    pub fn with_vary_by_custom(mut self, hook: Arc<dyn VaryByCustom>) -> Self {
        self.key_generator = self.key_generator.with_vary_by_custom(hook);
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &dyn CacheConfiguration {
        self.config.as_ref()
    }

    /// Get the key generator.
    pub fn key_generator(&self) -> &KeyGenerator {
        &self.key_generator
    }

    /// Get the donut hole filler.
    pub fn filler(&self) -> &DonutHoleFiller {
        &self.filler
    }

    /// Get the output cache manager.
    pub fn manager(&self) -> &OutputCacheManager {
        &self.manager
    }

    /// Render a child fragment into the current output.
    ///
    /// With `exclude_from_parent_cache` the fragment is wrapped in a donut
    /// hole marker and re-rendered on every hit of the enclosing page.
    pub fn render_donut_action(
        &self,
        ctx: &mut RequestContext,
        invoker: &dyn FragmentInvoker,
        action: &ActionSettings,
        exclude_from_parent_cache: bool,
    ) -> Result<(), DonutError> {
        self.filler
            .render_action(ctx, invoker, action, exclude_from_parent_cache)
    }
}

/// Donut output caching for one handler.
#[derive(Debug, Clone)]
pub struct DonutOutputCache {
    services: Arc<DonutCaching>,
    options: DonutCacheOptions,
    debug_headers: bool,
}

impl DonutOutputCache {
    /// Wrap a handler with the given options.
    pub fn new(services: Arc<DonutCaching>, options: DonutCacheOptions) -> Self {
        Self {
            services,
            options,
            debug_headers: false,
        }
    }

    /// Always emit `X-Cache-Status` / `X-Cache-Key` on top-level responses.
    ///
    /// Without this they are emitted only for requests sending `X-Debug-Cache: 1`.
    pub fn with_debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }

    /// Get the handler options.
    pub fn options(&self) -> &DonutCacheOptions {
        &self.options
    }

    /// Get the shared services.
    pub fn services(&self) -> &Arc<DonutCaching> {
        &self.services
    }

    /// Resolve the settings this handler runs with.
    pub fn settings(&self) -> Result<CacheSettings, ConfigError> {
        CacheSettings::resolve(&self.options, self.services.config())
    }

    /// Serve the handler through the cache.
    ///
    /// On a hit the stored markup has its donut holes re-rendered and is
    /// written to the response without running `handler`. Otherwise the
    /// handler renders into a capture buffer; on success the markup is
    /// written with markers stripped and, when server caching applies and
    /// the status is 200, stored with markers intact. A failing handler
    /// leaves the response output untouched and nothing is stored.
    pub fn execute<F>(
        &self,
        ctx: &mut RequestContext,
        invoker: &dyn FragmentInvoker,
        handler: F,
    ) -> Result<CacheStatus, DonutError>
    where
        F: FnOnce(&mut RequestContext) -> Result<(), RenderError>,
    {
        let settings = self.settings()?;

        let key = settings
            .is_server_caching_enabled()
            .then(|| self.services.key_generator.generate_key(ctx, &settings));

        if let Some(key) = &key {
            if let Some(item) = self.services.manager.get_item(key) {
                self.serve_hit(ctx, invoker, key, item)?;
                self.finish_response(ctx, &settings, CacheStatus::Hit, Some(key));
                return Ok(CacheStatus::Hit);
            }
        }

        let rendered = {
            let mut capture = OutputCapture::begin(ctx);
            let result = handler(capture.context());
            let captured = capture.finish();
            result.map(|()| captured)
        };

        let captured = match rendered {
            Ok(captured) => captured,
            Err(e) => {
                debug!(
                    controller = %ctx.route.controller,
                    action = %ctx.route.action,
                    error = %e,
                    "render failed, discarding captured output"
                );
                return Err(e.into());
            }
        };

        let wrapped = captured
            .and_then(Output::into_buffered)
            .ok_or(RenderError::OutputLost)?;
        let stripped = self.services.filler.strip_markers(&wrapped)?;
        ctx.write(&stripped)?;

        let status = match &key {
            Some(key) => {
                let response_status = ctx.response.status();
                if response_status == CACHEABLE_STATUS {
                    let item = CacheItem::new(wrapped, ctx.response.content_type());
                    let expires_at = expires_after(Utc::now(), settings.duration);
                    self.services.manager.add_item(key, item, expires_at);
                } else {
                    debug!(cache_key = %key, status = response_status, "response not cacheable");
                }
                CacheStatus::Miss
            }
            None => CacheStatus::Bypass,
        };

        self.finish_response(ctx, &settings, status, key.as_ref());
        Ok(status)
    }

    fn serve_hit(
        &self,
        ctx: &mut RequestContext,
        invoker: &dyn FragmentInvoker,
        key: &CacheKey,
        item: CacheItem,
    ) -> Result<(), DonutError> {
        debug!(cache_key = %key, "cache hit");
        let content = self.services.filler.fill_holes(&item.content, ctx, invoker)?;

        if !ctx.is_child_action {
            ctx.response.set_content_type(item.content_type);
        }
        ctx.write(&content)?;
        Ok(())
    }

    fn finish_response(
        &self,
        ctx: &mut RequestContext,
        settings: &CacheSettings,
        status: CacheStatus,
        key: Option<&CacheKey>,
    ) {
        debug!(
            controller = %ctx.route.controller,
            action = %ctx.route.action,
            status = %status,
            "served"
        );

        if ctx.is_child_action {
            return;
        }

        CacheHeaders::from_settings(settings, Utc::now()).apply(&mut ctx.response);
        if self.debug_headers || should_include_debug_headers(ctx) {
            apply_debug_headers(&mut ctx.response, status, key);
        }
    }
}
