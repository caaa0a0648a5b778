//! End-to-end donut caching flows: cached shells, fresh holes, eviction and failure handling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use donut_cache::{
    ActionSettings, CacheItem, CacheStatus, CacheStore, DonutCacheOptions, DonutCaching, DonutOutputCache,
    FragmentRegistry, InMemoryCacheStore, OutputCacheConfig, StoreError, DONUT_START,
};
use donut_core::{RenderError, RequestContext};
use donut_security::generate_base64_key;

const CONFIG: &str = r#"
enabled = true

[profiles.sidebar]
duration = 300
location = "any"

[profiles.catalog]
duration = 60
vary_by_param = "page; sort"
"#;

fn config() -> OutputCacheConfig {
    OutputCacheConfig::from_toml_str(CONFIG)
        .unwrap()
        .with_encryption_key(generate_base64_key())
}

fn services_with(store: Arc<dyn CacheStore>) -> Arc<DonutCaching> {
    Arc::new(DonutCaching::from_config(config(), store).unwrap())
}

/// A small site: a page shell with an excluded clock fragment.
struct Site {
    services: Arc<DonutCaching>,
    registry: FragmentRegistry,
    shell_renders: Arc<AtomicU64>,
    ticks: Arc<AtomicU64>,
}

impl Site {
    fn new() -> Self {
        Self::with_store(Arc::new(InMemoryCacheStore::new()))
    }

    fn with_store(store: Arc<dyn CacheStore>) -> Self {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = ticks.clone();
        let registry = FragmentRegistry::new().register("Home", "Clock", move |ctx, _| {
            let tick = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.write(&format!("<time>tick={}</time>", tick))
        });

        Self {
            services: services_with(store),
            registry,
            shell_renders: Arc::new(AtomicU64::new(0)),
            ticks,
        }
    }

    fn simple(&self) -> DonutOutputCache {
        DonutOutputCache::new(
            self.services.clone(),
            DonutCacheOptions::new().with_duration(60).vary_by_param("none"),
        )
    }

    fn request_simple(&self, cache: &DonutOutputCache) -> (CacheStatus, RequestContext) {
        let mut ctx = RequestContext::new("Home", "Simple");
        let status = cache
            .execute(&mut ctx, &self.registry, |ctx| {
                let n = self.shell_renders.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.write(&format!("<header>shell-{}</header>", n))?;
                self.services
                    .render_donut_action(ctx, &self.registry, &ActionSettings::new("Clock", "Home"), true)?;
                ctx.write("<footer/>")
            })
            .unwrap();
        (status, ctx)
    }
}

fn body(ctx: &RequestContext) -> &str {
    ctx.response.body().unwrap()
}

fn assert_no_markers(ctx: &RequestContext) {
    assert!(!body(ctx).contains(DONUT_START), "marker leaked: {}", body(ctx));
    assert!(!body(ctx).contains("<!--EndDonut-->"), "marker leaked: {}", body(ctx));
}

#[test]
fn cached_shell_with_fresh_hole() {
    let site = Site::new();
    let cache = site.simple();

    let (status, first) = site.request_simple(&cache);
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(body(&first), "<header>shell-1</header><time>tick=1</time><footer/>");
    assert_no_markers(&first);

    let (status, second) = site.request_simple(&cache);
    assert_eq!(status, CacheStatus::Hit);
    assert_eq!(body(&second), "<header>shell-1</header><time>tick=2</time><footer/>");
    assert_no_markers(&second);

    assert_eq!(site.shell_renders.load(Ordering::SeqCst), 1);
    assert_eq!(site.ticks.load(Ordering::SeqCst), 2);
}

#[test]
fn stored_copy_keeps_markers() {
    let site = Site::new();
    let cache = site.simple();
    site.request_simple(&cache);

    let key = site
        .services
        .key_generator()
        .builder()
        .build_key("Home", "Simple", std::iter::empty());
    let item = site.services.manager().get_item(&key).unwrap();

    assert!(item.content.contains(DONUT_START));
    assert!(!item.content.contains("Clock"));
    assert_eq!(item.content_type, "text/html");
}

#[test]
fn top_level_response_gets_cache_headers() {
    let site = Site::new();
    let (_, ctx) = site.request_simple(&site.simple());
    assert_eq!(ctx.response.header("Cache-Control"), Some("no-cache"));

    let (_, ctx) = site.request_simple(&site.simple());
    assert_eq!(ctx.response.header("Cache-Control"), Some("no-cache"));
}

#[test]
fn render_error_stores_nothing() {
    let site = Site::new();
    let cache = site.simple();

    let mut ctx = RequestContext::new("Home", "Simple");
    let err = cache
        .execute(&mut ctx, &site.registry, |ctx| {
            ctx.write("<header>partial")?;
            Err(RenderError::failed("database unavailable"))
        })
        .unwrap_err();

    assert!(err.is_render());
    assert_eq!(body(&ctx), "");
    assert!(ctx.response.header("Cache-Control").is_none());

    let (status, next) = site.request_simple(&cache);
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(body(&next), "<header>shell-1</header><time>tick=1</time><footer/>");
}

#[test]
fn failing_excluded_fragment_fails_the_page() {
    let site = Site::new();
    let cache = site.simple();

    let mut ctx = RequestContext::new("Home", "Simple");
    let err = cache
        .execute(&mut ctx, &site.registry, |ctx| {
            site.services
                .render_donut_action(ctx, &site.registry, &ActionSettings::new("Missing", "Home"), true)?;
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        donut_cache::DonutError::Render(RenderError::FragmentNotFound { .. })
    ));
    assert!(site.services.manager().store().keys().unwrap().is_empty());
}

#[test]
fn remove_item_forces_a_miss() {
    let site = Site::new();
    let cache = site.simple();

    assert_eq!(site.request_simple(&cache).0, CacheStatus::Miss);
    assert_eq!(site.request_simple(&cache).0, CacheStatus::Hit);

    assert!(site.services.manager().remove_item("Home", "Simple"));

    let (status, ctx) = site.request_simple(&cache);
    assert_eq!(status, CacheStatus::Miss);
    assert!(body(&ctx).starts_with("<header>shell-2</header>"));
}

#[test]
fn remove_items_evicts_every_variant() {
    let site = Site::new();
    let catalog = DonutOutputCache::new(site.services.clone(), DonutCacheOptions::new().cache_profile("catalog"));

    for page in ["1", "2", "3"] {
        let mut ctx = RequestContext::new("Products", "List").with_param("page", page);
        catalog
            .execute(&mut ctx, &site.registry, |ctx| ctx.write("products"))
            .unwrap();
    }
    site.request_simple(&site.simple());

    assert_eq!(site.services.manager().remove_items("Products", Some("List")), 3);
    assert_eq!(site.services.manager().store().keys().unwrap().len(), 1);
}

#[test]
fn undefined_profile_fails_before_rendering() {
    let site = Site::new();
    let cache = DonutOutputCache::new(site.services.clone(), DonutCacheOptions::new().cache_profile("nightly"));

    let mut ctx = RequestContext::new("Home", "Simple");
    let err = cache
        .execute(&mut ctx, &site.registry, |ctx| {
            site.shell_renders.fetch_add(1, Ordering::SeqCst);
            ctx.write("rendered")
        })
        .unwrap_err();

    assert!(err.is_config());
    assert_eq!(site.shell_renders.load(Ordering::SeqCst), 0);
    assert_eq!(body(&ctx), "");
}

#[test]
fn missing_duration_fails_before_rendering() {
    let site = Site::new();
    let cache = DonutOutputCache::new(site.services.clone(), DonutCacheOptions::new());

    let mut ctx = RequestContext::new("Home", "Simple");
    let err = cache
        .execute(&mut ctx, &site.registry, |ctx| ctx.write("rendered"))
        .unwrap_err();
    assert!(err.is_config());
}

#[test]
fn vary_by_param_list_separates_variants() {
    let site = Site::new();
    let catalog = DonutOutputCache::new(site.services.clone(), DonutCacheOptions::new().cache_profile("catalog"));
    let renders = AtomicU64::new(0);

    let request = |page: &str, sort: &str, tracking: &str| {
        let mut ctx = RequestContext::new("Products", "List")
            .with_param("page", page)
            .with_param("sort", sort)
            .with_param("utm_source", tracking);
        catalog
            .execute(&mut ctx, &site.registry, |ctx| {
                let n = renders.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.write(&format!("page {} render {}", page, n))
            })
            .unwrap()
    };

    assert_eq!(request("1", "name", "a"), CacheStatus::Miss);
    assert_eq!(request("1", "name", "b"), CacheStatus::Hit);
    assert_eq!(request("2", "name", "a"), CacheStatus::Miss);
    assert_eq!(request("1", "price", "a"), CacheStatus::Miss);
    assert_eq!(renders.load(Ordering::SeqCst), 3);
}

#[test]
fn cached_child_fragment_inside_uncached_page() {
    let services = services_with(Arc::new(InMemoryCacheStore::new()));
    let sidebar_renders = Arc::new(AtomicU64::new(0));

    let sidebar_cache = DonutOutputCache::new(services.clone(), DonutCacheOptions::new().cache_profile("sidebar"));
    let counter = sidebar_renders.clone();
    let registry = FragmentRegistry::new().register("Home", "Sidebar", move |ctx, invoker| {
        let counter = counter.clone();
        sidebar_cache
            .execute(ctx, invoker, move |ctx| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let section = ctx.route.value("section").unwrap_or_default().to_string();
                ctx.write(&format!("<aside>{} #{}</aside>", section, n))
            })
            .map(|_| ())
            .map_err(RenderError::from)
    });

    let sidebar = ActionSettings::new("Sidebar", "Home").with_route_value("section", "news");
    for _ in 0..2 {
        let mut ctx = RequestContext::new("Home", "Index");
        ctx.write("<main>").unwrap();
        services.render_donut_action(&mut ctx, &registry, &sidebar, false).unwrap();
        ctx.write("</main>").unwrap();

        assert_eq!(body(&ctx), "<main><aside>news #1</aside></main>");
        assert!(ctx.response.header("Cache-Control").is_none());
        assert!(!ctx.is_child_action);
        assert_eq!(ctx.route.action, "Index");
    }

    assert_eq!(sidebar_renders.load(Ordering::SeqCst), 1);
    let keys = services.manager().store().keys().unwrap();
    assert_eq!(keys, vec!["_d0nutCache_home_sidebar#section=news".to_string()]);
}

#[test]
fn nested_holes_are_refilled_fresh() {
    let services = services_with(Arc::new(InMemoryCacheStore::new()));
    let ticks = Arc::new(AtomicU64::new(0));

    let inner_services = services.clone();
    let counter = ticks.clone();
    let registry = FragmentRegistry::new()
        .register("Home", "Basket", move |ctx, invoker| {
            ctx.write("<basket>")?;
            inner_services.render_donut_action(ctx, invoker, &ActionSettings::new("Clock", "Home"), true)?;
            ctx.write("</basket>")
        })
        .register("Home", "Clock", move |ctx, _| {
            let tick = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ctx.write(&format!("{}", tick))
        });

    let cache = DonutOutputCache::new(services.clone(), DonutCacheOptions::new().with_duration(60));
    let render = || {
        let mut ctx = RequestContext::new("Home", "Index");
        let status = cache
            .execute(&mut ctx, &registry, |ctx| {
                ctx.write("<body>")?;
                services.render_donut_action(ctx, &registry, &ActionSettings::new("Basket", "Home"), true)?;
                ctx.write("</body>")
            })
            .unwrap();
        (status, ctx)
    };

    let (status, first) = render();
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(body(&first), "<body><basket>1</basket></body>");

    let (status, second) = render();
    assert_eq!(status, CacheStatus::Hit);
    assert_eq!(body(&second), "<body><basket>2</basket></body>");
    assert_no_markers(&second);
}

#[test]
fn tampered_cache_entry_is_a_protocol_error() {
    let site = Site::new();
    let cache = site.simple();
    let key = site
        .services
        .key_generator()
        .builder()
        .build_key("Home", "Simple", std::iter::empty());

    site.services.manager().add_item(
        &key,
        CacheItem::new("<p>before</p><!--Donut#AAAAforged#-->x<!--EndDonut--><p>after</p>", "text/html"),
        Utc::now() + Duration::seconds(60),
    );

    let mut ctx = RequestContext::new("Home", "Simple");
    let err = cache
        .execute(&mut ctx, &site.registry, |ctx| ctx.write("fresh"))
        .unwrap_err();

    assert!(err.is_protocol());
    assert_eq!(body(&ctx), "");
    assert_eq!(site.ticks.load(Ordering::SeqCst), 0);
}

#[test]
fn unterminated_cache_entry_is_a_protocol_error() {
    let site = Site::new();
    let cache = site.simple();
    let key = site
        .services
        .key_generator()
        .builder()
        .build_key("Home", "Simple", std::iter::empty());

    let token_source = site
        .services
        .filler()
        .wrap(&ActionSettings::new("Clock", "Home"), "x")
        .unwrap();
    let truncated = token_source.trim_end_matches("<!--EndDonut-->").to_string();
    site.services.manager().add_item(
        &key,
        CacheItem::new(truncated, "text/html"),
        Utc::now() + Duration::seconds(60),
    );

    let mut ctx = RequestContext::new("Home", "Simple");
    assert!(cache
        .execute(&mut ctx, &site.registry, |ctx| ctx.write("fresh"))
        .unwrap_err()
        .is_protocol());
}

struct UnavailableStore;

impl CacheStore for UnavailableStore {
    fn get(&self, _key: &str) -> Result<Option<CacheItem>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn set(&self, _key: &str, _item: CacheItem, _expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    fn remove(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

#[test]
fn unavailable_store_degrades_to_uncached_rendering() {
    let site = Site::with_store(Arc::new(UnavailableStore));
    let cache = site.simple();

    for n in 1..=2 {
        let (status, ctx) = site.request_simple(&cache);
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(
            body(&ctx),
            format!("<header>shell-{n}</header><time>tick={n}</time><footer/>")
        );
        assert_no_markers(&ctx);
    }
    assert!(!site.services.manager().remove_item("Home", "Simple"));
}

#[test]
fn concurrent_requests_share_the_cache() {
    let site = Site::new();
    let cache = site.simple();
    site.request_simple(&cache);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let (status, ctx) = site.request_simple(&cache);
                assert_eq!(status, CacheStatus::Hit);
                assert!(body(&ctx).starts_with("<header>shell-1</header><time>tick="));
                assert_no_markers(&ctx);
            });
        }
    });

    assert_eq!(site.shell_renders.load(Ordering::SeqCst), 1);
    assert_eq!(site.ticks.load(Ordering::SeqCst), 9);
}

#[test]
fn remove_item_with_request_route_values_forces_a_miss() {
    let site = Site::new();
    let detail = DonutOutputCache::new(site.services.clone(), DonutCacheOptions::new().with_duration(60));
    let request = || {
        let mut ctx = RequestContext::new("Products", "Detail")
            .with_route_value("slug", "shoe")
            .with_route_value("id", "7");
        let status = detail
            .execute(&mut ctx, &site.registry, |ctx| ctx.write("<h1>shoe</h1>"))
            .unwrap();
        (status, ctx)
    };

    let (status, ctx) = request();
    assert_eq!(status, CacheStatus::Miss);
    assert_eq!(request().0, CacheStatus::Hit);

    assert!(site
        .services
        .manager()
        .remove_item_with("Products", "Detail", &ctx.route.values, &[]));
    assert_eq!(request().0, CacheStatus::Miss);
}
