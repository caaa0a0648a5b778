//! Donut output caching for server-rendered pages.
//!
//! A page's rendered shell is cached once, while fragments marked as donut
//! holes are re-rendered fresh on every cache hit. This crate provides:
//! - `DonutOutputCache` - Wraps a handler with capture, commit and hit replay
//! - `CacheSettings` / `DonutCacheOptions` - Per-handler settings merged with profiles
//! - `OutputCacheConfig` - Global toggle, profiles and encryption key from TOML/JSON
//! - `KeyGenerator` - Deterministic, collision-free cache keys
//! - `DonutHoleFiller` - Marker emission, hole filling and marker stripping
//! - `OutputCacheManager` - Store access and administrative eviction
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use donut_cache::{DonutCaching, DonutCacheOptions, DonutOutputCache, InMemoryCacheStore, OutputCacheConfig};
//!
//! let services = Arc::new(DonutCaching::from_config(
//!     OutputCacheConfig::default(),
//!     Arc::new(InMemoryCacheStore::new()),
//! )?);
//!
//! let simple = DonutOutputCache::new(services.clone(), DonutCacheOptions::new().with_duration(60));
//! simple.execute(&mut ctx, &registry, |ctx| {
//!     ctx.write("<h1>Home</h1>")?;
//!     services.render_donut_action(ctx, &registry, &ActionSettings::new("Clock", "Home"), true)?;
//!     Ok(())
//! })?;
//! ```

mod action;
mod capture;
mod config;
mod error;
mod fragment;
mod headers;
mod holes;
mod key;
mod manager;
mod output_cache;
mod settings;
mod store;

pub use action::*;
pub use capture::*;
pub use config::*;
pub use error::*;
pub use fragment::*;
pub use headers::*;
pub use holes::*;
pub use key::*;
pub use manager::*;
pub use output_cache::*;
pub use settings::*;
pub use store::*;
