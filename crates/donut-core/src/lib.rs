//! Request and response abstractions for donut output caching.
//!
//! This crate provides the host-facing types the caching engine runs against:
//! - `RequestContext` - Request parameters, route data and the live response
//! - `RouteData` - Controller, action and ordered route values
//! - `Response` - Status, headers and a swappable `Output` target
//! - `RenderError` - Failures raised while rendering a page or fragment

mod context;
mod error;
mod response;

pub use context::*;
pub use error::*;
pub use response::*;
