//! Request context with route data and the live response.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::error::RenderError;
use crate::response::{Output, Response};

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        static SEQUENCE: AtomicU64 = AtomicU64::new(1);

        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        Self(format!(
            "{:x}-{:x}",
            nanos,
            SEQUENCE.fetch_add(1, Ordering::Relaxed)
        ))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Route values in insertion order (e.g., `id` from `/products/{id}`).
pub type RouteValues = IndexMap<String, String>;

/// Query string and form parameters.
pub type RequestParams = BTreeMap<String, String>;

/// HTTP headers.
pub type Headers = HashMap<String, String>;

/// Controller, action and route values selected for a handler.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteData {
    /// Logical controller name.
    pub controller: String,
    /// Action name.
    pub action: String,
    /// Remaining route values.
    pub values: RouteValues,
}

impl RouteData {
    /// Create route data for a controller action.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            action: action.into(),
            values: RouteValues::new(),
        }
    }

    /// Add a route value.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Replace all route values.
    pub fn with_values(mut self, values: RouteValues) -> Self {
        self.values = values;
        self
    }

    /// Get a route value by name.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(|s| s.as_str())
    }
}

/// Request state passed to handlers and to the caching engine.
#[derive(Debug)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// Request path.
    pub path: String,
    /// Query string and form parameters.
    pub params: RequestParams,
    /// HTTP headers.
    pub headers: Headers,
    /// Route data of the handler currently executing.
    pub route: RouteData,
    /// Whether the current handler is a fragment rendered inside a parent page.
    pub is_child_action: bool,
    /// Response being produced.
    pub response: Response,
}

impl RequestContext {
    /// Create a request context routed to a controller action.
    pub fn new(controller: impl Into<String>, action: impl Into<String>) -> Self {
        let route = RouteData::new(controller, action);
        Self {
            request_id: RequestId::generate(),
            path: format!("/{}/{}", route.controller, route.action),
            params: RequestParams::new(),
            headers: Headers::new(),
            route,
            is_child_action: false,
            response: Response::new(),
        }
    }

    /// Set the request path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Add a request parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a route value.
    pub fn with_route_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route.values.insert(name.into(), value.into());
        self
    }

    /// Replace the response.
    pub fn with_response(mut self, response: Response) -> Self {
        self.response = response;
        self
    }

    /// Get a request parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Write markup to the response's current output target.
    pub fn write(&mut self, markup: &str) -> Result<(), RenderError> {
        self.response.write(markup)
    }

    /// Render a child fragment against this request and return its markup.
    ///
    /// The fragment runs with its own route data and `is_child_action` set,
    /// writing into a private buffer. Route data, the child flag and the
    /// output target are restored whether rendering succeeds, fails or panics.
    pub fn render_child<F>(&mut self, route: RouteData, render: F) -> Result<String, RenderError>
    where
        F: FnOnce(&mut RequestContext) -> Result<(), RenderError>,
    {
        let mut scope = ChildScope::enter(self, route);
        let result = render(&mut *scope.ctx);
        let captured = scope.exit();

        result?;
        captured
            .and_then(Output::into_buffered)
            .ok_or(RenderError::OutputLost)
    }
}

/// Parent state saved while a child fragment renders.
///
/// Restored by `exit`, or by `Drop` if the child unwinds.
struct ChildScope<'a> {
    ctx: &'a mut RequestContext,
    parent: Option<(RouteData, bool, Output)>,
}

impl<'a> ChildScope<'a> {
    fn enter(ctx: &'a mut RequestContext, route: RouteData) -> Self {
        let parent_route = std::mem::replace(&mut ctx.route, route);
        let parent_child_flag = std::mem::replace(&mut ctx.is_child_action, true);
        let parent_output = ctx.response.swap_output(Output::buffer());

        Self {
            ctx,
            parent: Some((parent_route, parent_child_flag, parent_output)),
        }
    }

    /// Restore the parent and return the child's output. `None` once exited.
    fn exit(&mut self) -> Option<Output> {
        let (route, child_flag, output) = self.parent.take()?;
        self.ctx.is_child_action = child_flag;
        self.ctx.route = route;
        Some(self.ctx.response.swap_output(output))
    }
}

impl Drop for ChildScope<'_> {
    fn drop(&mut self) {
        self.exit();
    }
}
