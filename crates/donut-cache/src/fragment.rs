//! Rendering fragments by controller and action name.

use std::collections::HashMap;
use std::sync::Arc;

use donut_core::{RenderError, RequestContext};

use crate::action::ActionSettings;

/// Renders a named fragment against the current request.
///
/// Supplied by the host framework; used to re-render donut holes on a
/// cache hit and to render child actions while a page is produced.
pub trait FragmentInvoker: Send + Sync {
    /// Render the fragment and return its markup.
    fn render_fragment(
        &self,
        action: &ActionSettings,
        ctx: &mut RequestContext,
    ) -> Result<String, RenderError>;
}

/// Handler rendering a fragment into the context's response.
///
/// Receives the invoker so it can render nested fragments of its own.
pub type FragmentHandler =
    Arc<dyn Fn(&mut RequestContext, &dyn FragmentInvoker) -> Result<(), RenderError> + Send + Sync>;

/// Fragment handlers registered by controller and action (case-insensitive).
#[derive(Default, Clone)]
pub struct FragmentRegistry {
    handlers: HashMap<(String, String), FragmentHandler>,
}

impl std::fmt::Debug for FragmentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentRegistry")
            .field("fragments", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FragmentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment handler.
    pub fn register<F>(mut self, controller: &str, action: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext, &dyn FragmentInvoker) -> Result<(), RenderError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers
            .insert(Self::lookup_key(controller, action), Arc::new(handler));
        self
    }

    /// Check if a fragment is registered.
    pub fn contains(&self, controller: &str, action: &str) -> bool {
        self.handlers.contains_key(&Self::lookup_key(controller, action))
    }

    fn lookup_key(controller: &str, action: &str) -> (String, String) {
        (controller.to_lowercase(), action.to_lowercase())
    }
}

impl FragmentInvoker for FragmentRegistry {
    fn render_fragment(
        &self,
        action: &ActionSettings,
        ctx: &mut RequestContext,
    ) -> Result<String, RenderError> {
        let handler = self
            .handlers
            .get(&Self::lookup_key(&action.controller_name, &action.action_name))
            .cloned()
            .ok_or_else(|| RenderError::FragmentNotFound {
                controller: action.controller_name.clone(),
                action: action.action_name.clone(),
            })?;

        ctx.render_child(action.to_route(), |child| handler(child, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_registered_fragment_with_route_values() {
        let registry = FragmentRegistry::new().register("Home", "Greeting", |ctx, _| {
            let name = ctx.route.value("name").unwrap_or("stranger").to_string();
            ctx.write(&format!("Hello, {}!", name))
        });

        let mut ctx = RequestContext::new("Home", "Index");
        let markup = registry
            .render_fragment(
                &ActionSettings::new("greeting", "home").with_route_value("name", "Ada"),
                &mut ctx,
            )
            .unwrap();

        assert_eq!(markup, "Hello, Ada!");
        assert_eq!(ctx.response.body(), Some(""));
    }

    #[test]
    fn test_nested_fragments_use_the_invoker() {
        let registry = FragmentRegistry::new()
            .register("Home", "Outer", |ctx, invoker| {
                let inner = invoker.render_fragment(&ActionSettings::new("Inner", "Home"), ctx)?;
                ctx.write(&format!("[{}]", inner))
            })
            .register("Home", "Inner", |ctx, _| ctx.write("inner"));

        let mut ctx = RequestContext::new("Home", "Index");
        let markup = registry
            .render_fragment(&ActionSettings::new("Outer", "Home"), &mut ctx)
            .unwrap();
        assert_eq!(markup, "[inner]");
    }

    #[test]
    fn test_unknown_fragment() {
        let registry = FragmentRegistry::new();
        let mut ctx = RequestContext::new("Home", "Index");
        let err = registry
            .render_fragment(&ActionSettings::new("Missing", "Home"), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, RenderError::FragmentNotFound { .. }));
    }
}
