//! Per-invocation output capture.

use donut_core::{Output, RequestContext};
use tracing::trace;

/// Prefix of the identifier naming a capture.
pub const CALLBACK_KEY_PREFIX: &str = "d0nutCallback";

/// Redirects a handler's output into a private buffer.
///
/// `finish` restores the original output exactly once and hands back what
/// was captured. If the guard is dropped unfinished (the handler panicked
/// or returned early) the original output is restored and the buffer is
/// discarded, so nothing partial is ever committed.
#[derive(Debug)]
pub struct OutputCapture<'a> {
    ctx: &'a mut RequestContext,
    original: Option<Output>,
    callback_key: String,
}

impl<'a> OutputCapture<'a> {
    /// Start capturing the context's output.
    pub fn begin(ctx: &'a mut RequestContext) -> Self {
        let callback_key = format!(
            "{}.{}.{}",
            CALLBACK_KEY_PREFIX, ctx.route.controller, ctx.route.action
        );
        let original = ctx.response.swap_output(Output::buffer());
        trace!(callback_key = %callback_key, "output capture started");

        Self {
            ctx,
            original: Some(original),
            callback_key,
        }
    }

    /// Identifier of this capture (`d0nutCallback.{controller}.{action}`).
    pub fn callback_key(&self) -> &str {
        &self.callback_key
    }

    /// Context the handler renders into.
    pub fn context(&mut self) -> &mut RequestContext {
        self.ctx
    }

    /// Check if the original output has been restored.
    pub fn is_finished(&self) -> bool {
        self.original.is_none()
    }

    /// Restore the original output and return the captured one.
    ///
    /// Returns `None` on every call after the first.
    pub fn finish(&mut self) -> Option<Output> {
        let original = self.original.take()?;
        trace!(callback_key = %self.callback_key, "output capture finished");
        Some(self.ctx.response.swap_output(original))
    }
}

impl Drop for OutputCapture<'_> {
    fn drop(&mut self) {
        if self.finish().is_some() {
            trace!(callback_key = %self.callback_key, "discarded unfinished capture");
        }
    }
}
