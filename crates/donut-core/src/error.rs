//! Rendering errors.

/// Error raised by a page or fragment while it renders.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("fragment '{controller}.{action}' is not registered")]
    FragmentNotFound { controller: String, action: String },

    #[error("render failed: {0}")]
    Failed(String),

    #[error("output write failed: {0}")]
    Output(#[from] std::io::Error),

    #[error("output target was replaced and not restored by a nested render")]
    OutputLost,

    #[error("handler error: {0}")]
    Handler(#[from] anyhow::Error),
}

impl RenderError {
    /// Create a generic render failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
