//! Error taxonomy for donut caching.

use donut_core::RenderError;
use donut_security::CryptoError;

/// Invalid or missing cache configuration. Raised before any rendering starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the handler options or the cache profile must specify a duration")]
    MissingDuration,

    #[error("duration must be greater than or equal to zero, got {0}")]
    NegativeDuration(i64),

    #[error("the '{0}' cache profile is not defined")]
    ProfileNotDefined(String),

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("invalid encryption key: {0}")]
    EncryptionKey(#[source] CryptoError),
}

/// Corrupt or tampered donut hole markup.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("donut hole token rejected: {0}")]
    Token(#[from] CryptoError),

    #[error("donut hole action settings are invalid: {0}")]
    ActionSettings(String),

    #[error("donut hole marker at byte {offset} has no token terminator")]
    MalformedMarker { offset: usize },

    #[error("donut hole marker at byte {offset} is never closed")]
    UnterminatedMarker { offset: usize },

    #[error("end marker at byte {offset} has no matching donut hole")]
    UnexpectedEndMarker { offset: usize },
}

/// Cache store backend failure. Callers degrade to a miss or a no-op.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache store listing not supported")]
    ListingUnsupported,
}

/// Any failure surfaced by the caching engine.
#[derive(Debug, thiserror::Error)]
pub enum DonutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Render(RenderError),
}

impl DonutError {
    /// Check if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a protocol (corruption) error.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this error was raised by a handler while rendering.
    pub fn is_render(&self) -> bool {
        matches!(self, Self::Render(_))
    }
}

// Nested caching errors travel through handlers as `RenderError::Handler`;
// unwrap them again so their classification survives.
impl From<RenderError> for DonutError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Handler(inner) => match inner.downcast::<DonutError>() {
                Ok(donut) => donut,
                Err(other) => Self::Render(RenderError::Handler(other)),
            },
            other => Self::Render(other),
        }
    }
}

impl From<DonutError> for RenderError {
    fn from(err: DonutError) -> Self {
        match err {
            DonutError::Render(render) => render,
            other => RenderError::Handler(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_survives_handler_round_trip() {
        let original = DonutError::from(ProtocolError::UnterminatedMarker { offset: 4 });
        let through_handler: RenderError = original.into();
        let back = DonutError::from(through_handler);
        assert!(back.is_protocol());
    }

    #[test]
    fn test_render_error_is_not_wrapped_twice() {
        let err: RenderError = DonutError::Render(RenderError::failed("boom")).into();
        assert!(matches!(err, RenderError::Failed(_)));
    }

    #[test]
    fn test_plain_handler_error_stays_render() {
        let err = DonutError::from(RenderError::Handler(anyhow::anyhow!("db down")));
        assert!(err.is_render());
    }
}
