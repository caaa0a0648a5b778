//! Action settings and the codec that turns them into marker tokens.

use std::sync::Arc;

use donut_core::{RouteData, RouteValues};
use donut_security::Encryptor;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Identity of a fragment invocation, enough to render it again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSettings {
    /// Action name.
    #[serde(rename = "a")]
    pub action_name: String,
    /// Controller name.
    #[serde(rename = "c")]
    pub controller_name: String,
    /// Route values, in order.
    #[serde(rename = "r", default, skip_serializing_if = "RouteValues::is_empty")]
    pub route_values: RouteValues,
}

impl ActionSettings {
    /// Create action settings for a controller action.
    pub fn new(action_name: impl Into<String>, controller_name: impl Into<String>) -> Self {
        Self {
            action_name: action_name.into(),
            controller_name: controller_name.into(),
            route_values: RouteValues::new(),
        }
    }

    /// Add a route value.
    pub fn with_route_value(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.route_values.insert(name.into(), value.to_string());
        self
    }

    /// Route data for re-invoking this action.
    pub fn to_route(&self) -> RouteData {
        RouteData::new(&self.controller_name, &self.action_name)
            .with_values(self.route_values.clone())
    }
}

/// Turns action settings into marker-safe text and back.
pub trait ActionSettingsSerializer: Send + Sync {
    /// Serialize action settings.
    fn serialize(&self, settings: &ActionSettings) -> Result<String, ProtocolError>;

    /// Deserialize action settings produced by `serialize`.
    fn deserialize(&self, serialized: &str) -> Result<ActionSettings, ProtocolError>;
}

/// Compact JSON serializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonActionSettingsSerializer;

impl ActionSettingsSerializer for JsonActionSettingsSerializer {
    fn serialize(&self, settings: &ActionSettings) -> Result<String, ProtocolError> {
        serde_json::to_string(settings).map_err(|e| ProtocolError::ActionSettings(e.to_string()))
    }

    fn deserialize(&self, serialized: &str) -> Result<ActionSettings, ProtocolError> {
        serde_json::from_str(serialized).map_err(|e| ProtocolError::ActionSettings(e.to_string()))
    }
}

/// Seals another serializer's output with an encryptor.
pub struct EncryptingActionSettingsSerializer<S> {
    serializer: S,
    encryptor: Arc<dyn Encryptor>,
}

impl<S: ActionSettingsSerializer> EncryptingActionSettingsSerializer<S> {
    /// Wrap a serializer.
    pub fn new(serializer: S, encryptor: Arc<dyn Encryptor>) -> Self {
        Self {
            serializer,
            encryptor,
        }
    }
}

impl<S: ActionSettingsSerializer> ActionSettingsSerializer for EncryptingActionSettingsSerializer<S> {
    fn serialize(&self, settings: &ActionSettings) -> Result<String, ProtocolError> {
        let serialized = self.serializer.serialize(settings)?;
        Ok(self.encryptor.encrypt(&serialized)?)
    }

    fn deserialize(&self, serialized: &str) -> Result<ActionSettings, ProtocolError> {
        let decrypted = self.encryptor.decrypt(serialized)?;
        self.serializer.deserialize(&decrypted)
    }
}
