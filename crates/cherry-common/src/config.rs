//! Event registry configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{CherryError, Result};

/// Settings consumed by the event registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// `bubbles` for triggered events when the caller leaves it unset
    pub trigger_bubbles: bool,

    /// `cancelable` for triggered events when the caller leaves it unset
    pub trigger_cancelable: bool,

    /// Cancel a record's pending debounce timer when the record is removed
    pub cancel_debounce_on_remove: bool,

    /// Emit a trace event for every handler invocation
    pub trace_dispatch: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            trigger_bubbles: true,
            trigger_cancelable: true,
            cancel_debounce_on_remove: true,
            trace_dispatch: false,
        }
    }
}

impl EventsConfig {
    /// Parse a config from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CherryError::config_with_source(format!("reading {}", path.display()), e)
        })?;
        Self::from_json(&text)
    }

    /// Serialize the config as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
