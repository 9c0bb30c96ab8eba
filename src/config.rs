//! User configuration
//!
//! Stored as JSON. Every field is optional; a missing file is an error only
//! when the path was given explicitly by the caller.

use crate::errors::ConfigError;
use crate::inspect::formatter::{CustomFormatter, FormatterRegistry};
use crate::remote::LoadPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Array cap for default loads; 0 keeps the built-in value
    pub max_array_values: i32,
    /// String cap for default loads; 0 keeps the built-in value
    pub max_string_len: i32,
    /// Custom formatters keyed by declared type name
    pub custom_formatters: BTreeMap<String, CustomFormatter>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }

    /// The default load policy with the configured caps applied
    pub fn load_policy(&self) -> LoadPolicy {
        let mut policy = LoadPolicy::LONG;
        if self.max_array_values > 0 {
            policy.max_array_values = self.max_array_values;
        }
        if self.max_string_len > 0 {
            policy.max_string_len = self.max_string_len;
        }
        policy
    }

    /// A registry holding the configured custom formatters. Entries naming a
    /// builtin type are skipped.
    pub fn formatters(&self) -> FormatterRegistry {
        let mut registry = FormatterRegistry::new();
        for (type_name, formatter) in &self.custom_formatters {
            if let Err(e) = registry.install_custom(type_name, formatter.clone()) {
                warn!(error = %e, "ignoring configured formatter");
            }
        }
        registry
    }

    /// Copy the registry's custom formatters back for saving
    pub fn store_formatters(&mut self, registry: &FormatterRegistry) {
        self.custom_formatters = registry
            .custom_formatters()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
    }
}
