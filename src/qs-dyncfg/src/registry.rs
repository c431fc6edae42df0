use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::DynamicU32;

/// Error returned by [`ConfigSet::set`] when the named knob does not exist.
#[derive(Debug, Error)]
pub enum ConfigUpdateError {
    /// No registered knob has this name.
    #[error("unknown config key {0:?}")]
    UnknownKey(String),
}

/// A named collection of [`DynamicU32`] knobs, used so the admin surface can
/// list and update configuration by string name without every call site
/// needing to know the concrete static it's touching.
pub struct ConfigSet {
    entries: Mutex<BTreeMap<&'static str, &'static DynamicU32>>,
}

impl ConfigSet {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers a knob. Registering the same name twice overwrites the
    /// earlier entry; this crate's own [`crate::all_configs`] only ever
    /// registers each static once.
    pub fn register_u32(&self, knob: &'static DynamicU32) {
        self.entries.lock().expect("config registry poisoned").insert(knob.name(), knob);
    }

    /// Returns `(name, description, default, current)` for every registered
    /// knob, sorted by name.
    pub fn list(&self) -> Vec<(&'static str, &'static str, u32, u32)> {
        self.entries
            .lock()
            .expect("config registry poisoned")
            .values()
            .map(|k| (k.name(), k.description(), k.default_value(), k.get()))
            .collect()
    }

    /// Updates the named knob's live value.
    pub fn set(&self, name: &str, value: u32) -> Result<(), ConfigUpdateError> {
        let entries = self.entries.lock().expect("config registry poisoned");
        match entries.get(name) {
            Some(knob) => {
                knob.set(value);
                Ok(())
            }
            None => Err(ConfigUpdateError::UnknownKey(name.to_string())),
        }
    }
}

impl Default for ConfigSet {
    fn default() -> Self {
        Self::new()
    }
}
