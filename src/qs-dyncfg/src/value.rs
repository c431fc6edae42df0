use std::sync::atomic::{AtomicU32, Ordering};

use tracing::info;

/// A single dynamically updatable `u32` configuration value.
///
/// Reads are lock-free (`Ordering::Relaxed` on a plain `AtomicU32` — these
/// values are read far more often than written and tearing is impossible
/// for a 32-bit load/store on every platform we target).
pub struct DynamicU32 {
    name: &'static str,
    description: &'static str,
    default: u32,
    current: AtomicU32,
}

impl DynamicU32 {
    /// Creates a new knob with the given name, description, and default.
    /// The live value starts at `default`.
    pub fn new(name: &'static str, description: &'static str, default: u32) -> Self {
        Self {
            name,
            description,
            default,
            current: AtomicU32::new(default),
        }
    }

    /// The knob's stable name, used for CLI/config-file lookups.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// A human-readable description of what this knob controls.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// The compile-time default, independent of the current live value.
    pub fn default_value(&self) -> u32 {
        self.default
    }

    /// The current live value.
    pub fn get(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    /// Updates the live value. Takes effect for every subsequent read —
    /// there is no propagation delay because there is no cache to
    /// invalidate.
    pub fn set(&self, value: u32) {
        self.current.store(value, Ordering::Relaxed);
        info!(name = self.name, value, "dyncfg updated");
    }

    /// Resets the live value back to the compile-time default.
    pub fn reset(&self) {
        self.set(self.default);
    }
}
