// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Dynamically updatable configuration, modeled on the teacher's `mz-dyncfg`
//! crate: each knob is a small named cell with a compile-time default and a
//! live value that can be changed at runtime without a restart. The
//! eviction policy reads `MAX_SETS_PER_CATEGORY` and `MAX_AGE_MONTHS` fresh
//! on every call rather than caching them, so an operator's `set-config`
//! takes effect on the very next allocation.

mod registry;
mod value;

pub use registry::{ConfigSet, ConfigUpdateError};
pub use value::DynamicU32;

use once_cell::sync::Lazy;

/// Maximum number of sets retained per (user, category) before the
/// count-cap evicts the oldest. Default `10`, per spec.
pub static MAX_SETS_PER_CATEGORY: Lazy<DynamicU32> = Lazy::new(|| {
    DynamicU32::new(
        "max_sets_per_category",
        "count-cap: max sets retained per (user, category) before the oldest are evicted",
        10,
    )
});

/// Age horizon, in whole calendar months, past which an assignment is
/// eligible for age-cap eviction regardless of count. Default `2`, per spec.
pub static MAX_AGE_MONTHS: Lazy<DynamicU32> = Lazy::new(|| {
    DynamicU32::new(
        "max_age_months",
        "age-cap: assignments older than this many calendar months are evicted",
        2,
    )
});

/// The live eviction parameters, snapshotted from the dynamic registry.
/// `qs-eviction` takes this by value rather than reading the statics
/// directly so it stays a pure function of its inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvictionParams {
    /// Current value of [`MAX_SETS_PER_CATEGORY`].
    pub max_sets_per_category: u32,
    /// Current value of [`MAX_AGE_MONTHS`].
    pub max_age_months: u32,
}

impl EvictionParams {
    /// Reads the current live values of both eviction knobs.
    pub fn current() -> Self {
        Self {
            max_sets_per_category: MAX_SETS_PER_CATEGORY.get(),
            max_age_months: MAX_AGE_MONTHS.get(),
        }
    }
}

/// Builds the process-wide [`ConfigSet`] containing every knob this crate
/// defines, for introspection (`qs-cli list-config`) and bulk updates.
pub fn all_configs() -> ConfigSet {
    let set = ConfigSet::new();
    set.register_u32(&MAX_SETS_PER_CATEGORY);
    set.register_u32(&MAX_AGE_MONTHS);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        assert_eq!(MAX_SETS_PER_CATEGORY.default_value(), 10);
        assert_eq!(MAX_AGE_MONTHS.default_value(), 2);
    }

    #[test]
    fn set_and_reset_round_trip() {
        let knob = DynamicU32::new("test_knob", "a test knob", 7);
        assert_eq!(knob.get(), 7);
        knob.set(42);
        assert_eq!(knob.get(), 42);
        knob.reset();
        assert_eq!(knob.get(), 7);
    }

    #[test]
    fn registry_rejects_unknown_key() {
        let set = ConfigSet::new();
        let err = set.set("does_not_exist", 1).unwrap_err();
        assert!(matches!(err, ConfigUpdateError::UnknownKey(_)));
    }
}
