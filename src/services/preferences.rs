//! Shared feature selection
//!
//! The UI toggles features at any time; the pipeline only ever reads a
//! snapshot when a request is created.

use crate::types::{FeatureSet, FeatureType};
use std::sync::{PoisonError, RwLock};

/// Process-wide "currently selected features" owned by the UI layer
#[derive(Debug, Default)]
pub struct FeaturePreferences {
    selected: RwLock<FeatureSet>,
}

impl FeaturePreferences {
    #[must_use]
    pub fn new(initial: FeatureSet) -> Self {
        Self {
            selected: RwLock::new(initial),
        }
    }

    /// Copy of the current selection
    #[must_use]
    pub fn snapshot(&self) -> FeatureSet {
        self.selected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Flip one feature; returns whether it is selected afterwards
    pub fn toggle(&self, feature: FeatureType) -> bool {
        let mut selected = self.selected.write().unwrap_or_else(PoisonError::into_inner);
        if selected.remove(feature) {
            false
        } else {
            selected.insert(feature);
            true
        }
    }

    /// Replace the whole selection
    pub fn set(&self, features: FeatureSet) {
        *self.selected.write().unwrap_or_else(PoisonError::into_inner) = features;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_and_snapshot() {
        let preferences = FeaturePreferences::default();
        assert!(preferences.snapshot().is_empty());

        assert!(preferences.toggle(FeatureType::Skin));
        assert!(preferences.toggle(FeatureType::Teeth));
        let snapshot = preferences.snapshot();

        assert!(!preferences.toggle(FeatureType::Skin));
        assert!(snapshot.contains(FeatureType::Skin));
        assert!(!preferences.snapshot().contains(FeatureType::Skin));
    }

    #[test]
    fn test_set_replaces_selection() {
        let preferences = FeaturePreferences::new(FeatureSet::all());
        preferences.set([FeatureType::Hair].into_iter().collect());
        assert_eq!(preferences.snapshot().len(), 1);
    }
}
