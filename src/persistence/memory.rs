//! In-memory image store
//!
//! Keeps saved images in memory and records every call, which makes it the
//! gateway of choice for tests and for hosts that only preview results.

use super::PersistenceGateway;
use crate::{
    error::{CaptureError, Result},
    types::{label_for, CaptureTimestamp, FeatureType, SavedImage},
};
use async_trait::async_trait;
use image::RgbaImage;
use instant::Duration;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// One image held by a [`MemoryGateway`]
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub saved: SavedImage,
    pub timestamp: CaptureTimestamp,
    pub image: RgbaImage,
}

/// In-memory gateway with call counting and injectable failures.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    stored: Arc<Mutex<Vec<StoredImage>>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<Mutex<HashSet<Option<FeatureType>>>>,
    delay: Option<Duration>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save for `feature` (`None` = original photo) fail
    #[must_use]
    pub fn failing_on(self, feature: Option<FeatureType>) -> Self {
        self.failing
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(feature);
        self
    }

    /// Make every save fail
    #[must_use]
    pub fn failing_all(self) -> Self {
        std::iter::once(None)
            .chain(FeatureType::ALL.into_iter().map(Some))
            .fold(self, Self::failing_on)
    }

    /// Delay each save, to exercise concurrent completion
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `save` calls, successful or not
    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Images saved so far, in completion order
    #[must_use]
    pub fn stored(&self) -> Vec<StoredImage> {
        self.stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Persistence labels of the saved images, sorted
    #[must_use]
    pub fn stored_labels(&self) -> Vec<&'static str> {
        let mut labels: Vec<_> = self
            .stored
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|stored| label_for(stored.saved.label))
            .collect();
        labels.sort_unstable();
        labels
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn save(
        &self,
        image: &RgbaImage,
        feature: Option<FeatureType>,
        timestamp: CaptureTimestamp,
    ) -> Result<SavedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let should_fail = self
            .failing
            .lock()
            .map_err(|_| CaptureError::internal("memory gateway lock poisoned"))?
            .contains(&feature);
        if should_fail {
            return Err(CaptureError::persistence(format!(
                "configured failure for '{}'",
                label_for(feature)
            )));
        }

        let saved = SavedImage {
            id: Uuid::new_v4(),
            label: feature,
        };
        self.stored
            .lock()
            .map_err(|_| CaptureError::internal("memory gateway lock poisoned"))?
            .push(StoredImage {
                saved: saved.clone(),
                timestamp,
                image: image.clone(),
            });
        Ok(saved)
    }
}
