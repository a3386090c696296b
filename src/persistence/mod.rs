//! Persistence gateway
//!
//! The pipeline saves the canonical photo and every extracted feature image
//! through a [`PersistenceGateway`]. Artifacts of one capture share a
//! [`CaptureTimestamp`] so they can be grouped again later.

pub mod filesystem;
pub mod memory;

pub use filesystem::FileSystemGateway;
pub use memory::{MemoryGateway, StoredImage};

use crate::{
    error::Result,
    types::{label_for, CaptureTimestamp, FeatureType, SavedImage},
};
use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sandboxed image store
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Persist one image. `feature` is `None` for the original photo.
    ///
    /// # Errors
    /// - Encoding or storage failures; the pipeline counts them, it does not
    ///   abort the session
    async fn save(
        &self,
        image: &RgbaImage,
        feature: Option<FeatureType>,
        timestamp: CaptureTimestamp,
    ) -> Result<SavedImage>;
}

/// Sidecar metadata stored next to every saved image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: Uuid,
    /// `skin`, `hair`, `teeth`, `glasses` or `none`
    pub label: String,
    pub captured_at: CaptureTimestamp,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageRecord {
    #[must_use]
    pub fn new(
        id: Uuid,
        feature: Option<FeatureType>,
        captured_at: CaptureTimestamp,
        file_name: String,
        dimensions: (u32, u32),
    ) -> Self {
        Self {
            id,
            label: label_for(feature).to_string(),
            captured_at,
            file_name,
            width: dimensions.0,
            height: dimensions.1,
        }
    }

    /// Feature type encoded in the label; `None` for the original photo
    #[must_use]
    pub fn feature(&self) -> Option<FeatureType> {
        FeatureType::from_label(&self.label)
    }

    #[must_use]
    pub fn is_original(&self) -> bool {
        self.feature().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_labels() {
        let timestamp = CaptureTimestamp::now();
        let original = ImageRecord::new(Uuid::new_v4(), None, timestamp, "a.jpg".into(), (4, 3));
        assert_eq!(original.label, "none");
        assert!(original.is_original());

        let skin = ImageRecord::new(
            Uuid::new_v4(),
            Some(FeatureType::Skin),
            timestamp,
            "b.png".into(),
            (4, 3),
        );
        assert_eq!(skin.label, "skin");
        assert_eq!(skin.feature(), Some(FeatureType::Skin));
    }

    #[test]
    fn test_record_json_shape() {
        let record = ImageRecord::new(
            Uuid::nil(),
            Some(FeatureType::Glasses),
            CaptureTimestamp::now(),
            "c.png".into(),
            (10, 20),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["label"], "glasses");
        assert_eq!(json["width"], 10);

        let parsed: ImageRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }
}
