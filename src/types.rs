//! Core types for capture pipeline operations

use crate::{error::CaptureError, orientation::Orientation};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use instant::{Duration, Instant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Facial feature a segmentation matte can describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    Skin,
    Hair,
    Teeth,
    Glasses,
}

impl FeatureType {
    /// All feature types in display order
    pub const ALL: [FeatureType; 4] = [
        FeatureType::Skin,
        FeatureType::Hair,
        FeatureType::Teeth,
        FeatureType::Glasses,
    ];

    /// Persistence label for this feature
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FeatureType::Skin => "skin",
            FeatureType::Hair => "hair",
            FeatureType::Teeth => "teeth",
            FeatureType::Glasses => "glasses",
        }
    }

    /// Parse a persistence label back into a feature type
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.label() == label)
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Label used for the original photo, which has no feature type
pub const ORIGINAL_LABEL: &str = "none";

/// Persistence label for an optional feature type
#[must_use]
pub fn label_for(feature: Option<FeatureType>) -> &'static str {
    feature.map_or(ORIGINAL_LABEL, FeatureType::label)
}

/// Set of selected feature types
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet(BTreeSet<FeatureType>);

impl FeatureSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every feature type selected
    #[must_use]
    pub fn all() -> Self {
        FeatureType::ALL.into_iter().collect()
    }

    #[must_use]
    pub fn contains(&self, feature: FeatureType) -> bool {
        self.0.contains(&feature)
    }

    /// Add a feature; returns `false` if it was already selected
    pub fn insert(&mut self, feature: FeatureType) -> bool {
        self.0.insert(feature)
    }

    /// Remove a feature; returns `false` if it was not selected
    pub fn remove(&mut self, feature: FeatureType) -> bool {
        self.0.remove(&feature)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = FeatureType> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<FeatureType> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Unique identifier of one capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Codec the capture subsystem is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PhotoCodec {
    /// HEIC-equivalent high-efficiency container
    #[default]
    Hevc,
    Jpeg,
}

/// Flash behaviour requested for the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlashMode {
    #[default]
    Auto,
    On,
    Off,
}

/// Speed/quality tradeoff requested from the capture subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QualityPrioritization {
    Speed,
    #[default]
    Balanced,
    Quality,
}

/// Options chosen by the UI when triggering a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub codec: PhotoCodec,
    pub flash: FlashMode,
    pub quality: QualityPrioritization,
    /// Whether a live-photo companion movie is requested
    pub live_photo: bool,
    /// Maximum processing time the capture is allowed to take
    pub max_processing_time: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            codec: PhotoCodec::default(),
            flash: FlashMode::default(),
            quality: QualityPrioritization::default(),
            live_photo: false,
            max_processing_time: Duration::from_millis(500),
        }
    }
}

/// One photo capture attempt. Immutable once created.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    id: RequestId,
    settings: CaptureSettings,
    features: FeatureSet,
    created_at: Instant,
}

impl CaptureRequest {
    #[must_use]
    pub fn new(id: RequestId, settings: CaptureSettings, features: FeatureSet) -> Self {
        Self {
            id,
            settings,
            features,
            created_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    #[must_use]
    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Feature types selected when the request was created
    #[must_use]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Time elapsed since the request was created
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Settings the capture subsystem actually resolved for a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub photo_dimensions: (u32, u32),
    /// Present when a live-photo companion movie is part of the capture
    pub live_photo_movie_dimensions: Option<(u32, u32)>,
    /// Expected processing time reported by the capture subsystem
    pub processing_budget: Option<Duration>,
}

impl ResolvedSettings {
    #[must_use]
    pub fn has_live_photo(&self) -> bool {
        self.live_photo_movie_dimensions
            .is_some_and(|(width, height)| width > 0 && height > 0)
    }
}

/// Encoded photo delivered by the capture subsystem
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub data: Vec<u8>,
    /// Stored orientation tag; read from the encoded EXIF when absent
    pub orientation: Option<Orientation>,
}

impl CapturedPhoto {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            orientation: None,
        }
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = Some(orientation);
        self
    }
}

/// Pixel layout of a raw matte plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatteFormat {
    /// One 8-bit confidence channel
    OneComponent8,
    /// Packed 8-bit BGRA
    Bgra8,
}

impl MatteFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            MatteFormat::OneComponent8 => 1,
            MatteFormat::Bgra8 => 4,
        }
    }
}

/// Raw matte plane as delivered by the capture subsystem
#[derive(Debug, Clone)]
pub struct MatteBuffer {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes, may include padding
    pub bytes_per_row: usize,
    pub format: MatteFormat,
    pub data: Vec<u8>,
}

impl MatteBuffer {
    /// Tightly packed single-channel buffer
    #[must_use]
    pub fn luma(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width as usize,
            format: MatteFormat::OneComponent8,
            data,
        }
    }

    /// Single-channel buffer filled with one confidence value
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self::luma(width, height, vec![value; width as usize * height as usize])
    }
}

/// Per-feature matte data. Read-only once received.
#[derive(Debug, Clone)]
pub struct SegmentationMatte {
    pub feature: FeatureType,
    pub buffer: MatteBuffer,
    /// Orientation tag delivered with the matte. Mattes are oriented with the
    /// photo's resolved orientation, so this is informational.
    pub orientation: Orientation,
}

/// Result of region extraction for one feature
#[derive(Debug, Clone)]
pub struct ExtractedFeatureImage {
    pub feature: FeatureType,
    pub image: RgbaImage,
}

/// Shared timestamp for every artifact of one capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaptureTimestamp(DateTime<Utc>);

impl CaptureTimestamp {
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    #[must_use]
    pub fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    #[must_use]
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Receipt for one persisted image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedImage {
    pub id: Uuid,
    pub label: Option<FeatureType>,
}

/// Aggregate result of one completed session
#[derive(Debug)]
pub struct OutputSet {
    pub request_id: RequestId,
    /// Canonical photo, when one was obtained
    pub original: Option<RgbaImage>,
    pub features: Vec<ExtractedFeatureImage>,
    pub saved: Vec<SavedImage>,
    pub saved_count: usize,
    pub captured_at: Option<CaptureTimestamp>,
    /// Terminal error; `None` means the session completed
    pub error: Option<CaptureError>,
    /// Per-feature decode, extraction and save errors that did not end the session
    pub absorbed_errors: Vec<CaptureError>,
}

impl OutputSet {
    /// Output of a session that failed before anything was saved
    #[must_use]
    pub fn failed(request_id: RequestId, error: CaptureError) -> Self {
        Self {
            request_id,
            original: None,
            features: Vec::new(),
            saved: Vec::new(),
            saved_count: 0,
            captured_at: None,
            error: Some(error),
            absorbed_errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Feature types that made it into the output
    pub fn feature_types(&self) -> impl Iterator<Item = FeatureType> + '_ {
        self.features.iter().map(|extracted| extracted.feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_labels() {
        assert_eq!(FeatureType::Skin.label(), "skin");
        assert_eq!(FeatureType::Glasses.to_string(), "glasses");
        assert_eq!(label_for(None), "none");
        assert_eq!(label_for(Some(FeatureType::Teeth)), "teeth");
        assert_eq!(FeatureType::from_label("hair"), Some(FeatureType::Hair));
        assert_eq!(FeatureType::from_label("none"), None);
    }

    #[test]
    fn test_feature_set_operations() {
        let mut set = FeatureSet::new();
        assert!(set.is_empty());
        assert!(set.insert(FeatureType::Hair));
        assert!(!set.insert(FeatureType::Hair));
        assert!(set.contains(FeatureType::Hair));
        assert!(!set.contains(FeatureType::Skin));
        assert_eq!(set.len(), 1);
        assert!(set.remove(FeatureType::Hair));
        assert!(set.is_empty());

        assert_eq!(FeatureSet::all().len(), 4);
    }

    #[test]
    fn test_resolved_settings_live_photo() {
        let mut resolved = ResolvedSettings::default();
        assert!(!resolved.has_live_photo());
        resolved.live_photo_movie_dimensions = Some((0, 0));
        assert!(!resolved.has_live_photo());
        resolved.live_photo_movie_dimensions = Some((1920, 1080));
        assert!(resolved.has_live_photo());
    }

    #[test]
    fn test_failed_output_set() {
        let output = OutputSet::failed(RequestId::new(3), CaptureError::MissingPhotoData);
        assert!(!output.is_success());
        assert_eq!(output.saved_count, 0);
        assert_eq!(output.feature_types().count(), 0);
    }
}
