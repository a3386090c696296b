//! Capture session state machine
//!
//! ```text
//! AwaitingCapture --WillBeginCapture--> Exposing
//! Exposing --WillCapturePhoto | MatteReceived | PhotoDataReceived--> Exposing
//! AwaitingCapture | Exposing --CaptureFinished--> Finalizing
//! any non-terminal --> Completed | Failed   (exactly once)
//! ```
//!
//! A session only holds state and enforces transitions. Decoding, extraction,
//! persistence and notification are driven by the pipeline, which calls in
//! here while holding the registry lock.

use crate::{
    error::{CaptureError, Result},
    orientation::Orientation,
    types::{CaptureRequest, FeatureType, OutputSet, ResolvedSettings},
};
use image::RgbaImage;
use instant::Duration;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::oneshot;

/// Lifecycle of one capture request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    AwaitingCapture,
    Exposing,
    Finalizing,
    Completed,
    Failed,
}

impl LifecycleState {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LifecycleState::AwaitingCapture => "awaiting-capture",
            LifecycleState::Exposing => "exposing",
            LifecycleState::Finalizing => "finalizing",
            LifecycleState::Completed => "completed",
            LifecycleState::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Completed | LifecycleState::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events delivered by the capture subsystem, in protocol order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    WillBeginCapture,
    WillCapturePhoto,
    MatteReceived,
    PhotoDataReceived,
    CaptureFinished,
}

impl CaptureEvent {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CaptureEvent::WillBeginCapture => "will-begin-capture",
            CaptureEvent::WillCapturePhoto => "will-capture-photo",
            CaptureEvent::MatteReceived => "matte-received",
            CaptureEvent::PhotoDataReceived => "photo-data-received",
            CaptureEvent::CaptureFinished => "capture-finished",
        }
    }
}

/// Work handed to the pipeline when finalization starts
#[derive(Debug)]
pub struct Finalization {
    /// Canonical photo; `None` when no photo data ever arrived
    pub photo: Option<RgbaImage>,
    /// Orientation the photo was stored with, to be applied to every matte
    pub photo_orientation: Orientation,
    /// Rasterized mattes, still in their stored layout
    pub mattes: Vec<(FeatureType, RgbaImage)>,
}

/// What the caller gets back for reporting a terminal outcome
#[derive(Debug)]
pub struct TerminalClaim {
    pub completion: Option<oneshot::Sender<OutputSet>>,
    /// Whether a live-photo animation is still running
    pub live_photo: bool,
    /// Per-feature errors absorbed along the way
    pub absorbed_errors: Vec<CaptureError>,
}

/// Live state for one capture request
#[derive(Debug)]
pub struct CaptureSession {
    request: CaptureRequest,
    state: LifecycleState,
    processing_budget: Duration,
    live_photo: bool,
    shutter_fired: bool,
    photo: Option<RgbaImage>,
    photo_orientation: Orientation,
    mattes: HashMap<FeatureType, RgbaImage>,
    errors: Vec<CaptureError>,
    completion: Option<oneshot::Sender<OutputSet>>,
}

impl CaptureSession {
    #[must_use]
    pub fn new(request: CaptureRequest, completion: oneshot::Sender<OutputSet>) -> Self {
        let processing_budget = request.settings().max_processing_time;
        Self {
            request,
            state: LifecycleState::AwaitingCapture,
            processing_budget,
            live_photo: false,
            shutter_fired: false,
            photo: None,
            photo_orientation: Orientation::Up,
            mattes: HashMap::new(),
            errors: Vec::new(),
            completion: Some(completion),
        }
    }

    #[must_use]
    pub fn request(&self) -> &CaptureRequest {
        &self.request
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[must_use]
    pub fn processing_budget(&self) -> Duration {
        self.processing_budget
    }

    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    #[must_use]
    pub fn shutter_fired(&self) -> bool {
        self.shutter_fired
    }

    /// Feature types that currently hold a decoded matte
    #[must_use]
    pub fn matte_features(&self) -> Vec<FeatureType> {
        let mut features: Vec<_> = self.mattes.keys().copied().collect();
        features.sort_unstable();
        features
    }

    #[must_use]
    pub fn errors(&self) -> &[CaptureError] {
        &self.errors
    }

    fn expect_state(&self, allowed: &[LifecycleState], event: CaptureEvent) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CaptureError::InvalidTransition {
                state: self.state.name(),
                event: event.name(),
            })
        }
    }

    /// `WillBeginCapture`. Returns whether a live-photo movie is part of the capture.
    ///
    /// # Errors
    /// - `InvalidTransition` outside `AwaitingCapture`
    pub fn begin(&mut self, resolved: &ResolvedSettings) -> Result<bool> {
        self.expect_state(&[LifecycleState::AwaitingCapture], CaptureEvent::WillBeginCapture)?;
        if let Some(budget) = resolved.processing_budget {
            self.processing_budget = budget;
        }
        self.live_photo = resolved.has_live_photo();
        self.state = LifecycleState::Exposing;
        Ok(self.live_photo)
    }

    /// `WillCapturePhoto`. Returns whether the processing indicator should be shown.
    ///
    /// # Errors
    /// - `InvalidTransition` outside `Exposing`
    pub fn will_capture_photo(&mut self, indicator_threshold: Duration) -> Result<bool> {
        self.expect_state(&[LifecycleState::Exposing], CaptureEvent::WillCapturePhoto)?;
        self.shutter_fired = true;
        Ok(self.processing_budget > indicator_threshold)
    }

    /// Guard for `MatteReceived`: whether the matte should be decoded at all.
    ///
    /// Unselected features and repeated mattes for a feature are ignored.
    ///
    /// # Errors
    /// - `InvalidTransition` outside `Exposing`
    pub fn accepts_matte(&self, feature: FeatureType) -> Result<bool> {
        self.expect_state(&[LifecycleState::Exposing], CaptureEvent::MatteReceived)?;
        Ok(self.request.features().contains(feature) && !self.mattes.contains_key(&feature))
    }

    /// Store a rasterized matte. Dropped once the session has moved past exposure.
    pub fn store_matte(&mut self, feature: FeatureType, matte: RgbaImage) {
        if self.state == LifecycleState::Exposing && self.request.features().contains(feature) {
            self.mattes.entry(feature).or_insert(matte);
        }
    }

    /// Record a per-feature error that does not end the session
    pub fn record_error(&mut self, error: CaptureError) {
        self.errors.push(error);
    }

    /// Guard for `PhotoDataReceived`
    ///
    /// # Errors
    /// - `InvalidTransition` outside `Exposing` or when a photo was already stored
    pub fn accepts_photo(&self) -> Result<()> {
        self.expect_state(&[LifecycleState::Exposing], CaptureEvent::PhotoDataReceived)?;
        if self.photo.is_some() {
            return Err(CaptureError::InvalidTransition {
                state: "photo-already-received",
                event: CaptureEvent::PhotoDataReceived.name(),
            });
        }
        Ok(())
    }

    /// Store the canonical photo with the orientation it was stored in
    ///
    /// # Errors
    /// - `InvalidTransition` when the session can no longer take a photo
    pub fn store_photo(&mut self, photo: RgbaImage, orientation: Orientation) -> Result<()> {
        self.accepts_photo()?;
        self.photo = Some(photo);
        self.photo_orientation = orientation;
        Ok(())
    }

    /// `CaptureFinished` without error: move to `Finalizing` and hand over the
    /// photo and mattes. The matte map is emptied either way.
    ///
    /// # Errors
    /// - `InvalidTransition` when already finalizing or terminal
    pub fn begin_finalizing(&mut self) -> Result<Finalization> {
        self.expect_state(
            &[LifecycleState::AwaitingCapture, LifecycleState::Exposing],
            CaptureEvent::CaptureFinished,
        )?;
        self.state = LifecycleState::Finalizing;

        let mut mattes: Vec<_> = self.mattes.drain().collect();
        mattes.sort_unstable_by_key(|(feature, _)| *feature);
        Ok(Finalization {
            photo: self.photo.take(),
            photo_orientation: self.photo_orientation,
            mattes,
        })
    }

    /// Enter `Completed` or `Failed`. Returns `None` if a terminal state was
    /// already reached, so the outcome is reported exactly once.
    pub fn mark_terminal(&mut self, success: bool) -> Option<TerminalClaim> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = if success {
            LifecycleState::Completed
        } else {
            LifecycleState::Failed
        };
        self.mattes.clear();
        self.photo = None;

        Some(TerminalClaim {
            completion: self.completion.take(),
            live_photo: std::mem::take(&mut self.live_photo),
            absorbed_errors: std::mem::take(&mut self.errors),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CaptureSettings, FeatureSet, RequestId};

    fn session(features: &[FeatureType]) -> (CaptureSession, oneshot::Receiver<OutputSet>) {
        let (tx, rx) = oneshot::channel();
        let request = CaptureRequest::new(
            RequestId::new(1),
            CaptureSettings::default(),
            features.iter().copied().collect::<FeatureSet>(),
        );
        (CaptureSession::new(request, tx), rx)
    }

    #[test]
    fn test_begin_records_budget_and_live_photo() {
        let (mut session, _rx) = session(&[]);
        let resolved = ResolvedSettings {
            live_photo_movie_dimensions: Some((1080, 1920)),
            processing_budget: Some(Duration::from_millis(1500)),
            ..ResolvedSettings::default()
        };
        assert!(session.begin(&resolved).unwrap());
        assert_eq!(session.state(), LifecycleState::Exposing);
        assert!(session.will_capture_photo(Duration::from_secs(1)).unwrap());
        assert!(session.shutter_fired());
    }

    #[test]
    fn test_budget_defaults_to_request() {
        let (mut session, _rx) = session(&[]);
        assert!(!session.begin(&ResolvedSettings::default()).unwrap());
        assert_eq!(session.processing_budget(), Duration::from_millis(500));
        assert!(!session.will_capture_photo(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_begin_twice_is_invalid() {
        let (mut session, _rx) = session(&[]);
        session.begin(&ResolvedSettings::default()).unwrap();
        let err = session.begin(&ResolvedSettings::default()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidTransition { state: "exposing", .. }));
    }

    #[test]
    fn test_matte_guard() {
        let (mut session, _rx) = session(&[FeatureType::Skin]);
        assert!(session.accepts_matte(FeatureType::Skin).is_err());

        session.begin(&ResolvedSettings::default()).unwrap();
        assert!(session.accepts_matte(FeatureType::Skin).unwrap());
        assert!(!session.accepts_matte(FeatureType::Hair).unwrap());

        session.store_matte(FeatureType::Skin, RgbaImage::new(1, 1));
        assert!(!session.accepts_matte(FeatureType::Skin).unwrap());

        session.store_matte(FeatureType::Hair, RgbaImage::new(1, 1));
        assert_eq!(session.matte_features(), vec![FeatureType::Skin]);
    }

    #[test]
    fn test_photo_accepted_once() {
        let (mut session, _rx) = session(&[]);
        session.begin(&ResolvedSettings::default()).unwrap();
        session.store_photo(RgbaImage::new(2, 2), Orientation::Up).unwrap();
        assert!(session.has_photo());
        assert!(session
            .store_photo(RgbaImage::new(2, 2), Orientation::Up)
            .is_err());
    }

    #[test]
    fn test_finalizing_hands_over_and_clears() {
        let (mut session, _rx) = session(&[FeatureType::Hair, FeatureType::Skin]);
        session.begin(&ResolvedSettings::default()).unwrap();
        session.store_matte(FeatureType::Skin, RgbaImage::new(1, 1));
        session.store_matte(FeatureType::Hair, RgbaImage::new(1, 1));
        session.store_photo(RgbaImage::new(2, 2), Orientation::Left).unwrap();

        let finalization = session.begin_finalizing().unwrap();
        assert!(finalization.photo.is_some());
        assert_eq!(finalization.photo_orientation, Orientation::Left);
        let features: Vec<_> = finalization.mattes.iter().map(|(f, _)| *f).collect();
        assert_eq!(features, vec![FeatureType::Skin, FeatureType::Hair]);
        assert!(session.matte_features().is_empty());
        assert_eq!(session.state(), LifecycleState::Finalizing);

        // Late mattes are dropped
        session.store_matte(FeatureType::Skin, RgbaImage::new(1, 1));
        assert!(session.matte_features().is_empty());
        assert!(session.begin_finalizing().is_err());
    }

    #[test]
    fn test_finalizing_without_photo() {
        let (mut session, _rx) = session(&[]);
        let finalization = session.begin_finalizing().unwrap();
        assert!(finalization.photo.is_none());
        assert_eq!(finalization.photo_orientation, Orientation::Up);
    }

    #[test]
    fn test_terminal_claimed_once() {
        let (mut session, _rx) = session(&[]);
        session.record_error(CaptureError::decode("bad matte"));

        let claim = session.mark_terminal(true).unwrap();
        assert!(claim.completion.is_some());
        assert_eq!(claim.absorbed_errors.len(), 1);
        assert_eq!(session.state(), LifecycleState::Completed);

        assert!(session.mark_terminal(false).is_none());
        assert_eq!(session.state(), LifecycleState::Completed);
    }
}
