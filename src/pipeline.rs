//! Capture-completion pipeline
//!
//! `CapturePipeline` is the coordinator the capture subsystem talks to. It
//! exposes one entry point per lifecycle event, keeps every in-flight session
//! in the [`InFlightRegistry`], runs decoding and extraction on the blocking
//! pool, fans persistence out to the [`PersistenceGateway`] and reports exactly
//! one outcome per request, both to the [`CaptureObserver`] and through the
//! request's [`CaptureHandle`].

use crate::{
    config::PipelineConfig,
    error::{CaptureError, Result},
    extraction::RegionExtractor,
    matte::{DefaultMatteDecoder, MatteDecoder},
    orientation::{decode_photo, mirror_then_rotate, normalize, Orientation},
    persistence::PersistenceGateway,
    registry::InFlightRegistry,
    services::{CaptureObserver, FeaturePreferences},
    session::CaptureSession,
    tracing_config::spans,
    types::{
        CaptureRequest, CaptureSettings, CaptureTimestamp, CapturedPhoto, ExtractedFeatureImage,
        FeatureSet, FeatureType, OutputSet, RequestId, ResolvedSettings, SavedImage,
        SegmentationMatte,
    },
};
use futures::future::join_all;
use image::RgbaImage;
use instant::{Duration, Instant};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn, Instrument};

/// Resolves to the [`OutputSet`] of one request once it reaches a terminal state
#[derive(Debug)]
pub struct CaptureHandle {
    id: RequestId,
    receiver: oneshot::Receiver<OutputSet>,
}

impl CaptureHandle {
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Non-blocking check for the outcome
    ///
    /// # Errors
    /// - `Internal` when the pipeline dropped the request without an outcome
    pub fn try_outcome(&mut self) -> Result<Option<OutputSet>> {
        match self.receiver.try_recv() {
            Ok(output) => Ok(Some(output)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(dropped(self.id)),
        }
    }
}

fn dropped(id: RequestId) -> CaptureError {
    CaptureError::internal(format!("capture request {} was dropped without an outcome", id))
}

impl Future for CaptureHandle {
    type Output = Result<OutputSet>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.map_err(|_| dropped(id)))
    }
}

/// Coordinator for every in-flight capture
pub struct CapturePipeline {
    config: PipelineConfig,
    registry: InFlightRegistry,
    next_id: AtomicU64,
    decoder: Arc<dyn MatteDecoder>,
    extractor: RegionExtractor,
    gateway: Arc<dyn PersistenceGateway>,
    observer: Arc<dyn CaptureObserver>,
}

impl CapturePipeline {
    /// Create a pipeline with the default matte decoder
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn new(
        config: PipelineConfig,
        gateway: Arc<dyn PersistenceGateway>,
        observer: Arc<dyn CaptureObserver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            decoder: Arc::new(DefaultMatteDecoder::new(config.compat_transform)),
            extractor: RegionExtractor::from_config(&config),
            registry: InFlightRegistry::new(),
            next_id: AtomicU64::new(1),
            config,
            gateway,
            observer,
        })
    }

    /// Replace the matte decoder
    #[must_use]
    pub fn with_decoder(mut self, decoder: Arc<dyn MatteDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn is_in_flight(&self, id: RequestId) -> bool {
        self.registry.contains(id)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn in_flight_ids(&self) -> Vec<RequestId> {
        self.registry.ids()
    }

    /// Start tracking a new capture request for the given feature selection
    ///
    /// # Errors
    /// - `Internal` if the registry is unusable
    pub fn begin_tracking(
        &self,
        settings: CaptureSettings,
        features: FeatureSet,
    ) -> Result<CaptureHandle> {
        let id = RequestId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();
        let request = CaptureRequest::new(id, settings, features);

        debug!(
            request_id = %id,
            features = request.features().len(),
            "Tracking capture request"
        );
        self.registry.insert(CaptureSession::new(request, sender))?;
        Ok(CaptureHandle { id, receiver })
    }

    /// Start tracking with a snapshot of the current feature preferences
    ///
    /// # Errors
    /// - `Internal` if the registry is unusable
    pub fn begin_tracking_with_preferences(
        &self,
        settings: CaptureSettings,
        preferences: &FeaturePreferences,
    ) -> Result<CaptureHandle> {
        self.begin_tracking(settings, preferences.snapshot())
    }

    /// `WillBeginCapture`
    ///
    /// # Errors
    /// - `UnknownRequest`, `InvalidTransition`
    #[instrument(skip_all, fields(request_id = %id))]
    pub fn will_begin_capture(&self, id: RequestId, resolved: &ResolvedSettings) -> Result<()> {
        let live_photo = self.registry.with_session(id, |session| session.begin(resolved))?;
        if live_photo {
            self.observer.on_capture_beginning_live_photo(true);
        }
        Ok(())
    }

    /// `WillCapturePhoto`
    ///
    /// # Errors
    /// - `UnknownRequest`, `InvalidTransition`
    #[instrument(skip_all, fields(request_id = %id))]
    pub fn will_capture_photo(&self, id: RequestId) -> Result<()> {
        let threshold = self.config.processing_indicator_threshold;
        let show_indicator = self
            .registry
            .with_session(id, |session| session.will_capture_photo(threshold))?;

        self.observer.on_shutter_animation();
        if show_indicator {
            self.observer.on_processing_indicator(true);
        }
        Ok(())
    }

    /// `MatteReceived`. Mattes for unselected features are ignored without
    /// decoding; a decode failure only drops that feature. The matte is kept
    /// in its stored layout until the photo's orientation is known.
    ///
    /// # Errors
    /// - `UnknownRequest`, `InvalidTransition`
    #[instrument(skip_all, fields(request_id = %id, feature = %matte.feature))]
    pub async fn matte_received(&self, id: RequestId, matte: SegmentationMatte) -> Result<()> {
        let feature = matte.feature;
        if !self
            .registry
            .with_session(id, |session| session.accepts_matte(feature))?
        {
            debug!("Ignoring matte for unselected or repeated feature");
            return Ok(());
        }

        let decoder = Arc::clone(&self.decoder);
        let decoded = tokio::task::spawn_blocking(move || decoder.rasterize(&matte))
            .await
            .map_err(|e| CaptureError::internal(format!("matte decoder task failed: {}", e)))?;

        self.registry.with_session(id, |session| {
            match decoded {
                Ok(image) => {
                    debug!(width = image.width(), height = image.height(), "Rasterized matte");
                    session.store_matte(feature, image);
                },
                Err(e) => {
                    warn!(error = %e, "Dropping feature after matte decode failure");
                    session.record_error(e);
                },
            }
            Ok(())
        })
    }

    /// `PhotoDataReceived`. A native error or an undecodable photo fails the
    /// session immediately.
    ///
    /// # Errors
    /// - `UnknownRequest`, `InvalidTransition`
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn photo_data_received(
        &self,
        id: RequestId,
        photo: std::result::Result<CapturedPhoto, CaptureError>,
    ) -> Result<()> {
        self.registry.with_session(id, |session| session.accepts_photo())?;

        let photo = match photo {
            Ok(photo) => photo,
            Err(native) => {
                self.observer.on_processing_indicator(false);
                self.fail(id, native);
                return Ok(());
            },
        };

        let compat = self.config.compat_transform;
        let canonical = tokio::task::spawn_blocking(move || -> Result<(RgbaImage, Orientation)> {
            let (pixels, orientation) = decode_photo(&photo)?;
            let upright = normalize(&pixels, orientation)?;
            let canonical = mirror_then_rotate(&upright, compat.mirror, compat.rotation_degrees)?;
            Ok((canonical, orientation))
        })
        .await
        .map_err(|e| CaptureError::internal(format!("photo decoder task failed: {}", e)))?;

        self.observer.on_processing_indicator(false);
        match canonical {
            Ok((image, orientation)) => {
                debug!(
                    width = image.width(),
                    height = image.height(),
                    ?orientation,
                    "Canonical photo ready"
                );
                self.registry
                    .with_session(id, |session| session.store_photo(image, orientation))
            },
            Err(e) => {
                self.fail(id, e);
                Ok(())
            },
        }
    }

    /// `CaptureFinished`, always the last event. Extracts every stored matte,
    /// persists the photo and the crops, and reports the aggregate outcome.
    ///
    /// A request that already failed earlier (for example on a native photo
    /// error) has nothing left to finish; its `CaptureFinished` is a no-op.
    ///
    /// # Errors
    /// - `UnknownRequest` for ids this pipeline never issued
    /// - `InvalidTransition`
    #[instrument(skip_all, fields(request_id = %id))]
    pub async fn capture_finished(
        &self,
        id: RequestId,
        resolved: &ResolvedSettings,
        error: Option<CaptureError>,
    ) -> Result<()> {
        if self.already_resolved(id) {
            debug!("Capture already resolved, nothing to finish");
            return Ok(());
        }

        if let Some(native) = error {
            // Still has to be a tracked request
            self.registry.with_session(id, |_| Ok(()))?;
            self.fail(id, native);
            return Ok(());
        }

        let finalization = self
            .registry
            .with_session(id, |session| session.begin_finalizing())?;
        debug!(
            photo_dimensions = ?resolved.photo_dimensions,
            mattes = finalization.mattes.len(),
            "Finalizing capture"
        );

        let Some(photo) = finalization.photo else {
            self.fail(id, CaptureError::MissingPhotoData);
            return Ok(());
        };

        let start = Instant::now();
        let photo = Arc::new(photo);
        let (extracted, extraction_errors) = self
            .extract_features(
                id,
                Arc::clone(&photo),
                finalization.photo_orientation,
                finalization.mattes,
            )
            .await;
        let photo = Arc::try_unwrap(photo).unwrap_or_else(|shared| (*shared).clone());

        let timestamp = CaptureTimestamp::now();
        let (saved, save_errors) = self.persist(id, &photo, &extracted, timestamp).await;

        let absorbed: Vec<_> = extraction_errors.into_iter().chain(save_errors).collect();
        if !absorbed.is_empty() {
            // Sessions may already be gone if a watchdog failed them meanwhile
            let _ = self.registry.with_session(id, |session| {
                absorbed.into_iter().for_each(|e| session.record_error(e));
                Ok(())
            });
        }

        let saved_count = saved.len();
        info!(
            saved_count,
            features = extracted.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Capture finalized"
        );

        self.resolve(OutputSet {
            request_id: id,
            original: Some(photo),
            features: extracted,
            saved,
            saved_count,
            captured_at: Some(timestamp),
            error: (saved_count == 0).then_some(CaptureError::SaveFailed),
            absorbed_errors: Vec::new(),
        });
        Ok(())
    }

    /// Fail every session that stayed in flight longer than `older_than`.
    /// Returns how many were failed.
    pub fn fail_stale_sessions(&self, older_than: Duration) -> usize {
        let stale = self.registry.stale(older_than);
        for (id, age) in &stale {
            warn!(request_id = %id, age_ms = age.as_millis() as u64, "Failing stale capture session");
            self.fail(*id, CaptureError::StaleSession(*age));
        }
        stale.len()
    }

    /// [`Self::fail_stale_sessions`] with the configured timeout; a no-op
    /// when none is configured
    pub fn fail_stale_sessions_with_config(&self) -> usize {
        self.config
            .stale_session_timeout
            .map_or(0, |timeout| self.fail_stale_sessions(timeout))
    }

    /// Orient every matte like the photo, then cut its region out of the photo
    async fn extract_features(
        &self,
        id: RequestId,
        photo: Arc<RgbaImage>,
        photo_orientation: Orientation,
        mattes: Vec<(FeatureType, RgbaImage)>,
    ) -> (Vec<ExtractedFeatureImage>, Vec<CaptureError>) {
        let tasks = mattes.into_iter().map(|(feature, matte)| {
            let photo = Arc::clone(&photo);
            let decoder = Arc::clone(&self.decoder);
            let extractor = self.extractor;
            let span = spans::extraction(id, feature, photo.dimensions());
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    let oriented = decoder.orient(&matte, photo_orientation)?;
                    extractor.extract(&oriented, &photo)
                })
                .await
                .map_err(|e| CaptureError::internal(format!("extraction task failed: {}", e)))
                .and_then(|extracted| extracted);
                (feature, result)
            }
        });

        let mut extracted = Vec::new();
        let mut errors = Vec::new();
        for (feature, result) in join_all(tasks).await {
            match result {
                Ok(image) => extracted.push(ExtractedFeatureImage { feature, image }),
                Err(e) => {
                    warn!(%feature, error = %e, "Feature extraction failed");
                    errors.push(e);
                },
            }
        }
        (extracted, errors)
    }

    /// Fan out one save per artifact and wait for all of them
    async fn persist(
        &self,
        id: RequestId,
        photo: &RgbaImage,
        extracted: &[ExtractedFeatureImage],
        timestamp: CaptureTimestamp,
    ) -> (Vec<SavedImage>, Vec<CaptureError>) {
        let pending = 1 + extracted.len();
        debug!(pending, %timestamp, "Issuing saves");

        let original = std::iter::once((photo, None));
        let features = extracted
            .iter()
            .map(|item| (&item.image, Some(item.feature)));
        let saves = original
            .chain(features)
            .map(|(image, label)| self.gateway.save(image, label, timestamp));

        let results = join_all(saves)
            .instrument(spans::persistence(id, pending))
            .await;

        let mut saved = Vec::with_capacity(pending);
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(receipt) => saved.push(receipt),
                Err(e) => {
                    warn!(error = %e, "Save failed");
                    errors.push(e);
                },
            }
        }
        (saved, errors)
    }

    /// Issued by this pipeline but no longer in flight
    fn already_resolved(&self, id: RequestId) -> bool {
        let issued = (1..self.next_id.load(Ordering::Relaxed)).contains(&id.get());
        issued && !self.registry.contains(id)
    }

    fn fail(&self, id: RequestId, error: CaptureError) {
        self.resolve(OutputSet::failed(id, error));
    }

    /// Report the terminal outcome exactly once, then deregister
    fn resolve(&self, mut output: OutputSet) {
        let id = output.request_id;
        let success = output.error.is_none();
        let claim = match self
            .registry
            .with_session(id, |session| Ok(session.mark_terminal(success)))
        {
            Ok(Some(claim)) => claim,
            Ok(None) | Err(_) => {
                debug!(request_id = %id, "Outcome already reported");
                return;
            },
        };

        if let Some(error) = &output.error {
            warn!(request_id = %id, error = %error, "Capture failed");
        }
        output.absorbed_errors = claim.absorbed_errors;

        if claim.live_photo {
            self.observer.on_capture_beginning_live_photo(false);
        }
        self.observer
            .on_capture_completed(id, output.saved_count, output.error.as_ref());
        if let Some(completion) = claim.completion {
            if completion.send(output).is_err() {
                debug!(request_id = %id, "Capture handle dropped before the outcome");
            }
        }
        self.registry.remove(id);
    }
}
