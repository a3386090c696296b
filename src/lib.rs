#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # SSM Capture
//!
//! Capture-completion pipeline for skin/hair/teeth/glasses segmentation
//! mattes. One photo capture goes in; the canonical photo plus one
//! transparent cutout per selected facial feature come out, all persisted
//! under a shared timestamp.
//!
//! ## Pipeline
//!
//! - **Orientation**: bakes the stored EXIF orientation into the pixels
//!   ([`orientation`])
//! - **Matte decoding**: raw matte planes to RGBA, aligned with the photo
//!   ([`matte`])
//! - **Region extraction**: HLS threshold on the matte, copying photo pixels
//!   inside the region ([`extraction`])
//! - **Capture sessions**: one state machine per request, tracked in an
//!   in-flight registry ([`session`], [`registry`], [`pipeline`])
//! - **Persistence**: pluggable image store ([`persistence`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ssm_capture::{
//!     CapturePipeline, CaptureSettings, CapturedPhoto, FeatureSet, FeatureType,
//!     FileSystemGateway, LoggingObserver, PipelineConfig, ResolvedSettings,
//! };
//! use std::sync::Arc;
//!
//! # async fn example(photo_bytes: Vec<u8>) -> anyhow::Result<()> {
//! let pipeline = CapturePipeline::new(
//!     PipelineConfig::default(),
//!     Arc::new(FileSystemGateway::in_default_location()?),
//!     Arc::new(LoggingObserver::new(false)),
//! )?;
//!
//! let features: FeatureSet = [FeatureType::Skin, FeatureType::Hair].into_iter().collect();
//! let handle = pipeline.begin_tracking(CaptureSettings::default(), features)?;
//! let id = handle.id();
//! let resolved = ResolvedSettings::default();
//!
//! // Driven by the capture subsystem's callbacks
//! pipeline.will_begin_capture(id, &resolved)?;
//! pipeline.will_capture_photo(id)?;
//! pipeline.photo_data_received(id, Ok(CapturedPhoto::new(photo_bytes))).await?;
//! pipeline.capture_finished(id, &resolved, None).await?;
//!
//! let output = handle.await?;
//! println!("saved {} image(s)", output.saved_count);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tracing-init`: `TracingConfig::init` installs a `tracing-subscriber`
//! - `tracing-json`: JSON output format for the installed subscriber

pub mod config;
pub mod error;
pub mod extraction;
pub mod matte;
pub mod orientation;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod services;
pub mod session;
pub mod tracing_config;
pub mod types;

pub use config::{
    CompatTransform, OutputFormat, PipelineConfig, PipelineConfigBuilder, ResampleFilter,
};
pub use error::{CaptureError, Result};
pub use extraction::{Hls, RegionExtractor, SENSITIVITY};
pub use matte::{DefaultMatteDecoder, MatteDecoder};
pub use orientation::{denormalize, normalize, Orientation};
pub use persistence::{
    FileSystemGateway, ImageRecord, MemoryGateway, PersistenceGateway, StoredImage,
};
pub use pipeline::{CaptureHandle, CapturePipeline};
pub use registry::InFlightRegistry;
pub use services::{
    CaptureNotification, CaptureObserver, ChannelObserver, FeaturePreferences, LoggingObserver,
    NoOpObserver,
};
pub use session::{CaptureEvent, CaptureSession, LifecycleState};
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::{
    CaptureRequest, CaptureSettings, CaptureTimestamp, CapturedPhoto, ExtractedFeatureImage,
    FeatureSet, FeatureType, FlashMode, MatteBuffer, MatteFormat, OutputSet, PhotoCodec,
    QualityPrioritization, RequestId, ResolvedSettings, SavedImage, SegmentationMatte,
};
