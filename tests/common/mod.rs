//! Shared fixtures for the capture scenario tests

#![allow(dead_code)]

use image::{ImageFormat, Rgba, RgbaImage};
use ssm_capture::{
    CaptureNotification, CapturePipeline, CapturedPhoto, ChannelObserver, DefaultMatteDecoder,
    FeatureType, MatteBuffer, MatteDecoder, MemoryGateway, Orientation, PipelineConfig, Result,
    SegmentationMatte,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};

pub const PHOTO_WIDTH: u32 = 12;
pub const PHOTO_HEIGHT: u32 = 8;

/// Photo with a horizontal gradient so mirroring is observable
pub fn photo_pixels() -> RgbaImage {
    RgbaImage::from_fn(PHOTO_WIDTH, PHOTO_HEIGHT, |x, y| {
        Rgba([(x * 20) as u8, (y * 30) as u8, 90, 255])
    })
}

pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

pub fn photo() -> CapturedPhoto {
    CapturedPhoto::new(encode_png(&photo_pixels()))
}

/// Quarter-resolution matte filled with one confidence value
pub fn matte(feature: FeatureType, value: u8) -> SegmentationMatte {
    SegmentationMatte {
        feature,
        buffer: MatteBuffer::filled(PHOTO_WIDTH / 4, PHOTO_HEIGHT / 4, value),
        orientation: Orientation::Up,
    }
}

/// Matte plane that is too short for its declared dimensions
pub fn truncated_matte(feature: FeatureType) -> SegmentationMatte {
    SegmentationMatte {
        feature,
        buffer: MatteBuffer::luma(4, 4, vec![255; 3]),
        orientation: Orientation::Up,
    }
}

/// Matte decoder that counts how many raw planes it decodes
pub struct CountingDecoder {
    inner: DefaultMatteDecoder,
    calls: Arc<AtomicUsize>,
}

impl CountingDecoder {
    pub fn new(config: &PipelineConfig) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let decoder = Self {
            inner: DefaultMatteDecoder::new(config.compat_transform),
            calls: Arc::clone(&calls),
        };
        (decoder, calls)
    }
}

impl MatteDecoder for CountingDecoder {
    fn rasterize(&self, matte: &SegmentationMatte) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.rasterize(matte)
    }

    fn orient(&self, matte: &RgbaImage, photo_orientation: Orientation) -> Result<RgbaImage> {
        self.inner.orient(matte, photo_orientation)
    }
}

/// Pipeline over an in-memory gateway with a channel observer
pub struct Harness {
    pub pipeline: Arc<CapturePipeline>,
    pub gateway: MemoryGateway,
    pub notifications: UnboundedReceiver<CaptureNotification>,
    pub decoder_calls: Arc<AtomicUsize>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_gateway(MemoryGateway::new())
    }

    pub fn with_gateway(gateway: MemoryGateway) -> Self {
        let config = PipelineConfig::default();
        let (decoder, decoder_calls) = CountingDecoder::new(&config);
        let (sender, notifications) = mpsc::unbounded_channel();
        let pipeline = CapturePipeline::new(
            config,
            Arc::new(gateway.clone()),
            Arc::new(ChannelObserver::new(sender)),
        )
        .unwrap()
        .with_decoder(Arc::new(decoder));

        Self {
            pipeline: Arc::new(pipeline),
            gateway,
            notifications,
            decoder_calls,
        }
    }

    pub fn decoder_calls(&self) -> usize {
        self.decoder_calls.load(Ordering::SeqCst)
    }

    /// Every notification delivered so far
    pub fn drain(&mut self) -> Vec<CaptureNotification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }

    /// Completion notifications delivered so far
    pub fn completions(&mut self) -> Vec<CaptureNotification> {
        self.drain()
            .into_iter()
            .filter(|n| matches!(n, CaptureNotification::Completed { .. }))
            .collect()
    }
}
