//! Configuration types for the capture pipeline

use crate::error::{CaptureError, Result};
use image::imageops::FilterType;
use instant::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output image format for the original photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// PNG, lossless with alpha
    Png,
    /// JPEG (no transparency)
    #[default]
    Jpeg,
    /// TIFF, lossless with alpha
    Tiff,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Tiff => "tiff",
        }
    }
}

/// Filter used when resampling a matte up to photo resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    Nearest,
    /// Bilinear
    #[default]
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// The historical "mirror then rotate" step applied after orientation
/// normalization, to both the photo and every matte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatTransform {
    pub mirror: bool,
    /// Clockwise rotation, multiple of 90
    pub rotation_degrees: u32,
}

impl CompatTransform {
    /// No mirroring, no rotation
    pub const IDENTITY: CompatTransform = CompatTransform {
        mirror: false,
        rotation_degrees: 0,
    };
}

impl Default for CompatTransform {
    fn default() -> Self {
        Self {
            mirror: true,
            rotation_degrees: 360,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub resample_filter: ResampleFilter,
    pub compat_transform: CompatTransform,
    /// Budgets above this turn the processing indicator on
    pub processing_indicator_threshold: Duration,
    pub photo_output_format: OutputFormat,
    /// JPEG quality (0-100)
    pub jpeg_quality: u8,
    /// Age after which `fail_stale_sessions_with_config` fails a session
    pub stale_session_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            resample_filter: ResampleFilter::default(),
            compat_transform: CompatTransform::default(),
            processing_indicator_threshold: Duration::from_secs(1),
            photo_output_format: OutputFormat::default(),
            jpeg_quality: 90,
            stale_session_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Validate configuration parameters
    ///
    /// # Errors
    /// - JPEG quality above 100
    /// - Compat rotation that is not a multiple of 90
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(CaptureError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
            ));
        }
        if self.compat_transform.rotation_degrees % 90 != 0 {
            return Err(CaptureError::config_value_error(
                "rotation_degrees",
                self.compat_transform.rotation_degrees,
                "multiples of 90",
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or invalid values
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::file_io_error("read pipeline config", path, &e))?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    ///
    /// # Errors
    /// - Serialization or write failures
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| CaptureError::file_io_error("write pipeline config", path, &e))
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn resample_filter(mut self, filter: ResampleFilter) -> Self {
        self.config.resample_filter = filter;
        self
    }

    #[must_use]
    pub fn compat_transform(mut self, transform: CompatTransform) -> Self {
        self.config.compat_transform = transform;
        self
    }

    #[must_use]
    pub fn processing_indicator_threshold(mut self, threshold: Duration) -> Self {
        self.config.processing_indicator_threshold = threshold;
        self
    }

    #[must_use]
    pub fn photo_output_format(mut self, format: OutputFormat) -> Self {
        self.config.photo_output_format = format;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(0, 100);
        self
    }

    #[must_use]
    pub fn stale_session_timeout(mut self, timeout: Duration) -> Self {
        self.config.stale_session_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
