//! Filesystem-backed image store with JSON sidecars

use super::{ImageRecord, PersistenceGateway};
use crate::{
    config::{OutputFormat, PipelineConfig},
    error::{CaptureError, Result},
    types::{CaptureTimestamp, FeatureType, SavedImage},
};
use async_trait::async_trait;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, RgbaImage};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const SIDECAR_EXTENSION: &str = "json";
const APP_DIR: &str = "SSMUtility";

/// Saves images under a single sandbox directory.
///
/// Each image is written as `<uuid>.<ext>` next to a `<uuid>.json`
/// [`ImageRecord`]. Feature crops are always PNG to keep their transparency.
#[derive(Debug, Clone)]
pub struct FileSystemGateway {
    root: PathBuf,
    photo_format: OutputFormat,
    jpeg_quality: u8,
}

impl FileSystemGateway {
    /// Create a store rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    /// - Failed to create the sandbox directory
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| CaptureError::file_io_error("create sandbox directory", &root, &e))?;

        let defaults = PipelineConfig::default();
        Ok(Self {
            root,
            photo_format: defaults.photo_output_format,
            jpeg_quality: defaults.jpeg_quality,
        })
    }

    /// Create a store in the user's pictures directory (data directory as fallback)
    ///
    /// # Errors
    /// - No suitable user directory
    /// - Failed to create the sandbox directory
    pub fn in_default_location() -> Result<Self> {
        let base = dirs::picture_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| CaptureError::internal("no pictures or data directory available"))?;
        Self::new(base.join(APP_DIR))
    }

    /// Use the output format and quality from a pipeline configuration
    #[must_use]
    pub fn with_config(mut self, config: &PipelineConfig) -> Self {
        self.photo_format = config.photo_output_format;
        self.jpeg_quality = config.jpeg_quality;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file name inside the sandbox, rejecting anything that could
    /// escape it
    ///
    /// # Errors
    /// - Empty names, separators or parent references
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let escapes = file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name == "."
            || file_name.contains("..");
        if escapes {
            return Err(CaptureError::persistence(format!(
                "file name '{}' is not inside the sandbox",
                file_name
            )));
        }
        Ok(self.root.join(file_name))
    }

    fn extension_for(&self, feature: Option<FeatureType>) -> &'static str {
        match feature {
            None => self.photo_format.extension(),
            Some(_) => OutputFormat::Png.extension(),
        }
    }

    fn encode(image: &RgbaImage, path: &Path, format: OutputFormat, quality: u8) -> Result<()> {
        let result = match format {
            OutputFormat::Jpeg => {
                let file = fs::File::create(path)
                    .map_err(|e| CaptureError::file_io_error("create image file", path, &e))?;
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(BufWriter::new(file), quality).encode_image(&rgb)
            },
            OutputFormat::Png => image.save_with_format(path, ImageFormat::Png),
            OutputFormat::Tiff => image.save_with_format(path, ImageFormat::Tiff),
        };
        result.map_err(|e| {
            CaptureError::persistence(format!("failed to encode '{}': {}", path.display(), e))
        })
    }

    fn write_sidecar(record: &ImageRecord, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        fs::write(path, json)
            .map_err(|e| CaptureError::file_io_error("write image sidecar", path, &e))
    }

    /// Encode the image, then its sidecar. Runs on the blocking pool.
    fn write_artifact(
        image: &RgbaImage,
        record: &ImageRecord,
        image_path: &Path,
        sidecar_path: &Path,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        Self::encode(image, image_path, format, quality)?;
        if let Err(e) = Self::write_sidecar(record, sidecar_path) {
            // An image without its sidecar is invisible to the gallery
            let _ = fs::remove_file(image_path);
            return Err(e);
        }
        Ok(())
    }

    /// All sidecar records in the sandbox, oldest capture first
    ///
    /// Unreadable sidecars are skipped with a warning.
    ///
    /// # Errors
    /// - The sandbox directory cannot be listed
    pub fn records(&self) -> Result<Vec<ImageRecord>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| CaptureError::file_io_error("list sandbox", &self.root, &e))?;

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SIDECAR_EXTENSION) {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(CaptureError::from)
                .and_then(|content| Ok(serde_json::from_str::<ImageRecord>(&content)?));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable sidecar"),
            }
        }

        records.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.feature().cmp(&b.feature()))
        });
        Ok(records)
    }

    /// Records saved for one capture, grouped by the shared timestamp
    ///
    /// # Errors
    /// - The sandbox directory cannot be listed
    pub fn records_for_capture(&self, timestamp: CaptureTimestamp) -> Result<Vec<ImageRecord>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| record.captured_at == timestamp)
            .collect())
    }

    /// Load the pixels of a saved image
    ///
    /// # Errors
    /// - Unknown id or undecodable file
    pub fn load(&self, record: &ImageRecord) -> Result<RgbaImage> {
        let path = self.resolve(&record.file_name)?;
        Ok(image::open(&path)?.to_rgba8())
    }

    /// Remove an image and its sidecar
    ///
    /// # Errors
    /// - File removal failures other than "not found"
    pub fn delete(&self, record: &ImageRecord) -> Result<()> {
        let sidecar = format!("{}.{}", record.id, SIDECAR_EXTENSION);
        for name in [record.file_name.as_str(), sidecar.as_str()] {
            let path = self.resolve(name)?;
            match fs::remove_file(&path) {
                Ok(()) => {},
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
                Err(e) => return Err(CaptureError::file_io_error("delete image", &path, &e)),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for FileSystemGateway {
    async fn save(
        &self,
        image: &RgbaImage,
        feature: Option<FeatureType>,
        timestamp: CaptureTimestamp,
    ) -> Result<SavedImage> {
        let id = Uuid::new_v4();
        let file_name = format!("{}.{}", id, self.extension_for(feature));
        let path = self.resolve(&file_name)?;
        let sidecar = self.resolve(&format!("{}.{}", id, SIDECAR_EXTENSION))?;
        let format = if feature.is_some() {
            OutputFormat::Png
        } else {
            self.photo_format
        };
        let quality = self.jpeg_quality;

        let record = ImageRecord::new(id, feature, timestamp, file_name, image.dimensions());
        let pixels = image.clone();
        let target = path.clone();
        let record = tokio::task::spawn_blocking(move || {
            Self::write_artifact(&pixels, &record, &target, &sidecar, format, quality)
                .map(|()| record)
        })
        .await
        .map_err(|e| CaptureError::internal(format!("encoder task failed: {}", e)))??;

        debug!(%id, label = %record.label, path = %path.display(), "Saved capture artifact");
        Ok(SavedImage { id, label: feature })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn image() -> RgbaImage {
        RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]))
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap();

        assert!(gateway.resolve("ok.png").is_ok());
        for bad in ["", ".", "..", "../x.png", "a/b.png", "a\\b.png"] {
            assert!(gateway.resolve(bad).is_err(), "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_save_writes_image_and_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap();
        let timestamp = CaptureTimestamp::now();

        let saved = gateway.save(&image(), Some(FeatureType::Hair), timestamp).await.unwrap();
        assert_eq!(saved.label, Some(FeatureType::Hair));

        let records = gateway.records().unwrap();
        assert_eq!(records.len(), 1);
        let record = records.first().unwrap();
        assert_eq!(record.id, saved.id);
        assert_eq!(record.label, "hair");
        assert!(record.file_name.ends_with(".png"));
        assert_eq!(gateway.load(record).unwrap(), image());
    }

    #[tokio::test]
    async fn test_original_uses_photo_format() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::builder()
            .photo_output_format(OutputFormat::Tiff)
            .build()
            .unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap().with_config(&config);

        gateway.save(&image(), None, CaptureTimestamp::now()).await.unwrap();
        let records = gateway.records().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].file_name.ends_with(".tiff"));
        assert!(records[0].is_original());
    }

    #[tokio::test]
    async fn test_delete_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap();
        gateway.save(&image(), None, CaptureTimestamp::now()).await.unwrap();

        let record = gateway.records().unwrap().remove(0);
        gateway.delete(&record).unwrap();
        assert!(gateway.records().unwrap().is_empty());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        // Deleting twice is harmless
        gateway.delete(&record).unwrap();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_saves_on_one_thread() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap();
        let timestamp = CaptureTimestamp::now();

        let saves = FeatureType::ALL
            .into_iter()
            .map(Some)
            .chain(std::iter::once(None))
            .map(|feature| {
                let pixels = image();
                let gateway = gateway.clone();
                async move { gateway.save(&pixels, feature, timestamp).await }
            });
        let results = futures::future::join_all(saves).await;
        assert!(results.iter().all(|result| result.is_ok()));

        let records = gateway.records_for_capture(timestamp).unwrap();
        assert_eq!(records.len(), FeatureType::ALL.len() + 1);
        for record in &records {
            assert_eq!(gateway.load(record).unwrap().dimensions(), (4, 3));
        }
    }

    #[test]
    fn test_sidecar_failure_removes_image() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("a.png");
        // A directory where the sidecar should go makes the write fail
        let sidecar_path = dir.path().join("a.json");
        fs::create_dir(&sidecar_path).unwrap();
        let record = ImageRecord::new(
            Uuid::new_v4(),
            None,
            CaptureTimestamp::now(),
            "a.png".to_string(),
            (4, 3),
        );

        let result = FileSystemGateway::write_artifact(
            &image(),
            &record,
            &image_path,
            &sidecar_path,
            OutputFormat::Png,
            90,
        );
        assert!(result.is_err());
        assert!(!image_path.exists());
    }

    #[test]
    fn test_unreadable_sidecar_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = FileSystemGateway::new(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(gateway.records().unwrap().is_empty());
    }
}
