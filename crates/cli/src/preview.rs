use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbImage;

use smile_capture_core::shared::frame::Frame;

/// Keeps a single image file on disk showing the latest annotated frame,
/// for watching a headless session with any image viewer.
pub struct PreviewWriter {
    path: PathBuf,
    size: (u32, u32),
    every: usize,
    seen: usize,
}

impl PreviewWriter {
    pub fn new(path: PathBuf, size: (u32, u32), every: usize) -> Self {
        Self {
            path,
            size,
            every: every.max(1),
            seen: 0,
        }
    }

    /// Writes every `every`-th frame; the first frame is always written.
    pub fn offer(&mut self, frame: &Frame) {
        let due = self.seen % self.every == 0;
        self.seen += 1;
        if !due {
            return;
        }
        if let Err(e) = self.write(frame) {
            log::warn!("Could not update preview {}: {e}", self.path.display());
        }
    }

    fn write(&self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
        let img = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("frame is not a packed RGB image")?;
        let (w, h) = self.size;
        let resized = image::imageops::resize(&img, w, h, FilterType::Lanczos3);

        // Write beside the target and rename so viewers never see a torn file.
        let tmp = temp_path(&self.path);
        resized.save_with_format(&tmp, image_format(&self.path))?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn image_format(path: &Path) -> image::ImageFormat {
    image::ImageFormat::from_path(path).unwrap_or(image::ImageFormat::Jpeg)
}
