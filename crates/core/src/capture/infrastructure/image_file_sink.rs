use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::capture::domain::capture_naming::{capture_stem, unique_capture_path};
use crate::capture::domain::capture_sink::{
    CaptureEvent, CaptureFormat, CaptureId, CaptureSink, SinkError,
};

const JPEG_QUALITY: u8 = 95;

/// Writes each capture as an image file in a fixed directory using the
/// `image` crate.
pub struct ImageFileSink {
    dir: PathBuf,
    format: CaptureFormat,
}

impl ImageFileSink {
    pub fn new(dir: impl Into<PathBuf>, format: CaptureFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    fn encode(&self, img: &RgbImage) -> Result<Vec<u8>, SinkError> {
        let mut buf = Vec::new();
        match self.format {
            CaptureFormat::Jpg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
                encoder.encode_image(img).map_err(SinkError::Encode)?;
            }
            CaptureFormat::Png => {
                img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                    .map_err(SinkError::Encode)?;
            }
        }
        Ok(buf)
    }
}

impl CaptureSink for ImageFileSink {
    fn save(&self, event: &CaptureEvent) -> Result<CaptureId, SinkError> {
        let frame = &event.snapshot;
        if frame.channels() != 3 || !frame.is_well_formed() {
            return Err(SinkError::InvalidSnapshot(format!(
                "{}x{}x{} with {} bytes",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.data().len()
            )));
        }

        let img = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or_else(|| SinkError::InvalidSnapshot("buffer size mismatch".to_string()))?;
        let bytes = self.encode(&img)?;

        let stem = capture_stem(&event.timestamp);
        let ext = self.format.extension();

        // create_new so two captures in the same second never overwrite each other.
        loop {
            let (name, path) = unique_capture_path(&self.dir, &stem, ext);
            let file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path);
            let mut file = match file {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(SinkError::Write { path, source }),
            };
            write_capture(&path, &mut file, &bytes)?;
            log::debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
            return Ok(CaptureId { name, path });
        }
    }
}

/// Writes `bytes` to a freshly created capture file, removing the file if
/// the write does not complete.
fn write_capture(path: &Path, file: &mut impl Write, bytes: &[u8]) -> Result<(), SinkError> {
    file.write_all(bytes)
        .and_then(|_| file.flush())
        .map_err(|source| {
            let _ = fs::remove_file(path);
            SinkError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
}
