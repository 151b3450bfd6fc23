use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::capture::domain::capture_sink::CaptureFormat;
use crate::detection::domain::detection_params::{CascadeParams, DetectionParams};
use crate::shared::constants::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_FACE_MIN_NEIGHBORS,
    DEFAULT_FACE_SCALE_FACTOR, DEFAULT_FRAME_RATE, DEFAULT_MIN_FACE_SIZE, DEFAULT_MIN_SMILE_SIZE,
    DEFAULT_OUTPUT_DIR, DEFAULT_SMILE_CONFIDENCE, DEFAULT_SMILE_SCALE_FACTOR,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// User-tunable configuration for a capture session.
///
/// Every field has a default, so partial JSON files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub smile_confidence: u32,
    pub min_face_size: (u32, u32),
    pub min_smile_size: (u32, u32),
    pub face_scale_factor: f64,
    pub smile_scale_factor: f64,
    pub face_min_neighbors: u32,
    pub output_directory: PathBuf,
    pub capture_format: CaptureFormat,
    pub device: String,
    pub input_format: Option<String>,
    pub capture_width: u32,
    pub capture_height: u32,
    pub frame_rate: u32,
    pub cascade_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            smile_confidence: DEFAULT_SMILE_CONFIDENCE,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            min_smile_size: DEFAULT_MIN_SMILE_SIZE,
            face_scale_factor: DEFAULT_FACE_SCALE_FACTOR,
            smile_scale_factor: DEFAULT_SMILE_SCALE_FACTOR,
            face_min_neighbors: DEFAULT_FACE_MIN_NEIGHBORS,
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIR),
            capture_format: CaptureFormat::default(),
            device: default_device().to_string(),
            input_format: default_input_format().map(str::to_string),
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            cascade_dir: None,
        }
    }
}

impl Settings {
    /// Platform settings file, e.g. `~/.config/Smile Capture/settings.json`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Smile Capture").join("settings.json"))
    }

    /// Loads settings from `path`, validating the result.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path).map_err(|e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings: Settings = serde_json::from_str(&json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads the platform settings file, falling back to defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                log::warn!("Ignoring settings at {}: {e}", path.display());
                Self::default()
            }),
            _ => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |e| SettingsError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.face_scale_factor <= 1.0 {
            return Err(SettingsError::Invalid(format!(
                "face_scale_factor must be greater than 1.0, got {}",
                self.face_scale_factor
            )));
        }
        if self.smile_scale_factor <= 1.0 {
            return Err(SettingsError::Invalid(format!(
                "smile_scale_factor must be greater than 1.0, got {}",
                self.smile_scale_factor
            )));
        }
        let sizes = [
            ("min_face_size", self.min_face_size),
            ("min_smile_size", self.min_smile_size),
        ];
        for (name, (w, h)) in sizes {
            if w == 0 || h == 0 {
                return Err(SettingsError::Invalid(format!(
                    "{name} must be non-zero, got {w}x{h}"
                )));
            }
        }
        if self.capture_width == 0 || self.capture_height == 0 {
            return Err(SettingsError::Invalid(
                "capture size must be non-zero".to_string(),
            ));
        }
        if self.frame_rate == 0 {
            return Err(SettingsError::Invalid(
                "frame_rate must be non-zero".to_string(),
            ));
        }
        if self.device.trim().is_empty() {
            return Err(SettingsError::Invalid("device must be set".to_string()));
        }
        Ok(())
    }

    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            face: CascadeParams {
                scale_factor: self.face_scale_factor,
                min_neighbors: self.face_min_neighbors,
                min_size: self.min_face_size,
            },
            smile: CascadeParams {
                scale_factor: self.smile_scale_factor,
                min_neighbors: self.smile_confidence,
                min_size: self.min_smile_size,
            },
        }
    }
}

fn default_device() -> &'static str {
    if cfg!(target_os = "linux") {
        "/dev/video0"
    } else if cfg!(target_os = "macos") {
        "0"
    } else if cfg!(target_os = "windows") {
        "video=Integrated Camera"
    } else {
        "0"
    }
}

fn default_input_format() -> Option<&'static str> {
    if cfg!(target_os = "linux") {
        Some("v4l2")
    } else if cfg!(target_os = "macos") {
        Some("avfoundation")
    } else if cfg!(target_os = "windows") {
        Some("dshow")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.smile_confidence, 55);
        assert_eq!(s.min_face_size, (100, 100));
        assert_eq!(s.min_smile_size, (25, 25));
        assert_relative_eq!(s.face_scale_factor, 1.1);
        assert_relative_eq!(s.smile_scale_factor, 1.7);
        assert_eq!(s.face_min_neighbors, 5);
        assert_eq!(s.output_directory, PathBuf::from("captured_photos"));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: Settings = serde_json::from_str(r#"{"smile_confidence": 70}"#).unwrap();
        assert_eq!(s.smile_confidence, 70);
        assert_eq!(s.face_min_neighbors, 5);
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            smile_confidence: 40,
            output_directory: PathBuf::from("/tmp/smiles"),
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Settings::load_from(Path::new("/nonexistent/settings.json")).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn test_load_invalid_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Settings::load_from(&path).unwrap_err(),
            SettingsError::Parse(_)
        ));
    }

    #[rstest]
    #[case::face_scale(Settings { face_scale_factor: 1.0, ..Settings::default() })]
    #[case::smile_scale(Settings { smile_scale_factor: 0.5, ..Settings::default() })]
    #[case::face_size(Settings { min_face_size: (0, 100), ..Settings::default() })]
    #[case::smile_size(Settings { min_smile_size: (25, 0), ..Settings::default() })]
    #[case::frame_rate(Settings { frame_rate: 0, ..Settings::default() })]
    #[case::device(Settings { device: "  ".to_string(), ..Settings::default() })]
    fn test_validate_rejects(#[case] settings: Settings) {
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn test_detection_params_mapping() {
        let params = Settings::default().detection_params();
        assert_eq!(params.face.min_neighbors, 5);
        assert_eq!(params.smile.min_neighbors, 55);
        assert_eq!(params.face.min_size, (100, 100));
        assert_eq!(params.smile.min_size, (25, 25));
        assert_relative_eq!(params.smile.scale_factor, 1.7);
    }
}
