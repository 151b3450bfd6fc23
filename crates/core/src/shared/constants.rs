pub const FACE_CASCADE_NAME: &str = "haarcascade_frontalface_default.xml";
pub const FACE_CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

pub const SMILE_CASCADE_NAME: &str = "haarcascade_smile.xml";
pub const SMILE_CASCADE_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_smile.xml";

/// Minimum smile votes; higher is stricter.
pub const DEFAULT_SMILE_CONFIDENCE: u32 = 55;
pub const DEFAULT_FACE_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_SMILE_SCALE_FACTOR: f64 = 1.7;
pub const DEFAULT_FACE_MIN_NEIGHBORS: u32 = 5;
pub const DEFAULT_MIN_FACE_SIZE: (u32, u32) = (100, 100);
pub const DEFAULT_MIN_SMILE_SIZE: (u32, u32) = (25, 25);

/// Similarity tolerance used when grouping overlapping detections.
pub const GROUP_EPS: f64 = 0.2;

pub const DEFAULT_OUTPUT_DIR: &str = "captured_photos";
pub const CAPTURE_PREFIX: &str = "smile";

pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Size the CLI preview is rendered at.
pub const PREVIEW_SIZE: (u32, u32) = (720, 540);

/// Face outline colour (RGB).
pub const FACE_MARKER_COLOR: [u8; 3] = [0, 215, 255];
/// Smile outline colour (RGB).
pub const SMILE_MARKER_COLOR: [u8; 3] = [255, 0, 255];
pub const MARKER_THICKNESS: i32 = 2;
