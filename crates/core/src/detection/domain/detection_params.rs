use crate::shared::constants::{
    DEFAULT_FACE_MIN_NEIGHBORS, DEFAULT_FACE_SCALE_FACTOR, DEFAULT_MIN_FACE_SIZE,
    DEFAULT_MIN_SMILE_SIZE, DEFAULT_SMILE_CONFIDENCE, DEFAULT_SMILE_SCALE_FACTOR,
};

/// Tuning for one multi-scale cascade search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    /// Window growth per pyramid step; must be > 1.0.
    pub scale_factor: f64,
    /// A detection survives grouping only with more than this many votes.
    pub min_neighbors: u32,
    /// Smallest window, `(width, height)`, that is evaluated.
    pub min_size: (u32, u32),
}

/// Parameters for the two-stage face → smile search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParams {
    pub face: CascadeParams,
    pub smile: CascadeParams,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            face: CascadeParams {
                scale_factor: DEFAULT_FACE_SCALE_FACTOR,
                min_neighbors: DEFAULT_FACE_MIN_NEIGHBORS,
                min_size: DEFAULT_MIN_FACE_SIZE,
            },
            smile: CascadeParams {
                scale_factor: DEFAULT_SMILE_SCALE_FACTOR,
                min_neighbors: DEFAULT_SMILE_CONFIDENCE,
                min_size: DEFAULT_MIN_SMILE_SIZE,
            },
        }
    }
}
