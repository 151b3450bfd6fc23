use std::path::Path;
use std::sync::Arc;

use ndarray::s;

use super::haar_cascade::{CascadeError, HaarCascade};
use super::multi_scale::detect_multi_scale;
use crate::detection::domain::detection_params::DetectionParams;
use crate::detection::domain::detection_result::{DetectionResult, FaceDetection};
use crate::detection::domain::smile_detector::{DetectionError, SmileDetector};
use crate::shared::frame::Frame;

/// Two-stage Haar detector: faces over the whole frame, then smiles inside
/// each face.
///
/// Cascades are shared read-only, so cloning the detector is cheap.
#[derive(Clone)]
pub struct CascadeSmileDetector {
    face_cascade: Arc<HaarCascade>,
    smile_cascade: Arc<HaarCascade>,
    params: DetectionParams,
}

impl CascadeSmileDetector {
    pub fn new(
        face_cascade: Arc<HaarCascade>,
        smile_cascade: Arc<HaarCascade>,
        params: DetectionParams,
    ) -> Self {
        Self {
            face_cascade,
            smile_cascade,
            params,
        }
    }

    pub fn from_files(
        face_path: &Path,
        smile_path: &Path,
        params: DetectionParams,
    ) -> Result<Self, CascadeError> {
        let face = HaarCascade::from_file(face_path)?;
        let smile = HaarCascade::from_file(smile_path)?;
        log::info!(
            "Loaded cascades: face {} stages, smile {} stages",
            face.stage_count(),
            smile.stage_count()
        );
        Ok(Self::new(Arc::new(face), Arc::new(smile), params))
    }
}

impl SmileDetector for CascadeSmileDetector {
    fn detect(&self, frame: &Frame) -> Result<DetectionResult, DetectionError> {
        if !frame.is_well_formed() {
            return Err(DetectionError::MalformedFrame(format!(
                "{}x{}x{} with {} bytes",
                frame.width(),
                frame.height(),
                frame.channels(),
                frame.data().len()
            )));
        }
        if self.face_cascade.is_empty() || self.smile_cascade.is_empty() {
            return Err(DetectionError::BackendUnavailable(
                "cascade has no stages".to_string(),
            ));
        }

        let luma = frame.to_luma();
        let faces = detect_multi_scale(&self.face_cascade, luma.view(), &self.params.face);

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            let roi = face.clamp_to(frame.width(), frame.height());
            if roi.is_empty() {
                continue;
            }
            let (x0, y0) = (roi.x as usize, roi.y as usize);
            let (x1, y1) = (roi.right() as usize, roi.bottom() as usize);
            let face_luma = luma.slice(s![y0..y1, x0..x1]);

            let smiles = detect_multi_scale(&self.smile_cascade, face_luma, &self.params.smile)
                .into_iter()
                .map(|r| r.offset(roi.x, roi.y))
                .filter(|r| roi.contains(r))
                .collect();
            detections.push(FaceDetection::new(roi, smiles));
        }

        Ok(DetectionResult::new(detections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_params::CascadeParams;
    use crate::detection::infrastructure::haar_cascade::fixtures::edge_cascade;
    use crate::detection::infrastructure::haar_cascade::{
        HaarFeature, Stage, TreeNode, WeakClassifier, WeightedRect,
    };
    use crate::shared::region::Region;

    fn loose_params() -> DetectionParams {
        let p = CascadeParams {
            scale_factor: 1.1,
            min_neighbors: 0,
            min_size: (1, 1),
        };
        DetectionParams { face: p, smile: p }
    }

    fn edge_detector() -> CascadeSmileDetector {
        let cascade = Arc::new(edge_cascade());
        CascadeSmileDetector::new(cascade.clone(), cascade, loose_params())
    }

    fn top_bright_frame(width: u32, height: u32, edge_row: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            let v = if y < edge_row { 255 } else { 0 };
            for _ in 0..width {
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_smiles_lie_inside_their_face() {
        let result = edge_detector().detect(&top_bright_frame(40, 40, 20)).unwrap();
        assert!(!result.is_empty());
        for face in &result.faces {
            for smile in &face.smiles {
                assert!(face.region.contains(smile), "{smile:?} outside {:?}", face.region);
            }
        }
        assert!(result.aggregate_smile());
    }

    #[test]
    fn test_flat_frame_has_no_faces() {
        let frame = Frame::new(vec![120u8; 40 * 40 * 3], 40, 40, 3, 0);
        let result = edge_detector().detect(&frame).unwrap();
        assert!(result.is_empty());
        assert!(!result.aggregate_smile());
    }

    #[test]
    fn test_face_min_neighbors_filters_sparse_hits() {
        let cascade = Arc::new(edge_cascade());
        let mut params = loose_params();
        params.face.min_neighbors = 10_000;
        let detector = CascadeSmileDetector::new(cascade.clone(), cascade, params);
        let result = detector.detect(&top_bright_frame(40, 40, 20)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_strict_smile_confidence_keeps_faces_but_no_smiles() {
        let cascade = Arc::new(edge_cascade());
        let mut params = loose_params();
        params.smile.min_neighbors = 10_000;
        let detector = CascadeSmileDetector::new(cascade.clone(), cascade, params);
        let result = detector.detect(&top_bright_frame(40, 40, 20)).unwrap();
        assert!(!result.is_empty());
        assert!(!result.aggregate_smile());
    }

    #[test]
    fn test_malformed_frame_is_degraded() {
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(matches!(
            edge_detector().detect(&frame),
            Err(DetectionError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_empty_cascade_is_backend_unavailable() {
        let empty = HaarCascade::new(
            6,
            6,
            Vec::new(),
            vec![HaarFeature {
                rects: vec![WeightedRect {
                    rect: Region::new(0, 0, 6, 6),
                    weight: 1.0,
                }],
            }],
        )
        .unwrap();
        let detector =
            CascadeSmileDetector::new(Arc::new(empty), Arc::new(edge_cascade()), loose_params());
        let frame = top_bright_frame(40, 40, 20);
        assert!(matches!(
            detector.detect(&frame),
            Err(DetectionError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn test_handwritten_cascade_matches_fixture() {
        let built = HaarCascade::new(
            6,
            6,
            vec![Stage {
                threshold: 0.5,
                classifiers: vec![WeakClassifier {
                    nodes: vec![TreeNode {
                        left: 0,
                        right: -1,
                        feature: 0,
                        threshold: 1.0,
                    }],
                    leaves: vec![-1.0, 1.0],
                }],
            }],
            vec![HaarFeature {
                rects: vec![
                    WeightedRect {
                        rect: Region::new(0, 0, 6, 6),
                        weight: -1.0,
                    },
                    WeightedRect {
                        rect: Region::new(0, 0, 6, 3),
                        weight: 2.0,
                    },
                ],
            }],
        )
        .unwrap();
        assert_eq!(built, edge_cascade());
    }
}
