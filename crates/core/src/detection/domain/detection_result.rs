use crate::shared::region::Region;

/// A face and the smile sub-regions found inside it.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub region: Region,
    /// Smile rectangles in frame coordinates, each inside `region`.
    pub smiles: Vec<Region>,
}

impl FaceDetection {
    pub fn new(region: Region, smiles: Vec<Region>) -> Self {
        debug_assert!(
            smiles.iter().all(|s| region.contains(s)),
            "smile regions must lie inside their face"
        );
        Self { region, smiles }
    }

    pub fn is_smiling(&self) -> bool {
        !self.smiles.is_empty()
    }
}

/// Everything detected in one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    pub faces: Vec<FaceDetection>,
}

impl DetectionResult {
    pub fn new(faces: Vec<FaceDetection>) -> Self {
        Self { faces }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// True if any face in the frame is smiling.
    pub fn aggregate_smile(&self) -> bool {
        self.faces.iter().any(FaceDetection::is_smiling)
    }

    pub fn face_regions(&self) -> impl Iterator<Item = &Region> {
        self.faces.iter().map(|f| &f.region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(smiling: bool) -> FaceDetection {
        let region = Region::new(0, 0, 100, 100);
        let smiles = if smiling {
            vec![Region::new(30, 60, 40, 20)]
        } else {
            Vec::new()
        };
        FaceDetection::new(region, smiles)
    }

    #[test]
    fn test_empty_has_no_smile() {
        assert!(!DetectionResult::empty().aggregate_smile());
        assert!(DetectionResult::empty().is_empty());
    }

    #[test]
    fn test_aggregate_smile_is_or_over_faces() {
        assert!(!DetectionResult::new(vec![face(false), face(false)]).aggregate_smile());
        assert!(DetectionResult::new(vec![face(false), face(true)]).aggregate_smile());
    }

    #[test]
    fn test_face_regions() {
        let result = DetectionResult::new(vec![face(false), face(true)]);
        assert_eq!(result.face_regions().count(), 2);
    }

    #[test]
    #[should_panic(expected = "smile regions must lie inside their face")]
    fn test_smile_outside_face_panics_in_debug() {
        FaceDetection::new(Region::new(0, 0, 10, 10), vec![Region::new(50, 50, 5, 5)]);
    }
}
