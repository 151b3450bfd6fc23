use ndarray::{s, Axis};

use crate::detection::domain::detection_result::DetectionResult;
use crate::shared::constants::{FACE_MARKER_COLOR, MARKER_THICKNESS, SMILE_MARKER_COLOR};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Outlines every face, and the smiles of smiling faces, on a display copy.
pub fn annotate(frame: &mut Frame, detection: &DetectionResult) {
    for face in &detection.faces {
        draw_rect(frame, &face.region, FACE_MARKER_COLOR, MARKER_THICKNESS);
        for smile in &face.smiles {
            draw_rect(frame, smile, SMILE_MARKER_COLOR, MARKER_THICKNESS);
        }
    }
}

/// Draws a rectangle outline `thickness` pixels wide, inset from `region`'s
/// edges and clipped to the frame.
pub fn draw_rect(frame: &mut Frame, region: &Region, color: [u8; 3], thickness: i32) {
    if !frame.is_well_formed() || frame.channels() < 3 {
        return;
    }
    let r = region.clamp_to(frame.width(), frame.height());
    if r.is_empty() || thickness <= 0 {
        return;
    }
    let t = thickness.min(r.width).min(r.height);
    let bands = [
        (r.x, r.y, r.right(), r.y + t),
        (r.x, r.bottom() - t, r.right(), r.bottom()),
        (r.x, r.y, r.x + t, r.bottom()),
        (r.right() - t, r.y, r.right(), r.bottom()),
    ];

    let mut pixels = frame.as_ndarray_mut();
    for (x0, y0, x1, y1) in bands {
        let mut band = pixels.slice_mut(s![y0 as usize..y1 as usize, x0 as usize..x1 as usize, ..3]);
        for (c, &value) in color.iter().enumerate() {
            band.index_axis_mut(Axis(2), c).fill(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection_result::FaceDetection;

    fn pixel(frame: &Frame, x: usize, y: usize) -> [u8; 3] {
        let o = (y * frame.width() as usize + x) * 3;
        [frame.data()[o], frame.data()[o + 1], frame.data()[o + 2]]
    }

    fn blank(width: u32, height: u32) -> Frame {
        Frame::new(vec![0u8; (width * height * 3) as usize], width, height, 3, 0)
    }

    #[test]
    fn test_outline_leaves_interior_untouched() {
        let mut frame = blank(20, 20);
        draw_rect(&mut frame, &Region::new(5, 5, 10, 10), [1, 2, 3], 2);
        assert_eq!(pixel(&frame, 5, 5), [1, 2, 3]);
        assert_eq!(pixel(&frame, 6, 10), [1, 2, 3]);
        assert_eq!(pixel(&frame, 14, 14), [1, 2, 3]);
        assert_eq!(pixel(&frame, 10, 10), [0, 0, 0]);
        assert_eq!(pixel(&frame, 7, 7), [0, 0, 0]);
        assert_eq!(pixel(&frame, 4, 4), [0, 0, 0]);
        assert_eq!(pixel(&frame, 15, 15), [0, 0, 0]);
    }

    #[test]
    fn test_region_past_edge_is_clipped() {
        let mut frame = blank(10, 10);
        draw_rect(&mut frame, &Region::new(-5, -5, 30, 30), [9, 9, 9], 2);
        assert_eq!(pixel(&frame, 0, 0), [9, 9, 9]);
        assert_eq!(pixel(&frame, 9, 9), [9, 9, 9]);
        assert_eq!(pixel(&frame, 5, 5), [0, 0, 0]);
    }

    #[test]
    fn test_empty_region_draws_nothing() {
        let mut frame = blank(10, 10);
        draw_rect(&mut frame, &Region::new(20, 20, 5, 5), [9, 9, 9], 2);
        assert!(frame.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_annotate_uses_face_and_smile_colors() {
        let mut frame = blank(40, 40);
        let detection = DetectionResult::new(vec![FaceDetection::new(
            Region::new(0, 0, 40, 40),
            vec![Region::new(10, 20, 20, 10)],
        )]);
        annotate(&mut frame, &detection);
        assert_eq!(pixel(&frame, 0, 0), FACE_MARKER_COLOR);
        assert_eq!(pixel(&frame, 10, 20), SMILE_MARKER_COLOR);
        assert_eq!(pixel(&frame, 20, 5), [0, 0, 0]);
    }
}
