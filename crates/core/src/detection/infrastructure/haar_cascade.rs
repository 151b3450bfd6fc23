use std::path::Path;

use thiserror::Error;

use super::cascade_xml::{parse_document, XmlElement};
use super::integral_image::IntegralImage;
use crate::shared::region::Region;

#[derive(Error, Debug)]
pub enum CascadeError {
    #[error("failed to read cascade {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed cascade XML: {0}")]
    Xml(String),
    #[error("missing <{element}> inside <{parent}>")]
    MissingElement { element: String, parent: String },
    #[error("invalid cascade: {0}")]
    Invalid(String),
    #[error("unsupported cascade: {0}")]
    Unsupported(String),
}

/// A feature rectangle in window coordinates with its weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedRect {
    pub rect: Region,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

/// A split node. Child indices follow OpenCV: `> 0` is another node,
/// `<= 0` is the negated index of a leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub threshold: f64,
    pub classifiers: Vec<WeakClassifier>,
}

/// A boosted Haar cascade, loaded once and shared read-only.
#[derive(Clone, Debug, PartialEq)]
pub struct HaarCascade {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
    features: Vec<HaarFeature>,
}

/// Outcome of running the cascade on one window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { stage: usize },
}

impl HaarCascade {
    pub fn new(
        window_width: u32,
        window_height: u32,
        stages: Vec<Stage>,
        features: Vec<HaarFeature>,
    ) -> Result<Self, CascadeError> {
        let cascade = Self {
            window_width,
            window_height,
            stages,
            features,
        };
        cascade.validate()?;
        Ok(cascade)
    }

    pub fn from_file(path: &Path) -> Result<Self, CascadeError> {
        let xml = std::fs::read_to_string(path).map_err(|e| CascadeError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_xml(&xml)
    }

    /// Parses an OpenCV "new format" Haar cascade (`<cascade>` root).
    pub fn from_xml(xml: &str) -> Result<Self, CascadeError> {
        let doc = parse_document(xml)?;
        let storage = doc.require("opencv_storage")?;
        let Some(cascade) = storage.child("cascade") else {
            return Err(CascadeError::Unsupported(
                "legacy cascade layout without a <cascade> node".to_string(),
            ));
        };

        if let Some(stage_type) = cascade.child("stageType") {
            if stage_type.trimmed_text() != "BOOST" {
                return Err(CascadeError::Unsupported(format!(
                    "stage type {}",
                    stage_type.trimmed_text()
                )));
            }
        }
        if let Some(feature_type) = cascade.child("featureType") {
            if feature_type.trimmed_text() != "HAAR" {
                return Err(CascadeError::Unsupported(format!(
                    "feature type {}",
                    feature_type.trimmed_text()
                )));
            }
        }

        let window_width = cascade.require("width")?.parse_number::<u32>()?;
        let window_height = cascade.require("height")?.parse_number::<u32>()?;

        let stages = cascade
            .require("stages")?
            .items()
            .map(parse_stage)
            .collect::<Result<Vec<_>, _>>()?;
        let features = cascade
            .require("features")?
            .items()
            .map(parse_feature)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(window_width, window_height, stages, features)
    }

    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Pre-scales every feature for windows `factor` times the native size.
    pub fn scaled(&self, factor: f64) -> ScaledCascade<'_> {
        let win_w = (self.window_width as f64 * factor).round() as i32;
        let win_h = (self.window_height as f64 * factor).round() as i32;

        // Variance is normalised over the window minus a one-pixel border.
        let norm_rect = Region::new(
            factor.round() as i32,
            factor.round() as i32,
            ((self.window_width as f64 - 2.0) * factor).round() as i32,
            ((self.window_height as f64 - 2.0) * factor).round() as i32,
        )
        .clamp_to(win_w.max(0) as u32, win_h.max(0) as u32);
        let inv_area = if norm_rect.area() > 0 {
            1.0 / norm_rect.area() as f64
        } else {
            1.0
        };

        let features = self
            .features
            .iter()
            .map(|f| scale_feature(f, factor, inv_area, win_w, win_h))
            .collect();

        ScaledCascade {
            cascade: self,
            window: (win_w, win_h),
            norm_rect,
            inv_area,
            features,
        }
    }

    fn validate(&self) -> Result<(), CascadeError> {
        if self.window_width < 3 || self.window_height < 3 {
            return Err(CascadeError::Invalid(format!(
                "window {}x{} is too small",
                self.window_width, self.window_height
            )));
        }
        for feature in &self.features {
            if feature.rects.is_empty() {
                return Err(CascadeError::Invalid("feature without rects".to_string()));
            }
            for r in &feature.rects {
                let inside = r.rect.x >= 0
                    && r.rect.y >= 0
                    && r.rect.right() <= self.window_width as i32
                    && r.rect.bottom() <= self.window_height as i32;
                if !inside || r.rect.is_empty() {
                    return Err(CascadeError::Invalid(format!(
                        "feature rect {:?} outside {}x{} window",
                        r.rect, self.window_width, self.window_height
                    )));
                }
            }
        }
        for (si, stage) in self.stages.iter().enumerate() {
            for wc in &stage.classifiers {
                if wc.nodes.is_empty() {
                    return Err(CascadeError::Invalid(format!(
                        "stage {si} has a classifier without nodes"
                    )));
                }
                for node in &wc.nodes {
                    if node.feature >= self.features.len() {
                        return Err(CascadeError::Invalid(format!(
                            "stage {si} references feature {} of {}",
                            node.feature,
                            self.features.len()
                        )));
                    }
                    for child in [node.left, node.right] {
                        let ok = if child > 0 {
                            (child as usize) < wc.nodes.len()
                        } else {
                            ((-child) as usize) < wc.leaves.len()
                        };
                        if !ok {
                            return Err(CascadeError::Invalid(format!(
                                "stage {si} has dangling tree index {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// A cascade bound to one window scale.
pub struct ScaledCascade<'a> {
    cascade: &'a HaarCascade,
    window: (i32, i32),
    norm_rect: Region,
    inv_area: f64,
    features: Vec<Vec<WeightedRect>>,
}

impl ScaledCascade<'_> {
    pub fn window(&self) -> (i32, i32) {
        self.window
    }

    /// Runs every stage on the window whose top-left corner is `(x, y)`.
    ///
    /// The window must fit inside the integral image.
    pub fn classify(&self, ii: &IntegralImage, x: i32, y: i32) -> Verdict {
        let norm = self.norm_rect.offset(x, y);
        let mean = ii.rect_sum(&norm) as f64 * self.inv_area;
        let variance = ii.rect_sq_sum(&norm) as f64 * self.inv_area - mean * mean;
        let std_dev = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        for (si, stage) in self.cascade.stages.iter().enumerate() {
            let mut stage_sum = 0.0;
            for wc in &stage.classifiers {
                stage_sum += self.evaluate_tree(wc, ii, x, y, std_dev);
            }
            if stage_sum < stage.threshold {
                return Verdict::Rejected { stage: si };
            }
        }
        Verdict::Accepted
    }

    fn evaluate_tree(
        &self,
        wc: &WeakClassifier,
        ii: &IntegralImage,
        x: i32,
        y: i32,
        std_dev: f64,
    ) -> f64 {
        let mut idx = 0i32;
        loop {
            let node = &wc.nodes[idx as usize];
            let value: f64 = self.features[node.feature]
                .iter()
                .map(|r| ii.rect_sum(&r.rect.offset(x, y)) as f64 * r.weight)
                .sum();
            idx = if value < node.threshold * std_dev {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return wc.leaves[(-idx) as usize];
            }
        }
    }
}

/// Scales feature rects and folds the window-area normalisation into the
/// weights. The first rect's weight is recomputed so rounding cannot leave
/// the feature with a non-zero response on flat regions.
fn scale_feature(
    feature: &HaarFeature,
    factor: f64,
    inv_area: f64,
    win_w: i32,
    win_h: i32,
) -> Vec<WeightedRect> {
    let mut scaled: Vec<WeightedRect> = feature
        .rects
        .iter()
        .map(|r| {
            let rect = Region::new(
                (r.rect.x as f64 * factor).round() as i32,
                (r.rect.y as f64 * factor).round() as i32,
                (r.rect.width as f64 * factor).round() as i32,
                (r.rect.height as f64 * factor).round() as i32,
            )
            .clamp_to(win_w.max(0) as u32, win_h.max(0) as u32);
            WeightedRect {
                rect,
                weight: r.weight * inv_area,
            }
        })
        .collect();

    if scaled.len() > 1 {
        let area0 = scaled[0].rect.area() as f64;
        if area0 > 0.0 {
            let rest: f64 = scaled[1..]
                .iter()
                .map(|r| r.weight * r.rect.area() as f64)
                .sum();
            scaled[0].weight = -rest / area0;
        }
    }
    scaled
}

fn parse_stage(node: &XmlElement) -> Result<Stage, CascadeError> {
    let threshold = node.require("stageThreshold")?.parse_number::<f64>()?;
    let classifiers = node
        .require("weakClassifiers")?
        .items()
        .map(parse_weak_classifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak_classifier(node: &XmlElement) -> Result<WeakClassifier, CascadeError> {
    let raw_nodes = node.require("internalNodes")?.numbers()?;
    if raw_nodes.is_empty() || raw_nodes.len() % 4 != 0 {
        return Err(CascadeError::Invalid(format!(
            "internalNodes has {} values, expected a multiple of 4",
            raw_nodes.len()
        )));
    }
    let nodes = raw_nodes
        .chunks_exact(4)
        .map(|c| {
            if c[2] < 0.0 {
                return Err(CascadeError::Invalid(format!(
                    "negative feature index {}",
                    c[2]
                )));
            }
            Ok(TreeNode {
                left: c[0] as i32,
                right: c[1] as i32,
                feature: c[2] as usize,
                threshold: c[3],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let leaves = node.require("leafValues")?.numbers()?;
    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: &XmlElement) -> Result<HaarFeature, CascadeError> {
    if let Some(tilted) = node.child("tilted") {
        if tilted.parse_number::<i32>()? != 0 {
            return Err(CascadeError::Unsupported("tilted Haar features".to_string()));
        }
    }
    let rects = node
        .require("rects")?
        .items()
        .map(|item| {
            let v = item.numbers()?;
            if v.len() != 5 {
                return Err(CascadeError::Invalid(format!(
                    "feature rect needs 5 values, got {}",
                    v.len()
                )));
            }
            Ok(WeightedRect {
                rect: Region::new(v[0] as i32, v[1] as i32, v[2] as i32, v[3] as i32),
                weight: v[4],
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(HaarFeature { rects })
}
