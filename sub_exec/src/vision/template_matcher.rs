//! Multi-scale template matcher
//!
//! Matching is normalised cross-correlation of each template over the
//! frame, repeated across a symmetric set of frame scales so that markers
//! nearer or further than the reference distance are still found.
//! Positions and sizes of qualifying matches are mapped back to
//! original-frame coordinates by dividing by the same factor used to
//! resample the frame.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use image::{imageops, GrayImage};
use imageproc::template_matching::{match_template, MatchTemplateMethod};
use log::{debug, warn};
use nalgebra::Point2;

// Internal
use super::{MatcherParams, TemplateMatchError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An immutable reference pattern representing one marker class.
#[derive(Debug, Clone)]
pub struct Template {
    /// Label of the marker class.
    pub label: String,

    /// Preprocessed single-channel pattern image.
    pub image: GrayImage,
}

/// A candidate detection in original-frame coordinates.
#[derive(Debug, Clone)]
pub struct BoundingBox {
    /// Left edge of the box.
    ///
    /// Units: pixels, original frame
    pub x: f64,

    /// Top edge of the box.
    ///
    /// Units: pixels, original frame
    pub y: f64,

    /// Width of the box.
    pub width: f64,

    /// Height of the box.
    pub height: f64,

    /// Label of the template which produced this box.
    pub label: String,

    /// Normalised cross-correlation score in [0, 1].
    pub score: f64,
}

/// Multi-scale template matcher over preprocessed frames.
pub struct TemplateMatcher {
    /// Templates in descending label priority order.
    templates: Vec<Template>,

    /// Minimum qualifying score.
    threshold: f64,

    /// Frame resampling factors searched for each template.
    scales: Vec<f64>,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Optional side channel receiving the qualifying boxes of each frame.
///
/// Implementations must not influence detection results, they only observe
/// them (logging, overlay drawing, debugging).
pub trait MatchObserver: Send {
    fn on_matches(&mut self, frame: &GrayImage, boxes: &[BoundingBox]);
}

/// Observer that does nothing, used when visualisation is disabled.
pub struct NullObserver;

/// Observer that logs each qualifying box.
pub struct LogObserver;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl BoundingBox {
    /// Centre of the box in original-frame coordinates.
    pub fn centre(&self) -> Point2<f64> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl MatchObserver for NullObserver {
    fn on_matches(&mut self, _frame: &GrayImage, _boxes: &[BoundingBox]) {}
}

impl MatchObserver for LogObserver {
    fn on_matches(&mut self, _frame: &GrayImage, boxes: &[BoundingBox]) {
        for bb in boxes {
            debug!(
                "Match '{}': ({:.1}, {:.1}) {:.1}x{:.1} score {:.3}",
                bb.label, bb.x, bb.y, bb.width, bb.height, bb.score
            );
        }
    }
}

impl TemplateMatcher {
    /// Build a matcher by loading the template images named in the
    /// parameters. Paths are relative to the software root.
    pub fn new(params: &MatcherParams) -> Result<Self, TemplateMatchError> {
        let root =
            util::host::get_sub_sw_root().map_err(|_| TemplateMatchError::SwRootNotSet)?;

        let mut templates = Vec::with_capacity(params.templates.len());

        for spec in &params.templates {
            let image = image::open(root.join(&spec.path))
                .map_err(|e| TemplateMatchError::TemplateLoadError {
                    path: spec.path.clone(),
                    source: e,
                })?
                .to_luma8();

            templates.push(Template {
                label: spec.label.clone(),
                image,
            });
        }

        Self::from_templates(templates, params.threshold, params.num_scales)
    }

    /// Build a matcher from already loaded templates.
    ///
    /// Template order defines label priority: earlier templates win the
    /// per-frame target selection over later ones.
    pub fn from_templates(
        templates: Vec<Template>,
        threshold: f64,
        num_scales: usize,
    ) -> Result<Self, TemplateMatchError> {
        if templates.is_empty() {
            return Err(TemplateMatchError::NoTemplates);
        }

        if !(0.0..=1.0).contains(&threshold) {
            return Err(TemplateMatchError::InvalidThreshold(threshold));
        }

        if num_scales == 0 {
            return Err(TemplateMatchError::NoScales);
        }

        Ok(Self {
            templates,
            threshold,
            scales: build_scales(num_scales),
        })
    }

    /// Search one preprocessed frame for all templates.
    ///
    /// Returns every qualifying box, sorted by descending score. An empty
    /// vector is a normal outcome. The observer receives the final box list
    /// once per frame.
    pub fn match_frame(
        &self,
        frame: &GrayImage,
        observer: &mut dyn MatchObserver,
    ) -> Vec<BoundingBox> {
        let mut boxes = Vec::new();

        for template in &self.templates {
            self.search_template(frame, template, &mut boxes);
        }

        boxes.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        observer.on_matches(frame, &boxes);

        boxes
    }

    /// Pick the target box from one frame's qualifying boxes.
    ///
    /// Selection is by label priority first (template order), then by score
    /// within that label. Boxes from lower priority labels never win on
    /// score alone.
    pub fn select_target<'b>(&self, boxes: &'b [BoundingBox]) -> Option<&'b BoundingBox> {
        for template in &self.templates {
            let best = boxes
                .iter()
                .filter(|bb| bb.label == template.label)
                .max_by(|a, b| {
                    a.score
                        .partial_cmp(&b.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });

            if best.is_some() {
                return best;
            }
        }

        None
    }

    /// Match one template against the frame at every scale, appending
    /// qualifying boxes.
    fn search_template(&self, frame: &GrayImage, template: &Template, out: &mut Vec<BoundingBox>) {
        let (tw, th) = template.image.dimensions();

        // An all-black template makes the correlation denominator vanish
        if template.image.pixels().all(|p| p.0[0] == 0) {
            warn!("Template '{}' is black, skipping", template.label);
            return;
        }

        for &scale in &self.scales {
            // Per-iteration local copies of the resampled dimensions, the
            // template itself is never rescaled
            let (fw, fh) = frame.dimensions();
            let rw = ((fw as f64) * scale).round() as u32;
            let rh = ((fh as f64) * scale).round() as u32;

            if rw < tw || rh < th {
                continue;
            }

            let resized;
            let search: &GrayImage = if (scale - 1.0).abs() < f64::EPSILON {
                frame
            } else {
                resized = imageops::resize(frame, rw, rh, imageops::FilterType::Triangle);
                &resized
            };

            let scores = match_template(
                search,
                &template.image,
                MatchTemplateMethod::CrossCorrelationNormalized,
            );

            for (x, y, score) in scores.enumerate_pixels() {
                let score = score.0[0] as f64;

                if score >= self.threshold {
                    // Position and size both map back through the same
                    // inverse factor
                    out.push(BoundingBox {
                        x: x as f64 / scale,
                        y: y as f64 / scale,
                        width: tw as f64 / scale,
                        height: th as f64 / scale,
                        label: template.label.clone(),
                        score,
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Build the symmetric scale set {1} u {2^(k/2), 2^(-k/2) : 1 <= k < num}.
fn build_scales(num_scales: usize) -> Vec<f64> {
    let mut scales = vec![1.0];

    for k in 1..num_scales {
        let factor = 2f64.powf(0.5 * k as f64);
        scales.push(factor);
        scales.push(1.0 / factor);
    }

    scales
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Deterministic pseudo-random image, not self-similar across scales.
    fn noise_image(width: u32, height: u32, seed: u32) -> GrayImage {
        let mut state = seed;
        GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            image::Luma([(state >> 24) as u8])
        })
    }

    fn test_matcher(threshold: f64) -> (TemplateMatcher, GrayImage) {
        let template = noise_image(16, 16, 7);
        let mut frame = noise_image(64, 64, 1234);
        imageops::replace(&mut frame, &template, 20, 12);

        let matcher = TemplateMatcher::from_templates(
            vec![Template {
                label: "wolf".into(),
                image: template,
            }],
            threshold,
            2,
        )
        .unwrap();

        (matcher, frame)
    }

    #[test]
    fn test_scale_set_is_symmetric() {
        let scales = build_scales(2);
        assert_eq!(scales.len(), 3);
        assert!(scales.contains(&1.0));
        assert!(scales.iter().any(|s| (s - 2f64.sqrt()).abs() < 1e-12));
        assert!(scales.iter().any(|s| (s - 1.0 / 2f64.sqrt()).abs() < 1e-12));
    }

    #[test]
    fn test_exact_match_found_at_offset() {
        let (matcher, frame) = test_matcher(0.9);

        let boxes = matcher.match_frame(&frame, &mut NullObserver);
        assert!(!boxes.is_empty());

        // Best box is first (sorted descending) and centred on the embedded
        // template to within a pixel
        let best = &boxes[0];
        let centre = best.centre();
        assert!((centre.x - 28.0).abs() <= 1.0);
        assert!((centre.y - 20.0).abs() <= 1.0);
        assert!(best.score > 0.99);
    }

    #[test]
    fn test_all_scores_at_or_above_threshold() {
        let (matcher, frame) = test_matcher(0.5);

        for bb in matcher.match_frame(&frame, &mut NullObserver) {
            assert!(bb.score >= 0.5);
        }
    }

    #[test]
    fn test_no_match_is_normal() {
        // Unrelated noise windows correlate well below this threshold
        let (matcher, _) = test_matcher(0.95);
        let empty_frame = noise_image(64, 64, 999);

        let boxes = matcher.match_frame(&empty_frame, &mut NullObserver);
        assert!(boxes.is_empty());
    }

    #[test]
    fn test_black_template_is_skipped() {
        let matcher = TemplateMatcher::from_templates(
            vec![Template {
                label: "wolf".into(),
                image: GrayImage::new(8, 8),
            }],
            0.65,
            2,
        )
        .unwrap();

        let frame = noise_image(64, 64, 1234);
        assert!(matcher.match_frame(&frame, &mut NullObserver).is_empty());
    }

    #[test]
    fn test_selection_is_by_label_priority_not_score() {
        let matcher = TemplateMatcher::from_templates(
            vec![
                Template {
                    label: "wolf".into(),
                    image: noise_image(8, 8, 1),
                },
                Template {
                    label: "bat".into(),
                    image: noise_image(8, 8, 2),
                },
            ],
            0.65,
            2,
        )
        .unwrap();

        let make_box = |label: &str, score: f64| BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 8.0,
            height: 8.0,
            label: label.into(),
            score,
        };

        // The bat box scores higher, but wolf is the higher priority label
        let boxes = vec![make_box("bat", 0.99), make_box("wolf", 0.7)];
        let target = matcher.select_target(&boxes).unwrap();
        assert_eq!(target.label, "wolf");

        // Within one label the best score wins
        let boxes = vec![make_box("bat", 0.8), make_box("bat", 0.95)];
        let target = matcher.select_target(&boxes).unwrap();
        assert!((target.score - 0.95).abs() < 1e-12);

        assert!(matcher.select_target(&[]).is_none());
    }

    #[test]
    fn test_construction_validation() {
        assert!(matches!(
            TemplateMatcher::from_templates(vec![], 0.65, 2),
            Err(TemplateMatchError::NoTemplates)
        ));

        let templates = vec![Template {
            label: "wolf".into(),
            image: noise_image(8, 8, 1),
        }];

        assert!(matches!(
            TemplateMatcher::from_templates(templates.clone(), 1.5, 2),
            Err(TemplateMatchError::InvalidThreshold(_))
        ));

        assert!(matches!(
            TemplateMatcher::from_templates(templates, 0.65, 0),
            Err(TemplateMatchError::NoScales)
        ));
    }
}
