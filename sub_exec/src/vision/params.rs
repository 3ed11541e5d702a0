//! Parameters structure for the template matcher

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the template matcher.
#[derive(Debug, Clone, Deserialize)]
pub struct MatcherParams {
    /// Reference templates in descending label priority order. When multiple
    /// templates yield qualifying boxes in one frame the earliest listed
    /// label wins, irrespective of score.
    pub templates: Vec<TemplateSpec>,

    /// Minimum normalised cross-correlation score for a match to qualify.
    ///
    /// Units: correlation score in [0, 1]
    pub threshold: f64,

    /// Number of half-octave scale steps searched either side of unity.
    ///
    /// A value of 2 gives the scale set {1, sqrt(2), 1/sqrt(2)}.
    pub num_scales: usize,
}

/// One reference template to load at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    /// Image file path relative to the software root.
    pub path: String,

    /// Label of the marker class this template represents.
    pub label: String,
}
