//! # Vision module
//!
//! This module turns preprocessed camera frames into candidate target
//! detections by multi-scale normalised cross-correlation against a fixed
//! set of reference templates. An empty result is a normal outcome, not an
//! error: it simply means the frame drives another scan step.
//!
//! Visualisation is an optional observer hook and never affects detection
//! results.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod template_matcher;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use template_matcher::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur while building the template matcher.
#[derive(Debug, thiserror::Error)]
pub enum TemplateMatchError {
    #[error("The software root environment variable (SUB_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load template image {path:?}: {source}")]
    TemplateLoadError {
        path: String,
        source: image::ImageError,
    },

    #[error("At least one template is required")]
    NoTemplates,

    #[error("Match threshold must be in [0, 1], found {0}")]
    InvalidThreshold(f64),

    #[error("At least one matching scale is required")]
    NoScales,
}
