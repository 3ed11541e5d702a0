//! Parameters structure for the marker task

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::scan::ScanProgramParams;
use crate::vision::MatcherParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the marker task and all its components.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerTaskParams {
    /// Width of the camera frame.
    ///
    /// Units: pixels
    pub camera_dims_x: u32,

    /// Height of the camera frame.
    ///
    /// Units: pixels
    pub camera_dims_y: u32,

    /// Proportional gain mapping vertical pixel error to surge demand.
    ///
    /// Units: demand/pixel
    pub k_forward: f64,

    /// Proportional gain mapping horizontal pixel error to sway demand.
    ///
    /// Units: demand/pixel
    pub k_strafe: f64,

    /// Demand magnitude under which an axis counts as aligned. When both
    /// axes are within the deadband the engagement fires.
    pub deadband: f64,

    /// Saturation limit on the proportional demands.
    pub max_demand: f64,

    /// Constant downward heave demand carried by every tracking command.
    pub heave_hold: f64,

    /// Duration of the per-tick depth-hold dive while searching.
    ///
    /// Units: seconds
    pub search_dive_duration_s: f64,

    /// Speed of the per-tick depth-hold dive while searching.
    pub search_dive_speed: f64,

    /// Duration of the terminal dive issued with the release action.
    ///
    /// Units: seconds
    pub release_dive_duration_s: f64,

    /// Speed of the terminal dive issued with the release action.
    pub release_dive_speed: f64,

    /// Hard time budget for the whole task, enforced by the watchdog.
    ///
    /// Units: seconds
    pub time_budget_s: f64,

    /// Enable the match visualisation observer.
    pub visualise: bool,

    /// Entry manoeuvre executed once before the search begins.
    pub entry: EntryMnvrParams,

    /// Template matcher parameters.
    pub matcher: MatcherParams,

    /// Scan program.
    pub scan: ScanProgramParams,
}

/// The open-loop manoeuvre driving the vehicle into the task volume.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryMnvrParams {
    /// Duration of the initial push forward.
    ///
    /// Units: seconds
    pub forward_duration_s: f64,

    /// Speed of the initial push forward.
    pub forward_speed: f64,

    /// Duration of the dive to task depth.
    ///
    /// Units: seconds
    pub dive_duration_s: f64,

    /// Speed of the dive to task depth.
    pub dive_speed: f64,
}
