//! Marker task execution report

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

use super::state::TaskState;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Summary of one task execution, logged and saved into the session.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    /// State the task finished in.
    pub final_state: TaskState,

    /// Total task time consumed.
    ///
    /// Units: seconds
    pub elapsed_s: f64,

    /// Whether the terminal release action was fired.
    pub release_fired: bool,

    /// Number of qualifying detections applied over the execution.
    pub num_detections: u64,

    /// Centre of the last qualifying detection, if any.
    ///
    /// Units: pixels, original frame
    pub target_estimate: Option<(f64, f64)>,
}
