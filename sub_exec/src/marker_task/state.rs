//! Marker task state
//!
//! The task state and target estimate are read and written from two
//! concurrent flows (the detection path and the control tick), so both live
//! in a single [`SharedTaskState`] container which the task guards with one
//! mutex. State transitions go through an explicit partial order: the
//! machine only ever advances, and [`TaskState::Done`] is terminal.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Point2;
use serde::Serialize;
use std::fmt::Display;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// States of the marker task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// No target locked, the open-loop scan sweep is running.
    Searching,

    /// A target has been locked, closed-loop visual tracking is running.
    /// Once entered the task never returns to Searching, even if later
    /// frames show no detection.
    Tracking,

    /// The task is finished. Terminal.
    Done,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State shared between the detection flow and the control tick.
///
/// The detection flow is the only writer of the target estimate, the tick
/// only reads it. Most recent detection wins.
#[derive(Debug)]
pub struct SharedTaskState {
    state: TaskState,

    /// Centre of the most recent qualifying detection.
    ///
    /// `None` until the first qualifying detection.
    target_estimate: Option<Point2<f64>>,

    /// Number of qualifying detections applied so far.
    num_detections: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TaskState {
    /// Whether a transition from this state to `next` is allowed.
    ///
    /// The state order is Searching, Tracking, Done; only forward
    /// transitions are allowed and Done is reachable from anywhere.
    pub fn can_advance_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Searching, TaskState::Tracking)
                | (TaskState::Searching, TaskState::Done)
                | (TaskState::Tracking, TaskState::Done)
        )
    }
}

impl Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Searching => write!(f, "Searching"),
            TaskState::Tracking => write!(f, "Tracking"),
            TaskState::Done => write!(f, "Done"),
        }
    }
}

impl SharedTaskState {
    pub fn new() -> Self {
        Self {
            state: TaskState::Searching,
            target_estimate: None,
            num_detections: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn target_estimate(&self) -> Option<Point2<f64>> {
        self.target_estimate
    }

    pub fn num_detections(&self) -> u64 {
        self.num_detections
    }

    /// Record a qualifying detection at the given centre.
    ///
    /// Updates the target estimate (most recent wins) and locks the task
    /// into Tracking if it is still Searching. Ignored once the task is
    /// Done.
    pub fn apply_detection(&mut self, centre: Point2<f64>) {
        if self.state == TaskState::Done {
            return;
        }

        self.target_estimate = Some(centre);
        self.num_detections += 1;

        if self.state.can_advance_to(TaskState::Tracking) {
            self.state = TaskState::Tracking;
        }
    }

    /// Attempt to advance the state machine.
    ///
    /// Returns true if the transition was allowed and applied. Transitions
    /// violating the state order are refused, which is what makes the
    /// machine monotonic.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            false
        }
    }
}

impl Default for SharedTaskState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_state_only_advances() {
        let mut shared = SharedTaskState::new();
        assert_eq!(shared.state(), TaskState::Searching);
        assert!(shared.target_estimate().is_none());

        // A qualifying detection locks the task into Tracking
        shared.apply_detection(Point2::new(100.0, 50.0));
        assert_eq!(shared.state(), TaskState::Tracking);

        // No path leads back to Searching
        assert!(!shared.advance(TaskState::Searching));
        assert_eq!(shared.state(), TaskState::Tracking);

        // Later detections update the estimate without changing state
        shared.apply_detection(Point2::new(120.0, 60.0));
        assert_eq!(shared.state(), TaskState::Tracking);
        assert_eq!(shared.target_estimate(), Some(Point2::new(120.0, 60.0)));
        assert_eq!(shared.num_detections(), 2);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut shared = SharedTaskState::new();

        // Done is reachable directly from Searching (watchdog path)
        assert!(shared.advance(TaskState::Done));
        assert_eq!(shared.state(), TaskState::Done);

        assert!(!shared.advance(TaskState::Tracking));
        assert!(!shared.advance(TaskState::Searching));
        assert!(!shared.advance(TaskState::Done));

        // Detections after Done are ignored
        shared.apply_detection(Point2::new(1.0, 1.0));
        assert_eq!(shared.state(), TaskState::Done);
        assert!(shared.target_estimate().is_none());
        assert_eq!(shared.num_detections(), 0);
    }
}
