//! # Motion commands and the actuator interface

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A combined velocity demand in the vehicle body frame.
///
/// Positive surge is forwards, positive sway is to starboard, positive heave
/// is upwards (a depth-hold demand is therefore negative).
///
/// Units: normalised thruster effort in [-1, 1] per axis.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocityCmd {
    /// Forward/backward demand.
    pub surge: f64,

    /// Lateral demand.
    pub sway: f64,

    /// Vertical demand.
    pub heave: f64,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// The motion actuator exposed by the vehicle's thruster bridge.
///
/// Primitive calls (`forward`, `strafe`, `dive`) are synchronous for their
/// duration, which couples the caller's control cadence to the command
/// duration. `publish` is fire-and-forget for the bridge's configured
/// execution window. Command failures are the bridge's responsibility: the
/// caller does not retry, it simply issues the next scheduled command.
pub trait Mover {
    /// Drive forward (positive speed) or backward for the given duration.
    fn forward(&self, duration_s: f64, speed: f64);

    /// Strafe to starboard (positive speed) or port for the given duration.
    fn strafe(&self, duration_s: f64, speed: f64);

    /// Ascend (positive speed) or descend for the given duration.
    fn dive(&self, duration_s: f64, speed: f64);

    /// Publish a combined velocity demand.
    fn publish(&self, cmd: &VelocityCmd);

    /// Actuate the payload release mechanism.
    fn release(&self);
}
