//! Motion client
//!
//! [`MoverClient`] is the executable's implementation of the
//! [`vehicle_if::motion::Mover`] trait. It logs every command it is asked to
//! perform and honours the timing contract of the trait: timed primitives
//! block for their duration, velocity publishes return immediately.
//!
//! When no actuation backend is attached the client is effectively a
//! dry-run harness, which is also how replayed camera sessions are driven.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::info;
use std::thread;
use std::time::Duration;

use vehicle_if::motion::{Mover, VelocityCmd};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Logging motion client.
pub struct MoverClient;

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MoverClient {
    pub fn new() -> Self {
        Self
    }

    /// Block for the duration of a timed primitive.
    fn hold(duration_s: f64) {
        if duration_s > 0.0 {
            thread::sleep(Duration::from_secs_f64(duration_s));
        }
    }
}

impl Default for MoverClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Mover for MoverClient {
    fn forward(&self, duration_s: f64, speed: f64) {
        info!("MOVE: forward at {:.2} for {:.2} s", speed, duration_s);
        Self::hold(duration_s);
    }

    fn strafe(&self, duration_s: f64, speed: f64) {
        info!("MOVE: strafe at {:.2} for {:.2} s", speed, duration_s);
        Self::hold(duration_s);
    }

    fn dive(&self, duration_s: f64, speed: f64) {
        info!("MOVE: dive at {:.2} for {:.2} s", speed, duration_s);
        Self::hold(duration_s);
    }

    fn publish(&self, cmd: &VelocityCmd) {
        info!(
            "MOVE: velocity surge {:.3}, sway {:.3}, heave {:.3}",
            cmd.surge, cmd.sway, cmd.heave
        );
    }

    fn release(&self) {
        info!("MOVE: release payload");
    }
}
