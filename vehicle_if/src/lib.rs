//! # Vehicle interface library
//!
//! This library defines the interfaces between the task software and the
//! vehicle's external equipment:
//!
//! - [`motion`] - motion primitives, combined velocity commands, and the
//!   [`motion::Mover`] actuator trait implemented by the thruster bridge.
//! - [`frame`] - camera frame types and conversion into search-ready
//!   single-channel images.
//!
//! No wire protocol lives here: the task core is invoked in-process by the
//! mission sequencer, so these types cross plain function-call and channel
//! boundaries only.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod frame;
pub mod motion;
