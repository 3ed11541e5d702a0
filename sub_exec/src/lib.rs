//! Submarine task software library
//!
//! This library contains the marker engagement task core:
//!
//! - [`vision`] - multi-scale template matching over camera frames.
//! - [`marker_task`] - the task state machine, scan sequencer, and
//!   proportional tracking controller.
//! - [`mover_client`] - stand-in implementation of the thruster bridge.
//! - [`cam_replay`] - frame source replaying images from disk.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod cam_replay;
pub mod marker_task;
pub mod mover_client;
pub mod vision;
