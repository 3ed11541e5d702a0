//! # Marker task module
//!
//! This module implements the "find and engage a submerged marker" task as
//! a finite-state machine over three states:
//!
//! - `Searching` - no target locked, an open-loop scan sweep (see
//!   [`ScanSequencer`]) drives the vehicle through the search volume.
//! - `Tracking` - a qualifying detection has locked the target, a
//!   proportional controller centres the vehicle over it.
//! - `Done` - terminal, reached through engagement or the watchdog.
//!
//! Two concurrent flows share the task state: the detection path, which
//! runs the template matcher on every incoming frame, and the fixed-rate
//! control tick, which reads the state and issues motion commands. The
//! state machine is monotonic: once a target is locked the task never
//! returns to Searching, and nothing leaves Done. An independent watchdog
//! forces Done once the task time budget is exceeded.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod params;
mod report;
mod scan;
mod state;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{debug, info, warn};
use nalgebra::Point2;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Internal
pub use params::{EntryMnvrParams, MarkerTaskParams};
pub use report::TaskReport;
pub use scan::{ScanPrimitive, ScanProgramError, ScanProgramParams, ScanSequencer, ScanStep};
pub use state::{SharedTaskState, TaskState};

use crate::vision::{LogObserver, MatchObserver, NullObserver, TemplateMatchError, TemplateMatcher};
use util::maths::clamp;
use util::time::Clock;
use vehicle_if::frame::CameraFrame;
use vehicle_if::motion::{Mover, VelocityCmd};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The marker engagement task.
///
/// Construct with [`MarkerTask::init`] (or [`MarkerTask::from_parts`] when
/// embedding), then call [`MarkerTask::execute`], which blocks the caller
/// until the task reaches Done.
pub struct MarkerTask {
    params: MarkerTaskParams,

    /// Open-loop search sequencer, stepped once per tick while Searching.
    sequencer: ScanSequencer,

    /// Matcher handed to the detection worker when execution starts.
    matcher: Option<TemplateMatcher>,

    /// State shared with the detection worker.
    shared: Arc<Mutex<SharedTaskState>>,

    /// Task time source. Injectable so ticks can be tested without real
    /// delays.
    clock: Box<dyn Clock>,

    /// Whether the terminal release action has been fired. The release
    /// fires at most once per execution.
    release_fired: bool,

    /// Centre of the camera frame, the tracking setpoint.
    image_centre: Point2<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors that can occur in the marker task.
#[derive(Debug, thiserror::Error)]
pub enum MarkerTaskError {
    #[error("Could not load MarkerTaskParams: {0}")]
    ParamLoadError(util::params::LoadError),

    #[error("Invalid scan program: {0}")]
    ScanProgramError(ScanProgramError),

    #[error("Could not initialise the template matcher: {0}")]
    VisionError(TemplateMatchError),

    #[error("The shared task state mutex was poisoned")]
    StatePoisoned,

    #[error("The detection worker thread panicked")]
    DetectionWorkerPanicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MarkerTask {
    /// Initialise the task from the given parameter file, loading the
    /// template images named in it.
    pub fn init(params_path: &str, clock: Box<dyn Clock>) -> Result<Self, MarkerTaskError> {
        let params: MarkerTaskParams =
            util::params::load(params_path).map_err(MarkerTaskError::ParamLoadError)?;

        let matcher =
            TemplateMatcher::new(&params.matcher).map_err(MarkerTaskError::VisionError)?;

        Self::from_parts(params, matcher, clock)
    }

    /// Build the task from already constructed parts.
    pub fn from_parts(
        params: MarkerTaskParams,
        matcher: TemplateMatcher,
        clock: Box<dyn Clock>,
    ) -> Result<Self, MarkerTaskError> {
        let sequencer =
            ScanSequencer::new(params.scan.clone()).map_err(MarkerTaskError::ScanProgramError)?;

        let image_centre = Point2::new(
            params.camera_dims_x as f64 / 2.0,
            params.camera_dims_y as f64 / 2.0,
        );

        Ok(Self {
            params,
            sequencer,
            matcher: Some(matcher),
            shared: Arc::new(Mutex::new(SharedTaskState::new())),
            clock,
            release_fired: false,
            image_centre,
        })
    }

    /// Execute the task, blocking the caller until Done is reached.
    ///
    /// Frames pushed into `frames` drive the asynchronous detection path;
    /// the control tick runs on the calling thread at one step per command
    /// quantum. If the frame sender is dropped the task keeps scanning
    /// until the watchdog expires.
    pub fn execute<M: Mover>(
        mut self,
        mover: &M,
        frames: Receiver<CameraFrame>,
    ) -> Result<TaskReport, MarkerTaskError> {
        info!(
            "Executing marker task (time budget {:.1} s)",
            self.params.time_budget_s
        );

        // Entry manoeuvre: push off into the task volume and dive to the
        // search depth
        let entry = self.params.entry.clone();
        mover.forward(entry.forward_duration_s, entry.forward_speed);
        mover.dive(entry.dive_duration_s, entry.dive_speed);

        // Start the detection worker. The matcher is handed over here,
        // template loading happened strictly before any concurrency.
        let worker = {
            let matcher = self
                .matcher
                .take()
                .expect("matcher present until execute is called, which consumes the task");
            let shared = self.shared.clone();
            let camera_dims = (self.params.camera_dims_x, self.params.camera_dims_y);
            let visualise = self.params.visualise;
            let poll = Duration::from_secs_f64(self.sequencer.quantum_s());

            thread::spawn(move || {
                detection_worker(matcher, shared, frames, camera_dims, visualise, poll)
            })
        };

        info!("Scanning for target");

        // Main cadence: one tick per command quantum
        let quantum = Duration::from_secs_f64(self.sequencer.quantum_s());

        loop {
            let tick_start_s = self.clock.elapsed_s();

            if self.tick(mover)? {
                break;
            }

            // Sleep out the remainder of the quantum
            let tick_dur_s = (self.clock.elapsed_s() - tick_start_s).max(0.0);
            match quantum.checked_sub(Duration::from_secs_f64(tick_dur_s)) {
                Some(remainder) => self.clock.sleep(remainder),
                None => warn!(
                    "Control tick overran by {:.6} s",
                    tick_dur_s - quantum.as_secs_f64()
                ),
            }
        }

        if worker.join().is_err() {
            return Err(MarkerTaskError::DetectionWorkerPanicked);
        }

        let report = self.build_report()?;
        info!(
            "Marker task complete: state {}, {:.1} s elapsed, {} detection(s), release fired: {}",
            report.final_state, report.elapsed_s, report.num_detections, report.release_fired
        );

        Ok(report)
    }

    /// One control tick.
    ///
    /// Evaluates the watchdog, then steps the scan or the tracking law
    /// depending on the current state. Returns true once the task is Done.
    /// The tick never blocks waiting for a frame.
    fn tick<M: Mover>(&mut self, mover: &M) -> Result<bool, MarkerTaskError> {
        let elapsed_s = self.clock.elapsed_s();

        // Watchdog, evaluated every tick regardless of state
        if elapsed_s > self.params.time_budget_s {
            let from = {
                let mut shared = self.lock_shared()?;
                let from = shared.state();
                shared.advance(TaskState::Done);
                from
            };

            match from {
                TaskState::Searching => warn!(
                    "Time budget ({:.1} s) exceeded before a target was acquired, \
                     release skipped",
                    self.params.time_budget_s
                ),
                TaskState::Tracking => {
                    warn!(
                        "Time budget ({:.1} s) exceeded while tracking, releasing at the \
                         current position",
                        self.params.time_budget_s
                    );
                    self.fire_release(mover);
                }
                TaskState::Done => (),
            }

            return Ok(true);
        }

        let (current_state, target) = {
            let shared = self.lock_shared()?;
            (shared.state(), shared.target_estimate())
        };

        match current_state {
            TaskState::Searching => {
                self.step_searching(mover);
                Ok(false)
            }
            TaskState::Tracking => match target {
                Some(target) => self.step_tracking(mover, target),
                // Unreachable: the detection path writes the estimate and
                // the state under one lock
                None => {
                    warn!("Tracking with no target estimate, skipping tick");
                    Ok(false)
                }
            },
            TaskState::Done => Ok(true),
        }
    }

    /// Advance the scan sweep by one quantum and hold depth.
    fn step_searching<M: Mover>(&mut self, mover: &M) {
        let step = match self.sequencer.step() {
            ScanStep::Exhausted => {
                debug!(
                    "Scan sweep exhausted at {:.1} s, restarting",
                    self.sequencer.elapsed_s()
                );
                self.sequencer.reset();
                self.sequencer.step()
            }
            step => step,
        };

        if let ScanStep::Command(primitive) = step {
            let duration_s = self.sequencer.quantum_s();
            let speed = self.sequencer.speed();

            match primitive {
                ScanPrimitive::PosForward => mover.forward(duration_s, speed),
                ScanPrimitive::NegForward => mover.forward(duration_s, -speed),
                ScanPrimitive::PosStrafe => mover.strafe(duration_s, speed),
                ScanPrimitive::NegStrafe => mover.strafe(duration_s, -speed),
            }
        }

        // Hold depth while sweeping
        mover.dive(
            self.params.search_dive_duration_s,
            self.params.search_dive_speed,
        );
    }

    /// One proportional tracking step towards the target estimate.
    ///
    /// Returns true if the deadband was satisfied and the task engaged.
    fn step_tracking<M: Mover>(
        &mut self,
        mover: &M,
        target: Point2<f64>,
    ) -> Result<bool, MarkerTaskError> {
        let d_forward = self.params.k_forward * (self.image_centre.y - target.y);
        let d_strafe = self.params.k_strafe * (self.image_centre.x - target.x);

        debug!(
            "Tracking demand: surge {:.4}, sway {:.4}",
            d_forward, d_strafe
        );

        // Deadband on both axes commits to engagement
        if d_forward.abs() < self.params.deadband && d_strafe.abs() < self.params.deadband {
            info!("Target aligned, engaging");

            self.fire_release(mover);
            mover.dive(
                self.params.release_dive_duration_s,
                self.params.release_dive_speed,
            );

            self.lock_shared()?.advance(TaskState::Done);
            return Ok(true);
        }

        let max = self.params.max_demand;
        mover.publish(&VelocityCmd {
            surge: clamp(&d_forward, &-max, &max),
            sway: clamp(&d_strafe, &-max, &max),
            heave: self.params.heave_hold,
        });

        Ok(false)
    }

    /// Fire the terminal release action, at most once per execution.
    fn fire_release<M: Mover>(&mut self, mover: &M) {
        if !self.release_fired {
            info!("Releasing marker payload");
            mover.release();
            self.release_fired = true;
        }
    }

    fn lock_shared(&self) -> Result<std::sync::MutexGuard<SharedTaskState>, MarkerTaskError> {
        self.shared.lock().map_err(|_| MarkerTaskError::StatePoisoned)
    }

    fn build_report(&self) -> Result<TaskReport, MarkerTaskError> {
        let shared = self.lock_shared()?;

        Ok(TaskReport {
            final_state: shared.state(),
            elapsed_s: self.clock.elapsed_s(),
            release_fired: self.release_fired,
            num_detections: shared.num_detections(),
            target_estimate: shared.target_estimate().map(|p| (p.x, p.y)),
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Detection worker: consumes frames and updates the shared task state.
///
/// Runs until the frame sender disconnects or the task reaches Done. Frame
/// conversion failures drop the frame without touching the state.
fn detection_worker(
    matcher: TemplateMatcher,
    shared: Arc<Mutex<SharedTaskState>>,
    frames: Receiver<CameraFrame>,
    camera_dims: (u32, u32),
    visualise: bool,
    poll: Duration,
) {
    let mut observer: Box<dyn MatchObserver> = if visualise {
        Box::new(LogObserver)
    } else {
        Box::new(NullObserver)
    };

    loop {
        // Poll with a timeout so Done is noticed even if the frame stream
        // stalls
        let frame = match frames.recv_timeout(poll) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match shared.lock() {
            Ok(state) => {
                if state.state() == TaskState::Done {
                    break;
                }
            }
            Err(_) => break,
        }

        let frame = match frame {
            Some(frame) => frame,
            None => continue,
        };

        let search_image = match frame.to_search_image(camera_dims) {
            Ok(image) => image,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                continue;
            }
        };

        let boxes = matcher.match_frame(&search_image, observer.as_mut());

        if let Some(best) = matcher.select_target(&boxes) {
            debug!(
                "Detected '{}' at ({:.1}, {:.1}), score {:.3}",
                best.label,
                best.centre().x,
                best.centre().y,
                best.score
            );

            if let Ok(mut state) = shared.lock() {
                state.apply_detection(best.centre());
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::vision::{MatcherParams, Template};
    use image::GrayImage;
    use std::sync::mpsc::channel;
    use util::time::StepClock;

    /// Mover recording every call it receives.
    #[derive(Default)]
    struct MockMover {
        calls: Mutex<Vec<MoverCall>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    enum MoverCall {
        Forward(f64, f64),
        Strafe(f64, f64),
        Dive(f64, f64),
        Publish(VelocityCmd),
        Release,
    }

    impl Mover for MockMover {
        fn forward(&self, duration_s: f64, speed: f64) {
            self.calls
                .lock()
                .unwrap()
                .push(MoverCall::Forward(duration_s, speed));
        }

        fn strafe(&self, duration_s: f64, speed: f64) {
            self.calls
                .lock()
                .unwrap()
                .push(MoverCall::Strafe(duration_s, speed));
        }

        fn dive(&self, duration_s: f64, speed: f64) {
            self.calls
                .lock()
                .unwrap()
                .push(MoverCall::Dive(duration_s, speed));
        }

        fn publish(&self, cmd: &VelocityCmd) {
            self.calls.lock().unwrap().push(MoverCall::Publish(*cmd));
        }

        fn release(&self) {
            self.calls.lock().unwrap().push(MoverCall::Release);
        }
    }

    impl MockMover {
        fn count(&self, predicate: impl Fn(&MoverCall) -> bool) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
        }

        fn num_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    /// A [`StepClock`] steppable from outside the task.
    #[derive(Clone)]
    struct SharedClock(Arc<Mutex<StepClock>>);

    impl SharedClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(StepClock::new())))
        }

        fn step(&self, step_s: f64) {
            self.0.lock().unwrap().step(step_s);
        }
    }

    impl Clock for SharedClock {
        fn elapsed_s(&self) -> f64 {
            self.0.lock().unwrap().elapsed_s()
        }

        fn sleep(&mut self, duration: Duration) {
            self.0.lock().unwrap().sleep(duration);
        }
    }

    fn test_params() -> MarkerTaskParams {
        MarkerTaskParams {
            camera_dims_x: 640,
            camera_dims_y: 480,
            k_forward: -0.001,
            k_strafe: 0.001,
            deadband: 0.05,
            max_demand: 0.4,
            heave_hold: -0.1,
            search_dive_duration_s: 0.01,
            search_dive_speed: -0.1,
            release_dive_duration_s: 1.0,
            release_dive_speed: -0.3,
            time_budget_s: 15.0,
            visualise: false,
            entry: EntryMnvrParams {
                forward_duration_s: 4.0,
                forward_speed: 0.4,
                dive_duration_s: 3.0,
                dive_speed: -0.4,
            },
            matcher: MatcherParams {
                templates: vec![],
                threshold: 0.65,
                num_scales: 2,
            },
            scan: ScanProgramParams {
                breakpoints_s: vec![0.0, 3.0, 4.0, 10.0, 11.0, 14.0],
                primitives: vec![
                    ScanPrimitive::NegStrafe,
                    ScanPrimitive::PosForward,
                    ScanPrimitive::PosStrafe,
                    ScanPrimitive::NegForward,
                    ScanPrimitive::NegStrafe,
                ],
                warm_up_s: 1.0,
                quantum_s: 0.1,
                speed: 0.2,
            },
        }
    }

    fn test_matcher() -> TemplateMatcher {
        TemplateMatcher::from_templates(
            vec![Template {
                label: "wolf".into(),
                image: GrayImage::from_fn(8, 8, |x, y| image::Luma([(x * 31 + y * 7) as u8])),
            }],
            0.65,
            2,
        )
        .unwrap()
    }

    fn test_task(clock: SharedClock) -> MarkerTask {
        MarkerTask::from_parts(test_params(), test_matcher(), Box::new(clock)).unwrap()
    }

    #[test]
    fn test_searching_ticks_emit_scan_and_depth_hold() {
        let mover = MockMover::default();
        let mut task = test_task(SharedClock::new());

        assert!(!task.tick(&mover).unwrap());

        // One warm-up strafe and one depth-hold dive
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Strafe(_, s) if *s < 0.0)), 1);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Dive(_, _))), 1);
        assert_eq!(task.lock_shared().unwrap().state(), TaskState::Searching);
    }

    #[test]
    fn test_centred_target_engages_once() {
        let mover = MockMover::default();
        let mut task = test_task(SharedClock::new());

        // Detection path locks the target dead centre
        task.shared
            .lock()
            .unwrap()
            .apply_detection(Point2::new(320.0, 240.0));

        // Both corrections are zero, so the deadband is satisfied on the
        // next tick
        assert!(task.tick(&mover).unwrap());
        assert_eq!(task.lock_shared().unwrap().state(), TaskState::Done);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Release)), 1);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Dive(_, _))), 1);

        // Done issues no further commands
        let before = mover.num_calls();
        assert!(task.tick(&mover).unwrap());
        assert_eq!(mover.num_calls(), before);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Release)), 1);
    }

    #[test]
    fn test_tracking_issues_proportional_command() {
        let mover = MockMover::default();
        let mut task = test_task(SharedClock::new());

        // Target off centre by (+100, -100) pixels
        task.shared
            .lock()
            .unwrap()
            .apply_detection(Point2::new(420.0, 140.0));

        assert!(!task.tick(&mover).unwrap());

        let calls = mover.calls.lock().unwrap();
        match &calls[0] {
            MoverCall::Publish(cmd) => {
                // k_forward = -0.001, error_y = 240 - 140 = 100
                assert!((cmd.surge - (-0.1)).abs() < 1e-9);
                // k_strafe = 0.001, error_x = 320 - 420 = -100
                assert!((cmd.sway - (-0.1)).abs() < 1e-9);
                assert!((cmd.heave - (-0.1)).abs() < 1e-9);
            }
            other => panic!("Expected a published velocity command, got {:?}", other),
        }
    }

    #[test]
    fn test_watchdog_from_searching_skips_release() {
        let mover = MockMover::default();
        let clock = SharedClock::new();
        let mut task = test_task(clock.clone());

        clock.step(15.1);

        assert!(task.tick(&mover).unwrap());
        assert_eq!(task.lock_shared().unwrap().state(), TaskState::Done);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Release)), 0);
    }

    #[test]
    fn test_watchdog_from_tracking_fires_release() {
        let mover = MockMover::default();
        let clock = SharedClock::new();
        let mut task = test_task(clock.clone());

        task.shared
            .lock()
            .unwrap()
            .apply_detection(Point2::new(100.0, 100.0));
        clock.step(15.1);

        assert!(task.tick(&mover).unwrap());
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Release)), 1);
    }

    #[test]
    fn test_execute_times_out_without_detections() {
        let mover = MockMover::default();
        let clock = SharedClock::new();
        let task = test_task(clock.clone());

        // No frames will ever arrive
        let (frame_tx, frame_rx) = channel();
        drop(frame_tx);

        let report = task.execute(&mover, frame_rx).unwrap();

        assert_eq!(report.final_state, TaskState::Done);
        assert!(!report.release_fired);
        assert_eq!(report.num_detections, 0);
        assert!(report.elapsed_s >= 15.0);

        // The entry manoeuvre fired before the search began
        let calls = mover.calls.lock().unwrap();
        assert_eq!(calls[0], MoverCall::Forward(4.0, 0.4));
        assert_eq!(calls[1], MoverCall::Dive(3.0, -0.4));
        // Release the guard: `count` takes the same (non-reentrant) lock
        drop(calls);
        assert_eq!(mover.count(|c| matches!(c, MoverCall::Release)), 0);
    }

    #[test]
    fn test_bad_frame_dropped_without_state_mutation() {
        let shared = Arc::new(Mutex::new(SharedTaskState::new()));
        let (frame_tx, frame_rx) = channel();

        // Frame dimensions disagree with the configured camera, so the
        // conversion fails and the frame must be dropped
        frame_tx
            .send(CameraFrame::new(image::RgbImage::new(32, 32)))
            .unwrap();
        drop(frame_tx);

        detection_worker(
            test_matcher(),
            shared.clone(),
            frame_rx,
            (640, 480),
            false,
            Duration::from_millis(10),
        );

        let state = shared.lock().unwrap();
        assert_eq!(state.state(), TaskState::Searching);
        assert_eq!(state.num_detections(), 0);
        assert!(state.target_estimate().is_none());
    }
}
