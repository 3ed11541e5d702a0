//! Main submarine-side executable entry point.
//!
//! Runs the marker engagement task from start to finish:
//!
//!     - Initialise the session and logger
//!     - Load the task parameters and template images
//!     - Attach the camera source (live feed or session replay)
//!     - Execute the task until engagement or the time budget expires
//!     - Save the execution report into the session
//!
//! With a directory argument the executable replays the images found there
//! as the camera feed, which is how recorded pool sessions are re-run.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::info;
use std::env;
use std::path::PathBuf;
use std::sync::mpsc::channel;

// Internal
use sub_lib::cam_replay::CamReplay;
use sub_lib::marker_task::MarkerTask;
use sub_lib::mover_client::MoverClient;
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
    time::MonotonicClock,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Period between replayed camera frames.
const REPLAY_PERIOD_S: f64 = 0.1;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("sub_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Submarine Executable - Marker Task\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- PARSE ARGUMENTS ----

    let args: Vec<String> = env::args().collect();

    let replay_dir = match args.len() {
        1 => None,
        2 => Some(PathBuf::from(&args[1])),
        _ => return Err(eyre!("Usage: {} [replay_dir]", args[0])),
    };

    // ---- INITIALISE THE TASK ----

    let task = MarkerTask::init("marker_task.toml", Box::new(MonotonicClock::new()))
        .wrap_err("Failed to initialise the marker task")?;

    info!("Marker task initialised");

    let mover = MoverClient::new();

    // ---- ATTACH THE CAMERA SOURCE ----

    let (frame_tx, frame_rx) = channel();

    let replay = match replay_dir {
        Some(dir) => {
            let replay = CamReplay::spawn(&dir, REPLAY_PERIOD_S, frame_tx)
                .wrap_err("Failed to start the camera replay")?;
            Some(replay)
        }
        None => {
            // No camera source attached. Dropping the sender lets the task
            // scan until the watchdog expires, a dry run of the motion
            // sequence.
            info!("No replay directory given, executing a dry run");
            drop(frame_tx);
            None
        }
    };

    // ---- EXECUTE ----

    let report = task
        .execute(&mover, frame_rx)
        .wrap_err("Marker task failed")?;

    if let Some(replay) = replay {
        replay.join();
    }

    // ---- SAVE THE REPORT ----

    session.save("marker_task_report.json", report);
    session.exit();

    info!("Executable finished, goodbye");

    Ok(())
}
