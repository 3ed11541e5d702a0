//! Camera replay
//!
//! Feeds the detection path from a directory of still images instead of a
//! live camera, pushing one [`CameraFrame`] per replay period in file-name
//! order. Used to re-run recorded pool sessions against the matcher.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{SendError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use vehicle_if::frame::CameraFrame;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Background camera replay source.
pub struct CamReplay {
    handle: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors raised when starting a replay.
#[derive(Debug, thiserror::Error)]
pub enum CamReplayError {
    #[error("Could not read the replay directory {0:?}: {1}")]
    DirReadError(PathBuf, std::io::Error),

    #[error("The replay directory {0:?} contains no files")]
    EmptyDir(PathBuf),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CamReplay {
    /// Start replaying the images in `dir` into `sender`.
    ///
    /// Frames are emitted in lexicographic file-name order at one frame per
    /// `period_s`. Files which fail to decode are skipped with a warning.
    /// The replay stops when it runs out of files or when the receiving end
    /// is dropped, whichever comes first.
    pub fn spawn(
        dir: &Path,
        period_s: f64,
        sender: Sender<CameraFrame>,
    ) -> Result<Self, CamReplayError> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CamReplayError::DirReadError(dir.to_path_buf(), e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();

        if paths.is_empty() {
            return Err(CamReplayError::EmptyDir(dir.to_path_buf()));
        }

        paths.sort();

        info!(
            "Replaying {} frame(s) from {:?} at {:.1} s/frame",
            paths.len(),
            dir,
            period_s
        );

        let period = Duration::from_secs_f64(period_s);

        let handle = thread::spawn(move || {
            for path in paths {
                let image = match image::open(&path) {
                    Ok(image) => image.to_rgb8(),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", path, e);
                        continue;
                    }
                };

                // A closed receiver means the task is done with frames
                if let Err(SendError(_)) = sender.send(CameraFrame::new(image)) {
                    break;
                }

                thread::sleep(period);
            }

            info!("Camera replay finished");
        });

        Ok(Self { handle })
    }

    /// Wait for the replay to finish.
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("Camera replay thread panicked");
        }
    }
}
