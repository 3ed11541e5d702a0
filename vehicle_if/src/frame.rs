//! # Camera frame types
//!
//! Frames are delivered by the camera equipment as RGB buffers and converted
//! here into the single-channel search images consumed by the vision
//! processing. Conversion failures are recoverable: the owning flow logs
//! them and drops the frame.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use image::{imageops, GrayImage, RgbImage};

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

/// A single frame from the down-facing camera.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// The raw image data.
    pub image: RgbImage,

    /// Time at which the frame was acquired.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Errors that can occur when decoding or converting a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(
        "Raw buffer does not match the declared frame dimensions \
         ({width}x{height})"
    )]
    InvalidBuffer { width: u32, height: u32 },

    #[error("Frame is {found:?} pixels but the camera is configured as {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl CameraFrame {
    /// Create a frame from an already decoded image, timestamped now.
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            timestamp: Utc::now(),
        }
    }

    /// Create a frame from a raw interleaved RGB8 buffer.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        match RgbImage::from_raw(width, height, data) {
            Some(image) => Ok(Self::new(image)),
            None => Err(FrameError::InvalidBuffer { width, height }),
        }
    }

    /// Convert the frame into a single-channel search image.
    ///
    /// The frame must match the configured camera dimensions, anything else
    /// indicates a mis-configured camera stream and the frame is rejected.
    pub fn to_search_image(&self, expected_dims: (u32, u32)) -> Result<GrayImage, FrameError> {
        let found = self.image.dimensions();

        if found != expected_dims {
            return Err(FrameError::DimensionMismatch {
                expected: expected_dims,
                found,
            });
        }

        Ok(imageops::grayscale(&self.image))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_raw_rejects_short_buffer() {
        // 4x4 RGB8 frame needs 48 bytes
        assert!(CameraFrame::from_raw(4, 4, vec![0u8; 47]).is_err());
        assert!(CameraFrame::from_raw(4, 4, vec![0u8; 48]).is_ok());
    }

    #[test]
    fn test_to_search_image_checks_dims() {
        let frame = CameraFrame::from_raw(8, 6, vec![128u8; 8 * 6 * 3]).unwrap();

        let gray = frame.to_search_image((8, 6)).unwrap();
        assert_eq!(gray.dimensions(), (8, 6));

        assert!(matches!(
            frame.to_search_image((640, 480)),
            Err(FrameError::DimensionMismatch { .. })
        ));
    }
}
