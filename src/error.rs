use std::time::Duration;
use thiserror::Error;

/// Why the live camera could not be provided. Every variant is fatal to the
/// preview: it is reported once and never retried automatically.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    #[error("video capture is not supported: {0}")]
    Unsupported(String),

    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("no camera device found: {0}")]
    NoDevice(String),

    #[error("camera stream ended before the first frame")]
    StreamEnded,

    #[error("camera frame error: {0}")]
    Frame(String),
}

/// Failure of the external processing capability, either during its
/// one-time setup or while transforming a frame.
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    #[error("processing capability failed to load: {0}")]
    Load(String),

    #[error("processing capability is not loaded")]
    NotReady,

    #[error("another frame is already being processed")]
    Busy,

    #[error("image processing failed: {0}")]
    Transform(String),

    #[error("expected a {expected}x{expected} image, got {width}x{height}")]
    Dimensions { expected: u32, width: u32, height: u32 },

    #[error("image processing did not finish within {0:?}")]
    TimedOut(Duration),
}

/// Error of a single capture-process-render cycle.
#[derive(Debug, Clone, Error)]
pub enum CycleError {
    #[error("no camera frame available to capture")]
    NoFrame,

    #[error(transparent)]
    Processing(#[from] ProcessingError),
}
