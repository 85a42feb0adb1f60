use chrono::{DateTime, Local};
use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{CameraError, CycleError};

/// The one message shown when the live preview cannot start.
pub const CAMERA_UNAVAILABLE_MESSAGE: &str =
    "This browser does not support video capture, or this device does not have a camera.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    CameraUnavailable,
    ProcessingFailed,
}

/// A user-facing notification raised by the controller.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    /// Text shown to the user.
    pub message: String,
    /// Underlying cause, for the log.
    pub detail: String,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn camera_unavailable(cause: &CameraError) -> Self {
        Self {
            kind: NoticeKind::CameraUnavailable,
            message: CAMERA_UNAVAILABLE_MESSAGE.to_string(),
            detail: cause.to_string(),
            at: Local::now(),
        }
    }

    pub fn processing_failed(cause: &CycleError) -> Self {
        Self {
            kind: NoticeKind::ProcessingFailed,
            message: format!("Processing failed: {}", cause),
            detail: format!("{:?}", cause),
            at: Local::now(),
        }
    }

    pub fn cycle_aborted() -> Self {
        Self {
            kind: NoticeKind::ProcessingFailed,
            message: "Processing was interrupted".to_string(),
            detail: "capture cycle dropped before completion".to_string(),
            at: Local::now(),
        }
    }
}

/// Sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Forwards notices to the UI thread, which drains them every frame.
pub struct ChannelNotifier {
    sender: Sender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<Notice>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        log::warn!("{} ({})", notice.message, notice.detail);
        if self.sender.send(notice).is_err() {
            log::debug!("Notice dropped, UI is gone");
        }
    }
}
