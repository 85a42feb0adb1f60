use image::RgbaImage;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::camera_controller::{CameraDevice, CameraRequest, VideoStream};
use crate::error::CameraError;

/// Display surface a live stream is bound to. Holds the most recently
/// presented frame; cloning shares the same surface.
#[derive(Clone)]
pub struct VideoSurface {
    frame: Arc<watch::Sender<Option<Arc<RgbaImage>>>>,
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSurface {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            frame: Arc::new(sender),
        }
    }

    pub fn present(&self, frame: RgbaImage) {
        self.frame.send_replace(Some(Arc::new(frame)));
    }

    pub fn current_frame(&self) -> Option<Arc<RgbaImage>> {
        self.frame.borrow().clone()
    }

    #[cfg(test)]
    pub fn is_ready(&self) -> bool {
        self.frame.borrow().is_some()
    }

    /// Resolves once the first decodable frame has been presented.
    pub async fn wait_until_ready(&self) {
        let mut receiver = self.frame.subscribe();
        let _ = receiver.wait_for(|frame| frame.is_some()).await;
    }
}

/// Acquires the camera and binds it to a surface.
pub struct FrameSource {
    camera: Arc<dyn CameraDevice>,
}

impl FrameSource {
    pub fn new(camera: Arc<dyn CameraDevice>) -> Self {
        Self { camera }
    }

    /// Open the camera, present its first frame on `surface` and resolve once
    /// the surface is ready. Playback is started separately with
    /// [`LiveFrameHandle::play`].
    pub async fn acquire(
        &self,
        request: &CameraRequest,
        surface: &VideoSurface,
    ) -> Result<LiveFrameHandle, CameraError> {
        info!(
            "Requesting camera '{}': {}x{}, facing {:?}, audio {}",
            self.camera.name(),
            request.width,
            request.height,
            request.facing,
            request.audio
        );

        let mut stream = self.camera.open(request).await?;
        let first = match stream.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                stream.stop();
                return Err(CameraError::StreamEnded);
            }
            Err(e) => {
                stream.stop();
                return Err(e);
            }
        };

        info!("Camera ready: first frame {}x{}", first.width(), first.height());
        surface.present(first);
        surface.wait_until_ready().await;

        Ok(LiveFrameHandle {
            stream,
            surface: surface.clone(),
        })
    }
}

/// A successfully acquired camera stream bound to its surface.
pub struct LiveFrameHandle {
    stream: Box<dyn VideoStream>,
    surface: VideoSurface,
}

impl LiveFrameHandle {
    #[cfg(test)]
    pub fn surface(&self) -> &VideoSurface {
        &self.surface
    }

    /// Keep presenting frames every `interval` until the stream ends or the
    /// returned [`Playback`] is stopped.
    pub fn play(self, interval: Duration) -> Playback {
        let LiveFrameHandle { mut stream, surface } = self;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match stream.next_frame().await {
                    Ok(Some(frame)) => surface.present(frame),
                    Ok(None) => {
                        info!("Camera stream ended");
                        break;
                    }
                    Err(e) => warn!("Dropped camera frame: {}", e),
                }
            }
            stream.stop();
        });

        info!("Camera playback started ({:?} per frame)", interval);
        Playback { task }
    }
}

/// Background playback of a live stream.
pub struct Playback {
    task: JoinHandle<()>,
}

impl Playback {
    pub fn stop(self) {
        self.task.abort();
        info!("Camera playback stopped");
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
