use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};

use crate::camera_controller::{CameraDevice, CameraRequest, Facing};
use crate::capture;
use crate::config::Config;
use crate::error::CycleError;
use crate::frame_source::{FrameSource, Playback, VideoSurface};
use crate::notify::{Notice, Notifier};
use crate::pixel_buffer::PixelBuffer;
use crate::processing::{ProcessingCapability, ProcessingGateway, Readiness};

pub const TAKE_PHOTO_LABEL: &str = "Take a photo";
pub const PROCESSING_LABEL: &str = "Processing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    Processing,
}

impl InteractionState {
    /// Label of the trigger control in this state.
    pub fn label(&self) -> &'static str {
        match self {
            InteractionState::Idle => TAKE_PHOTO_LABEL,
            InteractionState::Processing => PROCESSING_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Acquiring,
    Live,
    Unavailable(String),
}

/// How a capture-process-render cycle settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Rendered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub capture_size: u32,
    pub facing: Facing,
    pub frame_interval: Duration,
    pub processing_timeout: Option<Duration>,
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            capture_size: config.capture.size,
            facing: config.camera.facing,
            frame_interval: Duration::from_millis(config.camera.frame_interval_ms),
            processing_timeout: config.processing.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Owns the preview surface, the canvas and the `Idle`/`Processing` state,
/// and sequences capture, processing and render for each trigger.
///
/// Cheap to clone; clones share the same controller.
#[derive(Clone)]
pub struct InteractionController {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ControllerSettings,
    runtime: Handle,
    camera: Arc<dyn CameraDevice>,
    gateway: ProcessingGateway,
    notifier: Arc<dyn Notifier>,
    surface: VideoSurface,
    canvas: Mutex<PixelBuffer>,
    canvas_revision: AtomicU64,
    state: Mutex<InteractionState>,
    camera_status: Mutex<CameraStatus>,
    playback: Mutex<Option<Playback>>,
    cycle: Mutex<Option<AbortHandle>>,
    mounted: AtomicBool,
    shut_down: AtomicBool,
}

impl InteractionController {
    pub fn new(
        settings: ControllerSettings,
        runtime: Handle,
        camera: Arc<dyn CameraDevice>,
        capability: Arc<dyn ProcessingCapability>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let size = settings.capture_size;
        let gateway = ProcessingGateway::new(capability, size).with_timeout(settings.processing_timeout);

        Self {
            inner: Arc::new(Inner {
                settings,
                runtime,
                camera,
                gateway,
                notifier,
                surface: VideoSurface::new(),
                canvas: Mutex::new(PixelBuffer::new(size)),
                canvas_revision: AtomicU64::new(0),
                state: Mutex::new(InteractionState::Idle),
                camera_status: Mutex::new(CameraStatus::Acquiring),
                playback: Mutex::new(None),
                cycle: Mutex::new(None),
                mounted: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Start acquiring the camera in the background. Only the first call
    /// does anything.
    pub fn mount(&self) -> Option<JoinHandle<()>> {
        if self.inner.mounted.swap(true, Ordering::SeqCst) {
            warn!("Controller already mounted");
            return None;
        }
        let this = self.clone();
        Some(self.inner.runtime.spawn(async move { this.acquire_camera().await }))
    }

    async fn acquire_camera(&self) {
        let settings = &self.inner.settings;
        let request = CameraRequest::video(settings.capture_size, settings.facing);
        let source = FrameSource::new(Arc::clone(&self.inner.camera));

        match source.acquire(&request, &self.inner.surface).await {
            Ok(handle) => {
                // Checked under the playback lock so shutdown either sees the
                // stored playback or we see its flag.
                let mut playback = self.inner.playback.lock();
                if self.inner.shut_down.load(Ordering::SeqCst) {
                    info!("Controller shut down during camera acquisition, releasing camera");
                    return;
                }
                *playback = Some(handle.play(settings.frame_interval));
                *self.inner.camera_status.lock() = CameraStatus::Live;
                info!("Live preview running");
            }
            Err(e) => {
                error!("Camera unavailable: {}", e);
                *self.inner.camera_status.lock() = CameraStatus::Unavailable(e.to_string());
                self.inner.notifier.notify(Notice::camera_unavailable(&e));
            }
        }
    }

    /// The user trigger. Starts one capture-process-render cycle and returns
    /// its handle, or `None` when a cycle is already running or the camera
    /// is not live.
    pub fn take_photo(&self) -> Option<JoinHandle<CycleOutcome>> {
        {
            let mut state = self.inner.state.lock();
            if *state == InteractionState::Processing {
                debug!("Take photo ignored: previous photo still processing");
                return None;
            }
            if !self.camera_is_live() {
                warn!("Take photo ignored: camera is not live");
                return None;
            }
            *state = InteractionState::Processing;
        }

        info!("Taking photo");
        let guard = CycleGuard {
            inner: Arc::clone(&self.inner),
            settled: false,
        };
        let this = self.clone();
        let task = self.inner.runtime.spawn(async move { this.run_cycle(guard).await });
        *self.inner.cycle.lock() = Some(task.abort_handle());
        Some(task)
    }

    async fn run_cycle(&self, guard: CycleGuard) -> CycleOutcome {
        let started = Instant::now();
        let outcome = match self.capture_process_render().await {
            Ok(()) => {
                info!("Photo processed and rendered in {:?}", started.elapsed());
                CycleOutcome::Rendered
            }
            Err(e) => {
                warn!("Photo cycle failed: {}", e);
                self.inner.notifier.notify(Notice::processing_failed(&e));
                CycleOutcome::Failed(e.to_string())
            }
        };
        guard.settle();
        outcome
    }

    async fn capture_process_render(&self) -> Result<(), CycleError> {
        let frame = self.inner.surface.current_frame().ok_or(CycleError::NoFrame)?;
        let captured = {
            let mut canvas = self.inner.canvas.lock();
            capture::capture(&frame, &mut canvas)
        };
        self.touch_canvas();

        self.inner.gateway.ensure_ready().await?;
        let processed = self.inner.gateway.process(captured).await?;

        self.inner.canvas.lock().put(&processed, 0, 0);
        self.touch_canvas();
        Ok(())
    }

    fn touch_canvas(&self) {
        self.inner.canvas_revision.fetch_add(1, Ordering::SeqCst);
    }

    fn camera_is_live(&self) -> bool {
        !self.inner.shut_down.load(Ordering::SeqCst) && *self.inner.camera_status.lock() == CameraStatus::Live
    }

    /// Stop playback and abort any in-flight cycle.
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        let playback = self.inner.playback.lock().take();
        if let Some(playback) = playback {
            playback.stop();
        }
        if let Some(cycle) = self.inner.cycle.lock().take() {
            cycle.abort();
        }
        info!("Controller shut down");
    }

    pub fn state(&self) -> InteractionState {
        *self.inner.state.lock()
    }

    pub fn button_label(&self) -> &'static str {
        self.state().label()
    }

    /// Whether the trigger control should be enabled.
    pub fn can_take_photo(&self) -> bool {
        self.state() == InteractionState::Idle && self.camera_is_live()
    }

    pub fn camera_status(&self) -> CameraStatus {
        self.inner.camera_status.lock().clone()
    }

    pub fn capture_size(&self) -> u32 {
        self.inner.settings.capture_size
    }

    pub fn frame_interval(&self) -> Duration {
        self.inner.settings.frame_interval
    }

    pub fn surface(&self) -> &VideoSurface {
        &self.inner.surface
    }

    pub fn canvas(&self) -> PixelBuffer {
        self.inner.canvas.lock().clone()
    }

    /// Bumped every time capture or render writes the canvas.
    pub fn canvas_revision(&self) -> u64 {
        self.inner.canvas_revision.load(Ordering::SeqCst)
    }

    pub fn processing_readiness(&self) -> Readiness {
        self.inner.gateway.readiness()
    }

    #[cfg(test)]
    fn is_playing(&self) -> bool {
        self.inner.playback.lock().is_some()
    }
}

/// Returns the controller to `Idle` when a cycle ends, however it ends.
struct CycleGuard {
    inner: Arc<Inner>,
    settled: bool,
}

impl CycleGuard {
    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Photo cycle dropped before it settled");
            self.inner.notifier.notify(Notice::cycle_aborted());
        }
        *self.inner.state.lock() = InteractionState::Idle;
    }
}
