//! Test doubles for the camera, the processing capability and the notice sink.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::camera_controller::{CameraDevice, CameraRequest, VideoStream};
use crate::error::{CameraError, ProcessingError};
use crate::notify::{Notice, NoticeKind, Notifier};
use crate::pixel_buffer::PixelBuffer;
use crate::processing::{ProcessingCapability, ProcessingResponse};

enum FakeFrames {
    Solid(Rgba<u8>),
    Counting,
    Failing(CameraError),
    Empty,
}

pub struct FakeCamera {
    frames: FakeFrames,
    frame_size: Option<(u32, u32)>,
    open_delay: Duration,
    opens: AtomicUsize,
}

impl FakeCamera {
    fn with(frames: FakeFrames) -> Self {
        Self {
            frames,
            frame_size: None,
            open_delay: Duration::ZERO,
            opens: AtomicUsize::new(0),
        }
    }

    /// Endless frames of one color.
    pub fn solid(color: Rgba<u8>) -> Self {
        Self::with(FakeFrames::Solid(color))
    }

    /// Endless frames whose red channel counts up.
    pub fn counting() -> Self {
        Self::with(FakeFrames::Counting)
    }

    pub fn failing(error: CameraError) -> Self {
        Self::with(FakeFrames::Failing(error))
    }

    /// Opens, but the stream ends before the first frame.
    pub fn empty() -> Self {
        Self::with(FakeFrames::Empty)
    }

    /// Deliver frames of this size instead of the requested one.
    pub fn frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = Some((width, height));
        self
    }

    /// Take this long to open, like a device asking for permission.
    pub fn open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(&self, request: &CameraRequest) -> Result<Box<dyn VideoStream>, CameraError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let (width, height) = self.frame_size.unwrap_or((request.width, request.height));
        let color = match &self.frames {
            FakeFrames::Failing(error) => return Err(error.clone()),
            FakeFrames::Empty => None,
            FakeFrames::Solid(color) => Some(*color),
            FakeFrames::Counting => Some(Rgba([0, 0, 0, 255])),
        };
        Ok(Box::new(FakeStream {
            width,
            height,
            color,
            counting: matches!(self.frames, FakeFrames::Counting),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeStream {
    width: u32,
    height: u32,
    color: Option<Rgba<u8>>,
    counting: bool,
}

#[async_trait]
impl VideoStream for FakeStream {
    async fn next_frame(&mut self) -> Result<Option<RgbaImage>, CameraError> {
        let Some(color) = self.color else {
            return Ok(None);
        };
        if self.counting {
            let mut next = color;
            next[0] = next[0].wrapping_add(1);
            self.color = Some(next);
        }
        Ok(Some(RgbaImage::from_pixel(self.width, self.height, color)))
    }
}

#[derive(Debug, Clone)]
pub enum FakeResult {
    /// Echo the input back.
    Echo,
    Fill(Rgba<u8>),
    Resize(u32),
    Fail(String),
    Panic,
}

pub struct FakeCapability {
    load_delay: Duration,
    process_delay: Duration,
    failing_loads: AtomicUsize,
    panicking_loads: AtomicUsize,
    result: FakeResult,
    loads: AtomicUsize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeCapability {
    pub fn new() -> Self {
        Self {
            load_delay: Duration::ZERO,
            process_delay: Duration::ZERO,
            failing_loads: AtomicUsize::new(0),
            panicking_loads: AtomicUsize::new(0),
            result: FakeResult::Echo,
            loads: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn process_delay(mut self, delay: Duration) -> Self {
        self.process_delay = delay;
        self
    }

    /// The first `count` loads fail.
    pub fn failing_loads(self, count: usize) -> Self {
        self.failing_loads.store(count, Ordering::SeqCst);
        self
    }

    /// The first `count` loads panic.
    pub fn panicking_loads(self, count: usize) -> Self {
        self.panicking_loads.store(count, Ordering::SeqCst);
        self
    }

    pub fn result(mut self, result: FakeResult) -> Self {
        self.result = result;
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessingCapability for FakeCapability {
    async fn load(&self) -> Result<(), ProcessingError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let panics = self.panicking_loads.load(Ordering::SeqCst);
        if panics > 0 {
            self.panicking_loads.store(panics - 1, Ordering::SeqCst);
            panic!("capability setup crashed");
        }
        let remaining = self.failing_loads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_loads.store(remaining - 1, Ordering::SeqCst);
            return Err(ProcessingError::Load("capability unavailable".into()));
        }
        Ok(())
    }

    async fn image_processing(&self, image: PixelBuffer) -> Result<ProcessingResponse, ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.process_delay.is_zero() {
            tokio::time::sleep(self.process_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (size, _) = image.dimensions();
        match &self.result {
            FakeResult::Echo => Ok(ProcessingResponse::new(image)),
            FakeResult::Fill(color) => Ok(ProcessingResponse::new(PixelBuffer::filled(size, *color))),
            FakeResult::Resize(other) => Ok(ProcessingResponse::new(PixelBuffer::new(*other))),
            FakeResult::Fail(reason) => Err(ProcessingError::Transform(reason.clone())),
            FakeResult::Panic => panic!("capability crashed"),
        }
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn count(&self, kind: NoticeKind) -> usize {
        self.notices.lock().iter().filter(|n| n.kind == kind).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}
