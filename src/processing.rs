use async_trait::async_trait;
use log::{debug, info, warn};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ProcessingError;
use crate::pixel_buffer::PixelBuffer;

/// Result of the capability's transform step. The processed image is
/// wrapped one level: callers unwrap `response.data.payload`.
#[derive(Debug, Clone)]
pub struct ProcessingResponse {
    pub data: ResponseData,
}

#[derive(Debug, Clone)]
pub struct ResponseData {
    pub payload: PixelBuffer,
}

impl ProcessingResponse {
    pub fn new(payload: PixelBuffer) -> Self {
        Self {
            data: ResponseData { payload },
        }
    }
}

/// Opaque image-processing routine with a one-time setup step.
#[async_trait]
pub trait ProcessingCapability: Send + Sync {
    /// One-time initialisation. Resolves when the capability is ready.
    async fn load(&self) -> Result<(), ProcessingError>;

    async fn image_processing(&self, image: PixelBuffer) -> Result<ProcessingResponse, ProcessingError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Initializing,
    Ready,
}

type SharedSetup = Shared<BoxFuture<'static, Result<(), ProcessingError>>>;

enum Setup {
    Uninitialized,
    /// Every caller awaits this one attempt.
    Initializing(SharedSetup),
    Ready,
}

/// Front door to the processing capability: loads it at most once and
/// forwards frames of the capture size to it, one at a time.
pub struct ProcessingGateway {
    capability: Arc<dyn ProcessingCapability>,
    size: u32,
    timeout: Option<Duration>,
    setup: Arc<Mutex<Setup>>,
    in_flight: AtomicBool,
}

impl ProcessingGateway {
    pub fn new(capability: Arc<dyn ProcessingCapability>, size: u32) -> Self {
        Self {
            capability,
            size,
            timeout: None,
            setup: Arc::new(Mutex::new(Setup::Uninitialized)),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Give up on `process` calls that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn readiness(&self) -> Readiness {
        match &*self.setup.lock() {
            Setup::Uninitialized => Readiness::Uninitialized,
            Setup::Initializing(_) => Readiness::Initializing,
            Setup::Ready => Readiness::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    /// Load the capability if that has not happened yet. Callers arriving
    /// while a load is in flight share its outcome, success or failure;
    /// callers arriving after success return immediately. A failed load
    /// leaves the gateway uninitialized so the next call tries again.
    ///
    /// The load runs on its own task, so dropping every caller does not
    /// strand the gateway in `Initializing`.
    pub async fn ensure_ready(&self) -> Result<(), ProcessingError> {
        let attempt = {
            let mut setup = self.setup.lock();
            match &*setup {
                Setup::Ready => return Ok(()),
                Setup::Initializing(attempt) => attempt.clone(),
                Setup::Uninitialized => {
                    let attempt = self.start_load();
                    *setup = Setup::Initializing(attempt.clone());
                    attempt
                }
            }
        };
        attempt.await
    }

    fn start_load(&self) -> SharedSetup {
        let capability = Arc::clone(&self.capability);
        let setup = Arc::clone(&self.setup);
        let name = capability.name().to_string();

        info!("Loading processing capability '{}'", name);
        let started = Instant::now();
        let load = tokio::spawn(async move { capability.load().await });

        let settle = tokio::spawn(async move {
            let result = load
                .await
                .unwrap_or_else(|e| Err(ProcessingError::Load(format!("load task failed: {}", e))));

            match &result {
                Ok(()) => {
                    *setup.lock() = Setup::Ready;
                    info!("Processing capability '{}' ready in {:?}", name, started.elapsed());
                }
                Err(e) => {
                    *setup.lock() = Setup::Uninitialized;
                    warn!("Processing capability '{}' failed to load: {}", name, e);
                }
            }
            result
        });

        async move {
            settle
                .await
                .unwrap_or_else(|e| Err(ProcessingError::Load(format!("load task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    /// Transform `input` and return the unwrapped payload. Requires a
    /// completed [`ensure_ready`](Self::ensure_ready); both the input and the
    /// output must be `size` x `size`.
    pub async fn process(&self, input: PixelBuffer) -> Result<PixelBuffer, ProcessingError> {
        if !self.is_ready() {
            return Err(ProcessingError::NotReady);
        }
        self.check_dimensions(&input)?;

        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(ProcessingError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let started = Instant::now();
        let call = self.capability.image_processing(input);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProcessingError::TimedOut(limit))??,
            None => call.await?,
        };
        debug!("Processing finished in {:?}", started.elapsed());

        let output = response.data.payload;
        self.check_dimensions(&output)?;
        Ok(output)
    }

    fn check_dimensions(&self, buffer: &PixelBuffer) -> Result<(), ProcessingError> {
        if buffer.is_square_of(self.size) {
            Ok(())
        } else {
            Err(ProcessingError::Dimensions {
                expected: self.size,
                width: buffer.width(),
                height: buffer.height(),
            })
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCapability, FakeResult};
    use image::Rgba;

    const SIZE: u32 = 20;
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn gateway(capability: &Arc<FakeCapability>) -> ProcessingGateway {
        ProcessingGateway::new(capability.clone(), SIZE)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_ensure_ready_loads_once() {
        let capability = Arc::new(FakeCapability::new().load_delay(Duration::from_millis(50)));
        let gateway = gateway(&capability);

        let (a, b, c) = tokio::join!(gateway.ensure_ready(), gateway.ensure_ready(), gateway.ensure_ready());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        for _ in 0..5 {
            gateway.ensure_ready().await.unwrap();
        }
        assert_eq!(capability.loads(), 1);
        assert_eq!(gateway.readiness(), Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_a_failed_load() {
        let capability = Arc::new(
            FakeCapability::new()
                .load_delay(Duration::from_millis(50))
                .failing_loads(1),
        );
        let gateway = gateway(&capability);
        let started = tokio::time::Instant::now();

        let (a, b, c) = tokio::join!(gateway.ensure_ready(), gateway.ensure_ready(), gateway.ensure_ready());

        for result in [a, b, c] {
            assert!(matches!(result, Err(ProcessingError::Load(_))));
        }
        assert_eq!(capability.loads(), 1);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(gateway.readiness(), Readiness::Uninitialized);

        gateway.ensure_ready().await.unwrap();
        assert_eq!(capability.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_load_still_settles() {
        let capability = Arc::new(FakeCapability::new().load_delay(Duration::from_secs(60)));
        let gateway = Arc::new(gateway(&capability));

        let caller = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.ensure_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(gateway.readiness(), Readiness::Ready);
        gateway.ensure_ready().await.unwrap();
        assert_eq!(capability.loads(), 1);
    }

    #[tokio::test]
    async fn panicking_load_leaves_gateway_retryable() {
        let capability = Arc::new(FakeCapability::new().panicking_loads(1));
        let gateway = gateway(&capability);

        assert!(matches!(gateway.ensure_ready().await, Err(ProcessingError::Load(_))));
        assert_eq!(gateway.readiness(), Readiness::Uninitialized);

        gateway.ensure_ready().await.unwrap();
        assert_eq!(capability.loads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_reports_in_flight_load() {
        let capability = Arc::new(FakeCapability::new().load_delay(Duration::from_millis(50)));
        let gateway = Arc::new(gateway(&capability));
        assert_eq!(gateway.readiness(), Readiness::Uninitialized);

        let loading = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.ensure_ready().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.readiness(), Readiness::Initializing);

        loading.await.unwrap().unwrap();
        assert_eq!(gateway.readiness(), Readiness::Ready);
    }

    #[tokio::test]
    async fn failed_load_can_be_retried() {
        let capability = Arc::new(FakeCapability::new().failing_loads(1));
        let gateway = gateway(&capability);

        assert!(matches!(gateway.ensure_ready().await, Err(ProcessingError::Load(_))));
        assert_eq!(gateway.readiness(), Readiness::Uninitialized);

        gateway.ensure_ready().await.unwrap();
        assert_eq!(capability.loads(), 2);
        assert!(gateway.is_ready());
    }

    #[tokio::test]
    async fn process_requires_ready() {
        let capability = Arc::new(FakeCapability::new());
        let gateway = gateway(&capability);

        let result = gateway.process(PixelBuffer::new(SIZE)).await;

        assert!(matches!(result, Err(ProcessingError::NotReady)));
        assert_eq!(capability.calls(), 0);
    }

    #[tokio::test]
    async fn process_unwraps_payload() {
        let capability = Arc::new(FakeCapability::new().result(FakeResult::Fill(BLACK)));
        let gateway = gateway(&capability);
        gateway.ensure_ready().await.unwrap();

        let output = gateway.process(PixelBuffer::filled(SIZE, Rgba([9, 9, 9, 255]))).await.unwrap();

        assert!(output.is_square_of(SIZE));
        assert!(output.is_uniform(BLACK));
    }

    #[tokio::test]
    async fn wrong_input_size_never_reaches_capability() {
        let capability = Arc::new(FakeCapability::new());
        let gateway = gateway(&capability);
        gateway.ensure_ready().await.unwrap();

        let result = gateway.process(PixelBuffer::new(SIZE + 1)).await;

        assert!(matches!(result, Err(ProcessingError::Dimensions { expected: SIZE, .. })));
        assert_eq!(capability.calls(), 0);
    }

    #[tokio::test]
    async fn wrong_output_size_is_rejected() {
        let capability = Arc::new(FakeCapability::new().result(FakeResult::Resize(SIZE / 2)));
        let gateway = gateway(&capability);
        gateway.ensure_ready().await.unwrap();

        let result = gateway.process(PixelBuffer::new(SIZE)).await;

        assert!(matches!(
            result,
            Err(ProcessingError::Dimensions { expected: SIZE, width: 10, height: 10 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_process_calls_are_refused() {
        let capability = Arc::new(FakeCapability::new().process_delay(Duration::from_millis(100)));
        let gateway = gateway(&capability);
        gateway.ensure_ready().await.unwrap();

        let (first, second) = tokio::join!(
            gateway.process(PixelBuffer::new(SIZE)),
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                gateway.process(PixelBuffer::new(SIZE)).await
            }
        );

        assert!(first.is_ok());
        assert!(matches!(second, Err(ProcessingError::Busy)));
        assert_eq!(capability.max_in_flight(), 1);

        gateway.process(PixelBuffer::new(SIZE)).await.unwrap();
        assert_eq!(capability.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn optional_timeout_gives_up() {
        let capability = Arc::new(FakeCapability::new().process_delay(Duration::from_secs(10)));
        let gateway = gateway(&capability).with_timeout(Some(Duration::from_secs(1)));
        gateway.ensure_ready().await.unwrap();

        let result = gateway.process(PixelBuffer::new(SIZE)).await;

        assert!(matches!(result, Err(ProcessingError::TimedOut(_))));
        let retry = gateway.process(PixelBuffer::new(SIZE)).await;
        assert!(matches!(retry, Err(ProcessingError::TimedOut(_))));
    }
}
