use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{RequestBasis, WorkSender};
use super::result::Detections;
use crate::clock::Clock;
use crate::rate::RateCounter;
use crate::store::ObjectStore;

/// Default time a detection call waits for its response.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-camera handle for calling the shared inference worker.
///
/// A call puts the tensor in the store, announces the basis on the work
/// queue, and waits for the response key. A call that times out returns empty
/// detections: the capture loop stays live at the cost of completeness.
pub struct DetectionClient {
    camera: String,
    store: Arc<dyn ObjectStore>,
    queue: WorkSender,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    fps: RateCounter,
}

impl DetectionClient {
    pub fn new(
        camera: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        queue: WorkSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            camera: camera.into(),
            store,
            queue,
            clock,
            timeout: DEFAULT_DETECT_TIMEOUT,
            fps: RateCounter::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    /// Start the client's rate counter.
    pub fn start(&mut self) {
        self.fps.start_at(self.clock.now());
    }

    /// Completed detections per second over `window`.
    pub fn eps(&self, window: f64) -> f64 {
        self.fps.eps_at(self.clock.now(), window)
    }

    pub fn detect(&mut self, tensor: &[u8]) -> Result<Detections> {
        let basis = RequestBasis::new(self.camera.clone(), self.clock.now());
        let (request_key, response_key) = basis.keys();

        self.store.put(&request_key, tensor)?;
        if self.queue.send(basis.to_string()).is_err() {
            self.store.delete(&[request_key])?;
            return Err(anyhow!("[{}] detection work queue is closed", self.camera));
        }

        let Some(raw) = self.store.get(&response_key, self.timeout)? else {
            log::debug!("[{}] detection timed out for {}", self.camera, basis);
            self.store.delete(&[request_key, response_key])?;
            return Ok(Detections::empty());
        };

        self.store.delete(&[request_key, response_key])?;
        self.fps.update_at(self.clock.now());

        match Detections::from_bytes(&raw) {
            Ok(detections) => Ok(detections),
            Err(e) => {
                log::warn!("[{}] discarding unreadable detections: {:#}", self.camera, e);
                Ok(Detections::empty())
            }
        }
    }
}
