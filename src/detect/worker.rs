use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::backend::{EngineFactory, PoseEngine};
use super::client::DEFAULT_DETECT_TIMEOUT;
use super::protocol::{RequestBasis, WorkQueue};
use super::result::Detections;
use crate::clock::Clock;
use crate::store::ObjectStore;
use crate::supervisor::{Liveness, Supervised};
use crate::telemetry::DetectorTelemetry;

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    /// Matches the client's call timeout. Requests older than this are dropped.
    pub request_timeout: Duration,
    /// How long one queue pop blocks before re-checking for shutdown.
    pub pop_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_DETECT_TIMEOUT,
            pop_interval: Duration::from_millis(250),
        }
    }
}

/// What happened to one work item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    Served,
    /// The caller already gave up on this request.
    Stale,
    /// The request payload never became visible.
    Missing,
    Malformed,
}

/// Single consumer of the work queue. Owns the inference engine.
pub struct InferenceWorker {
    engine: Box<dyn PoseEngine>,
    store: Arc<dyn ObjectStore>,
    queue: WorkQueue,
    telemetry: Arc<DetectorTelemetry>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
}

impl InferenceWorker {
    pub fn new(
        engine: Box<dyn PoseEngine>,
        store: Arc<dyn ObjectStore>,
        queue: WorkQueue,
        telemetry: Arc<DetectorTelemetry>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            queue,
            telemetry,
            clock,
            config,
        }
    }

    /// Serve work items until `shutdown` is set or every producer is gone.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        log::info!("inference worker running with '{}' engine", self.engine.name());
        while !shutdown.load(Ordering::SeqCst) {
            let popped = {
                let queue = self
                    .queue
                    .lock()
                    .map_err(|_| anyhow!("work queue lock poisoned"))?;
                queue.recv_timeout(self.config.pop_interval)
            };
            match popped {
                Ok(basis) => {
                    self.serve(&basis)?;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("work queue closed, inference worker exiting");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Serve one basis popped from the work queue.
    pub fn serve(&mut self, basis: &str) -> Result<ServeOutcome> {
        let request = match RequestBasis::parse(basis) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("dropping work item: {:#}", e);
                return Ok(ServeOutcome::Malformed);
            }
        };
        let timeout = self.config.request_timeout.as_secs_f64();
        let age = request.age(self.clock.now());
        if age > timeout {
            log::debug!("dropping stale request {} ({:.1}s old)", request, age);
            return Ok(ServeOutcome::Stale);
        }

        let (request_key, response_key) = request.keys();
        // Wait out a producer whose put is not yet visible, bounded by the
        // time the caller is still listening.
        let remaining = Duration::from_secs_f64((timeout - age).max(0.0));
        let Some(tensor) = self.store.get(&request_key, remaining)? else {
            log::debug!("request payload for {} never arrived", request);
            return Ok(ServeOutcome::Missing);
        };

        self.telemetry.detection_start.set(self.clock.now());
        let started = Instant::now();
        let estimated = self.engine.estimate(&tensor);
        let duration = started.elapsed().as_secs_f64();
        self.telemetry.detection_start.set(0.0);

        let poses = match estimated {
            Ok(poses) => poses,
            Err(e) => {
                log::warn!("inference failed for {}: {:#}", request, e);
                Vec::new()
            }
        };

        if request.age(self.clock.now()) > timeout {
            log::debug!("request {} went stale during inference", request);
            return Ok(ServeOutcome::Stale);
        }
        let payload = Detections::from(poses).to_bytes()?;
        self.store.put(&response_key, &payload)?;

        let avg = self.telemetry.avg_inference_speed.get();
        self.telemetry
            .avg_inference_speed
            .set((avg * 9.0 + duration) / 10.0);
        log::trace!("inference for {} took {:.1}ms", request, duration * 1000.0);
        Ok(ServeOutcome::Served)
    }
}

/// Handle on a worker running on its own thread.
///
/// The engine is opened on the worker thread itself; if that fails the
/// thread ends with an error and the supervisor sees the exit.
pub struct WorkerThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl WorkerThread {
    pub fn spawn(
        factory: EngineFactory,
        store: Arc<dyn ObjectStore>,
        queue: WorkQueue,
        telemetry: Arc<DetectorTelemetry>,
        clock: Arc<dyn Clock>,
        config: WorkerConfig,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let handle = std::thread::Builder::new()
            .name("inference-worker".to_string())
            .spawn(move || {
                let mut engine = factory().context("failed to open inference engine")?;
                engine.warm_up().context("inference engine warm-up failed")?;
                telemetry.detection_start.set(0.0);
                let mut worker =
                    InferenceWorker::new(engine, store, queue, telemetry, clock, config);
                worker.run(&stop_thread)
            })
            .context("failed to spawn inference worker thread")?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Supervised for WorkerThread {
    fn poll(&mut self) -> Result<Liveness> {
        let finished = match &self.handle {
            Some(handle) => handle.is_finished(),
            None => return Ok(Liveness::Exited(None)),
        };
        if !finished {
            return Ok(Liveness::Alive);
        }
        let Some(handle) = self.handle.take() else {
            return Ok(Liveness::Exited(None));
        };
        match handle.join() {
            Ok(Ok(())) => Ok(Liveness::Exited(Some(0))),
            Ok(Err(e)) => {
                log::error!("inference worker failed: {:#}", e);
                Ok(Liveness::Exited(Some(1)))
            }
            Err(_) => {
                log::error!("inference worker panicked");
                Ok(Liveness::Exited(None))
            }
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        // Threads cannot be killed; detach it with the stop flag raised.
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.take().is_some() {
            log::warn!("detached an unresponsive inference worker thread");
        }
        Ok(())
    }
}
