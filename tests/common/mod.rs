#![allow(dead_code)]

use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use posewatch::decoder::FrameSource;
use posewatch::detect::{work_queue, InferenceWorker, StubEngine, WorkSender, WorkerConfig};
use posewatch::frame::FrameShape;
use posewatch::store::ObjectStore;
use posewatch::supervisor::{Liveness, Supervised};
use posewatch::telemetry::DetectorTelemetry;
use posewatch::{Clock, ManualClock};

/// In-process stand-in for the ffmpeg decoder.
///
/// Each read advances the shared manual clock by the next entry of `waits`
/// (cycling), so the capture loop measures exactly that read wait.
pub struct SyntheticDecoder {
    clock: Arc<ManualClock>,
    waits: Vec<f64>,
    remaining: usize,
    served: usize,
    /// Bytes returned once the frames run out.
    tail: usize,
    exit_when_drained: bool,
    stopped: bool,
}

impl SyntheticDecoder {
    pub fn new(clock: Arc<ManualClock>, frames: usize, wait: f64) -> Self {
        Self {
            clock,
            waits: vec![wait],
            remaining: frames,
            served: 0,
            tail: 0,
            exit_when_drained: true,
            stopped: false,
        }
    }

    pub fn with_waits(mut self, waits: Vec<f64>) -> Self {
        self.waits = waits;
        self
    }

    /// Keep running after the last frame, returning `tail` bytes per read.
    pub fn stalling(mut self, tail: usize) -> Self {
        self.exit_when_drained = false;
        self.tail = tail;
        self
    }
}

impl FrameSource for SyntheticDecoder {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.stopped {
            return Ok(0);
        }
        if self.remaining == 0 {
            let n = self.tail.min(buf.len());
            return Ok(n);
        }
        let wait = self.waits[self.served % self.waits.len()];
        self.clock.advance(wait);
        let value = (self.served % 251) as u8;
        buf.fill(value);
        self.served += 1;
        self.remaining -= 1;
        Ok(buf.len())
    }
}

impl Supervised for SyntheticDecoder {
    fn poll(&mut self) -> Result<Liveness> {
        if self.stopped || (self.exit_when_drained && self.remaining == 0) {
            Ok(Liveness::Exited(Some(0)))
        } else {
            Ok(Liveness::Alive)
        }
    }

    fn terminate(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}

/// Spawn function for a supervisor that counts how often it was called.
pub fn synthetic_spawner(
    clock: Arc<ManualClock>,
    frames: usize,
    wait: f64,
) -> (Arc<AtomicUsize>, impl FnMut() -> Result<SyntheticDecoder> + Send + 'static) {
    let spawned = Arc::new(AtomicUsize::new(0));
    let counter = spawned.clone();
    let spawn = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(SyntheticDecoder::new(clock.clone(), frames, wait))
    };
    (spawned, spawn)
}

/// An inference worker with a stub engine, running on its own thread.
pub struct RunningWorker {
    pub sender: WorkSender,
    pub telemetry: Arc<DetectorTelemetry>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl RunningWorker {
    pub fn start(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>, input: FrameShape) -> Self {
        let (sender, queue) = work_queue();
        let telemetry = Arc::new(DetectorTelemetry::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut worker = InferenceWorker::new(
            Box::new(StubEngine::with_person(input)),
            store,
            queue,
            telemetry.clone(),
            clock,
            WorkerConfig::default(),
        );
        let flag = shutdown.clone();
        let handle = std::thread::spawn(move || worker.run(&flag));
        Self {
            sender,
            telemetry,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle.join().expect("worker thread panicked"),
            None => Ok(()),
        }
    }
}
