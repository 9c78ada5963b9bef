//! Per-camera capture loop.
//!
//! Reads fixed-size frames from a supervised decoder, applies the stride and
//! skip policies, calls the detection client, and hands results to the
//! annotation loop. The blocking decoder read is the loop's backpressure
//! point: a slow detector slows reads, and the skip policy sheds frames when
//! the loop falls behind its target rate.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::annotate::{AnnotationSender, DetectedFrame};
use crate::clock::Clock;
use crate::decoder::FrameSource;
use crate::detect::DetectionClient;
use crate::frame::{create_tensor_input, FrameBuffer, FrameShape, FrameView};
use crate::rate::{RateCounter, DEFAULT_WINDOW_SECS};
use crate::store::{frame_key, ObjectStore};
use crate::supervisor::{Supervised, Supervisor};
use crate::telemetry::CameraTelemetry;

/// Frames read before the skip policy may engage.
pub const WARMUP_FRAMES: u64 = 100;

/// Sleep after restarting a dead decoder.
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(10);

/// Drop a frame when the loop is behind its target rate and the frame
/// arrived much faster than usual (it was sitting in the pipe buffer).
pub fn should_skip(frame_num: u64, fps: f64, target_fps: f64, wait: f64, avg_wait: f64) -> bool {
    frame_num > WARMUP_FRAMES && fps < target_fps - 1.0 && wait < 0.5 * avg_wait
}

#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub camera: String,
    pub target_fps: f64,
    pub shape: FrameShape,
    /// Only every `take_frame`-th frame is processed.
    pub take_frame: u64,
    /// Model input shape the tensor is resized to.
    pub tensor_shape: FrameShape,
    pub restart_backoff: Duration,
    pub eps_window: f64,
}

impl CaptureSettings {
    pub fn new(camera: impl Into<String>, target_fps: f64, shape: FrameShape, tensor_shape: FrameShape) -> Self {
        Self {
            camera: camera.into(),
            target_fps,
            shape,
            take_frame: 1,
            tensor_shape,
            restart_backoff: DEFAULT_RESTART_BACKOFF,
            eps_window: DEFAULT_WINDOW_SECS,
        }
    }
}

/// What one `step` did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepOutcome {
    /// Short read from a decoder that is still alive.
    Stalled,
    /// The decoder had died and a restart was attempted.
    Restarted,
    /// Frame discarded by the stride.
    Strided,
    /// Frame discarded by the skip policy.
    Skipped,
    Detected { frame_time: f64, poses: usize },
}

pub struct CaptureLoop<P: Supervised + FrameSource> {
    settings: CaptureSettings,
    decoder: Supervisor<P>,
    client: DetectionClient,
    store: Arc<dyn ObjectStore>,
    annotations: AnnotationSender,
    clock: Arc<dyn Clock>,
    telemetry: Arc<CameraTelemetry>,
    buffer: FrameBuffer,
    chunk: Vec<u8>,
    frame_num: u64,
    avg_wait: f64,
    fps: RateCounter,
    skipped: RateCounter,
}

impl<P: Supervised + FrameSource> CaptureLoop<P> {
    pub fn new(
        settings: CaptureSettings,
        decoder: Supervisor<P>,
        client: DetectionClient,
        store: Arc<dyn ObjectStore>,
        annotations: AnnotationSender,
        clock: Arc<dyn Clock>,
        telemetry: Arc<CameraTelemetry>,
    ) -> Self {
        let shape = settings.shape;
        Self {
            settings,
            decoder,
            client,
            store,
            annotations,
            clock,
            telemetry,
            buffer: FrameBuffer::new(shape),
            chunk: vec![0u8; shape.byte_len()],
            frame_num: 0,
            avg_wait: 0.0,
            fps: RateCounter::new(),
            skipped: RateCounter::new(),
        }
    }

    pub fn camera(&self) -> &str {
        &self.settings.camera
    }

    /// Read-only handle onto the most recent frame.
    pub fn frame_view(&self) -> FrameView {
        self.buffer.view()
    }

    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }

    pub fn avg_wait(&self) -> f64 {
        self.avg_wait
    }

    pub fn restart_count(&self) -> u32 {
        self.decoder.restart_count()
    }

    /// Frames captured per second over the configured window.
    pub fn capture_eps(&self) -> f64 {
        self.fps.eps_at(self.clock.now(), self.settings.eps_window)
    }

    /// Frames skipped per second over the configured window.
    pub fn skipped_eps(&self) -> f64 {
        self.skipped.eps_at(self.clock.now(), self.settings.eps_window)
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Launch the decoder and start the rate counters.
    pub fn start(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.fps.start_at(now);
        self.skipped.start_at(now);
        self.client.start();
        if let Err(e) = self.decoder.start_or_restart() {
            log::error!("[{}] decoder failed to start: {:#}", self.settings.camera, e);
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<StepOutcome> {
        let camera = self.settings.camera.as_str();
        let started = self.clock.now();
        let read = match self.decoder.process_mut() {
            Some(decoder) => decoder.read_frame(&mut self.chunk).unwrap_or_else(|e| {
                log::warn!("[{}] decoder read failed: {:#}", camera, e);
                0
            }),
            None => 0,
        };
        let wait = self.clock.now() - started;
        self.avg_wait = (self.avg_wait * 99.0 + wait) / 100.0;

        if read < self.chunk.len() {
            if self.decoder.is_running()? {
                log::warn!(
                    "[{}] decoder is running but returned {} of {} bytes",
                    camera,
                    read,
                    self.chunk.len()
                );
                return Ok(StepOutcome::Stalled);
            }
            log::error!("[{}] decoder exited unexpectedly, restarting", camera);
            if let Err(e) = self.decoder.start_or_restart() {
                log::error!("[{}] decoder restart failed: {:#}", camera, e);
            }
            if !self.settings.restart_backoff.is_zero() {
                std::thread::sleep(self.settings.restart_backoff);
            }
            return Ok(StepOutcome::Restarted);
        }

        self.frame_num += 1;
        if self.frame_num % self.settings.take_frame != 0 {
            return Ok(StepOutcome::Strided);
        }

        let frame_time = self.clock.now();
        let window = self.settings.eps_window;
        self.fps.update_at(frame_time);
        let fps = self.fps.eps_at(frame_time, window);
        self.telemetry.capture_fps.set(fps);
        self.telemetry.detection_fps.set(self.client.eps(window));

        self.buffer.copy_from(&self.chunk)?;

        if should_skip(
            self.frame_num,
            fps,
            self.settings.target_fps,
            wait,
            self.avg_wait,
        ) {
            self.skipped.update_at(frame_time);
            self.telemetry
                .skipped_fps
                .set(self.skipped.eps_at(frame_time, window));
            return Ok(StepOutcome::Skipped);
        }
        self.telemetry
            .skipped_fps
            .set(self.skipped.eps_at(frame_time, window));

        let shape = self.settings.shape;
        let tensor_shape = self.settings.tensor_shape;
        let tensor = self
            .buffer
            .with_pixels(|pixels| create_tensor_input(pixels, shape, tensor_shape))??;
        let detections = self.client.detect(&tensor)?;
        let poses = detections.len();

        self.store.put(&frame_key(camera, frame_time), &self.chunk)?;
        self.annotations
            .send(DetectedFrame {
                camera: camera.to_string(),
                frame_time,
                detections,
            })
            .map_err(|_| anyhow!("[{}] annotation queue is closed", camera))?;

        Ok(StepOutcome::Detected { frame_time, poses })
    }

    /// Step until `shutdown` is set, then stop the decoder.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        self.start()?;
        log::info!("[{}] capture loop running", self.settings.camera);
        let result = loop {
            if shutdown.load(Ordering::SeqCst) {
                break Ok(());
            }
            if let Err(e) = self.step() {
                break Err(e);
            }
        };
        if let Err(e) = self.decoder.stop() {
            log::warn!("[{}] failed to stop decoder: {:#}", self.settings.camera, e);
        }
        log::info!("[{}] capture loop exiting", self.settings.camera);
        result
    }
}
