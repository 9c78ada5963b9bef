//! Shared numeric telemetry cells.
//!
//! Each gauge has exactly one writer (the loop that owns the measurement) and
//! any number of readers. Values are `f64` stored as bits in an `AtomicU64`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Gauge {
    bits: AtomicU64,
}

impl Gauge {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Rates published by one camera's capture loop.
#[derive(Debug, Default)]
pub struct CameraTelemetry {
    pub capture_fps: Gauge,
    pub skipped_fps: Gauge,
    pub detection_fps: Gauge,
}

impl CameraTelemetry {
    pub fn snapshot(&self) -> CameraSnapshot {
        CameraSnapshot {
            capture_fps: self.capture_fps.get(),
            skipped_fps: self.skipped_fps.get(),
            detection_fps: self.detection_fps.get(),
        }
    }
}

/// Inference worker latency figures.
#[derive(Debug)]
pub struct DetectorTelemetry {
    /// EWMA of inference latency in seconds.
    pub avg_inference_speed: Gauge,
    /// Start time of the in-flight inference, 0.0 when idle.
    pub detection_start: Gauge,
}

impl Default for DetectorTelemetry {
    fn default() -> Self {
        Self {
            avg_inference_speed: Gauge::new(0.01),
            detection_start: Gauge::new(0.0),
        }
    }
}

impl DetectorTelemetry {
    pub fn snapshot(&self) -> DetectorSnapshot {
        DetectorSnapshot {
            avg_inference_speed: self.avg_inference_speed.get(),
            detection_start: self.detection_start.get(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct CameraSnapshot {
    pub capture_fps: f64,
    pub skipped_fps: f64,
    pub detection_fps: f64,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct DetectorSnapshot {
    pub avg_inference_speed: f64,
    pub detection_start: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub cameras: BTreeMap<String, CameraSnapshot>,
    pub detector: DetectorSnapshot,
}

/// Registry of every telemetry cell in the pipeline.
#[derive(Debug, Default)]
pub struct Telemetry {
    cameras: BTreeMap<String, Arc<CameraTelemetry>>,
    detector: Arc<DetectorTelemetry>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a camera, returning its cells. Registering twice returns the same cells.
    pub fn register_camera(&mut self, name: &str) -> Arc<CameraTelemetry> {
        self.cameras
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CameraTelemetry::default()))
            .clone()
    }

    pub fn camera(&self, name: &str) -> Option<Arc<CameraTelemetry>> {
        self.cameras.get(name).cloned()
    }

    pub fn detector(&self) -> Arc<DetectorTelemetry> {
        self.detector.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            cameras: self
                .cameras
                .iter()
                .map(|(name, cells)| (name.clone(), cells.snapshot()))
                .collect(),
            detector: self.detector.snapshot(),
        }
    }
}
