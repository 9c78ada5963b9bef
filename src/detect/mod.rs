//! Detection RPC between capture loops and the inference worker.
//!
//! Each camera owns a [`DetectionClient`]. All clients share one work queue
//! and one object store with a single [`InferenceWorker`], which is the only
//! holder of the pose engine.

mod backend;
mod backends;
mod client;
mod protocol;
mod registry;
mod result;
mod worker;

pub use backend::{EngineFactory, PoseEngine};
pub use backends::{standing_pose, StubEngine};
#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
pub use client::{DetectionClient, DEFAULT_DETECT_TIMEOUT};
pub use protocol::{work_queue, RequestBasis, WorkQueue, WorkSender};
pub use registry::{EngineKind, EngineSpec};
pub use result::{Detections, Keypoint, KeypointLabel, Pose};
pub use worker::{InferenceWorker, ServeOutcome, WorkerConfig, WorkerThread};
