//! posewatch
//!
//! Real-time pose detection over live camera feeds.
//!
//! # Architecture
//!
//! Each camera runs a capture loop that pulls raw frames from a supervised
//! ffmpeg process, sheds frames when it falls behind, and calls a single
//! shared inference worker. Capture loops and the worker never share memory
//! directly: a call puts the model input in an object store under a
//! deterministic key, announces the key basis on a work queue, and waits for
//! the worker to put the result under the matching response key.
//!
//! Results flow to an annotation loop that draws the poses onto the stored
//! frame, publishes it as the camera's live frame, and reports presence
//! changes.
//!
//! # Module Structure
//!
//! - `capture`: per-camera capture loop and skip policy
//! - `detect`: detection client, inference worker, pose engines
//! - `annotate`: annotation loop, drawing, live frames, presence events
//! - `store`: shared object store and key derivation
//! - `supervisor`: terminate / force-kill / respawn state machine
//! - `decoder`: ffmpeg command line, frame-shape probing, frame reads
//! - `rate`, `telemetry`, `clock`: measurement
//! - `config`, `pipeline`: loading settings and wiring the threads

pub mod annotate;
pub mod capture;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod detect;
pub mod frame;
pub mod pipeline;
pub mod rate;
pub mod store;
pub mod supervisor;
pub mod telemetry;

pub use annotate::{AnnotatedFrame, AnnotationLoop, DetectedFrame, LiveFrames, PresenceSink};
pub use capture::{should_skip, CaptureLoop, CaptureSettings, StepOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CameraConfig, PosewatchConfig, StoreLocation};
pub use decoder::{DecoderArgs, DecoderProcess, FrameSource};
pub use detect::{
    DetectionClient, Detections, EngineKind, EngineSpec, InferenceWorker, Keypoint, KeypointLabel,
    Pose, PoseEngine, WorkerThread,
};
pub use frame::{FrameBuffer, FrameShape, FrameView};
pub use pipeline::Pipeline;
pub use rate::RateCounter;
pub use store::{DirStore, MemoryStore, ObjectId, ObjectStore};
pub use supervisor::{Liveness, Supervised, Supervisor, SupervisorConfig, SupervisorState};
pub use telemetry::Telemetry;
