//! Annotation loop.
//!
//! Consumes `(camera, frame_time, detections)` messages from the capture
//! loops, draws the poses onto the stored frame, and publishes it as the
//! camera's live frame. Each camera retains at most one stored frame: the
//! previous key is deleted before the new one is retained.

mod draw;
mod live;
mod presence;

pub use draw::{draw_pose, Canvas, Color, DEFAULT_KEYPOINT_THRESHOLD, EDGES};
pub use live::{AnnotatedFrame, LiveFrames};
pub use presence::{
    LogPresenceSink, PresenceSink, PresenceStatus, DEFAULT_PRESENCE_THRESHOLD, PERSON,
};

use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::detect::{Detections, Pose};
use crate::frame::FrameShape;
use crate::store::{frame_key, ObjectId, ObjectStore};

/// One capture loop result handed to the annotation loop.
#[derive(Clone, Debug)]
pub struct DetectedFrame {
    pub camera: String,
    pub frame_time: f64,
    pub detections: Detections,
}

pub type AnnotationSender = Sender<DetectedFrame>;
pub type AnnotationReceiver = Receiver<DetectedFrame>;

pub fn annotation_queue() -> (AnnotationSender, AnnotationReceiver) {
    mpsc::channel()
}

#[derive(Clone, Copy, Debug)]
pub struct AnnotationSettings {
    /// Model input shape; keypoints arrive in this coordinate space.
    pub tensor_shape: FrameShape,
    pub keypoint_threshold: f32,
    pub presence_threshold: f32,
    pub pop_interval: Duration,
}

impl AnnotationSettings {
    pub fn new(tensor_shape: FrameShape) -> Self {
        Self {
            tensor_shape,
            keypoint_threshold: DEFAULT_KEYPOINT_THRESHOLD,
            presence_threshold: DEFAULT_PRESENCE_THRESHOLD,
            pop_interval: Duration::from_millis(250),
        }
    }
}

/// What `process` did with one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Annotated,
    /// The stored frame was gone or unusable; only tracking state was updated.
    FrameMissing,
    UnknownCamera,
}

/// Per-camera state owned by the annotation loop.
#[derive(Debug)]
pub struct CameraState {
    shape: FrameShape,
    status: PresenceStatus,
    tracked: Vec<Pose>,
    current_frame: Option<Arc<AnnotatedFrame>>,
    retained: Option<ObjectId>,
}

impl CameraState {
    fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            status: PresenceStatus::default(),
            tracked: Vec::new(),
            current_frame: None,
            retained: None,
        }
    }

    pub fn tracked(&self) -> &[Pose] {
        &self.tracked
    }

    pub fn current_frame(&self) -> Option<&Arc<AnnotatedFrame>> {
        self.current_frame.as_ref()
    }

    pub fn retained_key(&self) -> Option<ObjectId> {
        self.retained
    }

    pub fn is_present(&self, label: &str) -> bool {
        self.status.is_present(label)
    }
}

pub struct AnnotationLoop {
    store: Arc<dyn ObjectStore>,
    live: LiveFrames,
    sink: Box<dyn PresenceSink>,
    settings: AnnotationSettings,
    shapes: HashMap<String, FrameShape>,
    cameras: HashMap<String, CameraState>,
}

impl AnnotationLoop {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        live: LiveFrames,
        sink: Box<dyn PresenceSink>,
        settings: AnnotationSettings,
    ) -> Self {
        Self {
            store,
            live,
            sink,
            settings,
            shapes: HashMap::new(),
            cameras: HashMap::new(),
        }
    }

    /// Declare a camera and the shape of the frames it stores.
    pub fn register_camera(&mut self, name: &str, shape: FrameShape) {
        self.shapes.insert(name.to_string(), shape);
    }

    pub fn camera(&self, name: &str) -> Option<&CameraState> {
        self.cameras.get(name)
    }

    pub fn process(&mut self, msg: DetectedFrame) -> Result<ProcessOutcome> {
        let Some(&shape) = self.shapes.get(&msg.camera) else {
            log::warn!("[{}] detections for an unregistered camera", msg.camera);
            self.store.delete(&[frame_key(&msg.camera, msg.frame_time)])?;
            return Ok(ProcessOutcome::UnknownCamera);
        };
        let state = self
            .cameras
            .entry(msg.camera.clone())
            .or_insert_with(|| CameraState::new(shape));
        state.tracked = msg.detections.poses;

        let key = frame_key(&msg.camera, msg.frame_time);
        let mut outcome = ProcessOutcome::FrameMissing;
        match self.store.get(&key, Duration::ZERO)? {
            Some(mut pixels) => match Canvas::new(state.shape, &mut pixels) {
                Some(mut canvas) => {
                    for pose in &state.tracked {
                        draw_pose(
                            &mut canvas,
                            pose,
                            self.settings.tensor_shape,
                            self.settings.keypoint_threshold,
                        );
                    }
                    let frame = Arc::new(AnnotatedFrame {
                        camera: msg.camera.clone(),
                        frame_time: msg.frame_time,
                        shape: state.shape,
                        pixels,
                        poses: state.tracked.len(),
                    });
                    state.current_frame = Some(frame.clone());
                    self.live.publish(frame)?;

                    if let Some(previous) = state.retained.take() {
                        if previous != key {
                            self.store.delete(&[previous])?;
                        }
                    }
                    state.retained = Some(key);
                    outcome = ProcessOutcome::Annotated;
                }
                None => {
                    log::warn!(
                        "[{}] stored frame has {} bytes, expected {}",
                        msg.camera,
                        pixels.len(),
                        state.shape.byte_len()
                    );
                    self.store.delete(&[key])?;
                }
            },
            None => log::debug!("[{}] frame {} not in store", msg.camera, msg.frame_time),
        }

        let threshold = self.settings.presence_threshold;
        let present = state.tracked.iter().any(|pose| pose.score >= threshold);
        if state.status.update(PERSON, present) {
            self.sink.presence_changed(&msg.camera, PERSON, present);
        }
        Ok(outcome)
    }

    /// Process messages until `shutdown` is set or every capture loop is gone.
    pub fn run(&mut self, queue: &AnnotationReceiver, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            match queue.recv_timeout(self.settings.pop_interval) {
                Ok(msg) => {
                    self.process(msg)?;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("annotation queue closed");
                    break;
                }
            }
        }
        // Frames queued but never annotated would otherwise stay resident.
        let pending: Vec<ObjectId> = queue
            .try_iter()
            .map(|msg| frame_key(&msg.camera, msg.frame_time))
            .collect();
        if !pending.is_empty() {
            self.store.delete(&pending)?;
        }
        self.release_retained()
    }

    /// Delete every retained frame from the store.
    pub fn release_retained(&mut self) -> Result<()> {
        let keys: Vec<ObjectId> = self
            .cameras
            .values_mut()
            .filter_map(|state| state.retained.take())
            .collect();
        if !keys.is_empty() {
            self.store.delete(&keys)?;
        }
        Ok(())
    }
}
