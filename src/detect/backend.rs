use anyhow::Result;
use std::sync::Arc;

use crate::detect::result::Pose;
use crate::frame::FrameShape;

/// Pose estimation engine.
///
/// The engine is the only holder of the inference hardware handle. It is
/// constructed inside the worker context, so a failure to acquire the device
/// ends that context and lets the supervisor restart it.
pub trait PoseEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Shape of the packed RGB tensor `estimate` expects.
    fn input_shape(&self) -> FrameShape;

    /// Run pose estimation. Keypoints are in input tensor coordinates.
    fn estimate(&mut self, tensor: &[u8]) -> Result<Vec<Pose>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Constructor for engines, called each time the worker context (re)starts.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn PoseEngine>> + Send + Sync>;
