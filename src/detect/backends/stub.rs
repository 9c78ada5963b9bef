use anyhow::{anyhow, Result};

use crate::detect::backend::PoseEngine;
use crate::detect::result::{Keypoint, KeypointLabel, Pose};
use crate::frame::FrameShape;

/// Stub engine for testing. Echoes a fixed set of poses for every frame.
pub struct StubEngine {
    input_shape: FrameShape,
    poses: Vec<Pose>,
}

impl StubEngine {
    pub fn new(input_shape: FrameShape, poses: Vec<Pose>) -> Self {
        Self { input_shape, poses }
    }

    /// Engine that reports one upright person centred in the input.
    pub fn with_person(input_shape: FrameShape) -> Self {
        Self::new(input_shape, vec![standing_pose(input_shape)])
    }
}

impl PoseEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_shape(&self) -> FrameShape {
        self.input_shape
    }

    fn estimate(&mut self, tensor: &[u8]) -> Result<Vec<Pose>> {
        if tensor.len() != self.input_shape.byte_len() {
            return Err(anyhow!(
                "expected {} tensor bytes, received {}",
                self.input_shape.byte_len(),
                tensor.len()
            ));
        }
        Ok(self.poses.clone())
    }
}

/// A plausible standing pose scaled to `shape`.
pub fn standing_pose(shape: FrameShape) -> Pose {
    // (label, y, x) as fractions of the frame.
    const LAYOUT: [(KeypointLabel, f32, f32); KeypointLabel::COUNT] = [
        (KeypointLabel::Nose, 0.20, 0.50),
        (KeypointLabel::LeftEye, 0.18, 0.52),
        (KeypointLabel::RightEye, 0.18, 0.48),
        (KeypointLabel::LeftEar, 0.19, 0.54),
        (KeypointLabel::RightEar, 0.19, 0.46),
        (KeypointLabel::LeftShoulder, 0.30, 0.57),
        (KeypointLabel::RightShoulder, 0.30, 0.43),
        (KeypointLabel::LeftElbow, 0.42, 0.60),
        (KeypointLabel::RightElbow, 0.42, 0.40),
        (KeypointLabel::LeftWrist, 0.52, 0.61),
        (KeypointLabel::RightWrist, 0.52, 0.39),
        (KeypointLabel::LeftHip, 0.55, 0.54),
        (KeypointLabel::RightHip, 0.55, 0.46),
        (KeypointLabel::LeftKnee, 0.70, 0.55),
        (KeypointLabel::RightKnee, 0.70, 0.45),
        (KeypointLabel::LeftAnkle, 0.85, 0.55),
        (KeypointLabel::RightAnkle, 0.85, 0.45),
    ];
    let h = shape.height as f32;
    let w = shape.width as f32;
    Pose {
        score: 0.9,
        keypoints: LAYOUT
            .iter()
            .map(|&(label, y, x)| Keypoint {
                label,
                y: y * h,
                x: x * w,
                score: 0.8,
            })
            .collect(),
    }
}
