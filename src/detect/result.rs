use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Named body keypoints produced by the pose engine, in model output order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeypointLabel {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl KeypointLabel {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointLabel; Self::COUNT] = [
        KeypointLabel::Nose,
        KeypointLabel::LeftEye,
        KeypointLabel::RightEye,
        KeypointLabel::LeftEar,
        KeypointLabel::RightEar,
        KeypointLabel::LeftShoulder,
        KeypointLabel::RightShoulder,
        KeypointLabel::LeftElbow,
        KeypointLabel::RightElbow,
        KeypointLabel::LeftWrist,
        KeypointLabel::RightWrist,
        KeypointLabel::LeftHip,
        KeypointLabel::RightHip,
        KeypointLabel::LeftKnee,
        KeypointLabel::RightKnee,
        KeypointLabel::LeftAnkle,
        KeypointLabel::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeypointLabel::Nose => "nose",
            KeypointLabel::LeftEye => "left eye",
            KeypointLabel::RightEye => "right eye",
            KeypointLabel::LeftEar => "left ear",
            KeypointLabel::RightEar => "right ear",
            KeypointLabel::LeftShoulder => "left shoulder",
            KeypointLabel::RightShoulder => "right shoulder",
            KeypointLabel::LeftElbow => "left elbow",
            KeypointLabel::RightElbow => "right elbow",
            KeypointLabel::LeftWrist => "left wrist",
            KeypointLabel::RightWrist => "right wrist",
            KeypointLabel::LeftHip => "left hip",
            KeypointLabel::RightHip => "right hip",
            KeypointLabel::LeftKnee => "left knee",
            KeypointLabel::RightKnee => "right knee",
            KeypointLabel::LeftAnkle => "left ankle",
            KeypointLabel::RightAnkle => "right ankle",
        }
    }
}

/// A keypoint in model input coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub label: KeypointLabel,
    pub y: f32,
    pub x: f32,
    pub score: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Overall pose confidence.
    pub score: f32,
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn keypoint(&self, label: KeypointLabel) -> Option<&Keypoint> {
        self.keypoints.iter().find(|kp| kp.label == label)
    }
}

/// Result of one detection call. Empty when the call timed out.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    pub poses: Vec<Pose>,
}

impl Detections {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Encode as the response payload stored for the detection client.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("failed to encode detections")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("failed to decode detections")
    }
}

impl From<Vec<Pose>> for Detections {
    fn from(poses: Vec<Pose>) -> Self {
        Self { poses }
    }
}
