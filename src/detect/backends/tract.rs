#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::PoseEngine;
use crate::detect::result::{Keypoint, KeypointLabel, Pose};
use crate::frame::FrameShape;

/// Tract-based pose engine for ONNX models.
///
/// The model takes a `1x3xHxW` f32 tensor scaled to `0..1` and returns
/// `1xNx17x3` keypoints as `(y, x, score)` in input pixel coordinates.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    input_shape: FrameShape,
    min_pose_score: f32,
}

impl TractEngine {
    /// Load a model from disk. Failure here is fatal to the worker context.
    pub fn new<P: AsRef<Path>>(model_path: P, input_shape: FrameShape) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_shape.height, input_shape.width),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_shape,
            min_pose_score: 0.1,
        })
    }

    pub fn with_min_pose_score(mut self, score: f32) -> Self {
        self.min_pose_score = score;
        self
    }

    fn build_input(&self, tensor: &[u8]) -> Result<Tensor> {
        if tensor.len() != self.input_shape.byte_len() {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                self.input_shape.byte_len(),
                tensor.len()
            ));
        }
        let width = self.input_shape.width;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, self.input_shape.height, width),
            |(_, channel, y, x)| tensor[(y * width + x) * 3 + channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn extract_poses(&self, outputs: TVec<TValue>) -> Result<Vec<Pose>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() != 4 || shape[2] != KeypointLabel::COUNT || shape[3] != 3 {
            return Err(anyhow!("unexpected pose output shape {:?}", shape));
        }

        let mut poses = Vec::with_capacity(shape[1]);
        for n in 0..shape[1] {
            let keypoints: Vec<Keypoint> = KeypointLabel::ALL
                .iter()
                .enumerate()
                .map(|(k, &label)| Keypoint {
                    label,
                    y: view[[0, n, k, 0]],
                    x: view[[0, n, k, 1]],
                    score: view[[0, n, k, 2]],
                })
                .collect();
            let score =
                keypoints.iter().map(|kp| kp.score).sum::<f32>() / KeypointLabel::COUNT as f32;
            if score >= self.min_pose_score {
                poses.push(Pose { score, keypoints });
            }
        }
        Ok(poses)
    }
}

impl PoseEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_shape(&self) -> FrameShape {
        self.input_shape
    }

    fn estimate(&mut self, tensor: &[u8]) -> Result<Vec<Pose>> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_poses(outputs)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; self.input_shape.byte_len()];
        self.estimate(&blank).map(|_| ())
    }
}
