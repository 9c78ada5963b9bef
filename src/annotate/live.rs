use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::frame::FrameShape;

/// A frame with the latest poses drawn on it.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub camera: String,
    pub frame_time: f64,
    pub shape: FrameShape,
    pub pixels: Vec<u8>,
    /// Number of poses drawn.
    pub poses: usize,
}

impl AnnotatedFrame {
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode(
                &self.pixels,
                self.shape.width as u32,
                self.shape.height as u32,
                ExtendedColorType::Rgb8,
            )
            .map_err(|err| anyhow!("[{}] JPEG encode failed: {err}", self.camera))?;
        Ok(out)
    }
}

/// Latest annotated frame per camera.
///
/// Written only by the annotation loop; readers get shared snapshots.
#[derive(Clone, Debug, Default)]
pub struct LiveFrames {
    inner: Arc<RwLock<HashMap<String, Arc<AnnotatedFrame>>>>,
}

impl LiveFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self, camera: &str) -> Option<Arc<AnnotatedFrame>> {
        self.inner.read().ok()?.get(camera).cloned()
    }

    pub fn cameras(&self) -> Vec<String> {
        let Ok(map) = self.inner.read() else {
            return Vec::new();
        };
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }

    pub(crate) fn publish(&self, frame: Arc<AnnotatedFrame>) -> Result<()> {
        let mut map = self
            .inner
            .write()
            .map_err(|_| anyhow!("live frame map poisoned"))?;
        map.insert(frame.camera.clone(), frame);
        Ok(())
    }
}
