//! Raw frame buffers.
//!
//! - `FrameShape`: fixed `H×W×3` geometry of a camera stream or model input.
//! - `FrameBuffer`: per-camera pixel buffer, written only by the capture loop.
//! - `FrameView`: read-only handle other threads use to copy the latest frame.
//!
//! Frames are packed RGB24 with no header, exactly as the decoder emits them.

use anyhow::{anyhow, Result};
use image::{imageops, ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

/// Channel count of every frame handled by the pipeline.
pub const CHANNELS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameShape {
    pub height: usize,
    pub width: usize,
}

impl FrameShape {
    pub const fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    /// Number of bytes in one packed RGB frame.
    pub const fn byte_len(&self) -> usize {
        self.height * self.width * CHANNELS
    }

    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(anyhow!("frame shape {} has a zero dimension", self));
        }
        Ok(())
    }
}

impl fmt::Display for FrameShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, CHANNELS)
    }
}

/// Fixed-shape pixel buffer owned by one camera's capture loop.
///
/// Only the owner can write (`copy_from` takes `&mut self`). Readers obtain a
/// [`FrameView`] and receive copies, never references into the live buffer.
#[derive(Debug)]
pub struct FrameBuffer {
    shape: FrameShape,
    data: Arc<RwLock<Vec<u8>>>,
}

impl FrameBuffer {
    pub fn new(shape: FrameShape) -> Self {
        Self {
            shape,
            data: Arc::new(RwLock::new(vec![0u8; shape.byte_len()])),
        }
    }

    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Overwrite the buffer with a full frame.
    pub fn copy_from(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() != self.shape.byte_len() {
            return Err(anyhow!(
                "expected {} bytes for a {} frame, got {}",
                self.shape.byte_len(),
                self.shape,
                bytes.len()
            ));
        }
        let mut data = self
            .data
            .write()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))?;
        data.copy_from_slice(bytes);
        Ok(())
    }

    /// Run `f` over the current pixels without copying.
    pub fn with_pixels<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let data = self
            .data
            .read()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))?;
        Ok(f(&data))
    }

    pub fn view(&self) -> FrameView {
        FrameView {
            shape: self.shape,
            data: self.data.clone(),
        }
    }
}

/// Read-only handle onto a camera's [`FrameBuffer`].
#[derive(Clone, Debug)]
pub struct FrameView {
    shape: FrameShape,
    data: Arc<RwLock<Vec<u8>>>,
}

impl FrameView {
    pub fn shape(&self) -> FrameShape {
        self.shape
    }

    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let data = self
            .data
            .read()
            .map_err(|_| anyhow!("frame buffer lock poisoned"))?;
        Ok(data.clone())
    }
}

/// Build the model input from a frame, resizing bilinearly when shapes differ.
pub fn create_tensor_input(pixels: &[u8], shape: FrameShape, input: FrameShape) -> Result<Vec<u8>> {
    if pixels.len() != shape.byte_len() {
        return Err(anyhow!(
            "expected {} bytes for a {} frame, got {}",
            shape.byte_len(),
            shape,
            pixels.len()
        ));
    }
    if shape == input {
        return Ok(pixels.to_vec());
    }
    let source: ImageBuffer<Rgb<u8>, &[u8]> =
        ImageBuffer::from_raw(shape.width as u32, shape.height as u32, pixels)
            .ok_or_else(|| anyhow!("frame does not fit a {} image", shape))?;
    let resized = imageops::resize(
        &source,
        input.width as u32,
        input.height as u32,
        imageops::FilterType::Triangle,
    );
    Ok(resized.into_raw())
}
