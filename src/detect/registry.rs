use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{EngineFactory, PoseEngine};
use super::backends::StubEngine;
use crate::frame::FrameShape;

/// Engine backends that can be selected from configuration.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Stub,
    Tract,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Stub => "stub",
            EngineKind::Tract => "tract",
        }
    }
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(EngineKind::Stub),
            "tract" => Ok(EngineKind::Tract),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

/// Everything needed to construct an engine inside the worker context.
#[derive(Clone, Debug)]
pub struct EngineSpec {
    pub kind: EngineKind,
    pub model_path: PathBuf,
    pub input_shape: FrameShape,
}

impl EngineSpec {
    pub fn open(&self) -> Result<Box<dyn PoseEngine>> {
        match self.kind {
            EngineKind::Stub => Ok(Box::new(StubEngine::with_person(self.input_shape))),
            #[cfg(feature = "backend-tract")]
            EngineKind::Tract => Ok(Box::new(super::backends::TractEngine::new(
                &self.model_path,
                self.input_shape,
            )?)),
            #[cfg(not(feature = "backend-tract"))]
            EngineKind::Tract => Err(anyhow!(
                "detector backend 'tract' requires the backend-tract feature (model {})",
                self.model_path.display()
            )),
        }
    }

    /// Factory the worker supervisor calls on every (re)start.
    pub fn factory(&self) -> EngineFactory {
        let spec = self.clone();
        Arc::new(move || spec.open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_engine_kinds() {
        assert_eq!("stub".parse::<EngineKind>().unwrap(), EngineKind::Stub);
        assert_eq!(" Tract ".parse::<EngineKind>().unwrap(), EngineKind::Tract);
        assert!("edgetpu".parse::<EngineKind>().is_err());
    }

    #[test]
    fn stub_spec_opens() {
        let spec = EngineSpec {
            kind: EngineKind::Stub,
            model_path: PathBuf::from("/nonexistent.onnx"),
            input_shape: FrameShape::new(4, 4),
        };
        let engine = (spec.factory())().unwrap();
        assert_eq!(engine.name(), "stub");
        assert_eq!(engine.input_shape(), FrameShape::new(4, 4));
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_without_feature_is_fatal() {
        let spec = EngineSpec {
            kind: EngineKind::Tract,
            model_path: PathBuf::from("/models/pose.onnx"),
            input_shape: FrameShape::new(4, 4),
        };
        assert!(spec.open().is_err());
    }
}
