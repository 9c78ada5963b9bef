use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::DEFAULT_RESTART_BACKOFF;
use crate::decoder::{build_command, probe_frame_shape, resolve_input, DecoderArgs};
use crate::detect::{EngineKind, EngineSpec, DEFAULT_DETECT_TIMEOUT};
use crate::frame::FrameShape;
use crate::supervisor::DEFAULT_GRACE_PERIOD;

const DEFAULT_STORE_PATH: &str = "/dev/shm/posewatch";
const MEMORY_STORE: &str = "memory";
const DEFAULT_MODEL_PATH: &str = "/models/pose.onnx";
const DEFAULT_INPUT_SIZE: usize = 257;
const DEFAULT_DECODER_PROGRAM: &str = "ffmpeg";

#[derive(Debug, Deserialize, Default)]
struct PosewatchConfigFile {
    store_path: Option<String>,
    detector: Option<DetectorConfigFile>,
    ffmpeg: Option<FfmpegConfigFile>,
    supervisor: Option<SupervisorConfigFile>,
    #[serde(default)]
    cameras: BTreeMap<String, CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<usize>,
    input_height: Option<usize>,
    timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct FfmpegConfigFile {
    program: Option<String>,
    input: Option<String>,
    global_args: Option<Vec<String>>,
    hwaccel_args: Option<Vec<String>>,
    input_args: Option<Vec<String>>,
    output_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SupervisorConfigFile {
    grace_period_secs: Option<f64>,
    restart_backoff_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    fps: Option<f64>,
    take_frame: Option<u64>,
    width: Option<usize>,
    height: Option<usize>,
    #[serde(default)]
    ffmpeg: FfmpegConfigFile,
}

/// Where the shared object store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// In-process store; only usable when every loop runs in this process.
    Memory,
    Directory(PathBuf),
}

impl StoreLocation {
    fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case(MEMORY_STORE) {
            StoreLocation::Memory
        } else {
            StoreLocation::Directory(PathBuf::from(value))
        }
    }
}

#[derive(Debug, Clone)]
pub struct PosewatchConfig {
    pub store: StoreLocation,
    pub detector: DetectorSettings,
    pub supervisor: SupervisorSettings,
    pub cameras: BTreeMap<String, CameraConfig>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub engine: EngineSpec,
    /// Detection call timeout, shared by clients and the worker.
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub grace_period: Duration,
    pub restart_backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub name: String,
    pub fps: f64,
    pub take_frame: u64,
    /// `None` means probe the stream at startup.
    pub shape: Option<FrameShape>,
    pub program: String,
    /// Decoder input, possibly with `{POSEWATCH_*}` placeholders.
    pub input: String,
    pub decoder: DecoderArgs,
}

impl CameraConfig {
    /// Decoder argv with placeholders resolved.
    pub fn decoder_command(&self) -> Result<Vec<String>> {
        let input = resolve_input(&self.input)?;
        Ok(build_command(&self.program, &self.decoder, &input))
    }

    /// Configured frame shape, or the probed one.
    pub fn frame_shape(&self) -> Result<FrameShape> {
        match self.shape {
            Some(shape) => Ok(shape),
            None => probe_frame_shape(&resolve_input(&self.input)?),
        }
    }
}

impl PosewatchConfig {
    /// Load from `POSEWATCH_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("POSEWATCH_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any) and the environment.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML text without touching the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let file: PosewatchConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PosewatchConfigFile) -> Result<Self> {
        let store = StoreLocation::parse(file.store_path.as_deref().unwrap_or(DEFAULT_STORE_PATH));

        let detector_file = file.detector.unwrap_or_default();
        let kind = match detector_file.backend.as_deref() {
            Some(backend) => backend.parse::<EngineKind>()?,
            None => EngineKind::Stub,
        };
        let detector = DetectorSettings {
            engine: EngineSpec {
                kind,
                model_path: detector_file
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                input_shape: FrameShape::new(
                    detector_file.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
                    detector_file.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
                ),
            },
            timeout: seconds(
                "detector.timeout_secs",
                detector_file.timeout_secs,
                DEFAULT_DETECT_TIMEOUT,
            )?,
        };

        let supervisor_file = file.supervisor.unwrap_or_default();
        let supervisor = SupervisorSettings {
            grace_period: seconds(
                "supervisor.grace_period_secs",
                supervisor_file.grace_period_secs,
                DEFAULT_GRACE_PERIOD,
            )?,
            restart_backoff: seconds(
                "supervisor.restart_backoff_secs",
                supervisor_file.restart_backoff_secs,
                DEFAULT_RESTART_BACKOFF,
            )?,
        };

        let global = file.ffmpeg.unwrap_or_default();
        let defaults = DecoderArgs::default();
        let mut cameras = BTreeMap::new();
        for (name, camera) in file.cameras {
            let fps = camera
                .fps
                .ok_or_else(|| anyhow!("camera '{}' must set fps", name))?;
            let input = camera
                .ffmpeg
                .input
                .clone()
                .ok_or_else(|| anyhow!("camera '{}' must set ffmpeg.input", name))?;
            let shape = match (camera.height, camera.width) {
                (Some(height), Some(width)) => Some(FrameShape::new(height, width)),
                (None, None) => None,
                _ => {
                    return Err(anyhow!(
                        "camera '{}' must set both width and height, or neither",
                        name
                    ))
                }
            };
            let pick = |own: &Option<Vec<String>>, shared: &Option<Vec<String>>, fallback: &[String]| {
                own.clone()
                    .or_else(|| shared.clone())
                    .unwrap_or_else(|| fallback.to_vec())
            };
            let decoder = DecoderArgs {
                global_args: pick(&camera.ffmpeg.global_args, &global.global_args, &defaults.global_args),
                hwaccel_args: pick(&camera.ffmpeg.hwaccel_args, &global.hwaccel_args, &defaults.hwaccel_args),
                input_args: pick(&camera.ffmpeg.input_args, &global.input_args, &defaults.input_args),
                output_args: pick(&camera.ffmpeg.output_args, &global.output_args, &defaults.output_args),
            };
            let program = camera
                .ffmpeg
                .program
                .clone()
                .or_else(|| global.program.clone())
                .unwrap_or_else(|| DEFAULT_DECODER_PROGRAM.to_string());
            cameras.insert(
                name.clone(),
                CameraConfig {
                    name,
                    fps,
                    take_frame: camera.take_frame.unwrap_or(1),
                    shape,
                    program,
                    input,
                    decoder,
                },
            );
        }

        Ok(Self {
            store,
            detector,
            supervisor,
            cameras,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("POSEWATCH_STORE_PATH") {
            if !path.trim().is_empty() {
                self.store = StoreLocation::parse(&path);
            }
        }
        if let Ok(path) = std::env::var("POSEWATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.detector.engine.model_path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("POSEWATCH_DETECTOR_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.engine.kind = backend
                    .parse()
                    .map_err(|e| anyhow!("POSEWATCH_DETECTOR_BACKEND: {}", e))?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(anyhow!("at least one camera must be configured"));
        }
        self.detector
            .engine
            .input_shape
            .validate()
            .map_err(|e| anyhow!("detector input: {}", e))?;
        if self.detector.timeout.is_zero() {
            return Err(anyhow!("detector timeout must be greater than zero"));
        }
        for camera in self.cameras.values() {
            if camera.name.trim().is_empty() {
                return Err(anyhow!("camera names must not be empty"));
            }
            if !camera.fps.is_finite() || camera.fps <= 0.0 {
                return Err(anyhow!("camera '{}' fps must be greater than zero", camera.name));
            }
            if camera.take_frame == 0 {
                return Err(anyhow!(
                    "camera '{}' take_frame must be greater than zero",
                    camera.name
                ));
            }
            if let Some(shape) = camera.shape {
                shape
                    .validate()
                    .map_err(|e| anyhow!("camera '{}': {}", camera.name, e))?;
            }
        }
        Ok(())
    }
}

fn seconds(field: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(secs) if secs.is_finite() && secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
        Some(secs) => Err(anyhow!("{} must be a non-negative number, got {}", field, secs)),
    }
}

fn read_config_file(path: &Path) -> Result<PosewatchConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
