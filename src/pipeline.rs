//! Wires configured cameras, the inference worker and the annotation loop
//! into running threads.

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::annotate::{
    annotation_queue, AnnotationLoop, AnnotationSettings, LiveFrames, LogPresenceSink,
};
use crate::capture::{CaptureLoop, CaptureSettings};
use crate::clock::{Clock, SystemClock};
use crate::config::{PosewatchConfig, StoreLocation};
use crate::decoder::DecoderProcess;
use crate::detect::{work_queue, DetectionClient, WorkerConfig, WorkerThread};
use crate::store::{DirStore, MemoryStore, ObjectStore};
use crate::supervisor::{Supervisor, SupervisorConfig};
use crate::telemetry::Telemetry;

/// How often the monitor checks the inference worker.
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

pub fn open_store(location: &StoreLocation) -> Result<Arc<dyn ObjectStore>> {
    match location {
        StoreLocation::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreLocation::Directory(path) => {
            let store = DirStore::open(path)?;
            // Anything left here belongs to a previous run.
            store.clear()?;
            Ok(Arc::new(store))
        }
    }
}

/// A running pipeline.
pub struct Pipeline {
    shutdown: Arc<AtomicBool>,
    telemetry: Arc<Telemetry>,
    live: LiveFrames,
    threads: Vec<(String, JoinHandle<Result<()>>)>,
}

impl Pipeline {
    pub fn start(config: &PosewatchConfig) -> Result<Self> {
        let store = open_store(&config.store)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let shutdown = Arc::new(AtomicBool::new(false));
        let live = LiveFrames::new();
        let supervisor_config =
            SupervisorConfig::default().with_grace_period(config.supervisor.grace_period);

        let mut shapes = Vec::with_capacity(config.cameras.len());
        for camera in config.cameras.values() {
            let shape = camera
                .frame_shape()
                .with_context(|| format!("[{}] unable to determine frame shape", camera.name))?;
            shapes.push((camera, shape));
        }

        let mut telemetry = Telemetry::new();
        let camera_cells: Vec<_> = shapes
            .iter()
            .map(|(camera, _)| telemetry.register_camera(&camera.name))
            .collect();
        let telemetry = Arc::new(telemetry);

        let mut threads = Vec::new();
        let (work_tx, work_rx) = work_queue();

        let worker_config = WorkerConfig {
            request_timeout: config.detector.timeout,
            ..WorkerConfig::default()
        };
        let factory = config.detector.engine.factory();
        let worker_store = store.clone();
        let worker_clock = clock.clone();
        let detector_cells = telemetry.detector();
        let mut worker = Supervisor::new("inference-worker", supervisor_config, move || {
            WorkerThread::spawn(
                factory.clone(),
                worker_store.clone(),
                work_rx.clone(),
                detector_cells.clone(),
                worker_clock.clone(),
                worker_config,
            )
        });
        worker.start_or_restart()?;
        let monitor_shutdown = shutdown.clone();
        let backoff = config.supervisor.restart_backoff;
        threads.push((
            "monitor".to_string(),
            spawn_named("monitor", move || {
                monitor_worker(&mut worker, &monitor_shutdown, backoff)
            })?,
        ));

        let (annotation_tx, annotation_rx) = annotation_queue();
        let mut annotator = AnnotationLoop::new(
            store.clone(),
            live.clone(),
            Box::new(LogPresenceSink),
            AnnotationSettings::new(config.detector.engine.input_shape),
        );
        for (camera, shape) in &shapes {
            annotator.register_camera(&camera.name, *shape);
        }
        let annotation_shutdown = shutdown.clone();
        threads.push((
            "annotation".to_string(),
            spawn_named("annotation", move || {
                annotator.run(&annotation_rx, &annotation_shutdown)
            })?,
        ));

        for ((camera, shape), cells) in shapes.into_iter().zip(camera_cells) {
            let argv = camera.decoder_command()?;
            let frame_size = shape.byte_len();
            let decoder = Supervisor::new(camera.name.clone(), supervisor_config, move || {
                DecoderProcess::spawn(&argv, frame_size)
            });
            let client = DetectionClient::new(
                camera.name.clone(),
                store.clone(),
                work_tx.clone(),
                clock.clone(),
            )
            .with_timeout(config.detector.timeout);
            let settings = CaptureSettings {
                take_frame: camera.take_frame,
                restart_backoff: config.supervisor.restart_backoff,
                ..CaptureSettings::new(
                    camera.name.clone(),
                    camera.fps,
                    shape,
                    config.detector.engine.input_shape,
                )
            };
            let mut capture = CaptureLoop::new(
                settings,
                decoder,
                client,
                store.clone(),
                annotation_tx.clone(),
                clock.clone(),
                cells,
            );
            let capture_shutdown = shutdown.clone();
            let name = format!("capture-{}", camera.name);
            threads.push((
                name.clone(),
                spawn_named(&name, move || capture.run(&capture_shutdown))?,
            ));
        }

        log::info!(
            "pipeline running with {} camera(s), store {:?}",
            config.cameras.len(),
            config.store
        );
        Ok(Self {
            shutdown,
            telemetry,
            live,
            threads,
        })
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn live_frames(&self) -> &LiveFrames {
        &self.live
    }

    /// Shared flag that stops every loop when set.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Name of the first thread that has ended, if any.
    pub fn finished_thread(&self) -> Option<&str> {
        self.threads
            .iter()
            .find(|(_, handle)| handle.is_finished())
            .map(|(name, _)| name.as_str())
    }

    /// Signal shutdown and join every thread, returning the first failure.
    pub fn stop(self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        let mut first_error = None;
        for (name, handle) in self.threads {
            let outcome = match handle.join() {
                Ok(result) => result,
                Err(_) => Err(anyhow!("thread panicked")),
            };
            if let Err(e) = outcome {
                log::error!("[{}] {:#}", name, e);
                first_error.get_or_insert(e.context(format!("{} failed", name)));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn spawn_named<F>(name: &str, f: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .with_context(|| format!("failed to spawn {} thread", name))
}

/// Restart the inference worker whenever it exits, until shutdown.
fn monitor_worker(
    worker: &mut Supervisor<WorkerThread>,
    shutdown: &AtomicBool,
    backoff: Duration,
) -> Result<()> {
    while !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(MONITOR_INTERVAL);
        match worker.restart_if_exited() {
            Ok(true) => {
                log::warn!(
                    "inference worker restarted ({} restarts)",
                    worker.restart_count()
                );
                std::thread::sleep(backoff);
            }
            Ok(false) => {}
            Err(e) => {
                log::error!("inference worker restart failed: {:#}", e);
                std::thread::sleep(backoff);
            }
        }
    }
    worker.stop()
}
