mod common;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use common::RunningWorker;
use posewatch::detect::{work_queue, DetectionClient, RequestBasis};
use posewatch::frame::FrameShape;
use posewatch::store::{DirStore, ObjectStore};
use posewatch::{Clock, ManualClock, SystemClock};

const TENSOR: FrameShape = FrameShape::new(8, 8);

#[test]
fn detection_round_trip_through_directory_store() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store: Arc<dyn ObjectStore> = Arc::new(DirStore::open(dir.path())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let worker = RunningWorker::start(store.clone(), clock.clone(), TENSOR);

    let mut front = DetectionClient::new("front", store.clone(), worker.sender.clone(), clock.clone());
    let mut back = DetectionClient::new("back-yard", store.clone(), worker.sender.clone(), clock);
    front.start();
    back.start();
    for _ in 0..5 {
        assert_eq!(front.detect(&vec![0u8; TENSOR.byte_len()])?.len(), 1);
        assert_eq!(back.detect(&vec![0u8; TENSOR.byte_len()])?.len(), 1);
    }
    assert!(store.is_empty()?);
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);
    assert!(front.eps(10.0) > 0.0);
    worker.stop()
}

#[test]
fn timed_out_call_never_creates_response() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store: Arc<dyn ObjectStore> = Arc::new(DirStore::open(dir.path())?);
    let clock = Arc::new(ManualClock::new(42.0));
    // Nobody serves this queue.
    let (sender, queue) = work_queue();
    let mut client = DetectionClient::new("front", store.clone(), sender, clock)
        .with_timeout(Duration::from_millis(50));

    assert!(client.detect(&[9u8; 12])?.is_empty());
    let basis = queue.lock().unwrap().try_recv()?;
    let (request, response) = RequestBasis::parse(&basis)?.keys();
    assert!(!store.contains(&request)?);
    assert!(!store.contains(&response)?);
    assert!(store.is_empty()?);
    Ok(())
}
