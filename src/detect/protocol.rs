//! Correlation basis for detection calls.
//!
//! A call is identified by `"{camera}-{timestamp}"`. The basis string is what
//! travels on the work queue; both sides derive the request and response keys
//! from it.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::store::{request_keys, ObjectId};

#[derive(Clone, Debug, PartialEq)]
pub struct RequestBasis {
    pub camera: String,
    pub timestamp: f64,
}

impl RequestBasis {
    pub fn new(camera: impl Into<String>, timestamp: f64) -> Self {
        Self {
            camera: camera.into(),
            timestamp,
        }
    }

    pub fn parse(basis: &str) -> Result<Self> {
        let (camera, timestamp) = basis
            .rsplit_once('-')
            .ok_or_else(|| anyhow!("malformed request basis '{}'", basis))?;
        let timestamp: f64 = timestamp
            .parse()
            .map_err(|_| anyhow!("malformed timestamp in request basis '{}'", basis))?;
        if camera.is_empty() {
            return Err(anyhow!("request basis '{}' has no camera", basis));
        }
        Ok(Self::new(camera, timestamp))
    }

    /// (request key, response key)
    pub fn keys(&self) -> (ObjectId, ObjectId) {
        request_keys(&self.to_string())
    }

    /// Seconds since the call was issued, as seen at `now`.
    pub fn age(&self, now: f64) -> f64 {
        now - self.timestamp
    }
}

impl fmt::Display for RequestBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.camera, self.timestamp)
    }
}

/// Producer side of the work queue. Cloned once per camera.
pub type WorkSender = Sender<String>;

/// Consumer side of the work queue.
///
/// Shared behind a mutex so that a restarted worker picks up the same queue.
pub type WorkQueue = Arc<Mutex<Receiver<String>>>;

pub fn work_queue() -> (WorkSender, WorkQueue) {
    let (tx, rx) = mpsc::channel();
    (tx, Arc::new(Mutex::new(rx)))
}
