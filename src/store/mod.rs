//! Shared object store.
//!
//! The store is a point-to-point handoff for binary payloads between execution
//! contexts. Keys are 20-byte digests derived deterministically from a
//! correlation basis, so producer and consumer can compute the same key
//! independently.
//!
//! Two implementations are provided:
//! - [`MemoryStore`]: in-process, condition-variable backed.
//! - [`DirStore`]: one file per object in a directory (e.g. under `/dev/shm`),
//!   usable across processes.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

mod dir;
mod memory;

pub use dir::DirStore;
pub use memory::MemoryStore;

/// Length of an [`ObjectId`] in bytes.
pub const OBJECT_ID_LEN: usize = 20;

/// Prefix applied to a request basis to derive its response key.
pub const RESPONSE_PREFIX: &str = "out-";

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Digest an arbitrary basis string into a key.
    pub fn from_basis(basis: &str) -> Self {
        let digest = Sha256::digest(basis.as_bytes());
        let mut out = [0u8; OBJECT_ID_LEN];
        out.copy_from_slice(&digest[..OBJECT_ID_LEN]);
        Self(out)
    }

    pub fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Key under which a captured frame is stored for the annotation loop.
pub fn frame_key(camera: &str, frame_time: f64) -> ObjectId {
    ObjectId::from_basis(&format!("{camera}{frame_time}"))
}

/// Request and response keys for a detection call basis.
pub fn request_keys(basis: &str) -> (ObjectId, ObjectId) {
    (
        ObjectId::from_basis(basis),
        ObjectId::from_basis(&format!("{RESPONSE_PREFIX}{basis}")),
    )
}

/// Object store capability.
///
/// Implementations must be safe to share between threads. No ordering is
/// guaranteed across keys.
pub trait ObjectStore: Send + Sync {
    /// Store a payload. Fails if the key already exists.
    fn put(&self, id: &ObjectId, data: &[u8]) -> Result<()>;

    /// Fetch a payload.
    ///
    /// A zero `timeout` is a non-blocking poll; otherwise waits up to `timeout`
    /// for the key to appear. Returns `Ok(None)` when the object is not available.
    fn get(&self, id: &ObjectId, timeout: Duration) -> Result<Option<Vec<u8>>>;

    /// Delete payloads. Missing keys are ignored.
    fn delete(&self, ids: &[ObjectId]) -> Result<()>;

    fn contains(&self, id: &ObjectId) -> Result<bool>;

    /// Number of resident objects.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_deterministic() {
        let (req_a, resp_a) = request_keys("front-1700000000.123");
        let (req_b, resp_b) = request_keys("front-1700000000.123");
        assert_eq!(req_a, req_b);
        assert_eq!(resp_a, resp_b);
        assert_ne!(req_a, resp_a);
        assert_eq!(resp_a, ObjectId::from_basis("out-front-1700000000.123"));
    }

    #[test]
    fn distinct_timestamps_give_distinct_keys() {
        let a = frame_key("front", 1_700_000_000.1);
        let b = frame_key("front", 1_700_000_000.2);
        let c = frame_key("back", 1_700_000_000.1);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, frame_key("front", 1_700_000_000.1));
    }

    #[test]
    fn object_id_hex_is_forty_chars() {
        let id = ObjectId::from_basis("x");
        assert_eq!(id.to_hex().len(), OBJECT_ID_LEN * 2);
        assert_eq!(format!("{id}"), id.to_hex());
    }
}
