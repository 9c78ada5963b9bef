use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{ObjectId, ObjectStore};

/// In-process object store.
///
/// Blocking gets park on a condition variable that is notified on every put.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<ObjectId, Vec<u8>>>,
    changed: Condvar,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ObjectId, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| anyhow!("object store lock poisoned"))
    }
}

impl ObjectStore for MemoryStore {
    fn put(&self, id: &ObjectId, data: &[u8]) -> Result<()> {
        let mut objects = self.lock()?;
        if objects.contains_key(id) {
            return Err(anyhow!("object {} already exists", id));
        }
        objects.insert(*id, data.to_vec());
        drop(objects);
        self.changed.notify_all();
        Ok(())
    }

    fn get(&self, id: &ObjectId, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut objects = self.lock()?;
        loop {
            if let Some(data) = objects.get(id) {
                return Ok(Some(data.clone()));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, _) = self
                .changed
                .wait_timeout(objects, deadline - now)
                .map_err(|_| anyhow!("object store lock poisoned"))?;
            objects = guard;
        }
    }

    fn delete(&self, ids: &[ObjectId]) -> Result<()> {
        let mut objects = self.lock()?;
        for id in ids {
            objects.remove(id);
        }
        Ok(())
    }

    fn contains(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.lock()?.contains_key(id))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
