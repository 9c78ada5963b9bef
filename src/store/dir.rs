use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{ObjectId, ObjectStore, OBJECT_ID_LEN};

const POLL_INTERVAL: Duration = Duration::from_millis(5);
const TMP_PREFIX: &str = ".tmp-";

/// Directory-backed object store.
///
/// Each object is a file named by the hex key. Writes go to a temporary file
/// that is renamed into place, so readers never observe partial payloads.
/// Pointing several processes at the same tmpfs directory gives a shared
/// store without any broker.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create store directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove every object and half-written temp file, e.g. left over from a
    /// previous run. Files the store did not name are left alone.
    pub fn clear(&self) -> Result<()> {
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(is_object_name(&name) || is_temp_name(&name)) {
                continue;
            }
            if entry.file_type()?.is_file() {
                remove_if_present(&entry.path())?;
            }
        }
        Ok(())
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        self.root.join(id.to_hex())
    }

    fn read_once(&self, id: &ObjectId) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(id)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!("failed to read object {}: {}", id, e)),
        }
    }
}

impl ObjectStore for DirStore {
    fn put(&self, id: &ObjectId, data: &[u8]) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            return Err(anyhow!("object {} already exists", id));
        }
        let tmp = self.root.join(format!("{}{}", TMP_PREFIX, id.to_hex()));
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            file.write_all(data)?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to publish object {}", id))?;
        Ok(())
    }

    fn get(&self, id: &ObjectId, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(data) = self.read_once(id)? {
                return Ok(Some(data));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    fn delete(&self, ids: &[ObjectId]) -> Result<()> {
        for id in ids {
            remove_if_present(&self.path_for(id))?;
        }
        Ok(())
    }

    fn contains(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.path_for(id).is_file())
    }

    fn len(&self) -> Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if is_object_name(&entry.file_name().to_string_lossy()) && entry.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

fn is_object_name(name: &str) -> bool {
    name.len() == OBJECT_ID_LEN * 2 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_temp_name(name: &str) -> bool {
    name.strip_prefix(TMP_PREFIX).is_some_and(is_object_name)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(anyhow!("failed to delete {}: {}", path.display(), e)),
    }
}
