//! File-backed `ConfigStore` for the persisted outlet-table image.

use std::path::{Path, PathBuf};
use std::{fs, io::Write};

use sorter_traits::{ConfigStore, HwResult};

/// Write `bytes` to a sibling temp file, fsync it, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

/// Stores the image in a single file. A missing file loads as empty.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn load(&mut self) -> HwResult<Vec<u8>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(Box::new(e)),
        }
    }

    fn store(&mut self, image: &[u8]) -> HwResult<()> {
        write_atomic(&self.path, image)?;
        tracing::info!(path = %self.path.display(), bytes = image.len(), "outlet table stored");
        Ok(())
    }
}

/// Volatile store, e.g. for tests or boards without persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    image: Vec<u8>,
}

impl MemoryStore {
    pub fn with_image(image: Vec<u8>) -> Self {
        Self { image }
    }
}

impl ConfigStore for MemoryStore {
    fn load(&mut self) -> HwResult<Vec<u8>> {
        Ok(self.image.clone())
    }

    fn store(&mut self, image: &[u8]) -> HwResult<()> {
        self.image = image.to_vec();
        Ok(())
    }
}
