use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::StoreError;

const LOCK_FILE: &str = ".lock";

/// Exclusive advisory lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Takes the lock without waiting. Fails with [`StoreError::Locked`] if
    /// another process holds it.
    pub fn try_acquire(dir: &Path) -> Result<Self, StoreError> {
        let (file, path) = open_lock_file(dir)?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "acquired data directory lock");
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(StoreError::Locked { path })
            }
            Err(source) => Err(StoreError::Lock { path, source }),
        }
    }

    /// Takes the lock, waiting for any current holder to release it.
    pub fn acquire(dir: &Path) -> Result<Self, StoreError> {
        let (file, path) = open_lock_file(dir)?;
        FileExt::lock_exclusive(&file).map_err(|source| StoreError::Lock {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "acquired data directory lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

fn open_lock_file(dir: &Path) -> Result<(File, PathBuf), StoreError> {
    let path = dir.join(LOCK_FILE);
    let open = || {
        fs::create_dir_all(dir)?;
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
    };
    match open() {
        Ok(file) => Ok((file, path)),
        Err(source) => Err(StoreError::Lock { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();

        let first = DataDirLock::try_acquire(dir.path()).unwrap();
        assert!(first.path().ends_with(LOCK_FILE));
        assert!(matches!(
            DataDirLock::try_acquire(dir.path()),
            Err(StoreError::Locked { .. })
        ));

        drop(first);
        DataDirLock::try_acquire(dir.path()).unwrap();
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data").join("pt");

        let lock = DataDirLock::acquire(&data_dir).unwrap();

        assert!(lock.path().exists());
    }
}
